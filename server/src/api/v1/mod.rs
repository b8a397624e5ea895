pub mod parcel;
pub mod payment;
pub mod rider;
pub mod user;

#[cfg(test)]
pub(crate) mod tests {
    use axum::extract::State;
    use bson::oid::ObjectId;
    use time::OffsetDateTime;

    use crate::{
        app::{AppState, ParcelLedger, PaymentJournal, RiderRegistry, UserDirectory},
        identity::{Identity, IdentityState},
    };

    use super::user::{UserModel, UserRole};

    pub const ADMIN_EMAIL: &str = "admin@example.com";

    pub struct Bootstrap {
        pub app_state: AppState,
    }

    impl Bootstrap {
        pub fn users(&self) -> State<UserDirectory> {
            State(self.app_state.users.clone())
        }

        pub fn riders(&self) -> State<RiderRegistry> {
            State(self.app_state.riders.clone())
        }

        pub fn parcels(&self) -> State<ParcelLedger> {
            State(self.app_state.parcels.clone())
        }

        pub fn payments(&self) -> State<PaymentJournal> {
            State(self.app_state.payments.clone())
        }

        /// Handlers only see the already-verified identity, so tests build it
        /// directly; the token path is covered by the identity module's tests.
        pub fn identity(&self, email: &str) -> Identity {
            Identity {
                email: email.to_string(),
            }
        }

        pub fn admin(&self) -> Identity {
            self.identity(ADMIN_EMAIL)
        }

        pub async fn seed_user(&self, email: &str, role: UserRole) -> UserModel {
            let model = UserModel {
                id: ObjectId::new(),
                email: email.to_string(),
                role,
                created_at: OffsetDateTime::now_utc().into(),
                updated_at: OffsetDateTime::now_utc().into(),
            };
            self.app_state.users.0.insert(&model).await.unwrap();

            model
        }
    }

    pub async fn bootstrap() -> Bootstrap {
        let app_state = AppState::new_in_memory(IdentityState::new(b"test-secret-key"));

        let bootstrap = Bootstrap { app_state };
        bootstrap.seed_user(ADMIN_EMAIL, UserRole::Admin).await;

        bootstrap
    }
}
