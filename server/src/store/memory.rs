use async_trait::async_trait;
use bson::oid::ObjectId;
use tokio::sync::RwLock;

use crate::api::v1::{
    parcel::{AssignedRider, DeliveryStatus, ParcelModel, PaymentStatus},
    payment::PaymentModel,
    rider::{RiderModel, RiderStatus, WorkStatus},
    user::{UserModel, UserRole},
};

use super::{ParcelStore, PaymentStore, RiderStore, StoreError, UserStore};

/// In-process store binding. Backs the test suite and mirrors the guarded
/// update semantics of the MongoDB binding.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<UserModel>>,
    riders: RwLock<Vec<RiderModel>>,
    parcels: RwLock<Vec<ParcelModel>>,
    payments: RwLock<Vec<PaymentModel>>,
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &UserModel) -> Result<(), StoreError> {
        self.users.write().await.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|it| it.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|it| it.email == email).cloned())
    }

    async fn search_by_email(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<UserModel>, StoreError> {
        let fragment = fragment.to_lowercase();
        let users = self.users.read().await;

        Ok(users
            .iter()
            .filter(|it| it.email.to_lowercase().contains(&fragment))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_role(&self, id: ObjectId, role: UserRole) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;

        match users.iter_mut().find(|it| it.id == id) {
            Some(user) => {
                user.role = role;
                user.updated_at = bson::DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_role_by_email(&self, email: &str, role: UserRole) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;

        match users.iter_mut().find(|it| it.email == email) {
            Some(user) => {
                user.role = role;
                user.updated_at = bson::DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RiderStore for MemoryStore {
    async fn insert(&self, rider: &RiderModel) -> Result<(), StoreError> {
        self.riders.write().await.push(rider.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<RiderModel>, StoreError> {
        let riders = self.riders.read().await;
        Ok(riders.iter().find(|it| it.id == id).cloned())
    }

    async fn list_by_status(&self, status: RiderStatus) -> Result<Vec<RiderModel>, StoreError> {
        let riders = self.riders.read().await;
        Ok(riders.iter().filter(|it| it.status == status).cloned().collect())
    }

    async fn list_by_district(&self, district: &str) -> Result<Vec<RiderModel>, StoreError> {
        let riders = self.riders.read().await;
        Ok(riders
            .iter()
            .filter(|it| it.district == district)
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        id: ObjectId,
        expected: &[RiderStatus],
        next: RiderStatus,
    ) -> Result<bool, StoreError> {
        let mut riders = self.riders.write().await;

        match riders
            .iter_mut()
            .find(|it| it.id == id && expected.contains(&it.status))
        {
            Some(rider) => {
                rider.status = next;
                rider.updated_at = bson::DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition_work_status(
        &self,
        id: ObjectId,
        expected: WorkStatus,
        next: WorkStatus,
    ) -> Result<bool, StoreError> {
        let mut riders = self.riders.write().await;

        match riders
            .iter_mut()
            .find(|it| it.id == id && it.work_status == expected)
        {
            Some(rider) => {
                rider.work_status = next;
                rider.updated_at = bson::DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ParcelStore for MemoryStore {
    async fn insert(&self, parcel: &ParcelModel) -> Result<(), StoreError> {
        self.parcels.write().await.push(parcel.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<ParcelModel>, StoreError> {
        let parcels = self.parcels.read().await;
        Ok(parcels.iter().find(|it| it.id == id).cloned())
    }

    async fn list_by_owner(
        &self,
        owner_email: Option<&str>,
    ) -> Result<Vec<ParcelModel>, StoreError> {
        let parcels = self.parcels.read().await;

        let mut parcels: Vec<_> = parcels
            .iter()
            .filter(|it| owner_email.map_or(true, |email| it.owner_email == email))
            .cloned()
            .collect();
        parcels.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));

        Ok(parcels)
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, StoreError> {
        let mut parcels = self.parcels.write().await;

        let before = parcels.len();
        parcels.retain(|it| it.id != id);

        Ok(parcels.len() < before)
    }

    async fn assign_rider_if_created(
        &self,
        id: ObjectId,
        rider: &AssignedRider,
    ) -> Result<bool, StoreError> {
        let mut parcels = self.parcels.write().await;

        match parcels
            .iter_mut()
            .find(|it| it.id == id && it.delivery_status == DeliveryStatus::Created)
        {
            Some(parcel) => {
                parcel.delivery_status = DeliveryStatus::RiderAssigned;
                parcel.assigned_rider_id = Some(rider.id);
                parcel.assigned_rider_name = Some(rider.name.clone());
                parcel.assigned_rider_email = Some(rider.email.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_payment_status(
        &self,
        id: ObjectId,
        status: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let mut parcels = self.parcels.write().await;

        match parcels.iter_mut().find(|it| it.id == id) {
            Some(parcel) => {
                parcel.payment_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert(&self, payment: &PaymentModel) -> Result<(), StoreError> {
        self.payments.write().await.push(payment.clone());
        Ok(())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentModel>, StoreError> {
        let payments = self.payments.read().await;
        Ok(payments
            .iter()
            .find(|it| it.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_by_payer(
        &self,
        payer_email: Option<&str>,
    ) -> Result<Vec<PaymentModel>, StoreError> {
        let payments = self.payments.read().await;

        let mut payments: Vec<_> = payments
            .iter()
            .filter(|it| payer_email.map_or(true, |email| it.payer_email == email))
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));

        Ok(payments)
    }
}
