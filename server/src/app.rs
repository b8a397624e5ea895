use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    identity::IdentityState,
    store::{
        memory::MemoryStore, mongo::MongoStore, ParcelStore, PaymentStore, RiderStore, StoreError,
        UserStore,
    },
};

#[derive(Clone)]
pub struct UserDirectory(pub Arc<dyn UserStore>);

#[derive(Clone)]
pub struct RiderRegistry(pub Arc<dyn RiderStore>);

#[derive(Clone)]
pub struct ParcelLedger(pub Arc<dyn ParcelStore>);

#[derive(Clone)]
pub struct PaymentJournal(pub Arc<dyn PaymentStore>);

#[derive(FromRef, Clone)]
pub struct AppState {
    pub identity_state: IdentityState,

    pub users: UserDirectory,
    pub riders: RiderRegistry,
    pub parcels: ParcelLedger,
    pub payments: PaymentJournal,
}

impl AppState {
    pub fn with_store<S>(identity_state: IdentityState, store: Arc<S>) -> Self
    where
        S: UserStore + RiderStore + ParcelStore + PaymentStore + 'static,
    {
        Self {
            identity_state,

            users: UserDirectory(store.clone()),
            riders: RiderRegistry(store.clone()),
            parcels: ParcelLedger(store.clone()),
            payments: PaymentJournal(store),
        }
    }

    pub async fn new_mongo(mongo_url: &str, database_name: &str) -> Result<Self, StoreError> {
        let identity_state = IdentityState::new_from_env();

        let store = MongoStore::new(mongo_url, database_name).await?;
        store.run_migration().await?;

        Ok(Self::with_store(identity_state, Arc::new(store)))
    }

    pub async fn new_from_env() -> Result<Self, StoreError> {
        let mongodb_url = std::env::var("MONGODB_URI")
            .expect("Cannot retreive MONGODB_URI from environment variable.");

        Self::new_mongo(&mongodb_url, "parcelcollection").await
    }

    pub fn new_in_memory(identity_state: IdentityState) -> Self {
        Self::with_store(identity_state, Arc::new(MemoryStore::default()))
    }
}
