pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::oid::ObjectId;

use crate::api::v1::{
    parcel::{AssignedRider, ParcelModel, PaymentStatus},
    payment::PaymentModel,
    rider::{RiderModel, RiderStatus, WorkStatus},
    user::{UserModel, UserRole},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] mongodb::error::Error),

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),
}

/// Directory of signed-in users and their roles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &UserModel) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, StoreError>;

    /// Exact, case-sensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, StoreError>;

    /// Case-insensitive substring match, capped at `limit` records.
    async fn search_by_email(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<UserModel>, StoreError>;

    /// Returns whether a user matched the id.
    async fn set_role(&self, id: ObjectId, role: UserRole) -> Result<bool, StoreError>;

    /// Returns whether a user matched the email.
    async fn set_role_by_email(&self, email: &str, role: UserRole) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RiderStore: Send + Sync {
    async fn insert(&self, rider: &RiderModel) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<RiderModel>, StoreError>;

    async fn list_by_status(&self, status: RiderStatus) -> Result<Vec<RiderModel>, StoreError>;

    async fn list_by_district(&self, district: &str) -> Result<Vec<RiderModel>, StoreError>;

    /// Conditional transition: applies `next` only while the rider's current
    /// status is one of `expected`. Returns whether the guarded write matched.
    async fn transition_status(
        &self,
        id: ObjectId,
        expected: &[RiderStatus],
        next: RiderStatus,
    ) -> Result<bool, StoreError>;

    /// Conditional flip of `work_status`; the loser of a race gets `false`.
    async fn transition_work_status(
        &self,
        id: ObjectId,
        expected: WorkStatus,
        next: WorkStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ParcelStore: Send + Sync {
    async fn insert(&self, parcel: &ParcelModel) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<ParcelModel>, StoreError>;

    /// Parcels for one owner, or every parcel when `owner_email` is `None`,
    /// newest creation date first.
    async fn list_by_owner(
        &self,
        owner_email: Option<&str>,
    ) -> Result<Vec<ParcelModel>, StoreError>;

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, StoreError>;

    /// Stamps the assigned-rider fields and moves the parcel to
    /// `rider_assigned`, but only while it is still `created`.
    async fn assign_rider_if_created(
        &self,
        id: ObjectId,
        rider: &AssignedRider,
    ) -> Result<bool, StoreError>;

    async fn set_payment_status(
        &self,
        id: ObjectId,
        status: PaymentStatus,
    ) -> Result<bool, StoreError>;
}

/// Append-only journal of confirmed payments.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &PaymentModel) -> Result<(), StoreError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentModel>, StoreError>;

    /// Payments for one payer, or the full journal when `payer_email` is
    /// `None`, newest first.
    async fn list_by_payer(
        &self,
        payer_email: Option<&str>,
    ) -> Result<Vec<PaymentModel>, StoreError>;
}
