use async_trait::async_trait;
use bson::oid::ObjectId;
use mongodb::options::FindOptions;

use crate::{
    api::v1::{
        parcel::{AssignedRider, DeliveryStatus, ParcelModel, PaymentStatus},
        payment::PaymentModel,
        rider::{RiderModel, RiderStatus, WorkStatus},
        user::{UserModel, UserRole},
    },
    migrate::MigrateModel,
    mongo_ext::Collection,
};

use super::{ParcelStore, PaymentStore, RiderStore, StoreError, UserStore};

/// Production store binding over the original deployment's collections.
pub struct MongoStore {
    pub(crate) client: mongodb::Client,

    pub(crate) migrations: Collection<MigrateModel>,
    pub(crate) users: Collection<UserModel>,
    pub(crate) riders: Collection<RiderModel>,
    pub(crate) parcels: Collection<ParcelModel>,
    pub(crate) payments: Collection<PaymentModel>,
}

impl MongoStore {
    pub async fn new(mongo_url: &str, database_name: &str) -> Result<Self, StoreError> {
        let options = mongodb::options::ClientOptions::parse(mongo_url).await?;
        let client = mongodb::Client::with_options(options)?;

        let db = client.database(database_name);

        Ok(Self {
            client,
            migrations: db.collection("migrations").into(),
            users: db.collection("users").into(),
            riders: db.collection("riders").into(),
            parcels: db.collection("parcel").into(),
            payments: db.collection("payments").into(),
        })
    }
}

async fn collect<T>(mut cursor: mongodb::Cursor<T>) -> Result<Vec<T>, StoreError>
where
    T: serde::de::DeserializeOwned + Send + Sync + Unpin,
{
    let mut items = vec![];

    while cursor.advance().await? {
        items.push(cursor.deserialize_current()?);
    }

    Ok(items)
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert(&self, user: &UserModel) -> Result<(), StoreError> {
        self.users.insert_one(user, None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<UserModel>, StoreError> {
        Ok(self.users.find_one_by_id(id).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, StoreError> {
        Ok(self
            .users
            .find_one(
                bson::doc! {
                    "email": email
                },
                None,
            )
            .await?)
    }

    async fn search_by_email(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<UserModel>, StoreError> {
        let cursor = self
            .users
            .find(
                bson::doc! {
                    "email": { "$regex": fragment, "$options": "i" }
                },
                FindOptions::builder().limit(limit as i64).build(),
            )
            .await?;

        collect(cursor).await
    }

    async fn set_role(&self, id: ObjectId, role: UserRole) -> Result<bool, StoreError> {
        let result = self
            .users
            .update_one_by_id(
                id,
                bson::doc! {
                    "$set": {
                        "role": bson::to_bson(&role)?,
                        "updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    async fn set_role_by_email(&self, email: &str, role: UserRole) -> Result<bool, StoreError> {
        let result = self
            .users
            .update_one(
                bson::doc! {
                    "email": email
                },
                bson::doc! {
                    "$set": {
                        "role": bson::to_bson(&role)?,
                        "updated_at": bson::DateTime::now(),
                    }
                },
                None,
            )
            .await?;

        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl RiderStore for MongoStore {
    async fn insert(&self, rider: &RiderModel) -> Result<(), StoreError> {
        self.riders.insert_one(rider, None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<RiderModel>, StoreError> {
        Ok(self.riders.find_one_by_id(id).await?)
    }

    async fn list_by_status(&self, status: RiderStatus) -> Result<Vec<RiderModel>, StoreError> {
        let cursor = self
            .riders
            .find(
                bson::doc! {
                    "status": bson::to_bson(&status)?
                },
                None,
            )
            .await?;

        collect(cursor).await
    }

    async fn list_by_district(&self, district: &str) -> Result<Vec<RiderModel>, StoreError> {
        let cursor = self
            .riders
            .find(
                bson::doc! {
                    "district": district
                },
                None,
            )
            .await?;

        collect(cursor).await
    }

    async fn transition_status(
        &self,
        id: ObjectId,
        expected: &[RiderStatus],
        next: RiderStatus,
    ) -> Result<bool, StoreError> {
        let expected = expected
            .iter()
            .map(bson::to_bson)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .riders
            .update_one_if(
                id,
                bson::doc! {
                    "status": { "$in": expected }
                },
                bson::doc! {
                    "$set": {
                        "status": bson::to_bson(&next)?,
                        "updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?)
    }

    async fn transition_work_status(
        &self,
        id: ObjectId,
        expected: WorkStatus,
        next: WorkStatus,
    ) -> Result<bool, StoreError> {
        Ok(self
            .riders
            .update_one_if(
                id,
                bson::doc! {
                    "work_status": bson::to_bson(&expected)?
                },
                bson::doc! {
                    "$set": {
                        "work_status": bson::to_bson(&next)?,
                        "updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?)
    }
}

#[async_trait]
impl ParcelStore for MongoStore {
    async fn insert(&self, parcel: &ParcelModel) -> Result<(), StoreError> {
        self.parcels.insert_one(parcel, None).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<ParcelModel>, StoreError> {
        Ok(self.parcels.find_one_by_id(id).await?)
    }

    async fn list_by_owner(
        &self,
        owner_email: Option<&str>,
    ) -> Result<Vec<ParcelModel>, StoreError> {
        let filter = match owner_email {
            Some(email) => bson::doc! { "owner_email": email },
            None => bson::doc! {},
        };

        let cursor = self
            .parcels
            .find(
                filter,
                FindOptions::builder()
                    .sort(bson::doc! { "creation_date": -1 })
                    .build(),
            )
            .await?;

        collect(cursor).await
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool, StoreError> {
        Ok(self.parcels.delete_one_by_id(id).await?)
    }

    async fn assign_rider_if_created(
        &self,
        id: ObjectId,
        rider: &AssignedRider,
    ) -> Result<bool, StoreError> {
        Ok(self
            .parcels
            .update_one_if(
                id,
                bson::doc! {
                    "delivery_status": bson::to_bson(&DeliveryStatus::Created)?
                },
                bson::doc! {
                    "$set": {
                        "delivery_status": bson::to_bson(&DeliveryStatus::RiderAssigned)?,
                        "assigned_rider_id": rider.id,
                        "assigned_rider_name": rider.name.as_str(),
                        "assigned_rider_email": rider.email.as_str(),
                    }
                },
            )
            .await?)
    }

    async fn set_payment_status(
        &self,
        id: ObjectId,
        status: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let result = self
            .parcels
            .update_one_by_id(
                id,
                bson::doc! {
                    "$set": {
                        "paymentStatus": bson::to_bson(&status)?
                    }
                },
            )
            .await?;

        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl PaymentStore for MongoStore {
    async fn insert(&self, payment: &PaymentModel) -> Result<(), StoreError> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentModel>, StoreError> {
        Ok(self
            .payments
            .find_one(
                bson::doc! {
                    "transaction_id": transaction_id
                },
                None,
            )
            .await?)
    }

    async fn list_by_payer(
        &self,
        payer_email: Option<&str>,
    ) -> Result<Vec<PaymentModel>, StoreError> {
        let filter = match payer_email {
            Some(email) => bson::doc! { "payer_email": email },
            None => bson::doc! {},
        };

        let cursor = self
            .payments
            .find(
                filter,
                FindOptions::builder()
                    .sort(bson::doc! { "paid_at": -1 })
                    .build(),
            )
            .await?;

        collect(cursor).await
    }
}
