use std::ops::{Deref, DerefMut};

use bson::oid::ObjectId;
use serde::de::DeserializeOwned;

pub struct Collection<T>(pub mongodb::Collection<T>);

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Collection<T> {
    type Target = mongodb::Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Collection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<mongodb::Collection<T>> for Collection<T> {
    fn from(value: mongodb::Collection<T>) -> Self {
        Self(value)
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + Unpin,
{
    pub async fn find_one_by_id(&self, id: ObjectId) -> Result<Option<T>, mongodb::error::Error> {
        self.find_one(
            bson::doc! {
                "_id": id,
            },
            None,
        )
        .await
    }
}

impl<T> Collection<T> {
    pub async fn update_one_by_id(
        &self,
        id: ObjectId,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> Result<mongodb::results::UpdateResult, mongodb::error::Error> {
        self.update_one(
            bson::doc! {
                "_id": id,
            },
            update,
            None,
        )
        .await
    }

    /// Guarded update: the write applies only while the stored document still
    /// matches `guard`, which is how state transitions stay race-safe.
    pub async fn update_one_if(
        &self,
        id: ObjectId,
        mut guard: bson::Document,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> Result<bool, mongodb::error::Error> {
        guard.insert("_id", id);
        self.update_one(guard, update, None)
            .await
            .map(|it| it.matched_count > 0)
    }

    pub async fn delete_one_by_id(&self, id: ObjectId) -> Result<bool, mongodb::error::Error> {
        self.delete_one(
            bson::doc! {
                "_id": id,
            },
            None,
        )
        .await
        .map(|it| it.deleted_count > 0)
    }
}
