use axum::{
    extract::{Path, Query, State},
    Json,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    app::{ParcelLedger, RiderRegistry, UserDirectory},
    error::Error,
    identity::Identity,
    util::{parse_object_id, FormattedDateTime, ObjectIdString},
};

use super::{
    rider::{RiderStatus, WorkStatus},
    user::require_admin,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParcelModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub owner_email: String,
    pub destination_district: String,
    pub creation_date: bson::DateTime,

    pub delivery_status: DeliveryStatus,

    // stored under the original deployment's camel-case field name
    #[serde(rename = "paymentStatus")]
    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub assigned_rider_id: Option<ObjectId>,
    #[serde(default)]
    pub assigned_rider_name: Option<String>,
    #[serde(default)]
    pub assigned_rider_email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Created,
    RiderAssigned,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// Rider identity stamped onto a parcel at assignment time.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignedRider {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParcelResponse {
    pub id: ObjectIdString,

    pub owner_email: String,
    pub destination_district: String,
    pub creation_date: FormattedDateTime,

    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,

    pub assigned_rider_id: Option<ObjectIdString>,
    pub assigned_rider_name: Option<String>,
    pub assigned_rider_email: Option<String>,
}

impl From<ParcelModel> for ParcelResponse {
    fn from(value: ParcelModel) -> Self {
        Self {
            id: value.id.into(),
            owner_email: value.owner_email,
            destination_district: value.destination_district,
            creation_date: value.creation_date.into(),
            delivery_status: value.delivery_status,
            payment_status: value.payment_status,
            assigned_rider_id: value.assigned_rider_id.map(Into::into),
            assigned_rider_name: value.assigned_rider_name,
            assigned_rider_email: value.assigned_rider_email,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParcelIndexResponse {
    pub parcels: Vec<ParcelResponse>,
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 64))]
    pub destination_district: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateResponse {
    pub inserted_id: ObjectIdString,
    pub parcel: ParcelResponse,
}

pub async fn create(
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, Error> {
    request.validate()?;

    let model = ParcelModel {
        id: ObjectId::new(),
        owner_email: request.email,
        destination_district: request.destination_district,
        creation_date: OffsetDateTime::now_utc().into(),
        delivery_status: DeliveryStatus::Created,
        payment_status: PaymentStatus::Unpaid,
        assigned_rider_id: None,
        assigned_rider_name: None,
        assigned_rider_email: None,
    };
    parcels.insert(&model).await?;

    Ok(Json(CreateResponse {
        inserted_id: model.id.into(),
        parcel: model.into(),
    }))
}

pub async fn show(
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    Path(parcel_id): Path<String>,
) -> Result<Json<ParcelResponse>, Error> {
    let parcel_id = parse_object_id(&parcel_id)?;

    let parcel = parcels
        .find_by_id(parcel_id)
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(parcel.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexQuery {
    pub email: Option<String>,
}

/// Owner-scoped listing; without the filter the listing is system-wide and
/// reserved for admins.
pub async fn index(
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    State(UserDirectory(users)): State<UserDirectory>,
    identity: Identity,
    Query(query): Query<IndexQuery>,
) -> Result<Json<ParcelIndexResponse>, Error> {
    match query.email.as_deref() {
        Some(email) if email != identity.email => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried listing another owner's parcels"));
        }
        Some(_) => {}
        None => {
            require_admin(users.as_ref(), &identity).await?;
        }
    }

    let parcels = parcels.list_by_owner(query.email.as_deref()).await?;

    Ok(Json(ParcelIndexResponse {
        parcels: parcels.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignRequest {
    pub rider_id: ObjectIdString,
}

/// Two-step logical unit: the parcel transition is the primary effect, the
/// rider's work-status flip follows only once it has landed. Either guard
/// failing surfaces a conflict so the caller can reconcile.
#[tracing::instrument(skip_all, fields(id = %parcel_id))]
pub async fn assign(
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    State(RiderRegistry(riders)): State<RiderRegistry>,
    State(UserDirectory(users)): State<UserDirectory>,
    identity: Identity,
    Path(parcel_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<ParcelResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let parcel_id = parse_object_id(&parcel_id)?;

    let rider = riders
        .find_by_id(*request.rider_id)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried assigning a non existing rider"))?;

    match rider.status {
        RiderStatus::Active => {}
        RiderStatus::Pending | RiderStatus::Rejected | RiderStatus::Deactivated => {
            return Err(Error::Conflict("rider is not active"))
                .tap_err(|_| tracing::debug!("tried assigning a non active rider"));
        }
    }

    parcels
        .find_by_id(parcel_id)
        .await?
        .ok_or(Error::NoResource)?;

    let assigned = parcels
        .assign_rider_if_created(
            parcel_id,
            &AssignedRider {
                id: rider.id,
                name: rider.name.clone(),
                email: rider.email.clone(),
            },
        )
        .await?;
    if !assigned {
        return Err(Error::Conflict("parcel already has a rider assigned"));
    }

    let reserved = riders
        .transition_work_status(rider.id, WorkStatus::Available, WorkStatus::InDelivery)
        .await?;
    if !reserved {
        // parcel moved but the rider was taken in between; surfaced, not hidden
        return Err(Error::Conflict("rider is already in a delivery"));
    }

    parcels
        .find_by_id(parcel_id)
        .await?
        .ok_or(Error::NoResource)
        .map(|it| Json(it.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Removal is unconditional, in-flight deliveries included.
#[tracing::instrument(skip_all, fields(id = %parcel_id))]
pub async fn delete(
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    Path(parcel_id): Path<String>,
) -> Result<Json<DeleteResponse>, Error> {
    let parcel_id = parse_object_id(&parcel_id)?;

    let deleted = parcels.delete_by_id(parcel_id).await?;
    if !deleted {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried deleting a non existing parcel"));
    }

    Ok(Json(DeleteResponse { deleted: true }))
}
