use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    app::{ParcelLedger, PaymentJournal, UserDirectory},
    error::Error,
    identity::Identity,
    util::{DecimalString, FormattedDateTime, ObjectIdString},
};

use super::{parcel::PaymentStatus, user::require_admin};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub parcel_id: ObjectId,
    pub payer_email: String,

    pub amount: Decimal,
    pub transaction_id: String,
    pub method: String,

    pub paid_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentResponse {
    pub id: ObjectIdString,

    pub parcel_id: ObjectIdString,
    pub payer_email: String,

    pub amount: DecimalString,
    pub transaction_id: String,
    pub method: String,

    pub paid_at: FormattedDateTime,
}

impl From<PaymentModel> for PaymentResponse {
    fn from(value: PaymentModel) -> Self {
        Self {
            id: value.id.into(),
            parcel_id: value.parcel_id.into(),
            payer_email: value.payer_email,
            amount: value.amount.into(),
            transaction_id: value.transaction_id,
            method: value.method,
            paid_at: value.paid_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentIndexResponse {
    pub payments: Vec<PaymentResponse>,
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct RecordRequest {
    pub parcel_id: ObjectIdString,

    #[validate(email)]
    pub email: String,

    pub amount: DecimalString,

    #[validate(length(min = 1, max = 128))]
    pub transaction_id: String,

    #[validate(length(min = 1, max = 32))]
    pub method: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RecordResponse {
    pub inserted_id: ObjectIdString,
    pub payment: PaymentResponse,
}

/// Journal append and parcel flip are one logical unit: success is reported
/// only when both landed. The append goes first; a parcel that vanishes in
/// between surfaces as a conflict for the caller to reconcile.
#[tracing::instrument(skip_all, fields(transaction_id = %request.transaction_id))]
pub async fn record(
    State(PaymentJournal(payments)): State<PaymentJournal>,
    State(ParcelLedger(parcels)): State<ParcelLedger>,
    Json(request): Json<RecordRequest>,
) -> Result<Json<RecordResponse>, Error> {
    request.validate()?;

    if request.amount.0 <= Decimal::from(0) {
        return Err(Error::InvalidArgument("amount must be greater than zero"))
            .tap_err(|_| tracing::debug!("tried recording a non positive amount"));
    }

    let parcel_id = *request.parcel_id;
    parcels
        .find_by_id(parcel_id)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried paying for a non existing parcel"))?;

    if payments
        .find_by_transaction_id(&request.transaction_id)
        .await?
        .is_some()
    {
        return Err(Error::Conflict("transaction is already recorded"))
            .tap_err(|_| tracing::debug!("tried replaying a payment confirmation"));
    }

    let model = PaymentModel {
        id: ObjectId::new(),
        parcel_id,
        payer_email: request.email,
        amount: request.amount.into(),
        transaction_id: request.transaction_id,
        method: request.method,
        paid_at: OffsetDateTime::now_utc().into(),
    };
    payments.insert(&model).await?;

    let marked = parcels
        .set_payment_status(parcel_id, PaymentStatus::Paid)
        .await?;
    if !marked {
        return Err(Error::Conflict(
            "payment recorded but the parcel is gone; it was not marked paid",
        ));
    }

    Ok(Json(RecordResponse {
        inserted_id: model.id.into(),
        payment: model.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexQuery {
    pub email: Option<String>,
}

/// Payer-scoped listing; the full journal is reserved for admins.
pub async fn index(
    State(PaymentJournal(payments)): State<PaymentJournal>,
    State(UserDirectory(users)): State<UserDirectory>,
    identity: Identity,
    Query(query): Query<IndexQuery>,
) -> Result<Json<PaymentIndexResponse>, Error> {
    match query.email.as_deref() {
        Some(email) if email != identity.email => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried listing another payer's payments"));
        }
        Some(_) => {}
        None => {
            require_admin(users.as_ref(), &identity).await?;
        }
    }

    let payments = payments.list_by_payer(query.email.as_deref()).await?;

    Ok(Json(PaymentIndexResponse {
        payments: payments.into_iter().map(Into::into).collect(),
    }))
}
