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
    app::{RiderRegistry, UserDirectory},
    error::Error,
    identity::Identity,
    store::{RiderStore, UserStore},
    util::{parse_object_id, FormattedDateTime, ObjectIdString},
};

use super::user::{require_admin, UserRole};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RiderModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub email: String,
    pub district: String,

    pub status: RiderStatus,
    pub work_status: WorkStatus,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    Pending,
    Active,
    Rejected,
    Deactivated,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Available,
    InDelivery,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub email: String,
    pub district: String,

    pub status: RiderStatus,
    pub work_status: WorkStatus,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<RiderModel> for RiderResponse {
    fn from(value: RiderModel) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            district: value.district,
            status: value.status,
            work_status: value.work_status,
            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiderIndexResponse {
    pub riders: Vec<RiderResponse>,
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct ApplyRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 64))]
    pub district: String,
}

/// Several pending applications may share an email; only approval is
/// exclusive.
pub async fn apply(
    State(RiderRegistry(riders)): State<RiderRegistry>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<RiderResponse>, Error> {
    request.validate()?;

    let model = RiderModel {
        id: ObjectId::new(),
        name: request.name,
        email: request.email,
        district: request.district,
        status: RiderStatus::Pending,
        work_status: WorkStatus::Available,
        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };
    riders.insert(&model).await?;

    Ok(Json(model.into()))
}

pub async fn list_pending(
    State(RiderRegistry(riders)): State<RiderRegistry>,
) -> Result<Json<RiderIndexResponse>, Error> {
    let riders = riders.list_by_status(RiderStatus::Pending).await?;

    Ok(Json(RiderIndexResponse {
        riders: riders.into_iter().map(Into::into).collect(),
    }))
}

pub async fn list_active(
    State(RiderRegistry(riders)): State<RiderRegistry>,
    State(UserDirectory(users)): State<UserDirectory>,
    identity: Identity,
) -> Result<Json<RiderIndexResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let riders = riders.list_by_status(RiderStatus::Active).await?;

    Ok(Json(RiderIndexResponse {
        riders: riders.into_iter().map(Into::into).collect(),
    }))
}

/// Settles a pending application. Approval also grants the `rider` role to
/// the user sharing the applicant's email; this is the only place that role
/// is handed out.
pub(crate) async fn decide_application(
    users: &dyn UserStore,
    riders: &dyn RiderStore,
    rider_id: ObjectId,
    outcome: RiderStatus,
) -> Result<RiderModel, Error> {
    let rider = riders
        .find_by_id(rider_id)
        .await?
        .ok_or(Error::NoResource)?;

    let moved = riders
        .transition_status(rider_id, &[RiderStatus::Pending], outcome)
        .await?;
    if !moved {
        return Err(Error::Conflict("rider application is already decided"))
            .tap_err(|_| tracing::debug!("tried deciding a non pending rider"));
    }

    if let RiderStatus::Active = outcome {
        // role elevation follows only once the transition is confirmed
        let promoted = users
            .set_role_by_email(&rider.email, UserRole::Rider)
            .await?;
        if !promoted {
            return Err(Error::Conflict("rider approved but no user to promote"))
                .tap_err(|_| tracing::debug!("approved rider has no directory entry"));
        }
    }

    riders.find_by_id(rider_id).await?.ok_or(Error::NoResource)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecideRequest {
    pub status: String,
}

#[tracing::instrument(skip_all, fields(id = %rider_id))]
pub async fn decide(
    State(UserDirectory(users)): State<UserDirectory>,
    State(RiderRegistry(riders)): State<RiderRegistry>,
    identity: Identity,
    Path(rider_id): Path<String>,
    Json(request): Json<DecideRequest>,
) -> Result<Json<RiderResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let rider_id = parse_object_id(&rider_id)?;

    let outcome = match request.status.as_str() {
        "active" => RiderStatus::Active,
        "rejected" => RiderStatus::Rejected,
        _ => {
            return Err(Error::InvalidArgument(
                "status must be either active or rejected",
            ))
        }
    };

    let rider = decide_application(users.as_ref(), riders.as_ref(), rider_id, outcome).await?;

    Ok(Json(rider.into()))
}

#[tracing::instrument(skip_all, fields(id = %rider_id))]
pub async fn approve(
    State(UserDirectory(users)): State<UserDirectory>,
    State(RiderRegistry(riders)): State<RiderRegistry>,
    identity: Identity,
    Path(rider_id): Path<String>,
) -> Result<Json<RiderResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let rider_id = parse_object_id(&rider_id)?;

    let rider =
        decide_application(users.as_ref(), riders.as_ref(), rider_id, RiderStatus::Active).await?;

    Ok(Json(rider.into()))
}

#[tracing::instrument(skip_all, fields(id = %rider_id))]
pub async fn reject(
    State(UserDirectory(users)): State<UserDirectory>,
    State(RiderRegistry(riders)): State<RiderRegistry>,
    identity: Identity,
    Path(rider_id): Path<String>,
) -> Result<Json<RiderResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let rider_id = parse_object_id(&rider_id)?;

    let rider = riders
        .find_by_id(rider_id)
        .await?
        .ok_or(Error::NoResource)?;

    match rider.status {
        // re-rejecting is a no-op success
        RiderStatus::Rejected => return Ok(Json(rider.into())),
        RiderStatus::Deactivated => {
            return Err(Error::Conflict("rider is deactivated"))
                .tap_err(|_| tracing::debug!("tried rejecting a deactivated rider"));
        }
        RiderStatus::Pending | RiderStatus::Active => {}
    }

    let moved = riders
        .transition_status(
            rider_id,
            &[RiderStatus::Pending, RiderStatus::Active],
            RiderStatus::Rejected,
        )
        .await?;
    if !moved {
        return Err(Error::Conflict("rider application is already decided"));
    }

    riders
        .find_by_id(rider_id)
        .await?
        .ok_or(Error::NoResource)
        .map(|it| Json(it.into()))
}

/// Deactivation ends the rider's service but deliberately leaves the linked
/// user's role untouched.
#[tracing::instrument(skip_all, fields(id = %rider_id))]
pub async fn deactivate(
    State(UserDirectory(users)): State<UserDirectory>,
    State(RiderRegistry(riders)): State<RiderRegistry>,
    identity: Identity,
    Path(rider_id): Path<String>,
) -> Result<Json<RiderResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let rider_id = parse_object_id(&rider_id)?;

    riders
        .find_by_id(rider_id)
        .await?
        .ok_or(Error::NoResource)?;

    let moved = riders
        .transition_status(
            rider_id,
            &[RiderStatus::Active],
            RiderStatus::Deactivated,
        )
        .await?;
    if !moved {
        return Err(Error::Conflict("only an active rider can be deactivated"))
            .tap_err(|_| tracing::debug!("tried deactivating a non active rider"));
    }

    riders
        .find_by_id(rider_id)
        .await?
        .ok_or(Error::NoResource)
        .map(|it| Json(it.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AvailableQuery {
    pub district: Option<String>,
}

/// Flat district match; eligibility (active, not already delivering) is the
/// caller's concern.
pub async fn list_available(
    State(RiderRegistry(riders)): State<RiderRegistry>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<RiderIndexResponse>, Error> {
    let district = query
        .district
        .ok_or(Error::InvalidArgument("district query parameter is required"))?;

    let riders = riders.list_by_district(&district).await?;

    Ok(Json(RiderIndexResponse {
        riders: riders.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{
        extract::{Path, Query},
        Json,
    };
    use bson::oid::ObjectId;

    use crate::{api::v1::tests::bootstrap, error::Error};

    use super::{
        ApplyRequest, AvailableQuery, DecideRequest, RiderStatus, UserRole, WorkStatus,
    };

    async fn apply(
        bootstrap: &crate::api::v1::tests::Bootstrap,
        email: &str,
        district: &str,
    ) -> super::RiderResponse {
        let Json(rider) = super::apply(
            bootstrap.riders(),
            Json(ApplyRequest {
                name: "A".to_string(),
                email: email.to_string(),
                district: district.to_string(),
            }),
        )
        .await
        .unwrap();
        rider
    }

    #[tokio::test]
    async fn test_apply_lands_in_pending() {
        let bootstrap = bootstrap().await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;
        assert_eq!(rider.status, RiderStatus::Pending);
        assert_eq!(rider.work_status, WorkStatus::Available);

        let Json(pending) = super::list_pending(bootstrap.riders()).await.unwrap();
        assert!(pending.riders.iter().any(|it| it.id == rider.id));
    }

    #[tokio::test]
    async fn test_approval_promotes_the_user() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("a@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let Json(decided) = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "active".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(decided.status, RiderStatus::Active);

        let Json(role) = super::super::user::resolve_role(
            bootstrap.users(),
            Path("a@x.com".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(role.role, UserRole::Rider);

        let Json(pending) = super::list_pending(bootstrap.riders()).await.unwrap();
        assert!(pending.riders.is_empty());

        let Json(active) =
            super::list_active(bootstrap.riders(), bootstrap.users(), bootstrap.admin())
                .await
                .unwrap();
        assert!(active.riders.iter().any(|it| it.id == rider.id));
    }

    #[tokio::test]
    async fn test_rejection_leaves_the_user_role_alone() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("a@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let Json(decided) = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "rejected".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(decided.status, RiderStatus::Rejected);

        let Json(role) = super::super::user::resolve_role(
            bootstrap.users(),
            Path("a@x.com".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(role.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_decide_twice_conflicts() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("a@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let _ = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "active".to_string(),
            }),
        )
        .await
        .unwrap();

        let err = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "rejected".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Conflict(..));
    }

    #[tokio::test]
    async fn test_decide_rejects_unknown_outcome() {
        let bootstrap = bootstrap().await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let err = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "deactivated".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(..));
    }

    #[tokio::test]
    async fn test_decide_missing_rider() {
        let bootstrap = bootstrap().await;

        let err = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(ObjectId::new().to_string()),
            Json(DecideRequest {
                status: "active".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NoResource);
    }

    #[tokio::test]
    async fn test_decide_requires_admin() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("plain@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let err = super::decide(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.identity("plain@x.com"),
            Path(rider.id.to_string()),
            Json(DecideRequest {
                status: "active".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    async fn test_approve_alias() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("a@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let Json(approved) = super::approve(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(approved.status, RiderStatus::Active);
    }

    #[tokio::test]
    async fn test_reject_is_idempotent() {
        let bootstrap = bootstrap().await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let Json(first) = super::reject(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(first.status, RiderStatus::Rejected);

        let Json(second) = super::reject(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(second.status, RiderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_deactivate_requires_active() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("a@x.com", UserRole::User).await;

        let rider = apply(&bootstrap, "a@x.com", "D1").await;

        let err = super::deactivate(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Conflict(..));

        let _ = super::approve(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap();

        let Json(deactivated) = super::deactivate(
            bootstrap.users(),
            bootstrap.riders(),
            bootstrap.admin(),
            Path(rider.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(deactivated.status, RiderStatus::Deactivated);

        // deactivation does not claw the rider role back
        let Json(role) = super::super::user::resolve_role(
            bootstrap.users(),
            Path("a@x.com".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(role.role, UserRole::Rider);
    }

    #[tokio::test]
    async fn test_list_active_requires_admin() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("plain@x.com", UserRole::User).await;

        let err = super::list_active(
            bootstrap.riders(),
            bootstrap.users(),
            bootstrap.identity("plain@x.com"),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    async fn test_available_is_a_flat_district_match() {
        let bootstrap = bootstrap().await;

        let in_district = apply(&bootstrap, "a@x.com", "D1").await;
        let _elsewhere = apply(&bootstrap, "b@x.com", "D2").await;

        let Json(available) = super::list_available(
            bootstrap.riders(),
            Query(AvailableQuery {
                district: Some("D1".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(available.riders.len(), 1);
        assert_eq!(available.riders[0].id, in_district.id);

        let err = super::list_available(bootstrap.riders(), Query(AvailableQuery { district: None }))
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(..));
    }
}
