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
    app::UserDirectory,
    error::Error,
    identity::Identity,
    store::UserStore,
    util::{parse_object_id, FormattedDateTime, ObjectIdString},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,

    #[serde(default)]
    pub role: UserRole,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Rider,
    Admin,
}

/// Resolves the caller against the directory and demands the admin role.
/// Every privileged operation funnels through here.
pub async fn require_admin(users: &dyn UserStore, identity: &Identity) -> Result<UserModel, Error> {
    let user = users
        .find_by_email(&identity.email)
        .await?
        .ok_or(Error::Forbidden)
        .tap_err(|_| tracing::debug!("caller has no directory entry"))?;

    match user.role {
        UserRole::Admin => Ok(user),
        UserRole::User | UserRole::Rider => {
            Err(Error::Forbidden).tap_err(|_| tracing::debug!("caller is not an admin"))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub id: ObjectIdString,
    pub email: String,
    pub role: UserRole,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            email: value.email,
            role: value.role,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateUserResponse {
    pub inserted: bool,
    pub user: UserResponse,
}

/// First-sign-in upsert: a known email comes back untouched, anything else is
/// inserted with the default role.
pub async fn create(
    State(UserDirectory(users)): State<UserDirectory>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, Error> {
    request.validate()?;

    if let Some(existing) = users.find_by_email(&request.email).await? {
        return Ok(Json(CreateUserResponse {
            inserted: false,
            user: existing.into(),
        }));
    }

    let model = UserModel {
        id: ObjectId::new(),
        email: request.email,
        role: UserRole::User,
        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };
    users.insert(&model).await?;

    Ok(Json(CreateUserResponse {
        inserted: true,
        user: model.into(),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoleResponse {
    pub role: UserRole,
}

pub async fn resolve_role(
    State(UserDirectory(users)): State<UserDirectory>,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, Error> {
    let user = users
        .find_by_email(&email)
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(RoleResponse { role: user.role }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

#[tracing::instrument(skip_all, fields(id = %user_id))]
pub async fn set_role(
    State(UserDirectory(users)): State<UserDirectory>,
    identity: Identity,
    Path(user_id): Path<String>,
    Json(request): Json<SetRoleRequest>,
) -> Result<Json<RoleResponse>, Error> {
    require_admin(users.as_ref(), &identity).await?;

    let user_id = parse_object_id(&user_id)?;

    match request.role {
        UserRole::Admin | UserRole::User => {}
        UserRole::Rider => {
            // rider is earned through application approval, never granted here
            return Err(Error::InvalidArgument(
                "the rider role is granted through rider approval",
            ))
            .tap_err(|_| tracing::debug!("tried granting the rider role directly"));
        }
    }

    let updated = users.set_role(user_id, request.role).await?;
    if !updated {
        return Err(Error::NoResource)
            .tap_err(|_| tracing::debug!("tried changing the role of a non existing user"));
    }

    Ok(Json(RoleResponse { role: request.role }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchQuery {
    pub email: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchEntry {
    pub email: String,
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchResponse {
    pub users: Vec<SearchEntry>,
}

pub async fn search(
    State(UserDirectory(users)): State<UserDirectory>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, Error> {
    let fragment = query.email.unwrap_or_default();
    let limit = query.limit.unwrap_or(10).min(50);

    let users = users.search_by_email(&fragment, limit).await?;

    if users.is_empty() {
        // callers tell "no match" apart from an empty page only via this error
        return Err(Error::NoResource);
    }

    Ok(Json(SearchResponse {
        users: users
            .into_iter()
            .map(|it| SearchEntry {
                email: it.email,
                role: it.role,
            })
            .collect(),
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

    use super::{CreateUserRequest, SearchQuery, SetRoleRequest, UserRole};

    #[tokio::test]
    async fn test_first_sign_in_inserts_once() {
        let bootstrap = bootstrap().await;

        let Json(first) = super::create(
            bootstrap.users(),
            Json(CreateUserRequest {
                email: "u@x.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(first.inserted);
        assert_eq!(first.user.role, UserRole::User);

        let Json(second) = super::create(
            bootstrap.users(),
            Json(CreateUserRequest {
                email: "u@x.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!second.inserted);
        assert_eq!(first.user.id, second.user.id);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_email() {
        let bootstrap = bootstrap().await;

        let err = super::create(
            bootstrap.users(),
            Json(CreateUserRequest {
                email: "not-an-email".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::ValidationError(..));
    }

    #[tokio::test]
    async fn test_resolve_role() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("u@x.com", UserRole::User).await;

        let Json(role) = super::resolve_role(bootstrap.users(), Path("u@x.com".to_string()))
            .await
            .unwrap();
        assert_eq!(role.role, UserRole::User);

        let err = super::resolve_role(bootstrap.users(), Path("missing@x.com".to_string()))
            .await
            .unwrap_err();
        assert_matches!(err, Error::NoResource);
    }

    #[tokio::test]
    async fn test_set_role_requires_admin() {
        let bootstrap = bootstrap().await;
        let target = bootstrap.seed_user("target@x.com", UserRole::User).await;
        bootstrap.seed_user("plain@x.com", UserRole::User).await;

        let err = super::set_role(
            bootstrap.users(),
            bootstrap.identity("plain@x.com"),
            Path(target.id.to_string()),
            Json(SetRoleRequest {
                role: UserRole::Admin,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Forbidden);
    }

    #[tokio::test]
    async fn test_set_role_as_admin() {
        let bootstrap = bootstrap().await;
        let target = bootstrap.seed_user("target@x.com", UserRole::User).await;

        for role in [UserRole::Admin, UserRole::User] {
            let Json(response) = super::set_role(
                bootstrap.users(),
                bootstrap.admin(),
                Path(target.id.to_string()),
                Json(SetRoleRequest { role }),
            )
            .await
            .unwrap();
            assert_eq!(response.role, role);

            let Json(resolved) =
                super::resolve_role(bootstrap.users(), Path("target@x.com".to_string()))
                    .await
                    .unwrap();
            assert_eq!(resolved.role, role);
        }
    }

    #[tokio::test]
    async fn test_set_role_never_grants_rider() {
        let bootstrap = bootstrap().await;
        let target = bootstrap.seed_user("target@x.com", UserRole::User).await;

        let err = super::set_role(
            bootstrap.users(),
            bootstrap.admin(),
            Path(target.id.to_string()),
            Json(SetRoleRequest {
                role: UserRole::Rider,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(..));
    }

    #[tokio::test]
    async fn test_set_role_missing_target() {
        let bootstrap = bootstrap().await;

        let err = super::set_role(
            bootstrap.users(),
            bootstrap.admin(),
            Path(ObjectId::new().to_string()),
            Json(SetRoleRequest {
                role: UserRole::User,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NoResource);

        let err = super::set_role(
            bootstrap.users(),
            bootstrap.admin(),
            Path("garbage".to_string()),
            Json(SetRoleRequest {
                role: UserRole::User,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::InvalidId(..));
    }

    #[tokio::test]
    async fn test_search_projects_email_and_role() {
        let bootstrap = bootstrap().await;
        bootstrap.seed_user("Anna@x.com", UserRole::User).await;
        bootstrap.seed_user("annabel@x.com", UserRole::Rider).await;
        bootstrap.seed_user("bob@x.com", UserRole::User).await;

        let Json(response) = super::search(
            bootstrap.users(),
            Query(SearchQuery {
                email: Some("ANNA".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.users.len(), 2);
        assert!(response
            .users
            .iter()
            .any(|it| it.email == "annabel@x.com" && it.role == UserRole::Rider));

        let Json(limited) = super::search(
            bootstrap.users(),
            Query(SearchQuery {
                email: Some("anna".to_string()),
                limit: Some(1),
            }),
        )
        .await
        .unwrap();
        assert_eq!(limited.users.len(), 1);
    }

    #[tokio::test]
    async fn test_search_with_no_match_is_an_error() {
        let bootstrap = bootstrap().await;

        let err = super::search(
            bootstrap.users(),
            Query(SearchQuery {
                email: Some("nobody".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::NoResource);
    }
}
