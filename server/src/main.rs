use std::net::SocketAddr;

use axum::{http::Uri, routing, Router};
use delivery::{app::AppState, error::Error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "delivery=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();

    let app = Router::new()
        .route("/", routing::get(root))
        .nest(
            "/users",
            Router::new()
                .route("/", routing::post(delivery::api::v1::user::create))
                .route("/search", routing::get(delivery::api::v1::user::search))
                .route(
                    "/:key/role",
                    routing::get(delivery::api::v1::user::resolve_role)
                        .patch(delivery::api::v1::user::set_role),
                ),
        )
        .nest(
            "/parcels",
            Router::new()
                .route(
                    "/",
                    routing::get(delivery::api::v1::parcel::index)
                        .post(delivery::api::v1::parcel::create),
                )
                .route(
                    "/:id",
                    routing::get(delivery::api::v1::parcel::show)
                        .delete(delivery::api::v1::parcel::delete),
                )
                .route("/:id/assign", routing::patch(delivery::api::v1::parcel::assign)),
        )
        .nest(
            "/riders",
            Router::new()
                .route("/", routing::post(delivery::api::v1::rider::apply))
                .route(
                    "/pending",
                    routing::get(delivery::api::v1::rider::list_pending),
                )
                .route(
                    "/active",
                    routing::get(delivery::api::v1::rider::list_active),
                )
                .route(
                    "/available",
                    routing::get(delivery::api::v1::rider::list_available),
                )
                .route(
                    "/:id/status",
                    routing::patch(delivery::api::v1::rider::decide),
                )
                .route(
                    "/approve/:id",
                    routing::patch(delivery::api::v1::rider::approve),
                )
                .route(
                    "/reject/:id",
                    routing::patch(delivery::api::v1::rider::reject),
                )
                .route(
                    "/deactivate/:id",
                    routing::patch(delivery::api::v1::rider::deactivate),
                ),
        )
        .nest(
            "/payments",
            Router::new().route(
                "/",
                routing::get(delivery::api::v1::payment::index)
                    .post(delivery::api::v1::payment::record),
            ),
        )
        .fallback(fallback)
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

async fn root() -> &'static str {
    "delivery server is running"
}

async fn fallback(uri: Uri) -> Error {
    Error::NotFound(uri)
}
