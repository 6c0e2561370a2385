use std::net::SocketAddr;
use std::sync::Arc;

use atoll_api::{app, state::{AppState, AuthConfig}};
use atoll_booking::{PaymentPolicy, PaymentProcessor, ReservationLifecycle, ReviewEngine};
use atoll_store::PgStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atoll_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = atoll_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Atoll API on port {}", config.server.port);

    let store = Arc::new(
        PgStore::connect(&config.database.url)
            .await
            .expect("Failed to connect to Postgres"),
    );
    store.migrate().await.expect("Failed to run migrations");

    let reservations = Arc::new(ReservationLifecycle::new(store.clone(), store.clone()));
    let payments = Arc::new(PaymentProcessor::new(
        store.clone(),
        store.clone(),
        PaymentPolicy { allow_retry: config.business_rules.allow_payment_retry },
    ));
    let reviews = Arc::new(ReviewEngine::new(store.clone(), store.clone(), store.clone()));

    let app_state = AppState {
        reservations,
        payments,
        reviews,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
