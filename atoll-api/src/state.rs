use std::sync::Arc;

use atoll_booking::{PaymentProcessor, ReservationLifecycle, ReviewEngine};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationLifecycle>,
    pub payments: Arc<PaymentProcessor>,
    pub reviews: Arc<ReviewEngine>,
    pub auth: AuthConfig,
}
