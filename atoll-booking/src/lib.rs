pub mod payment;
pub mod repository;
pub mod reservation;
pub mod review;

pub use payment::{
    AuthorizePayment, Payment, PaymentMethod, PaymentPolicy, PaymentProcessor, PaymentStatus,
};
pub use reservation::{Reservation, ReservationLifecycle, ReservationStatus, Traveler};
pub use review::{Review, ReviewEngine, ReviewEntry, ReviewStatus};
