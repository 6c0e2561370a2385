use async_trait::async_trait;
use atoll_core::StoreError;
use uuid::Uuid;

use crate::payment::{Payment, PaymentStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::review::{Review, ReviewStatus};

/// Persistence seams for the booking engine.
///
/// Every method that pairs a check with a write (`transition_status`,
/// payment `insert`/`set_status`, review `insert`/`approve_pending`/
/// `delete_pending`) must run the pair as one atomic unit against the
/// backing store, reporting the losing side of a race as
/// `StoreError::Conflict` with the rule text as the message.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError>;

    /// Applies the status transition table under the store's guard and
    /// returns the updated reservation. An edge outside the table fails
    /// with `Conflict`.
    async fn transition_status(
        &self,
        id: Uuid,
        next: ReservationStatus,
    ) -> Result<Reservation, StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Rejects with `Conflict` when the reservation already holds an
    /// APPROVED payment, whatever the status of the new attempt.
    async fn insert(&self, payment: Payment) -> Result<Payment, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn list_by_reservation(&self, reservation_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Stamps `updated_at`. Setting APPROVED still honours the
    /// one-approved-per-reservation invariant.
    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Rejects with `Conflict` when a review by the same user for the same
    /// package already exists, regardless of its status.
    async fn insert(&self, review: Review) -> Result<Review, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Review>, StoreError>;

    async fn list_by_status(&self, status: ReviewStatus) -> Result<Vec<Review>, StoreError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn list_approved_for_package(&self, package_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn find_by_user_and_package(
        &self,
        user_id: Uuid,
        package_id: Uuid,
    ) -> Result<Option<Review>, StoreError>;

    /// PENDING -> APPROVED; anything else is a `Conflict`.
    async fn approve_pending(&self, id: Uuid) -> Result<Review, StoreError>;

    /// Deletes the review iff it is still PENDING.
    async fn delete_pending(&self, id: Uuid) -> Result<(), StoreError>;
}
