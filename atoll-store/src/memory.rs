use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use atoll_booking::repository::{PaymentRepository, ReservationRepository, ReviewRepository};
use atoll_booking::{
    Payment, PaymentStatus, Reservation, ReservationStatus, Review, ReviewStatus,
};
use atoll_catalog::{Catalog, TravelPackage};
use atoll_core::StoreError;
use chrono::Utc;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    packages: HashMap<Uuid, TravelPackage>,
    reservations: HashMap<Uuid, Reservation>,
    payments: HashMap<Uuid, Payment>,
    reviews: HashMap<Uuid, Review>,
}

/// In-memory backing store. A single mutex guards every table, so each
/// repository call runs its check and its write as one atomic unit — the
/// same guarantee the Postgres store gets from its unique indexes.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test/dev seam standing in for the catalog collaborator's writes.
    pub fn seed_package(&self, package: TravelPackage) {
        self.lock().packages.insert(package.id, package);
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn get_package(&self, id: Uuid) -> Result<Option<TravelPackage>, StoreError> {
        Ok(self.lock().packages.get(&id).cloned())
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn insert(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        self.lock().reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.lock().reservations.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError> {
        let mut all: Vec<Reservation> = self.lock().reservations.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError> {
        let mut mine: Vec<Reservation> = self
            .lock()
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by_key(|r| r.created_at);
        Ok(mine)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        next: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut tables = self.lock();
        let reservation = tables.reservations.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !reservation.status.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "invalid status transition from {} to {}",
                reservation.status, next
            )));
        }
        reservation.status = next;
        Ok(reservation.clone())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut tables = self.lock();
        let already_approved = tables
            .payments
            .values()
            .any(|p| p.reservation_id == payment.reservation_id && p.status == PaymentStatus::Approved);
        if already_approved {
            return Err(StoreError::Conflict(
                "reservation already has an approved payment".to_owned(),
            ));
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    async fn list_by_reservation(&self, reservation_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let mut attempts: Vec<Payment> = self
            .lock()
            .payments
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|p| p.created_at);
        Ok(attempts)
    }

    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError> {
        let mut tables = self.lock();
        if status == PaymentStatus::Approved {
            let reservation_id = tables
                .payments
                .get(&id)
                .map(|p| p.reservation_id)
                .ok_or(StoreError::NotFound)?;
            let another_approved = tables
                .payments
                .values()
                .any(|p| p.id != id && p.reservation_id == reservation_id && p.status == PaymentStatus::Approved);
            if another_approved {
                return Err(StoreError::Conflict(
                    "reservation already has an approved payment".to_owned(),
                ));
            }
        }
        let payment = tables.payments.get_mut(&id).ok_or(StoreError::NotFound)?;
        payment.status = status;
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn insert(&self, review: Review) -> Result<Review, StoreError> {
        let mut tables = self.lock();
        let duplicate = tables
            .reviews
            .values()
            .any(|r| r.user_id == review.user_id && r.package_id == review.package_id);
        if duplicate {
            return Err(StoreError::Conflict("you have already reviewed this package".to_owned()));
        }
        tables.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        Ok(self.lock().reviews.get(&id).cloned())
    }

    async fn list_by_status(&self, status: ReviewStatus) -> Result<Vec<Review>, StoreError> {
        let mut found: Vec<Review> = self
            .lock()
            .reviews
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let mut mine: Vec<Review> = self
            .lock()
            .reviews
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by_key(|r| r.created_at);
        Ok(mine)
    }

    async fn list_approved_for_package(&self, package_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let mut found: Vec<Review> = self
            .lock()
            .reviews
            .values()
            .filter(|r| r.package_id == package_id && r.status == ReviewStatus::Approved)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn find_by_user_and_package(
        &self,
        user_id: Uuid,
        package_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        Ok(self
            .lock()
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.package_id == package_id)
            .cloned())
    }

    async fn approve_pending(&self, id: Uuid) -> Result<Review, StoreError> {
        let mut tables = self.lock();
        let review = tables.reviews.get_mut(&id).ok_or(StoreError::NotFound)?;
        if review.status != ReviewStatus::Pending {
            return Err(StoreError::Conflict("review has already been moderated".to_owned()));
        }
        review.status = ReviewStatus::Approved;
        Ok(review.clone())
    }

    async fn delete_pending(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock();
        match tables.reviews.get(&id) {
            None => Err(StoreError::NotFound),
            Some(review) if review.status != ReviewStatus::Pending => {
                Err(StoreError::Conflict("review has already been moderated".to_owned()))
            }
            Some(_) => {
                tables.reviews.remove(&id);
                Ok(())
            }
        }
    }
}
