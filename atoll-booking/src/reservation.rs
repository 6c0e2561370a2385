use std::fmt;
use std::sync::Arc;

use atoll_catalog::{pricing, Catalog};
use atoll_core::identity::CurrentUser;
use atoll_core::{DomainError, DomainResult, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::ReservationRepository;

/// A person travelling under a reservation besides the booking user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Traveler {
    pub name: String,
    pub document: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// The booking state machine as an explicit transition table.
    /// PENDING may move to CONFIRMED or CANCELLED; CONFIRMED to COMPLETED
    /// or CANCELLED. CANCELLED and COMPLETED are terminal.
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ReservationStatus::Pending),
            "CONFIRMED" => Some(ReservationStatus::Confirmed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            "COMPLETED" => Some(ReservationStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        };
        write!(f, "{s}")
    }
}

/// A booking of a travel package, covering the booking user plus zero or
/// more named travelers. `total_cents` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub travelers: Vec<Traveler>,
    pub total_cents: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    fn new(user_id: Uuid, package_id: Uuid, travelers: Vec<Traveler>, total_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            package_id,
            travelers,
            total_cents,
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Owns reservation creation and every status change.
pub struct ReservationLifecycle {
    reservations: Arc<dyn ReservationRepository>,
    catalog: Arc<dyn Catalog>,
}

impl ReservationLifecycle {
    pub fn new(reservations: Arc<dyn ReservationRepository>, catalog: Arc<dyn Catalog>) -> Self {
        Self { reservations, catalog }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        travelers: Vec<Traveler>,
    ) -> DomainResult<Reservation> {
        let package = self
            .catalog
            .get_package(package_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("travel package not found".to_owned()))?;

        let total_cents = pricing::quote_total(package.price_cents, travelers.len());
        let reservation = Reservation::new(user_id, package_id, travelers, total_cents);
        let reservation = self.reservations.insert(reservation).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            package_id = %package_id,
            total_cents = reservation.total_cents,
            "reservation created"
        );
        Ok(reservation)
    }

    pub async fn get(&self, id: Uuid, caller: &CurrentUser) -> DomainResult<Reservation> {
        let reservation = self
            .reservations
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("reservation not found".to_owned()))?;

        if !caller.can_access(reservation.user_id) {
            return Err(DomainError::Forbidden(
                "you do not have access to this reservation".to_owned(),
            ));
        }
        Ok(reservation)
    }

    pub async fn list_all(&self, caller: &CurrentUser) -> DomainResult<Vec<Reservation>> {
        caller.require_admin()?;
        Ok(self.reservations.list_all().await?)
    }

    pub async fn list_mine(&self, user_id: Uuid) -> DomainResult<Vec<Reservation>> {
        Ok(self.reservations.list_by_user(user_id).await?)
    }

    /// Administrator-only. An edge outside the transition table is rejected
    /// rather than ignored.
    pub async fn update_status(
        &self,
        id: Uuid,
        next: ReservationStatus,
        caller: &CurrentUser,
    ) -> DomainResult<Reservation> {
        caller.require_admin()?;

        let current = self
            .reservations
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("reservation not found".to_owned()))?;

        if !current.status.can_transition_to(next) {
            return Err(DomainError::Validation(format!(
                "invalid status transition from {} to {}",
                current.status, next
            )));
        }

        match self.reservations.transition_status(id, next).await {
            Ok(updated) => {
                tracing::info!(reservation_id = %id, status = %next, "reservation status updated");
                Ok(updated)
            }
            // Lost a race since the check above; the store re-ran the table.
            Err(StoreError::Conflict(msg)) => Err(DomainError::Validation(msg)),
            Err(StoreError::NotFound) => {
                Err(DomainError::NotFound("reservation not found".to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
