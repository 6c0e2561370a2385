use std::fmt;
use std::sync::Arc;

use atoll_catalog::{Catalog, PackageRef};
use atoll_core::identity::CurrentUser;
use atoll_core::{DomainError, DomainResult, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::{ReservationRepository, ReviewRepository};
use crate::reservation::ReservationStatus;

const ELIGIBILITY_RULE: &str =
    "reservation must be confirmed or completed and the travel must have ended";
const DUPLICATE_RULE: &str = "you have already reviewed this package";
const ALREADY_MODERATED_RULE: &str = "review has already been moderated";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
}

impl ReviewStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ReviewStatus::Pending),
            "APPROVED" => Some(ReviewStatus::Approved),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
        };
        write!(f, "{s}")
    }
}

/// A rating left for a package after a completed trip. `reservation_id` is
/// the eligibility witness: the reservation whose state justified accepting
/// the submission. Rejection deletes the row; there is no REJECTED status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub reservation_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

impl Review {
    fn new(
        user_id: Uuid,
        package_id: Uuid,
        reservation_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            package_id,
            reservation_id,
            rating,
            comment,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// A review annotated with the package it targets, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    #[serde(flatten)]
    pub review: Review,
    pub package: Option<PackageRef>,
}

/// Validates submissions against reservation history and runs the
/// administrator moderation workflow.
pub struct ReviewEngine {
    reviews: Arc<dyn ReviewRepository>,
    reservations: Arc<dyn ReservationRepository>,
    catalog: Arc<dyn Catalog>,
}

impl ReviewEngine {
    pub fn new(
        reviews: Arc<dyn ReviewRepository>,
        reservations: Arc<dyn ReservationRepository>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self { reviews, reservations, catalog }
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> DomainResult<Review> {
        if !(1..=5).contains(&rating) {
            return Err(DomainError::Validation("rating must be between 1 and 5".to_owned()));
        }

        let package = self
            .catalog
            .get_package(package_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("travel package not found".to_owned()))?;

        let now = Utc::now();
        let witness = self
            .reservations
            .list_by_user(user_id)
            .await?
            .into_iter()
            .find(|r| {
                r.package_id == package_id
                    && matches!(
                        r.status,
                        ReservationStatus::Confirmed | ReservationStatus::Completed
                    )
                    && package.has_ended(now)
            })
            .ok_or_else(|| DomainError::BusinessRule(ELIGIBILITY_RULE.to_owned()))?;

        if self.reviews.find_by_user_and_package(user_id, package_id).await?.is_some() {
            return Err(DomainError::BusinessRule(DUPLICATE_RULE.to_owned()));
        }

        let review = Review::new(user_id, package_id, witness.id, rating, comment);
        match self.reviews.insert(review).await {
            Ok(review) => {
                tracing::info!(
                    review_id = %review.id,
                    package_id = %package_id,
                    rating = review.rating,
                    "review submitted"
                );
                Ok(review)
            }
            Err(StoreError::Conflict(msg)) => Err(DomainError::BusinessRule(msg)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_pending(
        &self,
        caller: &CurrentUser,
        destination: Option<&str>,
    ) -> DomainResult<Vec<ReviewEntry>> {
        caller.require_admin()?;
        let reviews = self.reviews.list_by_status(ReviewStatus::Pending).await?;
        self.annotate(reviews, destination).await
    }

    pub async fn list_approved(&self, destination: Option<&str>) -> DomainResult<Vec<ReviewEntry>> {
        let reviews = self.reviews.list_by_status(ReviewStatus::Approved).await?;
        self.annotate(reviews, destination).await
    }

    /// Public per-package listing; approved reviews only.
    pub async fn list_for_package(&self, package_id: Uuid) -> DomainResult<Vec<Review>> {
        Ok(self.reviews.list_approved_for_package(package_id).await?)
    }

    pub async fn list_mine(&self, user_id: Uuid) -> DomainResult<Vec<ReviewEntry>> {
        let reviews = self.reviews.list_by_user(user_id).await?;
        self.annotate(reviews, None).await
    }

    /// Administrator-only. "approve" publishes the review, "reject" deletes
    /// it outright. Returns the review on approval, `None` after a reject.
    pub async fn moderate(
        &self,
        review_id: Uuid,
        action: &str,
        caller: &CurrentUser,
    ) -> DomainResult<Option<Review>> {
        caller.require_admin()?;

        let review = self
            .reviews
            .get(review_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("review not found".to_owned()))?;

        match action {
            "approve" => {
                if review.status != ReviewStatus::Pending {
                    return Err(DomainError::BusinessRule(ALREADY_MODERATED_RULE.to_owned()));
                }
                match self.reviews.approve_pending(review_id).await {
                    Ok(approved) => {
                        tracing::info!(review_id = %review_id, "review approved");
                        Ok(Some(approved))
                    }
                    Err(StoreError::Conflict(msg)) => Err(DomainError::BusinessRule(msg)),
                    Err(StoreError::NotFound) => {
                        Err(DomainError::NotFound("review not found".to_owned()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            "reject" => {
                if review.status != ReviewStatus::Pending {
                    return Err(DomainError::BusinessRule(ALREADY_MODERATED_RULE.to_owned()));
                }
                match self.reviews.delete_pending(review_id).await {
                    Ok(()) => {
                        tracing::info!(review_id = %review_id, "review rejected and removed");
                        Ok(None)
                    }
                    Err(StoreError::Conflict(msg)) => Err(DomainError::BusinessRule(msg)),
                    Err(StoreError::NotFound) => {
                        Err(DomainError::NotFound("review not found".to_owned()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            _ => Err(DomainError::Validation("unknown moderation action".to_owned())),
        }
    }

    async fn annotate(
        &self,
        reviews: Vec<Review>,
        destination: Option<&str>,
    ) -> DomainResult<Vec<ReviewEntry>> {
        let needle = destination.map(str::to_lowercase);
        let mut entries = Vec::with_capacity(reviews.len());
        for review in reviews {
            let package = self
                .catalog
                .get_package(review.package_id)
                .await?
                .map(|p| PackageRef::from(&p));
            if let Some(needle) = &needle {
                match &package {
                    Some(p) if p.destination.to_lowercase().contains(needle.as_str()) => {}
                    _ => continue,
                }
            }
            entries.push(ReviewEntry { review, package });
        }
        Ok(entries)
    }
}
