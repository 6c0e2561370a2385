use async_trait::async_trait;
use atoll_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A travel package as exposed by the catalog collaborator. Catalog CRUD
/// lives outside this system; the booking engine only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelPackage {
    pub id: Uuid,
    pub title: String,
    pub destination: String,
    pub price_cents: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TravelPackage {
    pub fn new(
        title: impl Into<String>,
        destination: impl Into<String>,
        price_cents: i64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            destination: destination.into(),
            price_cents,
            start_date,
            end_date,
            created_at: Utc::now(),
        }
    }

    /// Strictly past: a trip ending exactly at `now` has not ended yet.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date < now
    }
}

/// Lightweight package reference attached to listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRef {
    pub id: Uuid,
    pub title: String,
    pub destination: String,
}

impl From<&TravelPackage> for PackageRef {
    fn from(package: &TravelPackage) -> Self {
        Self {
            id: package.id,
            title: package.title.clone(),
            destination: package.destination.clone(),
        }
    }
}

/// Read contract the booking engine consumes from the catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_package(&self, id: Uuid) -> Result<Option<TravelPackage>, StoreError>;
}
