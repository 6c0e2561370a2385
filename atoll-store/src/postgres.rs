use std::time::Duration;

use async_trait::async_trait;
use atoll_booking::repository::{PaymentRepository, ReservationRepository, ReviewRepository};
use atoll_booking::{
    Payment, PaymentMethod, PaymentStatus, Reservation, ReservationStatus, Review, ReviewStatus,
    Traveler,
};
use atoll_catalog::{Catalog, TravelPackage};
use atoll_core::pii::Masked;
use atoll_core::StoreError;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

/// Postgres-backed store. The invariants the engine relies on are enforced
/// by the schema: a partial unique index keeps a reservation at one
/// APPROVED payment, a unique (user_id, package_id) index keeps reviews
/// single-per-pair, and status transitions re-run the table on a row
/// locked inside a transaction.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("migrations completed");
        Ok(())
    }

    /// Write seam for the catalog collaborator; the booking engine itself
    /// only reads packages.
    pub async fn insert_package(&self, package: &TravelPackage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO packages (id, title, destination, price_cents, start_date, end_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(package.id)
        .bind(&package.title)
        .bind(&package.destination)
        .bind(package.price_cents)
        .bind(package.start_date)
        .bind(package.end_date)
        .bind(package.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Maps a unique-index violation to the conflict message of the invariant
/// that index guards.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_owned())
        }
        _ => backend(err),
    }
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    title: String,
    destination: String,
    price_cents: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<PackageRow> for TravelPackage {
    fn from(row: PackageRow) -> Self {
        TravelPackage {
            id: row.id,
            title: row.title,
            destination: row.destination,
            price_cents: row.price_cents,
            start_date: row.start_date,
            end_date: row.end_date,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: Uuid,
    package_id: Uuid,
    travelers: serde_json::Value,
    total_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_domain(self) -> Result<Reservation, StoreError> {
        let status = ReservationStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown reservation status {:?} in store", self.status))
        })?;
        let travelers: Vec<Traveler> = serde_json::from_value(self.travelers)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(Reservation {
            id: self.id,
            user_id: self.user_id,
            package_id: self.package_id,
            travelers,
            total_cents: self.total_cents,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reservation_id: Uuid,
    payer_user_id: Uuid,
    method: String,
    amount_cents: i64,
    installments: i16,
    cardholder_name: Option<String>,
    payer_document: Option<String>,
    card_last4: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> Result<Payment, StoreError> {
        let method = PaymentMethod::parse(&self.method).ok_or_else(|| {
            StoreError::Backend(format!("unknown payment method {:?} in store", self.method))
        })?;
        let status = PaymentStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown payment status {:?} in store", self.status))
        })?;
        Ok(Payment {
            id: self.id,
            reservation_id: self.reservation_id,
            payer_user_id: self.payer_user_id,
            method,
            amount_cents: self.amount_cents,
            installments: self.installments as u16,
            cardholder_name: self.cardholder_name,
            payer_document: self.payer_document.map(Masked::from),
            card_last4: self.card_last4,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    user_id: Uuid,
    package_id: Uuid,
    reservation_id: Uuid,
    rating: i16,
    comment: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_domain(self) -> Result<Review, StoreError> {
        let status = ReviewStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown review status {:?} in store", self.status))
        })?;
        Ok(Review {
            id: self.id,
            user_id: self.user_id,
            package_id: self.package_id,
            reservation_id: self.reservation_id,
            rating: self.rating as u8,
            comment: self.comment,
            status,
            created_at: self.created_at,
        })
    }
}

const RESERVATION_COLUMNS: &str =
    "id, user_id, package_id, travelers, total_cents, status, created_at";
const PAYMENT_COLUMNS: &str = "id, reservation_id, payer_user_id, method, amount_cents, \
     installments, cardholder_name, payer_document, card_last4, status, created_at, updated_at";
const REVIEW_COLUMNS: &str =
    "id, user_id, package_id, reservation_id, rating, comment, status, created_at";

#[async_trait]
impl Catalog for PgStore {
    async fn get_package(&self, id: Uuid) -> Result<Option<TravelPackage>, StoreError> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, title, destination, price_cents, start_date, end_date, created_at \
             FROM packages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(TravelPackage::from))
    }
}

#[async_trait]
impl ReservationRepository for PgStore {
    async fn insert(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let travelers = serde_json::to_value(&reservation.travelers)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, package_id, travelers, total_cents, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.user_id)
        .bind(reservation.package_id)
        .bind(travelers)
        .bind(reservation.total_cents)
        .bind(reservation.status.to_string())
        .bind(reservation.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(reservation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReservationRow::into_domain).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ReservationRow::into_domain).collect()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ReservationRow::into_domain).collect()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        next: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let current = row.ok_or(StoreError::NotFound)?.into_domain()?;
        if !current.status.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "invalid status transition from {} to {}",
                current.status, next
            )));
        }

        sqlx::query("UPDATE reservations SET status = $1 WHERE id = $2")
            .bind(next.to_string())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        Ok(Reservation { status: next, ..current })
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(backend)?;

        // A reservation already holding an APPROVED payment rejects any new
        // attempt, whatever the attempt's own status. The partial unique
        // index backs this up for concurrent approved inserts.
        let approved: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM payments WHERE reservation_id = $1 AND status = 'APPROVED' LIMIT 1",
        )
        .bind(payment.reservation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if approved.is_some() {
            return Err(StoreError::Conflict(
                "reservation already has an approved payment".to_owned(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO payments (id, reservation_id, payer_user_id, method, amount_cents,
                                  installments, cardholder_name, payer_document, card_last4,
                                  status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(payment.payer_user_id)
        .bind(payment.method.to_string())
        .bind(payment.amount_cents)
        .bind(payment.installments as i16)
        .bind(payment.cardholder_name.as_deref())
        .bind(payment.payer_document.as_ref().map(|d| d.0.clone()))
        .bind(payment.card_last4.as_deref())
        .bind(payment.status.to_string())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| conflict_on_unique(err, "reservation already has an approved payment"))?;

        tx.commit().await.map_err(backend)?;
        Ok(payment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn list_by_reservation(&self, reservation_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reservation_id = $1 ORDER BY created_at"
        ))
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(PaymentRow::into_domain).collect()
    }

    async fn set_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET status = $1, updated_at = now() WHERE id = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "reservation already has an approved payment"))?;
        row.ok_or(StoreError::NotFound)?.into_domain()
    }
}

#[async_trait]
impl ReviewRepository for PgStore {
    async fn insert(&self, review: Review) -> Result<Review, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, user_id, package_id, reservation_id, rating, comment, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(review.id)
        .bind(review.user_id)
        .bind(review.package_id)
        .bind(review.reservation_id)
        .bind(review.rating as i16)
        .bind(review.comment.as_deref())
        .bind(review.status.to_string())
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "you have already reviewed this package"))?;
        Ok(review)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReviewRow::into_domain).transpose()
    }

    async fn list_by_status(&self, status: ReviewStatus) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ReviewRow::into_domain).collect()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ReviewRow::into_domain).collect()
    }

    async fn list_approved_for_package(&self, package_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews \
             WHERE package_id = $1 AND status = 'APPROVED' ORDER BY created_at"
        ))
        .bind(package_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ReviewRow::into_domain).collect()
    }

    async fn find_by_user_and_package(
        &self,
        user_id: Uuid,
        package_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND package_id = $2"
        ))
        .bind(user_id)
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReviewRow::into_domain).transpose()
    }

    async fn approve_pending(&self, id: Uuid) -> Result<Review, StoreError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "UPDATE reviews SET status = 'APPROVED' WHERE id = $1 AND status = 'PENDING' \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => row.into_domain(),
            // Either the review is gone or another moderator resolved it.
            None => match ReviewRepository::get(self, id).await? {
                Some(_) => {
                    Err(StoreError::Conflict("review has already been moderated".to_owned()))
                }
                None => Err(StoreError::NotFound),
            },
        }
    }

    async fn delete_pending(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1 AND status = 'PENDING'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match ReviewRepository::get(self, id).await? {
            Some(_) => Err(StoreError::Conflict("review has already been moderated".to_owned())),
            None => Err(StoreError::NotFound),
        }
    }
}
