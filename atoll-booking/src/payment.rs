use std::fmt;
use std::sync::Arc;

use atoll_core::identity::CurrentUser;
use atoll_core::pii::Masked;
use atoll_core::{DomainError, DomainResult, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::{PaymentRepository, ReservationRepository};
use crate::reservation::ReservationStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Credit,
    Debit,
    Pix,
    Boleto,
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREDIT" => Some(PaymentMethod::Credit),
            "DEBIT" => Some(PaymentMethod::Debit),
            "PIX" => Some(PaymentMethod::Pix),
            "BOLETO" => Some(PaymentMethod::Boleto),
            _ => None,
        }
    }

    /// The simulated gateway settles card and PIX payments synchronously;
    /// BOLETO stays pending until an administrator resolves it.
    pub fn initial_status(self) -> PaymentStatus {
        match self {
            PaymentMethod::Credit | PaymentMethod::Debit | PaymentMethod::Pix => {
                PaymentStatus::Approved
            }
            PaymentMethod::Boleto => PaymentStatus::Pending,
        }
    }

    pub fn requires_card(self) -> bool {
        matches!(self, PaymentMethod::Credit | PaymentMethod::Debit)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethod::Credit => "CREDIT",
            PaymentMethod::Debit => "DEBIT",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Boleto => "BOLETO",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Refused,
}

impl PaymentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "APPROVED" => Some(PaymentStatus::Approved),
            "REFUSED" => Some(PaymentStatus::Refused),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Refused => "REFUSED",
        };
        write!(f, "{s}")
    }
}

/// An authorization attempt against a reservation's total. Card numbers are
/// never stored; only the last four digits survive the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub payer_user_id: Uuid,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub installments: u16,
    pub cardholder_name: Option<String>,
    pub payer_document: Option<Masked<String>>,
    pub card_last4: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Authorization request as the payment processor receives it.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizePayment {
    pub reservation_id: Uuid,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub installments: Option<u16>,
    pub cardholder_name: Option<String>,
    pub payer_document: Option<String>,
    pub card_number: Option<String>,
}

/// Whether a reservation may accumulate further attempts after a
/// non-approved one. Wired from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PaymentPolicy {
    pub allow_retry: bool,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self { allow_retry: true }
    }
}

fn card_last4(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    digits[digits.len().saturating_sub(4)..].iter().collect()
}

impl Payment {
    fn new(payer_user_id: Uuid, request: AuthorizePayment, installments: u16) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reservation_id: request.reservation_id,
            payer_user_id,
            method: request.method,
            amount_cents: request.amount_cents,
            installments,
            cardholder_name: request.cardholder_name,
            payer_document: request.payer_document.map(Masked::from),
            card_last4: request.card_number.as_deref().map(card_last4),
            status: request.method.initial_status(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Authorizes payments against reservations and applies administrator
/// corrections. Never re-transitions a payment on its own once an
/// administrator has intervened.
pub struct PaymentProcessor {
    payments: Arc<dyn PaymentRepository>,
    reservations: Arc<dyn ReservationRepository>,
    policy: PaymentPolicy,
}

impl PaymentProcessor {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        reservations: Arc<dyn ReservationRepository>,
        policy: PaymentPolicy,
    ) -> Self {
        Self { payments, reservations, policy }
    }

    pub async fn authorize(
        &self,
        payer_user_id: Uuid,
        request: AuthorizePayment,
    ) -> DomainResult<Payment> {
        let reservation = self
            .reservations
            .get(request.reservation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("reservation not found".to_owned()))?;

        if reservation.user_id != payer_user_id {
            return Err(DomainError::BusinessRule(
                "reservation does not belong to you".to_owned(),
            ));
        }

        let attempts = self.payments.list_by_reservation(reservation.id).await?;
        if attempts.iter().any(|p| p.status == PaymentStatus::Approved) {
            return Err(DomainError::BusinessRule(
                "reservation already has an approved payment".to_owned(),
            ));
        }
        if !self.policy.allow_retry && !attempts.is_empty() {
            return Err(DomainError::BusinessRule(
                "reservation already has a payment attempt".to_owned(),
            ));
        }

        if request.amount_cents != reservation.total_cents {
            return Err(DomainError::Validation(
                "payment amount does not match the reservation total".to_owned(),
            ));
        }
        if request.method.requires_card()
            && request.card_number.as_deref().map_or(true, str::is_empty)
        {
            return Err(DomainError::Validation(
                "card number is required for card payments".to_owned(),
            ));
        }

        // Installments only mean something for CREDIT.
        let installments = match request.method {
            PaymentMethod::Credit => request.installments.unwrap_or(1).max(1),
            _ => 1,
        };

        let payment = Payment::new(payer_user_id, request, installments);
        let payment = match self.payments.insert(payment).await {
            Ok(payment) => payment,
            Err(StoreError::Conflict(msg)) => return Err(DomainError::BusinessRule(msg)),
            Err(err) => return Err(err.into()),
        };

        if payment.status == PaymentStatus::Approved
            && reservation.status == ReservationStatus::Pending
        {
            // A paid booking counts as confirmed. If a concurrent admin
            // transition got there first, the table rejects ours and the
            // admin's state stands.
            match self
                .reservations
                .transition_status(reservation.id, ReservationStatus::Confirmed)
                .await
            {
                Ok(_) => tracing::info!(
                    reservation_id = %reservation.id,
                    "reservation confirmed by approved payment"
                ),
                Err(StoreError::Conflict(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(
            payment_id = %payment.id,
            reservation_id = %payment.reservation_id,
            method = %payment.method,
            status = %payment.status,
            "payment authorized"
        );
        Ok(payment)
    }

    /// Administrator-only; reservation owners do not get to see the raw
    /// gateway status.
    pub async fn get_status(
        &self,
        payment_id: Uuid,
        caller: &CurrentUser,
    ) -> DomainResult<PaymentStatus> {
        caller.require_admin()?;
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("payment not found".to_owned()))?;
        Ok(payment.status)
    }

    /// Administrators may correct payment state freely; the store still
    /// holds the one-approved-per-reservation line.
    pub async fn update_status(
        &self,
        payment_id: Uuid,
        next: PaymentStatus,
        caller: &CurrentUser,
    ) -> DomainResult<Payment> {
        caller.require_admin()?;

        let updated = match self.payments.set_status(payment_id, next).await {
            Ok(payment) => payment,
            Err(StoreError::NotFound) => {
                return Err(DomainError::NotFound("payment not found".to_owned()))
            }
            Err(StoreError::Conflict(msg)) => return Err(DomainError::BusinessRule(msg)),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(payment_id = %payment_id, status = %next, "payment status updated");
        Ok(updated)
    }
}
