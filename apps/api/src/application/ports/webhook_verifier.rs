use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::app_error::AppResult;

use super::billing_provider::{
    BillingCustomer, BillingSubscription, CheckoutSession, CustomerId, Expandable, InvoiceInfo,
};

/// A verified, not yet interpreted provider event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Provider event id; identical across redeliveries of the same event.
    pub delivery_id: String,
    pub event_type: String,
    pub created: Option<DateTime<Utc>>,
    /// The event's data object, opaque until decoded.
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Created,
    Updated,
    Deleted,
}

impl SubscriptionChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionChange::Created => "created",
            SubscriptionChange::Updated => "updated",
            SubscriptionChange::Deleted => "deleted",
        }
    }
}

/// The provider event taxonomy this service reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    SubscriptionChanged {
        change: SubscriptionChange,
        subscription: BillingSubscription,
    },
    CustomerChanged {
        customer: BillingCustomer,
    },
    CheckoutCompleted {
        session: CheckoutSession,
    },
    InvoicePaid {
        invoice: InvoiceInfo,
    },
    /// A payment settled an invoice. The invoice usually arrives as a bare id.
    InvoicePaymentPaid {
        invoice: Expandable<InvoiceInfo>,
    },
    /// Logged for audit, never mutates state.
    Informational {
        object_id: Option<String>,
        customer_id: Option<CustomerId>,
    },
    Unknown,
}

/// Authenticates raw webhook deliveries and decodes them into [`BillingEvent`]s.
pub trait WebhookVerifier: Send + Sync {
    /// Check the signature header against the shared secret and parse the
    /// event envelope. Fails with `AppError::InvalidSignature`.
    fn construct_event(
        &self,
        payload: &str,
        signature: &str,
        secret: &str,
    ) -> AppResult<WebhookEvent>;

    /// Cast the event payload according to its type. Fails with
    /// `AppError::InvalidData` when the payload does not have the expected shape.
    fn decode(&self, event: &WebhookEvent) -> AppResult<BillingEvent>;
}
