use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_provider::{
                BillingCustomer, BillingSubscription, CheckoutSession, Expandable, InvoiceInfo,
            },
            webhook_verifier::{BillingEvent, SubscriptionChange, WebhookEvent, WebhookVerifier},
        },
        use_cases::webhook_dispatcher::BillingEventHandler,
    },
    infra::stripe_client::compute_signature,
};

/// Builds a `stripe-signature` header for `payload` signed now with `secret`.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = compute_signature(&timestamp, payload, secret).unwrap();
    format!("t={},v1={}", timestamp, signature)
}

// ============================================================================
// StaticWebhookVerifier
// ============================================================================

/// Accepts any delivery presented with the expected secret and decodes it to a
/// fixed event.
pub struct StaticWebhookVerifier {
    secret: String,
    decoded: Result<BillingEvent, String>,
}

impl StaticWebhookVerifier {
    pub fn new(secret: &str, event: BillingEvent) -> Self {
        Self {
            secret: secret.to_string(),
            decoded: Ok(event),
        }
    }

    /// Verification passes, decoding fails with `InvalidData(message)`.
    pub fn undecodable(secret: &str, message: &str) -> Self {
        Self {
            secret: secret.to_string(),
            decoded: Err(message.to_string()),
        }
    }

    fn event_type(&self) -> String {
        match &self.decoded {
            Ok(BillingEvent::SubscriptionChanged { change, .. }) => {
                format!("customer.subscription.{}", change.as_str())
            }
            Ok(BillingEvent::CustomerChanged { .. }) => "customer.updated".into(),
            Ok(BillingEvent::CheckoutCompleted { .. }) => "checkout.session.completed".into(),
            Ok(BillingEvent::InvoicePaid { .. }) => "invoice.paid".into(),
            Ok(BillingEvent::InvoicePaymentPaid { .. }) => "invoice_payment.paid".into(),
            Ok(BillingEvent::Informational { .. }) => "charge.succeeded".into(),
            Ok(BillingEvent::Unknown) => "test.unhandled".into(),
            Err(_) => format!(
                "customer.subscription.{}",
                SubscriptionChange::Updated.as_str()
            ),
        }
    }
}

impl WebhookVerifier for StaticWebhookVerifier {
    fn construct_event(
        &self,
        _payload: &str,
        _signature: &str,
        secret: &str,
    ) -> AppResult<WebhookEvent> {
        if secret != self.secret {
            return Err(AppError::InvalidSignature(
                "No signatures found matching the expected signature".into(),
            ));
        }
        Ok(WebhookEvent {
            delivery_id: "evt_test".into(),
            event_type: self.event_type(),
            created: None,
            payload: Value::Null,
        })
    }

    fn decode(&self, _event: &WebhookEvent) -> AppResult<BillingEvent> {
        self.decoded.clone().map_err(AppError::InvalidData)
    }
}

// ============================================================================
// CountingEventHandler
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCounts {
    pub subscription_changed: usize,
    pub customer_changed: usize,
    pub checkout_completed: usize,
    pub invoice_paid: usize,
    pub invoice_payment_paid: usize,
}

/// Records which handler ran; optionally fails every call.
#[derive(Default)]
pub struct CountingEventHandler {
    counts: Mutex<HandlerCounts>,
    failure: Option<fn() -> AppError>,
}

impl CountingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(failure: fn() -> AppError) -> Self {
        Self {
            counts: Mutex::default(),
            failure: Some(failure),
        }
    }

    pub fn counts(&self) -> HandlerCounts {
        *self.counts.lock().unwrap()
    }

    pub fn total_calls(&self) -> usize {
        let c = self.counts();
        c.subscription_changed
            + c.customer_changed
            + c.checkout_completed
            + c.invoice_paid
            + c.invoice_payment_paid
    }

    fn record(&self, bump: impl FnOnce(&mut HandlerCounts)) -> AppResult<()> {
        bump(&mut *self.counts.lock().unwrap());
        match self.failure {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingEventHandler for CountingEventHandler {
    async fn subscription_changed(
        &self,
        _change: SubscriptionChange,
        _subscription: &BillingSubscription,
    ) -> AppResult<()> {
        self.record(|c| c.subscription_changed += 1)
    }

    async fn customer_changed(&self, _customer: &BillingCustomer) -> AppResult<()> {
        self.record(|c| c.customer_changed += 1)
    }

    async fn checkout_completed(&self, _session: &CheckoutSession) -> AppResult<()> {
        self.record(|c| c.checkout_completed += 1)
    }

    async fn invoice_paid(&self, _invoice: &InvoiceInfo) -> AppResult<()> {
        self.record(|c| c.invoice_paid += 1)
    }

    async fn invoice_payment_paid(&self, _invoice: &Expandable<InvoiceInfo>) -> AppResult<()> {
        self.record(|c| c.invoice_payment_paid += 1)
    }
}
