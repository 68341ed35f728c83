use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_provider::{CustomerId, Expandable},
        webhook_verifier::{BillingEvent, SubscriptionChange, WebhookEvent, WebhookVerifier},
    },
    infra::{
        stripe_billing_adapter::{
            checkout_session_from_stripe, customer_from_stripe, invoice_from_stripe,
            subscription_from_stripe, timestamp_to_datetime,
        },
        stripe_client::{
            StripeCheckoutSession, StripeClient, StripeCustomer, StripeExpandable, StripeInvoice,
            StripeInvoicePayment, StripeSubscription, StripeWebhookEvent,
        },
    },
};

/// Event types that are logged but never mutate state.
const INFORMATIONAL_EVENTS: [&str; 9] = [
    "invoice.created",
    "invoice.finalized",
    "invoice.upcoming",
    "charge.succeeded",
    "payment_intent.created",
    "payment_intent.succeeded",
    "payment_method.attached",
    "setup_intent.succeeded",
    "setup_intent.created",
];

#[derive(Clone, Default)]
pub struct StripeWebhookVerifier;

impl StripeWebhookVerifier {
    pub fn new() -> Self {
        Self
    }
}

fn cast<T: DeserializeOwned>(event: &WebhookEvent, what: &str) -> AppResult<T> {
    serde_json::from_value(event.payload.clone()).map_err(|e| {
        AppError::InvalidData(format!(
            "{} payload is not a {}: {}",
            event.event_type, what, e
        ))
    })
}

fn string_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

impl WebhookVerifier for StripeWebhookVerifier {
    fn construct_event(
        &self,
        payload: &str,
        signature: &str,
        secret: &str,
    ) -> AppResult<WebhookEvent> {
        StripeClient::verify_webhook_signature(payload, signature, secret)?;

        let event: StripeWebhookEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::InvalidSignature(format!("Invalid webhook payload: {}", e)))?;

        Ok(WebhookEvent {
            delivery_id: event.id,
            event_type: event.event_type,
            created: event.created.and_then(timestamp_to_datetime),
            payload: event.data.object,
        })
    }

    fn decode(&self, event: &WebhookEvent) -> AppResult<BillingEvent> {
        let change = match event.event_type.as_str() {
            "customer.subscription.created" => Some(SubscriptionChange::Created),
            "customer.subscription.updated" => Some(SubscriptionChange::Updated),
            "customer.subscription.deleted" => Some(SubscriptionChange::Deleted),
            _ => None,
        };
        if let Some(change) = change {
            let subscription: StripeSubscription = cast(event, "subscription")?;
            return Ok(BillingEvent::SubscriptionChanged {
                change,
                subscription: subscription_from_stripe(subscription),
            });
        }

        match event.event_type.as_str() {
            "customer.created" | "customer.updated" => {
                let customer: StripeCustomer = cast(event, "customer")?;
                Ok(BillingEvent::CustomerChanged {
                    customer: customer_from_stripe(customer),
                })
            }
            "checkout.session.completed" => {
                let session: StripeCheckoutSession = cast(event, "checkout session")?;
                Ok(BillingEvent::CheckoutCompleted {
                    session: checkout_session_from_stripe(session),
                })
            }
            "invoice.paid" | "invoice.payment_succeeded" => {
                let invoice: StripeInvoice = cast(event, "invoice")?;
                Ok(BillingEvent::InvoicePaid {
                    invoice: invoice_from_stripe(invoice),
                })
            }
            "invoice_payment.paid" => {
                let payment: StripeInvoicePayment = cast(event, "invoice payment")?;
                let invoice = match payment.invoice {
                    StripeExpandable::Id(id) => Expandable::Id(id),
                    StripeExpandable::Object(invoice) => {
                        Expandable::Object(invoice_from_stripe(*invoice))
                    }
                };
                Ok(BillingEvent::InvoicePaymentPaid { invoice })
            }
            t if INFORMATIONAL_EVENTS.contains(&t) => Ok(BillingEvent::Informational {
                object_id: string_field(&event.payload, "id"),
                customer_id: string_field(&event.payload, "customer").map(CustomerId::new),
            }),
            _ => Ok(BillingEvent::Unknown),
        }
    }
}
