//! Authenticates and routes billing-provider webhook deliveries.
//!
//! A delivery moves `received -> verified -> routed -> handled | rejected` in a
//! single call. [`WebhookDispatcher::dispatch`] never fails: every outcome,
//! including a rejected signature, is reported through [`DispatchOutcome`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult, FailureKind},
    application::ports::{
        billing_provider::{
            BillingCustomer, BillingProviderPort, BillingSubscription, CheckoutSession,
            Expandable, InvoiceInfo,
        },
        webhook_verifier::{BillingEvent, SubscriptionChange, WebhookEvent, WebhookVerifier},
    },
    domain::entities::billing_metadata::back_reference,
};

use super::{
    checkout_linkage::CheckoutLinkage, customer_identity::CustomerIdentityResolver,
    subscription_projector::SubscriptionProjector,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub success: bool,
    /// Present once the delivery passed verification.
    pub event: Option<WebhookEvent>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl DispatchOutcome {
    fn handled(event: WebhookEvent) -> Self {
        Self {
            success: true,
            event: Some(event),
            error: None,
            failure: None,
        }
    }

    fn rejected(error: &AppError) -> Self {
        Self {
            success: false,
            event: None,
            error: Some(error.to_string()),
            failure: Some(FailureKind::Verification),
        }
    }

    fn failed(event: WebhookEvent, error: &AppError) -> Self {
        Self {
            success: false,
            event: Some(event),
            error: Some(error.to_string()),
            failure: Some(error.failure_kind()),
        }
    }
}

/// One method per event category that mutates state. Informational and
/// unknown events never reach a handler.
#[async_trait]
pub trait BillingEventHandler: Send + Sync {
    async fn subscription_changed(
        &self,
        change: SubscriptionChange,
        subscription: &BillingSubscription,
    ) -> AppResult<()>;

    async fn customer_changed(&self, customer: &BillingCustomer) -> AppResult<()>;

    async fn checkout_completed(&self, session: &CheckoutSession) -> AppResult<()>;

    async fn invoice_paid(&self, invoice: &InvoiceInfo) -> AppResult<()>;

    async fn invoice_payment_paid(&self, invoice: &Expandable<InvoiceInfo>) -> AppResult<()>;
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    verifier: Arc<dyn WebhookVerifier>,
    handler: Arc<dyn BillingEventHandler>,
}

impl WebhookDispatcher {
    pub fn new(verifier: Arc<dyn WebhookVerifier>, handler: Arc<dyn BillingEventHandler>) -> Self {
        Self { verifier, handler }
    }

    #[instrument(skip_all)]
    pub async fn dispatch(&self, payload: &str, signature: &str, secret: &str) -> DispatchOutcome {
        let event = match self.verifier.construct_event(payload, signature, secret) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Rejected webhook delivery");
                return DispatchOutcome::rejected(&e);
            }
        };

        let event_id = event.delivery_id.as_str();
        let event_type = event.event_type.as_str();
        debug!(event_id, event_type, "Verified webhook delivery");

        let billing_event = match self.verifier.decode(&event) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, event_id, event_type, "Webhook payload has unexpected shape");
                return DispatchOutcome::failed(event, &e);
            }
        };

        match self.route(&billing_event, &event).await {
            Ok(()) => DispatchOutcome::handled(event),
            Err(e) if e.is_benign() => {
                warn!(error = %e, event_id, event_type, "Webhook handled as no-op");
                DispatchOutcome::handled(event)
            }
            Err(e) => {
                error!(
                    error = %e,
                    event_id,
                    event_type,
                    retryable = e.is_retryable(),
                    "Webhook processing failed"
                );
                DispatchOutcome::failed(event, &e)
            }
        }
    }

    async fn route(&self, billing_event: &BillingEvent, event: &WebhookEvent) -> AppResult<()> {
        match billing_event {
            BillingEvent::SubscriptionChanged {
                change,
                subscription,
            } => self.handler.subscription_changed(*change, subscription).await,
            BillingEvent::CustomerChanged { customer } => {
                self.handler.customer_changed(customer).await
            }
            BillingEvent::CheckoutCompleted { session } => {
                self.handler.checkout_completed(session).await
            }
            BillingEvent::InvoicePaid { invoice } => self.handler.invoice_paid(invoice).await,
            BillingEvent::InvoicePaymentPaid { invoice } => {
                self.handler.invoice_payment_paid(invoice).await
            }
            BillingEvent::Informational {
                object_id,
                customer_id,
            } => {
                info!(
                    event_id = %event.delivery_id,
                    event_type = %event.event_type,
                    object_id = object_id.as_deref().unwrap_or("unknown"),
                    customer_id = customer_id.as_ref().map(|c| c.as_str()).unwrap_or("unknown"),
                    "Informational billing event"
                );
                Ok(())
            }
            BillingEvent::Unknown => {
                info!(
                    event_id = %event.delivery_id,
                    event_type = %event.event_type,
                    "Unhandled webhook event type"
                );
                Ok(())
            }
        }
    }
}

/// The production handler set: projector, identity resolver and checkout
/// linkage wired to the event categories.
#[derive(Clone)]
pub struct ReconciliationHandlers {
    billing: Arc<dyn BillingProviderPort>,
    identity: CustomerIdentityResolver,
    projector: SubscriptionProjector,
    linkage: CheckoutLinkage,
}

impl ReconciliationHandlers {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        identity: CustomerIdentityResolver,
        projector: SubscriptionProjector,
        linkage: CheckoutLinkage,
    ) -> Self {
        Self {
            billing,
            identity,
            projector,
            linkage,
        }
    }
}

#[async_trait]
impl BillingEventHandler for ReconciliationHandlers {
    async fn subscription_changed(
        &self,
        change: SubscriptionChange,
        subscription: &BillingSubscription,
    ) -> AppResult<()> {
        info!(
            change = change.as_str(),
            subscription_id = %subscription.id,
            customer_id = %subscription.customer_id,
            "Subscription changed"
        );
        let current = self.projector.refresh(subscription).await?;
        self.projector.project_subscription(&current).await?;
        Ok(())
    }

    async fn customer_changed(&self, customer: &BillingCustomer) -> AppResult<()> {
        if customer.deleted {
            info!(customer_id = %customer.id, "Customer deleted, nothing to link");
            return Ok(());
        }
        let Some(user_id) = back_reference(&customer.metadata) else {
            debug!(customer_id = %customer.id, "Customer has no directory user tag");
            return Ok(());
        };
        self.identity.ensure_link_for_customer(user_id, customer).await?;
        Ok(())
    }

    async fn checkout_completed(&self, session: &CheckoutSession) -> AppResult<()> {
        self.linkage.handle_completed_session(session).await?;
        Ok(())
    }

    async fn invoice_paid(&self, invoice: &InvoiceInfo) -> AppResult<()> {
        let Some(customer_id) = &invoice.customer_id else {
            info!(invoice_id = %invoice.invoice_id, "Paid invoice without customer");
            return Ok(());
        };

        let Some(owner) = self.identity.find_owner(customer_id).await? else {
            warn!(invoice_id = %invoice.invoice_id, customer_id = %customer_id, "Paid invoice for unlinked customer");
            return Ok(());
        };

        self.identity
            .ensure_link_for_customer(&owner.user.id, &owner.customer)
            .await?;

        info!(
            invoice_id = %invoice.invoice_id,
            user_id = %owner.user.id,
            customer_id = %customer_id,
            amount_paid_cents = invoice.amount_paid_cents,
            currency = %invoice.currency,
            "Invoice paid"
        );
        Ok(())
    }

    async fn invoice_payment_paid(&self, invoice: &Expandable<InvoiceInfo>) -> AppResult<()> {
        let invoice = match invoice {
            Expandable::Object(invoice) => invoice.clone(),
            Expandable::Id(invoice_id) => match self.billing.get_invoice(invoice_id).await? {
                Some(invoice) => invoice,
                None => {
                    warn!(invoice_id = %invoice_id, "Invoice for paid invoice payment not found");
                    return Ok(());
                }
            },
        };
        self.invoice_paid(&invoice).await
    }
}
