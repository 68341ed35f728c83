use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, CheckoutSession, CustomerId, Expandable, SubscriptionId,
    },
    domain::entities::billing_metadata::back_reference,
};

use super::{
    customer_identity::CustomerIdentityResolver,
    subscription_projector::{ProjectionOutcome, SubscriptionProjector},
};

/// Where the browser goes after returning from hosted checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutRedirect {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// Customer linked and subscription projected.
    Projected(ProjectionOutcome),
    /// Customer linked; the session carried no subscription to project.
    LinkedOnly { user_id: String, customer_id: CustomerId },
    /// Nothing could be tied to a directory user.
    Skipped,
}

/// Binds a completed checkout to its directory user.
///
/// Reached both from the browser's return from hosted checkout and from the
/// checkout-completed webhook; every step is idempotent so the two converge.
#[derive(Clone)]
pub struct CheckoutLinkage {
    billing: Arc<dyn BillingProviderPort>,
    identity: CustomerIdentityResolver,
    projector: SubscriptionProjector,
}

impl CheckoutLinkage {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        identity: CustomerIdentityResolver,
        projector: SubscriptionProjector,
    ) -> Self {
        Self {
            billing,
            identity,
            projector,
        }
    }

    /// Link the session's customer to the user named in its client
    /// reference, then project its subscription.
    ///
    /// Steps that already succeeded are not rolled back on failure.
    #[instrument(skip(self))]
    pub async fn complete_checkout(&self, session_id: &str) -> AppResult<ProjectionOutcome> {
        let session = self
            .billing
            .retrieve_checkout_session(session_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let customer = match &session.customer {
            Some(Expandable::Object(customer)) => customer,
            _ => {
                return Err(AppError::InvalidData(
                    "Invalid customer data from billing provider".into(),
                ));
            }
        };

        let subscription_id = session
            .subscription
            .as_ref()
            .map(|s| SubscriptionId::new(s.id()))
            .ok_or_else(|| AppError::InvalidData("Checkout session has no subscription".into()))?;

        let user_id = session
            .client_reference_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                AppError::InvalidData("Checkout session has no client reference".into())
            })?;

        self.identity.ensure_link_for_customer(user_id, customer).await?;

        let subscription = self
            .billing
            .get_subscription(&subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.projector.project_for_user(user_id, &subscription).await
    }

    /// Synchronous return path. Errors are logged and turned into a redirect.
    pub async fn handle_checkout_return(&self, session_id: &str) -> CheckoutRedirect {
        match self.complete_checkout(session_id).await {
            Ok(_) => CheckoutRedirect::Success,
            Err(AppError::UnprojectedStatus(status)) => {
                warn!(session_id, %status, "Checkout completed with a status that is not projected");
                CheckoutRedirect::Success
            }
            Err(e) => {
                error!(session_id, error = %e, "Failed to complete checkout");
                CheckoutRedirect::Error
            }
        }
    }

    /// Webhook path. Subscription checkouts take the full
    /// [`Self::complete_checkout`] route; other modes only link the customer.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn handle_completed_session(
        &self,
        session: &CheckoutSession,
    ) -> AppResult<CheckoutOutcome> {
        if session.is_subscription_mode() {
            return self
                .complete_checkout(&session.id)
                .await
                .map(CheckoutOutcome::Projected);
        }

        let Some(customer_ref) = &session.customer else {
            info!("Non-subscription checkout without a customer, nothing to link");
            return Ok(CheckoutOutcome::Skipped);
        };

        let customer = match customer_ref {
            Expandable::Object(customer) => customer.clone(),
            Expandable::Id(id) => {
                let customer_id = CustomerId::new(id.as_str());
                match self.billing.get_customer(&customer_id).await? {
                    Some(customer) => customer,
                    None => {
                        warn!(customer_id = %customer_id, "Checkout customer not found");
                        return Ok(CheckoutOutcome::Skipped);
                    }
                }
            }
        };

        let user_id = session
            .client_reference_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or_else(|| back_reference(&customer.metadata))
            .map(str::to_string);

        let Some(user_id) = user_id else {
            warn!(customer_id = %customer.id, "Checkout session names no directory user");
            return Ok(CheckoutOutcome::Skipped);
        };

        self.identity.ensure_link_for_customer(&user_id, &customer).await?;
        info!(user_id, customer_id = %customer.id, "Linked customer from one-off checkout");

        Ok(CheckoutOutcome::LinkedOnly {
            user_id,
            customer_id: customer.id,
        })
    }
}
