use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{BillingProviderPort, NewCheckoutSession},
    domain::entities::billing_metadata::CUSTOMER_BACK_REFERENCE,
};

use super::{customer_identity::CustomerIdentityResolver, metadata_store::MetadataStore};

/// Placeholder the provider substitutes with the session id on redirect.
pub const CHECKOUT_SESSION_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// URLs and trial length handed to every hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub app_origin: String,
    pub cancel_path: String,
    pub trial_days: Option<i32>,
}

impl CheckoutSettings {
    pub fn success_url(&self) -> String {
        format!(
            "{}/api/billing/checkout?session_id={}",
            self.app_origin.trim_end_matches('/'),
            CHECKOUT_SESSION_PLACEHOLDER
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.app_origin.trim_end_matches('/'), self.cancel_path)
    }
}

/// Starts hosted checkout for a directory user. This is the only path that
/// creates billing customers.
#[derive(Clone)]
pub struct CheckoutSessionUseCases {
    billing: Arc<dyn BillingProviderPort>,
    identity: CustomerIdentityResolver,
    metadata: MetadataStore,
    settings: CheckoutSettings,
}

impl CheckoutSessionUseCases {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        identity: CustomerIdentityResolver,
        metadata: MetadataStore,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            billing,
            identity,
            metadata,
            settings,
        }
    }

    /// Returns the hosted checkout URL.
    #[instrument(skip(self))]
    pub async fn start_checkout(&self, user_id: &str, price_id: &str) -> AppResult<String> {
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;

        let price = self
            .billing
            .get_price(price_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown or inactive price {price_id}")))?;

        let customer_id = match self.identity.resolve_for_user(&user).await? {
            Some(id) => id,
            None => {
                let mut tag = HashMap::new();
                tag.insert(CUSTOMER_BACK_REFERENCE.to_string(), user_id.to_string());
                let customer = self
                    .billing
                    .create_customer(user.email.as_deref(), &tag)
                    .await?;
                info!(customer_id = %customer.id, "Created billing customer");
                self.identity
                    .ensure_link_for_customer(user_id, &customer)
                    .await?;
                customer.id
            }
        };

        let session = self
            .billing
            .create_checkout_session(&NewCheckoutSession {
                customer_id,
                price_id: price.id,
                success_url: self.settings.success_url(),
                cancel_url: self.settings.cancel_url(),
                client_reference_id: user_id.to_string(),
                trial_days: self.settings.trial_days.filter(|d| *d > 0),
                allow_promotion_codes: true,
            })
            .await?;

        session.url.ok_or_else(|| {
            AppError::BillingProvider(format!("Checkout session {} has no URL", session.id))
        })
    }
}
