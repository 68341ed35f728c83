use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, NewPortalConfiguration, PortalProductOffer,
    },
};

use super::{customer_identity::CustomerIdentityResolver, metadata_store::MetadataStore};

const PORTAL_HEADLINE: &str = "Manage your subscription";

/// Get-or-create for the provider's self-service portal configuration.
///
/// Nothing is held in process; the provider is asked every time. Two racing
/// callers may each create a configuration, after which both resolve to the
/// first one listed.
#[derive(Clone)]
pub struct PortalConfigurationCache {
    billing: Arc<dyn BillingProviderPort>,
    identity: CustomerIdentityResolver,
    metadata: MetadataStore,
    configured_id: Option<String>,
}

impl PortalConfigurationCache {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        identity: CustomerIdentityResolver,
        metadata: MetadataStore,
        configured_id: Option<String>,
    ) -> Self {
        Self {
            billing,
            identity,
            metadata,
            configured_id,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_or_create_portal_configuration(&self) -> AppResult<String> {
        if let Some(id) = &self.configured_id {
            match self.billing.get_portal_configuration(id).await? {
                Some(config) => return Ok(config.id),
                None => warn!(configuration_id = %id, "Configured portal configuration not found"),
            }
        }

        if let Some(existing) = self
            .billing
            .list_portal_configurations()
            .await?
            .into_iter()
            .next()
        {
            return Ok(existing.id);
        }

        let mut products = Vec::new();
        for product in self.billing.list_active_products().await? {
            let price_ids: Vec<String> = self
                .billing
                .list_active_prices(&product.id)
                .await?
                .into_iter()
                .filter(|price| price.active)
                .map(|price| price.id)
                .collect();
            if price_ids.is_empty() {
                continue;
            }
            products.push(PortalProductOffer {
                product_id: product.id,
                price_ids,
            });
        }

        if products.is_empty() {
            return Err(AppError::InvalidData(
                "No active products with prices to offer in the customer portal".into(),
            ));
        }

        let created = self
            .billing
            .create_portal_configuration(&NewPortalConfiguration {
                headline: PORTAL_HEADLINE.to_string(),
                products,
            })
            .await?;
        info!(configuration_id = %created.id, "Created portal configuration");
        Ok(created.id)
    }

    /// Open a self-service portal session for the user's linked customer.
    /// Returns the portal URL.
    #[instrument(skip(self))]
    pub async fn create_portal_session(&self, user_id: &str, return_url: &str) -> AppResult<String> {
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;
        let customer_id = self
            .identity
            .resolve_for_user(&user)
            .await?
            .ok_or(AppError::NotFound)?;

        let configuration_id = self.get_or_create_portal_configuration().await?;
        self.billing
            .create_portal_session(&customer_id, return_url, &configuration_id)
            .await
    }
}
