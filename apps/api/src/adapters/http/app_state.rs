use std::sync::Arc;

use crate::{
    application::use_cases::{
        billing_overview::BillingOverviewUseCases, checkout_linkage::CheckoutLinkage,
        checkout_session::CheckoutSessionUseCases, portal_configuration::PortalConfigurationCache,
        subscription_projector::SubscriptionProjector, webhook_dispatcher::WebhookDispatcher,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook_dispatcher: Arc<WebhookDispatcher>,
    pub checkout_linkage: Arc<CheckoutLinkage>,
    pub subscription_projector: Arc<SubscriptionProjector>,
    pub checkout_sessions: Arc<CheckoutSessionUseCases>,
    pub portal: Arc<PortalConfigurationCache>,
    pub billing_overview: Arc<BillingOverviewUseCases>,
}
