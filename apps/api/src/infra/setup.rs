use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        billing_overview::BillingOverviewUseCases,
        checkout_linkage::CheckoutLinkage,
        checkout_session::CheckoutSessionUseCases,
        customer_identity::CustomerIdentityResolver,
        metadata_store::MetadataStore,
        portal_configuration::PortalConfigurationCache,
        subscription_projector::SubscriptionProjector,
        webhook_dispatcher::{ReconciliationHandlers, WebhookDispatcher},
    },
    infra::{
        auth0_client::Auth0Directory, config::AppConfig,
        stripe_billing_adapter::StripeBillingAdapter,
        stripe_webhook_verifier::StripeWebhookVerifier,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let directory = Arc::new(Auth0Directory::new(
        &config.auth0_domain,
        config.auth0_client_id.clone(),
        config.auth0_client_secret.clone(),
    )?);
    let billing = Arc::new(StripeBillingAdapter::new(config.stripe_secret_key.clone())?);
    let verifier = Arc::new(StripeWebhookVerifier::new());

    let metadata = MetadataStore::new(directory);
    let identity = CustomerIdentityResolver::new(billing.clone(), metadata.clone());
    let projector = SubscriptionProjector::new(billing.clone(), identity.clone(), metadata.clone());
    let checkout_linkage = CheckoutLinkage::new(billing.clone(), identity.clone(), projector.clone());

    let handlers = Arc::new(ReconciliationHandlers::new(
        billing.clone(),
        identity.clone(),
        projector.clone(),
        checkout_linkage.clone(),
    ));
    let webhook_dispatcher = WebhookDispatcher::new(verifier, handlers);

    let portal = PortalConfigurationCache::new(
        billing.clone(),
        identity.clone(),
        metadata.clone(),
        config.stripe_portal_configuration_id.clone(),
    );
    let checkout_sessions = CheckoutSessionUseCases::new(
        billing.clone(),
        identity,
        metadata.clone(),
        config.checkout_settings(),
    );
    let billing_overview = BillingOverviewUseCases::new(billing, metadata);

    Ok(AppState {
        config: Arc::new(config),
        webhook_dispatcher: Arc::new(webhook_dispatcher),
        checkout_linkage: Arc::new(checkout_linkage),
        subscription_projector: Arc::new(projector),
        checkout_sessions: Arc::new(checkout_sessions),
        portal: Arc::new(portal),
        billing_overview: Arc::new(billing_overview),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "billsync_api=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs), skipped when the working directory is read-only
    let json_layer = match File::create("app.log") {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true),
        ),
        Err(e) => {
            eprintln!("cannot create app.log, logging to console only: {e}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
