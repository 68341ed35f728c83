//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires the production use cases to the in-memory
//! directory and billing provider. The webhook verifier defaults to the real
//! Stripe verifier, so tests can post payloads signed with [`sign_payload`].
//!
//! [`sign_payload`]: super::sign_payload

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{
            billing_provider::{
                BillingCustomer, BillingPrice, BillingSubscription, CheckoutSession, InvoiceInfo,
            },
            webhook_verifier::WebhookVerifier,
        },
        use_cases::{
            billing_overview::BillingOverviewUseCases,
            checkout_linkage::CheckoutLinkage,
            checkout_session::CheckoutSessionUseCases,
            customer_identity::CustomerIdentityResolver,
            metadata_store::MetadataStore,
            portal_configuration::PortalConfigurationCache,
            subscription_projector::SubscriptionProjector,
            webhook_dispatcher::{ReconciliationHandlers, WebhookDispatcher},
        },
    },
    domain::entities::directory_user::DirectoryUser,
    infra::{config::AppConfig, stripe_webhook_verifier::StripeWebhookVerifier},
    test_utils::{InMemoryBillingProvider, InMemoryDirectory},
};

/// Webhook signing secret used by [`test_config`].
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_app";

/// Internal API key used by [`test_config`].
pub const TEST_INTERNAL_API_KEY: &str = "internal_test_key";

/// Minimal config for tests; nothing is read from the environment.
pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        app_origin: Url::parse("https://app.example.com").unwrap(),
        stripe_secret_key: SecretString::from("sk_test_unused".to_string()),
        stripe_webhook_secret: SecretString::from(TEST_WEBHOOK_SECRET.to_string()),
        stripe_portal_configuration_id: None,
        auth0_domain: "tenant.example.auth0.com".to_string(),
        auth0_client_id: "client_id".to_string(),
        auth0_client_secret: SecretString::from("client_secret".to_string()),
        internal_api_key: SecretString::from(TEST_INTERNAL_API_KEY.to_string()),
        checkout_trial_days: 14,
        checkout_success_path: "/dashboard".to_string(),
        checkout_error_path: "/error".to_string(),
        checkout_cancel_path: "/pricing".to_string(),
    }
}

/// Builder for creating `AppState` with in-memory ports for testing.
///
/// # Example
///
/// ```ignore
/// let builder = TestAppStateBuilder::new()
///     .with_user(create_test_user("auth0|1", |_| {}))
///     .with_customer(create_test_customer("cus_1", |_| {}));
/// let directory = builder.directory();
/// let app_state = builder.build();
/// ```
pub struct TestAppStateBuilder {
    directory: Arc<InMemoryDirectory>,
    billing: Arc<InMemoryBillingProvider>,
    verifier: Arc<dyn WebhookVerifier>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            directory: Arc::new(InMemoryDirectory::new()),
            billing: Arc::new(InMemoryBillingProvider::new()),
            verifier: Arc::new(StripeWebhookVerifier::new()),
        }
    }

    pub fn with_user(self, user: DirectoryUser) -> Self {
        self.directory.insert_user(user);
        self
    }

    pub fn with_customer(self, customer: BillingCustomer) -> Self {
        self.billing.insert_customer(customer);
        self
    }

    pub fn with_subscription(self, subscription: BillingSubscription) -> Self {
        self.billing.insert_subscription(subscription);
        self
    }

    pub fn with_price(self, price: BillingPrice) -> Self {
        self.billing.insert_price(price);
        self
    }

    pub fn with_invoice(self, invoice: InvoiceInfo) -> Self {
        self.billing.insert_invoice(invoice);
        self
    }

    pub fn with_checkout_session(self, session: CheckoutSession) -> Self {
        self.billing.insert_checkout_session(session);
        self
    }

    /// Replace the Stripe verifier, e.g. with a `StaticWebhookVerifier`.
    pub fn with_verifier(mut self, verifier: impl WebhookVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Handle on the directory for assertions after requests.
    pub fn directory(&self) -> Arc<InMemoryDirectory> {
        self.directory.clone()
    }

    pub fn billing(&self) -> Arc<InMemoryBillingProvider> {
        self.billing.clone()
    }

    pub fn build(self) -> AppState {
        let config = test_config();

        let metadata = MetadataStore::new(self.directory);
        let identity = CustomerIdentityResolver::new(self.billing.clone(), metadata.clone());
        let projector =
            SubscriptionProjector::new(self.billing.clone(), identity.clone(), metadata.clone());
        let checkout_linkage =
            CheckoutLinkage::new(self.billing.clone(), identity.clone(), projector.clone());
        let handlers = Arc::new(ReconciliationHandlers::new(
            self.billing.clone(),
            identity.clone(),
            projector.clone(),
            checkout_linkage.clone(),
        ));

        let portal = PortalConfigurationCache::new(
            self.billing.clone(),
            identity.clone(),
            metadata.clone(),
            None,
        );
        let checkout_sessions = CheckoutSessionUseCases::new(
            self.billing.clone(),
            identity,
            metadata.clone(),
            config.checkout_settings(),
        );
        let billing_overview = BillingOverviewUseCases::new(self.billing, metadata);

        AppState {
            config: Arc::new(config),
            webhook_dispatcher: Arc::new(WebhookDispatcher::new(self.verifier, handlers)),
            checkout_linkage: Arc::new(checkout_linkage),
            subscription_projector: Arc::new(projector),
            checkout_sessions: Arc::new(checkout_sessions),
            portal: Arc::new(portal),
            billing_overview: Arc::new(billing_overview),
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
