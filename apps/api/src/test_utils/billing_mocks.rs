//! In-memory billing provider with per-operation call counters.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingCustomer, BillingPrice, BillingProduct, BillingProviderPort, BillingSubscription,
        CheckoutSession, CreatedCheckoutSession, CustomerId, Expandable, InvoiceInfo,
        NewCheckoutSession, NewPortalConfiguration, PaymentIntentInfo, PaymentMethodInfo,
        PortalConfiguration, SubscriptionId,
    },
};

/// How often each provider operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillingCalls {
    pub get_customer: usize,
    pub search_customers: usize,
    pub create_customer: usize,
    pub update_customer: usize,
    pub get_subscription: usize,
    pub list_subscriptions: usize,
    pub get_product: usize,
    pub create_checkout_session: usize,
    pub create_portal_configuration: usize,
    pub create_portal_session: usize,
}

#[derive(Default)]
struct BillingStore {
    customers: HashMap<String, BillingCustomer>,
    subscriptions: Vec<BillingSubscription>,
    products: Vec<BillingProduct>,
    prices: Vec<BillingPrice>,
    checkout_sessions: HashMap<String, CheckoutSession>,
    portal_configurations: Vec<PortalConfiguration>,
    invoices: Vec<InvoiceInfo>,
    payment_intents: Vec<(CustomerId, PaymentIntentInfo)>,
    payment_methods: Vec<(CustomerId, PaymentMethodInfo)>,
    created_checkout_sessions: Vec<NewCheckoutSession>,
    created_portal_configurations: Vec<NewPortalConfiguration>,
    calls: BillingCalls,
    fail_customer_updates: bool,
    next_id: usize,
}

impl BillingStore {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryBillingProvider {
    store: Mutex<BillingStore>,
}

impl InMemoryBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------------

    pub fn insert_customer(&self, customer: BillingCustomer) {
        self.store
            .lock()
            .unwrap()
            .customers
            .insert(customer.id.as_str().to_string(), customer);
    }

    /// Insert or replace by id.
    pub fn insert_subscription(&self, subscription: BillingSubscription) {
        let mut store = self.store.lock().unwrap();
        store.subscriptions.retain(|s| s.id != subscription.id);
        store.subscriptions.push(subscription);
    }

    pub fn insert_product(&self, product: BillingProduct) {
        let mut store = self.store.lock().unwrap();
        store.products.retain(|p| p.id != product.id);
        store.products.push(product);
    }

    pub fn insert_price(&self, price: BillingPrice) {
        let mut store = self.store.lock().unwrap();
        store.prices.retain(|p| p.id != price.id);
        store.prices.push(price);
    }

    pub fn insert_checkout_session(&self, session: CheckoutSession) {
        self.store
            .lock()
            .unwrap()
            .checkout_sessions
            .insert(session.id.clone(), session);
    }

    pub fn insert_portal_configuration(&self, configuration: PortalConfiguration) {
        self.store
            .lock()
            .unwrap()
            .portal_configurations
            .push(configuration);
    }

    pub fn insert_invoice(&self, invoice: InvoiceInfo) {
        self.store.lock().unwrap().invoices.push(invoice);
    }

    pub fn insert_payment_intent(&self, customer_id: &str, intent: PaymentIntentInfo) {
        self.store
            .lock()
            .unwrap()
            .payment_intents
            .push((CustomerId::new(customer_id), intent));
    }

    pub fn insert_payment_method(&self, customer_id: &str, method: PaymentMethodInfo) {
        self.store
            .lock()
            .unwrap()
            .payment_methods
            .push((CustomerId::new(customer_id), method));
    }

    /// Make customer metadata updates fail with a provider error.
    pub fn fail_customer_updates(&self, fail: bool) {
        self.store.lock().unwrap().fail_customer_updates = fail;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn customer(&self, customer_id: &str) -> Option<BillingCustomer> {
        self.store.lock().unwrap().customers.get(customer_id).cloned()
    }

    pub fn checkout_session(&self, session_id: &str) -> Option<CheckoutSession> {
        self.store
            .lock()
            .unwrap()
            .checkout_sessions
            .get(session_id)
            .cloned()
    }

    pub fn created_checkout_sessions(&self) -> Vec<NewCheckoutSession> {
        self.store.lock().unwrap().created_checkout_sessions.clone()
    }

    pub fn created_portal_configurations(&self) -> Vec<NewPortalConfiguration> {
        self.store
            .lock()
            .unwrap()
            .created_portal_configurations
            .clone()
    }

    pub fn calls(&self) -> BillingCalls {
        self.store.lock().unwrap().calls
    }
}

#[async_trait]
impl BillingProviderPort for InMemoryBillingProvider {
    async fn get_customer(&self, customer_id: &CustomerId) -> AppResult<Option<BillingCustomer>> {
        let mut store = self.store.lock().unwrap();
        store.calls.get_customer += 1;
        Ok(store.customers.get(customer_id.as_str()).cloned())
    }

    async fn search_customers_by_metadata(
        &self,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<BillingCustomer>> {
        let mut store = self.store.lock().unwrap();
        store.calls.search_customers += 1;
        let mut found: Vec<BillingCustomer> = store
            .customers
            .values()
            .filter(|c| !c.deleted && c.metadata.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(found)
    }

    async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<BillingCustomer> {
        let mut store = self.store.lock().unwrap();
        store.calls.create_customer += 1;
        let id = format!("cus_new_{}", store.next_id());
        let customer = BillingCustomer {
            id: CustomerId::new(id.clone()),
            email: email.map(str::to_string),
            metadata: metadata.clone(),
            deleted: false,
            default_payment_method: None,
        };
        store.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn update_customer_metadata(
        &self,
        customer_id: &CustomerId,
        metadata: &HashMap<String, String>,
    ) -> AppResult<()> {
        let mut store = self.store.lock().unwrap();
        store.calls.update_customer += 1;
        if store.fail_customer_updates {
            return Err(AppError::BillingProvider("customer update rejected".into()));
        }
        let customer = store
            .customers
            .get_mut(customer_id.as_str())
            .ok_or(AppError::NotFound)?;
        customer
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<BillingSubscription>> {
        let mut store = self.store.lock().unwrap();
        store.calls.get_subscription += 1;
        Ok(store
            .subscriptions
            .iter()
            .find(|s| &s.id == subscription_id)
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>> {
        let mut store = self.store.lock().unwrap();
        store.calls.list_subscriptions += 1;
        Ok(store
            .subscriptions
            .iter()
            .filter(|s| &s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn get_price(&self, price_id: &str) -> AppResult<Option<BillingPrice>> {
        let store = self.store.lock().unwrap();
        Ok(store.prices.iter().find(|p| p.id == price_id).cloned())
    }

    async fn get_product(&self, product_id: &str) -> AppResult<Option<BillingProduct>> {
        let mut store = self.store.lock().unwrap();
        store.calls.get_product += 1;
        Ok(store.products.iter().find(|p| p.id == product_id).cloned())
    }

    async fn list_active_products(&self) -> AppResult<Vec<BillingProduct>> {
        let store = self.store.lock().unwrap();
        Ok(store.products.iter().filter(|p| p.active).cloned().collect())
    }

    async fn list_active_prices(&self, product_id: &str) -> AppResult<Vec<BillingPrice>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .prices
            .iter()
            .filter(|p| p.active && p.product.id() == product_id)
            .cloned()
            .collect())
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<Option<CheckoutSession>> {
        let store = self.store.lock().unwrap();
        let Some(mut session) = store.checkout_sessions.get(session_id).cloned() else {
            return Ok(None);
        };
        // Expanded objects reflect the provider's current state, not the seed.
        if let Some(Expandable::Object(customer)) = &session.customer {
            if let Some(current) = store.customers.get(customer.id.as_str()) {
                session.customer = Some(Expandable::Object(current.clone()));
            }
        }
        Ok(Some(session))
    }

    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession> {
        let mut store = self.store.lock().unwrap();
        store.calls.create_checkout_session += 1;
        store.created_checkout_sessions.push(params.clone());
        let id = format!("cs_new_{}", store.next_id());
        Ok(CreatedCheckoutSession {
            url: Some(format!("https://checkout.example.com/c/{}", id)),
            id,
        })
    }

    async fn list_portal_configurations(&self) -> AppResult<Vec<PortalConfiguration>> {
        Ok(self.store.lock().unwrap().portal_configurations.clone())
    }

    async fn get_portal_configuration(&self, id: &str) -> AppResult<Option<PortalConfiguration>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .portal_configurations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn create_portal_configuration(
        &self,
        params: &NewPortalConfiguration,
    ) -> AppResult<PortalConfiguration> {
        let mut store = self.store.lock().unwrap();
        store.calls.create_portal_configuration += 1;
        store.created_portal_configurations.push(params.clone());
        let configuration = PortalConfiguration {
            id: format!("bpc_{}", store.next_id()),
            active: true,
            is_default: false,
        };
        store.portal_configurations.push(configuration.clone());
        Ok(configuration)
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        _return_url: &str,
        configuration_id: &str,
    ) -> AppResult<String> {
        let mut store = self.store.lock().unwrap();
        store.calls.create_portal_session += 1;
        Ok(format!(
            "https://billing.example.com/p/session/{}?configuration={}",
            customer_id, configuration_id
        ))
    }

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<Option<InvoiceInfo>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .invoices
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        status: Option<&str>,
        limit: u32,
    ) -> AppResult<Vec<InvoiceInfo>> {
        let store = self.store.lock().unwrap();
        let mut invoices: Vec<InvoiceInfo> = store
            .invoices
            .iter()
            .filter(|i| i.customer_id.as_ref() == Some(customer_id))
            .filter(|i| status.is_none() || i.status.as_deref() == status)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invoices.truncate(limit as usize);
        Ok(invoices)
    }

    async fn list_payment_intents(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> AppResult<Vec<PaymentIntentInfo>> {
        let store = self.store.lock().unwrap();
        let mut intents: Vec<PaymentIntentInfo> = store
            .payment_intents
            .iter()
            .filter(|(owner, _)| owner == customer_id)
            .map(|(_, intent)| intent.clone())
            .collect();
        intents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        intents.truncate(limit as usize);
        Ok(intents)
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<PaymentMethodInfo>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .payment_methods
            .iter()
            .filter(|(owner, method)| owner == customer_id && method.kind == "card")
            .map(|(_, method)| method.clone())
            .collect())
    }
}
