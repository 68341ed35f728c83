use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    app_error::AppResult, domain::entities::subscription_status::SubscriptionStatus,
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Unique identifier for a customer in the billing provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription in the billing provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything the provider can hand back either as a bare id or as a full object.
pub trait Identified {
    fn identifier(&self) -> &str;
}

/// A reference that may or may not have been expanded by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Expandable<T> {
    Id(String),
    Object(T),
}

impl<T: Identified> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.identifier(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingCustomer {
    pub id: CustomerId,
    pub email: Option<String>,
    pub metadata: HashMap<String, String>,
    /// The provider keeps a tombstone for deleted customers.
    pub deleted: bool,
    pub default_payment_method: Option<String>,
}

impl Identified for BillingCustomer {
    fn identifier(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingProduct {
    pub id: String,
    pub name: Option<String>,
    pub active: bool,
}

impl Identified for BillingProduct {
    fn identifier(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingPrice {
    pub id: String,
    pub product: Expandable<BillingProduct>,
    pub active: bool,
    pub unit_amount: Option<i64>,
    pub currency: String,
    /// Recurring interval ("month", "year", ...), absent for one-time prices
    pub interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingSubscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    /// Price of the first subscription item
    pub price: Option<BillingPrice>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

impl BillingSubscription {
    pub fn price_id(&self) -> Option<&str> {
        self.price.as_ref().map(|p| p.id.as_str())
    }

    pub fn product_id(&self) -> Option<&str> {
        self.price.as_ref().map(|p| p.product.id())
    }
}

impl Identified for BillingSubscription {
    fn identifier(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    /// "subscription", "payment" or "setup"
    pub mode: Option<String>,
    pub customer: Option<Expandable<BillingCustomer>>,
    pub subscription: Option<Expandable<BillingSubscription>>,
    /// Caller-supplied reference; carries the directory-user id
    pub client_reference_id: Option<String>,
}

impl CheckoutSession {
    pub fn is_subscription_mode(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }
}

/// Parameters for a hosted checkout session
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub customer_id: CustomerId,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    pub trial_days: Option<i32>,
    pub allow_promotion_codes: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfiguration {
    pub id: String,
    pub active: bool,
    pub is_default: bool,
}

/// A product and the prices customers may switch between in the portal
#[derive(Debug, Clone, PartialEq)]
pub struct PortalProductOffer {
    pub product_id: String,
    pub price_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewPortalConfiguration {
    pub headline: String,
    pub products: Vec<PortalProductOffer>,
}

/// Invoice information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceInfo {
    pub invoice_id: String,
    pub customer_id: Option<CustomerId>,
    /// The payment that settled this invoice, if any.
    pub payment_intent_id: Option<String>,
    pub amount_due_cents: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_url: Option<String>,
    pub invoice_number: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
}

impl Identified for InvoiceInfo {
    fn identifier(&self) -> &str {
        &self.invoice_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntentInfo {
    pub payment_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    /// Set when the payment was raised by an invoice.
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardInfo {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMethodInfo {
    pub payment_method_id: String,
    pub kind: String,
    pub card: Option<CardInfo>,
}

// ============================================================================
// Billing Provider Port
// ============================================================================

/// Billing provider port - the subset of the provider API the reconciliation
/// engine consumes.
///
/// Lookups return `Ok(None)` when the provider reports the object missing;
/// transport and API failures surface as `AppError::BillingProvider`.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    // ========================================================================
    // Customers
    // ========================================================================

    async fn get_customer(&self, customer_id: &CustomerId) -> AppResult<Option<BillingCustomer>>;

    /// Find customers whose metadata has `key` set to exactly `value`.
    async fn search_customers_by_metadata(
        &self,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<BillingCustomer>>;

    async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<BillingCustomer>;

    /// Set the given metadata keys; other keys on the customer are kept.
    async fn update_customer_metadata(
        &self,
        customer_id: &CustomerId,
        metadata: &HashMap<String, String>,
    ) -> AppResult<()>;

    // ========================================================================
    // Subscriptions, Prices & Products
    // ========================================================================

    /// Fetch a subscription with its first item's price and product expanded.
    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<BillingSubscription>>;

    /// All subscriptions of a customer, whatever their status.
    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>>;

    async fn get_price(&self, price_id: &str) -> AppResult<Option<BillingPrice>>;

    async fn get_product(&self, product_id: &str) -> AppResult<Option<BillingProduct>>;

    async fn list_active_products(&self) -> AppResult<Vec<BillingProduct>>;

    async fn list_active_prices(&self, product_id: &str) -> AppResult<Vec<BillingPrice>>;

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Retrieve a checkout session with customer and subscription expanded.
    async fn retrieve_checkout_session(&self, session_id: &str)
    -> AppResult<Option<CheckoutSession>>;

    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession>;

    // ========================================================================
    // Portal & Self-Service
    // ========================================================================

    async fn list_portal_configurations(&self) -> AppResult<Vec<PortalConfiguration>>;

    async fn get_portal_configuration(&self, id: &str) -> AppResult<Option<PortalConfiguration>>;

    async fn create_portal_configuration(
        &self,
        params: &NewPortalConfiguration,
    ) -> AppResult<PortalConfiguration>;

    /// Returns the portal URL.
    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
        configuration_id: &str,
    ) -> AppResult<String>;

    // ========================================================================
    // Invoices & Payments
    // ========================================================================

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<Option<InvoiceInfo>>;

    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        status: Option<&str>,
        limit: u32,
    ) -> AppResult<Vec<InvoiceInfo>>;

    async fn list_payment_intents(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> AppResult<Vec<PaymentIntentInfo>>;

    async fn list_card_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<PaymentMethodInfo>>;
}
