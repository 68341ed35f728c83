//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;

use crate::{
    application::ports::billing_provider::{
        BillingCustomer, BillingPrice, BillingProduct, BillingSubscription, CheckoutSession,
        CustomerId, Expandable, InvoiceInfo, SubscriptionId,
    },
    domain::entities::{
        billing_metadata::Metadata, directory_user::DirectoryUser,
        subscription_status::SubscriptionStatus,
    },
};

/// Fixed timestamp so fixtures compare deterministically.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// Create a directory user with empty metadata.
pub fn create_test_user(id: &str, overrides: impl FnOnce(&mut DirectoryUser)) -> DirectoryUser {
    let mut user = DirectoryUser {
        id: id.to_string(),
        email: Some("user@example.com".to_string()),
        metadata: Metadata::new(),
    };
    overrides(&mut user);
    user
}

/// Create a live billing customer without any metadata tags.
pub fn create_test_customer(
    id: &str,
    overrides: impl FnOnce(&mut BillingCustomer),
) -> BillingCustomer {
    let mut customer = BillingCustomer {
        id: CustomerId::new(id),
        email: Some("user@example.com".to_string()),
        metadata: HashMap::new(),
        deleted: false,
        default_payment_method: None,
    };
    overrides(&mut customer);
    customer
}

pub fn create_test_product(id: &str, name: &str) -> BillingProduct {
    BillingProduct {
        id: id.to_string(),
        name: Some(name.to_string()),
        active: true,
    }
}

/// Create an active monthly price of 19.00 USD with the product unexpanded.
pub fn create_test_price(
    id: &str,
    product_id: &str,
    overrides: impl FnOnce(&mut BillingPrice),
) -> BillingPrice {
    let mut price = BillingPrice {
        id: id.to_string(),
        product: Expandable::Id(product_id.to_string()),
        active: true,
        unit_amount: Some(1900),
        currency: "usd".to_string(),
        interval: Some("month".to_string()),
    };
    overrides(&mut price);
    price
}

/// Create an active subscription on the "Pro" plan (`price_pro` / `prod_pro`),
/// with the product expanded as the provider returns it on retrieval.
pub fn create_test_subscription(
    id: &str,
    customer_id: &str,
    overrides: impl FnOnce(&mut BillingSubscription),
) -> BillingSubscription {
    let now = test_datetime();
    let mut subscription = BillingSubscription {
        id: SubscriptionId::new(id),
        customer_id: CustomerId::new(customer_id),
        status: SubscriptionStatus::Active,
        price: Some(create_test_price("price_pro", "prod_pro", |p| {
            p.product = Expandable::Object(create_test_product("prod_pro", "Pro"));
        })),
        current_period_start: Some(now),
        current_period_end: Some(now + Duration::days(30)),
        cancel_at_period_end: false,
        trial_end: None,
        created: Some(now),
    };
    overrides(&mut subscription);
    subscription
}

/// Create a completed subscription-mode checkout session as retrieved with
/// the customer expanded and the subscription left as an id.
pub fn create_test_checkout_session(
    id: &str,
    customer: BillingCustomer,
    subscription_id: &str,
    user_id: &str,
) -> CheckoutSession {
    CheckoutSession {
        id: id.to_string(),
        mode: Some("subscription".to_string()),
        customer: Some(Expandable::Object(customer)),
        subscription: Some(Expandable::Id(subscription_id.to_string())),
        client_reference_id: Some(user_id.to_string()),
    }
}

/// Create a paid 19.00 USD invoice.
pub fn create_test_invoice(
    id: &str,
    customer_id: &str,
    overrides: impl FnOnce(&mut InvoiceInfo),
) -> InvoiceInfo {
    let mut invoice = InvoiceInfo {
        invoice_id: id.to_string(),
        customer_id: Some(CustomerId::new(customer_id)),
        payment_intent_id: None,
        amount_due_cents: 1900,
        amount_paid_cents: 1900,
        currency: "usd".to_string(),
        status: Some("paid".to_string()),
        hosted_url: Some(format!("https://invoice.example.com/{}", id)),
        invoice_number: Some(format!("INV-{}", id)),
        description: None,
        created_at: test_datetime(),
        due_at: None,
    };
    overrides(&mut invoice);
    invoice
}
