use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::HashMap;

use crate::{
    app_error::AppResult,
    application::ports::billing_provider::{
        BillingCustomer, BillingPrice, BillingProduct, BillingProviderPort, BillingSubscription,
        CardInfo, CheckoutSession, CreatedCheckoutSession, CustomerId, Expandable, InvoiceInfo,
        NewCheckoutSession, NewPortalConfiguration, PaymentIntentInfo, PaymentMethodInfo,
        PortalConfiguration, SubscriptionId,
    },
    domain::entities::subscription_status::SubscriptionStatus,
    infra::stripe_client::{
        StripeCheckoutSession, StripeClient, StripeCustomer, StripeExpandable, StripeInvoice,
        StripeObjectRef, StripePaymentIntent, StripePaymentMethod, StripePortalConfiguration,
        StripePrice, StripeProduct, StripeSubscription,
    },
};

/// Adapter that wraps StripeClient to implement BillingProviderPort.
#[derive(Clone)]
pub struct StripeBillingAdapter {
    client: StripeClient,
}

impl StripeBillingAdapter {
    pub fn new(secret_key: SecretString) -> AppResult<Self> {
        Ok(Self {
            client: StripeClient::new(secret_key)?,
        })
    }
}

// ============================================================================
// Conversions
// ============================================================================

pub(crate) fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

fn ref_id(reference: &StripeExpandable<StripeObjectRef>) -> &str {
    match reference {
        StripeExpandable::Id(id) => id,
        StripeExpandable::Object(obj) => &obj.id,
    }
}

pub(crate) fn customer_from_stripe(customer: StripeCustomer) -> BillingCustomer {
    let default_payment_method = customer
        .invoice_settings
        .and_then(|s| s.default_payment_method)
        .map(|pm| ref_id(&pm).to_string());

    BillingCustomer {
        id: CustomerId::new(customer.id),
        email: customer.email,
        metadata: customer.metadata,
        deleted: customer.deleted,
        default_payment_method,
    }
}

fn product_from_stripe(product: StripeProduct) -> BillingProduct {
    BillingProduct {
        id: product.id,
        name: product.name,
        active: product.active,
    }
}

fn price_from_stripe(price: StripePrice) -> BillingPrice {
    let product = match price.product {
        StripeExpandable::Id(id) => Expandable::Id(id),
        StripeExpandable::Object(product) => Expandable::Object(product_from_stripe(*product)),
    };

    BillingPrice {
        id: price.id,
        product,
        active: price.active,
        unit_amount: price.unit_amount,
        currency: price.currency,
        interval: price.recurring.map(|r| r.interval),
    }
}

pub(crate) fn subscription_from_stripe(subscription: StripeSubscription) -> BillingSubscription {
    let first_item = subscription.items.data.into_iter().next();

    // Newer API versions only report the billing period on the item.
    let period_start = subscription
        .current_period_start
        .or_else(|| first_item.as_ref().and_then(|i| i.current_period_start));
    let period_end = subscription
        .current_period_end
        .or_else(|| first_item.as_ref().and_then(|i| i.current_period_end));

    BillingSubscription {
        customer_id: CustomerId::new(ref_id(&subscription.customer)),
        id: SubscriptionId::new(subscription.id),
        status: SubscriptionStatus::from_stripe(&subscription.status),
        price: first_item.map(|item| price_from_stripe(item.price)),
        current_period_start: period_start.and_then(timestamp_to_datetime),
        current_period_end: period_end.and_then(timestamp_to_datetime),
        cancel_at_period_end: subscription.cancel_at_period_end,
        trial_end: subscription.trial_end.and_then(timestamp_to_datetime),
        created: subscription.created.and_then(timestamp_to_datetime),
    }
}

pub(crate) fn checkout_session_from_stripe(session: StripeCheckoutSession) -> CheckoutSession {
    let customer = session.customer.map(|c| match c {
        StripeExpandable::Id(id) => Expandable::Id(id),
        StripeExpandable::Object(customer) => Expandable::Object(customer_from_stripe(*customer)),
    });
    let subscription = session.subscription.map(|s| match s {
        StripeExpandable::Id(id) => Expandable::Id(id),
        StripeExpandable::Object(sub) => Expandable::Object(subscription_from_stripe(*sub)),
    });

    CheckoutSession {
        id: session.id,
        mode: session.mode,
        customer,
        subscription,
        client_reference_id: session.client_reference_id,
    }
}

pub(crate) fn invoice_from_stripe(invoice: StripeInvoice) -> InvoiceInfo {
    InvoiceInfo {
        customer_id: invoice.customer.as_ref().map(|c| CustomerId::new(ref_id(c))),
        payment_intent_id: invoice.payment_intent.as_ref().map(|pi| ref_id(pi).to_string()),
        invoice_id: invoice.id,
        amount_due_cents: invoice.amount_due,
        amount_paid_cents: invoice.amount_paid,
        currency: invoice.currency,
        status: invoice.status,
        hosted_url: invoice.hosted_invoice_url,
        invoice_number: invoice.number,
        description: invoice.description,
        created_at: timestamp_to_datetime(invoice.created).unwrap_or_else(Utc::now),
        due_at: invoice.due_date.and_then(timestamp_to_datetime),
    }
}

fn payment_intent_from_stripe(intent: StripePaymentIntent) -> PaymentIntentInfo {
    PaymentIntentInfo {
        payment_intent_id: intent.id,
        amount_cents: intent.amount,
        currency: intent.currency,
        status: intent.status,
        description: intent.description,
        invoice_id: intent.invoice.as_ref().map(|inv| ref_id(inv).to_string()),
        created_at: timestamp_to_datetime(intent.created).unwrap_or_else(Utc::now),
    }
}

fn payment_method_from_stripe(method: StripePaymentMethod) -> PaymentMethodInfo {
    PaymentMethodInfo {
        payment_method_id: method.id,
        kind: method.kind,
        card: method.card.map(|card| CardInfo {
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        }),
    }
}

fn portal_configuration_from_stripe(config: StripePortalConfiguration) -> PortalConfiguration {
    PortalConfiguration {
        id: config.id,
        active: config.active,
        is_default: config.is_default,
    }
}

#[async_trait]
impl BillingProviderPort for StripeBillingAdapter {
    // ========================================================================
    // Customers
    // ========================================================================

    async fn get_customer(&self, customer_id: &CustomerId) -> AppResult<Option<BillingCustomer>> {
        Ok(self
            .client
            .get_customer(customer_id.as_str())
            .await?
            .map(customer_from_stripe))
    }

    async fn search_customers_by_metadata(
        &self,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<BillingCustomer>> {
        Ok(self
            .client
            .search_customers_by_metadata(key, value)
            .await?
            .into_iter()
            .map(customer_from_stripe)
            .collect())
    }

    async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<BillingCustomer> {
        let customer = self.client.create_customer(email, metadata).await?;
        Ok(customer_from_stripe(customer))
    }

    async fn update_customer_metadata(
        &self,
        customer_id: &CustomerId,
        metadata: &HashMap<String, String>,
    ) -> AppResult<()> {
        self.client
            .update_customer_metadata(customer_id.as_str(), metadata)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Subscriptions, Prices & Products
    // ========================================================================

    async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<Option<BillingSubscription>> {
        Ok(self
            .client
            .get_subscription(subscription_id.as_str())
            .await?
            .map(subscription_from_stripe))
    }

    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>> {
        Ok(self
            .client
            .list_subscriptions(customer_id.as_str())
            .await?
            .into_iter()
            .map(subscription_from_stripe)
            .collect())
    }

    async fn get_price(&self, price_id: &str) -> AppResult<Option<BillingPrice>> {
        Ok(self.client.get_price(price_id).await?.map(price_from_stripe))
    }

    async fn get_product(&self, product_id: &str) -> AppResult<Option<BillingProduct>> {
        Ok(self
            .client
            .get_product(product_id)
            .await?
            .map(product_from_stripe))
    }

    async fn list_active_products(&self) -> AppResult<Vec<BillingProduct>> {
        Ok(self
            .client
            .list_active_products()
            .await?
            .into_iter()
            .map(product_from_stripe)
            .collect())
    }

    async fn list_active_prices(&self, product_id: &str) -> AppResult<Vec<BillingPrice>> {
        Ok(self
            .client
            .list_active_prices(product_id)
            .await?
            .into_iter()
            .map(price_from_stripe)
            .collect())
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<Option<CheckoutSession>> {
        Ok(self
            .client
            .retrieve_checkout_session(session_id)
            .await?
            .map(checkout_session_from_stripe))
    }

    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession> {
        let session = self
            .client
            .create_checkout_session(
                params.customer_id.as_str(),
                &params.price_id,
                &params.success_url,
                &params.cancel_url,
                &params.client_reference_id,
                params.trial_days,
                params.allow_promotion_codes,
            )
            .await?;

        Ok(CreatedCheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    // ========================================================================
    // Portal & Self-Service
    // ========================================================================

    async fn list_portal_configurations(&self) -> AppResult<Vec<PortalConfiguration>> {
        Ok(self
            .client
            .list_portal_configurations()
            .await?
            .into_iter()
            .map(portal_configuration_from_stripe)
            .collect())
    }

    async fn get_portal_configuration(&self, id: &str) -> AppResult<Option<PortalConfiguration>> {
        Ok(self
            .client
            .get_portal_configuration(id)
            .await?
            .map(portal_configuration_from_stripe))
    }

    async fn create_portal_configuration(
        &self,
        params: &NewPortalConfiguration,
    ) -> AppResult<PortalConfiguration> {
        let products: Vec<(String, Vec<String>)> = params
            .products
            .iter()
            .map(|offer| (offer.product_id.clone(), offer.price_ids.clone()))
            .collect();

        let config = self
            .client
            .create_portal_configuration(&params.headline, &products)
            .await?;
        Ok(portal_configuration_from_stripe(config))
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
        configuration_id: &str,
    ) -> AppResult<String> {
        let session = self
            .client
            .create_portal_session(customer_id.as_str(), return_url, configuration_id)
            .await?;
        Ok(session.url)
    }

    // ========================================================================
    // Invoices & Payments
    // ========================================================================

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<Option<InvoiceInfo>> {
        Ok(self
            .client
            .get_invoice(invoice_id)
            .await?
            .map(invoice_from_stripe))
    }

    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        status: Option<&str>,
        limit: u32,
    ) -> AppResult<Vec<InvoiceInfo>> {
        Ok(self
            .client
            .list_invoices(customer_id.as_str(), status, limit)
            .await?
            .into_iter()
            .map(invoice_from_stripe)
            .collect())
    }

    async fn list_payment_intents(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> AppResult<Vec<PaymentIntentInfo>> {
        Ok(self
            .client
            .list_payment_intents(customer_id.as_str(), limit)
            .await?
            .into_iter()
            .map(payment_intent_from_stripe)
            .collect())
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<PaymentMethodInfo>> {
        Ok(self
            .client
            .list_card_payment_methods(customer_id.as_str())
            .await?
            .into_iter()
            .map(payment_method_from_stripe)
            .collect())
    }
}
