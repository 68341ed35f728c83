use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

use crate::{
    app_error::{AppError, AppResult},
    infra::http_client::build_client,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Signed webhooks older (or newer) than this are rejected.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const PORTAL_CANCELLATION_REASONS: [&str; 5] = [
    "too_expensive",
    "missing_features",
    "switched_service",
    "unused",
    "other",
];

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> AppResult<Self> {
        Self::with_api_base(secret_key, STRIPE_API_BASE)
    }

    pub fn with_api_base(secret_key: SecretString, api_base: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            client: build_client()?,
            secret_key,
            api_base: api_base.into(),
        })
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    // ========================================================================
    // Customers
    // ========================================================================

    pub async fn get_customer(&self, customer_id: &str) -> AppResult<Option<StripeCustomer>> {
        self.get_optional(&format!("customers/{}", customer_id), &[])
            .await
    }

    /// Search customers by an exact metadata match.
    pub async fn search_customers_by_metadata(
        &self,
        key: &str,
        value: &str,
    ) -> AppResult<Vec<StripeCustomer>> {
        let query = metadata_search_query(key, value);
        let list: StripeList<StripeCustomer> = self
            .get("customers/search", &[("query", query), ("limit", "10".into())])
            .await?;
        Ok(list.data)
    }

    pub async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeCustomer> {
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(email) = email {
            params.push(("email".to_string(), email.to_string()));
        }
        push_metadata(&mut params, metadata);

        self.post("customers", &params).await
    }

    /// Stripe merges metadata keys on update; keys not sent are kept.
    pub async fn update_customer_metadata(
        &self,
        customer_id: &str,
        metadata: &HashMap<String, String>,
    ) -> AppResult<StripeCustomer> {
        let mut params: Vec<(String, String)> = Vec::new();
        push_metadata(&mut params, metadata);

        self.post(&format!("customers/{}", customer_id), &params)
            .await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<StripeSubscription>> {
        self.get_optional(
            &format!("subscriptions/{}", subscription_id),
            &[("expand[]", "items.data.price.product".into())],
        )
        .await
    }

    /// Every subscription of the customer, including canceled ones.
    pub async fn list_subscriptions(&self, customer_id: &str) -> AppResult<Vec<StripeSubscription>> {
        let list: StripeList<StripeSubscription> = self
            .get(
                "subscriptions",
                &[
                    ("customer", customer_id.to_string()),
                    ("status", "all".into()),
                    ("limit", "100".into()),
                ],
            )
            .await?;
        Ok(list.data)
    }

    // ========================================================================
    // Products & Prices
    // ========================================================================

    pub async fn get_price(&self, price_id: &str) -> AppResult<Option<StripePrice>> {
        self.get_optional(
            &format!("prices/{}", price_id),
            &[("expand[]", "product".into())],
        )
        .await
    }

    pub async fn get_product(&self, product_id: &str) -> AppResult<Option<StripeProduct>> {
        self.get_optional(&format!("products/{}", product_id), &[])
            .await
    }

    pub async fn list_active_products(&self) -> AppResult<Vec<StripeProduct>> {
        let list: StripeList<StripeProduct> = self
            .get(
                "products",
                &[("active", "true".into()), ("limit", "100".into())],
            )
            .await?;
        Ok(list.data)
    }

    pub async fn list_active_prices(&self, product_id: &str) -> AppResult<Vec<StripePrice>> {
        let list: StripeList<StripePrice> = self
            .get(
                "prices",
                &[
                    ("product", product_id.to_string()),
                    ("active", "true".into()),
                    ("limit", "100".into()),
                ],
            )
            .await?;
        Ok(list.data)
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> AppResult<Option<StripeCheckoutSession>> {
        self.get_optional(
            &format!("checkout/sessions/{}", session_id),
            &[
                ("expand[]", "customer".into()),
                ("expand[]", "subscription".into()),
            ],
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        client_reference_id: &str,
        trial_days: Option<i32>,
        allow_promotion_codes: bool,
    ) -> AppResult<StripeCheckoutSession> {
        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            (
                "client_reference_id".to_string(),
                client_reference_id.to_string(),
            ),
        ];

        if let Some(days) = trial_days.filter(|d| *d > 0) {
            params.push((
                "subscription_data[trial_period_days]".to_string(),
                days.to_string(),
            ));
        }

        if allow_promotion_codes {
            params.push(("allow_promotion_codes".to_string(), "true".to_string()));
        }

        self.post("checkout/sessions", &params).await
    }

    // ========================================================================
    // Customer Portal
    // ========================================================================

    pub async fn list_portal_configurations(&self) -> AppResult<Vec<StripePortalConfiguration>> {
        let list: StripeList<StripePortalConfiguration> = self
            .get(
                "billing_portal/configurations",
                &[("active", "true".into()), ("limit", "10".into())],
            )
            .await?;
        Ok(list.data)
    }

    pub async fn get_portal_configuration(
        &self,
        configuration_id: &str,
    ) -> AppResult<Option<StripePortalConfiguration>> {
        self.get_optional(
            &format!("billing_portal/configurations/{}", configuration_id),
            &[],
        )
        .await
    }

    /// Create a portal configuration allowing plan switches between the
    /// given products/prices, cancellation at period end and payment method
    /// updates.
    pub async fn create_portal_configuration(
        &self,
        headline: &str,
        products: &[(String, Vec<String>)],
    ) -> AppResult<StripePortalConfiguration> {
        let mut params: Vec<(String, String)> = vec![
            ("business_profile[headline]".into(), headline.to_string()),
            ("features[subscription_update][enabled]".into(), "true".into()),
            (
                "features[subscription_update][proration_behavior]".into(),
                "create_prorations".into(),
            ),
            ("features[subscription_cancel][enabled]".into(), "true".into()),
            (
                "features[subscription_cancel][mode]".into(),
                "at_period_end".into(),
            ),
            (
                "features[subscription_cancel][cancellation_reason][enabled]".into(),
                "true".into(),
            ),
            ("features[payment_method_update][enabled]".into(), "true".into()),
            ("features[invoice_history][enabled]".into(), "true".into()),
        ];

        for (i, update) in ["price", "quantity", "promotion_code"].iter().enumerate() {
            params.push((
                format!("features[subscription_update][default_allowed_updates][{i}]"),
                update.to_string(),
            ));
        }

        for (i, reason) in PORTAL_CANCELLATION_REASONS.iter().enumerate() {
            params.push((
                format!("features[subscription_cancel][cancellation_reason][options][{i}]"),
                reason.to_string(),
            ));
        }

        for (i, (product_id, price_ids)) in products.iter().enumerate() {
            params.push((
                format!("features[subscription_update][products][{i}][product]"),
                product_id.clone(),
            ));
            for (j, price_id) in price_ids.iter().enumerate() {
                params.push((
                    format!("features[subscription_update][products][{i}][prices][{j}]"),
                    price_id.clone(),
                ));
            }
        }

        self.post("billing_portal/configurations", &params).await
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
        configuration_id: &str,
    ) -> AppResult<StripePortalSession> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
            ("configuration".to_string(), configuration_id.to_string()),
        ];

        self.post("billing_portal/sessions", &params).await
    }

    // ========================================================================
    // Invoices & Payments
    // ========================================================================

    pub async fn get_invoice(&self, invoice_id: &str) -> AppResult<Option<StripeInvoice>> {
        self.get_optional(&format!("invoices/{}", invoice_id), &[])
            .await
    }

    pub async fn list_invoices(
        &self,
        customer_id: &str,
        status: Option<&str>,
        limit: u32,
    ) -> AppResult<Vec<StripeInvoice>> {
        let mut query = vec![
            ("customer", customer_id.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }

        let list: StripeList<StripeInvoice> = self.get("invoices", &query).await?;
        Ok(list.data)
    }

    pub async fn list_payment_intents(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> AppResult<Vec<StripePaymentIntent>> {
        let list: StripeList<StripePaymentIntent> = self
            .get(
                "payment_intents",
                &[
                    ("customer", customer_id.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(list.data)
    }

    pub async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> AppResult<Vec<StripePaymentMethod>> {
        let list: StripeList<StripePaymentMethod> = self
            .get(
                "payment_methods",
                &[
                    ("customer", customer_id.to_string()),
                    ("type", "card".into()),
                ],
            )
            .await?;
        Ok(list.data)
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
    ) -> AppResult<()> {
        Self::verify_webhook_signature_at(
            payload,
            signature_header,
            webhook_secret,
            chrono::Utc::now().timestamp(),
        )
    }

    /// Same as [`Self::verify_webhook_signature`] with an explicit clock.
    pub fn verify_webhook_signature_at(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
        now: i64,
    ) -> AppResult<()> {
        // Parse signature header: "t=timestamp,v1=signature,..."
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidSignature("Missing timestamp in signature".into()))?;

        if signatures.is_empty() {
            return Err(AppError::InvalidSignature("Missing signature".into()));
        }

        let expected = compute_signature(timestamp, payload, webhook_secret)?;

        if !signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected))
        {
            return Err(AppError::InvalidSignature("Invalid signature".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidSignature("Invalid timestamp".into()))?;
        if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(AppError::InvalidSignature(
                "Timestamp outside the tolerance zone".into(),
            ));
        }

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::BillingProvider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    /// GET that maps a 404 to `None`.
    async fn get_optional<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<Option<T>> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::BillingProvider(format!("Stripe request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(path, "Stripe object not found");
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::BillingProvider(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::BillingProvider(format!("Failed to read Stripe response: {}", e))
        })?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::BillingProvider(format!(
                    "Stripe error ({}): {}",
                    status,
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::BillingProvider(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::BillingProvider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn push_metadata(params: &mut Vec<(String, String)>, metadata: &HashMap<String, String>) {
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }
}

/// Stripe search query for `metadata['key']:'value'` with quotes escaped.
fn metadata_search_query(key: &str, value: &str) -> String {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("metadata['{}']:'{}'", escape(key), escape(value))
}

/// Hex HMAC-SHA256 over `"{timestamp}.{payload}"`.
pub fn compute_signature(timestamp: &str, payload: &str, secret: &str) -> AppResult<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(signed_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

/// A field Stripe returns as a bare id unless expanded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeExpandable<T> {
    Id(String),
    Object(Box<T>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeObjectRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Only present (and true) on the tombstone of a deleted customer.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub invoice_settings: Option<StripeInvoiceSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceSettings {
    pub default_payment_method: Option<StripeExpandable<StripeObjectRef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    pub product: StripeExpandable<StripeProduct>,
    #[serde(default)]
    pub active: bool,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripePriceRecurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePriceRecurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: StripeExpandable<StripeObjectRef>,
    pub status: String,
    /// Moved to the subscription items in newer API versions.
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub created: Option<i64>,
    pub items: StripeList<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePrice,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub mode: Option<String>,
    pub customer: Option<StripeExpandable<StripeCustomer>>,
    pub subscription: Option<StripeExpandable<StripeSubscription>>,
    pub client_reference_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePortalConfiguration {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<StripeExpandable<StripeObjectRef>>,
    pub payment_intent: Option<StripeExpandable<StripeObjectRef>>,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub number: Option<String>,
    pub description: Option<String>,
    pub created: i64,
    pub due_date: Option<i64>,
}

/// One payment applied to an invoice; `invoice` is a bare id in webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoicePayment {
    pub id: String,
    pub invoice: StripeExpandable<StripeInvoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub invoice: Option<StripeExpandable<StripeObjectRef>>,
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCard {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}

// ============================================================================
// Webhook Event Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: StripeWebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEventData {
    pub object: serde_json::Value,
}
