//! Read-only views over a user's billing state, fetched live from the
//! billing provider through the customer and subscription ids stored on
//! the user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, CardInfo, CustomerId, InvoiceInfo, PaymentIntentInfo,
        SubscriptionId,
    },
    domain::entities::{
        billing_metadata::{BillingMetadata, UNKNOWN_PLAN_NAME},
        subscription_status::SubscriptionStatus,
    },
};

use super::metadata_store::MetadataStore;

pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
const UPCOMING_INVOICE_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionDetails {
    pub id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub plan_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub interval: String,
    pub trial_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentHistoryItem {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub date: DateTime<Utc>,
    pub description: String,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingPayment {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub due_date: DateTime<Utc>,
    pub description: String,
    pub status: String,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedPaymentMethod {
    pub id: String,
    pub kind: String,
    pub card: Option<CardInfo>,
    pub is_default: bool,
}

fn invoice_description(invoice: &InvoiceInfo) -> String {
    invoice.description.clone().unwrap_or_else(|| {
        format!(
            "Invoice {}",
            invoice.invoice_number.as_deref().unwrap_or(&invoice.invoice_id)
        )
    })
}

#[derive(Clone)]
pub struct BillingOverviewUseCases {
    billing: Arc<dyn BillingProviderPort>,
    metadata: MetadataStore,
}

impl BillingOverviewUseCases {
    pub fn new(billing: Arc<dyn BillingProviderPort>, metadata: MetadataStore) -> Self {
        Self { billing, metadata }
    }

    async fn billing_metadata(&self, user_id: &str) -> AppResult<BillingMetadata> {
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;
        Ok(user.billing())
    }

    async fn customer_id(&self, user_id: &str) -> AppResult<Option<CustomerId>> {
        Ok(self
            .billing_metadata(user_id)
            .await?
            .customer_id
            .map(CustomerId::new))
    }

    #[instrument(skip(self))]
    pub async fn subscription_details(&self, user_id: &str) -> AppResult<Option<SubscriptionDetails>> {
        let stored = self.billing_metadata(user_id).await?;
        let Some(subscription_id) = stored.subscription_id.as_deref() else {
            return Ok(None);
        };

        let Some(subscription) = self
            .billing
            .get_subscription(&SubscriptionId::new(subscription_id))
            .await?
        else {
            return Ok(None);
        };
        let Some(price) = &subscription.price else {
            return Ok(None);
        };

        let product_name = match price.product.as_object() {
            Some(product) => product.name.clone(),
            None => self
                .billing
                .get_product(price.product.id())
                .await?
                .and_then(|p| p.name),
        };
        let plan_name = product_name
            .or(stored.plan_name)
            .unwrap_or_else(|| UNKNOWN_PLAN_NAME.to_string());

        Ok(Some(SubscriptionDetails {
            id: subscription.id.to_string(),
            status: subscription.status,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            plan_name,
            amount_cents: price.unit_amount.unwrap_or(0),
            currency: price.currency.clone(),
            interval: price.interval.clone().unwrap_or_else(|| "month".to_string()),
            trial_end: subscription.trial_end,
        }))
    }

    /// Paid invoices plus succeeded payments not settling one of them, newest first.
    #[instrument(skip(self))]
    pub async fn payment_history(&self, user_id: &str, limit: u32) -> AppResult<Vec<PaymentHistoryItem>> {
        let Some(customer_id) = self.customer_id(user_id).await? else {
            return Ok(Vec::new());
        };

        let (invoices, intents) = tokio::try_join!(
            self.billing.list_invoices(&customer_id, None, limit),
            self.billing.list_payment_intents(&customer_id, limit),
        )?;

        let paid: Vec<&InvoiceInfo> = invoices
            .iter()
            .filter(|inv| inv.status.as_deref() == Some("paid") && inv.amount_paid_cents > 0)
            .collect();

        // An invoice and the payment that settled it are one charge.
        let covered_by_invoice = |intent: &PaymentIntentInfo| {
            paid.iter().any(|inv| {
                inv.payment_intent_id.as_deref() == Some(intent.payment_intent_id.as_str())
                    || intent.invoice_id.as_deref() == Some(inv.invoice_id.as_str())
            })
        };

        let mut history: Vec<PaymentHistoryItem> = paid
            .iter()
            .map(|inv| PaymentHistoryItem {
                id: inv.invoice_id.clone(),
                amount_cents: inv.amount_paid_cents,
                currency: inv.currency.clone(),
                status: "paid".to_string(),
                date: inv.created_at,
                description: invoice_description(inv),
                invoice_url: inv.hosted_url.clone(),
            })
            .collect();

        for intent in intents {
            if intent.status != "succeeded" || intent.amount_cents <= 0 {
                continue;
            }
            if covered_by_invoice(&intent) {
                continue;
            }
            history.push(PaymentHistoryItem {
                id: intent.payment_intent_id,
                amount_cents: intent.amount_cents,
                currency: intent.currency,
                status: intent.status,
                date: intent.created_at,
                description: intent.description.unwrap_or_else(|| "Payment".to_string()),
                invoice_url: None,
            });
        }

        history.sort_by(|a, b| b.date.cmp(&a.date));
        history.truncate(limit as usize);
        Ok(history)
    }

    /// Open invoices, earliest due first.
    #[instrument(skip(self))]
    pub async fn upcoming_payments(&self, user_id: &str) -> AppResult<Vec<UpcomingPayment>> {
        let Some(customer_id) = self.customer_id(user_id).await? else {
            return Ok(Vec::new());
        };

        let mut upcoming: Vec<UpcomingPayment> = self
            .billing
            .list_invoices(&customer_id, Some("open"), UPCOMING_INVOICE_LIMIT)
            .await?
            .into_iter()
            .map(|inv| UpcomingPayment {
                description: invoice_description(&inv),
                id: inv.invoice_id,
                amount_cents: inv.amount_due_cents,
                currency: inv.currency,
                due_date: inv.due_at.unwrap_or(inv.created_at),
                status: inv.status.unwrap_or_else(|| "open".to_string()),
                invoice_url: inv.hosted_url,
            })
            .collect();

        upcoming.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(upcoming)
    }

    #[instrument(skip(self))]
    pub async fn payment_methods(&self, user_id: &str) -> AppResult<Vec<SavedPaymentMethod>> {
        let Some(customer_id) = self.customer_id(user_id).await? else {
            return Ok(Vec::new());
        };

        let (methods, customer) = tokio::try_join!(
            self.billing.list_card_payment_methods(&customer_id),
            self.billing.get_customer(&customer_id),
        )?;
        let default_id = customer
            .filter(|c| !c.deleted)
            .and_then(|c| c.default_payment_method);

        Ok(methods
            .into_iter()
            .map(|pm| SavedPaymentMethod {
                is_default: default_id.as_deref() == Some(pm.payment_method_id.as_str()),
                id: pm.payment_method_id,
                kind: pm.kind,
                card: pm.card,
            })
            .collect())
    }
}
