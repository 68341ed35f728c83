//! Billing attributes stored on a directory user, and the back-reference tag
//! stored on a billing customer.
//!
//! Only the keys listed in [`BILLING_OWNED_KEYS`] belong to this service. Every
//! write goes through a [`MetadataFragment`] so unrelated keys are never touched.

use std::collections::HashMap;

use serde_json::Value;

pub type Metadata = serde_json::Map<String, Value>;

pub const BILLING_CUSTOMER_ID: &str = "billingCustomerId";
pub const BILLING_SUBSCRIPTION_ID: &str = "billingSubscriptionId";
pub const BILLING_PRODUCT_ID: &str = "billingProductId";
pub const PLAN_NAME: &str = "planName";
pub const SUBSCRIPTION_STATUS: &str = "subscriptionStatus";

pub const BILLING_OWNED_KEYS: [&str; 5] = [
    BILLING_CUSTOMER_ID,
    BILLING_SUBSCRIPTION_ID,
    BILLING_PRODUCT_ID,
    PLAN_NAME,
    SUBSCRIPTION_STATUS,
];

/// Written by older deployments before the key was renamed.
const LEGACY_CUSTOMER_ID: &str = "stripeCustomerId";

pub const UNKNOWN_PLAN_NAME: &str = "Unknown Plan";

/// Key on the billing customer's metadata pointing back at the directory user.
pub const CUSTOMER_BACK_REFERENCE: &str = "directoryUserId";

/// Every key a back-reference may live under, current key first.
pub const BACK_REFERENCE_KEYS: [&str; 3] =
    [CUSTOMER_BACK_REFERENCE, "auth0UserId", "auth0_user_id"];

/// Read the directory-user id tagged on a billing customer, if any.
pub fn back_reference(customer_metadata: &HashMap<String, String>) -> Option<&str> {
    BACK_REFERENCE_KEYS
        .into_iter()
        .filter_map(|key| customer_metadata.get(key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// Typed view over the billing-owned subset of a user's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingMetadata {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub product_id: Option<String>,
    pub plan_name: Option<String>,
    pub subscription_status: Option<String>,
}

impl BillingMetadata {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            customer_id: string_field(metadata, BILLING_CUSTOMER_ID)
                .or_else(|| string_field(metadata, LEGACY_CUSTOMER_ID)),
            subscription_id: string_field(metadata, BILLING_SUBSCRIPTION_ID),
            product_id: string_field(metadata, BILLING_PRODUCT_ID),
            plan_name: string_field(metadata, PLAN_NAME),
            subscription_status: string_field(metadata, SUBSCRIPTION_STATUS),
        }
    }
}

fn string_field(metadata: &Metadata, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A partial update restricted to billing-owned keys.
///
/// `Value::Null` means "clear this field".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFragment {
    fields: Metadata,
}

impl MetadataFragment {
    /// Forward link only.
    pub fn link(customer_id: &str) -> Self {
        let mut fields = Metadata::new();
        fields.insert(BILLING_CUSTOMER_ID.into(), Value::from(customer_id));
        Self { fields }
    }

    /// Projection for a subscription that grants access.
    pub fn grant(
        customer_id: &str,
        subscription_id: &str,
        product_id: Option<&str>,
        plan_name: &str,
        status: &str,
    ) -> Self {
        let mut fields = Metadata::new();
        fields.insert(BILLING_CUSTOMER_ID.into(), Value::from(customer_id));
        fields.insert(BILLING_SUBSCRIPTION_ID.into(), Value::from(subscription_id));
        fields.insert(
            BILLING_PRODUCT_ID.into(),
            product_id.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert(PLAN_NAME.into(), Value::from(plan_name));
        fields.insert(SUBSCRIPTION_STATUS.into(), Value::from(status));
        Self { fields }
    }

    /// Projection for an ended subscription: plan identity cleared, customer link kept.
    pub fn clear(customer_id: &str, status: &str) -> Self {
        let mut fields = Metadata::new();
        fields.insert(BILLING_CUSTOMER_ID.into(), Value::from(customer_id));
        fields.insert(BILLING_SUBSCRIPTION_ID.into(), Value::Null);
        fields.insert(BILLING_PRODUCT_ID.into(), Value::Null);
        fields.insert(PLAN_NAME.into(), Value::Null);
        fields.insert(SUBSCRIPTION_STATUS.into(), Value::from(status));
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Metadata {
        &self.fields
    }

    pub fn into_fields(self) -> Metadata {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The subset of this fragment that would actually change `current`.
    /// An absent key and an explicit null are treated as equal.
    pub fn changes_against(&self, current: &Metadata) -> MetadataFragment {
        let fields = self
            .fields
            .iter()
            .filter(|(key, value)| current.get(key.as_str()).unwrap_or(&Value::Null) != *value)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        MetadataFragment { fields }
    }

    /// Apply this fragment on top of `current` the way the directory does:
    /// a null removes the key, every other key is left alone.
    pub fn merge_into(&self, current: &mut Metadata) {
        for (key, value) in &self.fields {
            if value.is_null() {
                current.remove(key);
            } else {
                current.insert(key.clone(), value.clone());
            }
        }
    }
}
