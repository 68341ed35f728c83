use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{BillingCustomer, BillingProviderPort, CustomerId},
    domain::entities::{
        billing_metadata::{
            BACK_REFERENCE_KEYS, CUSTOMER_BACK_REFERENCE, MetadataFragment, back_reference,
        },
        directory_user::DirectoryUser,
    },
};

use super::metadata_store::{MergeOutcome, MetadataStore};

/// Result of the link operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOutcome {
    /// The user's forward link was written (it was absent or pointed elsewhere).
    pub forward_written: bool,
    /// The customer's back-reference tag is known to be in place.
    pub back_reference_tagged: bool,
}

/// A billing customer together with the directory user its tag points at.
#[derive(Debug, Clone)]
pub struct CustomerOwner {
    pub user: DirectoryUser,
    pub customer: BillingCustomer,
}

/// Maps directory users to billing customers and repairs the link between them.
///
/// The forward link (`billingCustomerId` on the user) is authoritative. The
/// back-reference tag on the customer is a search aid and is written
/// best-effort.
#[derive(Clone)]
pub struct CustomerIdentityResolver {
    billing: Arc<dyn BillingProviderPort>,
    metadata: MetadataStore,
}

impl CustomerIdentityResolver {
    pub fn new(billing: Arc<dyn BillingProviderPort>, metadata: MetadataStore) -> Self {
        Self { billing, metadata }
    }

    /// Return a verified billing-customer id for the user, or `None` if the
    /// user has no customer yet. Never creates customers.
    #[instrument(skip(self))]
    pub async fn resolve_billing_customer(
        &self,
        user_id: &str,
        known_customer_id: Option<&CustomerId>,
    ) -> AppResult<Option<CustomerId>> {
        if let Some(known) = known_customer_id {
            match self.billing.get_customer(known).await? {
                Some(customer) if !customer.deleted => return Ok(Some(customer.id)),
                Some(_) => {
                    warn!(customer_id = %known, "Linked customer was deleted, searching by tag")
                }
                None => warn!(customer_id = %known, "Linked customer not found, searching by tag"),
            }
        }

        match self.search_by_back_reference(user_id).await? {
            Some(customer) => {
                info!(customer_id = %customer.id, "Found customer by back-reference tag");
                self.ensure_link_for_customer(user_id, &customer).await?;
                Ok(Some(customer.id))
            }
            None => {
                debug!("No billing customer for user");
                Ok(None)
            }
        }
    }

    /// Search each back-reference key in turn, current key first. Customers
    /// tagged by older deployments only carry a legacy key.
    async fn search_by_back_reference(&self, user_id: &str) -> AppResult<Option<BillingCustomer>> {
        for key in BACK_REFERENCE_KEYS {
            let found = self
                .billing
                .search_customers_by_metadata(key, user_id)
                .await?
                .into_iter()
                .find(|c| !c.deleted);
            if found.is_some() {
                if key != CUSTOMER_BACK_REFERENCE {
                    debug!(tag_key = key, "Matched customer on legacy back-reference key");
                }
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Resolve using the forward link stored on the user.
    pub async fn resolve_for_user(&self, user: &DirectoryUser) -> AppResult<Option<CustomerId>> {
        let known = user.billing().customer_id.map(CustomerId::new);
        self.resolve_billing_customer(&user.id, known.as_ref()).await
    }

    /// Bind `customer_id` to the user in both directions.
    ///
    /// The forward link is only written when absent or different. The
    /// back-reference tag is always (re)written but a failure there is logged
    /// and swallowed.
    #[instrument(skip(self))]
    pub async fn ensure_billing_customer_id(
        &self,
        user_id: &str,
        customer_id: &CustomerId,
    ) -> AppResult<LinkOutcome> {
        let forward_written = self.link_forward(user_id, customer_id).await?;
        let back_reference_tagged = self.tag_back_reference(user_id, customer_id).await;
        Ok(LinkOutcome {
            forward_written,
            back_reference_tagged,
        })
    }

    /// Same as [`Self::ensure_billing_customer_id`] for a customer object we
    /// already hold; the tag write is skipped when it is already correct.
    ///
    /// Skipping matters on the customer-updated path: rewriting an identical
    /// tag would emit yet another customer-updated event.
    pub async fn ensure_link_for_customer(
        &self,
        user_id: &str,
        customer: &BillingCustomer,
    ) -> AppResult<LinkOutcome> {
        let forward_written = self.link_forward(user_id, &customer.id).await?;
        let already_tagged = customer
            .metadata
            .get(CUSTOMER_BACK_REFERENCE)
            .is_some_and(|v| v == user_id);
        let back_reference_tagged = if already_tagged {
            true
        } else {
            self.tag_back_reference(user_id, &customer.id).await
        };
        Ok(LinkOutcome {
            forward_written,
            back_reference_tagged,
        })
    }

    /// Find the directory user that owns a billing customer, following the
    /// customer's back-reference tag. Deleted customers, untagged customers
    /// and dangling tags all resolve to `None`.
    #[instrument(skip(self))]
    pub async fn find_owner(&self, customer_id: &CustomerId) -> AppResult<Option<CustomerOwner>> {
        let Some(customer) = self.billing.get_customer(customer_id).await? else {
            warn!("Billing customer not found");
            return Ok(None);
        };
        if customer.deleted {
            warn!("Billing customer is deleted");
            return Ok(None);
        }

        let Some(user_id) = back_reference(&customer.metadata).map(str::to_string) else {
            info!("Billing customer carries no directory user tag");
            return Ok(None);
        };

        match self.metadata.read(&user_id).await? {
            Some(user) => Ok(Some(CustomerOwner { user, customer })),
            None => {
                warn!(user_id, "Tagged directory user does not exist");
                Ok(None)
            }
        }
    }

    async fn link_forward(&self, user_id: &str, customer_id: &CustomerId) -> AppResult<bool> {
        let user = self
            .metadata
            .read(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let previous = user.billing().customer_id;

        let outcome = self
            .metadata
            .merge_onto(&user, &MetadataFragment::link(customer_id.as_str()))
            .await?;

        if let MergeOutcome::Written(_) = outcome {
            match previous {
                Some(prev) => info!(
                    user_id,
                    previous_customer_id = %prev,
                    customer_id = %customer_id,
                    "Replaced billing customer link"
                ),
                None => info!(user_id, customer_id = %customer_id, "Set billing customer link"),
            }
            return Ok(true);
        }
        Ok(false)
    }

    async fn tag_back_reference(&self, user_id: &str, customer_id: &CustomerId) -> bool {
        let mut tag = HashMap::new();
        tag.insert(CUSTOMER_BACK_REFERENCE.to_string(), user_id.to_string());

        match self.billing.update_customer_metadata(customer_id, &tag).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error = %e,
                    user_id,
                    customer_id = %customer_id,
                    "Failed to tag billing customer with directory user id"
                );
                false
            }
        }
    }
}
