use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{BillingProviderPort, BillingSubscription},
    domain::entities::{
        billing_metadata::{BillingMetadata, MetadataFragment, UNKNOWN_PLAN_NAME},
        directory_user::DirectoryUser,
        subscription_status::ProjectionPolicy,
    },
};

use super::{
    customer_identity::CustomerIdentityResolver,
    metadata_store::{MergeOutcome, MetadataStore},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionOutcome {
    Written {
        user_id: String,
        fragment: MetadataFragment,
    },
    /// The user's metadata already matched the projection.
    Unchanged { user_id: String },
    /// No directory user could be resolved for the subscription's customer.
    OwnerNotFound,
    /// The user has no billing customer or the customer has no subscriptions.
    NothingToProject,
}

/// Compute the metadata fragment for a subscription.
///
/// `product_name` is the dereferenced product's name; the stored plan name and
/// then [`UNKNOWN_PLAN_NAME`] are used when it is missing.
pub fn project(
    subscription: &BillingSubscription,
    current: &BillingMetadata,
    product_name: Option<&str>,
) -> AppResult<MetadataFragment> {
    let customer_id = subscription.customer_id.as_str();
    let status = subscription.status.as_str();

    match subscription.status.projection_policy() {
        ProjectionPolicy::Grant => {
            if subscription.price.is_none() {
                return Err(AppError::InvalidData(format!(
                    "Subscription {} has no price",
                    subscription.id
                )));
            }
            let plan_name = product_name
                .or(current.plan_name.as_deref())
                .unwrap_or(UNKNOWN_PLAN_NAME);
            Ok(MetadataFragment::grant(
                customer_id,
                subscription.id.as_str(),
                subscription.product_id(),
                plan_name,
                status,
            ))
        }
        ProjectionPolicy::Clear => Ok(MetadataFragment::clear(customer_id, status)),
        ProjectionPolicy::Undefined => Err(AppError::UnprojectedStatus(subscription.status)),
    }
}

/// Writes a subscription's state into its owner's directory metadata.
#[derive(Clone)]
pub struct SubscriptionProjector {
    billing: Arc<dyn BillingProviderPort>,
    identity: CustomerIdentityResolver,
    metadata: MetadataStore,
}

impl SubscriptionProjector {
    pub fn new(
        billing: Arc<dyn BillingProviderPort>,
        identity: CustomerIdentityResolver,
        metadata: MetadataStore,
    ) -> Self {
        Self {
            billing,
            identity,
            metadata,
        }
    }

    /// Project onto whichever user the subscription's customer is tagged with.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id, customer_id = %subscription.customer_id))]
    pub async fn project_subscription(
        &self,
        subscription: &BillingSubscription,
    ) -> AppResult<ProjectionOutcome> {
        let Some(owner) = self.identity.find_owner(&subscription.customer_id).await? else {
            warn!("No directory user for subscription, skipping projection");
            return Ok(ProjectionOutcome::OwnerNotFound);
        };
        self.apply(&owner.user, subscription).await
    }

    /// Project onto a user already known to own the subscription.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn project_for_user(
        &self,
        user_id: &str,
        subscription: &BillingSubscription,
    ) -> AppResult<ProjectionOutcome> {
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;
        self.apply(&user, subscription).await
    }

    /// Re-read a subscription from the billing provider so an out-of-order
    /// delivery cannot overwrite newer state. Falls back to `subscription`
    /// when the provider no longer returns it.
    pub async fn refresh(&self, subscription: &BillingSubscription) -> AppResult<BillingSubscription> {
        match self.billing.get_subscription(&subscription.id).await? {
            Some(current) => {
                if current.status != subscription.status {
                    debug!(
                        subscription_id = %subscription.id,
                        payload_status = %subscription.status,
                        current_status = %current.status,
                        "Subscription status moved on since the event was sent"
                    );
                }
                Ok(current)
            }
            None => {
                warn!(subscription_id = %subscription.id, "Subscription not found upstream, using event payload");
                Ok(subscription.clone())
            }
        }
    }

    /// Recompute a user's billing metadata from the provider, outside of any event.
    #[instrument(skip(self))]
    pub async fn resync_user(&self, user_id: &str) -> AppResult<ProjectionOutcome> {
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;

        let Some(customer_id) = self.identity.resolve_for_user(&user).await? else {
            info!("User has no billing customer, nothing to resync");
            return Ok(ProjectionOutcome::NothingToProject);
        };

        let subscriptions = self.billing.list_subscriptions(&customer_id).await?;
        let Some(subscription) = pick_current(subscriptions) else {
            info!(customer_id = %customer_id, "Customer has no subscriptions, nothing to resync");
            return Ok(ProjectionOutcome::NothingToProject);
        };

        // The customer link may have just been repaired, so re-read before diffing.
        let user = self.metadata.read(user_id).await?.ok_or(AppError::NotFound)?;
        self.apply(&user, &subscription).await
    }

    async fn apply(
        &self,
        user: &DirectoryUser,
        subscription: &BillingSubscription,
    ) -> AppResult<ProjectionOutcome> {
        let product_name = match subscription.status.projection_policy() {
            ProjectionPolicy::Grant => self.product_name(subscription).await?,
            _ => None,
        };

        let fragment = project(subscription, &user.billing(), product_name.as_deref())?;

        match self.metadata.merge_onto(user, &fragment).await? {
            MergeOutcome::Written(written) => {
                info!(
                    user_id = %user.id,
                    subscription_id = %subscription.id,
                    status = %subscription.status,
                    "Projected subscription onto user"
                );
                Ok(ProjectionOutcome::Written {
                    user_id: user.id.clone(),
                    fragment: written,
                })
            }
            MergeOutcome::Unchanged => Ok(ProjectionOutcome::Unchanged {
                user_id: user.id.clone(),
            }),
        }
    }

    async fn product_name(&self, subscription: &BillingSubscription) -> AppResult<Option<String>> {
        let Some(price) = &subscription.price else {
            return Ok(None);
        };
        if let Some(product) = price.product.as_object() {
            return Ok(product.name.clone());
        }
        let product = self.billing.get_product(price.product.id()).await?;
        Ok(product.and_then(|p| p.name))
    }
}

/// Active or trialing first, otherwise the most recently created.
fn pick_current(mut subscriptions: Vec<BillingSubscription>) -> Option<BillingSubscription> {
    subscriptions.sort_by(|a, b| b.created.cmp(&a.created));
    match subscriptions.iter().position(|s| s.status.is_active()) {
        Some(idx) => Some(subscriptions.swap_remove(idx)),
        None => subscriptions.into_iter().next(),
    }
}
