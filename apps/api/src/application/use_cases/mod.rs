pub mod billing_overview;
pub mod checkout_linkage;
pub mod checkout_session;
pub mod customer_identity;
pub mod metadata_store;
pub mod portal_configuration;
pub mod subscription_projector;
pub mod webhook_dispatcher;
