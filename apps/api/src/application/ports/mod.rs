pub mod billing_provider;
pub mod directory;
pub mod webhook_verifier;
