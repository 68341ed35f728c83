pub mod billing_metadata;
pub mod directory_user;
pub mod subscription_status;
