use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::{billing_metadata::MetadataFragment, directory_user::DirectoryUser},
};

/// Directory service port - user lookup and merge-only metadata writes.
///
/// There is deliberately no "replace metadata" operation.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<DirectoryUser>>;

    /// Merge `fragment` into the user's metadata. Keys absent from the
    /// fragment are left untouched; `null` values clear a key.
    async fn merge_metadata(&self, user_id: &str, fragment: &MetadataFragment) -> AppResult<()>;
}
