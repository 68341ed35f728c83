use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::directory::DirectoryPort,
    domain::entities::{billing_metadata::MetadataFragment, directory_user::DirectoryUser},
};

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Every field already held the target value; nothing was written.
    Unchanged,
    /// The listed fields were written.
    Written(MetadataFragment),
}

impl MergeOutcome {
    pub fn was_written(&self) -> bool {
        matches!(self, MergeOutcome::Written(_))
    }
}

/// Read/merge access to the billing-owned part of a user's metadata.
///
/// Writes are narrowed to the fields that differ from what the directory
/// currently holds, so repeating a merge is free and concurrent writers only
/// race on the fields they actually change.
#[derive(Clone)]
pub struct MetadataStore {
    directory: Arc<dyn DirectoryPort>,
}

impl MetadataStore {
    pub fn new(directory: Arc<dyn DirectoryPort>) -> Self {
        Self { directory }
    }

    #[instrument(skip(self))]
    pub async fn read(&self, user_id: &str) -> AppResult<Option<DirectoryUser>> {
        self.directory.get_user(user_id).await
    }

    /// Merge `fragment` into the user's metadata.
    ///
    /// Fails with `AppError::NotFound` if the user does not exist.
    #[instrument(skip(self, fragment))]
    pub async fn merge(&self, user_id: &str, fragment: &MetadataFragment) -> AppResult<MergeOutcome> {
        let user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.merge_onto(&user, fragment).await
    }

    /// Like [`MetadataStore::merge`] but diffs against an already-fetched user.
    pub async fn merge_onto(
        &self,
        user: &DirectoryUser,
        fragment: &MetadataFragment,
    ) -> AppResult<MergeOutcome> {
        let changes = fragment.changes_against(&user.metadata);
        if changes.is_empty() {
            debug!(user_id = %user.id, "Metadata already up to date, skipping write");
            return Ok(MergeOutcome::Unchanged);
        }

        self.directory.merge_metadata(&user.id, &changes).await?;
        debug!(
            user_id = %user.id,
            fields = ?changes.fields().keys().collect::<Vec<_>>(),
            "Merged billing metadata"
        );
        Ok(MergeOutcome::Written(changes))
    }
}
