//! In-memory directory service.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::directory::DirectoryPort,
    domain::entities::{billing_metadata::MetadataFragment, directory_user::DirectoryUser},
};

/// Stores users by id and applies merges the way the real directory does:
/// keys in the fragment overwrite, null keys are removed, everything else is kept.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<String, DirectoryUser>>,
    merges: AtomicUsize,
    fail_merges: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert_user(user);
        }
        directory
    }

    pub fn insert_user(&self, user: DirectoryUser) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn user(&self, user_id: &str) -> Option<DirectoryUser> {
        self.users.lock().unwrap().get(user_id).cloned()
    }

    /// Number of successful metadata writes.
    pub fn merge_count(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }

    /// Make every subsequent merge fail with a directory error.
    pub fn fail_merges(&self, fail: bool) {
        self.fail_merges.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryPort for InMemoryDirectory {
    async fn get_user(&self, user_id: &str) -> AppResult<Option<DirectoryUser>> {
        Ok(self.user(user_id))
    }

    async fn merge_metadata(&self, user_id: &str, fragment: &MetadataFragment) -> AppResult<()> {
        if self.fail_merges.load(Ordering::SeqCst) {
            return Err(AppError::Directory("503 Service Unavailable".into()));
        }

        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id).ok_or(AppError::NotFound)?;
        fragment.merge_into(&mut user.metadata);
        self.merges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
