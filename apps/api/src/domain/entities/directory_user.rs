use serde::{Deserialize, Serialize};

use super::billing_metadata::{BillingMetadata, Metadata};

/// A user record held by the directory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DirectoryUser {
    pub fn billing(&self) -> BillingMetadata {
        BillingMetadata::from_metadata(&self.metadata)
    }
}
