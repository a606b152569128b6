//! Client for the external upload/attachment lookup service.
//!
//! The chat core only stores opaque attachment ids; resolving them to real
//! upload records (and validating they exist before a message is persisted)
//! goes through this collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[async_trait]
pub trait UploadLookup: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UploadRecord>>;

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> AppResult<Vec<UploadRecord>>;
}

/// HTTP implementation talking to the upload service.
pub struct HttpUploadLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploadLookup {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UploadLookup for HttpUploadLookup {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<UploadRecord>> {
        let url = format!("{}/uploads/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "upload service returned {}",
                response.status()
            )));
        }

        let record = response.json::<UploadRecord>().await?;
        Ok(Some(record))
    }

    async fn find_by_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> AppResult<Vec<UploadRecord>> {
        let url = format!(
            "{}/uploads?entity_type={}&entity_id={}",
            self.base_url, entity_type, entity_id
        );
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "upload service returned {}",
                response.status()
            )));
        }

        let records = response.json::<Vec<UploadRecord>>().await?;
        Ok(records)
    }
}
