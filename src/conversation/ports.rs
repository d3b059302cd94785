//! Seams between the conversation engine and the outside world.
//!
//! Every wrapper is stateless from the engine's point of view and reports
//! failures as typed errors. None of them notify the operator; the engine and
//! the webhook dispatcher decide what the operator sees.

use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::types::{ConversationRecord, Keyboard};
use crate::db::models::{Category, NewProduct, Product};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("telegram request failed: {0}")]
    Request(String),
    #[error("file download failed: {0}")]
    Download(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage bucket '{bucket}' does not exist")]
    BucketMissing { bucket: String },
    #[error("object storage is not configured")]
    NotConfigured,
    #[error("storage rejected the upload with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("storage request failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("description generator is not configured")]
    NotConfigured,
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("generator returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("generator returned an empty description")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("conversation changed concurrently (expected version {expected_version})")]
    Conflict { expected_version: i64 },
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), GatewayError>;

    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError>;

    /// `Ok(None)` when the platform does not know the file.
    async fn resolve_file_url(&self, file_id: &str) -> Result<Option<String>, GatewayError>;

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, GatewayError>;
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Uploads under `key` and returns the durable public URL.
    async fn store(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;
}

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, GeneratorError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_recent_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>, RepositoryError>;
    /// Returns `false` when no row matched.
    async fn set_in_stock(&self, id: i64, in_stock: bool) -> Result<bool, RepositoryError>;
    /// Returns `false` when no row matched.
    async fn delete_product(&self, id: i64) -> Result<bool, RepositoryError>;
    async fn insert_product(&self, product: &NewProduct) -> Result<i64, RepositoryError>;
    async fn count_products(&self) -> Result<i64, RepositoryError>;
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn get_category(&self, id: i64) -> Result<Option<Category>, RepositoryError>;
    /// Returns the existing row when a category with the same name exists.
    async fn insert_category(&self, name: &str) -> Result<Category, RepositoryError>;
    async fn append_log(&self, error: &str, payload: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load_conversation(&self) -> Result<ConversationRecord, RepositoryError>;

    /// Writes state and draft only if the stored version still equals
    /// `record.version`; returns the new version.
    async fn save_conversation(&self, record: &ConversationRecord) -> Result<i64, RepositoryError>;

    /// Returns `false` if the update id was already processed.
    async fn claim_update(&self, update_id: i64) -> Result<bool, RepositoryError>;
}

#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn Gateway>,
    pub media: Arc<dyn MediaStore>,
    pub generator: Arc<dyn DescriptionGenerator>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub conversations: Arc<dyn ConversationStore>,
}
