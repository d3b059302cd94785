//! In-memory fakes for the engine and dispatcher tests.
//!
//! Network-shaped calls yield to the scheduler so turns joined on one task
//! interleave the way concurrent deliveries do.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::conversation::ports::{
    CatalogRepository, ConversationStore, DescriptionGenerator, Gateway, GatewayError,
    GeneratorError, MediaStore, RepositoryError, Services, StoreError,
};
use crate::conversation::types::{ConversationRecord, Keyboard};
use crate::db::models::{Category, NewProduct, Product};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
pub struct FakeGateway {
    pub sent: Mutex<Vec<SentMessage>>,
    pub acknowledged: Mutex<Vec<String>>,
    pub file_url: Mutex<Option<String>>,
    pub bytes: Mutex<Vec<u8>>,
    pub fail_sends: Mutex<bool>,
}

impl FakeGateway {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent.lock().last().cloned()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        if *self.fail_sends.lock() {
            return Err(GatewayError::Request("network down".to_string()));
        }
        self.sent.lock().push(SentMessage {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        self.acknowledged.lock().push(callback_id.to_string());
        Ok(())
    }

    async fn resolve_file_url(&self, _file_id: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.file_url.lock().clone())
    }

    async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, GatewayError> {
        Ok(self.bytes.lock().clone())
    }
}

pub enum StoreBehavior {
    Succeed,
    BucketMissing,
}

pub struct FakeMediaStore {
    pub behavior: Mutex<StoreBehavior>,
    pub stored_keys: Mutex<Vec<String>>,
}

impl Default for FakeMediaStore {
    fn default() -> Self {
        FakeMediaStore {
            behavior: Mutex::new(StoreBehavior::Succeed),
            stored_keys: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn store(
        &self,
        _bytes: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        match *self.behavior.lock() {
            StoreBehavior::Succeed => {
                self.stored_keys.lock().push(key.to_string());
                Ok(format!("https://cdn.test/catalog-images/{key}"))
            }
            StoreBehavior::BucketMissing => Err(StoreError::BucketMissing {
                bucket: "catalog-images".to_string(),
            }),
        }
    }
}

pub struct FakeGenerator {
    pub description: Mutex<Option<String>>,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        FakeGenerator {
            description: Mutex::new(Some("Una taza que cambia de color con el calor.".to_string())),
        }
    }
}

#[async_trait]
impl DescriptionGenerator for FakeGenerator {
    async fn describe(&self, _image: &[u8], _mime_type: &str) -> Result<String, GeneratorError> {
        self.description.lock().clone().ok_or(GeneratorError::Empty)
    }
}

#[derive(Default)]
struct CatalogData {
    products: Vec<Product>,
    categories: Vec<Category>,
    logs: Vec<(String, String)>,
    conversation: ConversationRecord,
    processed: HashSet<i64>,
}

/// Both repository ports over one in-memory store.
#[derive(Default)]
pub struct InMemoryCatalog {
    data: Mutex<CatalogData>,
    pub fail_reads: Mutex<bool>,
}

impl InMemoryCatalog {
    pub fn with_owner(owner: &str) -> Self {
        let catalog = InMemoryCatalog::default();
        catalog.data.lock().conversation.owner_identity = owner.to_string();
        catalog
    }

    pub fn add_category(&self, id: i64, name: &str) {
        self.data.lock().categories.push(Category {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_product(&self, id: i64, name: &str) {
        self.data.lock().products.push(Product {
            id,
            name: name.to_string(),
            price: 10.0,
            image_url: format!("https://cdn.test/{id}.jpg"),
            category_id: None,
            ai_description: None,
            approval_status: "approved".to_string(),
            in_stock: true,
        });
    }

    pub fn products(&self) -> Vec<Product> {
        self.data.lock().products.clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.data.lock().categories.clone()
    }

    pub fn logs(&self) -> Vec<(String, String)> {
        self.data.lock().logs.clone()
    }

    pub fn conversation(&self) -> ConversationRecord {
        self.data.lock().conversation.clone()
    }

    pub fn processed(&self) -> HashSet<i64> {
        self.data.lock().processed.clone()
    }

    pub fn set_conversation(&self, record: ConversationRecord) {
        self.data.lock().conversation = record;
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if *self.fail_reads.lock() {
            return Err(RepositoryError::Backend(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn list_recent_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        self.check_reads()?;
        let mut products = self.data.lock().products.clone();
        products.sort_by(|a, b| b.id.cmp(&a.id));
        products.truncate(limit.max(0) as usize);
        Ok(products)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        self.check_reads()?;
        Ok(self.data.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn set_in_stock(&self, id: i64, in_stock: bool) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock();
        match data.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.in_stock = in_stock;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_product(&self, id: i64) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock();
        let before = data.products.len();
        data.products.retain(|p| p.id != id);
        Ok(data.products.len() != before)
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<i64, RepositoryError> {
        let mut data = self.data.lock();
        let id = data.products.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        data.products.push(Product {
            id,
            name: product.name.clone(),
            price: product.price,
            image_url: product.image_url.clone(),
            category_id: Some(product.category_id),
            ai_description: product.ai_description.clone(),
            approval_status: product.approval_status.clone(),
            in_stock: product.in_stock,
        });
        Ok(id)
    }

    async fn count_products(&self) -> Result<i64, RepositoryError> {
        self.check_reads()?;
        Ok(self.data.lock().products.len() as i64)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.check_reads()?;
        Ok(self.data.lock().categories.clone())
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, RepositoryError> {
        self.check_reads()?;
        Ok(self.data.lock().categories.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_category(&self, name: &str) -> Result<Category, RepositoryError> {
        let mut data = self.data.lock();
        if let Some(existing) = data
            .categories
            .iter()
            .find(|c| c.name.to_lowercase() == name.to_lowercase())
        {
            return Ok(existing.clone());
        }
        let id = data.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let category = Category {
            id,
            name: name.to_string(),
        };
        data.categories.push(category.clone());
        Ok(category)
    }

    async fn append_log(&self, error: &str, payload: &str) -> Result<(), RepositoryError> {
        self.data
            .lock()
            .logs
            .push((error.to_string(), payload.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryCatalog {
    async fn load_conversation(&self) -> Result<ConversationRecord, RepositoryError> {
        let record = self.data.lock().conversation.clone();
        tokio::task::yield_now().await;
        Ok(record)
    }

    async fn save_conversation(&self, record: &ConversationRecord) -> Result<i64, RepositoryError> {
        let mut data = self.data.lock();
        if data.conversation.version != record.version {
            return Err(RepositoryError::Conflict {
                expected_version: record.version,
            });
        }
        data.conversation.state = record.state;
        data.conversation.draft = record.draft.clone();
        data.conversation.version += 1;
        Ok(data.conversation.version)
    }

    async fn claim_update(&self, update_id: i64) -> Result<bool, RepositoryError> {
        Ok(self.data.lock().processed.insert(update_id))
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub media: Arc<FakeMediaStore>,
    pub generator: Arc<FakeGenerator>,
    pub catalog: Arc<InMemoryCatalog>,
    pub services: Services,
}

impl Harness {
    pub fn new(owner: &str) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let media = Arc::new(FakeMediaStore::default());
        let generator = Arc::new(FakeGenerator::default());
        let catalog = Arc::new(InMemoryCatalog::with_owner(owner));
        let services = Services {
            gateway: gateway.clone(),
            media: media.clone(),
            generator: generator.clone(),
            catalog: catalog.clone(),
            conversations: catalog.clone(),
        };
        Harness {
            gateway,
            media,
            generator,
            catalog,
            services,
        }
    }
}
