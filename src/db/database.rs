use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::conversation::ports::{CatalogRepository, ConversationStore, RepositoryError};
use crate::conversation::types::{ConversationRecord, ConversationState, Draft};
use crate::db::models::{Category, ConversationRow, NewProduct, Product};

const PRODUCT_COLUMNS: &str =
    "id, name, price, image_url, category_id, ai_description, approval_status, in_stock";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversation (\
                id INTEGER PRIMARY KEY CHECK (id = 1),\
                owner_identity TEXT NOT NULL DEFAULT '',\
                current_state TEXT NOT NULL DEFAULT 'IDLE',\
                draft_json TEXT NOT NULL DEFAULT '{}',\
                version INTEGER NOT NULL DEFAULT 0,\
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO conversation (id, owner_identity, current_state, draft_json, version) \
             VALUES (1, '', 'IDLE', '{}', 0);",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS categories (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                name TEXT NOT NULL UNIQUE COLLATE NOCASE\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS products (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                name TEXT NOT NULL,\
                price REAL NOT NULL CHECK (price >= 0),\
                image_url TEXT NOT NULL,\
                category_id INTEGER,\
                ai_description TEXT,\
                approval_status TEXT NOT NULL DEFAULT 'approved',\
                in_stock BOOLEAN NOT NULL DEFAULT 1,\
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\
                FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE SET NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS diagnostic_log (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                error TEXT NOT NULL,\
                payload TEXT NOT NULL,\
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS processed_updates (\
                update_id INTEGER PRIMARY KEY,\
                processed_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_created_at ON products(created_at);")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_processed_updates_processed_at ON processed_updates(processed_at);",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");

        Ok(Database { pool })
    }

    /// A single-connection in-memory database; every connection to
    /// `sqlite::memory:` would otherwise see its own empty schema.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Sets the owner only when none is recorded yet.
    pub async fn ensure_owner(&self, owner_identity: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE conversation SET owner_identity = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = 1 AND owner_identity = ''",
        )
        .bind(owner_identity.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn provision_owner(&self, owner_identity: &str) -> Result<()> {
        sqlx::query(
            "UPDATE conversation SET owner_identity = ?, version = version + 1, \
             updated_at = CURRENT_TIMESTAMP WHERE id = 1",
        )
        .bind(owner_identity.trim())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn prune_processed_updates(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM processed_updates WHERE processed_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CatalogRepository for Database {
    async fn list_recent_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let query = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, Product>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        let query = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        let row = sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn set_in_stock(&self, id: i64, in_stock: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE products SET in_stock = ? WHERE id = ?")
            .bind(in_stock)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_product(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO products (name, price, image_url, category_id, ai_description, approval_status, in_stock) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.image_url)
        .bind(product.category_id)
        .bind(&product.ai_description)
        .bind(&product.approval_status)
        .bind(product.in_stock)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn count_products(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_category(&self, name: &str) -> Result<Category, RepositoryError> {
        sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let row = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn append_log(&self, error: &str, payload: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO diagnostic_log (error, payload) VALUES (?, ?)")
            .bind(error)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for Database {
    async fn load_conversation(&self) -> Result<ConversationRecord, RepositoryError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT owner_identity, current_state, draft_json, version FROM conversation WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            warn!("Conversation row is missing; treating as unowned IDLE");
            return Ok(ConversationRecord::default());
        };

        Ok(ConversationRecord {
            owner_identity: row.owner_identity.unwrap_or_default().trim().to_string(),
            state: ConversationState::from_tag(row.current_state.as_deref()),
            draft: Draft::from_json(row.draft_json.as_deref()),
            version: row.version,
        })
    }

    async fn save_conversation(&self, record: &ConversationRecord) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversation SET current_state = ?, draft_json = ?, version = version + 1, \
             updated_at = CURRENT_TIMESTAMP WHERE id = 1 AND version = ?",
        )
        .bind(record.state.as_str())
        .bind(record.draft.to_json())
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                expected_version: record.version,
            });
        }
        Ok(record.version + 1)
    }

    async fn claim_update(&self, update_id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_updates (update_id, processed_at) VALUES (?, ?) \
             ON CONFLICT(update_id) DO NOTHING",
        )
        .bind(update_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
