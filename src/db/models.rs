use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const APPROVAL_STATUS_APPROVED: &str = "approved";

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub image_url: String,
    pub category_id: Option<i64>,
    pub ai_description: Option<String>,
    pub approval_status: String,
    pub in_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub image_url: String,
    pub category_id: i64,
    pub ai_description: Option<String>,
    pub approval_status: String,
    pub in_stock: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub owner_identity: Option<String>,
    pub current_state: Option<String>,
    pub draft_json: Option<String>,
    pub version: i64,
}
