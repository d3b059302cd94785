use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::conversation::command::{Command, ProductAction};
use crate::db::models::{NewProduct, APPROVAL_STATUS_APPROVED};

const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingApproval,
    AwaitingManualEdit,
    AwaitingName,
    AwaitingPrice,
    SelectingCategory,
    AwaitingNewCategoryName,
    AwaitingFinalConfirmation,
    SelectingProductEdit,
    SelectingProductDisable,
    SelectingProductDelete,
}

impl ConversationState {
    pub const ALL: [ConversationState; 11] = [
        ConversationState::Idle,
        ConversationState::AwaitingApproval,
        ConversationState::AwaitingManualEdit,
        ConversationState::AwaitingName,
        ConversationState::AwaitingPrice,
        ConversationState::SelectingCategory,
        ConversationState::AwaitingNewCategoryName,
        ConversationState::AwaitingFinalConfirmation,
        ConversationState::SelectingProductEdit,
        ConversationState::SelectingProductDisable,
        ConversationState::SelectingProductDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationState::Idle => "IDLE",
            ConversationState::AwaitingApproval => "AWAITING_APPROVAL",
            ConversationState::AwaitingManualEdit => "AWAITING_MANUAL_EDIT",
            ConversationState::AwaitingName => "AWAITING_NAME",
            ConversationState::AwaitingPrice => "AWAITING_PRICE",
            ConversationState::SelectingCategory => "SELECTING_CATEGORY",
            ConversationState::AwaitingNewCategoryName => "AWAITING_NEW_CATEGORY_NAME",
            ConversationState::AwaitingFinalConfirmation => "AWAITING_FINAL_CONFIRMATION",
            ConversationState::SelectingProductEdit => "SELECTING_PRODUCT_EDIT",
            ConversationState::SelectingProductDisable => "SELECTING_PRODUCT_DISABLE",
            ConversationState::SelectingProductDelete => "SELECTING_PRODUCT_DELETE",
        }
    }

    /// Absent or unknown tags fall back to `Idle`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) else {
            return ConversationState::Idle;
        };
        match Self::ALL.iter().find(|state| state.as_str() == tag) {
            Some(state) => *state,
            None => {
                warn!("Unknown conversation state '{}'; treating as IDLE", tag);
                ConversationState::Idle
            }
        }
    }

    pub fn for_selection(action: ProductAction) -> Self {
        match action {
            ProductAction::Edit => ConversationState::SelectingProductEdit,
            ProductAction::Disable => ConversationState::SelectingProductDisable,
            ProductAction::Delete => ConversationState::SelectingProductDelete,
        }
    }

    pub fn selection_action(self) -> Option<ProductAction> {
        match self {
            ConversationState::SelectingProductEdit => Some(ProductAction::Edit),
            ConversationState::SelectingProductDisable => Some(ProductAction::Disable),
            ConversationState::SelectingProductDelete => Some(ProductAction::Delete),
            _ => None,
        }
    }

    /// States that only advance through an on-screen button.
    pub fn awaits_button(self) -> bool {
        matches!(
            self,
            ConversationState::AwaitingApproval
                | ConversationState::SelectingCategory
                | ConversationState::AwaitingFinalConfirmation
        ) || self.selection_action().is_some()
    }

    /// States that only advance through free text.
    pub fn awaits_text(self) -> bool {
        matches!(
            self,
            ConversationState::AwaitingManualEdit
                | ConversationState::AwaitingName
                | ConversationState::AwaitingPrice
                | ConversationState::AwaitingNewCategoryName
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DraftError {
    #[error("draft is missing '{0}'")]
    MissingField(&'static str),
}

/// Product under construction. Fields accumulate one per transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        *self == Draft::default()
    }

    pub fn from_json(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Draft::default();
        };
        match serde_json::from_str::<Draft>(raw) {
            Ok(draft) => draft,
            Err(err) => {
                warn!("Discarding unreadable draft: {}", err);
                Draft::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_new_product(&self) -> Result<NewProduct, DraftError> {
        let name = self.name.clone().ok_or(DraftError::MissingField("name"))?;
        let price = self.price.ok_or(DraftError::MissingField("price"))?;
        let image_url = self
            .image_url
            .clone()
            .ok_or(DraftError::MissingField("image_url"))?;
        let category_id = self
            .category_id
            .ok_or(DraftError::MissingField("category_id"))?;

        Ok(NewProduct {
            name,
            price,
            image_url,
            category_id,
            ai_description: self.ai_description.clone(),
            approval_status: APPROVAL_STATUS_APPROVED.to_string(),
            in_stock: true,
        })
    }
}

/// The singleton conversation row as read at the start of a turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationRecord {
    pub owner_identity: String,
    pub state: ConversationState,
    pub draft: Draft,
    pub version: i64,
}

impl ConversationRecord {
    pub fn advanced(&self, outcome: Outcome) -> ConversationRecord {
        ConversationRecord {
            owner_identity: self.owner_identity.clone(),
            state: outcome.state,
            draft: outcome.draft,
            version: self.version,
        }
    }
}

/// Whether the conversation write for a turn is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commit {
    /// The dispatcher saves the outcome, conditional on the version read.
    #[default]
    Deferred,
    /// Saved by the engine before it changed the catalog.
    Written { version: i64 },
    /// Another turn moved the conversation first; nothing was applied.
    Superseded,
}

/// Where a turn leaves the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: ConversationState,
    pub draft: Draft,
    pub commit: Commit,
}

impl Outcome {
    pub fn idle() -> Self {
        Outcome::to(ConversationState::Idle, Draft::default())
    }

    pub fn to(state: ConversationState, draft: Draft) -> Self {
        Outcome {
            state,
            draft,
            commit: Commit::Deferred,
        }
    }

    pub fn unchanged(record: &ConversationRecord) -> Self {
        Outcome::to(record.state, record.draft.clone())
    }

    /// IDLE, already persisted at `version`.
    pub fn written(version: i64) -> Self {
        Outcome {
            commit: Commit::Written { version },
            ..Outcome::idle()
        }
    }

    pub fn superseded(record: &ConversationRecord) -> Self {
        Outcome {
            commit: Commit::Superseded,
            ..Outcome::unchanged(record)
        }
    }

    pub fn changes(&self, record: &ConversationRecord) -> bool {
        self.state != record.state || self.draft != record.draft
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Status,
    Help,
    Text(String),
    Image { file_id: String },
    Command(Command),
    Unsupported,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Status => "status",
            Event::Help => "help",
            Event::Text(_) => "text",
            Event::Image { .. } => "image",
            Event::Command(_) => "command",
            Event::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub command: Command,
}

impl Button {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Button {
            label: label.into(),
            command,
        }
    }
}

pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong,
}

pub fn validate_name(raw: &str) -> Result<String, NameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(NameError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Accepts `19.99`, `19,99` and a leading `$`. Rejects negatives and non-finite values.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_start_matches('$').trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    let price = cleaned.parse::<f64>().ok()?;
    if price.is_finite() && price >= 0.0 {
        Some(price)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tags_round_trip_and_unknown_is_idle() {
        for state in ConversationState::ALL {
            assert_eq!(ConversationState::from_tag(Some(state.as_str())), state);
        }
        assert_eq!(ConversationState::from_tag(None), ConversationState::Idle);
        assert_eq!(ConversationState::from_tag(Some("")), ConversationState::Idle);
        assert_eq!(
            ConversationState::from_tag(Some("AWAITING_CATEGORY")),
            ConversationState::Idle
        );
    }

    #[test]
    fn button_and_text_states_are_disjoint() {
        for state in ConversationState::ALL {
            assert!(!(state.awaits_button() && state.awaits_text()), "{state:?}");
        }
        assert!(!ConversationState::Idle.awaits_button());
        assert!(!ConversationState::Idle.awaits_text());
    }

    #[test]
    fn draft_json_tolerates_garbage_and_partial_objects() {
        assert!(Draft::from_json(None).is_empty());
        assert!(Draft::from_json(Some("not json")).is_empty());
        let draft = Draft::from_json(Some(r#"{"image_url":"https://x/1.jpg","price":3.5}"#));
        assert_eq!(draft.image_url.as_deref(), Some("https://x/1.jpg"));
        assert_eq!(draft.price, Some(3.5));
        assert!(draft.name.is_none());
        assert_eq!(Draft::default().to_json(), "{}");
    }

    #[test]
    fn incomplete_draft_cannot_become_a_product() {
        let draft = Draft {
            image_url: Some("https://x/1.jpg".to_string()),
            name: Some("Taza".to_string()),
            price: Some(10.0),
            ..Draft::default()
        };
        assert_eq!(
            draft.to_new_product(),
            Err(DraftError::MissingField("category_id"))
        );

        let complete = Draft {
            category_id: Some(3),
            category_name: Some("Tazas".to_string()),
            ..draft
        };
        let product = complete.to_new_product().unwrap();
        assert_eq!(product.category_id, 3);
        assert_eq!(product.approval_status, "approved");
        assert!(product.in_stock);
    }

    #[test]
    fn validates_names() {
        assert_eq!(validate_name("  Taza Mágica "), Ok("Taza Mágica".to_string()));
        assert_eq!(validate_name("   "), Err(NameError::Empty));
        assert_eq!(validate_name(&"a".repeat(256)), Err(NameError::TooLong));
        assert!(validate_name(&"á".repeat(255)).is_ok());
    }

    #[test]
    fn parses_prices() {
        assert_eq!(parse_price("19.99"), Some(19.99));
        assert_eq!(parse_price(" $25,50 "), Some(25.5));
        assert_eq!(parse_price("0"), Some(0.0));
        assert_eq!(parse_price("-3"), None);
        assert_eq!(parse_price("veinte"), None);
        assert_eq!(parse_price("NaN"), None);
        assert_eq!(parse_price("inf"), None);
        assert_eq!(parse_price(""), None);
    }
}
