use std::fmt;
use std::str::FromStr;

const SELECT_CATEGORY_PREFIX: &str = "cat_select_";
const ACT_EDIT_PREFIX: &str = "act_edit_";
const ACT_DISABLE_PREFIX: &str = "act_disable_";
const ACT_DELETE_PREFIX: &str = "act_delete_";

/// Catalog maintenance actions reachable from the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductAction {
    Edit,
    Disable,
    Delete,
}

impl ProductAction {
    pub fn verb(self) -> &'static str {
        match self {
            ProductAction::Edit => "editar",
            ProductAction::Disable => "desactivar",
            ProductAction::Delete => "eliminar",
        }
    }

    fn list_command(self) -> &'static str {
        match self {
            ProductAction::Edit => "cmd_edit",
            ProductAction::Disable => "cmd_disable",
            ProductAction::Delete => "cmd_delete",
        }
    }

    fn act_prefix(self) -> &'static str {
        match self {
            ProductAction::Edit => ACT_EDIT_PREFIX,
            ProductAction::Disable => ACT_DISABLE_PREFIX,
            ProductAction::Delete => ACT_DELETE_PREFIX,
        }
    }
}

/// A button press, parsed once from its callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Create,
    ListProducts(ProductAction),
    ApproveDescription,
    EditDescription,
    RetryDescription,
    SelectCategory(i64),
    NewCategory,
    FinalConfirm,
    FinalCancel,
    Act(ProductAction, i64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("invalid identifier in command '{0}'")]
    InvalidId(String),
}

fn parse_id(raw: &str, id: &str) -> Result<i64, CommandParseError> {
    id.parse::<i64>()
        .map_err(|_| CommandParseError::InvalidId(raw.to_string()))
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        let command = match value {
            "cmd_create" => Command::Create,
            "cmd_edit" => Command::ListProducts(ProductAction::Edit),
            "cmd_disable" => Command::ListProducts(ProductAction::Disable),
            "cmd_delete" => Command::ListProducts(ProductAction::Delete),
            "approve_desc" => Command::ApproveDescription,
            "edit_desc" => Command::EditDescription,
            "retry_desc" => Command::RetryDescription,
            "cat_new" => Command::NewCategory,
            "final_confirm" => Command::FinalConfirm,
            "final_cancel" => Command::FinalCancel,
            _ => {
                if let Some(id) = value.strip_prefix(SELECT_CATEGORY_PREFIX) {
                    return Ok(Command::SelectCategory(parse_id(value, id)?));
                }
                for action in [
                    ProductAction::Edit,
                    ProductAction::Disable,
                    ProductAction::Delete,
                ] {
                    if let Some(id) = value.strip_prefix(action.act_prefix()) {
                        return Ok(Command::Act(action, parse_id(value, id)?));
                    }
                }
                return Err(CommandParseError::Unknown(value.to_string()));
            }
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create => f.write_str("cmd_create"),
            Command::ListProducts(action) => f.write_str(action.list_command()),
            Command::ApproveDescription => f.write_str("approve_desc"),
            Command::EditDescription => f.write_str("edit_desc"),
            Command::RetryDescription => f.write_str("retry_desc"),
            Command::SelectCategory(id) => write!(f, "{SELECT_CATEGORY_PREFIX}{id}"),
            Command::NewCategory => f.write_str("cat_new"),
            Command::FinalConfirm => f.write_str("final_confirm"),
            Command::FinalCancel => f.write_str("final_cancel"),
            Command::Act(action, id) => write!(f, "{}{}", action.act_prefix(), id),
        }
    }
}
