use tracing::warn;

use crate::conversation::ports::Gateway;

/// The actor is authorized when their id equals the recorded owner identity
/// or the configured fallback. Blank identities never match.
pub fn is_owner(actor_id: i64, owner_identity: &str, fallback_owner_id: &str) -> bool {
    let actor = actor_id.to_string();
    [owner_identity, fallback_owner_id]
        .iter()
        .map(|identity| identity.trim())
        .any(|identity| !identity.is_empty() && identity == actor)
}

pub fn denial_text(actor_id: i64) -> String {
    format!("⚠️ Acceso denegado. Tu ID es {actor_id}.")
}

pub async fn deny_access(gateway: &dyn Gateway, chat_id: i64, actor_id: i64) {
    warn!(
        "Rejected update from unauthorized actor {} in chat {}",
        actor_id, chat_id
    );
    if let Err(err) = gateway
        .send_text(chat_id, &denial_text(actor_id), None)
        .await
    {
        warn!("Failed to send access denial to chat {}: {}", chat_id, err);
    }
}
