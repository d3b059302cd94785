use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

/// Timing for one webhook delivery, logged on the `bot.timing` target.
#[derive(Debug)]
pub struct TurnTimer {
    update_id: i64,
    event: String,
    chat_id: Option<i64>,
    actor_id: Option<i64>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl TurnTimer {
    pub fn new(update_id: i64, event: &str, chat_id: Option<i64>, actor_id: Option<i64>) -> Self {
        TurnTimer {
            update_id,
            event: event.to_string(),
            chat_id,
            actor_id,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=turn_received update_id={} kind={} chat_id={:?} actor_id={:?} received_at={}",
            self.update_id,
            self.event,
            self.chat_id,
            self.actor_id,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=turn_completed update_id={} kind={} chat_id={:?} actor_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.update_id,
            self.event,
            self.chat_id,
            self.actor_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for TurnTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_turn_timer(
    update_id: i64,
    event: &str,
    chat_id: Option<i64>,
    actor_id: Option<i64>,
) -> TurnTimer {
    let timer = TurnTimer::new(update_id, event, chat_id, actor_id);
    timer.log_received();
    timer
}

pub fn complete_turn_timer(timer: &mut TurnTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "bot.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "bot.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
