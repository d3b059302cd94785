use std::sync::Arc;

use crate::conversation::ports::Services;
use crate::db::database::Database;
use crate::handlers::webhook::DispatchSettings;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub services: Services,
    pub settings: Arc<DispatchSettings>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        db: Database,
        services: Services,
        settings: DispatchSettings,
        webhook_secret: &str,
    ) -> Self {
        AppState {
            db,
            services,
            settings: Arc::new(settings),
            webhook_secret: Some(webhook_secret.to_string()).filter(|secret| !secret.is_empty()),
        }
    }
}
