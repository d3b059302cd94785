use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::conversation::ports::{MediaStore, StoreError};
use crate::llm::media::truncate_for_log;
use crate::utils::http::get_http_client;

/// Public-bucket uploads through the Supabase Storage REST API.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: String,
    service_key: String,
    bucket: String,
    http: Client,
}

impl SupabaseStorage {
    pub fn from_config(config: &Config) -> Self {
        SupabaseStorage {
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_role_key.clone(),
            bucket: config.storage_bucket.clone(),
            http: get_http_client().clone(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.service_key.is_empty()
    }

    fn upload_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }
}

/// Storage answers a missing bucket with a JSON body naming it, sometimes
/// under a 400 rather than a 404.
pub fn classify_failure(bucket: &str, status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .filter_map(|field| value.get(*field).and_then(Value::as_str))
                .find(|text| !text.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_for_log(body.trim(), 500));

    if message.to_lowercase().contains("bucket not found") {
        return StoreError::BucketMissing {
            bucket: bucket.to_string(),
        };
    }
    StoreError::Rejected { status, message }
}

#[async_trait]
impl MediaStore for SupabaseStorage {
    async fn store(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        if !self.is_configured() {
            return Err(StoreError::NotConfigured);
        }

        let size = bytes.len();
        let response = self
            .http
            .post(self.upload_url(key))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|err| {
                debug!(
                    "Storage upload of {} failed to send (timeout={}, connect={})",
                    key,
                    err.is_timeout(),
                    err.is_connect()
                );
                StoreError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                "Storage rejected upload of {}: status={}, body={}",
                key,
                status,
                truncate_for_log(&body, 800)
            );
            return Err(classify_failure(&self.bucket, status.as_u16(), &body));
        }

        debug!("Uploaded {} ({} bytes, {}) to bucket {}", key, size, content_type, self.bucket);
        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(base_url: &str, service_key: &str) -> SupabaseStorage {
        SupabaseStorage {
            base_url: base_url.to_string(),
            service_key: service_key.to_string(),
            bucket: "catalog-images".to_string(),
            http: Client::new(),
        }
    }

    #[test]
    fn missing_bucket_is_recognized_in_any_status() {
        let body = r#"{"statusCode":"404","error":"Bucket not found","message":"Bucket not found"}"#;
        assert!(matches!(
            classify_failure("catalog-images", 400, body),
            StoreError::BucketMissing { bucket } if bucket == "catalog-images"
        ));
    }

    #[test]
    fn other_failures_keep_the_message() {
        let body = r#"{"statusCode":"403","error":"Unauthorized","message":"invalid signature"}"#;
        match classify_failure("catalog-images", 403, body) {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "invalid signature");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify_failure("catalog-images", 502, "Bad Gateway"),
            StoreError::Rejected { status: 502, .. }
        ));
    }

    #[test]
    fn public_url_points_at_the_bucket() {
        assert_eq!(
            storage("https://abc.supabase.co", "key").public_url("1700000000123.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/catalog-images/1700000000123.jpg"
        );
    }

    #[tokio::test]
    async fn unconfigured_storage_refuses_uploads() {
        let result = storage("", "").store(vec![1], "1.jpg", "image/jpeg").await;
        assert!(matches!(result, Err(StoreError::NotConfigured)));
    }
}
