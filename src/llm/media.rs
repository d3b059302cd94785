use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::utils::http::get_http_client;

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Content type for an uploaded photo; Telegram photos are JPEG unless the bytes say otherwise.
pub fn image_content_type(data: &[u8]) -> String {
    match detect_mime_type(data) {
        Some(mime) if mime.starts_with("image/") => mime,
        _ => DEFAULT_IMAGE_MIME.to_string(),
    }
}

pub fn object_key(now: DateTime<Utc>, content_type: &str) -> String {
    let extension = match content_type.split('/').nth(1).unwrap_or("jpeg") {
        "jpeg" | "jpg" => "jpg",
        other => other,
    };
    format!("{}.{}", now.timestamp_millis(), extension)
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

pub async fn download_media(url: &str) -> Result<Vec<u8>> {
    let client = get_http_client();
    let response = client.get(url).send().await.map_err(|err| {
        let (timeout, connect) = (err.is_timeout(), err.is_connect());
        // Telegram file URLs embed the bot token.
        debug!(
            "Failed to fetch media: {} (timeout={}, connect={})",
            err.without_url(),
            timeout,
            connect
        );
        anyhow!("media request failed")
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(
            "Media download failed with status {}: {}",
            status,
            truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return Err(anyhow!("media download returned status {status}"));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(anyhow!("media download returned an empty body"));
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn detects_png_and_defaults_to_jpeg() {
        assert_eq!(image_content_type(&PNG_HEADER), "image/png");
        assert_eq!(image_content_type(b"plain text, not an image"), "image/jpeg");
        assert_eq!(image_content_type(&[]), "image/jpeg");
    }

    #[test]
    fn object_keys_are_timestamped() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(object_key(now, "image/jpeg"), "1700000000123.jpg");
        assert_eq!(object_key(now, "image/png"), "1700000000123.png");
    }

    #[test]
    fn truncates_long_values() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc... (truncated)");
    }
}
