// Google Translate web endpoint (no API key)
//
// GET https://translate.googleapis.com/translate_a/single?client=gtx&sl=en&tl=tr&dt=t&q=...
// The response is a nested array; element [0] holds [translated, original, ...]
// segments, one per sentence.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

use super::TranslationProvider;
use crate::core::errors::{TranslationError, TranslationResult};

const GOOGLE_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

pub struct GoogleTranslateProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslateProvider {
    pub fn new(source_lang: &str, target_lang: &str, timeout: Duration) -> TranslationResult<Self> {
        validate_lang_code(source_lang)?;
        validate_lang_code(target_lang)?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            http_client,
            base_url: GOOGLE_TRANSLATE_URL.to_string(),
        })
    }
}

/// `auto`, `en`, `tr`, `zh-CN`, ...
fn validate_lang_code(code: &str) -> TranslationResult<()> {
    let valid = code == "auto"
        || code.split('-').enumerate().all(|(i, part)| {
            let len_ok = if i == 0 {
                (2..=3).contains(&part.len())
            } else {
                (2..=4).contains(&part.len())
            };
            len_ok && part.chars().all(|c| c.is_ascii_alphabetic())
        });
    if valid {
        Ok(())
    } else {
        Err(TranslationError::NotConfigured(format!(
            "google (unsupported language code '{}')",
            code
        )))
    }
}

/// Concatenate the translated segments of a `translate_a/single` response
fn parse_segments(body: &Value) -> TranslationResult<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::InvalidResponse("missing segment array".to_string()))?;

    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();

    Ok(text)
}

#[async_trait]
impl TranslationProvider for GoogleTranslateProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult<String> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("client", "gtx"),
                ("sl", source_lang),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::BadStatus {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
        let translated = parse_segments(&body)?;
        trace!("google: '{}' → '{}'", text, translated);
        Ok(translated)
    }
}
