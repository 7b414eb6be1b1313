// LibreTranslate-compatible server
//
// POST {base_url}/translate {q, source, target, format, api_key?} -> {translatedText}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TranslationProvider;
use crate::core::errors::{TranslationError, TranslationResult};

pub struct LibreTranslateProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LibreResponse {
    Ok {
        #[serde(rename = "translatedText")]
        translated_text: String,
    },
    Error {
        error: String,
    },
}

impl LibreTranslateProvider {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        source_lang: &str,
        target_lang: &str,
        timeout: Duration,
    ) -> TranslationResult<Self> {
        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TranslationError::NotConfigured("libre (LIBRETRANSLATE_URL unset)".into()))?;

        if source_lang.trim().is_empty() || target_lang.trim().is_empty() {
            return Err(TranslationError::NotConfigured(
                "libre (empty language pair)".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl TranslationProvider for LibreTranslateProvider {
    fn name(&self) -> &str {
        "libretranslate"
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult<String> {
        let request = LibreRequest {
            q: text,
            source: source_lang,
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .http_client
            .post(format!("{}/translate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<LibreResponse>(&body) {
            Ok(LibreResponse::Ok { translated_text }) if status.is_success() => Ok(translated_text),
            Ok(LibreResponse::Error { error }) => Err(TranslationError::BadStatus {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body: error,
            }),
            _ if !status.is_success() => Err(TranslationError::BadStatus {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body,
            }),
            _ => Err(TranslationError::InvalidResponse(body)),
        }
    }
}
