// Translation with an ordered provider fallback chain
//
// Providers are tried in priority order. Each one gets a bounded number of
// attempts; the first non-blank result wins. When everything fails the source
// text is returned unchanged, so `translate` never errors.

pub mod google;
pub mod libre;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::retry::RetryPolicy;
use crate::core::types::Region;
use crate::middleware::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

pub use google::GoogleTranslateProvider;
pub use libre::LibreTranslateProvider;

/// A single translation backend
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult<String>;
}

struct ProviderSlot {
    provider: Arc<dyn TranslationProvider>,
    circuit: CircuitBreaker,
}

pub struct Translator {
    providers: Vec<ProviderSlot>,
    source_lang: String,
    target_lang: String,
    policy: RetryPolicy,
}

impl Translator {
    pub fn new(
        providers: Vec<Arc<dyn TranslationProvider>>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        policy: RetryPolicy,
        circuit_config: CircuitBreakerConfig,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                circuit: CircuitBreaker::with_config(provider.name(), circuit_config.clone()),
                provider,
            })
            .collect();

        Self {
            providers,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            policy,
        }
    }

    /// Build the chain named in `config.providers`.
    ///
    /// A provider that cannot be constructed is left out with a warning; an
    /// empty chain is allowed and degrades to returning source text.
    pub fn from_config(config: &TranslationConfig) -> Self {
        let mut providers: Vec<Arc<dyn TranslationProvider>> = Vec::new();

        for name in &config.providers {
            let built: TranslationResult<Arc<dyn TranslationProvider>> =
                match name.to_lowercase().as_str() {
                    "google" => GoogleTranslateProvider::new(
                        &config.source_lang,
                        &config.target_lang,
                        config.request_timeout,
                    )
                    .map(|p| Arc::new(p) as Arc<dyn TranslationProvider>),
                    "libre" | "libretranslate" => LibreTranslateProvider::new(
                        config.libre_url.as_deref(),
                        config.libre_api_key.clone(),
                        &config.source_lang,
                        &config.target_lang,
                        config.request_timeout,
                    )
                    .map(|p| Arc::new(p) as Arc<dyn TranslationProvider>),
                    other => Err(TranslationError::NotConfigured(other.to_string())),
                };

            match built {
                Ok(provider) => {
                    info!("✓ Translation provider: {}", provider.name());
                    providers.push(provider);
                }
                Err(e) => warn!("Skipping translation provider '{}': {}", name, e),
            }
        }

        if providers.is_empty() {
            warn!("No translation providers available; source text will be kept");
        }

        Self::new(
            providers,
            config.source_lang.clone(),
            config.target_lang.clone(),
            RetryPolicy::provider_call(config.max_attempts, config.retry_backoff),
            CircuitBreakerConfig {
                failure_threshold: config.circuit_failure_threshold,
                cooldown: config.circuit_cooldown,
                success_threshold: 1,
            },
        )
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|s| s.provider.name()).collect()
    }

    /// Translate one string. Never fails: the input comes back on total failure.
    pub async fn translate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        for slot in &self.providers {
            let name = slot.provider.name();

            if !slot.circuit.allow_request() {
                debug!("Skipping {} (circuit open)", name);
                continue;
            }

            let result = self
                .policy
                .run(name, |_| {
                    let provider = Arc::clone(&slot.provider);
                    async move {
                        let translated = provider
                            .translate(text, &self.source_lang, &self.target_lang)
                            .await?;
                        if translated.trim().is_empty() {
                            return Err(TranslationError::EmptyResult(provider.name().to_string()));
                        }
                        Ok(translated)
                    }
                })
                .await;

            match result {
                Ok(translated) => {
                    slot.circuit.record_success();
                    debug!("'{}' → '{}' via {}", text, translated, name);
                    return translated;
                }
                Err(exhausted) => {
                    slot.circuit.record_failure();
                    warn!("Translation via {} failed: {}", name, exhausted);
                }
            }
        }

        warn!("All translation providers failed for '{}'; keeping source text", text);
        text.to_string()
    }

    /// Fill `translated_text` on every region, in order.
    ///
    /// Not atomic: each region is translated independently.
    #[instrument(skip(self, regions), fields(count = regions.len()))]
    pub async fn translate_all(&self, mut regions: Vec<Region>) -> Vec<Region> {
        for region in regions.iter_mut() {
            let translated = self.translate(&region.text).await;
            region.translated_text = Some(translated);
        }
        info!("Translated {} text regions", regions.len());
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BoundingBox;
    use crate::test_support::{FailingProvider, MapProvider};
    use std::time::Duration;
    use tokio::time::Instant;

    fn translator(providers: Vec<Arc<dyn TranslationProvider>>) -> Translator {
        Translator::new(
            providers,
            "en",
            "tr",
            RetryPolicy::provider_call(3, Duration::from_millis(500)),
            CircuitBreakerConfig::default(),
        )
    }

    fn region(text: &str) -> Region {
        Region {
            bbox: BoundingBox::new(0, 0, 50, 20),
            confidence: 0.9,
            text: text.to_string(),
            translated_text: None,
            language: "en".into(),
        }
    }

    #[tokio::test]
    async fn test_blank_input_skips_providers() {
        let failing = Arc::new(FailingProvider::new("a"));
        let t = translator(vec![failing.clone()]);

        assert_eq!(t.translate("").await, "");
        assert_eq!(t.translate("   \n\t").await, "");
        assert_eq!(failing.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_returns_input() {
        let a = Arc::new(FailingProvider::new("a"));
        let b = Arc::new(FailingProvider::new("b"));
        let t = translator(vec![a.clone(), b.clone()]);
        let start = Instant::now();

        assert_eq!(t.translate("HELLO").await, "HELLO");
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 3);
        // 0.5s + 1.0s backoff per provider
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_no_providers_returns_input() {
        let t = translator(Vec::new());
        assert_eq!(t.translate("HELLO").await, "HELLO");
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_next_provider() {
        let a = Arc::new(FailingProvider::new("a"));
        let b = Arc::new(MapProvider::new("b", &[("HELLO", "MERHABA")]));
        let t = translator(vec![a.clone(), b]);

        assert_eq!(t.translate("HELLO").await, "MERHABA");
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_not_accepted() {
        let blank = Arc::new(MapProvider::new("blank", &[("HELLO", "  ")]));
        let good = Arc::new(MapProvider::new("good", &[("HELLO", "MERHABA")]));
        let t = translator(vec![blank.clone(), good]);

        assert_eq!(t.translate("HELLO").await, "MERHABA");
        assert_eq!(blank.calls(), 3);
    }

    #[tokio::test]
    async fn test_first_provider_wins() {
        let a = Arc::new(MapProvider::new("a", &[("HELLO", "MERHABA")]));
        let b = Arc::new(MapProvider::new("b", &[("HELLO", "SELAM")]));
        let t = translator(vec![a, b.clone()]);

        assert_eq!(t.translate("HELLO").await, "MERHABA");
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_provider() {
        let a = Arc::new(FailingProvider::new("a"));
        let b = Arc::new(MapProvider::new("b", &[("HELLO", "MERHABA")]));
        let t = Translator::new(
            vec![a.clone(), b],
            "en",
            "tr",
            RetryPolicy::provider_call(1, Duration::ZERO),
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(3600),
                success_threshold: 1,
            },
        );

        for _ in 0..4 {
            assert_eq!(t.translate("HELLO").await, "MERHABA");
        }
        // Tripped after two failures, skipped afterwards
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn test_translate_all_fills_every_region() {
        let t = translator(vec![Arc::new(MapProvider::new(
            "map",
            &[("HELLO", "MERHABA"), ("BYE", "GÜLE GÜLE")],
        ))]);

        let regions = t
            .translate_all(vec![region("HELLO"), region(""), region("BYE")])
            .await;

        let out: Vec<_> = regions.iter().map(|r| r.translated_text.as_deref()).collect();
        assert_eq!(out, vec![Some("MERHABA"), Some(""), Some("GÜLE GÜLE")]);
    }

    #[test]
    fn test_from_config_omits_unconstructible_providers() {
        let mut config = crate::core::config::Config::default().translation;
        config.providers = vec!["libre".into(), "google".into(), "bogus".into()];
        config.libre_url = None;

        let t = Translator::from_config(&config);
        assert_eq!(t.provider_names(), vec!["google"]);
    }
}
