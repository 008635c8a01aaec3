//! Aggregation cycle.
//!
//! One cycle reads a configuration snapshot, launches every eligible adapter
//! concurrently and assembles their results into an [`AggregationResult`].
//! A failing, slow or panicking adapter only empties its own slot.

use super::eligibility::{self, Eligibility};
use crate::config::ConfigGateway;
use crate::models::{AggregationResult, ProviderCategory};
use crate::providers::ProviderAdapter;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs aggregation cycles over a fixed set of adapters.
///
/// Holds no state between cycles; each call to [`run_cycle`](Self::run_cycle)
/// starts from a fresh configuration snapshot.
pub struct Aggregator {
    gateway: Arc<dyn ConfigGateway>,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    adapter_timeout: Duration,
}

impl Aggregator {
    /// Create an aggregator. Expects at most one adapter per category.
    pub fn new(
        gateway: Arc<dyn ConfigGateway>,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            adapters,
            adapter_timeout,
        }
    }

    /// Run one cycle, returning at most `limit` alerts per category.
    ///
    /// Never fails: configuration errors yield an all-empty result.
    pub async fn run_cycle(&self, limit: usize) -> AggregationResult {
        let started = Instant::now();
        let mut result = AggregationResult::default();

        let config = match self.gateway.active_config().await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                error!("Configuration unavailable, returning empty result: {:#}", e);
                return result;
            }
        };

        if limit == 0 {
            debug!("Limit is zero, no providers contacted");
            return result;
        }

        let mut categories: Vec<ProviderCategory> = Vec::new();
        let mut tasks = Vec::new();

        for adapter in &self.adapters {
            let category = adapter.category();

            match eligibility::evaluate(category, &config) {
                Eligibility::Eligible => {}
                Eligibility::Inactive => {
                    debug!(provider = %category, "Provider inactive, skipped");
                    continue;
                }
                Eligibility::Missing(fields) => {
                    debug!(provider = %category, "Provider skipped, missing {}", fields.join(", "));
                    continue;
                }
            }

            let adapter = Arc::clone(adapter);
            let config = Arc::clone(&config);
            let timeout = self.adapter_timeout;

            categories.push(category);
            tasks.push(tokio::spawn(async move {
                tokio::time::timeout(timeout, adapter.fetch(&config, limit)).await
            }));
        }

        debug!("Launched {} adapters", tasks.len());
        let outcomes = join_all(tasks).await;

        for (category, outcome) in categories.into_iter().zip(outcomes) {
            let mut items = match outcome {
                Ok(Ok(items)) => items,
                Ok(Err(_)) => {
                    warn!(
                        provider = %category,
                        kind = "timeout",
                        "Adapter exceeded {}s, slot left empty",
                        self.adapter_timeout.as_secs_f64()
                    );
                    Vec::new()
                }
                Err(e) => {
                    error!(provider = %category, "Adapter task failed: {}", e);
                    Vec::new()
                }
            };
            items.truncate(limit);
            result.set(category, items);
        }

        info!(
            total = result.total(),
            elastic = result.elastic.len(),
            defender = result.defender.len(),
            opencti = result.opencti.len(),
            tenable = result.tenable.len(),
            rss = result.rss.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation cycle complete"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ActiveConfig, ElasticConfig, FileConfigGateway, OpenCtiConfig, RssConfig,
        StaticConfigGateway, TenableConfig,
    };
    use crate::models::{AlertItem, Severity};
    use crate::providers::FetchError;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Produce(usize),
        Fail,
        Panic,
        Hang,
    }

    struct FakeAdapter {
        category: ProviderCategory,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(category: ProviderCategory, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                category,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn category(&self) -> ProviderCategory {
            self.category
        }

        async fn try_fetch(
            &self,
            _config: &ActiveConfig,
            _limit: usize,
        ) -> Result<Vec<AlertItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Produce(n) => Ok((0..n)
                    .map(|i| AlertItem {
                        id: self.category.alert_id(&i.to_string()),
                        source: self.category.source(),
                        severity: Severity::High,
                        title: format!("{} alert {}", self.category, i),
                        description: None,
                        timestamp: Utc::now(),
                        link: None,
                    })
                    .collect()),
                Behavior::Fail => Err(FetchError::Auth("401 Unauthorized".to_string())),
                Behavior::Panic => panic!("adapter bug"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    struct BrokenGateway;

    #[async_trait]
    impl ConfigGateway for BrokenGateway {
        async fn active_config(&self) -> anyhow::Result<ActiveConfig> {
            Err(anyhow!("config store offline"))
        }
    }

    fn full_config() -> ActiveConfig {
        ActiveConfig {
            elastic: Some(ElasticConfig {
                enabled: true,
                url: Some("http://es".to_string()),
                api_key: Some("key".to_string()),
                ..ElasticConfig::default()
            }),
            defender: Some(crate::config::DefenderConfig {
                enabled: true,
                tenant_id: Some("t".to_string()),
                client_id: Some("c".to_string()),
                client_secret: Some("s".to_string()),
                ..Default::default()
            }),
            opencti: Some(OpenCtiConfig {
                enabled: true,
                url: Some("http://octi".to_string()),
                token: Some("tok".to_string()),
                ..OpenCtiConfig::default()
            }),
            tenable: Some(TenableConfig {
                enabled: true,
                access_key: Some("a".to_string()),
                secret_key: Some("s".to_string()),
                ..TenableConfig::default()
            }),
            rss: Some(RssConfig {
                enabled: true,
                feeds: vec!["http://feed".to_string()],
            }),
        }
    }

    fn fakes(behaviors: [Behavior; 5]) -> Vec<Arc<FakeAdapter>> {
        ProviderCategory::ALL
            .into_iter()
            .zip(behaviors)
            .map(|(c, b)| FakeAdapter::new(c, b))
            .collect()
    }

    fn aggregator(
        gateway: Arc<dyn ConfigGateway>,
        adapters: &[Arc<FakeAdapter>],
        timeout: Duration,
    ) -> Aggregator {
        let adapters = adapters
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn ProviderAdapter>)
            .collect();
        Aggregator::new(gateway, adapters, timeout)
    }

    #[tokio::test]
    async fn test_all_providers_contribute() {
        let adapters = fakes([Behavior::Produce(3); 5]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_secs(5),
        );

        let result = agg.run_cycle(10).await;
        for (category, items) in result.iter() {
            assert_eq!(items.len(), 3, "{}", category);
            assert!(items.iter().all(|a| a.source == category.source()));
            assert!(items.iter().all(|a| a.id.starts_with(category.key())));
        }
    }

    #[tokio::test]
    async fn test_failing_provider_is_isolated() {
        let adapters = fakes([
            Behavior::Fail,
            Behavior::Produce(2),
            Behavior::Produce(2),
            Behavior::Produce(2),
            Behavior::Produce(2),
        ]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_secs(5),
        );

        let result = agg.run_cycle(10).await;
        assert!(result.elastic.is_empty());
        assert_eq!(result.defender.len(), 2);
        assert_eq!(result.total(), 8);
        assert_eq!(adapters[0].calls(), 1);
    }

    #[tokio::test]
    async fn test_only_configured_providers_are_contacted() {
        let config = ActiveConfig {
            tenable: full_config().tenable,
            rss: full_config().rss,
            ..ActiveConfig::default()
        };
        let adapters = fakes([Behavior::Produce(4); 5]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(config)),
            &adapters,
            Duration::from_secs(5),
        );

        let result = agg.run_cycle(10).await;
        assert!(result.elastic.is_empty());
        assert!(result.defender.is_empty());
        assert!(result.opencti.is_empty());
        assert_eq!(result.tenable.len(), 4);
        assert_eq!(result.rss.len(), 4);

        let calls: Vec<_> = adapters.iter().map(|a| a.calls()).collect();
        assert_eq!(calls, vec![0, 0, 0, 1, 1]);
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_provider() {
        let mut config = full_config();
        config.elastic = Some(ElasticConfig {
            enabled: true,
            url: Some("http://es".to_string()),
            username: Some("elastic".to_string()),
            ..ElasticConfig::default()
        });
        let adapters = fakes([Behavior::Produce(1); 5]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(config)),
            &adapters,
            Duration::from_secs(5),
        );

        let result = agg.run_cycle(10).await;
        assert!(result.elastic.is_empty());
        assert_eq!(adapters[0].calls(), 0);
        assert_eq!(result.total(), 4);
    }

    #[tokio::test]
    async fn test_hanging_provider_times_out() {
        let adapters = fakes([
            Behavior::Produce(1),
            Behavior::Hang,
            Behavior::Produce(1),
            Behavior::Produce(1),
            Behavior::Produce(1),
        ]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_millis(100),
        );

        let started = Instant::now();
        let result = agg.run_cycle(10).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(result.defender.is_empty());
        assert_eq!(result.total(), 4);
    }

    #[tokio::test]
    async fn test_panicking_provider_is_contained() {
        let adapters = fakes([
            Behavior::Produce(1),
            Behavior::Produce(1),
            Behavior::Panic,
            Behavior::Produce(1),
            Behavior::Produce(1),
        ]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_secs(5),
        );

        let result = agg.run_cycle(10).await;
        assert!(result.opencti.is_empty());
        assert_eq!(result.total(), 4);
    }

    #[tokio::test]
    async fn test_config_error_yields_empty_result() {
        let adapters = fakes([Behavior::Produce(1); 5]);
        let agg = aggregator(Arc::new(BrokenGateway), &adapters, Duration::from_secs(5));

        let result = agg.run_cycle(10).await;
        assert_eq!(result, AggregationResult::default());
        assert!(adapters.iter().all(|a| a.calls() == 0));
    }

    #[tokio::test]
    async fn test_limit_applies_per_provider() {
        let adapters = fakes([Behavior::Produce(50); 5]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_secs(5),
        );

        for limit in [0usize, 1, 7] {
            let result = agg.run_cycle(limit).await;
            assert!(result.iter().all(|(_, items)| items.len() == limit));
        }
    }

    #[tokio::test]
    async fn test_cycles_are_independent() {
        let adapters = fakes([
            Behavior::Fail,
            Behavior::Produce(2),
            Behavior::Produce(2),
            Behavior::Produce(2),
            Behavior::Produce(2),
        ]);
        let agg = aggregator(
            Arc::new(StaticConfigGateway::new(full_config())),
            &adapters,
            Duration::from_secs(5),
        );

        let first = agg.run_cycle(10).await;
        let second = agg.run_cycle(10).await;
        assert_eq!(first.total(), second.total());
        assert!(second.elastic.is_empty());
        assert!(adapters.iter().all(|a| a.calls() == 2));
    }

    #[tokio::test]
    async fn test_config_changes_apply_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socfeed.toml");
        std::fs::write(
            &path,
            "[providers.tenable]\nenabled = true\naccess_key = \"a\"\nsecret_key = \"s\"\n",
        )
        .unwrap();

        let adapters = fakes([Behavior::Produce(1); 5]);
        let agg = aggregator(
            Arc::new(FileConfigGateway::new(&path)),
            &adapters,
            Duration::from_secs(5),
        );

        let first = agg.run_cycle(10).await;
        assert_eq!(first.tenable.len(), 1);
        assert_eq!(first.total(), 1);

        std::fs::write(&path, "[providers.tenable]\nenabled = false\n").unwrap();
        let second = agg.run_cycle(10).await;
        assert_eq!(second.total(), 0);
    }
}
