//! SIEM adapter (Elasticsearch log search).

use super::{
    decode_json, first_non_empty, headroom, timestamp_or_now, FetchError, ProviderAdapter,
};
use crate::config::{ActiveConfig, ElasticConfig};
use crate::models::{AlertItem, ProviderCategory};
use crate::severity;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const CATEGORY: ProviderCategory = ProviderCategory::Elastic;

/// Event categories treated as security signals.
const SIGNAL_CATEGORIES: &[&str] = &["intrusion_detection", "malware"];

/// `_search` response, reduced to what we read.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Option<HitsEnvelope>,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: HitSource,
}

#[derive(Debug, Default, Deserialize)]
struct HitSource {
    #[serde(rename = "@timestamp", default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    event: Option<EventFields>,
    #[serde(default)]
    rule: Option<RuleFields>,
    #[serde(default)]
    host: Option<HostFields>,
}

#[derive(Debug, Default, Deserialize)]
struct EventFields {
    #[serde(default)]
    severity: Option<f64>,
    #[serde(default)]
    action: Option<String>,
    /// ECS allows a single keyword or an array here.
    #[serde(default)]
    category: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn contains_any(&self, wanted: &[&str]) -> bool {
        match self {
            OneOrMany::One(v) => wanted.contains(&v.as_str()),
            OneOrMany::Many(vs) => vs.iter().any(|v| wanted.contains(&v.as_str())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RuleFields {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HostFields {
    #[serde(default)]
    name: Option<String>,
}

impl HitSource {
    fn event_action(&self) -> Option<&str> {
        self.event.as_ref().and_then(|e| e.action.as_deref())
    }

    fn rule_name(&self) -> Option<&str> {
        self.rule.as_ref().and_then(|r| r.name.as_deref())
    }

    /// Intrusion/malware category, a blocked action, or a detection rule hit.
    fn is_security_signal(&self) -> bool {
        let categorized = self
            .event
            .as_ref()
            .and_then(|e| e.category.as_ref())
            .is_some_and(|c| c.contains_any(SIGNAL_CATEGORIES));

        categorized || self.event_action() == Some("blocked") || self.rule_name().is_some()
    }
}

/// Adapter for an Elasticsearch cluster holding security logs.
pub struct ElasticAdapter {
    client: reqwest::Client,
}

impl ElasticAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Search body: recent events matching at least one signal clause, newest first.
fn build_query(config: &ElasticConfig, size: usize) -> Value {
    json!({
        "size": size,
        "sort": [{ "@timestamp": "desc" }],
        "query": {
            "bool": {
                "must": [
                    { "range": { "@timestamp": { "gte": config.lookback } } }
                ],
                "should": [
                    { "match": { "event.category": "intrusion_detection" } },
                    { "match": { "event.category": "malware" } },
                    { "match": { "event.action": "blocked" } },
                    { "exists": { "field": "rule.name" } }
                ],
                "minimum_should_match": 1
            }
        }
    })
}

fn to_alert(hit: Hit) -> AlertItem {
    let src = &hit.source;
    let title = first_non_empty([src.rule_name(), src.event_action()], "Security Alert");
    let host = first_non_empty([src.host.as_ref().and_then(|h| h.name.as_deref())], "N/A");
    let message = first_non_empty([src.message.as_deref()], "Security event detected");

    AlertItem {
        id: CATEGORY.alert_id(&hit.id),
        source: CATEGORY.source(),
        severity: severity::from_siem_score(src.event.as_ref().and_then(|e| e.severity)),
        title,
        description: Some(format!("Host: {} | {}", host, message)),
        timestamp: timestamp_or_now([src.timestamp.as_deref()]),
        link: None,
    }
}

fn normalize(response: SearchResponse) -> Vec<AlertItem> {
    response
        .hits
        .map(|h| h.hits)
        .unwrap_or_default()
        .into_iter()
        .filter(|hit| hit.source.is_security_signal())
        .map(to_alert)
        .collect()
}

#[async_trait]
impl ProviderAdapter for ElasticAdapter {
    fn category(&self) -> ProviderCategory {
        CATEGORY
    }

    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError> {
        let config = config
            .elastic
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured("elastic".to_string()))?;
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("url".to_string()))?;

        let url = format!("{}/{}/_search", base.trim_end_matches('/'), config.index);
        debug!("Querying Elasticsearch at {}", url);

        let mut request = self.client.post(&url).json(&build_query(config, headroom(limit)));
        request = match (&config.api_key, &config.username) {
            (Some(key), _) if !key.trim().is_empty() => {
                request.header("Authorization", format!("ApiKey {}", key.trim()))
            }
            (_, Some(user)) => request.basic_auth(user, config.password.as_deref()),
            _ => return Err(FetchError::NotConfigured("api_key | username+password".to_string())),
        };

        let response = request.send().await?;
        let payload: SearchResponse = decode_json(response).await?;
        Ok(normalize(payload))
    }
}
