//! Threat-intel adapter (OpenCTI GraphQL API).

use super::{decode_json, first_non_empty, headroom, timestamp_or_now, FetchError, ProviderAdapter};
use crate::config::{ActiveConfig, OpenCtiConfig};
use crate::models::{AlertItem, ProviderCategory};
use crate::severity;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const CATEGORY: ProviderCategory = ProviderCategory::OpenCti;

/// Indicators scoring below this (on both score and confidence) are dropped.
const MIN_RELEVANT_SCORE: i64 = 50;

const INDICATORS_QUERY: &str = r#"
query GetIndicators($first: Int!) {
  indicators(
    first: $first,
    orderBy: created,
    orderMode: desc,
    filters: {
      mode: and,
      filters: [
        {
          key: "indicator_types",
          values: ["malicious-activity", "anomalous-activity"],
          operator: eq,
          mode: or
        }
      ],
      filterGroups: []
    }
  ) {
    edges {
      node {
        id
        name
        pattern
        pattern_type
        created
        modified
        confidence
        x_opencti_score
        description
        labels { edges { node { value } } }
        indicator_types
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<IndicatorsData>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IndicatorsData {
    #[serde(default)]
    indicators: Option<Connection<Indicator>>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct Indicator {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pattern_type: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    confidence: Option<i64>,
    #[serde(default)]
    x_opencti_score: Option<i64>,
    #[serde(default)]
    labels: Option<Connection<Label>>,
    #[serde(default)]
    indicator_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Label {
    value: String,
}

impl Indicator {
    fn is_relevant(&self) -> bool {
        self.x_opencti_score.unwrap_or(0) >= MIN_RELEVANT_SCORE
            || self.confidence.unwrap_or(0) >= MIN_RELEVANT_SCORE
    }

    fn label_values(&self) -> Vec<&str> {
        self.labels
            .as_ref()
            .map(|c| c.edges.iter().map(|e| e.node.value.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Adapter for an OpenCTI platform.
pub struct OpenCtiAdapter {
    client: reqwest::Client,
}

impl OpenCtiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_alert(indicator: Indicator) -> AlertItem {
    let types = indicator
        .indicator_types
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| t.join(", "))
        .unwrap_or_else(|| "unknown".to_string());
    let labels = indicator.label_values();

    let mut description = format!(
        "Type: {} | Pattern: {}",
        types,
        first_non_empty([indicator.pattern_type.as_deref()], "N/A")
    );
    if !labels.is_empty() {
        description.push_str(&format!(" | Labels: {}", labels.join(", ")));
    }

    AlertItem {
        id: CATEGORY.alert_id(&indicator.id),
        source: CATEGORY.source(),
        severity: severity::from_threat_intel(indicator.x_opencti_score, indicator.confidence),
        title: first_non_empty([indicator.name.as_deref()], "Threat Indicator"),
        description: Some(description),
        timestamp: timestamp_or_now([indicator.modified.as_deref(), indicator.created.as_deref()]),
        link: None,
    }
}

fn normalize(response: GraphQlResponse) -> Result<Vec<AlertItem>, FetchError> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
        let joined = messages.join("; ");
        let lowered = joined.to_lowercase();
        return Err(if lowered.contains("auth") || lowered.contains("forbidden") {
            FetchError::Auth(joined)
        } else {
            FetchError::Malformed(format!("GraphQL errors: {}", joined))
        });
    }

    Ok(response
        .data
        .and_then(|d| d.indicators)
        .map(|c| c.edges)
        .unwrap_or_default()
        .into_iter()
        .map(|edge| edge.node)
        .filter(Indicator::is_relevant)
        .map(to_alert)
        .collect())
}

#[async_trait]
impl ProviderAdapter for OpenCtiAdapter {
    fn category(&self) -> ProviderCategory {
        CATEGORY
    }

    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError> {
        let config: &OpenCtiConfig = config
            .opencti
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured("opencti".to_string()))?;
        let (Some(base), Some(key)) = (config.url.as_deref(), config.credential()) else {
            return Err(FetchError::NotConfigured("url, api_key | token".to_string()));
        };

        let url = format!("{}/graphql", base.trim_end_matches('/'));
        debug!("Querying OpenCTI indicators at {}", url);

        let body = json!({
            "query": INDICATORS_QUERY,
            "variables": { "first": headroom(limit) },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(key.trim())
            .json(&body)
            .send()
            .await?;

        let payload: GraphQlResponse = decode_json(response).await?;
        normalize(payload)
    }
}
