//! Vulnerability scanner adapter (Tenable.io workbenches).

use super::{decode_json, first_non_empty, timestamp_or_now, FetchError, ProviderAdapter};
use crate::config::ActiveConfig;
use crate::models::{AlertItem, ProviderCategory};
use crate::severity;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const CATEGORY: ProviderCategory = ProviderCategory::Tenable;

/// Only high (3) and critical (4) findings are surfaced.
const MIN_SEVERITY: i64 = 3;

#[derive(Debug, Deserialize)]
struct WorkbenchResponse {
    #[serde(default)]
    vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Deserialize)]
struct Vulnerability {
    plugin_id: i64,
    #[serde(default)]
    plugin_name: Option<String>,
    #[serde(default)]
    severity: Option<i64>,
    #[serde(default)]
    host_name: Option<String>,
    #[serde(default)]
    first_found: Option<String>,
}

/// Adapter for the Tenable.io vulnerability workbench.
pub struct TenableAdapter {
    client: reqwest::Client,
}

impl TenableAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_alert(vuln: Vulnerability) -> AlertItem {
    let host = first_non_empty([vuln.host_name.as_deref()], "N/A");

    AlertItem {
        id: CATEGORY.alert_id(&vuln.plugin_id.to_string()),
        source: CATEGORY.source(),
        severity: severity::from_scanner_level(vuln.severity.unwrap_or(0)),
        title: first_non_empty([vuln.plugin_name.as_deref()], "Vulnerability Detected"),
        description: Some(format!("Host: {} | Plugin ID: {}", host, vuln.plugin_id)),
        timestamp: timestamp_or_now([vuln.first_found.as_deref()]),
        link: None,
    }
}

fn normalize(response: WorkbenchResponse) -> Vec<AlertItem> {
    response
        .vulnerabilities
        .into_iter()
        .filter(|v| v.severity.unwrap_or(0) >= MIN_SEVERITY)
        .map(to_alert)
        .collect()
}

#[async_trait]
impl ProviderAdapter for TenableAdapter {
    fn category(&self) -> ProviderCategory {
        CATEGORY
    }

    // The workbench endpoint has no page size; the full list is filtered locally.
    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        _limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError> {
        let config = config
            .tenable
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured("tenable".to_string()))?;
        let (Some(access), Some(secret)) =
            (config.access_key.as_deref(), config.secret_key.as_deref())
        else {
            return Err(FetchError::NotConfigured("access_key, secret_key".to_string()));
        };

        let url = format!(
            "{}/workbenches/vulnerabilities",
            config.base_url.trim_end_matches('/')
        );
        debug!("Querying Tenable workbench at {}", url);

        let response = self
            .client
            .get(&url)
            .header(
                "X-ApiKeys",
                format!("accessKey={}; secretKey={}", access.trim(), secret.trim()),
            )
            .header("Accept", "application/json")
            .send()
            .await?;

        let payload: WorkbenchResponse = decode_json(response).await?;
        Ok(normalize(payload))
    }
}
