//! EDR adapter (Microsoft Defender for Endpoint).
//!
//! Every fetch performs a fresh OAuth2 client-credentials exchange; tokens
//! are never cached across cycles.

use super::{
    check_status, decode_json, first_non_empty, headroom, timestamp_or_now, FetchError,
    ProviderAdapter,
};
use crate::config::{ActiveConfig, DefenderConfig};
use crate::models::{AlertItem, ProviderCategory};
use crate::severity;
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

const CATEGORY: ProviderCategory = ProviderCategory::Defender;

const TOKEN_SCOPE: &str = "https://api.securitycenter.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    value: Vec<DefenderAlert>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefenderAlert {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_date_time: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    computer_dns_name: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl DefenderAlert {
    /// Only High and Medium alerts reach the dashboard.
    fn is_actionable(&self) -> bool {
        matches!(self.severity.as_deref(), Some("High") | Some("Medium"))
    }
}

/// Adapter for the Defender alerts API.
pub struct DefenderAdapter {
    client: reqwest::Client,
}

impl DefenderAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn access_token(
        &self,
        config: &DefenderConfig,
        tenant: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            config.login_url.trim_end_matches('/'),
            tenant
        );

        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", TOKEN_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self.client.post(&url).form(&form).send().await?;

        // Any rejection from the identity provider is an auth failure.
        let response = check_status(response).await.map_err(|e| match e {
            FetchError::Status { status, body } => {
                FetchError::Auth(format!("token endpoint returned {}: {}", status, body))
            }
            other => other,
        })?;

        let token: TokenResponse = decode_json(response).await?;
        if token.access_token.is_empty() {
            return Err(FetchError::Auth("token endpoint returned an empty token".to_string()));
        }
        Ok(token.access_token)
    }
}

/// OData filter for unresolved alerts created within the lookback window.
fn alerts_filter(lookback_days: i64) -> String {
    let since = Utc::now() - Duration::days(lookback_days.clamp(0, 3650));
    format!(
        "status ne 'Resolved' and createdDateTime ge {}",
        since.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn to_alert(alert: DefenderAlert) -> AlertItem {
    let host = first_non_empty([alert.computer_dns_name.as_deref()], "N/A");
    let detail = first_non_empty([alert.description.as_deref(), alert.status.as_deref()], "");

    AlertItem {
        id: CATEGORY.alert_id(&alert.id),
        source: CATEGORY.source(),
        severity: severity::from_edr_label(alert.severity.as_deref().unwrap_or("")),
        title: first_non_empty([alert.title.as_deref()], "Security Alert"),
        description: Some(format!(
            "Host: {} | {} | {}",
            host,
            alert.category.as_deref().unwrap_or(""),
            detail
        )),
        timestamp: timestamp_or_now([alert.created_date_time.as_deref()]),
        link: None,
    }
}

fn normalize(response: AlertsResponse) -> Vec<AlertItem> {
    response
        .value
        .into_iter()
        .filter(DefenderAlert::is_actionable)
        .map(to_alert)
        .collect()
}

#[async_trait]
impl ProviderAdapter for DefenderAdapter {
    fn category(&self) -> ProviderCategory {
        CATEGORY
    }

    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError> {
        let config = config
            .defender
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured("defender".to_string()))?;

        let (Some(tenant), Some(client_id), Some(secret)) = (
            config.tenant_id.as_deref(),
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) else {
            return Err(FetchError::NotConfigured(
                "tenant_id, client_id, client_secret".to_string(),
            ));
        };

        let token = self.access_token(config, tenant, client_id, secret).await?;

        let url = format!("{}/alerts", config.api_url.trim_end_matches('/'));
        debug!("Querying Defender alerts at {}", url);

        let top = headroom(limit).to_string();
        let filter = alerts_filter(config.lookback_days);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("$top", top.as_str()),
                ("$filter", filter.as_str()),
                ("$orderby", "createdDateTime desc"),
            ])
            .send()
            .await?;

        let payload: AlertsResponse = decode_json(response).await?;
        Ok(normalize(payload))
    }
}
