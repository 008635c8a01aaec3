//! Data models for the alert aggregation engine.
//!
//! This module contains the normalized alert shape shared by every
//! provider adapter, and the per-cycle aggregation result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared severity scale all provider-native severities are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no operator action expected
    Info,
    /// Low severity - worth a glance
    Low,
    /// Medium severity - review during the shift
    Medium,
    /// High severity - investigate soon
    High,
    /// Critical severity - act now
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// All levels, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🔵",
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

/// The system an alert came from. Assigned by the adapter, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertSource {
    #[serde(rename = "Elastic")]
    Siem,
    #[serde(rename = "Defender")]
    Edr,
    #[serde(rename = "OpenCTI")]
    ThreatIntel,
    #[serde(rename = "Tenable")]
    VulnScan,
    #[serde(rename = "RSS")]
    NewsFeed,
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSource::Siem => write!(f, "Elastic"),
            AlertSource::Edr => write!(f, "Defender"),
            AlertSource::ThreatIntel => write!(f, "OpenCTI"),
            AlertSource::VulnScan => write!(f, "Tenable"),
            AlertSource::NewsFeed => write!(f, "RSS"),
        }
    }
}

/// One external provider category, keyed the way the dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderCategory {
    Elastic,
    Defender,
    OpenCti,
    Tenable,
    Rss,
}

impl ProviderCategory {
    /// Every category in wire order.
    pub const ALL: [ProviderCategory; 5] = [
        ProviderCategory::Elastic,
        ProviderCategory::Defender,
        ProviderCategory::OpenCti,
        ProviderCategory::Tenable,
        ProviderCategory::Rss,
    ];

    /// JSON key and alert id namespace for this category.
    pub fn key(&self) -> &'static str {
        match self {
            ProviderCategory::Elastic => "elastic",
            ProviderCategory::Defender => "defender",
            ProviderCategory::OpenCti => "opencti",
            ProviderCategory::Tenable => "tenable",
            ProviderCategory::Rss => "rss",
        }
    }

    /// Source tag stamped on every alert this category produces.
    pub fn source(&self) -> AlertSource {
        match self {
            ProviderCategory::Elastic => AlertSource::Siem,
            ProviderCategory::Defender => AlertSource::Edr,
            ProviderCategory::OpenCti => AlertSource::ThreatIntel,
            ProviderCategory::Tenable => AlertSource::VulnScan,
            ProviderCategory::Rss => AlertSource::NewsFeed,
        }
    }

    /// Build a namespaced alert id: `<category>-<native id>`.
    pub fn alert_id(&self, native_id: &str) -> String {
        format!("{}-{}", self.key(), native_id)
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A normalized security signal from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    /// Globally unique id, namespaced by provider.
    pub id: String,
    /// Producing system.
    pub source: AlertSource,
    /// Normalized severity.
    pub severity: Severity,
    /// Human-readable summary, never empty.
    pub title: String,
    /// Optional provider-specific context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the underlying event occurred or was last modified.
    pub timestamp: DateTime<Utc>,
    /// Link to the original record (news items).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Result of one aggregation cycle: one ordered slot per provider category.
///
/// Field names are the dashboard's legacy keys and must not change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub elastic: Vec<AlertItem>,
    pub defender: Vec<AlertItem>,
    pub opencti: Vec<AlertItem>,
    pub tenable: Vec<AlertItem>,
    pub rss: Vec<AlertItem>,
}

impl AggregationResult {
    /// Items collected for a category.
    pub fn get(&self, category: ProviderCategory) -> &[AlertItem] {
        match category {
            ProviderCategory::Elastic => &self.elastic,
            ProviderCategory::Defender => &self.defender,
            ProviderCategory::OpenCti => &self.opencti,
            ProviderCategory::Tenable => &self.tenable,
            ProviderCategory::Rss => &self.rss,
        }
    }

    /// Replace the slot for a category.
    pub fn set(&mut self, category: ProviderCategory, items: Vec<AlertItem>) {
        let slot = match category {
            ProviderCategory::Elastic => &mut self.elastic,
            ProviderCategory::Defender => &mut self.defender,
            ProviderCategory::OpenCti => &mut self.opencti,
            ProviderCategory::Tenable => &mut self.tenable,
            ProviderCategory::Rss => &mut self.rss,
        };
        *slot = items;
    }

    /// Iterate over `(category, items)` in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (ProviderCategory, &[AlertItem])> {
        ProviderCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Total number of items across all categories.
    pub fn total(&self) -> usize {
        self.iter().map(|(_, items)| items.len()).sum()
    }
}

/// Severity counts over a set of alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeveritySummary {
    /// Creates a summary from a list of alerts.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a AlertItem>) -> Self {
        let mut summary = Self::default();

        for item in items {
            summary.total += 1;
            match item.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }

    /// Count for a single level.
    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Context printed at the top of a dashboard snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the cycle finished.
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration of the cycle.
    pub duration_seconds: f64,
    /// Per-provider cap used for the cycle.
    pub limit_per_provider: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: ProviderCategory, native: &str, severity: Severity) -> AlertItem {
        AlertItem {
            id: category.alert_id(native),
            source: category.source(),
            severity,
            title: "Test".to_string(),
            description: None,
            timestamp: Utc::now(),
            link: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: Severity = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(back, Severity::Info);
    }

    #[test]
    fn test_alert_id_is_namespaced() {
        assert_eq!(ProviderCategory::Tenable.alert_id("19506"), "tenable-19506");
        assert_eq!(ProviderCategory::OpenCti.alert_id("abc"), "opencti-abc");
    }

    #[test]
    fn test_result_wire_keys() {
        let mut result = AggregationResult::default();
        result.set(
            ProviderCategory::Rss,
            vec![item(ProviderCategory::Rss, "1", Severity::High)],
        );

        let value = serde_json::to_value(&result).unwrap();
        for key in ["elastic", "defender", "opencti", "tenable", "rss"] {
            assert!(value.get(key).unwrap().is_array(), "missing key {}", key);
        }
        assert_eq!(value["rss"][0]["source"], "RSS");
        assert_eq!(value["rss"][0]["severity"], "high");
        assert!(value["rss"][0].get("link").is_none());
    }

    #[test]
    fn test_severity_summary() {
        let items = vec![
            item(ProviderCategory::Elastic, "a", Severity::Critical),
            item(ProviderCategory::Elastic, "b", Severity::Critical),
            item(ProviderCategory::Defender, "c", Severity::Info),
        ];

        let summary = SeveritySummary::from_items(&items);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.count(Severity::Info), 1);
        assert_eq!(summary.high, 0);
    }

    #[test]
    fn test_result_total_and_iter_order() {
        let mut result = AggregationResult::default();
        result.set(
            ProviderCategory::Elastic,
            vec![item(ProviderCategory::Elastic, "1", Severity::Low)],
        );
        result.set(
            ProviderCategory::Tenable,
            vec![
                item(ProviderCategory::Tenable, "1", Severity::High),
                item(ProviderCategory::Tenable, "2", Severity::Critical),
            ],
        );

        assert_eq!(result.total(), 3);
        let order: Vec<_> = result.iter().map(|(c, _)| c).collect();
        assert_eq!(order, ProviderCategory::ALL.to_vec());
    }
}
