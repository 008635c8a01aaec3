//! Alert statistics.
//!
//! Helpers for flattening, ordering and summarizing the alerts of an
//! aggregation result.

use crate::models::{AggregationResult, AlertItem, ProviderCategory, SeveritySummary};
use std::collections::HashMap;

/// All alerts of a result, in wire order.
pub fn all_alerts(result: &AggregationResult) -> Vec<&AlertItem> {
    result.iter().flat_map(|(_, items)| items.iter()).collect()
}

/// Sort alerts by severity (critical first), newest first within a level.
pub fn sort_by_severity(alerts: &mut [&AlertItem]) {
    alerts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

/// Get the top N alerts across all providers by severity.
pub fn top_alerts(result: &AggregationResult, n: usize) -> Vec<&AlertItem> {
    let mut sorted = all_alerts(result);
    sort_by_severity(&mut sorted);
    sorted.truncate(n);
    sorted
}

/// Severity counts per provider, in wire order.
pub fn summary_by_provider(result: &AggregationResult) -> Vec<(ProviderCategory, SeveritySummary)> {
    result
        .iter()
        .map(|(category, items)| (category, SeveritySummary::from_items(items)))
        .collect()
}

/// Titles reported more than once in a cycle (case-insensitive), most frequent first.
pub fn recurring_titles(result: &AggregationResult) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for alert in all_alerts(result) {
        *counts.entry(alert.title.trim().to_lowercase()).or_default() += 1;
    }

    let mut patterns: Vec<_> = counts.into_iter().filter(|(_, count)| *count > 1).collect();
    patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::{Duration, Utc};

    fn create_test_alert(
        category: ProviderCategory,
        id: &str,
        severity: Severity,
        title: &str,
        age_minutes: i64,
    ) -> AlertItem {
        AlertItem {
            id: category.alert_id(id),
            source: category.source(),
            severity,
            title: title.to_string(),
            description: None,
            timestamp: Utc::now() - Duration::minutes(age_minutes),
            link: None,
        }
    }

    fn sample_result() -> AggregationResult {
        let mut result = AggregationResult::default();
        result.set(
            ProviderCategory::Elastic,
            vec![
                create_test_alert(ProviderCategory::Elastic, "1", Severity::Low, "Port scan", 5),
                create_test_alert(ProviderCategory::Elastic, "2", Severity::Critical, "Malware", 30),
            ],
        );
        result.set(
            ProviderCategory::Tenable,
            vec![
                create_test_alert(ProviderCategory::Tenable, "3", Severity::Critical, "Log4Shell", 1),
                create_test_alert(ProviderCategory::Tenable, "4", Severity::High, "port scan", 2),
            ],
        );
        result
    }

    #[test]
    fn test_all_alerts_in_wire_order() {
        let result = sample_result();
        let ids: Vec<_> = all_alerts(&result).into_iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["elastic-1", "elastic-2", "tenable-3", "tenable-4"]);
    }

    #[test]
    fn test_top_alerts() {
        let result = sample_result();
        let top = top_alerts(&result, 3);

        assert_eq!(top.len(), 3);
        // Both critical, newer first.
        assert_eq!(top[0].id, "tenable-3");
        assert_eq!(top[1].id, "elastic-2");
        assert_eq!(top[2].severity, Severity::High);
    }

    #[test]
    fn test_summary_by_provider() {
        let result = sample_result();
        let summaries = summary_by_provider(&result);

        assert_eq!(summaries.len(), 5);
        assert_eq!(summaries[0].0, ProviderCategory::Elastic);
        assert_eq!(summaries[0].1.total, 2);
        assert_eq!(summaries[1].1.total, 0);
        assert_eq!(summaries[3].1.critical, 1);
    }

    #[test]
    fn test_recurring_titles() {
        let result = sample_result();
        assert_eq!(recurring_titles(&result), vec![("port scan".to_string(), 2)]);
        assert!(recurring_titles(&AggregationResult::default()).is_empty());
    }
}
