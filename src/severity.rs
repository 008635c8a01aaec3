//! Severity normalization.
//!
//! Each provider reports severity on its own scale. These functions map
//! the native signal onto [`Severity`]. They are total: every input
//! produces one of the five levels.

use crate::models::Severity;

/// Keywords that mark a news item as critical.
pub const CRITICAL_KEYWORDS: &[&str] = &[
    "zero-day",
    "0-day",
    "ransomware",
    "breach",
    "exploit",
    "rce",
    "remote code execution",
];

/// Keywords that mark a news item as high.
pub const HIGH_KEYWORDS: &[&str] = &[
    "vulnerability",
    "cve-",
    "malware",
    "attack",
    "threat",
    "security alert",
];

/// Keywords that mark a news item as medium.
pub const MEDIUM_KEYWORDS: &[&str] = &["security", "patch", "update", "advisory", "warning"];

/// SIEM risk score (0-100).
///
/// A missing or zero score is treated as "unscored" and lands on medium.
pub fn from_siem_score(score: Option<f64>) -> Severity {
    match score {
        None => Severity::Medium,
        Some(s) if s == 0.0 || s.is_nan() => Severity::Medium,
        Some(s) if s >= 90.0 => Severity::Critical,
        Some(s) if s >= 70.0 => Severity::High,
        Some(s) if s >= 40.0 => Severity::Medium,
        Some(s) if s >= 20.0 => Severity::Low,
        Some(_) => Severity::Info,
    }
}

/// EDR alert severity. Shifted up one level: the EDR only raises
/// actionable detections, so its medium already warrants attention.
pub fn from_edr_label(label: &str) -> Severity {
    match label.trim().to_lowercase().as_str() {
        "high" => Severity::Critical,
        "medium" => Severity::High,
        "low" => Severity::Medium,
        _ => Severity::Info,
    }
}

/// Effective threat-intel score: score, else confidence, else 50.
/// Zero counts as absent.
pub fn threat_intel_effective_score(score: Option<i64>, confidence: Option<i64>) -> i64 {
    score
        .filter(|s| *s != 0)
        .or(confidence.filter(|c| *c != 0))
        .unwrap_or(50)
}

/// Threat-intel indicator score/confidence (0-100).
pub fn from_threat_intel(score: Option<i64>, confidence: Option<i64>) -> Severity {
    match threat_intel_effective_score(score, confidence) {
        s if s >= 80 => Severity::Critical,
        s if s >= 60 => Severity::High,
        s if s >= 40 => Severity::Medium,
        s if s >= 20 => Severity::Low,
        _ => Severity::Info,
    }
}

/// Vulnerability scanner severity (0 info .. 4 critical).
pub fn from_scanner_level(level: i64) -> Severity {
    match level {
        l if l >= 4 => Severity::Critical,
        3 => Severity::High,
        2 => Severity::Medium,
        1 => Severity::Low,
        _ => Severity::Info,
    }
}

/// Classify a news item by keyword, checking critical, then high, then medium.
pub fn from_keywords(title: &str, body: &str) -> Severity {
    let text = format!("{} {}", title, body).to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|kw| text.contains(kw));

    if matches(CRITICAL_KEYWORDS) {
        Severity::Critical
    } else if matches(HIGH_KEYWORDS) {
        Severity::High
    } else if matches(MEDIUM_KEYWORDS) {
        Severity::Medium
    } else {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siem_thresholds() {
        let cases = [
            (89.0, Severity::High),
            (90.0, Severity::Critical),
            (91.0, Severity::Critical),
            (100.0, Severity::Critical),
            (69.0, Severity::Medium),
            (70.0, Severity::High),
            (39.0, Severity::Low),
            (40.0, Severity::Medium),
            (19.0, Severity::Info),
            (20.0, Severity::Low),
            (1.0, Severity::Info),
        ];
        for (score, expected) in cases {
            assert_eq!(from_siem_score(Some(score)), expected, "score {}", score);
        }
    }

    #[test]
    fn test_siem_unscored_is_medium() {
        assert_eq!(from_siem_score(None), Severity::Medium);
        assert_eq!(from_siem_score(Some(0.0)), Severity::Medium);
        assert_eq!(from_siem_score(Some(f64::NAN)), Severity::Medium);
    }

    #[test]
    fn test_siem_out_of_range_scores() {
        assert_eq!(from_siem_score(Some(250.0)), Severity::Critical);
        assert_eq!(from_siem_score(Some(-5.0)), Severity::Info);
    }

    #[test]
    fn test_edr_shifted_up() {
        assert_eq!(from_edr_label("High"), Severity::Critical);
        assert_eq!(from_edr_label("Medium"), Severity::High);
        assert_eq!(from_edr_label("Low"), Severity::Medium);
        assert_eq!(from_edr_label("medium"), Severity::High);
        assert_eq!(from_edr_label("Informational"), Severity::Info);
        assert_eq!(from_edr_label("UnSpecified"), Severity::Info);
        assert_eq!(from_edr_label(""), Severity::Info);
    }

    #[test]
    fn test_threat_intel_prefers_score() {
        assert_eq!(from_threat_intel(Some(85), Some(10)), Severity::Critical);
        assert_eq!(from_threat_intel(None, Some(65)), Severity::High);
        assert_eq!(from_threat_intel(Some(0), Some(45)), Severity::Medium);
        assert_eq!(from_threat_intel(None, None), Severity::Medium);
    }

    #[test]
    fn test_threat_intel_thresholds() {
        let cases = [
            (79, Severity::High),
            (80, Severity::Critical),
            (59, Severity::Medium),
            (60, Severity::High),
            (39, Severity::Low),
            (40, Severity::Medium),
            (19, Severity::Info),
            (20, Severity::Low),
        ];
        for (score, expected) in cases {
            assert_eq!(from_threat_intel(Some(score), None), expected, "score {}", score);
        }
    }

    #[test]
    fn test_scanner_levels() {
        assert_eq!(from_scanner_level(4), Severity::Critical);
        assert_eq!(from_scanner_level(5), Severity::Critical);
        assert_eq!(from_scanner_level(3), Severity::High);
        assert_eq!(from_scanner_level(2), Severity::Medium);
        assert_eq!(from_scanner_level(1), Severity::Low);
        assert_eq!(from_scanner_level(0), Severity::Info);
        assert_eq!(from_scanner_level(-1), Severity::Info);
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(
            from_keywords("New Ransomware strain exploits CVE-2024-1234", ""),
            Severity::Critical
        );
        assert_eq!(
            from_keywords("Critical vulnerability in OpenSSL", ""),
            Severity::High
        );
        assert_eq!(
            from_keywords("Monthly patch roundup", "Vendor advisory"),
            Severity::Medium
        );
        assert_eq!(from_keywords("Quarterly earnings", "Nothing here"), Severity::Info);
    }

    #[test]
    fn test_keywords_match_body_case_insensitively() {
        assert_eq!(
            from_keywords("Weekly digest", "A ZERO-DAY was disclosed"),
            Severity::Critical
        );
    }
}
