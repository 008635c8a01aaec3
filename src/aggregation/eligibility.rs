//! Eligibility rules.
//!
//! A provider category takes part in a cycle only when its active
//! configuration carries every credential its adapter needs. The rules are
//! data: one row per category, evaluated against [`FieldLookup`].

use crate::config::{ActiveConfig, FieldLookup};
use crate::models::ProviderCategory;

/// Credential requirements for one category.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityRule {
    pub category: ProviderCategory,
    /// Fields that must all be present.
    pub all_of: &'static [&'static str],
    /// Alternative credential sets; at least one set must be complete.
    /// Empty means no alternative is required.
    pub one_of: &'static [&'static [&'static str]],
}

/// The rule table.
pub static RULES: [EligibilityRule; 5] = [
    EligibilityRule {
        category: ProviderCategory::Elastic,
        all_of: &["url"],
        one_of: &[&["api_key"], &["username", "password"]],
    },
    EligibilityRule {
        category: ProviderCategory::Defender,
        all_of: &["tenant_id", "client_id", "client_secret"],
        one_of: &[],
    },
    EligibilityRule {
        category: ProviderCategory::OpenCti,
        all_of: &["url"],
        one_of: &[&["api_key"], &["token"]],
    },
    EligibilityRule {
        category: ProviderCategory::Tenable,
        all_of: &["access_key", "secret_key"],
        one_of: &[],
    },
    EligibilityRule {
        category: ProviderCategory::Rss,
        all_of: &["feeds"],
        one_of: &[],
    },
];

/// Outcome of evaluating a category against the active configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Category absent or disabled.
    Inactive,
    /// Active but incomplete; lists what is missing.
    Missing(Vec<String>),
    /// Ready to fetch.
    Eligible,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Look up the rule for a category.
pub fn rule_for(category: ProviderCategory) -> Option<&'static EligibilityRule> {
    RULES.iter().find(|rule| rule.category == category)
}

impl EligibilityRule {
    /// Fields missing from `fields`, empty when the rule is satisfied.
    pub fn missing(&self, fields: &dyn FieldLookup) -> Vec<String> {
        let mut missing: Vec<String> = self
            .all_of
            .iter()
            .filter(|name| !fields.has_field(name))
            .map(|name| name.to_string())
            .collect();

        let alternative_met = self.one_of.is_empty()
            || self
                .one_of
                .iter()
                .any(|set| set.iter().all(|name| fields.has_field(name)));

        if !alternative_met {
            let options: Vec<String> = self.one_of.iter().map(|set| set.join("+")).collect();
            missing.push(options.join(" | "));
        }

        missing
    }
}

/// The category's section, if present and switched on.
fn section(category: ProviderCategory, config: &ActiveConfig) -> Option<&dyn FieldLookup> {
    match category {
        ProviderCategory::Elastic => config
            .elastic
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c as &dyn FieldLookup),
        ProviderCategory::Defender => config
            .defender
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c as &dyn FieldLookup),
        ProviderCategory::OpenCti => config
            .opencti
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c as &dyn FieldLookup),
        ProviderCategory::Tenable => config
            .tenable
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c as &dyn FieldLookup),
        ProviderCategory::Rss => config
            .rss
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c as &dyn FieldLookup),
    }
}

/// Evaluate one category.
pub fn evaluate(category: ProviderCategory, config: &ActiveConfig) -> Eligibility {
    let Some(fields) = section(category, config) else {
        return Eligibility::Inactive;
    };

    let missing = rule_for(category)
        .map(|rule| rule.missing(fields))
        .unwrap_or_default();
    if missing.is_empty() {
        Eligibility::Eligible
    } else {
        Eligibility::Missing(missing)
    }
}
