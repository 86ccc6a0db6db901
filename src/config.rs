//! Static heuristic tables: the source registry and the analysis policy.
//!
//! Both are plain data handed to each component explicitly. The registry can
//! be replaced from a YAML file so new monitoring tools can be taught without
//! code changes; the policy is fixed domain policy and only constructed from
//! [`Policy::default()`].

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::data::normalize_column_name;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceProfile {
    pub name: String,
    /// Columns whose presence is diagnostic of this source.
    pub signature: Vec<String>,
    /// Raw column name -> standard column name.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
    /// Standard fields a healthy export from this source always carries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_fields: Vec<String>,
}

impl SourceProfile {
    fn new(name: &str, signature: &[&str], mappings: &[(&str, &str)], expected: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.iter().map(|s| s.to_string()).collect(),
            mappings: mappings
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            expected_fields: expected.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRegistry {
    /// Declaration order breaks detection ties.
    pub sources: Vec<SourceProfile>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceProfile::new(
                    "newrelic",
                    &[
                        "incident_id",
                        "condition_name",
                        "policy_name",
                        "entity_name",
                        "violation_url",
                        "runbook_url",
                        "nrql_query",
                        "account_id",
                    ],
                    &[
                        ("incident_id", "id"),
                        ("condition_name", "title"),
                        ("policy_name", "category"),
                        ("entity_name", "source"),
                        ("opened_at", "created_time"),
                        ("closed_at", "resolved_time"),
                        ("duration", "duration_seconds"),
                        ("severity", "severity"),
                    ],
                    &["id", "title", "severity", "created_time"],
                ),
                SourceProfile::new(
                    "moogsoft",
                    &[
                        "alert_id",
                        "situation_id",
                        "sig_id",
                        "source",
                        "class",
                        "manager",
                        "severity",
                        "first_event_time",
                        "last_event_time",
                        "moog_id",
                        "dedup_key",
                    ],
                    &[
                        ("alert_id", "id"),
                        ("description", "title"),
                        ("class", "category"),
                        ("source", "source"),
                        ("first_event_time", "created_time"),
                        ("last_event_time", "resolved_time"),
                        ("severity", "severity"),
                    ],
                    &["id", "title", "severity", "source", "created_time"],
                ),
                SourceProfile::new(
                    "servicenow",
                    &[
                        "number",
                        "sys_id",
                        "caller_id",
                        "assignment_group",
                        "assigned_to",
                        "short_description",
                        "priority",
                        "state",
                        "category",
                        "subcategory",
                        "cmdb_ci",
                        "impact",
                        "urgency",
                        "incident_state",
                    ],
                    &[
                        ("number", "id"),
                        ("short_description", "title"),
                        ("category", "category"),
                        ("cmdb_ci", "source"),
                        ("sys_created_on", "created_time"),
                        ("resolved_at", "resolved_time"),
                        ("priority", "severity"),
                        ("state", "status"),
                    ],
                    &["id", "title", "severity", "status", "created_time"],
                ),
            ],
        }
    }
}

impl SourceRegistry {
    pub fn get(&self, name: &str) -> Option<&SourceProfile> {
        self.sources.iter().find(|source| source.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening source registry {path:?}"))?;
        let reader = BufReader::new(file);
        let registry: SourceRegistry =
            serde_yaml::from_reader(reader).context("Parsing source registry YAML")?;
        registry.validate()?;
        Ok(registry.normalized())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing source registry to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for source in &self.sources {
            ensure!(!source.name.trim().is_empty(), "Source names cannot be empty");
            ensure!(
                !seen.contains(&source.name.as_str()),
                "Source '{}' is declared more than once",
                source.name
            );
            ensure!(
                !source.signature.is_empty(),
                "Source '{}' must declare at least one signature column",
                source.name
            );
            seen.push(source.name.as_str());
        }
        Ok(())
    }

    /// Signature and mapping keys are compared against snake_cased headers,
    /// so they are stored in the same form.
    fn normalized(mut self) -> Self {
        for source in &mut self.sources {
            source.signature = source
                .signature
                .iter()
                .map(|column| normalize_column_name(column))
                .collect();
            source.mappings = std::mem::take(&mut source.mappings)
                .into_iter()
                .map(|(from, to)| (normalize_column_name(&from), to))
                .collect();
        }
        self
    }
}

/// Fixed thresholds, weights and token lists used across the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub min_signature_matches: usize,
    pub small_signature_len: usize,

    pub time_column_candidates: Vec<&'static str>,
    pub trend_dead_band_percent: f64,
    pub trend_window_days: i64,
    pub anomaly_sigma: f64,
    pub min_anomaly_days: usize,
    pub categorical_limit: usize,
    pub categorical_priority: Vec<&'static str>,
    pub categorical_max_unique_ratio: f64,
    pub top_values: usize,
    pub correlation_columns: usize,
    pub correlation_top_pairs: usize,
    pub severity_columns: Vec<&'static str>,
    pub high_severity_tokens: Vec<&'static str>,
    pub source_columns: Vec<&'static str>,

    pub critical_columns: Vec<&'static str>,
    pub key_columns: Vec<&'static str>,
    pub enumerated_columns: Vec<&'static str>,
    /// Whole name tokens; `time_to` matches the adjacent tokens `time`, `to`.
    pub timestamp_name_patterns: Vec<&'static str>,
    pub timestamp_name_suffixes: Vec<&'static str>,
    pub numeric_name_patterns: Vec<&'static str>,
    pub text_columns: Vec<&'static str>,
    pub min_text_length: usize,
    pub placeholder_tokens: Vec<&'static str>,
    pub critical_weight: f64,
    pub optional_weight: f64,
    pub duplicate_penalty: f64,

    pub quality_score_floor: f64,
    pub critical_null_percent: f64,
    pub time_order_critical_percent: f64,
    pub volume_increase_percent: f64,
    pub high_severity_percent: f64,
    pub source_concentration_percent: f64,
    pub category_concentration_percent: f64,
    pub resolution_hours: f64,
    pub correlation_min_columns: usize,
    pub forecasting_min_days: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_signature_matches: 2,
            small_signature_len: 3,

            time_column_candidates: vec![
                "created_time",
                "opened_at",
                "sys_created_on",
                "first_event_time",
                "timestamp",
                "created",
                "date",
            ],
            trend_dead_band_percent: 5.0,
            trend_window_days: 7,
            anomaly_sigma: 2.0,
            min_anomaly_days: 7,
            categorical_limit: 5,
            categorical_priority: vec!["severity", "category", "source", "status", "priority"],
            categorical_max_unique_ratio: 0.5,
            top_values: 10,
            correlation_columns: 4,
            correlation_top_pairs: 10,
            severity_columns: vec!["severity", "priority", "urgency", "impact"],
            high_severity_tokens: vec!["critical", "high", "1", "2", "p1", "p2", "sev1", "sev2"],
            source_columns: vec![
                "source",
                "entity_name",
                "cmdb_ci",
                "host",
                "service",
                "application",
                "component",
                "_source_system",
            ],

            critical_columns: vec![
                "id",
                "title",
                "severity",
                "created_time",
                "incident_id",
                "number",
                "alert_id",
                "sys_id",
                "description",
                "short_description",
            ],
            key_columns: vec!["id", "incident_id", "number", "alert_id", "sys_id"],
            enumerated_columns: vec!["severity", "priority", "urgency", "impact", "status", "state"],
            timestamp_name_patterns: vec![
                "time",
                "timestamp",
                "date",
                "created",
                "opened",
                "closed",
                "resolved",
            ],
            timestamp_name_suffixes: vec!["_at", "_on"],
            numeric_name_patterns: vec!["count", "duration", "time_to", "ttm", "mttr"],
            text_columns: vec!["title", "description", "short_description"],
            min_text_length: 5,
            placeholder_tokens: vec!["test", "n/a", "na", "tbd", "none", "null", "xxx", "-"],
            critical_weight: 3.0,
            optional_weight: 1.0,
            duplicate_penalty: 10.0,

            quality_score_floor: 70.0,
            critical_null_percent: 20.0,
            time_order_critical_percent: 20.0,
            volume_increase_percent: 20.0,
            high_severity_percent: 30.0,
            source_concentration_percent: 30.0,
            category_concentration_percent: 20.0,
            resolution_hours: 24.0,
            correlation_min_columns: 5,
            forecasting_min_days: 30,
        }
    }
}

impl Policy {
    pub fn is_critical_column(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.critical_columns.iter().any(|c| *c == lowered)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        self.key_columns.iter().any(|c| *c == lowered)
    }

    /// `sys_created_on`, `opened_at` and `createdTime` qualify;
    /// `sys_updated_by` does not.
    pub fn is_timestamp_name(&self, name: &str) -> bool {
        let snake = normalize_column_name(name);
        self.timestamp_name_suffixes
            .iter()
            .any(|suffix| snake.ends_with(suffix))
            || has_name_tokens(&snake, &self.timestamp_name_patterns)
    }

    pub fn is_numeric_name(&self, name: &str) -> bool {
        has_name_tokens(&normalize_column_name(name), &self.numeric_name_patterns)
    }

    /// `1 - Critical`, `P1` and `high` all count; the leading token decides.
    pub fn is_high_severity(&self, value: &str) -> bool {
        let lowered = value.trim().to_ascii_lowercase();
        let leading = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find(|token| !token.is_empty())
            .unwrap_or("");
        self.high_severity_tokens.iter().any(|token| *token == leading)
    }
}

/// True when any pattern appears in `snake` as a run of whole `_` tokens.
fn has_name_tokens(snake: &str, patterns: &[&str]) -> bool {
    let tokens = snake.split('_').collect::<Vec<_>>();
    patterns.iter().any(|pattern| {
        let wanted = pattern.split('_').collect::<Vec<_>>();
        tokens.windows(wanted.len()).any(|window| window == wanted.as_slice())
    })
}

/// Everything a pipeline run needs besides the data itself.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub registry: SourceRegistry,
    pub policy: Policy,
}

impl AnalysisConfig {
    pub fn with_registry(registry: SourceRegistry) -> Self {
        Self {
            registry,
            policy: Policy::default(),
        }
    }

    pub fn load(registry_path: Option<&Path>) -> Result<Self> {
        match registry_path {
            Some(path) => Ok(Self::with_registry(SourceRegistry::load(path)?)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_declares_sources_in_order() {
        let registry = SourceRegistry::default();
        assert_eq!(registry.names(), vec!["newrelic", "moogsoft", "servicenow"]);
        assert!(registry.validate().is_ok());
        let servicenow = registry.get("servicenow").unwrap();
        assert_eq!(servicenow.mappings.get("number").map(String::as_str), Some("id"));
    }

    #[test]
    fn registry_yaml_round_trips_and_normalizes_keys() {
        let yaml = r#"
sources:
  - name: pagerduty
    signature: ["Incident Number", "Escalation Policy"]
    mappings:
      "Incident Number": id
      "Created On": created_time
"#;
        let registry: SourceRegistry = serde_yaml::from_str(yaml).unwrap();
        let registry = registry.normalized();
        let source = registry.get("pagerduty").unwrap();
        assert_eq!(source.signature, vec!["incident_number", "escalation_policy"]);
        assert_eq!(
            source.mappings.get("created_on").map(String::as_str),
            Some("created_time")
        );
        assert!(source.expected_fields.is_empty());
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut registry = SourceRegistry::default();
        registry.sources.push(registry.sources[0].clone());
        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn high_severity_uses_leading_token() {
        let policy = Policy::default();
        assert!(policy.is_high_severity("1 - Critical"));
        assert!(policy.is_high_severity("P2"));
        assert!(policy.is_high_severity("High"));
        assert!(!policy.is_high_severity("3 - Moderate"));
        assert!(!policy.is_high_severity("highest-ish"));
        assert!(!policy.is_high_severity(""));
    }

    #[test]
    fn timestamp_names_match_whole_tokens_or_suffixes() {
        let policy = Policy::default();
        for name in [
            "created_time",
            "sys_created_on",
            "opened_at",
            "first_event_time",
            "Resolved",
            "createdTime",
            "timestamp",
        ] {
            assert!(policy.is_timestamp_name(name), "{name}");
        }
        for name in ["sys_updated_by", "update_count", "account_name", "lifetime"] {
            assert!(!policy.is_timestamp_name(name), "{name}");
        }
    }

    #[test]
    fn numeric_names_match_whole_tokens() {
        let policy = Policy::default();
        for name in ["duration", "duration_seconds", "time_to_resolve", "MTTR", "alert_count"] {
            assert!(policy.is_numeric_name(name), "{name}");
        }
        for name in ["account_name", "account_id", "discount_code", "created_time"] {
            assert!(!policy.is_numeric_name(name), "{name}");
        }
    }
}
