//! Config validation: unknown-key detection with Levenshtein suggestions,
//! per-section error collection and engineering sanity checks.
//!
//! Two-pass parse approach: first deserialize raw TOML (or an imported JSON
//! document) into a generic value, walk the key tree, compare against known
//! field names, and emit warnings with "did you mean?" suggestions. Then
//! proceed with normal serde deserialization. Warnings never break existing
//! configs.

use std::collections::{BTreeMap, HashSet};

use super::defaults::{MATRIX_INTERVAL_RANGE, RECOMMENDED_THICKNESS_POINTS};
use super::RbiConfig;
use crate::scoring::validate_tables;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

/// Top-level section names, in export order.
pub const SECTION_NAMES: [&str; 8] = [
    "scoring_tables",
    "risk_matrix",
    "level_requirements",
    "weighting_factors",
    "fallback",
    "learning",
    "level1",
    "psv",
];

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for RbiConfig.
///
/// Maintained manually to match the struct hierarchy. Keys below an
/// operator-defined map (table names, equipment types) are covered by
/// `open_key_prefixes` instead.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [scoring_tables]
        "scoring_tables",
        "scoring_tables.pof",
        "scoring_tables.cof",
        "scoring_tables.cof.safety",
        "scoring_tables.cof.environmental",
        "scoring_tables.cof.economic",
        "scoring_tables.cof.business",
        // [risk_matrix]
        "risk_matrix",
        "risk_matrix.cells",
        "risk_matrix.inspection_intervals",
        "risk_matrix.inspection_intervals.low",
        "risk_matrix.inspection_intervals.medium",
        "risk_matrix.inspection_intervals.high",
        "risk_matrix.inspection_intervals.very_high",
        "risk_matrix.fallback_safety_factors",
        // [level_requirements]
        "level_requirements",
        "level_requirements.level2",
        "level_requirements.level2.requires_corrosion_rate",
        "level_requirements.level2.min_thickness_measurements",
        "level_requirements.level2.min_inspection_records",
        "level_requirements.level3",
        "level_requirements.level3.requires_corrosion_rate",
        "level_requirements.level3.min_thickness_measurements",
        "level_requirements.level3.min_inspection_records",
        // [weighting_factors]
        "weighting_factors",
        "weighting_factors.pof",
        "weighting_factors.cof_dimensions",
        "weighting_factors.cof_dimensions.safety",
        "weighting_factors.cof_dimensions.environmental",
        "weighting_factors.cof_dimensions.economic",
        "weighting_factors.cof_dimensions.business",
        "weighting_factors.cof_parameters",
        "weighting_factors.cof_parameters.safety",
        "weighting_factors.cof_parameters.environmental",
        "weighting_factors.cof_parameters.economic",
        "weighting_factors.cof_parameters.business",
        // [fallback]
        "fallback",
        "fallback.enabled",
        "fallback.emergency_interval_months",
        "fallback.confidence_penalty",
        // [learning]
        "learning",
        "learning.enabled",
        "learning.accuracy_threshold",
        "learning.min_feedback_samples",
        // [level1]
        "level1",
        "level1.base_intervals",
        "level1.default_base_interval_months",
        "level1.service_modifiers",
        "level1.criticality_modifiers",
        "level1.min_interval_months",
        "level1.max_interval_months",
        // [psv]
        "psv",
        "psv.pop_test_table",
        "psv.pop_test_table.parameter_name",
        "psv.pop_test_table.rules",
        "psv.pop_test_table.default_score",
        "psv.pop_test_table.weight",
        "psv.pop_test_table.description",
        "psv.leak_test_table",
        "psv.leak_test_table.parameter_name",
        "psv.leak_test_table.rules",
        "psv.leak_test_table.default_score",
        "psv.leak_test_table.weight",
        "psv.leak_test_table.description",
        "psv.pop_weight",
        "psv.leak_weight",
    ];
    keys.iter().copied().collect()
}

/// Prefixes under which any key is accepted (operator-named entries).
pub fn open_key_prefixes() -> &'static [&'static str] {
    &[
        "scoring_tables.pof.",
        "scoring_tables.cof.safety.",
        "scoring_tables.cof.environmental.",
        "scoring_tables.cof.economic.",
        "scoring_tables.cof.business.",
        "risk_matrix.fallback_safety_factors.",
        "weighting_factors.pof.",
        "weighting_factors.cof_parameters.safety.",
        "weighting_factors.cof_parameters.environmental.",
        "weighting_factors.cof_parameters.economic.",
        "weighting_factors.cof_parameters.business.",
        "level1.base_intervals.",
        "level1.service_modifiers.",
        "level1.criticality_modifiers.",
    ]
}

fn is_known_key(key: &str, known: &HashSet<&str>) -> bool {
    known.contains(key) || open_key_prefixes().iter().any(|p| key.starts_with(p))
}

// ============================================================================
// Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = join_key(prefix, k);
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Same as `walk_toml_keys` for an imported JSON document.
pub fn walk_json_keys(value: &serde_json::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(object) = value.as_object() {
        for (k, v) in object {
            let path = join_key(prefix, k);
            keys.push(path.clone());
            if v.is_object() {
                keys.extend(walk_json_keys(v, &path));
            }
        }
    }
    keys
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties resolve alphabetically so suggestions are stable
        let better = match best {
            None => true,
            Some((best_key, best_dist)) => dist < best_dist || (dist == best_dist && k < best_key),
        };
        if better {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry points)
// ============================================================================

fn unknown_key_warnings(found: Vec<String>) -> Vec<ValidationWarning> {
    let known = known_config_keys();
    found
        .into_iter()
        .filter(|key| !is_known_key(key, &known))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys. Existing configs always continue to
/// work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };
    unknown_key_warnings(walk_toml_keys(&value, ""))
}

/// Unknown-key warnings for an imported JSON document.
pub fn validate_unknown_json_keys(document: &serde_json::Value) -> Vec<ValidationWarning> {
    unknown_key_warnings(walk_json_keys(document, ""))
}

// ============================================================================
// Section Validation
// ============================================================================

/// Errors per section. Every section is present, with an empty list when valid.
pub fn validate_sections(config: &RbiConfig) -> BTreeMap<&'static str, Vec<String>> {
    let mut sections = BTreeMap::new();
    sections.insert("scoring_tables", validate_tables(&config.scoring_tables));
    sections.insert("risk_matrix", config.risk_matrix.validate());
    sections.insert("level_requirements", config.level_requirements.validate());
    sections.insert("weighting_factors", config.weighting_factors.validate());
    sections.insert("fallback", config.fallback.validate());
    sections.insert("learning", config.learning.validate());
    sections.insert("level1", config.level1.validate());
    sections.insert("psv", config.psv.validate());
    sections
}

// ============================================================================
// Engineering Sanity Checks
// ============================================================================

/// Suspicious-but-legal settings. These never block a configuration; they
/// feed the health score recommendations.
pub fn validate_engineering_ranges(config: &RbiConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    let very_high = config.risk_matrix.inspection_intervals.very_high;
    if config.fallback.emergency_interval_months > very_high {
        warn(
            "fallback.emergency_interval_months",
            format!(
                "emergency interval ({} months) is longer than the very-high-risk interval ({} months)",
                config.fallback.emergency_interval_months, very_high
            ),
        );
    }

    for (scenario, factor) in &config.risk_matrix.fallback_safety_factors {
        if *factor < 1.0 {
            warn(
                "risk_matrix.fallback_safety_factors",
                format!("safety factor {scenario} = {factor} lengthens intervals on fallback"),
            );
        }
    }

    if config.fallback.enabled && config.fallback.confidence_penalty == 0.0 {
        warn(
            "fallback.confidence_penalty",
            "fallback results carry no confidence penalty".to_string(),
        );
    }

    let l3 = config.level_requirements.level3.min_thickness_measurements;
    if l3 < RECOMMENDED_THICKNESS_POINTS {
        warn(
            "level_requirements.level3.min_thickness_measurements",
            format!(
                "Level 3 accepts {l3} thickness readings, fewer than the recommended {RECOMMENDED_THICKNESS_POINTS}"
            ),
        );
    }

    if config.level1.max_interval_months > MATRIX_INTERVAL_RANGE.1 {
        warn(
            "level1.max_interval_months",
            format!(
                "Level 1 intervals may reach {} months, above the {}-month matrix limit",
                config.level1.max_interval_months, MATRIX_INTERVAL_RANGE.1
            ),
        );
    }

    if config.learning.enabled && config.learning.min_feedback_samples < 5 {
        warn(
            "learning.min_feedback_samples",
            format!(
                "{} feedback samples is too few to judge prediction accuracy",
                config.learning.min_feedback_samples
            ),
        );
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("fallback", "fallback"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("falback", "fallback"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [risk_matrix]
            [risk_matrix.inspection_intervals]
            low = 36
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"risk_matrix".to_string()));
        assert!(keys.contains(&"risk_matrix.inspection_intervals".to_string()));
        assert!(keys.contains(&"risk_matrix.inspection_intervals.low".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[fallback]
emergency_interval_month = 6
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("fallback.emergency_interval_months")
        );
    }

    #[test]
    fn test_operator_named_entries_are_accepted() {
        let toml_str = r#"
[level1.base_intervals]
pressure_vessel = 48

[risk_matrix.fallback_safety_factors]
level3_to_level1 = 1.5

[weighting_factors.pof]
corrosion_rate = 0.25
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_json_section_warns() {
        let doc = serde_json::json!({ "fallbak": { "enabled": true } });
        let warnings = validate_unknown_json_keys(&doc);
        assert!(warnings.iter().any(|w| w.field == "fallbak"));
        assert!(warnings
            .iter()
            .any(|w| w.suggestion.as_deref() == Some("fallback")));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_known_keys_covers_all_sections() {
        let known = known_config_keys();
        for section in SECTION_NAMES {
            assert!(known.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_default_sections_all_clean() {
        let sections = validate_sections(&RbiConfig::default());
        assert_eq!(sections.len(), SECTION_NAMES.len());
        assert!(sections.values().all(Vec::is_empty), "{sections:?}");
    }

    #[test]
    fn test_defaults_produce_no_engineering_warnings() {
        let warnings = validate_engineering_ranges(&RbiConfig::default());
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_long_emergency_interval_warns() {
        let mut config = RbiConfig::default();
        config.fallback.emergency_interval_months = 48;
        let warnings = validate_engineering_ranges(&config);
        assert!(warnings
            .iter()
            .any(|w| w.field == "fallback.emergency_interval_months"));
    }
}
