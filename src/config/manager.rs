//! Configuration Manager
//!
//! Single owner of the `RbiConfig` graph. Readers take an `Arc` snapshot
//! that never changes underneath them; writers build a candidate, validate
//! it as a whole and swap it in. An invalid candidate is never applied.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::validation::{
    validate_engineering_ranges, validate_sections, validate_unknown_json_keys,
    ValidationWarning, SECTION_NAMES,
};
use super::{ConfigError, RbiConfig};
use crate::risk_matrix::MatrixPreset;

/// Composite configuration health, 0-100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationHealth {
    pub score: u8,
    pub error_count: usize,
    pub warning_count: usize,
    pub recommendations: Vec<String>,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Sections present in the document and merged into the configuration
    pub applied_sections: Vec<String>,
    /// Unknown keys that were ignored
    pub warnings: Vec<ValidationWarning>,
}

/// Points deducted per validation error.
const ERROR_PENALTY: usize = 10;
/// Points deducted per engineering warning.
const WARNING_PENALTY: usize = 3;

pub struct ConfigurationManager {
    current: ArcSwap<RbiConfig>,
    version: AtomicU64,
    /// Serializes writers so read-modify-write updates never interleave
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::from_valid(RbiConfig::default())
    }
}

impl ConfigurationManager {
    /// Take ownership of a configuration after validating it.
    pub fn new(config: RbiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Standard search order (`RBI_CONFIG`, `./rbi_config.toml`, defaults).
    pub fn load() -> Self {
        Self::from_valid(RbiConfig::load())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::from_valid(RbiConfig::load_from_file(path)?))
    }

    fn from_valid(config: RbiConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            version: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Consistent read-only view of the current configuration.
    pub fn snapshot(&self) -> Arc<RbiConfig> {
        self.current.load_full()
    }

    /// Incremented on every successful change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Errors per section. Never fails; valid sections map to an empty list.
    pub fn validate_complete_configuration(&self) -> BTreeMap<String, Vec<String>> {
        validate_sections(&self.snapshot())
            .into_iter()
            .map(|(section, errors)| (section.to_string(), errors))
            .collect()
    }

    pub fn is_configuration_valid(&self) -> bool {
        self.validate_complete_configuration()
            .values()
            .all(Vec::is_empty)
    }

    /// 100 minus penalties for errors and engineering warnings, with a
    /// recommendation for each.
    pub fn get_configuration_health_score(&self) -> ConfigurationHealth {
        let config = self.snapshot();
        let mut recommendations = Vec::new();

        let sections = validate_sections(&config);
        let error_count: usize = sections.values().map(Vec::len).sum();
        for (section, errors) in &sections {
            for e in errors {
                recommendations.push(format!("Fix [{section}]: {e}"));
            }
        }

        let warnings = validate_engineering_ranges(&config);
        for w in &warnings {
            recommendations.push(format!("Review {}: {}", w.field, w.message));
        }

        if !config.learning.enabled {
            recommendations.push(
                "Enable learning to compare predicted intervals with inspection outcomes"
                    .to_string(),
            );
        }

        let penalty = error_count * ERROR_PENALTY + warnings.len() * WARNING_PENALTY;
        let score = 100usize.saturating_sub(penalty);

        ConfigurationHealth {
            score: u8::try_from(score).unwrap_or(0),
            error_count,
            warning_count: warnings.len(),
            recommendations,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Apply a mutation to a copy of the configuration. The copy replaces
    /// the current configuration only if every section validates.
    pub fn update<F>(&self, mutate: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut RbiConfig),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = RbiConfig::clone(&self.current.load());
        mutate(&mut candidate);
        self.commit(candidate)
    }

    pub fn reset_to_defaults(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.current.store(Arc::new(RbiConfig::default()));
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        info!(version, "RBI configuration reset to defaults");
    }

    /// Switch the risk matrix to a named preset
    /// (`conservative`, `balanced`, `aggressive`).
    pub fn apply_configuration_template(&self, name: &str) -> Result<(), ConfigError> {
        let preset: MatrixPreset = name
            .parse()
            .map_err(|_| ConfigError::UnknownTemplate(name.to_string()))?;
        self.update(|config| config.risk_matrix.apply_preset(preset))?;
        info!(template = %preset, "Applied configuration template");
        Ok(())
    }

    /// Caller must hold `write_lock`.
    fn commit(&self, candidate: RbiConfig) -> Result<(), ConfigError> {
        if let Err(e) = candidate.validate() {
            warn!(error = %e, "Rejected invalid RBI configuration");
            return Err(e);
        }
        self.current.store(Arc::new(candidate));
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "RBI configuration updated");
        Ok(())
    }

    // ========================================================================
    // Export / Import
    // ========================================================================

    /// Whole configuration as a nested JSON value.
    pub fn export_configuration(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(&*self.snapshot()).map_err(ConfigError::Json)
    }

    /// One top-level section as a JSON value.
    pub fn export_section(&self, section: &str) -> Result<serde_json::Value, ConfigError> {
        let mut exported = self.export_configuration()?;
        exported
            .get_mut(section)
            .map(serde_json::Value::take)
            .ok_or_else(|| ConfigError::UnknownSection(section.to_string()))
    }

    /// Merge a (possibly partial) JSON document into the configuration.
    ///
    /// Sections absent from the document are left untouched; objects merge
    /// key by key, everything else replaces. Unknown keys are skipped with
    /// a warning. The merged result must validate or nothing is applied.
    pub fn import_configuration(
        &self,
        document: &serde_json::Value,
    ) -> Result<ImportSummary, ConfigError> {
        let Some(sections) = document.as_object() else {
            return Err(ConfigError::Validation(vec![
                "imported configuration must be a JSON object".to_string(),
            ]));
        };

        let warnings = validate_unknown_json_keys(document);
        for w in &warnings {
            warn!("{}", w);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut merged =
            serde_json::to_value(&*self.current.load_full()).map_err(ConfigError::Json)?;

        let mut applied_sections = Vec::new();
        for (section, value) in sections {
            if !SECTION_NAMES.contains(&section.as_str()) {
                continue;
            }
            if let Some(target) = merged.get_mut(section) {
                merge_json(target, value);
                applied_sections.push(section.clone());
            }
        }

        let candidate: RbiConfig = serde_json::from_value(merged).map_err(ConfigError::Json)?;
        self.commit(candidate)?;

        info!(sections = ?applied_sections, "Imported RBI configuration");
        Ok(ImportSummary {
            applied_sections,
            warnings,
        })
    }

    /// Write the configuration to disk: TOML for `.toml`, JSON otherwise.
    pub fn export_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if is_toml_path(path) {
            return self.snapshot().save_to_file(path);
        }
        let contents =
            serde_json::to_string_pretty(&*self.snapshot()).map_err(ConfigError::Json)?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "RBI configuration exported");
        Ok(())
    }

    /// Import a TOML or JSON file with the same merge rules as
    /// `import_configuration`.
    pub fn import_from_file(&self, path: &Path) -> Result<ImportSummary, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let document: serde_json::Value = if is_toml_path(path) {
            let value: toml::Value = toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(Some(path.to_path_buf()), e))?;
            serde_json::to_value(value).map_err(ConfigError::Json)?
        } else {
            serde_json::from_str(&contents).map_err(ConfigError::Json)?
        };

        self.import_configuration(&document)
    }
}

fn is_toml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

/// Deep-merge `patch` into `base`. Objects merge recursively; any other
/// value replaces.
fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
