use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized, Yaml};
use figment::Figment;
use kairos_errors::{KairosError, KairosResult};
use serde_json::Value;

use crate::compat;
use crate::model::KairosConfig;

/// Well-known base-config search locations, tried in order when no explicit
/// path is given (spec §4.12 "a set of well-known locations").
const WELL_KNOWN_LOCATIONS: &[&str] = &["kairos.yaml", "kairos.yml", "kairos.json", "/etc/kairos/kairos.yaml"];

/// Resolves the precedence chain: defaults → base file → profile file →
/// `KAIROS_`-prefixed env vars → CLI `--set` overrides (spec §4.12).
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    explicit_base: Option<PathBuf>,
    profile: Option<String>,
    cli_overrides: Vec<String>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_base = Some(path.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_cli_overrides(mut self, overrides: Vec<String>) -> Self {
        self.cli_overrides = overrides;
        self
    }

    fn resolve_base_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit_base {
            return Some(path.clone());
        }
        WELL_KNOWN_LOCATIONS.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn profile_path(base: &Path, profile: &str) -> PathBuf {
        let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("kairos");
        let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("yaml");
        let dir = base.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{stem}.{profile}.{ext}"))
    }

    /// Runs the full chain and returns the typed, compat-shimmed config.
    pub fn resolve(&self) -> KairosResult<KairosConfig> {
        let mut figment = Figment::new();

        if let Some(base) = self.resolve_base_path() {
            figment = merge_file(figment, &base);
            if let Some(profile) = &self.profile {
                let profile_path = Self::profile_path(&base, profile);
                if profile_path.exists() {
                    figment = merge_file(figment, &profile_path);
                }
            }
        }

        figment = figment.merge(Env::prefixed("KAIROS_").map(|key| key.as_str().replace('_', ".").into()));

        let overrides = crate::cli::parse_overrides(self.cli_overrides.iter().map(String::as_str));
        figment = figment.merge(Serialized::defaults(overrides));

        let mut merged: Value = figment
            .extract()
            .map_err(|e| KairosError::invalid_input(format!("configuration resolution failed: {e}")))?;
        compat::apply(&mut merged);

        serde_json::from_value(merged)
            .map_err(|e| KairosError::invalid_input(format!("configuration did not match the expected shape: {e}")))
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Yaml::file(path)),
    }
}
