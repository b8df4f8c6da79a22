//! Script registry - loads and serves role catalogs
//!
//! Scripts are TOML files. A built-in sample ships embedded; extra scripts
//! are discovered from a scripts directory at startup. Per-file load errors
//! are collected for diagnostics, never fatal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Script, ScriptRules, Team, TeamCounts};

/// Embedded default script.
const BUILTIN_SCRIPT: &str = include_str!("../scripts/trouble_brewing.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid script: {0}")]
    Invalid(String),
}

/// On-disk script schema. Kept separate from the runtime `Script` so file
/// layout can evolve without touching the engine types.
#[derive(Debug, Deserialize)]
struct ScriptFile {
    script: ScriptFileMeta,
    /// Team counts keyed by player count (TOML table keys are strings)
    #[serde(default)]
    distribution: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default)]
    roles: Vec<crate::models::ScriptRole>,
}

#[derive(Debug, Deserialize)]
struct ScriptFileMeta {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    rules: ScriptRules,
}

/// Central store of loaded scripts
#[derive(Debug)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<Script>>,
    default_id: String,
    /// Load errors for diagnostics
    load_errors: Vec<(PathBuf, CatalogError)>,
}

impl ScriptRegistry {
    /// Registry holding only the embedded default script.
    pub fn builtin() -> Result<Self, CatalogError> {
        let script = parse_script(BUILTIN_SCRIPT)?;
        let default_id = script.id.clone();
        let mut scripts = HashMap::new();
        scripts.insert(default_id.clone(), Arc::new(script));
        Ok(Self {
            scripts,
            default_id,
            load_errors: Vec::new(),
        })
    }

    /// Load every `*.toml` in `dir` on top of what is already registered.
    /// Unreadable or invalid files are logged and recorded, not fatal.
    pub fn scan_dir(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot read scripts directory");
                self.load_errors.push((dir.to_path_buf(), e.into()));
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            match load_script_file(&path) {
                Ok(script) => {
                    tracing::info!(script_id = %script.id, path = %path.display(), "Registered script");
                    self.scripts.insert(script.id.clone(), Arc::new(script));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load script");
                    self.load_errors.push((path, e));
                }
            }
        }
    }

    pub fn get(&self, script_id: &str) -> Option<Arc<Script>> {
        self.scripts.get(script_id).cloned()
    }

    /// Resolve an optional script id, falling back to the default script.
    pub fn resolve(&self, script_id: Option<&str>) -> Option<Arc<Script>> {
        match script_id {
            Some(id) => self.get(id),
            None => Some(self.default_script()),
        }
    }

    pub fn default_script(&self) -> Arc<Script> {
        // The builtin is inserted at construction and never removed.
        self.scripts[&self.default_id].clone()
    }

    pub fn script_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.scripts.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Load errors for diagnostics
    pub fn load_errors(&self) -> &[(PathBuf, CatalogError)] {
        &self.load_errors
    }
}

fn load_script_file(path: &Path) -> Result<Script, CatalogError> {
    let text = std::fs::read_to_string(path)?;
    parse_script(&text)
}

/// Parse and validate one script document.
pub fn parse_script(text: &str) -> Result<Script, CatalogError> {
    let file: ScriptFile = toml::from_str(text)?;

    let mut team_distribution: BTreeMap<usize, TeamCounts> = BTreeMap::new();
    for (key, counts) in file.distribution {
        let players: usize = key.parse().map_err(|_| {
            CatalogError::Invalid(format!("distribution key {key:?} is not a player count"))
        })?;
        let mut team_counts = TeamCounts::new();
        for (team, count) in counts {
            let team: Team = team.parse().map_err(CatalogError::Invalid)?;
            team_counts.insert(team, count);
        }
        team_distribution.insert(players, team_counts);
    }

    let mut seen = HashSet::new();
    for role in &file.roles {
        if role.id.trim().is_empty() {
            return Err(CatalogError::Invalid("role with empty id".into()));
        }
        if !seen.insert(role.id.as_str()) {
            return Err(CatalogError::Invalid(format!("duplicate role id {}", role.id)));
        }
        for slot in &role.attachment_slots {
            if slot.count == 0 {
                return Err(CatalogError::Invalid(format!(
                    "role {}: slot {} has count 0",
                    role.id, slot.id
                )));
            }
        }
    }
    if file.roles.is_empty() {
        return Err(CatalogError::Invalid(format!(
            "script {} has no roles",
            file.script.id
        )));
    }

    Ok(Script {
        id: file.script.id,
        name: file.script.name,
        version: file.script.version,
        roles: file.roles,
        team_distribution,
        rules: file.script.rules,
    })
}
