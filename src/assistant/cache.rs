//! Local cache of remote assistant ids, one file per persona.

use super::AssistantDefinition;
use crate::config::ReusePolicy;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of a cache file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedAssistant {
    pub id: String,
    /// Definition the assistant was created from; absent in legacy files.
    pub definition: Option<AssistantDefinition>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CachedAssistant {
    /// Whether the cached id may serve `definition` under `policy`.
    pub fn is_reusable(&self, definition: &AssistantDefinition, policy: ReusePolicy) -> bool {
        match policy {
            ReusePolicy::Reuse => true,
            ReusePolicy::RecreateOnChange => self.definition.as_ref() == Some(definition),
        }
    }
}

/// Directory of cached assistant ids.
#[derive(Debug, Clone)]
pub struct AssistantCache {
    dir: PathBuf,
}

impl AssistantCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for a persona.
    pub fn path_for(&self, definition: &AssistantDefinition) -> PathBuf {
        self.dir
            .join(format!("assistant_id_{}.json", definition.slug()))
    }

    /// Path of a plain-text id file written by older versions.
    fn legacy_path_for(&self, definition: &AssistantDefinition) -> PathBuf {
        self.dir
            .join(format!("assistant_id_{}.txt", definition.slug()))
    }

    /// Load the cached entry for a persona, if any.
    pub fn load(&self, definition: &AssistantDefinition) -> Result<Option<CachedAssistant>> {
        let path = self.path_for(definition);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let cached: CachedAssistant = serde_json::from_str(&content)?;
            debug!("Loaded cached assistant {} from {:?}", cached.id, path);
            return Ok(Some(cached));
        }

        let legacy = self.legacy_path_for(definition);
        if legacy.exists() {
            let id = std::fs::read_to_string(&legacy)?.trim().to_string();
            if !id.is_empty() {
                debug!("Loaded legacy assistant id {} from {:?}", id, legacy);
                return Ok(Some(CachedAssistant {
                    id,
                    definition: None,
                    created_at: None,
                }));
            }
        }

        Ok(None)
    }

    /// Persist the id of a newly created assistant.
    pub fn store(&self, definition: &AssistantDefinition, id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(definition);
        let entry = CachedAssistant {
            id: id.to_string(),
            definition: Some(definition.clone()),
            created_at: Some(Utc::now()),
        };
        std::fs::write(&path, serde_json::to_string_pretty(&entry)?)?;
        info!("Cached assistant {} at {:?}", id, path);
        Ok(path)
    }
}
