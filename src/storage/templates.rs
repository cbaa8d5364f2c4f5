//! Template persistence
//!
//! The full template list is serialized as one JSON array under a single
//! key. Mutations build the next list, write it, and only then replace the
//! in-memory copy, so a failed write leaves both sides unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{KeyValueStore, StoreError};
use crate::config::StorageConfig;
use crate::region::Region;
use crate::validation::{validate_regions, validate_template_name, ValidationError};

/// A saved questionnaire layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Base image as a data URL
    #[serde(default)]
    pub base_image_data: String,
    pub regions: Vec<Region>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new template
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub name: String,
    pub base_image_data: String,
    pub regions: Vec<Region>,
}

/// Partial template update; `None` fields are left alone
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub base_image_data: Option<String>,
    pub regions: Option<Vec<Region>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Saved templates are corrupted: {0}")]
    Corrupted(String),
    #[error("Failed to read templates: {0}")]
    ReadFailed(String),
    #[error("Failed to save templates: {0}")]
    SaveFailed(String),
    #[error("Template limit reached ({max})")]
    LimitReached { max: usize },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Template list backed by a key-value store
pub struct TemplateRepository<S: KeyValueStore> {
    store: S,
    key: String,
    max_templates: usize,
    templates: Vec<Template>,
    last_error: Option<StorageError>,
}

impl<S: KeyValueStore> TemplateRepository<S> {
    /// Create a repository and load whatever the store holds. Load failures
    /// leave an empty list and are reported through [`Self::last_error`].
    pub fn new(store: S, config: &StorageConfig) -> Self {
        let mut repo = Self {
            store,
            key: config.template_key.clone(),
            max_templates: config.max_templates,
            templates: Vec::new(),
            last_error: None,
        };
        if let Err(e) = repo.load() {
            warn!("Starting with no templates: {}", e);
        }
        repo
    }

    /// Re-read the template list from the store
    pub fn load(&mut self) -> Result<&[Template], StorageError> {
        self.templates.clear();
        self.last_error = None;

        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No saved templates under '{}'", self.key);
                return Ok(self.templates.as_slice());
            }
            Err(e) => return Err(self.record(StorageError::ReadFailed(e.to_string()))),
        };

        match serde_json::from_str::<Vec<Template>>(&raw) {
            Ok(templates) => {
                info!("Loaded {} templates", templates.len());
                self.templates = templates;
                Ok(self.templates.as_slice())
            }
            Err(e) => Err(self.record(StorageError::Corrupted(e.to_string()))),
        }
    }

    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Case-insensitive lookup by trimmed name
    pub fn find_by_name(&self, name: &str) -> Option<&Template> {
        let wanted = name.trim().to_lowercase();
        self.templates
            .iter()
            .find(|t| t.name.trim().to_lowercase() == wanted)
    }

    /// Lookup by id, falling back to name
    pub fn resolve(&self, id_or_name: &str) -> Option<&Template> {
        self.get(id_or_name).or_else(|| self.find_by_name(id_or_name))
    }

    /// Most recent load or save failure, cleared by the next success
    pub fn last_error(&self) -> Option<&StorageError> {
        self.last_error.as_ref()
    }

    /// True when the stored blob could not be parsed on the last load
    pub fn is_corrupted(&self) -> bool {
        matches!(self.last_error, Some(StorageError::Corrupted(_)))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn create(&mut self, new: NewTemplate) -> Result<Template, StorageError> {
        validate_template_name(&new.name)?;
        validate_regions(&new.regions)?;

        if self.templates.len() >= self.max_templates {
            return Err(StorageError::LimitReached {
                max: self.max_templates,
            });
        }

        let now = Utc::now();
        let template = Template {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            base_image_data: new.base_image_data,
            regions: new.regions,
            created_at: now,
            updated_at: now,
        };

        let mut next = self.templates.clone();
        next.push(template.clone());
        self.commit(next)?;

        info!("Created template '{}' ({})", template.name, template.id);
        Ok(template)
    }

    /// Apply an update. Unknown ids are a no-op returning `Ok(false)`.
    pub fn update(&mut self, id: &str, update: TemplateUpdate) -> Result<bool, StorageError> {
        let Some(idx) = self.templates.iter().position(|t| t.id == id) else {
            debug!("Update of unknown template {}", id);
            return Ok(false);
        };

        if let Some(name) = &update.name {
            validate_template_name(name)?;
        }
        if let Some(regions) = &update.regions {
            validate_regions(regions)?;
        }

        let mut next = self.templates.clone();
        let template = &mut next[idx];
        if let Some(name) = update.name {
            template.name = name.trim().to_string();
        }
        if let Some(data) = update.base_image_data {
            template.base_image_data = data;
        }
        if let Some(regions) = update.regions {
            template.regions = regions;
        }
        template.updated_at = Utc::now().max(template.created_at);

        self.commit(next)?;
        Ok(true)
    }

    /// Delete a template. Unknown ids are a no-op returning `Ok(false)`.
    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        if self.get(id).is_none() {
            return Ok(false);
        }

        let next: Vec<Template> = self.templates.iter().filter(|t| t.id != id).cloned().collect();
        self.commit(next)?;
        info!("Deleted template {}", id);
        Ok(true)
    }

    fn commit(&mut self, next: Vec<Template>) -> Result<(), StorageError> {
        let json = serde_json::to_string(&next)
            .map_err(|e| self.record(StorageError::SaveFailed(e.to_string())))?;

        if let Err(e) = self.store.set(&self.key, &json) {
            let message = match e {
                StoreError::QuotaExceeded => "storage quota exceeded".to_string(),
                other => other.to_string(),
            };
            return Err(self.record(StorageError::SaveFailed(message)));
        }

        self.templates = next;
        self.last_error = None;
        Ok(())
    }

    fn record(&mut self, error: StorageError) -> StorageError {
        warn!("{}", error);
        self.last_error = Some(error.clone());
        error
    }
}
