//! Read-only registry of model handles, built once per (re)load.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::ModelDescriptor;
use crate::error::{GatewayError, LoadError};
use crate::loader::{LoadAttempt, ModelLoader};
use crate::models::Model;

pub struct RegistryEntry {
    pub descriptor: ModelDescriptor,
    pub path: PathBuf,
    pub file_exists: bool,
    pub handle: Option<Arc<dyn Model>>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub attempts: Vec<LoadAttempt>,
}

impl RegistryEntry {
    pub fn loaded(descriptor: ModelDescriptor, path: PathBuf, handle: Arc<dyn Model>) -> Self {
        Self {
            descriptor,
            path,
            file_exists: true,
            handle: Some(handle),
            loaded_at: Some(Utc::now()),
            attempts: Vec::new(),
        }
    }

    pub fn absent(descriptor: ModelDescriptor, path: PathBuf, file_exists: bool) -> Self {
        Self {
            descriptor,
            path,
            file_exists,
            handle: None,
            loaded_at: None,
            attempts: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegistryStatus {
    pub models_loaded: BTreeMap<String, bool>,
    pub files_exist: BTreeMap<String, bool>,
    pub models_dir: String,
}

pub struct ModelRegistry {
    models_dir: PathBuf,
    entries: Vec<RegistryEntry>,
}

impl ModelRegistry {
    /// Loads every descriptor from `models_dir`. Missing or undecodable
    /// files leave the entry without a handle; nothing here fails.
    pub fn initialize(
        models_dir: impl Into<PathBuf>,
        descriptors: &[ModelDescriptor],
        loader: &ModelLoader,
    ) -> Self {
        let models_dir = models_dir.into();
        let mut entries = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let path = models_dir.join(&descriptor.file_name);

            if !path.exists() {
                warn!(
                    model = %descriptor.name,
                    error = %LoadError::FileMissing(path.clone()),
                    "Model file not found, skipping"
                );
                entries.push(RegistryEntry::absent(descriptor.clone(), path, false));
                continue;
            }

            let report = loader.load(&descriptor.name, &path, descriptor.format);
            if !report.is_loaded() {
                warn!(model = %descriptor.name, path = %path.display(), "Failed to load model");
            }
            entries.push(RegistryEntry {
                descriptor: descriptor.clone(),
                path,
                file_exists: true,
                loaded_at: report.handle.as_ref().map(|_| Utc::now()),
                handle: report.handle,
                attempts: report.attempts,
            });
        }

        let registry = Self {
            models_dir,
            entries,
        };
        info!(
            loaded = registry.loaded_count(),
            total = registry.entries.len(),
            models_dir = %registry.models_dir.display(),
            "Model registry initialized"
        );
        registry
    }

    /// Builds a registry from already constructed entries.
    pub fn from_entries(models_dir: impl Into<PathBuf>, entries: Vec<RegistryEntry>) -> Self {
        Self {
            models_dir: models_dir.into(),
            entries,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    pub fn by_route(&self, route: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.descriptor.route == route)
    }

    pub fn handle(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.get(name).and_then(|e| e.handle.clone())
    }

    /// Looks up a route and its handle, failing the way a request should.
    pub fn resolve(&self, route: &str) -> Result<(&RegistryEntry, Arc<dyn Model>), GatewayError> {
        let entry = self
            .by_route(route)
            .ok_or_else(|| GatewayError::UnknownModel(route.to_string()))?;
        let handle = entry
            .handle
            .clone()
            .ok_or_else(|| GatewayError::ModelUnavailable(entry.descriptor.name.clone()))?;
        Ok((entry, handle))
    }

    pub fn loaded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_loaded()).count()
    }

    pub fn status(&self) -> RegistryStatus {
        let models_loaded = self
            .entries
            .iter()
            .map(|e| (e.descriptor.name.clone(), e.is_loaded()))
            .collect();
        let files_exist = self
            .entries
            .iter()
            .map(|e| (e.descriptor.name.clone(), e.file_exists))
            .collect();
        RegistryStatus {
            models_loaded,
            files_exist,
            models_dir: self.models_dir.display().to_string(),
        }
    }
}
