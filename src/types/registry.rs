//! Type registry: entity name -> descriptor
//!
//! Populated once at process start, either programmatically or from JSON
//! descriptor files, then frozen behind an `Arc` with `into_shared`.
//!
//! A descriptor file holds either one entity descriptor object or an array
//! of them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::descriptor::EntityDescriptor;
use super::errors::{DescriptorError, DescriptorResult};

/// Registry of all entity descriptors known to the process
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    entities: HashMap<String, EntityDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one descriptor.
    ///
    /// Registered descriptors are immutable: registering a name twice fails.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> DescriptorResult<()> {
        descriptor
            .validate_structure()
            .map_err(DescriptorError::Invalid)?;

        if self.entities.contains_key(&descriptor.name) {
            return Err(DescriptorError::Duplicate(descriptor.name));
        }
        self.entities.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, descriptor: EntityDescriptor) -> DescriptorResult<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Loads every `*.json` file in `dir`, in file name order.
    pub fn load_dir(&mut self, dir: &Path) -> DescriptorResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| DescriptorError::Malformed {
            path: dir.display().to_string(),
            reason: format!("Failed to read directory: {}", e),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DescriptorError::Malformed {
                path: dir.display().to_string(),
                reason: format!("Failed to read directory entry: {}", e),
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            self.load_file(&path)?;
        }
        Ok(())
    }

    /// Loads one descriptor file.
    pub fn load_file(&mut self, path: &Path) -> DescriptorResult<()> {
        let malformed = |reason: String| DescriptorError::Malformed {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path)
            .map_err(|e| malformed(format!("Failed to read file: {}", e)))?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| malformed(format!("Invalid JSON: {}", e)))?;

        let descriptors = if value.is_array() {
            serde_json::from_value::<Vec<EntityDescriptor>>(value)
        } else {
            serde_json::from_value::<EntityDescriptor>(value).map(|d| vec![d])
        }
        .map_err(|e| malformed(format!("Invalid descriptor: {}", e)))?;

        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Returns the descriptor for `name`
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    /// Returns true if `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity is registered
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks cross-descriptor rules: every nested reference resolves and
    /// the references form a DAG.
    pub fn validate(&self) -> DescriptorResult<()> {
        for descriptor in self.entities.values() {
            for field in &descriptor.fields {
                if let Some(target) = field.kind.referenced_entity() {
                    if !self.entities.contains_key(target) {
                        return Err(DescriptorError::DanglingReference {
                            entity: descriptor.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }

        let mut state: HashMap<&str, Visit> = HashMap::new();
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        for name in names {
            self.visit(name, &mut state)?;
        }
        Ok(())
    }

    fn visit<'a>(&'a self, name: &'a str, state: &mut HashMap<&'a str, Visit>) -> DescriptorResult<()> {
        match state.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => return Err(DescriptorError::Cycle(name.to_string())),
            None => {}
        }
        state.insert(name, Visit::InProgress);
        if let Some(descriptor) = self.entities.get(name) {
            for field in &descriptor.fields {
                if let Some(target) = field.kind.referenced_entity() {
                    self.visit(target, state)?;
                }
            }
        }
        state.insert(name, Visit::Done);
        Ok(())
    }

    /// Validates and freezes the registry for sharing across cursors
    pub fn into_shared(self) -> DescriptorResult<Arc<Self>> {
        self.validate()?;
        Ok(Arc::new(self))
    }
}

#[derive(Clone, Copy)]
enum Visit {
    InProgress,
    Done,
}
