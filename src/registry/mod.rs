//! Document schemas and field-mapping configuration.
//!
//! Loaded once at startup and shared read-only behind an `Arc`.

pub mod mapping;
pub mod schema;

use std::path::Path;

use thiserror::Error;

pub use mapping::{
    AutoAcceptSettings, ConflictStrategy, DocumentMapping, FieldMapping, FieldTarget, MappingConfig,
    TransformKind,
};
pub use schema::{schema_for, DocumentSchema, FieldKind, FieldSpec};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed mapping file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid mapping configuration: {0}")]
    Invalid(String),
}

/// Immutable configuration bundle consulted by the pipeline.
#[derive(Debug, Clone)]
pub struct Registry {
    pub mapping: MappingConfig,
}

impl Registry {
    pub fn new(mapping: MappingConfig) -> Result<Self, RegistryError> {
        mapping.validate()?;
        Ok(Self { mapping })
    }

    pub fn builtin() -> Self {
        Self {
            mapping: MappingConfig::builtin(),
        }
    }

    /// Load from `path` when given, otherwise fall back to the built-in mapping.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(p) => Self::new(MappingConfig::load(p)?),
            None => Ok(Self::builtin()),
        }
    }

    pub fn version(&self) -> u32 {
        self.mapping.version
    }
}
