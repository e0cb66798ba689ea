//! File-backed candidate discovery.
//!
//! A manifest declares the candidate units and, optionally, a static
//! environment (classes, properties, pre-existing beans, exclusions) and
//! engine options. JSON and TOML are accepted, chosen by file extension.
//!
//! ```toml
//! [environment]
//! classes = ["javax.sql.DataSource"]
//! exclude = ["LegacyAutoConfiguration"]
//!
//! [environment.properties]
//! "feature.enabled" = "yes"
//!
//! [[units]]
//! id = "DataSourceAutoConfiguration"
//! conditions = [{ type = "class_present", class_name = "javax.sql.DataSource" }]
//! contributes = [{ name = "dataSource", kind = "DataSource" }]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateRegistry, CandidateSource, ConfigurationUnit};
use crate::engine::{ResolutionOptions, ResolutionRequest};
use crate::environment::{Environment, MapPropertySource, StaticClassPath};
use crate::error::{AutoConfigError, Result};
use crate::snapshot::BeanContribution;

/// Static environment declared alongside the units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestEnvironment {
    pub classes: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub beans: Vec<BeanContribution>,
    pub exclude: Vec<String>,
}

/// A parsed discovery manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub units: Vec<ConfigurationUnit>,
    #[serde(default)]
    pub environment: ManifestEnvironment,
    #[serde(default)]
    pub options: ResolutionOptions,
}

/// On-disk manifest formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// Infer from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            other => Err(AutoConfigError::Manifest(format!(
                "unsupported manifest extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

impl Manifest {
    pub fn parse(content: &str, format: ManifestFormat) -> Result<Self> {
        let manifest = match format {
            ManifestFormat::Json => serde_json::from_str(content)?,
            ManifestFormat::Toml => toml::from_str(content)?,
        };
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let format = ManifestFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let manifest = Self::parse(&content, format)?;
        tracing::debug!(
            path = %path.display(),
            units = manifest.units.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Register the declared units.
    pub fn registry(&self) -> Result<CandidateRegistry> {
        CandidateRegistry::new(self.units.clone())
    }

    /// Build the declared static environment.
    pub fn environment(&self) -> Environment {
        Environment::new(
            StaticClassPath::new(self.environment.classes.iter().cloned()),
            MapPropertySource::from_map("manifest", self.environment.properties.clone()),
        )
    }

    /// Initial beans and exclusions as a run request.
    pub fn request(&self) -> ResolutionRequest {
        ResolutionRequest {
            initial_beans: self.environment.beans.clone(),
            exclusions: self.environment.exclude.iter().cloned().collect(),
        }
    }
}

impl CandidateSource for Manifest {
    fn load_candidates(&self) -> Result<Vec<ConfigurationUnit>> {
        Ok(self.units.clone())
    }
}

/// A manifest read from disk each time candidates are loaded.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CandidateSource for ManifestFile {
    fn load_candidates(&self) -> Result<Vec<ConfigurationUnit>> {
        Ok(Manifest::load(&self.path)?.units)
    }
}
