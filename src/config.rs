//! Configuration for the type engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (master_data.toml)
//! - The XDG config directory
//! - Environment variables (MASTER_DATA__*)
//!
//! ## Example config file (master_data.toml):
//! ```toml
//! [catalog]
//! max_type_name_length = 20
//! record_id_width = 5
//! adhoc_attributes = "ignore"
//!
//! [fields]
//! primary_field_name = "Primary_ID"
//!
//! [display]
//! summary_separator = ", "
//! unknown_type_label = "Unknown"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::field::normalize_field_name;
use crate::normalizer::DisplayLayout;
use crate::schema::DEFAULT_PRIMARY_FIELD;

/// Main configuration for the type engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Settings for fields created by the engine
    #[serde(default)]
    pub fields: FieldsConfig,

    /// Grid display settings
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Catalog configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Longest accepted type name, in characters
    #[serde(default = "default_max_type_name_length")]
    pub max_type_name_length: usize,

    /// Zero padding of formatted record ids
    #[serde(default = "default_record_id_width")]
    pub record_id_width: usize,

    /// What to do with submitted attributes the type does not declare
    #[serde(default)]
    pub adhoc_attributes: AdhocAttributes,
}

/// Handling of undeclared attributes on record entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdhocAttributes {
    /// Drop them
    #[default]
    Ignore,
    /// Append optional fields to the type for them
    Evolve,
}

/// Field configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsConfig {
    /// Primary field of types created on the fly
    #[serde(default = "default_primary_field_name")]
    pub primary_field_name: String,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Separator of the summary column in mixed-type grids
    #[serde(default = "default_summary_separator")]
    pub summary_separator: String,

    /// Type label of records whose type no longer exists
    #[serde(default = "default_unknown_type_label")]
    pub unknown_type_label: String,
}

// Default value functions
fn default_max_type_name_length() -> usize {
    20
}

fn default_record_id_width() -> usize {
    5
}

fn default_primary_field_name() -> String {
    DEFAULT_PRIMARY_FIELD.to_string()
}

fn default_summary_separator() -> String {
    ", ".to_string()
}

fn default_unknown_type_label() -> String {
    "Unknown".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_type_name_length: default_max_type_name_length(),
            record_id_width: default_record_id_width(),
            adhoc_attributes: AdhocAttributes::default(),
        }
    }
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            primary_field_name: default_primary_field_name(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            summary_separator: default_summary_separator(),
            unknown_type_label: default_unknown_type_label(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "master_data.toml",
            ".master_data.toml",
            "config/master_data.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "master-data", "master-data") {
            let xdg_config = config_dir.config_dir().join("master_data.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (MASTER_DATA__CATALOG__RECORD_ID_WIDTH=6)
        builder = builder.add_source(
            Environment::with_prefix("MASTER_DATA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Settings that are well-formed but unusable
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.catalog.max_type_name_length == 0 {
            problems.push("catalog.max_type_name_length must be at least 1".to_string());
        }
        match normalize_field_name(&self.fields.primary_field_name) {
            Ok(name) if name != self.fields.primary_field_name => problems.push(format!(
                "fields.primary_field_name {:?} is not a normalized field name (try {:?})",
                self.fields.primary_field_name, name
            )),
            Ok(_) => {}
            Err(e) => problems.push(format!("fields.primary_field_name: {e}")),
        }
        problems
    }

    /// Display layout for grids
    pub fn layout(&self) -> DisplayLayout {
        DisplayLayout {
            record_id_width: self.catalog.record_id_width,
            summary_separator: self.display.summary_separator.clone(),
            unknown_type_label: self.display.unknown_type_label.clone(),
        }
    }
}
