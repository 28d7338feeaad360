use crate::core::io::keywords::{Dialect, HeaderKeywords};
use crate::core::models::sample::OverfillPolicy;
use crate::core::registry::formats::FormatCatalog;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Format used for plates created on the fly and for plates without a format.
pub const DEFAULT_FORMAT: &str = "96";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Order in which transfer operations are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationOrder {
    /// Sheet row order.
    #[default]
    AsConverted,
    /// Every source in first-use order, each followed by its destinations in
    /// registration order.
    BySource,
}

/// A plate placed on the worktable before any sheet is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlateDefinition {
    pub id: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub rack_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    /// Layout to convert; asked for interactively when absent.
    pub path: Option<PathBuf>,
    /// Workbook sheet name; the first sheet when absent.
    pub sheet: Option<String>,
    pub dialect: Dialect,
    /// Sample lists registered before the layout is converted.
    pub source_lists: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorklistOptions {
    pub volume_decimals: u8,
    pub wash_after_dispense: bool,
    /// Largest volume one tip holds; multi-dispense groups are split to fit.
    pub max_tip_volume: Option<f64>,
    pub flush_between_chunks: bool,
    /// Writes a `C;` comment line before every aspirate group.
    pub annotate: bool,
    pub ordering: OperationOrder,
}

impl Default for WorklistOptions {
    fn default() -> Self {
        Self {
            volume_decimals: 0,
            wash_after_dispense: true,
            max_tip_volume: None,
            flush_between_chunks: true,
            annotate: false,
            ordering: OperationOrder::AsConverted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub input: InputConfig,
    /// Worklist destination; asked for interactively when absent.
    pub output: Option<PathBuf>,
    pub keywords: HeaderKeywords,
    pub formats: FormatCatalog,
    pub default_format: String,
    pub plates: Vec<PlateDefinition>,
    /// Registers unknown plates with the default format instead of failing.
    pub auto_create_plates: bool,
    /// Lets source identifiers without `#sub-id` match a unique sub-identified sample.
    pub relaxed_ids: bool,
    pub overfill: OverfillPolicy,
    pub default_volume: Option<f64>,
    pub destination_plate: Option<String>,
    pub worklist: WorklistOptions,
}

#[derive(Default)]
pub struct ConversionConfigBuilder {
    input_path: Option<PathBuf>,
    sheet: Option<String>,
    dialect: Option<Dialect>,
    source_lists: Vec<PathBuf>,
    output_path: Option<PathBuf>,
    keywords: Option<HeaderKeywords>,
    formats: Option<FormatCatalog>,
    default_format: Option<String>,
    plates: Vec<PlateDefinition>,
    auto_create_plates: bool,
    relaxed_ids: bool,
    overfill: OverfillPolicy,
    default_volume: Option<f64>,
    destination_plate: Option<String>,
    worklist: WorklistOptions,
}

impl ConversionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_path(mut self, path: PathBuf) -> Self {
        self.input_path = Some(path);
        self
    }
    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.sheet = Some(name.into());
        self
    }
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }
    pub fn source_list(mut self, path: PathBuf) -> Self {
        self.source_lists.push(path);
        self
    }
    pub fn output_path(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }
    pub fn keywords(mut self, keywords: HeaderKeywords) -> Self {
        self.keywords = Some(keywords);
        self
    }
    pub fn formats(mut self, formats: FormatCatalog) -> Self {
        self.formats = Some(formats);
        self
    }
    pub fn default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = Some(format.into());
        self
    }
    pub fn plate(mut self, plate: PlateDefinition) -> Self {
        self.plates.push(plate);
        self
    }
    pub fn auto_create_plates(mut self, enabled: bool) -> Self {
        self.auto_create_plates = enabled;
        self
    }
    pub fn relaxed_ids(mut self, enabled: bool) -> Self {
        self.relaxed_ids = enabled;
        self
    }
    pub fn overfill(mut self, policy: OverfillPolicy) -> Self {
        self.overfill = policy;
        self
    }
    pub fn default_volume(mut self, volume: f64) -> Self {
        self.default_volume = Some(volume);
        self
    }
    pub fn destination_plate(mut self, plate: impl Into<String>) -> Self {
        self.destination_plate = Some(plate.into());
        self
    }
    pub fn worklist_options(mut self, options: WorklistOptions) -> Self {
        self.worklist = options;
        self
    }

    /// Assembles the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingParameter`] without a dialect and
    /// [`ConfigError::InvalidParameter`] when a value cannot work: a sample-list
    /// dialect for the layout, an unknown default format, a keyword table that does
    /// not cover the dialect, or a negative volume.
    pub fn build(self) -> Result<ConversionConfig, ConfigError> {
        let dialect = self.dialect.ok_or(ConfigError::MissingParameter("dialect"))?;
        if dialect == Dialect::Samples {
            return Err(ConfigError::InvalidParameter {
                name: "dialect",
                reason: "a sample list describes no transfers".to_string(),
            });
        }

        let keywords = self.keywords.unwrap_or_default();
        keywords
            .validate_for(dialect)
            .map_err(|e| invalid("header-keywords", e))?;
        if !self.source_lists.is_empty() {
            keywords
                .validate_for(Dialect::Samples)
                .map_err(|e| invalid("header-keywords", e))?;
        }

        let formats = self.formats.unwrap_or_else(FormatCatalog::standard);
        let default_format = self
            .default_format
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        formats
            .resolve(&default_format)
            .map_err(|e| invalid("default-format", e))?;

        if let Some(volume) = self.default_volume {
            check_volume("default-volume", volume)?;
        }
        if let Some(volume) = self.worklist.max_tip_volume {
            check_volume("max-tip-volume", volume)?;
            if volume == 0.0 {
                return Err(invalid("max-tip-volume", "must be greater than zero"));
            }
        }

        Ok(ConversionConfig {
            input: InputConfig {
                path: self.input_path,
                sheet: self.sheet,
                dialect,
                source_lists: self.source_lists,
            },
            output: self.output_path,
            keywords,
            formats,
            default_format,
            plates: self.plates,
            auto_create_plates: self.auto_create_plates,
            relaxed_ids: self.relaxed_ids,
            overfill: self.overfill,
            default_volume: self.default_volume,
            destination_plate: self.destination_plate,
            worklist: self.worklist,
        })
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

fn check_volume(name: &'static str, volume: f64) -> Result<(), ConfigError> {
    if volume.is_finite() && volume >= 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("{volume} is not a non-negative volume")))
    }
}
