use crate::cli::ConvertArgs;
use crate::error::{CliError, Result};
use evoworks::core::io::keywords::{Dialect, Field, HeaderKeywords};
use evoworks::core::models::format::PlateFormat;
use evoworks::core::models::sample::OverfillPolicy;
use evoworks::core::registry::formats::{FormatCatalog, FormatDefinition};
use evoworks::engine::config::{
    self as core_config, ConversionConfigBuilder, OperationOrder, PlateDefinition,
    WorklistOptions,
};
use serde::Deserialize;
use serde::de::value::{
    BoolDeserializer, Error as ValueError, F64Deserializer, I64Deserializer, StrDeserializer,
};
use serde::de::{DeserializeOwned, IntoDeserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialInputConfig {
    path: Option<PathBuf>,
    sheet: Option<String>,
    source_lists: Option<Vec<PathBuf>>,
    default_volume: Option<f64>,
    destination_plate: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialWorklistConfig {
    output: Option<PathBuf>,
    volume_decimals: Option<u8>,
    wash_after_dispense: Option<bool>,
    max_tip_volume: Option<f64>,
    flush_between_chunks: Option<bool>,
    annotate: Option<bool>,
    ordering: Option<OperationOrder>,
}

/// The configuration file as written, every value optional.
///
/// Relative paths are resolved against the directory of the file they were read from.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialConversionConfig {
    default_format: Option<String>,
    auto_create_plates: Option<bool>,
    relaxed_ids: Option<bool>,
    overfill: Option<OverfillPolicy>,
    input: Option<PartialInputConfig>,
    worklist: Option<PartialWorklistConfig>,
    /// Extra header text to field mappings, layered over the built-in table.
    header_keywords: Option<BTreeMap<String, Field>>,
    #[serde(default)]
    formats: Vec<FormatDefinition>,
    #[serde(default)]
    plates: Vec<PlateDefinition>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl PartialConversionConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from an empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Format catalog of a run: the standard microplates plus the file's custom formats.
    pub fn format_catalog(&self) -> Result<FormatCatalog> {
        let mut catalog = FormatCatalog::standard();
        for definition in &self.formats {
            let id = definition.id.clone();
            let format = PlateFormat::try_from(definition.clone())
                .map_err(|e| CliError::Config(format!("Invalid format '{}': {}", id, e)))?;
            catalog.insert(format);
        }
        Ok(catalog)
    }

    pub fn merge_with_cli(
        mut self,
        args: &ConvertArgs,
        dialect: Dialect,
    ) -> Result<core_config::ConversionConfig> {
        self.apply_set_values(&args.set_values)?;

        let formats = self.format_catalog()?;
        let input = self.input.take().unwrap_or_default();
        let worklist = self.worklist.take().unwrap_or_default();
        let base_dir = self.base_dir.take();
        let resolve = |path: PathBuf| match &base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        };

        let mut builder = ConversionConfigBuilder::new()
            .dialect(dialect)
            .formats(formats)
            .auto_create_plates(args.auto_create_plates || self.auto_create_plates.unwrap_or(false))
            .relaxed_ids(args.relaxed_ids || self.relaxed_ids.unwrap_or(false))
            .overfill(Self::merge_overfill(args.allow_overfill, self.overfill));

        if let Some(path) = args.input.clone().or(input.path.map(&resolve)) {
            builder = builder.input_path(path);
        }
        if let Some(path) = args.output.clone().or(worklist.output.clone().map(&resolve)) {
            builder = builder.output_path(path);
        }
        if let Some(sheet) = args.sheet.clone().or(input.sheet) {
            builder = builder.sheet(sheet);
        }

        let sources = if args.sources.is_empty() {
            input
                .source_lists
                .unwrap_or_default()
                .into_iter()
                .map(&resolve)
                .collect()
        } else {
            args.sources.clone()
        };
        for source in sources {
            builder = builder.source_list(source);
        }

        if let Some(format) = args.default_format.clone().or(self.default_format.take()) {
            builder = builder.default_format(format);
        }
        if let Some(volume) = args.default_volume.or(input.default_volume) {
            builder = builder.default_volume(volume);
        }
        if let Some(plate) = args.destination_plate.clone().or(input.destination_plate) {
            builder = builder.destination_plate(plate);
        }
        if let Some(overrides) = self.header_keywords.take() {
            let keywords = HeaderKeywords::default()
                .with_overrides(overrides.iter().map(|(header, &field)| (header.as_str(), field)));
            builder = builder.keywords(keywords);
        }
        for plate in std::mem::take(&mut self.plates) {
            builder = builder.plate(plate);
        }

        builder = builder.worklist_options(Self::merge_worklist(args, worklist));

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_overfill(cli_allow: bool, file_val: Option<OverfillPolicy>) -> OverfillPolicy {
        if cli_allow {
            OverfillPolicy::Warn
        } else {
            file_val.unwrap_or_default()
        }
    }

    fn merge_worklist(args: &ConvertArgs, file: PartialWorklistConfig) -> WorklistOptions {
        let defaults = WorklistOptions::default();
        WorklistOptions {
            volume_decimals: args
                .decimals
                .or(file.volume_decimals)
                .unwrap_or(defaults.volume_decimals),
            wash_after_dispense: if args.no_wash {
                false
            } else {
                file.wash_after_dispense
                    .unwrap_or(defaults.wash_after_dispense)
            },
            max_tip_volume: args
                .max_tip_volume
                .or(file.max_tip_volume)
                .or(defaults.max_tip_volume),
            flush_between_chunks: file
                .flush_between_chunks
                .unwrap_or(defaults.flush_between_chunks),
            annotate: args.annotate || file.annotate.unwrap_or(defaults.annotate),
            ordering: if args.by_source {
                OperationOrder::BySource
            } else {
                file.ordering.unwrap_or(defaults.ordering)
            },
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            if let Some(header) = key.strip_prefix("header-keywords.") {
                let field = parse_value(key, value_str)?;
                self.header_keywords
                    .get_or_insert_with(Default::default)
                    .insert(header.to_string(), field);
                continue;
            }

            match key {
                "default-format" => self.default_format = Some(value_str.to_string()),
                "auto-create-plates" => {
                    self.auto_create_plates = Some(parse_value(key, value_str)?)
                }
                "relaxed-ids" => self.relaxed_ids = Some(parse_value(key, value_str)?),
                "overfill" => self.overfill = Some(parse_value(key, value_str)?),
                "input.sheet" => {
                    self.input.get_or_insert_with(Default::default).sheet =
                        Some(value_str.to_string())
                }
                "input.default-volume" => {
                    self.input.get_or_insert_with(Default::default).default_volume =
                        Some(parse_value(key, value_str)?)
                }
                "input.destination-plate" => {
                    self.input
                        .get_or_insert_with(Default::default)
                        .destination_plate = Some(value_str.to_string())
                }
                "worklist.volume-decimals" => {
                    self.worklist
                        .get_or_insert_with(Default::default)
                        .volume_decimals = Some(parse_value(key, value_str)?)
                }
                "worklist.wash-after-dispense" => {
                    self.worklist
                        .get_or_insert_with(Default::default)
                        .wash_after_dispense = Some(parse_value(key, value_str)?)
                }
                "worklist.max-tip-volume" => {
                    self.worklist
                        .get_or_insert_with(Default::default)
                        .max_tip_volume = Some(parse_value(key, value_str)?)
                }
                "worklist.flush-between-chunks" => {
                    self.worklist
                        .get_or_insert_with(Default::default)
                        .flush_between_chunks = Some(parse_value(key, value_str)?)
                }
                "worklist.annotate" => {
                    self.worklist.get_or_insert_with(Default::default).annotate =
                        Some(parse_value(key, value_str)?)
                }
                "worklist.ordering" => {
                    self.worklist.get_or_insert_with(Default::default).ordering =
                        Some(parse_value(key, value_str)?)
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parses a `--set` value the way the same key is read from the file.
fn parse_value<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    if let Ok(number) = value.parse::<i64>() {
        let de: I64Deserializer<ValueError> = number.into_deserializer();
        if let Ok(parsed) = T::deserialize(de) {
            return Ok(parsed);
        }
    }
    if let Ok(number) = value.parse::<f64>() {
        let de: F64Deserializer<ValueError> = number.into_deserializer();
        if let Ok(parsed) = T::deserialize(de) {
            return Ok(parsed);
        }
    }
    if let Ok(flag) = value.parse::<bool>() {
        let de: BoolDeserializer<ValueError> = flag.into_deserializer();
        if let Ok(parsed) = T::deserialize(de) {
            return Ok(parsed);
        }
    }
    let de: StrDeserializer<'_, ValueError> = value.into_deserializer();
    T::deserialize(de)
        .map_err(|e| CliError::Config(format!("Invalid value for {}: {} ({})", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use evoworks::core::io::keywords::Field;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn write_config_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn pick_args(extra: &[&str]) -> ConvertArgs {
        let mut args = vec!["evoworks", "pick"];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Pick(args) => args,
            _ => panic!("Expected 'pick' subcommand"),
        }
    }

    const FULL_CONFIG: &str = r#"
default-format = "384"
overfill = "warn"

[input]
path = "layout.csv"
source-lists = ["sources.csv"]
default-volume = 15.0

[worklist]
output = "out/run.gwl"
volume-decimals = 1
ordering = "by-source"

[header-keywords]
"Well ID" = "position"

[[formats]]
id = "tubes"
rows = 4
columns = 6
ordering = "row-major"

[[plates]]
id = "S1"
format = "tubes"
barcode = "BC7"
"#;

    #[test]
    fn file_values_are_loaded_and_paths_resolved_against_the_file() {
        let dir = tempdir().unwrap();
        let path = write_config_file(&dir, "evoworks.toml", FULL_CONFIG);

        let config = PartialConversionConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&pick_args(&[]), Dialect::Picking)
            .unwrap();

        assert_eq!(config.input.path, Some(dir.path().join("layout.csv")));
        assert_eq!(config.input.source_lists, vec![dir.path().join("sources.csv")]);
        assert_eq!(config.output, Some(dir.path().join("out/run.gwl")));
        assert_eq!(config.default_format, "384");
        assert_eq!(config.default_volume, Some(15.0));
        assert_eq!(config.overfill, OverfillPolicy::Warn);
        assert_eq!(config.worklist.volume_decimals, 1);
        assert_eq!(config.worklist.ordering, OperationOrder::BySource);
        assert!(config.worklist.wash_after_dispense);
        assert_eq!(config.keywords.field_for("well id"), Some(Field::Position));
        assert_eq!(config.formats.resolve("tubes").unwrap().well_count(), 24);
        assert_eq!(config.plates.len(), 1);
        assert_eq!(config.plates[0].barcode.as_deref(), Some("BC7"));
    }

    #[test]
    fn cli_args_override_file_values() {
        let dir = tempdir().unwrap();
        let path = write_config_file(&dir, "evoworks.toml", FULL_CONFIG);
        let args = pick_args(&[
            "-i", "other.csv", "--decimals", "2", "--no-wash", "--default-format", "96",
            "--source", "mine.csv",
        ]);

        let config = PartialConversionConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args, Dialect::Picking)
            .unwrap();

        assert_eq!(config.input.path, Some(PathBuf::from("other.csv")));
        assert_eq!(config.input.source_lists, vec![PathBuf::from("mine.csv")]);
        assert_eq!(config.worklist.volume_decimals, 2);
        assert!(!config.worklist.wash_after_dispense);
        assert_eq!(config.default_format, "96");
    }

    #[test]
    fn set_value_overrides_file_values() {
        let dir = tempdir().unwrap();
        let path = write_config_file(&dir, "evoworks.toml", FULL_CONFIG);
        let args = pick_args(&[
            "-S", "worklist.volume-decimals=3",
            "-S", "worklist.ordering=as-converted",
            "-S", "overfill=reject",
            "-S", "worklist.max-tip-volume=150",
            "-S", "header-keywords.Vol (ul)=volume",
        ]);

        let config = PartialConversionConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args, Dialect::Picking)
            .unwrap();

        assert_eq!(config.worklist.volume_decimals, 3);
        assert_eq!(config.worklist.ordering, OperationOrder::AsConverted);
        assert_eq!(config.overfill, OverfillPolicy::Reject);
        assert_eq!(config.worklist.max_tip_volume, Some(150.0));
        assert_eq!(config.keywords.field_for("vol (ul)"), Some(Field::Volume));
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let config = PartialConversionConfig::load(None)
            .unwrap()
            .merge_with_cli(&pick_args(&[]), Dialect::Distribution)
            .unwrap();

        assert_eq!(config.input.dialect, Dialect::Distribution);
        assert!(config.input.path.is_none());
        assert!(config.output.is_none());
        assert_eq!(config.default_format, core_config::DEFAULT_FORMAT);
        assert_eq!(config.worklist, WorklistOptions::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config_file(&dir, "bad.toml", "[worklist]\nwash = false\n");
        let result = PartialConversionConfig::from_file(&path);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));

        let mut partial = PartialConversionConfig::default();
        let result = partial.apply_set_values(&["worklist.speed=3".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));
        let result = partial.apply_set_values(&["overfill".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));
        let result = partial.apply_set_values(&["overfill=sometimes".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_values_surface_as_config_errors() {
        let dir = tempdir().unwrap();
        let path = write_config_file(
            &dir,
            "formats.toml",
            "[[formats]]\nid = \"empty\"\nrows = 0\ncolumns = 4\n",
        );
        let result = PartialConversionConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&pick_args(&[]), Dialect::Picking);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("empty")));

        let result = PartialConversionConfig::default()
            .merge_with_cli(&pick_args(&["--default-format", "trough"]), Dialect::Picking);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
