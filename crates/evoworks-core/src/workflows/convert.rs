use crate::core::dialogs::{FileChooser, FileRequest, NoticeKind, Notifier};
use crate::core::io::keywords::Dialect;
use crate::core::io::reader::{ParsedSheet, SheetReader};
use crate::core::io::sheet::Sheet;
use crate::core::io::worklist::CommandCounts;
use crate::core::registry::plates::PlateIndex;
use crate::core::registry::samples::SampleIndex;
use crate::engine::config::{ConfigError, ConversionConfig};
use crate::engine::converters::distribution::DistributionConverter;
use crate::engine::converters::picking::PickingConverter;
use crate::engine::converters::sample::SampleConverter;
use crate::engine::encoding::{SampleWorklist, order_operations};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Spreadsheet extensions offered when asking for a layout.
pub const INPUT_EXTENSIONS: [&str; 5] = ["xls", "xlsx", "ods", "csv", "tsv"];
pub const WORKLIST_EXTENSION: &str = "gwl";

/// The registries of one conversion run.
///
/// Plates and samples may be registered up front; use [`Session::reset`] or a fresh
/// session before converting another layout.
#[derive(Debug, Default)]
pub struct Session {
    plates: PlateIndex,
    samples: SampleIndex,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plates(&self) -> &PlateIndex {
        &self.plates
    }

    pub fn plates_mut(&mut self) -> &mut PlateIndex {
        &mut self.plates
    }

    pub fn samples(&self) -> &SampleIndex {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut SampleIndex {
        &mut self.samples
    }

    pub fn reset(&mut self) {
        self.plates.reset();
        self.samples.reset();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub output: PathBuf,
    /// Operations converted, including zero-volume ones.
    pub operations: usize,
    /// Zero-volume operations, which write no commands.
    pub skipped: usize,
    pub lines: usize,
    pub counts: CommandCounts,
    pub warnings: Vec<String>,
}

#[instrument(skip_all, name = "conversion_workflow")]
pub fn run(
    session: &mut Session,
    config: &ConversionConfig,
    input: &Path,
    output: &Path,
    notifier: &dyn Notifier,
    reporter: &ProgressReporter,
) -> Result<ConversionSummary, EngineError> {
    // === Phase 1: Read and validate the layout ===
    reporter.report(Progress::PhaseStart {
        name: "Reading Layout",
    });
    info!(
        input = %input.display(),
        dialect = %config.input.dialect,
        "Reading layout."
    );
    let layout = read_sheet(input, config.input.sheet.as_deref(), config.input.dialect, config)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Register plates and source samples ===
    reporter.report(Progress::PhaseStart {
        name: "Registering Plates and Samples",
    });
    let mut converter =
        SampleConverter::new(&mut session.plates, &mut session.samples, config, notifier)?;
    reporter.track(&config.plates, |plate| converter.register_plate(plate))?;
    for path in &config.input.source_lists {
        info!(path = %path.display(), "Loading source sample list.");
        let list = read_sheet(path, None, Dialect::Samples, config)?;
        converter.convert(&list)?;
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Convert records to transfer operations ===
    reporter.report(Progress::PhaseStart { name: "Converting" });
    let (operations, converter) = match config.input.dialect {
        Dialect::Picking => {
            let mut picking = PickingConverter::new(converter);
            let operations = picking.convert(&layout)?;
            (operations, picking.into_inner())
        }
        Dialect::Distribution => {
            let mut distribution = DistributionConverter::new(converter);
            let operations = distribution.convert(&layout)?;
            (operations, distribution.into_inner())
        }
        Dialect::Samples => {
            return Err(ConfigError::InvalidParameter {
                name: "dialect",
                reason: "a sample list describes no transfers".to_string(),
            }
            .into());
        }
    };
    let warnings = converter.into_warnings();
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Encode commands in memory ===
    reporter.report(Progress::PhaseStart { name: "Encoding" });
    let operations = order_operations(operations, config.worklist.ordering, &session.samples);
    let mut encoder = SampleWorklist::new(&session.plates, &session.samples, &config.worklist);
    encoder.encode(&operations)?;
    let worklist = encoder.into_worklist();
    reporter.report(Progress::PhaseFinish);

    // === Phase 5: Save atomically ===
    reporter.report(Progress::PhaseStart {
        name: "Saving Worklist",
    });
    let counts = worklist.counts();
    let lines = worklist.save(output)?;
    reporter.report(Progress::PhaseFinish);

    let summary = ConversionSummary {
        output: output.to_path_buf(),
        operations: operations.len(),
        skipped: operations.iter().filter(|o| o.is_empty()).count(),
        lines,
        counts,
        warnings,
    };
    info!(
        output = %output.display(),
        lines = summary.lines,
        transfers = summary.counts.dispenses,
        "Worklist written."
    );
    reporter.report(Progress::Message(format!(
        "Wrote {} line(s) to {}",
        summary.lines,
        output.display()
    )));
    Ok(summary)
}

/// Like [`run`], asking the operator for whichever of the input and output paths the
/// configuration leaves open. Failures are also shown to the operator.
pub fn run_interactive<D: FileChooser + Notifier>(
    session: &mut Session,
    config: &ConversionConfig,
    dialogs: &D,
    reporter: &ProgressReporter,
) -> Result<ConversionSummary, EngineError> {
    let result = choose_paths(config, dialogs)
        .and_then(|(input, output)| run(session, config, &input, &output, dialogs, reporter));
    if let Err(e) = &result {
        if !matches!(e, EngineError::Cancelled(_)) {
            error!("Conversion failed: {e}");
            dialogs.notify(&e.to_string(), NoticeKind::Error);
        }
    }
    result
}

fn choose_paths(
    config: &ConversionConfig,
    chooser: &dyn FileChooser,
) -> Result<(PathBuf, PathBuf), EngineError> {
    let input = match &config.input.path {
        Some(path) => path.clone(),
        None => chooser
            .choose_file(&FileRequest::open("Select layout spreadsheet", &INPUT_EXTENSIONS))?
            .ok_or_else(|| EngineError::Cancelled("no layout selected".into()))?,
    };
    let output = match &config.output {
        Some(path) => path.clone(),
        None => chooser
            .choose_file(&FileRequest::save("Save worklist as", &[WORKLIST_EXTENSION]))?
            .ok_or_else(|| EngineError::Cancelled("no worklist destination selected".into()))?,
    };
    Ok((input, output))
}

fn read_sheet(
    path: &Path,
    sheet: Option<&str>,
    dialect: Dialect,
    config: &ConversionConfig,
) -> Result<ParsedSheet, EngineError> {
    let sheet = Sheet::load(path, sheet)?;
    let parsed = SheetReader::new(&config.keywords, dialect)
        .with_default_volume(config.default_volume)
        .with_destination_plate(config.destination_plate.clone())
        .read(&sheet)?;
    Ok(parsed)
}
