//! EVOware generic worklist (`.gwl`) commands and the in-memory worklist buffer.
//!
//! Every command is validated and encoded when it is pushed, so a [`Worklist`] only
//! ever holds lines the robot can parse. Nothing touches the disk until
//! [`Worklist::save`], which writes the whole buffer atomically.

use crate::core::models::plate::Plate;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const LINE_ENDING: &str = "\r\n";

const FIELD_SEPARATOR: char = ';';
const PRECISION_TOLERANCE: f64 = 1e-6;

/// True if `text` can be placed inside a worklist field unchanged.
pub fn is_protocol_text(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != FIELD_SEPARATOR)
}

#[derive(Debug, Error)]
pub enum WorklistError {
    #[error("Cannot encode '{command}' command: {reason}")]
    Encoding {
        command: &'static str,
        reason: String,
    },

    #[error("Failed to write worklist '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Fixed-precision rendering of volumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeFormat {
    decimals: u8,
}

impl VolumeFormat {
    pub fn new(decimals: u8) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Renders `volume` with exactly the configured number of decimals.
    ///
    /// Volumes that would need rounding are refused: a worklist must move exactly the
    /// volume that was asked for.
    pub fn format(&self, volume: f64) -> Result<String, String> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(format!("volume {volume} is not a non-negative number"));
        }
        let scaled = volume * 10f64.powi(i32::from(self.decimals));
        if (scaled - scaled.round()).abs() > PRECISION_TOLERANCE {
            return Err(format!(
                "volume {volume} cannot be written with {} decimal(s)",
                self.decimals
            ));
        }
        Ok(format!("{:.*}", usize::from(self.decimals), volume))
    }
}

/// How a command names a rack on the worktable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RackRef {
    pub label: String,
    pub id: String,
    pub rack_type: String,
}

impl RackRef {
    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn by_barcode(id: impl Into<String>, rack_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rack_type: rack_type.into(),
            ..Default::default()
        }
    }

    fn check(&self, command: &'static str) -> Result<(), WorklistError> {
        if self.label.is_empty() && (self.id.is_empty() || self.rack_type.is_empty()) {
            return Err(WorklistError::Encoding {
                command,
                reason: "a rack needs either a label or both an ID and a rack type".to_string(),
            });
        }
        for field in [&self.label, &self.id, &self.rack_type] {
            check_text(command, field)?;
        }
        Ok(())
    }
}

impl From<&Plate> for RackRef {
    fn from(plate: &Plate) -> Self {
        match plate.barcode() {
            Some(barcode) => Self::by_barcode(barcode, plate.rack_type()),
            None => Self::by_label(plate.id()),
        }
    }
}

/// Parameters shared by aspirate and dispense commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipetting {
    pub rack: RackRef,
    /// 1-based well number in the rack's well ordering.
    pub position: usize,
    pub tube_id: String,
    pub volume: f64,
    pub liquid_class: Option<String>,
    pub tip_mask: Option<u8>,
}

impl Pipetting {
    pub fn new(rack: RackRef, position: usize, volume: f64) -> Self {
        Self {
            rack,
            position,
            tube_id: String::new(),
            volume,
            liquid_class: None,
            tip_mask: None,
        }
    }

    fn encode(&self, code: &'static str, volumes: &VolumeFormat) -> Result<String, WorklistError> {
        self.rack.check(code)?;
        check_position(code, self.position)?;
        check_text(code, &self.tube_id)?;
        let liquid_class = self.liquid_class.as_deref().unwrap_or_default();
        check_text(code, liquid_class)?;
        if self.tip_mask == Some(0) {
            return Err(encoding(code, "tip mask must select at least one tip"));
        }
        let volume = volumes
            .format(self.volume)
            .map_err(|reason| encoding(code, &reason))?;
        let tip_mask = self.tip_mask.map(|m| m.to_string()).unwrap_or_default();

        Ok(format!(
            "{code};{};{};{};{};{};{};{};{};",
            self.rack.label,
            self.rack.id,
            self.rack.rack_type,
            self.position,
            self.tube_id,
            volume,
            liquid_class,
            tip_mask
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// A reagent distribution (`R;`) command, executed by the robot's own scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ReagentDistribution {
    pub source: RackRef,
    pub source_start: usize,
    pub source_end: usize,
    pub destination: RackRef,
    pub destination_start: usize,
    pub destination_end: usize,
    pub volume: f64,
    pub liquid_class: Option<String>,
    pub diti_reuses: usize,
    pub multi_dispense: usize,
    pub direction: Direction,
    pub excluded_wells: Vec<usize>,
}

impl ReagentDistribution {
    fn encode(&self, volumes: &VolumeFormat) -> Result<String, WorklistError> {
        const CODE: &str = "R";
        self.source.check(CODE)?;
        self.destination.check(CODE)?;
        for position in [
            self.source_start,
            self.source_end,
            self.destination_start,
            self.destination_end,
        ] {
            check_position(CODE, position)?;
        }
        if self.source_start > self.source_end || self.destination_start > self.destination_end {
            return Err(encoding(CODE, "well range ends before it starts"));
        }
        if self.diti_reuses == 0 || self.multi_dispense == 0 {
            return Err(encoding(CODE, "tip reuse and multi-dispense counts start at 1"));
        }
        let liquid_class = self.liquid_class.as_deref().unwrap_or_default();
        check_text(CODE, liquid_class)?;
        let volume = volumes
            .format(self.volume)
            .map_err(|reason| encoding(CODE, &reason))?;
        let direction = match self.direction {
            Direction::LeftToRight => 0,
            Direction::RightToLeft => 1,
        };
        let excluded: Vec<String> = self.excluded_wells.iter().map(|w| w.to_string()).collect();

        Ok(format!(
            "R;{};{};{};{};{};{};{};{};{};{};{};{};{};{};{};{}",
            self.source.label,
            self.source.id,
            self.source.rack_type,
            self.source_start,
            self.source_end,
            self.destination.label,
            self.destination.id,
            self.destination.rack_type,
            self.destination_start,
            self.destination_end,
            volume,
            liquid_class,
            self.diti_reuses,
            self.multi_dispense,
            direction,
            excluded.join(";")
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Aspirate(Pipetting),
    Dispense(Pipetting),
    /// Tip wash or disposable tip replacement.
    Wash,
    Flush,
    /// Forces execution of all preceding lines.
    Break,
    Comment(String),
    Distribute(ReagentDistribution),
}

impl Command {
    pub fn code(&self) -> &'static str {
        match self {
            Command::Aspirate(_) => "A",
            Command::Dispense(_) => "D",
            Command::Wash => "W",
            Command::Flush => "F",
            Command::Break => "B",
            Command::Comment(_) => "C",
            Command::Distribute(_) => "R",
        }
    }

    /// Encodes the command as a single worklist line without line terminator.
    pub fn encode(&self, volumes: &VolumeFormat) -> Result<String, WorklistError> {
        match self {
            Command::Aspirate(p) => p.encode("A", volumes),
            Command::Dispense(p) => p.encode("D", volumes),
            Command::Wash => Ok("W;".to_string()),
            Command::Flush => Ok("F;".to_string()),
            Command::Break => Ok("B;".to_string()),
            Command::Comment(text) => {
                if !text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
                    return Err(encoding("C", "comments must be single-line ASCII text"));
                }
                Ok(format!("C;{text}"))
            }
            Command::Distribute(r) => r.encode(volumes),
        }
    }
}

/// Tallies of the commands held by a worklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCounts {
    pub aspirates: usize,
    pub dispenses: usize,
    pub washes: usize,
    pub flushes: usize,
    pub breaks: usize,
    pub comments: usize,
    pub distributions: usize,
}

/// An ordered, fully validated buffer of worklist lines.
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    lines: Vec<String>,
    volumes: VolumeFormat,
    counts: CommandCounts,
}

impl Worklist {
    pub fn new(volumes: VolumeFormat) -> Self {
        Self {
            volumes,
            ..Default::default()
        }
    }

    /// Validates, encodes and appends `command`.
    ///
    /// # Errors
    ///
    /// Returns [`WorklistError::Encoding`] if the command cannot be expressed in the
    /// worklist grammar; the buffer is unchanged in that case.
    pub fn push(&mut self, command: Command) -> Result<(), WorklistError> {
        let line = command.encode(&self.volumes)?;
        let counter = match command {
            Command::Aspirate(_) => &mut self.counts.aspirates,
            Command::Dispense(_) => &mut self.counts.dispenses,
            Command::Wash => &mut self.counts.washes,
            Command::Flush => &mut self.counts.flushes,
            Command::Break => &mut self.counts.breaks,
            Command::Comment(_) => &mut self.counts.comments,
            Command::Distribute(_) => &mut self.counts.distributions,
        };
        *counter += 1;
        self.lines.push(line);
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn counts(&self) -> CommandCounts {
        self.counts
    }

    pub fn volume_format(&self) -> VolumeFormat {
        self.volumes
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        for line in &self.lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(LINE_ENDING.as_bytes())?;
        }
        writer.flush()
    }

    /// Writes the worklist to `path` and returns the number of lines written.
    ///
    /// The content goes to a temporary file next to `path` first and is renamed into
    /// place once complete, so readers see either the previous file or the full new
    /// one. Consumes the worklist: a buffer is flushed exactly once.
    pub fn save(self, path: &Path) -> Result<usize, WorklistError> {
        let io_error = |source: io::Error| WorklistError::Io {
            path: path.display().to_string(),
            source,
        };
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(directory).map_err(io_error)?;
        self.write_to(temp.as_file_mut()).map_err(io_error)?;
        temp.as_file().sync_all().map_err(io_error)?;
        temp.persist(path).map_err(|e| io_error(e.error))?;
        Ok(self.lines.len())
    }
}

impl fmt::Display for Worklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            write!(f, "{line}{LINE_ENDING}")?;
        }
        Ok(())
    }
}

fn encoding(command: &'static str, reason: &str) -> WorklistError {
    WorklistError::Encoding {
        command,
        reason: reason.to_string(),
    }
}

fn check_text(command: &'static str, text: &str) -> Result<(), WorklistError> {
    if is_protocol_text(text) {
        Ok(())
    } else {
        Err(encoding(
            command,
            &format!("field '{text}' contains a separator, line break or non-ASCII character"),
        ))
    }
}

fn check_position(command: &'static str, position: usize) -> Result<(), WorklistError> {
    if position == 0 {
        Err(encoding(command, "well positions start at 1"))
    } else {
        Ok(())
    }
}
