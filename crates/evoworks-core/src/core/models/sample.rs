use super::format::Well;
use super::ids::SampleKey;
use crate::core::io::worklist::is_protocol_text;
use crate::core::registry::plates::PlateIndex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const SUB_ID_SEPARATOR: char = '#';
const VOLUME_TOLERANCE: f64 = 1e-9;

/// Which construction-time check rejected a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCheck {
    MissingIdentifier,
    UnresolvedPlate,
    InvalidPosition,
    MalformedMetadata,
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationCheck::MissingIdentifier => "missing identifier",
            ValidationCheck::UnresolvedPlate => "unresolved plate",
            ValidationCheck::InvalidPosition => "invalid position",
            ValidationCheck::MalformedMetadata => "malformed metadata",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("Sample '{sample}' failed validation ({check}): {message}")]
    Validation {
        sample: String,
        check: ValidationCheck,
        message: String,
    },

    #[error("Sample identifier '{id}' is already registered")]
    DuplicateIdentifier { id: String },

    #[error("Sample '{id}' is not registered")]
    NotFound { id: String },

    #[error("Sample identifier '{id}' is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousIdentifier { id: String, candidates: Vec<String> },

    #[error("Sample '{id}' does not match its location: {detail}")]
    IdentityMismatch { id: String, detail: String },

    #[error("Reaction '{reaction}' would receive {total} but its target volume is {target}")]
    VolumeOverflow {
        reaction: String,
        total: f64,
        target: f64,
    },

    #[error("Invalid volume {volume} for sample '{sample}'")]
    InvalidVolume { sample: String, volume: f64 },
}

/// What to do when a reaction receives more than its target volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverfillPolicy {
    #[default]
    Reject,
    Warn,
}

/// Outcome of adding a contribution to a reaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    WithinTarget,
    Overfilled { excess: f64 },
}

/// A sample identifier, optionally qualified by a sub-identifier (`"BBa001#a"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId {
    id: String,
    sub_id: Option<String>,
}

impl SampleId {
    pub fn new(id: impl Into<String>, sub_id: Option<String>) -> Self {
        let sub_id = sub_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            id: id.into().trim().to_string(),
            sub_id,
        }
    }

    /// Splits a full identifier at the first `#`.
    pub fn parse(full: &str) -> Self {
        match full.split_once(SUB_ID_SEPARATOR) {
            Some((id, sub_id)) => Self::new(id, Some(sub_id.to_string())),
            None => Self::new(full, None),
        }
    }

    pub fn main_id(&self) -> &str {
        &self.id
    }

    pub fn sub_id(&self) -> Option<&str> {
        self.sub_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_id {
            Some(sub_id) => write!(f, "{}{}{}", self.id, SUB_ID_SEPARATOR, sub_id),
            None => f.write_str(&self.id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleMetadata {
    pub concentration: Option<f64>,
    pub liquid_class: Option<String>,
    pub tip_mask: Option<u8>,
    /// Columns the header keywords did not recognise, keyed by lowercase header.
    pub extra: BTreeMap<String, String>,
}

impl SampleMetadata {
    fn check(&self) -> Result<(), String> {
        if let Some(c) = self.concentration {
            if !c.is_finite() || c < 0.0 {
                return Err(format!("concentration {c} is not a non-negative number"));
            }
        }
        if self.tip_mask == Some(0) {
            return Err("tip mask must select at least one tip".to_string());
        }
        if let Some(class) = &self.liquid_class {
            if !is_protocol_text(class) {
                return Err(format!("liquid class '{class}' contains forbidden characters"));
            }
        }
        for (key, value) in &self.extra {
            if !is_protocol_text(value) {
                return Err(format!("field '{key}' contains forbidden characters"));
            }
        }
        Ok(())
    }
}

/// Everything needed to construct a [`Sample`]; positions are still raw text.
#[derive(Debug, Clone, Default)]
pub struct SampleSpec {
    pub id: Option<SampleId>,
    pub plate: String,
    pub position: String,
    pub metadata: SampleMetadata,
}

/// A reagent at a known well of a registered plate.
#[derive(Debug, Clone)]
pub struct Sample {
    id: SampleId,
    plate: String,
    well: Well,
    metadata: SampleMetadata,
}

impl Sample {
    /// Validates `spec` against the plate index and builds the sample.
    ///
    /// Checks run in a fixed order: the plate must resolve, the position must fit the
    /// plate's format, and the metadata must be well-formed. A sample without an
    /// explicit identifier is named after its location (`"T01:A1"`).
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Validation`] naming the first failed check.
    pub fn new(spec: SampleSpec, plates: &PlateIndex) -> Result<Self, SampleError> {
        let plate_id = spec.plate.trim();
        let label = match &spec.id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}:{}", plate_id, spec.position.trim()),
        };
        let fail = |check: ValidationCheck, message: String| SampleError::Validation {
            sample: label.clone(),
            check,
            message,
        };

        if plate_id.is_empty() {
            return Err(fail(
                ValidationCheck::UnresolvedPlate,
                "no plate given".to_string(),
            ));
        }
        let plate = plates
            .resolve(plate_id)
            .map_err(|e| fail(ValidationCheck::UnresolvedPlate, e.to_string()))?;
        let well = plate
            .format()
            .parse_position(&spec.position)
            .map_err(|e| fail(ValidationCheck::InvalidPosition, e.to_string()))?;
        spec.metadata
            .check()
            .map_err(|message| fail(ValidationCheck::MalformedMetadata, message))?;

        let id = match spec.id {
            Some(id) if !id.is_empty() => id,
            Some(_) => {
                return Err(fail(
                    ValidationCheck::MissingIdentifier,
                    "identifier is blank".to_string(),
                ));
            }
            None => SampleId::new(format!("{}:{}", plate.id(), well), None),
        };
        if !is_protocol_text(&id.to_string()) {
            return Err(fail(
                ValidationCheck::MissingIdentifier,
                "identifier contains forbidden characters".to_string(),
            ));
        }

        Ok(Self {
            id,
            plate: plate.id().to_string(),
            well,
            metadata: spec.metadata,
        })
    }

    pub fn id(&self) -> &SampleId {
        &self.id
    }

    pub fn plate(&self) -> &str {
        &self.plate
    }

    pub fn well(&self) -> Well {
        self.well
    }

    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    pub fn location(&self) -> String {
        format!("{}:{}", self.plate, self.well)
    }

    /// Physical identity: same plate and same well.
    pub fn same_location(&self, other: &Sample) -> bool {
        self.plate == other.plate && self.well == other.well
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.same_location(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub source: SampleKey,
    pub volume: f64,
}

/// A destination sample assembled from one or more source contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    sample: Sample,
    target_volume: Option<f64>,
    sources: Vec<Contribution>,
    total: f64,
}

impl Reaction {
    pub fn new(sample: Sample, target_volume: Option<f64>) -> Result<Self, SampleError> {
        if let Some(target) = target_volume {
            if !target.is_finite() || target < 0.0 {
                return Err(SampleError::InvalidVolume {
                    sample: sample.id().to_string(),
                    volume: target,
                });
            }
        }
        Ok(Self {
            sample,
            target_volume,
            sources: Vec::new(),
            total: 0.0,
        })
    }

    /// A reaction without a target volume; it never overflows.
    pub fn untargeted(sample: Sample) -> Self {
        Self {
            sample,
            target_volume: None,
            sources: Vec::new(),
            total: 0.0,
        }
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn target_volume(&self) -> Option<f64> {
        self.target_volume
    }

    pub fn total_volume(&self) -> f64 {
        self.total
    }

    pub fn sources(&self) -> &[Contribution] {
        &self.sources
    }

    /// Records that `volume` of `source` goes into this reaction.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidVolume`] for negative or non-finite volumes and,
    /// under [`OverfillPolicy::Reject`], [`SampleError::VolumeOverflow`] when the running
    /// total would exceed the target. A rejected contribution is not recorded.
    pub fn add_source(
        &mut self,
        source: SampleKey,
        volume: f64,
        policy: OverfillPolicy,
    ) -> Result<Fill, SampleError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(SampleError::InvalidVolume {
                sample: self.sample.id().to_string(),
                volume,
            });
        }
        let total = self.total + volume;
        let fill = match self.target_volume {
            Some(target) if total > target + VOLUME_TOLERANCE => match policy {
                OverfillPolicy::Reject => {
                    return Err(SampleError::VolumeOverflow {
                        reaction: self.sample.id().to_string(),
                        total,
                        target,
                    });
                }
                OverfillPolicy::Warn => Fill::Overfilled {
                    excess: total - target,
                },
            },
            _ => Fill::WithinTarget,
        };
        self.sources.push(Contribution { source, volume });
        self.total = total;
        Ok(fill)
    }

    /// Sets the target volume of an untargeted reaction, or confirms an equal one.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidVolume`] for negative or non-finite targets,
    /// [`SampleError::IdentityMismatch`] if a different target is already set and
    /// [`SampleError::VolumeOverflow`] if the reaction already holds more.
    pub fn set_target_volume(&mut self, target: f64) -> Result<(), SampleError> {
        if !target.is_finite() || target < 0.0 {
            return Err(SampleError::InvalidVolume {
                sample: self.sample.id().to_string(),
                volume: target,
            });
        }
        match self.target_volume {
            Some(current) if (current - target).abs() > VOLUME_TOLERANCE => {
                Err(SampleError::IdentityMismatch {
                    id: self.sample.id().to_string(),
                    detail: format!("target volume {target} conflicts with {current}"),
                })
            }
            Some(_) => Ok(()),
            None if self.total > target + VOLUME_TOLERANCE => Err(SampleError::VolumeOverflow {
                reaction: self.sample.id().to_string(),
                total: self.total,
                target,
            }),
            None => {
                self.target_volume = Some(target);
                Ok(())
            }
        }
    }

    /// Volume `source` contributes in total, summed over repeated additions.
    pub fn volume_from(&self, source: SampleKey) -> f64 {
        self.sources
            .iter()
            .filter(|c| c.source == source)
            .map(|c| c.volume)
            .sum()
    }
}

/// A registered entry: either a plain sample or a reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEntry {
    Sample(Sample),
    Reaction(Reaction),
}

impl SampleEntry {
    pub fn sample(&self) -> &Sample {
        match self {
            SampleEntry::Sample(sample) => sample,
            SampleEntry::Reaction(reaction) => reaction.sample(),
        }
    }

    pub fn id(&self) -> &SampleId {
        self.sample().id()
    }

    pub fn as_reaction(&self) -> Option<&Reaction> {
        match self {
            SampleEntry::Reaction(reaction) => Some(reaction),
            SampleEntry::Sample(_) => None,
        }
    }

    pub fn as_reaction_mut(&mut self) -> Option<&mut Reaction> {
        match self {
            SampleEntry::Reaction(reaction) => Some(reaction),
            SampleEntry::Sample(_) => None,
        }
    }
}

impl From<Sample> for SampleEntry {
    fn from(sample: Sample) -> Self {
        SampleEntry::Sample(sample)
    }
}

impl From<Reaction> for SampleEntry {
    fn from(reaction: Reaction) -> Self {
        SampleEntry::Reaction(reaction)
    }
}
