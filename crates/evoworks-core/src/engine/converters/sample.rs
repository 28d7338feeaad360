use crate::core::dialogs::{NoticeKind, Notifier};
use crate::core::io::keywords::Field;
use crate::core::io::reader::{ParsedSheet, Record};
use crate::core::models::format::PlateFormat;
use crate::core::models::ids::SampleKey;
use crate::core::models::plate::{Plate, PlateError};
use crate::core::models::sample::{Fill, Sample, SampleError, SampleId, SampleMetadata, SampleSpec};
use crate::core::registry::plates::PlateIndex;
use crate::core::registry::samples::SampleIndex;
use crate::engine::config::{ConversionConfig, PlateDefinition};
use crate::engine::error::EngineError;
use tracing::{debug, info, warn};

/// Turns sheet content into registered plates, samples and reactions.
///
/// The picking and distribution converters build on this one for every sample they
/// touch, so identity checks and automatic plate creation behave the same everywhere.
pub struct SampleConverter<'a> {
    plates: &'a mut PlateIndex,
    samples: &'a mut SampleIndex,
    config: &'a ConversionConfig,
    notifier: &'a dyn Notifier,
    default_format: PlateFormat,
    warnings: Vec<String>,
}

impl<'a> SampleConverter<'a> {
    pub fn new(
        plates: &'a mut PlateIndex,
        samples: &'a mut SampleIndex,
        config: &'a ConversionConfig,
        notifier: &'a dyn Notifier,
    ) -> Result<Self, EngineError> {
        let default_format = config.formats.resolve(&config.default_format)?;
        Ok(Self {
            plates,
            samples,
            config,
            notifier,
            default_format,
            warnings: Vec::new(),
        })
    }

    pub fn plates(&self) -> &PlateIndex {
        &*self.plates
    }

    pub fn samples(&self) -> &SampleIndex {
        &*self.samples
    }

    /// Warnings raised so far, in order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    /// Logs a warning, tells the operator and keeps it for the run summary.
    pub fn warn(&mut self, message: String) {
        warn!("{message}");
        self.notifier.notify(&message, NoticeKind::Warning);
        self.warnings.push(message);
    }

    /// Registers a configured plate.
    pub fn register_plate(&mut self, definition: &PlateDefinition) -> Result<(), EngineError> {
        let format_id = definition
            .format
            .as_deref()
            .unwrap_or(&self.config.default_format);
        let format = self.config.formats.resolve(format_id)?;
        let mut plate = Plate::new(definition.id.as_str(), format)?;
        if let Some(barcode) = &definition.barcode {
            plate = plate.with_barcode(barcode.as_str());
        }
        if let Some(rack_type) = &definition.rack_type {
            plate = plate.with_rack_type(rack_type);
        }
        self.add_plate(plate)
    }

    /// Registers `plate`; an identical plate already on the worktable is accepted.
    fn add_plate(&mut self, plate: Plate) -> Result<(), EngineError> {
        if let Ok(existing) = self.plates.resolve(plate.id()) {
            if existing == &plate {
                debug!(plate = plate.id(), "Plate already registered.");
                return Ok(());
            }
        }
        debug!(plate = plate.id(), format = %plate.format(), "Registering plate.");
        self.plates.register(plate)?;
        Ok(())
    }

    /// Registers the plates and reagents declared in a sheet's directive rows.
    pub fn apply_directives(&mut self, sheet: &ParsedSheet) -> Result<(), EngineError> {
        for directive in &sheet.plates {
            let registered = self
                .config
                .formats
                .resolve(&directive.format)
                .and_then(|format| Plate::new(directive.plate.as_str(), format))
                .map_err(EngineError::from)
                .and_then(|plate| {
                    let plate = match &directive.rack_type {
                        Some(rack_type) => plate.with_rack_type(rack_type),
                        None => plate,
                    };
                    self.add_plate(plate)
                });
            registered.map_err(|e| e.at_row(directive.row))?;
        }
        for reagent in &sheet.reagents {
            let spec = SampleSpec {
                id: Some(SampleId::parse(&reagent.id)),
                plate: reagent.plate.clone(),
                position: reagent.position.clone(),
                metadata: SampleMetadata::default(),
            };
            self.resolve_or_add(spec).map_err(|e| e.at_row(reagent.row))?;
        }
        Ok(())
    }

    /// Registers every sample of a sample-list sheet and returns their keys in row order.
    pub fn convert(&mut self, sheet: &ParsedSheet) -> Result<Vec<SampleKey>, EngineError> {
        self.apply_directives(sheet)?;
        let keys = sheet
            .records
            .iter()
            .map(|record| {
                self.resolve_or_add(sample_spec(record))
                    .map_err(|e| e.at_row(record.row))
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(samples = keys.len(), "Sample list registered.");
        Ok(keys)
    }

    /// Fails with [`PlateError::NotFound`] for unknown plates unless automatic plate
    /// creation is enabled.
    fn ensure_plate(&mut self, id: &str) -> Result<(), EngineError> {
        if id.trim().is_empty() || self.plates.contains(id) {
            return Ok(());
        }
        if !self.config.auto_create_plates {
            return Err(PlateError::NotFound { id: id.to_string() }.into());
        }
        self.plates
            .resolve_or_create(id, &self.default_format, None)?;
        info!(plate = id.trim(), format = %self.default_format, "Created plate on first use.");
        Ok(())
    }

    /// Returns the key of the sample `spec` describes, registering it if it is new.
    ///
    /// A known identifier must sit at the same location; an anonymous spec matches
    /// whatever is registered at its location.
    pub fn resolve_or_add(&mut self, spec: SampleSpec) -> Result<SampleKey, EngineError> {
        self.ensure_plate(&spec.plate)?;
        let named = spec.id.as_ref().is_some_and(|id| !id.is_empty());
        let sample = Sample::new(spec, &*self.plates)?;

        if named {
            if let Ok(key) = self.samples.key_of(&sample.id().to_string()) {
                return self.check_location(key, &sample);
            }
        } else if let Some(key) = self.samples.key_at(sample.plate(), sample.well()) {
            return Ok(key);
        }
        Ok(self.samples.add(sample)?)
    }

    fn check_location(&self, key: SampleKey, sample: &Sample) -> Result<SampleKey, EngineError> {
        let existing = self
            .samples
            .sample(key)
            .ok_or_else(|| EngineError::Internal(format!("dangling key for '{}'", sample.id())))?;
        if existing.same_location(sample) {
            Ok(key)
        } else {
            Err(SampleError::IdentityMismatch {
                id: sample.id().to_string(),
                detail: format!(
                    "registered at {} but given at {}",
                    existing.location(),
                    sample.location()
                ),
            }
            .into())
        }
    }

    /// Finds a registered sample by identifier.
    pub fn lookup(&self, id: &str) -> Result<SampleKey, EngineError> {
        Ok(self.samples.lookup(id, self.config.relaxed_ids)?)
    }

    /// Like [`resolve_or_add`](Self::resolve_or_add), then makes the entry a reaction.
    pub fn resolve_reaction(
        &mut self,
        spec: SampleSpec,
        target_volume: Option<f64>,
    ) -> Result<SampleKey, EngineError> {
        let key = self.resolve_or_add(spec)?;
        let reaction = self
            .samples
            .promote_to_reaction(key)
            .ok_or_else(|| EngineError::Internal("reaction vanished after registration".into()))?;
        if let Some(target) = target_volume {
            reaction.set_target_volume(target)?;
        }
        Ok(key)
    }

    /// Books `volume` of `source` into the reaction at `destination`.
    pub fn contribute(
        &mut self,
        source: SampleKey,
        destination: SampleKey,
        volume: f64,
    ) -> Result<(), EngineError> {
        if volume <= 0.0 {
            return Ok(());
        }
        let policy = self.config.overfill;
        let reaction = self
            .samples
            .reaction_mut(destination)
            .ok_or_else(|| EngineError::Internal("transfer into a plain sample".into()))?;
        let fill = reaction.add_source(source, volume, policy)?;
        let id = reaction.sample().id().to_string();
        if let Fill::Overfilled { excess } = fill {
            self.warn(format!(
                "Reaction '{id}' exceeds its target volume by {excess}"
            ));
        }
        Ok(())
    }
}

/// A sample-list record as a sample spec.
pub fn sample_spec(record: &Record) -> SampleSpec {
    let id = record.text(Field::Id).map(|id| match record.text(Field::SubId) {
        Some(sub_id) => SampleId::new(id, Some(sub_id.to_string())),
        None => SampleId::parse(id),
    });
    SampleSpec {
        id,
        plate: record.text(Field::Plate).unwrap_or_default().to_string(),
        position: record.text(Field::Position).unwrap_or_default().to_string(),
        metadata: SampleMetadata {
            concentration: record.number(Field::Concentration),
            liquid_class: record.text(Field::LiquidClass).map(str::to_string),
            tip_mask: record.tip_mask(),
            extra: record.extra.clone(),
        },
    }
}
