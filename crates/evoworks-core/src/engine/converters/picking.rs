use super::sample::SampleConverter;
use super::transfer;
use crate::core::io::keywords::Field;
use crate::core::io::reader::{ParsedSheet, Record};
use crate::core::models::ids::SampleKey;
use crate::core::models::sample::{SampleId, SampleMetadata, SampleSpec};
use crate::core::models::transfer::TransferOperation;
use crate::engine::error::EngineError;
use tracing::info;

/// Converts picking sheets: every row moves one volume from a source well into a
/// destination reaction.
pub struct PickingConverter<'a> {
    samples: SampleConverter<'a>,
}

impl<'a> PickingConverter<'a> {
    pub fn new(samples: SampleConverter<'a>) -> Self {
        Self { samples }
    }

    pub fn into_inner(self) -> SampleConverter<'a> {
        self.samples
    }

    /// Returns one operation per record, in row order.
    ///
    /// # Errors
    ///
    /// The first failing row aborts the conversion; the error carries its row.
    pub fn convert(&mut self, sheet: &ParsedSheet) -> Result<Vec<TransferOperation>, EngineError> {
        self.samples.apply_directives(sheet)?;
        let operations = sheet
            .records
            .iter()
            .map(|record| self.convert_record(record).map_err(|e| e.at_row(record.row)))
            .collect::<Result<Vec<_>, _>>()?;
        info!(operations = operations.len(), "Picking sheet converted.");
        Ok(operations)
    }

    fn convert_record(&mut self, record: &Record) -> Result<TransferOperation, EngineError> {
        let volume = record
            .number(Field::Volume)
            .ok_or_else(|| EngineError::Internal("picking row without a volume".into()))?;
        let source = self.source(record)?;
        let destination = self.samples.resolve_reaction(
            SampleSpec {
                id: record.text(Field::DestinationId).map(SampleId::parse),
                plate: record.text(Field::DestinationPlate).unwrap_or_default().to_string(),
                position: record
                    .text(Field::DestinationPosition)
                    .unwrap_or_default()
                    .to_string(),
                metadata: SampleMetadata::default(),
            },
            record.number(Field::TargetVolume),
        )?;

        if volume > 0.0 {
            self.samples.contribute(source, destination, volume)?;
        } else {
            self.samples
                .warn(format!("Row {}: volume is zero, nothing is transferred", record.row));
        }
        Ok(transfer(
            self.samples.samples(),
            record,
            source,
            destination,
            volume,
            None,
        ))
    }

    /// A source given by location is registered on the fly; one given only by
    /// identifier must already be known.
    fn source(&mut self, record: &Record) -> Result<SampleKey, EngineError> {
        let id = record.text(Field::SourceId);
        match (record.text(Field::SourcePlate), record.text(Field::SourcePosition)) {
            (Some(plate), Some(position)) => self.samples.resolve_or_add(SampleSpec {
                id: id.map(SampleId::parse),
                plate: plate.to_string(),
                position: position.to_string(),
                metadata: SampleMetadata::default(),
            }),
            _ => match id {
                Some(id) => self.samples.lookup(id),
                None => Err(EngineError::Internal("picking row without a source".into())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialogs::RecordingDialogs;
    use crate::core::io::keywords::{Dialect, HeaderKeywords};
    use crate::core::io::reader::SheetReader;
    use crate::core::io::sheet::Sheet;
    use crate::core::registry::plates::PlateIndex;
    use crate::core::registry::samples::SampleIndex;
    use crate::engine::config::{ConversionConfig, ConversionConfigBuilder, PlateDefinition};
    use crate::engine::error::ErrorKind;

    fn config() -> ConversionConfig {
        let plate = |id: &str| PlateDefinition {
            id: id.into(),
            format: None,
            barcode: None,
            rack_type: None,
        };
        ConversionConfigBuilder::new()
            .dialect(Dialect::Picking)
            .plate(plate("R01"))
            .plate(plate("T01"))
            .build()
            .unwrap()
    }

    fn sheet(rows: &[&[&str]]) -> ParsedSheet {
        let keywords = HeaderKeywords::default();
        SheetReader::new(&keywords, Dialect::Picking)
            .read(&Sheet::from_text_rows("pick", rows.iter().map(|r| r.iter().copied())))
            .unwrap()
    }

    fn convert(
        config: &ConversionConfig,
        samples: &mut SampleIndex,
        rows: &[&[&str]],
    ) -> Result<Vec<TransferOperation>, EngineError> {
        let dialogs = RecordingDialogs::new();
        let mut plates = PlateIndex::new();
        let mut converter = SampleConverter::new(&mut plates, samples, config, &dialogs)?;
        for plate in &config.plates {
            converter.register_plate(plate)?;
        }
        PickingConverter::new(converter).convert(&sheet(rows))
    }

    #[test]
    fn every_row_becomes_one_operation_in_order() {
        let config = config();
        let mut samples = SampleIndex::new();
        let operations = convert(
            &config,
            &mut samples,
            &[
                &["source plate", "source pos", "target plate", "target pos", "volume", "liquid class"],
                &["R01", "A1", "T01", "A1", "20", "Water"],
                &["R01", "A2", "T01", "A1", "5", ""],
                &["R01", "A1", "T01", "B1", "0", ""],
            ],
        )
        .unwrap();

        assert_eq!(operations.len(), 3);
        assert_eq!(operations[0].liquid_class.as_deref(), Some("Water"));
        assert_eq!(operations[1].liquid_class, None);
        assert_eq!(operations[2].row, Some(4));
        assert!(operations[2].is_empty());
        assert_eq!(operations[0].source, operations[2].source);

        let (_, reaction) = samples.reactions().next().unwrap();
        assert_eq!(reaction.total_volume(), 25.0);
        assert_eq!(reaction.sources().len(), 2);
        assert_eq!(samples.reactions().count(), 2);
    }

    #[test]
    fn source_by_identifier_must_be_known() {
        let config = config();
        let mut samples = SampleIndex::new();
        let err = convert(
            &config,
            &mut samples,
            &[
                &["reagent", "buffer", "R01", "H12"],
                &["source", "target plate", "target pos", "volume"],
                &["buffer", "T01", "A1", "10"],
                &["water", "T01", "A2", "10"],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Row { row: 4, .. }));
        assert_eq!(err.kind(), ErrorKind::SampleValidation);
    }

    #[test]
    fn target_volume_caps_the_reaction() {
        let config = config();
        let mut samples = SampleIndex::new();
        let err = convert(
            &config,
            &mut samples,
            &[
                &["source plate", "source pos", "target plate", "target pos", "volume", "target volume"],
                &["R01", "A1", "T01", "A1", "15", "20"],
                &["R01", "A2", "T01", "A1", "10", ""],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Row { row: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::VolumeOverflow);
    }

    #[test]
    fn invalid_destination_well_fails_validation() {
        let config = config();
        let mut samples = SampleIndex::new();
        let err = convert(
            &config,
            &mut samples,
            &[
                &["source plate", "source pos", "target plate", "target pos", "volume"],
                &["R01", "A1", "T01", "Z99", "10"],
            ],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SampleValidation);
    }
}
