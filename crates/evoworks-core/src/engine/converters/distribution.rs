use super::sample::SampleConverter;
use super::transfer;
use crate::core::io::keywords::Field;
use crate::core::io::reader::{ParsedSheet, Record};
use crate::core::models::ids::SampleKey;
use crate::core::models::sample::{SampleId, SampleMetadata, SampleSpec};
use crate::core::models::transfer::TransferOperation;
use crate::engine::error::EngineError;
use tracing::{debug, info};

/// Converts distribution sheets: each row names one source, each destination column
/// a well that receives the cell's volume from it.
///
/// All operations of a row share one aspirate group, numbered by record index.
pub struct DistributionConverter<'a> {
    samples: SampleConverter<'a>,
}

impl<'a> DistributionConverter<'a> {
    pub fn new(samples: SampleConverter<'a>) -> Self {
        Self { samples }
    }

    pub fn into_inner(self) -> SampleConverter<'a> {
        self.samples
    }

    pub fn convert(&mut self, sheet: &ParsedSheet) -> Result<Vec<TransferOperation>, EngineError> {
        self.samples.apply_directives(sheet)?;
        let mut operations = Vec::new();
        for (group, record) in sheet.records.iter().enumerate() {
            self.convert_record(sheet, record, group, &mut operations)
                .map_err(|e| e.at_row(record.row))?;
        }
        info!(
            sources = sheet.records.len(),
            operations = operations.len(),
            "Distribution sheet converted."
        );
        Ok(operations)
    }

    fn convert_record(
        &mut self,
        sheet: &ParsedSheet,
        record: &Record,
        group: usize,
        operations: &mut Vec<TransferOperation>,
    ) -> Result<(), EngineError> {
        let source = self.source(record)?;
        let before = operations.len();
        for (column, &volume) in sheet.destinations.iter().zip(&record.destination_volumes) {
            if volume <= 0.0 {
                continue;
            }
            let destination = self.samples.resolve_reaction(
                SampleSpec {
                    id: None,
                    plate: column.plate.clone(),
                    position: column.position.clone(),
                    metadata: SampleMetadata::default(),
                },
                None,
            )?;
            self.samples.contribute(source, destination, volume)?;
            operations.push(transfer(
                self.samples.samples(),
                record,
                source,
                destination,
                volume,
                Some(group),
            ));
        }
        if operations.len() == before {
            debug!(row = record.row, "Source has no destinations.");
        }
        Ok(())
    }

    /// A source with a location is registered on the fly; an identifier alone must
    /// name a reagent directive or a sample from a source list.
    fn source(&mut self, record: &Record) -> Result<SampleKey, EngineError> {
        let id = record.text(Field::Id);
        match (record.text(Field::Plate), record.text(Field::Position)) {
            (Some(plate), Some(position)) => self.samples.resolve_or_add(SampleSpec {
                id: id.map(SampleId::parse),
                plate: plate.to_string(),
                position: position.to_string(),
                metadata: SampleMetadata::default(),
            }),
            _ => match id {
                Some(id) => self.samples.lookup(id),
                None => Err(EngineError::Internal("distribution row without a source".into())),
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
    use crate::core::models::transfer::aspirate_groups;
    use crate::core::registry::plates::PlateIndex;
    use crate::core::registry::samples::SampleIndex;
    use crate::engine::config::{ConversionConfig, ConversionConfigBuilder, PlateDefinition};
    use crate::engine::error::ErrorKind;

    fn config() -> ConversionConfig {
        ConversionConfigBuilder::new()
            .dialect(Dialect::Distribution)
            .plate(PlateDefinition {
                id: "R01".into(),
                format: Some("6".into()),
                barcode: None,
                rack_type: None,
            })
            .plate(PlateDefinition {
                id: "T01".into(),
                format: None,
                barcode: Some("4711".into()),
                rack_type: None,
            })
            .build()
            .unwrap()
    }

    fn convert(
        samples: &mut SampleIndex,
        rows: &[&[&str]],
    ) -> Result<Vec<TransferOperation>, EngineError> {
        let config = config();
        let dialogs = RecordingDialogs::new();
        let mut plates = PlateIndex::new();
        let keywords = HeaderKeywords::default();
        let sheet = SheetReader::new(&keywords, Dialect::Distribution)
            .with_destination_plate(Some("T01".into()))
            .read(&Sheet::from_text_rows("dist", rows.iter().map(|r| r.iter().copied())))?;
        let mut converter = SampleConverter::new(&mut plates, samples, &config, &dialogs)?;
        for plate in &config.plates {
            converter.register_plate(plate)?;
        }
        DistributionConverter::new(converter).convert(&sheet)
    }

    #[test]
    fn blank_and_zero_cells_emit_nothing() {
        let mut samples = SampleIndex::new();
        let operations = convert(
            &mut samples,
            &[
                &["ID", "plate", "pos", "A1", "A2", "A3"],
                &["buffer", "R01", "A1", "5", "0", "3"],
                &["enzyme", "R01", "A2", "", "2", ""],
            ],
        )
        .unwrap();

        let volumes: Vec<f64> = operations.iter().map(|o| o.volume).collect();
        assert_eq!(volumes, vec![5.0, 3.0, 2.0]);
        let groups = aspirate_groups(&operations);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].iter().map(|o| o.volume).sum::<f64>(), 8.0);
        assert_eq!(samples.reactions().count(), 3);
    }

    #[test]
    fn source_identifier_resolves_reagent_directives() {
        let mut samples = SampleIndex::new();
        let operations = convert(
            &mut samples,
            &[
                &["reagent", "buffer", "R01", "B3"],
                &["ID", "T01:H12"],
                &["buffer", "40"],
            ],
        )
        .unwrap();
        assert_eq!(operations.len(), 1);
        let source = samples.sample(operations[0].source).unwrap();
        assert_eq!(source.location(), "R01:B3");
    }

    #[test]
    fn destination_outside_the_plate_is_reported_with_its_row() {
        let mut samples = SampleIndex::new();
        let err = convert(
            &mut samples,
            &[&["ID", "plate", "pos", "A1", "I1"], &["buffer", "R01", "A1", "5", "5"]],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Row { row: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::SampleValidation);
    }
}
