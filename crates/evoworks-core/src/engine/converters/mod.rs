//! Converters from validated sheet records to registered samples and ordered
//! transfer operations.
//!
//! - [`sample`] - sample lists, directives, identity checks and plate creation
//! - [`picking`] - one transfer per row
//! - [`distribution`] - one source per row, spread over destination columns

pub mod distribution;
pub mod picking;
pub mod sample;

use crate::core::io::keywords::Field;
use crate::core::io::reader::Record;
use crate::core::models::ids::SampleKey;
use crate::core::models::transfer::TransferOperation;
use crate::core::registry::samples::SampleIndex;

/// Builds the operation for one record. Liquid class and tip mask come from the row,
/// falling back to the source sample's metadata.
pub(crate) fn transfer(
    samples: &SampleIndex,
    record: &Record,
    source: SampleKey,
    destination: SampleKey,
    volume: f64,
    group: Option<usize>,
) -> TransferOperation {
    let metadata = samples.sample(source).map(|s| s.metadata());
    TransferOperation {
        liquid_class: record
            .text(Field::LiquidClass)
            .map(str::to_string)
            .or_else(|| metadata.and_then(|m| m.liquid_class.clone())),
        tip_mask: record.tip_mask().or(metadata.and_then(|m| m.tip_mask)),
        group,
        row: Some(record.row),
        ..TransferOperation::new(source, destination, volume)
    }
}
