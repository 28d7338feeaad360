use crate::core::io::worklist::{
    Command, Pipetting, RackRef, VolumeFormat, Worklist, WorklistError,
};
use crate::core::models::ids::SampleKey;
use crate::core::models::transfer::{TransferOperation, aspirate_groups};
use crate::core::registry::plates::PlateIndex;
use crate::core::registry::samples::SampleIndex;
use crate::engine::config::{OperationOrder, WorklistOptions};
use crate::engine::error::EngineError;
use std::collections::HashMap;
use tracing::debug;

const CAPACITY_TOLERANCE: f64 = 1e-9;

/// Writes transfer operations between registered samples as worklist commands.
///
/// Sample keys are resolved to rack references and well numbers through the plate and
/// sample indices; commands go into a [`Worklist`] that validates every line.
pub struct SampleWorklist<'a> {
    worklist: Worklist,
    plates: &'a PlateIndex,
    samples: &'a SampleIndex,
    options: &'a WorklistOptions,
}

impl<'a> SampleWorklist<'a> {
    pub fn new(
        plates: &'a PlateIndex,
        samples: &'a SampleIndex,
        options: &'a WorklistOptions,
    ) -> Self {
        Self {
            worklist: Worklist::new(VolumeFormat::new(options.volume_decimals)),
            plates,
            samples,
            options,
        }
    }

    pub fn worklist(&self) -> &Worklist {
        &self.worklist
    }

    pub fn into_worklist(self) -> Worklist {
        self.worklist
    }

    /// Aspirate and dispense parameters addressing the well of `key`.
    fn pipetting(
        &self,
        key: SampleKey,
        volume: f64,
        operation: &TransferOperation,
    ) -> Result<Pipetting, EngineError> {
        let sample = self
            .samples
            .sample(key)
            .ok_or_else(|| EngineError::Internal("operation refers to an unknown sample".into()))?;
        let plate = self.plates.resolve(sample.plate())?;
        let position = plate.format().linear_index(sample.well())?;
        Ok(Pipetting {
            liquid_class: operation.liquid_class.clone(),
            tip_mask: operation.tip_mask,
            ..Pipetting::new(RackRef::from(plate), position, volume)
        })
    }

    pub fn aspirate(
        &mut self,
        operation: &TransferOperation,
        volume: f64,
    ) -> Result<(), EngineError> {
        let pipetting = self.pipetting(operation.source, volume, operation)?;
        Ok(self.worklist.push(Command::Aspirate(pipetting))?)
    }

    pub fn dispense(&mut self, operation: &TransferOperation) -> Result<(), EngineError> {
        let pipetting = self.pipetting(operation.destination, operation.volume, operation)?;
        Ok(self.worklist.push(Command::Dispense(pipetting))?)
    }

    pub fn comment(&mut self, text: impl Into<String>) -> Result<(), EngineError> {
        Ok(self.worklist.push(Command::Comment(text.into()))?)
    }

    /// One aspirate, one dispense and an optional wash. Zero volumes write nothing.
    pub fn transfer(&mut self, operation: &TransferOperation) -> Result<(), EngineError> {
        self.distribute(std::slice::from_ref(operation))
    }

    /// Serves a group of operations sharing one source from as few aspirates as the
    /// tip allows.
    ///
    /// Without a tip volume limit the group is one aspirate of the summed volume
    /// followed by its dispenses. With a limit, the dispenses are packed into
    /// consecutive chunks that fit the tip, separated by flushes when enabled. The
    /// group ends with a wash when washing after dispense is enabled.
    ///
    /// # Errors
    ///
    /// A single dispense larger than the tip is an encoding error.
    pub fn distribute(&mut self, group: &[TransferOperation]) -> Result<(), EngineError> {
        let operations: Vec<&TransferOperation> = group.iter().filter(|o| !o.is_empty()).collect();
        let Some(first) = operations.first() else {
            return Ok(());
        };

        if self.options.annotate {
            let source = self
                .samples
                .sample(first.source)
                .map(|s| s.id().to_string())
                .unwrap_or_default();
            self.comment(format!("{source} to {} well(s)", operations.len()))?;
        }

        let chunks = self.chunks(&operations)?;
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && self.options.flush_between_chunks {
                self.worklist.push(Command::Flush)?;
            }
            let total: f64 = chunk.iter().map(|o| o.volume).sum();
            self.aspirate(chunk[0], total)?;
            for operation in chunk {
                self.dispense(operation)?;
            }
        }
        if self.options.wash_after_dispense {
            self.worklist.push(Command::Wash)?;
        }
        Ok(())
    }

    fn chunks<'o>(
        &self,
        operations: &[&'o TransferOperation],
    ) -> Result<Vec<Vec<&'o TransferOperation>>, EngineError> {
        let Some(capacity) = self.options.max_tip_volume else {
            return Ok(vec![operations.to_vec()]);
        };
        let mut chunks: Vec<Vec<&TransferOperation>> = Vec::new();
        let mut current = Vec::new();
        let mut filled = 0.0;
        for &operation in operations {
            if operation.volume > capacity + CAPACITY_TOLERANCE {
                return Err(WorklistError::Encoding {
                    command: "A",
                    reason: format!(
                        "dispense of {} exceeds the tip volume of {capacity}",
                        operation.volume
                    ),
                }
                .into());
            }
            if !current.is_empty() && filled + operation.volume > capacity + CAPACITY_TOLERANCE {
                chunks.push(std::mem::take(&mut current));
                filled = 0.0;
            }
            filled += operation.volume;
            current.push(operation);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    /// Encodes `operations` in order, each aspirate group at once.
    pub fn encode(&mut self, operations: &[TransferOperation]) -> Result<(), EngineError> {
        for group in aspirate_groups(operations) {
            self.distribute(group)
                .map_err(|e| match group.first().and_then(|o| o.row) {
                    Some(row) => e.at_row(row),
                    None => e,
                })?;
        }
        debug!(lines = self.worklist.len(), "Operations encoded.");
        Ok(())
    }
}

/// Reorders operations for writing.
///
/// [`OperationOrder::BySource`] sorts stably by the source's first use, then by the
/// first position of the operation's aspirate group, then by the destination's
/// registration order. Every source is pipetted in one sweep and a group is never
/// split by another group of the same source.
pub fn order_operations(
    mut operations: Vec<TransferOperation>,
    order: OperationOrder,
    samples: &SampleIndex,
) -> Vec<TransferOperation> {
    if order == OperationOrder::AsConverted {
        return operations;
    }
    let mut first_use: HashMap<SampleKey, usize> = HashMap::new();
    for operation in &operations {
        let next = first_use.len();
        first_use.entry(operation.source).or_insert(next);
    }
    let mut group_start: HashMap<usize, usize> = HashMap::new();
    for (i, operation) in operations.iter().enumerate() {
        if let Some(group) = operation.group {
            group_start.entry(group).or_insert(i + 1);
        }
    }
    let registered: HashMap<SampleKey, usize> = samples
        .iter()
        .enumerate()
        .map(|(i, (key, _))| (key, i))
        .collect();
    operations.sort_by_key(|o| {
        (
            first_use.get(&o.source).copied().unwrap_or(usize::MAX),
            o.group
                .and_then(|g| group_start.get(&g).copied())
                .unwrap_or(0),
            registered.get(&o.destination).copied().unwrap_or(usize::MAX),
        )
    });
    operations
}
