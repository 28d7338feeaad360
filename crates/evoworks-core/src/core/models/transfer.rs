use super::ids::SampleKey;

/// One liquid movement from a source sample into a destination sample.
///
/// Operations sharing a `group` are served by a single aspirate whose volume is the
/// sum of the group's dispenses. Zero-volume operations are kept so that callers can
/// account for them, but encoders never emit commands for them.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOperation {
    pub source: SampleKey,
    pub destination: SampleKey,
    pub volume: f64,
    pub liquid_class: Option<String>,
    pub tip_mask: Option<u8>,
    pub group: Option<usize>,
    /// 1-based spreadsheet row the operation came from, if any.
    pub row: Option<usize>,
}

impl TransferOperation {
    pub fn new(source: SampleKey, destination: SampleKey, volume: f64) -> Self {
        Self {
            source,
            destination,
            volume,
            liquid_class: None,
            tip_mask: None,
            group: None,
            row: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.volume <= 0.0
    }
}

/// Splits operations into aspirate groups, preserving order.
///
/// Consecutive operations with the same `Some(group)` form one group; every ungrouped
/// operation stands alone.
pub fn aspirate_groups(operations: &[TransferOperation]) -> Vec<&[TransferOperation]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=operations.len() {
        let boundary = i == operations.len()
            || operations[i].group.is_none()
            || operations[i].group != operations[start].group;
        if boundary {
            groups.push(&operations[start..i]);
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn op(key: SampleKey, group: Option<usize>) -> TransferOperation {
        TransferOperation {
            group,
            ..TransferOperation::new(key, key, 1.0)
        }
    }

    #[test]
    fn consecutive_operations_of_a_group_stay_together() {
        let mut map: SlotMap<SampleKey, ()> = SlotMap::with_key();
        let k = map.insert(());
        let ops = vec![
            op(k, Some(0)),
            op(k, Some(0)),
            op(k, None),
            op(k, None),
            op(k, Some(1)),
            op(k, Some(2)),
            op(k, Some(2)),
        ];
        let sizes: Vec<usize> = aspirate_groups(&ops).iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1, 2]);
    }

    #[test]
    fn no_operations_give_no_groups() {
        assert!(aspirate_groups(&[]).is_empty());
    }
}
