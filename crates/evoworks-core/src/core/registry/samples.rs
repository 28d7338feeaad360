use crate::core::models::format::Well;
use crate::core::models::ids::SampleKey;
use crate::core::models::sample::{Reaction, Sample, SampleEntry, SampleError, SampleId};
use slotmap::SlotMap;
use std::collections::HashMap;

/// Registry of every sample and reaction seen during one conversion run.
///
/// Identifiers and locations are both indexed: an identifier names exactly one well and
/// a well carries exactly one identifier.
#[derive(Debug, Clone, Default)]
pub struct SampleIndex {
    /// Primary storage for entries.
    entries: SlotMap<SampleKey, SampleEntry>,
    /// Insertion order; drives default command ordering.
    order: Vec<SampleKey>,
    /// Lookup map from full identifier (`id#sub`) to key.
    by_id: HashMap<String, SampleKey>,
    /// Lookup map from (plate identifier, well) to key.
    by_location: HashMap<(String, Well), SampleKey>,
}

impl SampleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sample or reaction.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::DuplicateIdentifier`] if the identifier is taken, or
    /// [`SampleError::IdentityMismatch`] if the well already belongs to another
    /// identifier. The index is unchanged on error.
    pub fn add(&mut self, entry: impl Into<SampleEntry>) -> Result<SampleKey, SampleError> {
        let entry = entry.into();
        let id = entry.id().to_string();
        if self.by_id.contains_key(&id) {
            return Err(SampleError::DuplicateIdentifier { id });
        }
        let location = (entry.sample().plate().to_string(), entry.sample().well());
        if let Some(&other) = self.by_location.get(&location) {
            let owner = self
                .entries
                .get(other)
                .map(|e| e.id().to_string())
                .unwrap_or_default();
            return Err(SampleError::IdentityMismatch {
                id,
                detail: format!(
                    "{} is already occupied by '{}'",
                    entry.sample().location(),
                    owner
                ),
            });
        }

        let key = self.entries.insert(entry);
        self.by_id.insert(id, key);
        self.by_location.insert(location, key);
        self.order.push(key);
        Ok(key)
    }

    /// Returns the entry registered under the full identifier `id`.
    pub fn get(&self, id: &str) -> Result<&SampleEntry, SampleError> {
        let key = self.key_of(id)?;
        self.entries
            .get(key)
            .ok_or_else(|| SampleError::NotFound { id: id.to_string() })
    }

    pub fn key_of(&self, id: &str) -> Result<SampleKey, SampleError> {
        self.by_id
            .get(id.trim())
            .copied()
            .ok_or_else(|| SampleError::NotFound { id: id.to_string() })
    }

    /// Finds a sample by identifier, optionally ignoring sub-identifiers.
    ///
    /// With `relaxed` set and no `#sub-id` in `id`, an exact miss falls back to the
    /// single entry whose main identifier equals `id`, so `"BBa001"` finds
    /// `"BBa001#a"`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NotFound`] when nothing matches and
    /// [`SampleError::AmbiguousIdentifier`] when several entries share the main id.
    pub fn lookup(&self, id: &str, relaxed: bool) -> Result<SampleKey, SampleError> {
        let exact = self.key_of(id);
        let wanted = SampleId::parse(id);
        if exact.is_ok() || !relaxed || wanted.sub_id().is_some() {
            return exact;
        }

        let candidates: Vec<SampleKey> = self
            .order
            .iter()
            .copied()
            .filter(|&key| {
                self.entries
                    .get(key)
                    .is_some_and(|e| e.id().main_id() == wanted.main_id())
            })
            .collect();
        match candidates.as_slice() {
            [] => exact,
            [key] => Ok(*key),
            many => Err(SampleError::AmbiguousIdentifier {
                id: id.to_string(),
                candidates: many
                    .iter()
                    .filter_map(|&key| self.entries.get(key))
                    .map(|e| e.id().to_string())
                    .collect(),
            }),
        }
    }

    pub fn key_at(&self, plate: &str, well: Well) -> Option<SampleKey> {
        self.by_location.get(&(plate.to_string(), well)).copied()
    }

    pub fn entry(&self, key: SampleKey) -> Option<&SampleEntry> {
        self.entries.get(key)
    }

    pub fn sample(&self, key: SampleKey) -> Option<&Sample> {
        self.entries.get(key).map(SampleEntry::sample)
    }

    /// Mutable access to an entry that already is a reaction.
    pub fn reaction_mut(&mut self, key: SampleKey) -> Option<&mut Reaction> {
        self.entries.get_mut(key).and_then(SampleEntry::as_reaction_mut)
    }

    /// Mutable access to the reaction at `key`, turning a plain sample into an
    /// untargeted reaction first if needed.
    pub fn promote_to_reaction(&mut self, key: SampleKey) -> Option<&mut Reaction> {
        let entry = self.entries.get_mut(key)?;
        if let SampleEntry::Sample(sample) = entry {
            *entry = SampleEntry::Reaction(Reaction::untargeted(sample.clone()));
        }
        entry.as_reaction_mut()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SampleKey, &SampleEntry)> {
        self.order
            .iter()
            .filter_map(|&key| self.entries.get(key).map(|e| (key, e)))
    }

    /// Reactions in insertion order.
    pub fn reactions(&self) -> impl Iterator<Item = (SampleKey, &Reaction)> {
        self.iter()
            .filter_map(|(key, e)| e.as_reaction().map(|r| (key, r)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every entry. Keys handed out earlier become invalid.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.by_id.clear();
        self.by_location.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::format::PlateFormat;
    use crate::core::models::plate::Plate;
    use crate::core::models::sample::{SampleMetadata, SampleSpec};
    use crate::core::registry::plates::PlateIndex;

    fn plates() -> PlateIndex {
        let mut index = PlateIndex::new();
        index
            .register(Plate::new("S", PlateFormat::with_wells(96).unwrap()).unwrap())
            .unwrap();
        index
    }

    fn sample(id: &str, position: &str) -> Sample {
        Sample::new(
            SampleSpec {
                id: Some(SampleId::parse(id)),
                plate: "S".to_string(),
                position: position.to_string(),
                metadata: SampleMetadata::default(),
            },
            &plates(),
        )
        .unwrap()
    }

    #[test]
    fn added_sample_can_be_found_by_id_and_location() {
        let mut index = SampleIndex::new();
        let key = index.add(sample("s1", "A1")).unwrap();
        assert_eq!(index.key_of("s1").unwrap(), key);
        assert_eq!(index.get("s1").unwrap().sample().location(), "S:A1");
        assert_eq!(index.key_at("S", Well::new(0, 0)), Some(key));
    }

    #[test]
    fn duplicate_identifier_is_reported_not_overwritten() {
        let mut index = SampleIndex::new();
        index.add(sample("s1", "A1")).unwrap();
        assert!(matches!(
            index.add(sample("s1", "A2")),
            Err(SampleError::DuplicateIdentifier { .. })
        ));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("s1").unwrap().sample().location(), "S:A1");
    }

    #[test]
    fn occupied_well_with_other_identifier_is_a_mismatch() {
        let mut index = SampleIndex::new();
        index.add(sample("s1", "A1")).unwrap();
        assert!(matches!(
            index.add(sample("s2", "A1")),
            Err(SampleError::IdentityMismatch { .. })
        ));
        assert!(index.get("s2").is_err());
    }

    #[test]
    fn missing_identifier_is_not_found() {
        let index = SampleIndex::new();
        assert!(matches!(
            index.get("ghost"),
            Err(SampleError::NotFound { .. })
        ));
    }

    #[test]
    fn relaxed_lookup_ignores_sub_identifier() {
        let mut index = SampleIndex::new();
        let key = index.add(sample("BBa001#a", "A1")).unwrap();
        index.add(sample("BBa002#a", "B1")).unwrap();
        index.add(sample("BBa002#b", "C1")).unwrap();

        assert_eq!(index.lookup("BBa001", true).unwrap(), key);
        assert!(index.lookup("BBa001", false).is_err());
        assert!(matches!(
            index.lookup("BBa002", true),
            Err(SampleError::AmbiguousIdentifier { candidates, .. }) if candidates.len() == 2
        ));
        assert!(index.lookup("BBa001#b", true).is_err());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut index = SampleIndex::new();
        for (id, pos) in [("z", "A1"), ("a", "A2"), ("m", "A3")] {
            index.add(sample(id, pos)).unwrap();
        }
        let ids: Vec<String> = index.iter().map(|(_, e)| e.id().to_string()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn promote_turns_a_sample_into_a_reaction_in_place() {
        let mut index = SampleIndex::new();
        let source = index.add(sample("src", "A1")).unwrap();
        let key = index.add(sample("dst", "B1")).unwrap();
        assert_eq!(index.reactions().count(), 0);

        let reaction = index.promote_to_reaction(key).unwrap();
        reaction
            .add_source(source, 5.0, Default::default())
            .unwrap();

        assert_eq!(index.reactions().count(), 1);
        let (_, reaction) = index.reactions().next().unwrap();
        assert_eq!(reaction.total_volume(), 5.0);
        assert_eq!(index.key_of("dst").unwrap(), key);
    }

    #[test]
    fn reset_clears_all_lookups() {
        let mut index = SampleIndex::new();
        index.add(sample("s1", "A1")).unwrap();
        index.reset();
        assert!(index.is_empty());
        assert!(index.key_at("S", Well::new(0, 0)).is_none());
        index.add(sample("s1", "A1")).unwrap();
    }
}
