use crate::core::models::format::PlateFormat;
use crate::core::models::ids::PlateKey;
use crate::core::models::plate::{Plate, PlateError};
use slotmap::SlotMap;
use std::collections::HashMap;

/// Registry of the plates placed on the worktable for one conversion run.
#[derive(Debug, Clone, Default)]
pub struct PlateIndex {
    /// Primary storage for plates.
    plates: SlotMap<PlateKey, Plate>,
    /// Registration order, used for listing.
    order: Vec<PlateKey>,
    /// Lookup map from plate identifier to key.
    by_id: HashMap<String, PlateKey>,
}

impl PlateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plate to the index.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::DuplicatePlate`] if a plate with the same identifier is
    /// already registered; the index is left unchanged.
    pub fn register(&mut self, plate: Plate) -> Result<PlateKey, PlateError> {
        if self.by_id.contains_key(plate.id()) {
            return Err(PlateError::DuplicatePlate {
                id: plate.id().to_string(),
            });
        }
        let id = plate.id().to_string();
        let key = self.plates.insert(plate);
        self.by_id.insert(id, key);
        self.order.push(key);
        Ok(key)
    }

    /// Returns the plate registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::NotFound`] if no such plate exists.
    pub fn resolve(&self, id: &str) -> Result<&Plate, PlateError> {
        self.key_of(id)
            .and_then(|key| self.plates.get(key))
            .ok_or_else(|| PlateError::NotFound { id: id.to_string() })
    }

    /// Returns the plate registered under `id`, registering a new one with `format` if
    /// it is missing.
    pub fn resolve_or_create(
        &mut self,
        id: &str,
        format: &PlateFormat,
        rack_type: Option<&str>,
    ) -> Result<&Plate, PlateError> {
        let key = match self.key_of(id) {
            Some(key) => key,
            None => {
                let mut plate = Plate::new(id, format.clone())?;
                if let Some(rack_type) = rack_type {
                    plate = plate.with_rack_type(rack_type);
                }
                self.register(plate)?
            }
        };
        self.plates
            .get(key)
            .ok_or_else(|| PlateError::NotFound { id: id.to_string() })
    }

    pub fn key_of(&self, id: &str) -> Option<PlateKey> {
        self.by_id.get(id.trim()).copied()
    }

    pub fn plate(&self, key: PlateKey) -> Option<&Plate> {
        self.plates.get(key)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.key_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// Plates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Plate> {
        self.order.iter().filter_map(|&key| self.plates.get(key))
    }

    /// Forgets every plate. Keys handed out earlier become invalid.
    pub fn reset(&mut self) {
        self.plates.clear();
        self.order.clear();
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(id: &str) -> Plate {
        Plate::new(id, PlateFormat::with_wells(96).unwrap()).unwrap()
    }

    #[test]
    fn resolve_fails_for_unregistered_plate() {
        let index = PlateIndex::new();
        assert!(matches!(
            index.resolve("T01"),
            Err(PlateError::NotFound { .. })
        ));
    }

    #[test]
    fn registered_plate_resolves_to_the_stored_instance() {
        let mut index = PlateIndex::new();
        let key = index.register(plate("T01")).unwrap();
        let resolved = index.resolve("T01").unwrap();
        assert!(std::ptr::eq(resolved, index.plate(key).unwrap()));
        assert!(std::ptr::eq(resolved, index.resolve(" T01 ").unwrap()));
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut index = PlateIndex::new();
        index.register(plate("T01")).unwrap();
        let replacement = plate("T01").with_barcode("BC1");
        assert!(matches!(
            index.register(replacement),
            Err(PlateError::DuplicatePlate { .. })
        ));
        assert_eq!(index.len(), 1);
        assert!(index.resolve("T01").unwrap().by_label());
    }

    #[test]
    fn resolve_or_create_registers_once() {
        let mut index = PlateIndex::new();
        let format = PlateFormat::with_wells(384).unwrap();
        let created = index
            .resolve_or_create("new", &format, Some("%i Deep Well"))
            .unwrap()
            .clone();
        assert_eq!(created.rack_type(), "384 Deep Well");
        let again = index
            .resolve_or_create("new", &PlateFormat::with_wells(96).unwrap(), None)
            .unwrap();
        assert_eq!(again.format().well_count(), 384);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn iteration_follows_registration_order_and_reset_clears() {
        let mut index = PlateIndex::new();
        for id in ["c", "a", "b"] {
            index.register(plate(id)).unwrap();
        }
        let ids: Vec<&str> = index.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        index.reset();
        assert!(index.is_empty());
        assert!(!index.contains("a"));
        index.register(plate("a")).unwrap();
    }
}
