use crate::core::models::format::{PlateFormat, STANDARD_WELL_COUNTS, WellOrdering};
use crate::core::models::plate::PlateError;
use serde::Deserialize;
use std::collections::HashMap;

/// A custom labware geometry as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FormatDefinition {
    pub id: String,
    pub rows: usize,
    pub columns: usize,
    #[serde(default)]
    pub ordering: WellOrdering,
}

impl TryFrom<FormatDefinition> for PlateFormat {
    type Error = PlateError;

    fn try_from(def: FormatDefinition) -> Result<Self, Self::Error> {
        Ok(PlateFormat::new(def.id, def.rows, def.columns)?.with_ordering(def.ordering))
    }
}

/// Named plate formats known to a run.
#[derive(Debug, Clone, Default)]
pub struct FormatCatalog {
    formats: HashMap<String, PlateFormat>,
    order: Vec<String>,
}

impl FormatCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every standard microplate, keyed by well count (`"96"`).
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for wells in STANDARD_WELL_COUNTS {
            if let Ok(format) = PlateFormat::with_wells(wells) {
                catalog.insert(format);
            }
        }
        catalog
    }

    /// Adds `format`, replacing any format registered under the same identifier.
    pub fn insert(&mut self, format: PlateFormat) {
        let id = format.id().to_string();
        if self.formats.insert(id.clone(), format).is_none() {
            self.order.push(id);
        }
    }

    /// Looks a format up by identifier.
    ///
    /// Unregistered numeric identifiers fall back to the standard geometry for that
    /// well count, so `"1536"` works even in an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::UnknownFormat`] if the identifier is neither registered nor
    /// a valid standard well count.
    pub fn resolve(&self, id: &str) -> Result<PlateFormat, PlateError> {
        let id = id.trim();
        if let Some(format) = self.formats.get(id) {
            return Ok(format.clone());
        }
        match id.parse::<usize>() {
            Ok(wells) => PlateFormat::with_wells(wells),
            Err(_) => Err(PlateError::UnknownFormat(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Formats in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PlateFormat> {
        self.order.iter().filter_map(|id| self.formats.get(id))
    }
}
