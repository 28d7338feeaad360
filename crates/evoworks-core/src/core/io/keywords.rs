use super::sheet::SheetError;
use phf::{Map, phf_map};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Semantic meaning of a spreadsheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Field {
    Id,
    SubId,
    Plate,
    Position,
    Volume,
    SourceId,
    SourcePlate,
    SourcePosition,
    DestinationId,
    DestinationPlate,
    DestinationPosition,
    TargetVolume,
    LiquidClass,
    TipMask,
    Concentration,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::SubId => "sub-id",
            Field::Plate => "plate",
            Field::Position => "position",
            Field::Volume => "volume",
            Field::SourceId => "source-id",
            Field::SourcePlate => "source-plate",
            Field::SourcePosition => "source-position",
            Field::DestinationId => "destination-id",
            Field::DestinationPlate => "destination-plate",
            Field::DestinationPosition => "destination-position",
            Field::TargetVolume => "target-volume",
            Field::LiquidClass => "liquid-class",
            Field::TipMask => "tip-mask",
            Field::Concentration => "concentration",
        }
    }

    /// Fields whose cells must hold numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Field::Volume | Field::TargetVolume | Field::TipMask | Field::Concentration
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Requirements = &'static [&'static [&'static [Field]]];

const SAMPLES_REQUIREMENTS: Requirements =
    &[&[&[Field::Id]], &[&[Field::Plate]], &[&[Field::Position]]];
const PICKING_REQUIREMENTS: Requirements = &[
    &[&[Field::SourceId], &[Field::SourcePlate, Field::SourcePosition]],
    &[&[Field::DestinationPlate]],
    &[&[Field::DestinationPosition]],
];
const DISTRIBUTION_REQUIREMENTS: Requirements =
    &[&[&[Field::Id], &[Field::Plate, Field::Position]]];

/// The three spreadsheet layouts understood by the converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// A list of source samples with their locations.
    Samples,
    /// One row per transfer.
    Picking,
    /// One row per source; other columns name destination wells.
    Distribution,
}

impl Dialect {
    /// Header requirements: every entry must be met by at least one of its
    /// alternatives, and an alternative is met when all of its fields are present.
    pub fn requirements(&self) -> Requirements {
        match self {
            Dialect::Samples => SAMPLES_REQUIREMENTS,
            Dialect::Picking => PICKING_REQUIREMENTS,
            Dialect::Distribution => DISTRIBUTION_REQUIREMENTS,
        }
    }

    /// Lists the requirements not met by `present`, one description per requirement.
    pub fn unmet(&self, present: impl Fn(Field) -> bool) -> Vec<String> {
        self.requirements()
            .iter()
            .filter(|alternatives| {
                !alternatives
                    .iter()
                    .any(|fields| fields.iter().all(|&f| present(f)))
            })
            .map(|alternatives| {
                alternatives
                    .iter()
                    .map(|fields| {
                        fields
                            .iter()
                            .map(Field::name)
                            .collect::<Vec<_>>()
                            .join(" + ")
                    })
                    .collect::<Vec<_>>()
                    .join(" or ")
            })
            .collect()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Samples => "samples",
            Dialect::Picking => "picking",
            Dialect::Distribution => "distribution",
        };
        f.write_str(name)
    }
}

static DEFAULT_KEYWORDS: Map<&'static str, Field> = phf_map! {
    "id" => Field::Id, "sample" => Field::Id, "sample id" => Field::Id,
    "sub-id" => Field::SubId, "subid" => Field::SubId, "sub id" => Field::SubId,
    "plate" => Field::Plate, "rack" => Field::Plate,
    "pos" => Field::Position, "position" => Field::Position, "well" => Field::Position,
    "volume" => Field::Volume, "vol" => Field::Volume,
    "source" => Field::SourceId, "source id" => Field::SourceId, "src" => Field::SourceId,
    "src id" => Field::SourceId,
    "source plate" => Field::SourcePlate, "src plate" => Field::SourcePlate,
    "source pos" => Field::SourcePosition, "source position" => Field::SourcePosition,
    "source well" => Field::SourcePosition, "src pos" => Field::SourcePosition,
    "src well" => Field::SourcePosition,
    "target" => Field::DestinationId, "target id" => Field::DestinationId,
    "destination" => Field::DestinationId, "destination id" => Field::DestinationId,
    "dst" => Field::DestinationId, "dst id" => Field::DestinationId,
    "target plate" => Field::DestinationPlate, "destination plate" => Field::DestinationPlate,
    "dst plate" => Field::DestinationPlate,
    "target pos" => Field::DestinationPosition, "target position" => Field::DestinationPosition,
    "target well" => Field::DestinationPosition, "destination pos" => Field::DestinationPosition,
    "destination position" => Field::DestinationPosition,
    "destination well" => Field::DestinationPosition, "dst pos" => Field::DestinationPosition,
    "dst well" => Field::DestinationPosition,
    "target volume" => Field::TargetVolume, "final volume" => Field::TargetVolume,
    "liquid class" => Field::LiquidClass, "liquidclass" => Field::LiquidClass,
    "tip mask" => Field::TipMask, "tipmask" => Field::TipMask,
    "concentration" => Field::Concentration, "conc" => Field::Concentration,
};

/// Lowercases, turns underscores into spaces and collapses whitespace.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mapping from header text to semantic fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderKeywords {
    map: HashMap<String, Field>,
}

impl Default for HeaderKeywords {
    fn default() -> Self {
        Self {
            map: DEFAULT_KEYWORDS
                .entries()
                .map(|(&k, &v)| (k.to_string(), v))
                .collect(),
        }
    }
}

impl HeaderKeywords {
    /// An empty table; see [`Default`] for the built-in one.
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Maps `header` to `field`, replacing any previous mapping of that header.
    pub fn insert(&mut self, header: &str, field: Field) {
        self.map.insert(normalize_header(header), field);
    }

    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a str, Field)>,
    ) -> Self {
        for (header, field) in overrides {
            self.insert(header, field);
        }
        self
    }

    pub fn field_for(&self, header: &str) -> Option<Field> {
        self.map.get(&normalize_header(header)).copied()
    }

    pub fn maps_to(&self, field: Field) -> bool {
        self.map.values().any(|&f| f == field)
    }

    /// Checks that every header requirement of `dialect` can be met by this table.
    pub fn validate_for(&self, dialect: Dialect) -> Result<(), SheetError> {
        let unmet = dialect.unmet(|field| self.maps_to(field));
        if unmet.is_empty() {
            Ok(())
        } else {
            Err(SheetError::InvalidKeywords(format!(
                "no header maps to {} for the {dialect} dialect",
                unmet.join(", ")
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_matched_case_and_space_insensitively() {
        let keywords = HeaderKeywords::default();
        assert_eq!(keywords.field_for("ID"), Some(Field::Id));
        assert_eq!(keywords.field_for("  Source_Plate "), Some(Field::SourcePlate));
        assert_eq!(keywords.field_for("Target   Well"), Some(Field::DestinationPosition));
        assert_eq!(keywords.field_for("A1"), None);
    }

    #[test]
    fn default_table_serves_every_dialect() {
        let keywords = HeaderKeywords::default();
        for dialect in [Dialect::Samples, Dialect::Picking, Dialect::Distribution] {
            keywords.validate_for(dialect).unwrap();
        }
    }

    #[test]
    fn overrides_extend_and_replace_entries() {
        let keywords = HeaderKeywords::default()
            .with_overrides([("Barcode", Field::Plate), ("well", Field::SourcePosition)]);
        assert_eq!(keywords.field_for("barcode"), Some(Field::Plate));
        assert_eq!(keywords.field_for("WELL"), Some(Field::SourcePosition));
    }

    #[test]
    fn incomplete_table_is_rejected_for_dialect() {
        let keywords =
            HeaderKeywords::empty().with_overrides([("ID", Field::Id), ("plate", Field::Plate)]);
        keywords.validate_for(Dialect::Distribution).unwrap();
        let err = keywords.validate_for(Dialect::Samples).unwrap_err();
        assert!(matches!(err, SheetError::InvalidKeywords(msg) if msg.contains("position")));
        assert!(keywords.validate_for(Dialect::Picking).is_err());
    }

    #[test]
    fn unmet_lists_alternatives() {
        let unmet = Dialect::Picking.unmet(|f| f == Field::DestinationPlate);
        assert_eq!(
            unmet,
            vec![
                "source-id or source-plate + source-position".to_string(),
                "destination-position".to_string()
            ]
        );
    }
}
