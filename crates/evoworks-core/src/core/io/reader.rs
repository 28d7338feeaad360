//! Dialect-aware reading of spreadsheet layouts.
//!
//! A sheet starts with optional directive rows, followed by one header row and the
//! data rows:
//!
//! ```text
//! param    volume   20
//! format   T01      384      [rack type]
//! reagent  buffer   R01      A1
//! ID       plate    pos      ...
//! ```
//!
//! The reader checks the header against the dialect, then validates every data row and
//! reports all row-level problems together. Nothing is returned unless the whole sheet
//! is valid.

use super::keywords::{Dialect, Field, HeaderKeywords, normalize_header};
use super::sheet::{Cell, CellError, Sheet, SheetError};
use crate::core::models::format::Well;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const PARAM_DIRECTIVE: &str = "param";
pub const FORMAT_DIRECTIVE: &str = "format";
pub const REAGENT_DIRECTIVE: &str = "reagent";

/// `param volume <v>`: volume for picking rows that leave the volume blank.
pub const PARAM_VOLUME: &str = "volume";
/// `param destination <plate>`: plate for distribution headers naming only a well.
pub const PARAM_DESTINATION: &str = "destination";

const DESTINATION_SEPARATOR: char = ':';
const MAX_TIP_MASK: f64 = 255.0;

/// `format <plate> <format> [rack type]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateDirective {
    pub row: usize,
    pub plate: String,
    pub format: String,
    pub rack_type: Option<String>,
}

/// `reagent <id> <plate> <position>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReagentDirective {
    pub row: usize,
    pub id: String,
    pub plate: String,
    pub position: String,
}

/// A distribution header naming a destination well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationColumn {
    pub header: String,
    pub plate: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Field(Field),
    /// Index into [`ParsedSheet::destinations`].
    Destination(usize),
    /// An unrecognised header, kept as sample metadata.
    Extra(String),
    Blank,
}

/// One validated data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// 1-based sheet row.
    pub row: usize,
    text: BTreeMap<Field, String>,
    numbers: BTreeMap<Field, f64>,
    /// Values of unrecognised columns keyed by normalized header.
    pub extra: BTreeMap<String, String>,
    /// Volumes aligned with [`ParsedSheet::destinations`]; blank cells are zero.
    pub destination_volumes: Vec<f64>,
}

impl Record {
    fn new(row: usize, destinations: usize) -> Self {
        Self {
            row,
            destination_volumes: vec![0.0; destinations],
            ..Default::default()
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.text.get(&field).map(String::as_str)
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.numbers.get(&field).copied()
    }

    pub fn has(&self, field: Field) -> bool {
        self.text.contains_key(&field) || self.numbers.contains_key(&field)
    }

    pub fn tip_mask(&self) -> Option<u8> {
        self.number(Field::TipMask).map(|m| m as u8)
    }
}

/// The validated content of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub dialect: Dialect,
    /// `param` directives keyed by normalized name.
    pub params: BTreeMap<String, String>,
    pub plates: Vec<PlateDirective>,
    pub reagents: Vec<ReagentDirective>,
    pub header_row: usize,
    pub columns: Vec<Column>,
    pub destinations: Vec<DestinationColumn>,
    pub records: Vec<Record>,
}

impl ParsedSheet {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&normalize_header(key)).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SheetReader<'a> {
    keywords: &'a HeaderKeywords,
    dialect: Dialect,
    default_volume: Option<f64>,
    destination_plate: Option<String>,
}

struct Header {
    row: usize,
    columns: Vec<Column>,
    destinations: Vec<DestinationColumn>,
}

impl<'a> SheetReader<'a> {
    pub fn new(keywords: &'a HeaderKeywords, dialect: Dialect) -> Self {
        Self {
            keywords,
            dialect,
            default_volume: None,
            destination_plate: None,
        }
    }

    /// Fallback volume for picking rows; a `param volume` in the sheet wins.
    pub fn with_default_volume(mut self, volume: Option<f64>) -> Self {
        self.default_volume = volume;
        self
    }

    /// Fallback destination plate for distribution headers; a `param destination` in
    /// the sheet wins.
    pub fn with_destination_plate(mut self, plate: Option<String>) -> Self {
        self.destination_plate = plate;
        self
    }

    /// Parses and validates `sheet`.
    ///
    /// # Errors
    ///
    /// Structural problems (no header, missing or duplicate header fields, unusable
    /// destination headers) fail immediately. Row-level problems are collected and
    /// reported together as [`SheetError::InvalidRows`].
    pub fn read(&self, sheet: &Sheet) -> Result<ParsedSheet, SheetError> {
        let mut errors = Vec::new();
        let mut params = BTreeMap::new();
        let mut plates = Vec::new();
        let mut reagents = Vec::new();
        let mut header: Option<Header> = None;
        let mut records = Vec::new();

        for (row, cells) in sheet.rows() {
            let Some(first) = cells.iter().position(|c| !c.is_empty()) else {
                continue;
            };

            if header.is_none() {
                let keyword = cells[first].as_text().map(|t| t.to_lowercase());
                let args: Vec<String> = cells[first + 1..].iter().filter_map(Cell::as_text).collect();
                match keyword.as_deref() {
                    Some(PARAM_DIRECTIVE) => read_param(row, &args, &mut params, &mut errors),
                    Some(FORMAT_DIRECTIVE) => match args.as_slice() {
                        [plate, format, rest @ ..] => plates.push(PlateDirective {
                            row,
                            plate: plate.clone(),
                            format: format.clone(),
                            rack_type: rest.first().cloned(),
                        }),
                        _ => errors.push(directive_error(row, "format <plate> <format> [rack type]")),
                    },
                    Some(REAGENT_DIRECTIVE) => match args.as_slice() {
                        [id, plate, position, ..] => reagents.push(ReagentDirective {
                            row,
                            id: id.clone(),
                            plate: plate.clone(),
                            position: position.clone(),
                        }),
                        _ => errors.push(directive_error(row, "reagent <id> <plate> <position>")),
                    },
                    _ => header = Some(self.read_header(row, cells, &params)?),
                }
                continue;
            }
            let Some(header) = header.as_ref() else {
                continue;
            };

            let default_volume = match params.get(PARAM_VOLUME) {
                Some(v) => v.parse().ok(),
                None => self.default_volume,
            };
            if let Some(record) = self.read_record(row, cells, header, default_volume, &mut errors) {
                records.push(record);
            }
        }

        let Some(header) = header else {
            return Err(SheetError::MissingHeader);
        };
        if !errors.is_empty() {
            return Err(SheetError::InvalidRows { errors });
        }

        debug!(
            sheet = sheet.name(),
            dialect = %self.dialect,
            records = records.len(),
            plates = plates.len(),
            reagents = reagents.len(),
            "Sheet parsed."
        );
        Ok(ParsedSheet {
            dialect: self.dialect,
            params,
            plates,
            reagents,
            header_row: header.row,
            columns: header.columns,
            destinations: header.destinations,
            records,
        })
    }

    fn read_header(
        &self,
        row: usize,
        cells: &[Cell],
        params: &BTreeMap<String, String>,
    ) -> Result<Header, SheetError> {
        let mut columns = Vec::with_capacity(cells.len());
        let mut destinations = Vec::new();
        let mut seen: HashMap<Field, String> = HashMap::new();
        let destination_plate = params
            .get(PARAM_DESTINATION)
            .cloned()
            .or_else(|| self.destination_plate.clone());

        for cell in cells {
            let Some(text) = cell.as_text() else {
                columns.push(Column::Blank);
                continue;
            };
            if let Some(field) = self.keywords.field_for(&text) {
                if let Some(first) = seen.get(&field) {
                    return Err(SheetError::DuplicateHeader {
                        row,
                        field: field.to_string(),
                        first: first.clone(),
                        second: text,
                    });
                }
                seen.insert(field, text);
                columns.push(Column::Field(field));
                continue;
            }
            match self.dialect {
                Dialect::Distribution => {
                    let destination = parse_destination(row, &text, destination_plate.as_deref())?;
                    columns.push(Column::Destination(destinations.len()));
                    destinations.push(destination);
                }
                Dialect::Samples | Dialect::Picking => {
                    columns.push(Column::Extra(normalize_header(&text)));
                }
            }
        }

        let mut missing = self.dialect.unmet(|field| seen.contains_key(&field));
        let has_default_volume = params.contains_key(PARAM_VOLUME) || self.default_volume.is_some();
        if self.dialect == Dialect::Picking && !seen.contains_key(&Field::Volume) && !has_default_volume {
            missing.push(Field::Volume.name().to_string());
        }
        if !missing.is_empty() {
            return Err(SheetError::MissingFields { row, missing });
        }

        Ok(Header {
            row,
            columns,
            destinations,
        })
    }

    fn read_record(
        &self,
        row: usize,
        cells: &[Cell],
        header: &Header,
        default_volume: Option<f64>,
        errors: &mut Vec<CellError>,
    ) -> Option<Record> {
        let mut record = Record::new(row, header.destinations.len());
        let error_count = errors.len();

        for (index, cell) in cells.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let mut fail = |column: Option<String>, message: String| {
                errors.push(CellError {
                    row,
                    column,
                    message,
                })
            };
            match header.columns.get(index) {
                None | Some(Column::Blank) => fail(
                    None,
                    format!(
                        "value '{}' in column {} lies outside the header",
                        cell.as_text().unwrap_or_default(),
                        index + 1
                    ),
                ),
                Some(Column::Field(field)) if field.is_numeric() => {
                    match cell.as_number().and_then(|n| check_number(*field, n)) {
                        Ok(Some(value)) => {
                            record.numbers.insert(*field, value);
                        }
                        Ok(None) => {}
                        Err(message) => fail(Some(field.to_string()), message),
                    }
                }
                Some(Column::Field(field)) => match cell.as_text() {
                    Some(text) => {
                        record.text.insert(*field, text);
                    }
                    None => fail(Some(field.to_string()), "cell contains an error".to_string()),
                },
                Some(Column::Destination(d)) => {
                    match cell.as_number().and_then(|n| check_number(Field::Volume, n)) {
                        Ok(volume) => record.destination_volumes[*d] = volume.unwrap_or(0.0),
                        Err(message) => fail(Some(header.destinations[*d].header.clone()), message),
                    }
                }
                Some(Column::Extra(name)) => match cell.as_text() {
                    Some(text) => {
                        record.extra.insert(name.clone(), text);
                    }
                    None => fail(Some(name.clone()), "cell contains an error".to_string()),
                },
            }
        }

        if self.dialect == Dialect::Picking && !record.has(Field::Volume) {
            match default_volume {
                Some(volume) => {
                    record.numbers.insert(Field::Volume, volume);
                }
                None => errors.push(CellError {
                    row,
                    column: Some(Field::Volume.to_string()),
                    message: "no volume given and no default volume set".to_string(),
                }),
            }
        }
        for missing in self.dialect.unmet(|field| record.has(field)) {
            errors.push(CellError {
                row,
                column: None,
                message: format!("missing value for {missing}"),
            });
        }

        (errors.len() == error_count).then_some(record)
    }
}

fn read_param(
    row: usize,
    args: &[String],
    params: &mut BTreeMap<String, String>,
    errors: &mut Vec<CellError>,
) {
    let [key, value, ..] = args else {
        errors.push(directive_error(row, "param <name> <value>"));
        return;
    };
    let key = normalize_header(key);
    if key == PARAM_VOLUME {
        if let Err(message) = Cell::Text(value.clone())
            .as_number()
            .and_then(|n| check_number(Field::Volume, n))
        {
            errors.push(CellError {
                row,
                column: None,
                message: format!("param volume: {message}"),
            });
            return;
        }
    }
    params.insert(key, value.clone());
}

fn directive_error(row: usize, usage: &str) -> CellError {
    CellError {
        row,
        column: None,
        message: format!("malformed directive, expected '{usage}'"),
    }
}

fn check_number(field: Field, value: Option<f64>) -> Result<Option<f64>, String> {
    let Some(n) = value else {
        return Ok(None);
    };
    if !n.is_finite() || n < 0.0 {
        return Err(format!("{field} must be a non-negative number, got {n}"));
    }
    if field == Field::TipMask && (n.fract() != 0.0 || n < 1.0 || n > MAX_TIP_MASK) {
        return Err(format!("tip mask must be a whole number from 1 to 255, got {n}"));
    }
    Ok(Some(n))
}

fn parse_destination(
    row: usize,
    header: &str,
    default_plate: Option<&str>,
) -> Result<DestinationColumn, SheetError> {
    let (plate, position) = match header.split_once(DESTINATION_SEPARATOR) {
        Some((plate, position)) => (Some(plate.trim()), position.trim()),
        None => (None, header.trim()),
    };
    let is_well = Well::parse_label(position).is_some()
        || (!position.is_empty() && position.chars().all(|c| c.is_ascii_digit()));
    if !is_well || plate == Some("") {
        return Err(SheetError::UnknownColumn {
            row,
            header: header.to_string(),
        });
    }
    let plate = plate
        .or(default_plate)
        .ok_or_else(|| SheetError::MissingDestinationPlate {
            row,
            header: header.to_string(),
        })?;
    Ok(DestinationColumn {
        header: header.to_string(),
        plate: plate.to_string(),
        position: position.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> Sheet {
        Sheet::from_text_rows("test", rows.iter().map(|r| r.iter().copied()))
    }

    fn read(dialect: Dialect, rows: &[&[&str]]) -> Result<ParsedSheet, SheetError> {
        let keywords = HeaderKeywords::default();
        SheetReader::new(&keywords, dialect).read(&sheet(rows))
    }

    #[test]
    fn picking_sheet_yields_ordered_records_and_directives() {
        let parsed = read(
            Dialect::Picking,
            &[
                &["format", "T01", "384", "%i Well Greiner"],
                &["param", "Volume", "15"],
                &[],
                &["source plate", "source pos", "target plate", "target pos", "volume", "note"],
                &["R01", "A1", "T01", "B2", "20", "first"],
                &["R01", "A2", "T01", "B3", "", ""],
            ],
        )
        .unwrap();

        assert_eq!(parsed.header_row, 4);
        assert_eq!(parsed.param("volume"), Some("15"));
        assert_eq!(
            parsed.plates,
            vec![PlateDirective {
                row: 1,
                plate: "T01".to_string(),
                format: "384".to_string(),
                rack_type: Some("%i Well Greiner".to_string()),
            }]
        );
        assert_eq!(parsed.records.len(), 2);
        let first = &parsed.records[0];
        assert_eq!(first.row, 5);
        assert_eq!(first.text(Field::SourcePlate), Some("R01"));
        assert_eq!(first.number(Field::Volume), Some(20.0));
        assert_eq!(first.extra.get("note").map(String::as_str), Some("first"));
        assert_eq!(parsed.records[1].number(Field::Volume), Some(15.0));
    }

    #[test]
    fn sheet_without_header_is_rejected() {
        assert!(matches!(
            read(Dialect::Picking, &[&["param", "volume", "10"], &[]]),
            Err(SheetError::MissingHeader)
        ));
    }

    #[test]
    fn missing_required_header_is_rejected_before_rows() {
        let err = read(
            Dialect::Picking,
            &[
                &["source plate", "target plate", "target pos", "volume"],
                &["R01", "T01", "A1", "not even checked"],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::MissingFields { row: 1, ref missing } if missing.len() == 1));
    }

    #[test]
    fn picking_without_volume_column_or_default_is_rejected() {
        let err = read(
            Dialect::Picking,
            &[&["source", "target plate", "target pos"], &["s1", "T01", "A1"]],
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::MissingFields { ref missing, .. } if missing == &vec!["volume".to_string()]));
    }

    #[test]
    fn configured_default_volume_fills_blank_cells() {
        let keywords = HeaderKeywords::default();
        let parsed = SheetReader::new(&keywords, Dialect::Picking)
            .with_default_volume(Some(7.5))
            .read(&sheet(&[
                &["source", "target plate", "target pos"],
                &["s1", "T01", "A1"],
            ]))
            .unwrap();
        assert_eq!(parsed.records[0].number(Field::Volume), Some(7.5));
    }

    #[test]
    fn two_headers_for_one_field_are_rejected() {
        assert!(matches!(
            read(Dialect::Samples, &[&["ID", "sample", "plate", "pos"]]),
            Err(SheetError::DuplicateHeader { .. })
        ));
    }

    #[test]
    fn every_bad_row_is_reported_with_its_location() {
        let err = read(
            Dialect::Picking,
            &[
                &["source plate", "source pos", "target plate", "target pos", "volume"],
                &["R01", "A1", "T01", "B2", "lots"],
                &["R01", "A1", "T01", "B2", "-5"],
                &["R01", "A1", "", "B2", "5"],
                &["R01", "A1", "T01", "B2", "5", "stray"],
                &["R01", "A1", "T01", "B2", "5"],
            ],
        )
        .unwrap_err();
        let SheetError::InvalidRows { errors } = err else {
            panic!("expected row errors");
        };
        let rows: Vec<usize> = errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
        assert_eq!(errors[0].column.as_deref(), Some("volume"));
        assert!(errors[2].message.contains("destination-plate"));
        assert!(errors[3].message.contains("outside the header"));
    }

    #[test]
    fn malformed_directives_are_row_errors() {
        let err = read(
            Dialect::Samples,
            &[&["format", "T01"], &["ID", "plate", "pos"], &["s1", "T01", "A1"]],
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::InvalidRows { ref errors } if errors[0].row == 1));
    }

    #[test]
    fn distribution_headers_name_destination_wells() {
        let parsed = read(
            Dialect::Distribution,
            &[
                &["reagent", "buffer", "R01", "A1"],
                &["param", "destination", "T01"],
                &["ID", "plate", "pos", "T02:A1", "B1", "C1"],
                &["buffer", "", "", "5", "", "3"],
                &["water", "R01", "A2", "0", "10", ""],
            ],
        )
        .unwrap();

        assert_eq!(parsed.reagents.len(), 1);
        assert_eq!(parsed.destinations.len(), 3);
        assert_eq!(parsed.destinations[0].plate, "T02");
        assert_eq!(parsed.destinations[1].plate, "T01");
        assert_eq!(parsed.destinations[1].position, "B1");
        assert_eq!(parsed.records[0].destination_volumes, vec![5.0, 0.0, 3.0]);
        assert_eq!(parsed.records[1].destination_volumes, vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn distribution_well_without_any_plate_is_rejected() {
        assert!(matches!(
            read(Dialect::Distribution, &[&["ID", "A1"]]),
            Err(SheetError::MissingDestinationPlate { .. })
        ));
        let keywords = HeaderKeywords::default();
        SheetReader::new(&keywords, Dialect::Distribution)
            .with_destination_plate(Some("T01".to_string()))
            .read(&sheet(&[&["ID", "A1"]]))
            .unwrap();
    }

    #[test]
    fn distribution_rejects_unknown_columns() {
        assert!(matches!(
            read(Dialect::Distribution, &[&["ID", "comment"]]),
            Err(SheetError::UnknownColumn { .. })
        ));
        assert!(matches!(
            read(Dialect::Distribution, &[&["ID", ":A1"]]),
            Err(SheetError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn tip_mask_must_be_a_byte() {
        let err = read(
            Dialect::Samples,
            &[&["ID", "plate", "pos", "tip mask"], &["s1", "T01", "A1", "256"]],
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::InvalidRows { .. }));
    }
}
