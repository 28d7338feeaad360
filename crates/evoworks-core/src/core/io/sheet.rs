use calamine::{Data, Reader, open_workbook_auto};
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xls", "xlsx", "xlsm", "xlsb", "ods"];

/// A cell-level problem found while reading a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellError {
    /// 1-based sheet row.
    pub row: usize,
    /// Header of the offending column, if the problem is tied to one.
    pub column: Option<String>,
    pub message: String,
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "row {}, column '{}': {}", self.row, column, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

fn list_errors(errors: &[CellError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot read workbook '{path}': {message}")]
    Workbook { path: String, message: String },

    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },

    #[error("Unsupported spreadsheet format for '{path}' (expected .xls, .xlsx, .ods or .csv)")]
    UnsupportedFormat { path: String },

    #[error("Sheet '{sheet}' not found in '{path}'")]
    SheetNotFound { path: String, sheet: String },

    #[error("No header row found")]
    MissingHeader,

    #[error("Header row {row} lacks required column(s): {}", missing.join(", "))]
    MissingFields { row: usize, missing: Vec<String> },

    #[error("Header row {row}: columns '{first}' and '{second}' both map to '{field}'")]
    DuplicateHeader {
        row: usize,
        field: String,
        first: String,
        second: String,
    },

    #[error("Header row {row}: column '{header}' is neither a known field nor a destination well")]
    UnknownColumn { row: usize, header: String },

    #[error("Header row {row}: column '{header}' names a well but no destination plate is set")]
    MissingDestinationPlate { row: usize, header: String },

    #[error("Invalid header keyword table: {0}")]
    InvalidKeywords(String),

    #[error("{} invalid row(s): {}", errors.len(), list_errors(errors))]
    InvalidRows { errors: Vec<CellError> },
}

/// A spreadsheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// The cell as trimmed text, or `None` if blank.
    ///
    /// Whole numbers lose their fraction (`12.0` becomes `"12"`), since identifiers and
    /// well numbers typed into a spreadsheet often come back as floats.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty | Cell::Error(_) => None,
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            Cell::Number(n) => Some(n.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// The cell as a number, `Ok(None)` if blank.
    pub fn as_number(&self) -> Result<Option<f64>, String> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(s) if s.trim().is_empty() => Ok(None),
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("'{}' is not a number", s.trim())),
            Cell::Bool(b) => Err(format!("'{b}' is not a number")),
            Cell::Error(e) => Err(format!("cell contains an error ({e})")),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            // Excel serial day number.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Error(format!("{e:?}")),
        }
    }
}

/// One worksheet as a grid of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<Cell>>,
    /// Sheet row number (1-based) of `rows[0]`.
    first_row: usize,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
            first_row: 1,
        }
    }

    /// Builds a sheet from text rows, mostly useful for tests and CSV input.
    pub fn from_text_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell.as_ref() {
                        "" => Cell::Empty,
                        text => Cell::Text(text.to_string()),
                    })
                    .collect()
            })
            .collect();
        Self::new(name, rows)
    }

    /// Loads one sheet of a workbook or a CSV/TSV file, chosen by file extension.
    ///
    /// Workbooks use their first sheet unless `sheet` names another one.
    pub fn load(path: &Path, sheet: Option<&str>) -> Result<Self, SheetError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Self::load_delimited(path, b','),
            "tsv" | "txt" => Self::load_delimited(path, b'\t'),
            ext if WORKBOOK_EXTENSIONS.contains(&ext) => Self::load_workbook(path, sheet),
            _ => Err(SheetError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    fn load_workbook(path: &Path, sheet: Option<&str>) -> Result<Self, SheetError> {
        let path_str = path.display().to_string();
        let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::Workbook {
            path: path_str.clone(),
            message: e.to_string(),
        })?;

        let names = workbook.sheet_names();
        let name = match sheet {
            Some(wanted) => names
                .iter()
                .find(|n| n.eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| SheetError::SheetNotFound {
                    path: path_str.clone(),
                    sheet: wanted.to_string(),
                })?,
            None => names
                .first()
                .cloned()
                .ok_or_else(|| SheetError::Workbook {
                    path: path_str.clone(),
                    message: "workbook has no sheets".to_string(),
                })?,
        };

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SheetError::Workbook {
                path: path_str.clone(),
                message: e.to_string(),
            })?;
        let first_row = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
        let rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();

        Ok(Self {
            name,
            rows,
            first_row,
        })
    }

    fn load_delimited(path: &Path, delimiter: u8) -> Result<Self, SheetError> {
        let file = std::fs::File::open(path).map_err(|e| SheetError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::read_delimited(name, file, delimiter).map_err(|e| SheetError::Csv {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Parses delimited text; every field becomes a text cell.
    pub fn read_delimited(
        name: impl Into<String>,
        reader: impl Read,
        delimiter: u8,
    ) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| match field.trim() {
                        "" => Cell::Empty,
                        _ => Cell::Text(field.to_string()),
                    })
                    .collect(),
            );
        }
        Ok(Self::new(name, rows))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows with their 1-based sheet row numbers.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (self.first_row + i, row.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn whole_numbers_read_as_integers() {
        assert_eq!(Cell::Number(12.0).as_text(), Some("12".to_string()));
        assert_eq!(Cell::Number(2.5).as_text(), Some("2.5".to_string()));
        assert_eq!(Cell::Text("  ".to_string()).as_text(), None);
        assert_eq!(Cell::Text(" A1 ".to_string()).as_text(), Some("A1".to_string()));
    }

    #[test]
    fn numbers_parse_from_text_and_reject_garbage() {
        assert_eq!(Cell::Text(" 20 ".to_string()).as_number(), Ok(Some(20.0)));
        assert_eq!(Cell::Empty.as_number(), Ok(None));
        assert!(Cell::Text("twenty".to_string()).as_number().is_err());
        assert!(Cell::Error("Div0".to_string()).as_number().is_err());
    }

    #[test]
    fn calamine_values_map_to_cells() {
        assert_eq!(Cell::from(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
        assert_eq!(
            Cell::from(&Data::String("x".to_string())),
            Cell::Text("x".to_string())
        );
    }

    #[test]
    fn load_reads_csv_rows_with_row_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "param,volume,20").unwrap();
        writeln!(file, "ID,plate,pos").unwrap();
        writeln!(file, "s1,R01,A1,").unwrap();

        let sheet = Sheet::load(&path, None).unwrap();
        assert_eq!(sheet.name(), "layout");
        let rows: Vec<(usize, &[Cell])> = sheet.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].0, 3);
        assert_eq!(rows[2].1[0], Cell::Text("s1".to_string()));
        assert_eq!(rows[2].1[3], Cell::Empty);
    }

    fn write_workbook(path: &Path) {
        let mut workbook = Workbook::new();

        let notes = workbook.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write_string(0, 0, "prepared by the core facility").unwrap();

        let layout = workbook.add_worksheet();
        layout.set_name("Layout").unwrap();
        layout.write_string(2, 0, "ID").unwrap();
        layout.write_string(2, 1, "plate").unwrap();
        layout.write_string(2, 2, "pos").unwrap();
        layout.write_string(2, 3, "checked").unwrap();
        layout.write_string(2, 4, "prepared").unwrap();
        layout.write_string(3, 0, "s1").unwrap();
        layout.write_string(3, 1, "R01").unwrap();
        layout.write_number(3, 2, 10).unwrap();
        layout.write_boolean(3, 3, true).unwrap();
        let date = ExcelDateTime::from_ymd(2024, 1, 15).unwrap();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        layout
            .write_datetime_with_format(3, 4, &date, &date_format)
            .unwrap();

        workbook.save(path).unwrap();
    }

    #[test]
    fn load_reads_the_named_workbook_sheet_with_sheet_row_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.xlsx");
        write_workbook(&path);

        let sheet = Sheet::load(&path, Some("layout")).unwrap();
        assert_eq!(sheet.name(), "Layout");
        let rows: Vec<(usize, &[Cell])> = sheet.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 3);
        assert_eq!(rows[0].1[0], Cell::Text("ID".to_string()));
        assert_eq!(rows[1].0, 4);
        assert_eq!(rows[1].1[0], Cell::Text("s1".to_string()));
        assert_eq!(rows[1].1[2], Cell::Number(10.0));
        assert_eq!(rows[1].1[2].as_text(), Some("10".to_string()));
        assert_eq!(rows[1].1[3], Cell::Bool(true));
        assert_eq!(rows[1].1[4], Cell::Number(45306.0));
    }

    #[test]
    fn workbook_defaults_to_the_first_sheet_and_rejects_unknown_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layout.xlsx");
        write_workbook(&path);

        let sheet = Sheet::load(&path, None).unwrap();
        assert_eq!(sheet.name(), "Notes");
        assert_eq!(sheet.rows().next().map(|(row, _)| row), Some(1));

        let err = Sheet::load(&path, Some("Plates")).unwrap_err();
        assert!(matches!(err, SheetError::SheetNotFound { ref sheet, .. } if sheet == "Plates"));
    }

    #[test]
    fn load_rejects_unknown_extensions_and_missing_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Sheet::load(&dir.path().join("layout.json"), None),
            Err(SheetError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            Sheet::load(&dir.path().join("missing.csv"), None),
            Err(SheetError::Io { .. })
        ));
        assert!(matches!(
            Sheet::load(&dir.path().join("missing.xls"), None),
            Err(SheetError::Workbook { .. })
        ));
    }

    #[test]
    fn tab_separated_text_is_supported() {
        let sheet = Sheet::read_delimited("t", "a\tb\n1\t2\n".as_bytes(), b'\t').unwrap();
        assert_eq!(sheet.row_count(), 2);
    }

    #[test]
    fn invalid_rows_error_lists_every_problem() {
        let err = SheetError::InvalidRows {
            errors: vec![
                CellError {
                    row: 4,
                    column: Some("volume".to_string()),
                    message: "'x' is not a number".to_string(),
                },
                CellError {
                    row: 7,
                    column: None,
                    message: "value outside the header".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 invalid row(s)"));
        assert!(text.contains("row 4, column 'volume'"));
        assert!(text.contains("row 7: value outside the header"));
    }
}
