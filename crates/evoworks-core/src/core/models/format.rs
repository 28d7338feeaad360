use super::plate::PlateError;
use serde::Deserialize;
use std::fmt;

/// Well counts of the standard SBS microplate family, all with a 3:2 column:row ratio.
pub const STANDARD_WELL_COUNTS: [usize; 9] = [1, 2, 6, 12, 24, 48, 96, 384, 1536];

const ALPHABET_LEN: usize = 26;

/// How the robot numbers the wells of a plate from 1 upwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WellOrdering {
    /// A1, B1, C1, ... then A2 (EVOware's numbering).
    #[default]
    ColumnMajor,
    /// A1, A2, A3, ... then B1.
    RowMajor,
}

/// A zero-based well coordinate on a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Well {
    pub row: usize,
    pub column: usize,
}

impl Well {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Parses a label such as `A1`, `b03` or `AF48` without checking plate bounds.
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        let split = label.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = label.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let row = parse_row_letters(letters)?;
        let column: usize = digits.parse().ok()?;
        column.checked_sub(1).map(|column| Self { row, column })
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", row_letters(self.row), self.column + 1)
    }
}

/// Physical geometry of a piece of labware.
///
/// Equality compares the geometry only; two formats registered under different
/// identifiers but with the same dimensions and ordering are interchangeable.
#[derive(Debug, Clone, Eq)]
pub struct PlateFormat {
    id: String,
    rows: usize,
    columns: usize,
    ordering: WellOrdering,
}

impl PartialEq for PlateFormat {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns && self.ordering == other.ordering
    }
}

impl PlateFormat {
    /// Creates a format with explicit dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::InvalidFormat`] if either dimension is zero.
    pub fn new(id: impl Into<String>, rows: usize, columns: usize) -> Result<Self, PlateError> {
        let id = id.into();
        if rows == 0 || columns == 0 {
            return Err(PlateError::InvalidFormat {
                format: id,
                reason: format!("{rows} x {columns} has no wells"),
            });
        }
        Ok(Self {
            id,
            rows,
            columns,
            ordering: WellOrdering::default(),
        })
    }

    /// Deduces the dimensions of a standard plate from its well count.
    ///
    /// The column count is `round(sqrt(1.5 * wells))`, which reproduces the 3:2 layout of
    /// every standard microplate. Counts that do not factor that way are rejected.
    pub fn with_wells(wells: usize) -> Result<Self, PlateError> {
        let columns = (1.5 * wells as f64).sqrt().round() as usize;
        if wells == 0 || columns == 0 || wells % columns != 0 {
            return Err(PlateError::InvalidFormat {
                format: wells.to_string(),
                reason: "well count does not describe a 3:2 plate".to_string(),
            });
        }
        Self::new(wells.to_string(), wells / columns, columns)
    }

    pub fn with_ordering(mut self, ordering: WellOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn ordering(&self) -> WellOrdering {
        self.ordering
    }

    pub fn well_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Maps a well label such as `"B3"` to its zero-based coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::InvalidPosition`] if the label is malformed or lies outside
    /// this format.
    pub fn position_to_index(&self, position: &str) -> Result<Well, PlateError> {
        let well = Well::parse_label(position)
            .ok_or_else(|| self.invalid_position(position, "not a well label"))?;
        if self.holds(well) {
            Ok(well)
        } else {
            Err(self.invalid_position(position, "outside the plate"))
        }
    }

    /// Inverse of [`position_to_index`](Self::position_to_index).
    pub fn index_to_position(&self, row: usize, column: usize) -> Result<String, PlateError> {
        let well = Well::new(row, column);
        if self.holds(well) {
            Ok(well.to_string())
        } else {
            Err(self.invalid_position(&format!("row {row}, column {column}"), "outside the plate"))
        }
    }

    pub fn contains(&self, position: &str) -> bool {
        self.position_to_index(position).is_ok()
    }

    /// Accepts either a well label or a 1-based linear well number.
    ///
    /// Spreadsheets frequently store positions as plain numbers, so `"10"` resolves to
    /// the tenth well in this format's ordering.
    pub fn parse_position(&self, text: &str) -> Result<Well, PlateError> {
        let trimmed = text.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            let linear: usize = trimmed
                .parse()
                .map_err(|_| self.invalid_position(text, "well number too large"))?;
            return self.well_at(linear);
        }
        self.position_to_index(trimmed)
    }

    /// The robot's 1-based well number for `well`.
    pub fn linear_index(&self, well: Well) -> Result<usize, PlateError> {
        if !self.holds(well) {
            return Err(self.invalid_position(&well.to_string(), "outside the plate"));
        }
        Ok(match self.ordering {
            WellOrdering::ColumnMajor => well.column * self.rows + well.row + 1,
            WellOrdering::RowMajor => well.row * self.columns + well.column + 1,
        })
    }

    /// The well carrying the 1-based number `linear`.
    pub fn well_at(&self, linear: usize) -> Result<Well, PlateError> {
        if linear == 0 || linear > self.well_count() {
            return Err(self.invalid_position(&linear.to_string(), "well number out of range"));
        }
        let index = linear - 1;
        Ok(match self.ordering {
            WellOrdering::ColumnMajor => Well::new(index % self.rows, index / self.rows),
            WellOrdering::RowMajor => Well::new(index / self.columns, index % self.columns),
        })
    }

    /// All wells in linear order.
    pub fn wells(&self) -> impl Iterator<Item = Well> + '_ {
        (1..=self.well_count()).filter_map(|n| self.well_at(n).ok())
    }

    fn holds(&self, well: Well) -> bool {
        well.row < self.rows && well.column < self.columns
    }

    fn invalid_position(&self, position: &str, reason: &str) -> PlateError {
        PlateError::InvalidPosition {
            position: position.to_string(),
            format: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} x {})", self.id, self.rows, self.columns)
    }
}

fn row_letters(mut row: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (row % ALPHABET_LEN) as u8) as char);
        if row < ALPHABET_LEN {
            break;
        }
        row = row / ALPHABET_LEN - 1;
    }
    letters.iter().rev().collect()
}

fn parse_row_letters(letters: &str) -> Option<usize> {
    let mut value: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        value = value.checked_mul(ALPHABET_LEN)?.checked_add(digit)?;
    }
    value.checked_sub(1)
}
