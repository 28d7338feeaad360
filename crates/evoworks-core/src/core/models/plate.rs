use super::format::PlateFormat;
use thiserror::Error;

/// Rack type used when none is given; `%i` is replaced by the well count.
pub const DEFAULT_RACK_TYPE: &str = "%i Well Microplate";

const WELL_COUNT_PLACEHOLDER: &str = "%i";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlateError {
    #[error("Plate '{id}' is not registered")]
    NotFound { id: String },

    #[error("Plate '{id}' is already registered")]
    DuplicatePlate { id: String },

    #[error("Invalid position '{position}' for plate format '{format}': {reason}")]
    InvalidPosition {
        position: String,
        format: String,
        reason: String,
    },

    #[error("Invalid plate format '{format}': {reason}")]
    InvalidFormat { format: String, reason: String },

    #[error("Unknown plate format '{0}'")]
    UnknownFormat(String),

    #[error("Invalid plate definition: {0}")]
    InvalidPlate(String),
}

/// A physical plate (or trough, or tube rack) placed on the robot's worktable.
///
/// Plates are addressed in worklists by their rack label unless a barcode is set, in
/// which case the robot identifies the rack by barcode and rack type instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Plate {
    id: String,
    format: PlateFormat,
    barcode: Option<String>,
    rack_type: String,
}

impl Plate {
    /// Creates a label-addressed plate with the default rack type.
    ///
    /// # Errors
    ///
    /// Returns [`PlateError::InvalidPlate`] if the identifier is blank.
    pub fn new(id: impl Into<String>, format: PlateFormat) -> Result<Self, PlateError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(PlateError::InvalidPlate(
                "plate identifier must not be empty".to_string(),
            ));
        }
        let rack_type = expand_rack_type(DEFAULT_RACK_TYPE, &format);
        Ok(Self {
            id,
            format,
            barcode: None,
            rack_type,
        })
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        let barcode = barcode.into().trim().to_string();
        self.barcode = (!barcode.is_empty()).then_some(barcode);
        self
    }

    /// Sets the labware type; a `%i` in `rack_type` becomes the plate's well count.
    pub fn with_rack_type(mut self, rack_type: &str) -> Self {
        self.rack_type = expand_rack_type(rack_type, &self.format);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> &PlateFormat {
        &self.format
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn rack_type(&self) -> &str {
        &self.rack_type
    }

    pub fn by_label(&self) -> bool {
        self.barcode.is_none()
    }
}

fn expand_rack_type(template: &str, format: &PlateFormat) -> String {
    template
        .trim()
        .replace(WELL_COUNT_PLACEHOLDER, &format.well_count().to_string())
}
