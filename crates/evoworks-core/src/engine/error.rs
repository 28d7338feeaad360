use thiserror::Error;

use super::config::ConfigError;
use crate::core::dialogs::DialogError;
use crate::core::io::sheet::SheetError;
use crate::core::io::worklist::WorklistError;
use crate::core::models::plate::PlateError;
use crate::core::models::sample::SampleError;

/// Stable classification of conversion failures, for front ends and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PlateNotFound,
    InvalidPosition,
    SampleValidation,
    DuplicateIdentifier,
    VolumeOverflow,
    SpreadsheetFormat,
    WorklistEncoding,
    WorklistIo,
    Config,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Plate error: {source}")]
    Plate {
        #[from]
        source: PlateError,
    },

    #[error("Sample error: {source}")]
    Sample {
        #[from]
        source: SampleError,
    },

    #[error("Spreadsheet error: {source}")]
    Sheet {
        #[from]
        source: SheetError,
    },

    #[error("Worklist error: {source}")]
    Worklist {
        #[from]
        source: WorklistError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Dialog error: {source}")]
    Dialog {
        #[from]
        source: DialogError,
    },

    #[error("Row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Conversion cancelled: {0}")]
    Cancelled(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Attaches the originating sheet row; an existing row context is kept.
    pub fn at_row(self, row: usize) -> Self {
        match self {
            EngineError::Row { .. } => self,
            other => EngineError::Row {
                row,
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Plate { source } => match source {
                PlateError::NotFound { .. } => ErrorKind::PlateNotFound,
                PlateError::InvalidPosition { .. } => ErrorKind::InvalidPosition,
                PlateError::DuplicatePlate { .. } => ErrorKind::DuplicateIdentifier,
                PlateError::InvalidFormat { .. }
                | PlateError::UnknownFormat(_)
                | PlateError::InvalidPlate(_) => ErrorKind::Config,
            },
            EngineError::Sample { source } => match source {
                SampleError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
                SampleError::VolumeOverflow { .. } => ErrorKind::VolumeOverflow,
                _ => ErrorKind::SampleValidation,
            },
            EngineError::Sheet { .. } => ErrorKind::SpreadsheetFormat,
            EngineError::Worklist { source } => match source {
                WorklistError::Encoding { .. } => ErrorKind::WorklistEncoding,
                WorklistError::Io { .. } => ErrorKind::WorklistIo,
            },
            EngineError::Config { .. } => ErrorKind::Config,
            EngineError::Dialog { .. } | EngineError::Internal(_) => ErrorKind::Internal,
            EngineError::Row { source, .. } => source.kind(),
            EngineError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::sample::ValidationCheck;

    #[test]
    fn kinds_follow_the_wrapped_error() {
        let not_found: EngineError = PlateError::NotFound { id: "P".into() }.into();
        assert_eq!(not_found.kind(), ErrorKind::PlateNotFound);

        let invalid: EngineError = SampleError::Validation {
            sample: "s".into(),
            check: ValidationCheck::InvalidPosition,
            message: "Z99".into(),
        }
        .into();
        assert_eq!(invalid.kind(), ErrorKind::SampleValidation);

        let sheet: EngineError = SheetError::MissingHeader.into();
        assert_eq!(sheet.kind(), ErrorKind::SpreadsheetFormat);
    }

    #[test]
    fn row_context_is_transparent_to_kind() {
        let err = EngineError::from(SampleError::VolumeOverflow {
            reaction: "r".into(),
            total: 30.0,
            target: 20.0,
        })
        .at_row(7)
        .at_row(9);
        assert_eq!(err.kind(), ErrorKind::VolumeOverflow);
        assert!(err.to_string().starts_with("Row 7:"));
    }
}
