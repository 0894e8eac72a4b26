use std::{error::Error, fmt, io};

/// Something went wrong while turning a cel-position file and a sprite
/// sheet into bank/metasprite tables.
#[derive(Debug)]
pub enum CrunchError {
    /// The cel-position file is malformed. Carries the 1-based source line.
    Parse { line: usize, message: String },
    /// A pixel could not be matched to any declared palette within tolerance,
    /// or a strip used a pixel outside its declared palette.
    Color { cel: String, message: String },
    /// A strip's source or destination rectangle doesn't fit the image, or a
    /// strip mixed pixels from more than one palette.
    Raster { cel: String, message: String },
    /// A metasprite row could not be encoded (overflow, terminator clash).
    Encode { cel: String, message: String },
    /// The bank packer could not satisfy its constraints.
    Pack { message: String },
    /// A file could not be read or written.
    Io(io::Error),
}

impl fmt::Display for CrunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrunchError::Parse { line, message } => write!(f, "line {}: {}", line, message),
            CrunchError::Color { cel, message } => write!(f, "cel '{}': {}", cel, message),
            CrunchError::Raster { cel, message } => write!(f, "cel '{}': {}", cel, message),
            CrunchError::Encode { cel, message } => write!(f, "cel '{}': {}", cel, message),
            CrunchError::Pack { message } => write!(f, "bank packing failed: {}", message),
            CrunchError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for CrunchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CrunchError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CrunchError {
    fn from(err: io::Error) -> Self {
        CrunchError::Io(err)
    }
}

impl CrunchError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        CrunchError::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn color(cel: impl Into<String>, message: impl Into<String>) -> Self {
        CrunchError::Color {
            cel: cel.into(),
            message: message.into(),
        }
    }

    pub(crate) fn raster(cel: impl Into<String>, message: impl Into<String>) -> Self {
        CrunchError::Raster {
            cel: cel.into(),
            message: message.into(),
        }
    }

    pub(crate) fn encode(cel: impl Into<String>, message: impl Into<String>) -> Self {
        CrunchError::Encode {
            cel: cel.into(),
            message: message.into(),
        }
    }

    pub(crate) fn pack(message: impl Into<String>) -> Self {
        CrunchError::Pack {
            message: message.into(),
        }
    }
}
