use std::path::PathBuf;

/// A dialect parser failure, positioned in the style file.
///
/// Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file}:{line}:{column}: {reason}")]
pub struct StyleParseError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub reason: String,
}

impl StyleParseError {
    pub fn new(file: impl Into<String>, line: u32, column: u32, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            reason: reason.into(),
        }
    }

    /// An error without a usable position, reported at the start of the file.
    pub fn unpositioned(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(file, 1, 1, reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    StyleParse(#[from] StyleParseError),

    #[error("Failed to resolve CSS module {0}")]
    VirtualModuleNotFound(String),

    #[error("Failed to parse component {id}: {message}")]
    ComponentParse { id: String, message: String },

    #[error("Failed to emit source map: {0}")]
    SourceMap(#[from] sourcemap::Error),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PluginError::Configuration(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PluginError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
