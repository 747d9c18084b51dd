use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    Io,
    InvalidArgument,
    SourceMissing,
    LibraryNotFound,
    LibraryLoad,
    ModelLoad,
    UnsupportedSchema,
    /// No candidate accessor matched a required role.
    NoAccessor,
    EmptySource,
    NoFreeDestination,
    /// The in-memory mutation happened but nothing was durably written.
    PersistenceFailed,
    UnsupportedOperation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::new(CoreErrorCode::Io, format!("{context}: {err}"))
    }
}
