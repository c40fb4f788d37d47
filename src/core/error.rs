use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    Internal,
    InvalidState,
    /// Segment build or storage write failed; prior committed state is intact
    Write,
    /// Publishing a commit failed; prior committed state is intact
    Commit,
    /// Malformed query string
    QuerySyntax { fragment: String, position: usize },
    /// Manifest or segment failed its integrity check
    CorruptIndex,
    /// Query cancelled by the caller or past its deadline
    Cancelled,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn write(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Write, context.into())
    }

    pub fn commit(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Commit, context.into())
    }

    pub fn corrupt(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::CorruptIndex, context.into())
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context.into())
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidState, context.into())
    }

    pub fn query_syntax(message: impl Into<String>, fragment: impl Into<String>, position: usize) -> Self {
        Error::new(
            ErrorKind::QuerySyntax { fragment: fragment.into(), position },
            message.into(),
        )
    }

    pub fn is_query_syntax(&self) -> bool {
        matches!(self.kind, ErrorKind::QuerySyntax { .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_corrupt(&self) -> bool {
        self.kind == ErrorKind::CorruptIndex
    }

    /// Write and commit failures leave the index at its last committed state
    pub fn is_write_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Write | ErrorKind::Commit)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Re-tag an I/O failure that happened while writing
    pub(crate) fn into_write(self) -> Self {
        match self.kind {
            ErrorKind::Io | ErrorKind::Parse | ErrorKind::Internal => Error::write(self.context),
            _ => self,
        }
    }

    pub(crate) fn into_commit(self) -> Self {
        match self.kind {
            ErrorKind::Io | ErrorKind::Parse | ErrorKind::Internal => Error::commit(self.context),
            _ => self,
        }
    }

    pub(crate) fn into_corrupt(self) -> Self {
        match self.kind {
            ErrorKind::Parse | ErrorKind::Internal => Error::corrupt(self.context),
            _ => self,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::QuerySyntax { fragment, position } => write!(
                f,
                "QuerySyntax: {} at position {} near '{}'",
                self.context, position, fragment
            ),
            kind => write!(f, "{:?}: {}", kind, self.context),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error {
            kind: ErrorKind::Internal,
            context: format!("FST error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
