//! Error types for iondict.
//!
//! Engines report failures through [`Error`] and propagate them with `?`. The
//! dictionary facade folds them into a [`Status`], which pairs an [`ErrorCode`]
//! with the number of records an operation affected.

use std::fmt;
use std::io;

/// The result type used throughout iondict.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for iondict operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ========== Occupancy ==========
    /// The key is already present and the write concern forbids duplicates.
    #[error("duplicate key")]
    DuplicateKey,

    /// No record matched the key.
    #[error("item not found")]
    ItemNotFound,

    /// Every slot of a fixed-capacity structure is in use.
    #[error("maximum capacity reached")]
    MaxCapacity,

    /// An allocation required by the structure could not be made.
    #[error("out of memory")]
    OutOfMemory,

    // ========== Storage I/O ==========
    /// Writing to a backing file failed.
    #[error("file write error: {0}")]
    FileWrite(#[source] io::Error),

    /// Reading from a backing file failed.
    #[error("file read error: {0}")]
    FileRead(#[source] io::Error),

    /// A backing file could not be opened or created.
    #[error("file open error: {0}")]
    FileOpen(#[source] io::Error),

    /// Flushing or closing a backing file failed.
    #[error("file close error: {0}")]
    FileClose(#[source] io::Error),

    /// A backing file could not be removed.
    #[error("file delete error: {0}")]
    FileDelete(#[source] io::Error),

    /// Seeking inside a backing file failed.
    #[error("file seek error: {0}")]
    FileBadSeek(#[source] io::Error),

    /// A read ran past the end of a backing file.
    #[error("unexpected end of file")]
    FileHitEof,

    /// Removing the storage of a dictionary failed part way.
    #[error("dictionary destruction error: {0}")]
    DictionaryDestruction(String),

    // ========== Caller contract ==========
    /// Linear hash initial size is not a power of two of at least 2.
    #[error("invalid initial size: {0}")]
    InvalidInitialSize(usize),

    /// The dictionary or catalog is not open.
    #[error("uninitialized")]
    Uninitialized,

    /// The engine cannot honour the requested write concern.
    #[error("write concern violation")]
    WriteConcernViolation,

    /// The predicate is malformed (wrong key width, inverted range).
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    /// The engine does not implement the operation.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A dictionary with this id already exists.
    #[error("duplicate dictionary: {0}")]
    DuplicateDictionary(u32),

    /// A position or id lies outside the valid range.
    #[error("out of bounds")]
    OutOfBounds,

    /// An invalid argument was provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Format ==========
    /// Persisted bytes failed validation.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Catalog metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid predicate error.
    pub fn invalid_predicate(msg: impl Into<String>) -> Self {
        Error::InvalidPredicate(msg.into())
    }

    /// Creates a new not implemented error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Error::NotImplemented(msg.into())
    }

    /// Maps a failed read, turning a short read into [`Error::FileHitEof`].
    pub fn read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::FileHitEof
        } else {
            Error::FileRead(err)
        }
    }

    /// Returns the code reported to callers through a [`Status`].
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::DuplicateKey => ErrorCode::DuplicateKey,
            Error::ItemNotFound => ErrorCode::ItemNotFound,
            Error::MaxCapacity => ErrorCode::MaxCapacity,
            Error::OutOfMemory => ErrorCode::OutOfMemory,
            Error::FileWrite(_) => ErrorCode::FileWriteError,
            Error::FileRead(_) => ErrorCode::FileReadError,
            Error::FileOpen(_) => ErrorCode::FileOpenError,
            Error::FileClose(_) => ErrorCode::FileCloseError,
            Error::FileDelete(_) => ErrorCode::FileDeleteError,
            Error::FileBadSeek(_) => ErrorCode::FileBadSeek,
            Error::FileHitEof => ErrorCode::FileHitEof,
            Error::DictionaryDestruction(_) => ErrorCode::CollectionDestructionError,
            Error::InvalidInitialSize(_) => ErrorCode::InvalidInitialSize,
            Error::Uninitialized => ErrorCode::Uninitialized,
            Error::WriteConcernViolation => ErrorCode::WriteConcernViolation,
            Error::InvalidPredicate(_) => ErrorCode::InvalidPredicate,
            Error::NotImplemented(_) => ErrorCode::NotImplemented,
            Error::DuplicateDictionary(_) => ErrorCode::DuplicateDictionary,
            Error::OutOfBounds => ErrorCode::OutOfBounds,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::Corruption(_) => ErrorCode::Corruption,
            Error::Serialization(_) => ErrorCode::Serialization,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Closed set of codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorCode {
    Ok,
    DuplicateKey,
    ItemNotFound,
    MaxCapacity,
    OutOfMemory,
    FileWriteError,
    FileReadError,
    FileOpenError,
    FileCloseError,
    FileDeleteError,
    FileBadSeek,
    FileHitEof,
    CollectionDestructionError,
    InvalidInitialSize,
    Uninitialized,
    WriteConcernViolation,
    InvalidPredicate,
    NotImplemented,
    DuplicateDictionary,
    OutOfBounds,
    InvalidArgument,
    Corruption,
    Serialization,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a mutating dictionary operation.
///
/// `count` is the number of records the operation affected. A failed
/// operation always reports a count of zero, so a delete of an absent key
/// (`ItemNotFound`, 0) is distinguishable from a successful one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// The error code, `ErrorCode::Ok` on success.
    pub error: ErrorCode,
    /// Records inserted, updated or deleted.
    pub count: u32,
}

impl Status {
    /// A successful status affecting `count` records.
    pub fn ok(count: u32) -> Self {
        Self { error: ErrorCode::Ok, count }
    }

    /// A failed status.
    pub fn error(error: ErrorCode) -> Self {
        Self { error, count: 0 }
    }

    /// Returns true when the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.error == ErrorCode::Ok
    }
}

impl From<Result<u32>> for Status {
    fn from(result: Result<u32>) -> Self {
        match result {
            Ok(count) => Status::ok(count),
            Err(e) => Status::error(e.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad header");
        assert_eq!(err.to_string(), "data corruption: bad header");

        let err = Error::InvalidInitialSize(3);
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_short_read_maps_to_eof() {
        let err = Error::read(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(matches!(err, Error::FileHitEof));

        let err = Error::read(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.code(), ErrorCode::FileReadError);
    }

    #[test]
    fn test_every_error_has_its_own_code() {
        let io_err = || io::Error::other("io");
        let errors = vec![
            Error::DuplicateKey,
            Error::ItemNotFound,
            Error::MaxCapacity,
            Error::OutOfMemory,
            Error::FileWrite(io_err()),
            Error::FileRead(io_err()),
            Error::FileOpen(io_err()),
            Error::FileClose(io_err()),
            Error::FileDelete(io_err()),
            Error::FileBadSeek(io_err()),
            Error::FileHitEof,
            Error::DictionaryDestruction("d".into()),
            Error::InvalidInitialSize(3),
            Error::Uninitialized,
            Error::WriteConcernViolation,
            Error::invalid_predicate("p"),
            Error::not_implemented("n"),
            Error::DuplicateDictionary(1),
            Error::OutOfBounds,
            Error::invalid_argument("a"),
            Error::corruption("c"),
            Error::Serialization("s".into()),
        ];
        let codes: std::collections::HashSet<ErrorCode> = errors.iter().map(Error::code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&ErrorCode::Ok));
    }

    #[test]
    fn test_status_from_result() {
        let status: Status = Ok(3).into();
        assert!(status.is_ok());
        assert_eq!(status.count, 3);

        let status: Status = Err(Error::ItemNotFound).into();
        assert_eq!(status, Status { error: ErrorCode::ItemNotFound, count: 0 });
    }
}
