//! Database error taxonomy.
//!
//! Driver failures are classified once, at the data-access boundary, into
//! [`DbErrorKind`]. `?` on a `sqlx::Error` inside a function returning
//! [`DbError`] applies [`map_error`] automatically. Errors the table does
//! not recognise (I/O, pool timeouts, unknown SQLSTATEs) are kept as
//! [`DbError::Unmapped`] so callers can still inspect the original.

use std::fmt;

use keycard_core::ApiError;
use thiserror::Error;

/// PostgreSQL SQLSTATE codes the mapper recognises.
pub mod sqlstate {
    /// `unique_violation`
    pub const UNIQUE_VIOLATION: &str = "23505";
    /// `foreign_key_violation`
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    /// `serialization_failure`
    pub const SERIALIZATION_FAILURE: &str = "40001";
    /// `check_violation`
    pub const CHECK_VIOLATION: &str = "23514";
    /// `not_null_violation`
    pub const NOT_NULL_VIOLATION: &str = "23502";
    /// `exclusion_violation`
    pub const EXCLUSION_VIOLATION: &str = "23P01";
    /// `deadlock_detected`
    pub const DEADLOCK_DETECTED: &str = "40P01";
    /// `invalid_text_representation`
    pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
    /// `numeric_value_out_of_range`
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
    /// `string_data_right_truncation`
    pub const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
}

/// Semantic classification of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbErrorKind {
    /// The query returned no rows.
    NotFound,
    /// An optimistic update matched no row.
    EditConflict,
    /// A foreign key constraint failed.
    ForeignKeyViolation,
    /// The caller's expected version did not match.
    VersionMismatch,
    /// A delete was blocked by dependent rows.
    HasDependents,
    /// A unique constraint failed.
    UniqueViolation,
    /// A serializable transaction could not be ordered.
    SerializationFailure,
    /// A NOT NULL constraint failed.
    NotNullViolation,
    /// A CHECK constraint failed.
    CheckViolation,
    /// An exclusion constraint failed.
    ExclusionViolation,
    /// The backend aborted the transaction to break a deadlock.
    Deadlock,
    /// A value could not be parsed by the backend.
    InvalidText,
    /// A numeric value did not fit its column.
    NumericOutOfRange,
    /// A string was too long for its column.
    StringTruncation,
}

impl DbErrorKind {
    /// Looks up a SQLSTATE code.
    #[must_use]
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        let kind = match code {
            sqlstate::UNIQUE_VIOLATION => Self::UniqueViolation,
            sqlstate::FOREIGN_KEY_VIOLATION => Self::ForeignKeyViolation,
            sqlstate::SERIALIZATION_FAILURE => Self::SerializationFailure,
            sqlstate::CHECK_VIOLATION => Self::CheckViolation,
            sqlstate::NOT_NULL_VIOLATION => Self::NotNullViolation,
            sqlstate::EXCLUSION_VIOLATION => Self::ExclusionViolation,
            sqlstate::DEADLOCK_DETECTED => Self::Deadlock,
            sqlstate::INVALID_TEXT_REPRESENTATION => Self::InvalidText,
            sqlstate::NUMERIC_VALUE_OUT_OF_RANGE => Self::NumericOutOfRange,
            sqlstate::STRING_DATA_RIGHT_TRUNCATION => Self::StringTruncation,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the fixed message for this kind.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotFound => "record not found",
            Self::EditConflict => "edit conflict",
            Self::ForeignKeyViolation => "foreign key violation",
            Self::VersionMismatch => "version of entity does not match version in database",
            Self::HasDependents => "resource has dependents",
            Self::UniqueViolation => "unique violation",
            Self::SerializationFailure => "serialization failure",
            Self::NotNullViolation => "not null violation",
            Self::CheckViolation => "check constraint violation",
            Self::ExclusionViolation => "exclusion constraint violation",
            Self::Deadlock => "deadlock detected",
            Self::InvalidText => "invalid text representation",
            Self::NumericOutOfRange => "numeric value out of range",
            Self::StringTruncation => "string data right truncation",
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A database failure after classification.
#[derive(Debug, Error)]
pub enum DbError {
    /// A failure in the closed taxonomy.
    #[error("{kind}")]
    Mapped {
        /// Semantic kind
        kind: DbErrorKind,
        /// Name of the violated constraint, when the backend reported one
        constraint: Option<String>,
        /// Driver error, absent for kinds raised by application code
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A failure the taxonomy does not cover, unchanged.
    #[error(transparent)]
    Unmapped(sqlx::Error),
}

impl DbError {
    /// Returns the semantic kind, or `None` for unmapped errors.
    #[must_use]
    pub fn kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Mapped { kind, .. } => Some(*kind),
            Self::Unmapped(_) => None,
        }
    }

    /// Whether this error is of `kind`.
    #[must_use]
    pub fn is(&self, kind: DbErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// Returns the violated constraint name, if known.
    #[must_use]
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::Mapped { constraint, .. } => constraint.as_deref(),
            Self::Unmapped(_) => None,
        }
    }

    /// Returns the driver error, if any.
    #[must_use]
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Mapped { source, .. } => source.as_ref(),
            Self::Unmapped(err) => Some(err),
        }
    }
}

impl From<DbErrorKind> for DbError {
    /// Raises a kind from application code, e.g. an update that matched
    /// no row becomes [`DbErrorKind::EditConflict`].
    fn from(kind: DbErrorKind) -> Self {
        Self::Mapped {
            kind,
            constraint: None,
            source: None,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        map_error(err)
    }
}

/// Classifies a driver error.
///
/// `RowNotFound` becomes [`DbErrorKind::NotFound`]; backend errors are
/// looked up by SQLSTATE; everything else passes through as
/// [`DbError::Unmapped`].
pub fn map_error(err: sqlx::Error) -> DbError {
    let classified = match &err {
        sqlx::Error::RowNotFound => Some((DbErrorKind::NotFound, None)),
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| DbErrorKind::from_sqlstate(&code))
            .map(|kind| (kind, db.constraint().map(str::to_string))),
        _ => None,
    };

    match classified {
        Some((kind, constraint)) => DbError::Mapped {
            kind,
            constraint,
            source: Some(err),
        },
        None => DbError::Unmapped(err),
    }
}

impl From<&DbError> for ApiError {
    fn from(err: &DbError) -> Self {
        let detail = || {
            err.constraint()
                .map_or_else(|| "unknown".to_string(), str::to_string)
        };
        match err.kind() {
            Some(DbErrorKind::NotFound) => Self::NotFound,
            Some(DbErrorKind::EditConflict) => Self::EditConflict,
            Some(DbErrorKind::VersionMismatch) => Self::VersionMismatch,
            Some(DbErrorKind::HasDependents) => Self::HasDependents,
            Some(DbErrorKind::UniqueViolation) => Self::AlreadyExists(detail()),
            Some(
                DbErrorKind::ForeignKeyViolation
                | DbErrorKind::CheckViolation
                | DbErrorKind::NotNullViolation
                | DbErrorKind::ExclusionViolation,
            ) => Self::ConstraintViolation(detail()),
            _ => Self::Internal,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::from(&err)
    }
}
