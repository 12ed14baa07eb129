//! Error taxonomy for Timely
//!
//! Every operation failure maps to one of these variants. None of them is
//! fatal: the controller turns each into a user-visible message.

use thiserror::Error;

use crate::identity::AuthError;
use crate::store::StoreError;
use crate::suggest::SuggestError;

/// Timely error
#[derive(Debug, Error)]
pub enum Error {
    /// Sign-in or sign-out failed
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The document store could not be read
    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// A write against the document store failed
    #[error("store write failed: {0}")]
    StoreWriteError(StoreError),

    /// A mutation would break `attended <= total`
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Suggestion requested with no subjects
    #[error("no subjects to send for a suggestion")]
    EmptyLedger,

    /// The recommendation service could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The recommendation service answered with something unreadable
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Mutation issued with no signed-in user
    #[error("no active user")]
    NoActiveUser,

    /// Mutation issued while the signed-in user's subjects failed to load
    #[error("subjects not loaded; sign in again to retry")]
    NotLoaded,

    /// Mutation names a subject the ledger does not hold
    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SuggestError> for Error {
    fn from(e: SuggestError) -> Self {
        match e {
            SuggestError::Transport(msg) => Error::Transport(msg),
            SuggestError::Malformed(msg) => Error::MalformedResponse(msg),
        }
    }
}

/// Result type for Timely operations
pub type Result<T> = std::result::Result<T, Error>;
