use log::*;
use tide::StatusCode;

use std::fmt;

/**
 * Everything that can go wrong while serving polls
 */
#[derive(Debug)]
pub enum PollError {
    /// The identifier does not resolve to a question
    NotFound,
    /// The submission was rejected, with a message fit for the user
    Validation(String),
    Storage(sqlx::Error),
}

pub type PollResult<T> = Result<T, PollError>;

/// A choice already holds the largest tally the `votes` column can store
pub const TALLY_FULL: &str = "This choice cannot take any more votes.";

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::NotFound => write!(f, "Question does not exist"),
            PollError::Validation(msg) => write!(f, "{}", msg),
            PollError::Storage(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for PollError {
    fn from(err: sqlx::Error) -> Self {
        PollError::Storage(err)
    }
}

impl PollError {
    pub fn tally_full() -> Self {
        PollError::Validation(TALLY_FULL.to_string())
    }

    /**
     * An edit named a choice that does not belong to the question being saved
     */
    pub fn unknown_choice(choice_id: i64) -> Self {
        PollError::Validation(format!("Choice {} is not part of this question.", choice_id))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PollError::NotFound => StatusCode::NotFound,
            PollError::Validation(_) => StatusCode::BadRequest,
            PollError::Storage(_) => StatusCode::InternalServerError,
        }
    }
}

/**
 * Convert into a tide error carrying the right status code
 *
 * tide already converts any std error with `?`, but always as a 500, so handlers map through here
 * explicitly.
 */
pub fn http_error(err: PollError) -> tide::Error {
    if let PollError::Storage(inner) = &err {
        error!("Storage failure: {:?}", inner);
        return tide::Error::from_str(StatusCode::InternalServerError, "Storage failure");
    }
    tide::Error::from_str(err.status(), err.to_string())
}
