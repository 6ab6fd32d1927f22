use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CovgateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: StoreError },

    #[error("malformed coverage profile: {0}")]
    MalformedProfile(String),

    #[error("no healthy build found for job '{job}' among {candidates} candidates")]
    NoHealthyBuild { job: String, candidates: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CovgateError>;
