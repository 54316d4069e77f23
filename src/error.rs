use thiserror::Error;

use crate::policy::Action;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Access denied: cannot {action} key '{key}'")]
    AccessDenied { action: Action, key: String },

    #[error("Unknown policy: {0} (expected read-only, write-only, read-write or none)")]
    UnknownPolicy(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
