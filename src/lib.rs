//! Perch: a terminal team-chat client.
//!
//! The remote service's state (channels, users, messages) is mirrored into a
//! local SQLite store; a change-capture hook and a deferred dispatch loop
//! keep the display and the outbound socket in sync with that store.

use std::fmt;

pub mod core;
pub mod net;
pub mod store;
pub mod tui;

#[cfg(test)]
pub mod test_support;

/// Top-level application error.
///
/// Storage errors are fatal by policy: the event loop propagates them here
/// and the process exits after restoring the terminal.
#[derive(Debug)]
pub enum AppError {
    Store(store::StoreError),
    Terminal(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Store(e) => write!(f, "storage failure: {e}"),
            AppError::Terminal(e) => write!(f, "terminal failure: {e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<store::StoreError> for AppError {
    fn from(e: store::StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Terminal(e)
    }
}
