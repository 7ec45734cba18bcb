//! Application core: configuration, the dispatch loop and its reactions.
//!
//! Nothing in here knows about ratatui or crossterm; the TUI adapter drives
//! these pieces from the outer loop.

pub mod config;
pub mod dispatch;
pub mod reactions;
