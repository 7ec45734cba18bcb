//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::core::config::Config;
use crate::core::dispatch::Reaction;
use crate::net::{NetEvent, NetHandle};
use crate::store::change::ChangeRecord;
use crate::store::{Store, StoreError};

/// A net handle with no token: every spawn is a no-op, nothing needs a
/// runtime. The receiver is returned so tests can assert nothing was posted.
pub fn offline_net() -> (NetHandle, mpsc::Receiver<NetEvent>) {
    let (tx, rx) = mpsc::channel();
    (NetHandle::new(&Config::offline(), tx), rx)
}

pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub fn shared_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A reaction that records its name into the shared log on every record.
pub fn recorder(name: &'static str, log: &CallLog) -> Box<dyn Reaction> {
    struct Recorder {
        name: &'static str,
        log: CallLog,
    }
    impl Reaction for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }
        fn handle(
            &mut self,
            _store: &Store,
            _net: &mut NetHandle,
            _change: &ChangeRecord,
        ) -> Result<(), StoreError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }
    Box::new(Recorder { name, log: log.clone() })
}
