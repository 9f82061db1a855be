//! Per-batch failure collection

use crate::error::{Result, SyncError};

/// Failures contained during one update batch
///
/// Dispatch loops push into the report instead of returning early, so one
/// failing plugin, component or mesh never stops its siblings.
#[derive(Debug, Default)]
pub struct BatchReport {
    errors: Vec<SyncError>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SyncError) {
        self.errors.push(error);
    }

    /// Keep the value of a successful result, recording a failure
    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }

    /// Count failures matching a predicate
    pub fn count(&self, predicate: impl Fn(&SyncError) -> bool) -> usize {
        self.errors.iter().filter(|e| predicate(e)).count()
    }

    /// Take the collected failures, leaving the report empty
    pub fn take(&mut self) -> BatchReport {
        std::mem::take(self)
    }

    /// Log every failure
    pub fn log(&self) {
        for error in &self.errors {
            log::error!("{}", error);
        }
    }
}
