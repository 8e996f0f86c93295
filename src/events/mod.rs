//! Phase notifications for parse, analyze and log.

mod printer;

pub use printer::ResultPrinter;

use crate::metrics::{AnalyzerId, ExecutionPlan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Listener '{listener}' failed: {message}")]
pub struct ObserverError {
    pub listener: String,
    pub message: String,
}

impl ObserverError {
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

/// Hooks fired at every phase boundary of a run.
///
/// All hooks default to doing nothing. Returning an error aborts the run.
pub trait ProcessListener: Send {
    fn name(&self) -> &str;

    fn start_parse(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }

    fn start_file(&mut self, _path: &Path) -> Result<(), ObserverError> {
        Ok(())
    }

    fn end_file(&mut self, _path: &Path) -> Result<(), ObserverError> {
        Ok(())
    }

    fn end_parse(&mut self, _files: usize) -> Result<(), ObserverError> {
        Ok(())
    }

    fn start_analyze(&mut self, _plan: &ExecutionPlan) -> Result<(), ObserverError> {
        Ok(())
    }

    fn start_analyzer(&mut self, _analyzer: &AnalyzerId) -> Result<(), ObserverError> {
        Ok(())
    }

    fn end_analyzer(&mut self, _analyzer: &AnalyzerId) -> Result<(), ObserverError> {
        Ok(())
    }

    fn end_analyze(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }

    fn start_log(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }

    fn end_log(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Listeners notified synchronously, in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn ProcessListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn ProcessListener>) {
        tracing::debug!(listener = listener.name(), "registered listener");
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    // The first failing listener stops the notification.
    fn each<F>(&mut self, mut notify: F) -> Result<(), ObserverError>
    where
        F: FnMut(&mut dyn ProcessListener) -> Result<(), ObserverError>,
    {
        for listener in &mut self.listeners {
            notify(listener.as_mut())?;
        }
        Ok(())
    }

    pub fn start_parse(&mut self) -> Result<(), ObserverError> {
        self.each(|l| l.start_parse())
    }

    pub fn start_file(&mut self, path: &Path) -> Result<(), ObserverError> {
        self.each(|l| l.start_file(path))
    }

    pub fn end_file(&mut self, path: &Path) -> Result<(), ObserverError> {
        self.each(|l| l.end_file(path))
    }

    pub fn end_parse(&mut self, files: usize) -> Result<(), ObserverError> {
        self.each(|l| l.end_parse(files))
    }

    pub fn start_analyze(&mut self, plan: &ExecutionPlan) -> Result<(), ObserverError> {
        self.each(|l| l.start_analyze(plan))
    }

    pub fn start_analyzer(&mut self, analyzer: &AnalyzerId) -> Result<(), ObserverError> {
        self.each(|l| l.start_analyzer(analyzer))
    }

    pub fn end_analyzer(&mut self, analyzer: &AnalyzerId) -> Result<(), ObserverError> {
        self.each(|l| l.end_analyzer(analyzer))
    }

    pub fn end_analyze(&mut self) -> Result<(), ObserverError> {
        self.each(|l| l.end_analyze())
    }

    pub fn start_log(&mut self) -> Result<(), ObserverError> {
        self.each(|l| l.start_log())
    }

    pub fn end_log(&mut self) -> Result<(), ObserverError> {
        self.each(|l| l.end_log())
    }
}
