mod common;
mod discovery;
mod python;
mod rust;

use crate::model::{CodeModel, GLOBAL_PACKAGE, Language, ModelError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use common::{field_text, span_of};
pub use discovery::{DEFAULT_EXCLUDE_DIRS, DEFAULT_EXTENSIONS, SourceDiscovery, SourceUnit};
pub use python::PythonParser;
pub use rust::RustParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse: {0}")]
    Parse(PathBuf),
    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(PathBuf),
    #[error("Failed to build model from {path}: {source}")]
    Model { path: PathBuf, source: ModelError },
}

/// Turns one source file into packages, types and functions.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> Language;

    fn extensions(&self) -> &[&str];

    /// Joins directory segments into a package name.
    fn package_separator(&self) -> &str;

    fn parse(&self, unit: &SourceUnit, source: &str, model: &mut CodeModel)
    -> Result<(), ParseError>;

    fn package_name(&self, unit: &SourceUnit) -> String {
        let segments = unit.package_segments();
        if segments.is_empty() {
            GLOBAL_PACKAGE.to_string()
        } else {
            segments.join(self.package_separator())
        }
    }
}

pub struct ParserRegistry {
    parsers: Vec<Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: vec![Box::new(RustParser::new()), Box::new(PythonParser::new())],
        }
    }

    pub fn find_parser(&self, path: &Path) -> Option<&dyn LanguageParser> {
        let ext = path.extension()?.to_str()?;
        self.parsers
            .iter()
            .find(|p| p.extensions().contains(&ext))
            .map(|p| p.as_ref())
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    /// Reads `unit` from disk and adds its declarations to `model`.
    pub fn parse_unit(&self, unit: &SourceUnit, model: &mut CodeModel) -> Result<(), ParseError> {
        let parser = self
            .find_parser(&unit.path)
            .ok_or_else(|| ParseError::UnsupportedLanguage(unit.path.clone()))?;
        let source = std::fs::read_to_string(&unit.path).map_err(|source| ParseError::Io {
            path: unit.path.clone(),
            source,
        })?;
        parser.parse(unit, &source, model)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
