use super::AnalyzerId;
use super::loader::ConstructionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Option key listing analyzer ids that opt out of a run (comma separated).
pub const DISABLED_ANALYZERS: &str = "disabled-analyzers";

/// Shared `key = value` options handed to configurable analyzers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, String>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn extend(&mut self, other: Options) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Boolean option read on behalf of `analyzer`. Unparsable values are
    /// construction errors.
    pub fn get_bool(
        &self,
        analyzer: &AnalyzerId,
        key: &str,
        default: bool,
    ) -> Result<bool, ConstructionError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConstructionError::InvalidOption {
                    analyzer: analyzer.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }

    pub fn is_disabled(&self, analyzer: &AnalyzerId) -> bool {
        self.get_list(DISABLED_ANALYZERS)
            .iter()
            .any(|id| AnalyzerId::new(id) == *analyzer)
    }

    /// Parses a `key=value` pair (clap value parser).
    pub fn parse_pair(s: &str) -> Result<(String, String), String> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty option key in '{}'", s));
        }
        Ok((key.to_string(), value.trim().to_string()))
    }
}

impl FromIterator<(String, String)> for Options {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bool() {
        let id = AnalyzerId::new("node-loc");
        let options = Options::new().with("a", "yes").with("b", "Off").with("c", "maybe");

        assert!(options.get_bool(&id, "a", false).unwrap());
        assert!(!options.get_bool(&id, "b", true).unwrap());
        assert!(options.get_bool(&id, "missing", true).unwrap());
        assert!(matches!(
            options.get_bool(&id, "c", true),
            Err(ConstructionError::InvalidOption { ref key, .. }) if key == "c"
        ));
    }

    #[test]
    fn test_is_disabled() {
        let options = Options::new().with(DISABLED_ANALYZERS, "node-loc, Method-Size");
        assert!(options.is_disabled(&AnalyzerId::new("node-loc")));
        assert!(options.is_disabled(&AnalyzerId::new("method-size")));
        assert!(!options.is_disabled(&AnalyzerId::new("node-count")));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            Options::parse_pair("node-loc.ignore-blank = true"),
            Ok(("node-loc.ignore-blank".to_string(), "true".to_string()))
        );
        assert!(Options::parse_pair("novalue").is_err());
        assert!(Options::parse_pair("=x").is_err());
    }
}
