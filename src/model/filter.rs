/// Excludes packages whose name matches one of a set of patterns.
///
/// A `*` in a pattern matches any run of characters, including the package
/// separators (`::`, `.`), so `app.*` hides `app.db` and `app.db.models`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    patterns: Vec<String>,
}

impl PackageFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn accept(&self, package: &str) -> bool {
        !self
            .patterns
            .iter()
            .any(|pattern| wildcard_match(pattern, package))
    }
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    match pattern.find('*') {
        None => pattern == name,
        Some(pos) => {
            let prefix = &pattern[..pos];
            let rest = &pattern[pos + 1..];

            if !name.starts_with(prefix) {
                return false;
            }
            let remaining = &name[prefix.len()..];

            if rest.is_empty() {
                return true;
            }
            remaining
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(remaining.len()))
                .any(|i| wildcard_match(rest, &remaining[i..]))
        }
    }
}
