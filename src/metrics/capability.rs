use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable, case-insensitive identity of an analyzer implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct AnalyzerId(String);

impl AnalyzerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnalyzerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AnalyzerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<AnalyzerId> for String {
    fn from(id: AnalyzerId) -> Self {
        id.0
    }
}

/// Marker describing what an analyzer produces or needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Root of the hierarchy; every other tag descends from it.
    Analyzer,
    NodeAware,
    ProjectAware,
    Aggregate,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Analyzer,
        Capability::NodeAware,
        Capability::ProjectAware,
        Capability::Aggregate,
    ];

    pub fn parent(self) -> Option<Capability> {
        match self {
            Capability::Analyzer => None,
            _ => Some(Capability::Analyzer),
        }
    }

    /// True if `self` is `other` or descends from it.
    pub fn is_a(self, other: Capability) -> bool {
        let mut current = Some(self);
        while let Some(tag) = current {
            if tag == other {
                return true;
            }
            current = tag.parent();
        }
        false
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::Analyzer => "analyzer",
            Capability::NodeAware => "node-aware",
            Capability::ProjectAware => "project-aware",
            Capability::Aggregate => "aggregate",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Capability::Analyzer => 1,
            Capability::NodeAware => 1 << 1,
            Capability::ProjectAware => 1 << 2,
            Capability::Aggregate => 1 << 3,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "analyzer" => Ok(Capability::Analyzer),
            "node-aware" | "per-node" | "node" => Ok(Capability::NodeAware),
            "project-aware" | "per-project" | "project" => Ok(Capability::ProjectAware),
            "aggregate" => Ok(Capability::Aggregate),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

/// Set of capability tags, stored as a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(tags: &[Capability]) -> Self {
        tags.iter().fold(Self::empty(), |set, tag| set.with(*tag))
    }

    pub fn with(mut self, tag: Capability) -> Self {
        self.insert(tag);
        self
    }

    pub fn insert(&mut self, tag: Capability) {
        self.0 |= tag.bit();
    }

    pub fn contains(&self, tag: Capability) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn intersects(&self, other: CapabilitySet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        let set = *self;
        Capability::ALL.into_iter().filter(move |tag| set.contains(*tag))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, tag| set.with(tag))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Capability::name).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// What a caller asks for: a capability tag or one concrete implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Capability(Capability),
    Implementation(AnalyzerId),
}

impl Selector {
    /// Capability names win; any other string names an implementation.
    pub fn parse(s: &str) -> Self {
        match s.parse::<Capability>() {
            Ok(tag) => Selector::Capability(tag),
            Err(_) => Selector::Implementation(AnalyzerId::new(s)),
        }
    }
}

impl From<Capability> for Selector {
    fn from(tag: Capability) -> Self {
        Selector::Capability(tag)
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Capability(tag) => write!(f, "{}", tag),
            Selector::Implementation(id) => write!(f, "{}", id),
        }
    }
}

/// Does the implementation `id` with `capabilities` satisfy `selector`?
///
/// Matches on identity, on a declared tag, or on a declared tag descending
/// from the requested one.
pub fn satisfies(id: &AnalyzerId, capabilities: CapabilitySet, selector: &Selector) -> bool {
    match selector {
        Selector::Implementation(wanted) => wanted == id,
        Selector::Capability(wanted) => capabilities.iter().any(|tag| tag.is_a(*wanted)),
    }
}

pub fn satisfies_any(id: &AnalyzerId, capabilities: CapabilitySet, selectors: &[Selector]) -> bool {
    selectors
        .iter()
        .any(|selector| satisfies(id, capabilities, selector))
}
