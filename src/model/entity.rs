use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Index of an entity inside a [`CodeModel`](super::CodeModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a parsed source file inside a [`CodeModel`](super::CodeModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub(crate) u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Package,
    Type(TypeKind),
    Function,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Package => "package",
            EntityKind::Type(TypeKind::Class) => "class",
            EntityKind::Type(TypeKind::Interface) => "interface",
            EntityKind::Function => "function",
        }
    }
}

/// Inclusive, 1-based line range of a declaration. Built only through
/// [`Span::new`], so `end_line >= start_line` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    start_line: usize,
    end_line: usize,
}

impl Span {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
        }
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn end_line(&self) -> usize {
        self.end_line
    }

    pub fn lines(&self) -> usize {
        if self.start_line == 0 {
            return 0;
        }
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub file: Option<FileId>,
    pub span: Span,
    pub(crate) owner: Option<NodeId>,
    pub(crate) types: IndexSet<NodeId>,
    pub(crate) functions: IndexSet<NodeId>,
}

impl Entity {
    pub(crate) fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            file: None,
            span: Span::default(),
            owner: None,
            types: IndexSet::new(),
            functions: IndexSet::new(),
        }
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn is_package(&self) -> bool {
        self.kind == EntityKind::Package
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, EntityKind::Type(_))
    }

    pub fn is_function(&self) -> bool {
        self.kind == EntityKind::Function
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
}

impl Language {
    /// Prefixes that start a line comment (or a comment continuation line).
    pub fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["//", "/*", "*", "*/"],
            Language::Python => &["#"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: Language,
    pub lines: usize,
    pub digest: String,
    pub text: String,
}

impl SourceFile {
    /// Lines `start..=end` (1-based) of the source text.
    pub fn span_lines(&self, span: Span) -> impl Iterator<Item = &str> {
        let skip = span.start_line().saturating_sub(1);
        self.text.lines().skip(skip).take(span.lines())
    }
}
