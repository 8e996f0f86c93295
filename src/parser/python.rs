use crate::define_parser;
use crate::model::{CodeModel, FileId, Language, NodeId, TypeKind};
use crate::parser::common::{field_text, span_of};
use crate::parser::{LanguageParser, ParseError, SourceUnit};
use std::path::Path;
use tree_sitter::Node;

define_parser!(PYTHON_PARSER, tree_sitter_python::LANGUAGE);

/// Base classes that make a class an interface.
const INTERFACE_BASES: &[&str] = &["Protocol", "ABC", "ABCMeta"];

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    /// Unwraps `@decorator` wrappers down to the decorated definition.
    fn definition<'t>(node: Node<'t>) -> Node<'t> {
        if node.kind() == "decorated_definition" {
            if let Some(inner) = node.child_by_field_name("definition") {
                return inner;
            }
        }
        node
    }

    fn is_interface(node: &Node, source_bytes: &[u8]) -> bool {
        let Some(bases) = node.child_by_field_name("superclasses") else {
            return false;
        };
        let mut cursor = bases.walk();
        let found = bases.children(&mut cursor).any(|base| {
            let text = match base.kind() {
                // metaclass=ABCMeta
                "keyword_argument" => field_text(&base, "value", source_bytes),
                _ => base.utf8_text(source_bytes).ok(),
            };
            text.map(|t| t.rsplit('.').next().unwrap_or(t))
                .map(|t| t.split('[').next().unwrap_or(t))
                .is_some_and(|t| INTERFACE_BASES.contains(&t))
        });
        found
    }
}

struct Builder<'a> {
    model: &'a mut CodeModel,
    file: FileId,
    path: &'a Path,
    source_bytes: &'a [u8],
}

impl Builder<'_> {
    fn attach(&mut self, container: NodeId, child: NodeId) -> Result<(), ParseError> {
        self.model
            .add_child(container, child)
            .map_err(|source| ParseError::Model {
                path: self.path.to_path_buf(),
                source,
            })
    }

    /// `outer` is the node whose span is recorded (the decorated wrapper
    /// when there is one).
    fn function(&mut self, outer: &Node, def: &Node, container: NodeId) -> Result<(), ParseError> {
        if let Some(name) = field_text(def, "name", self.source_bytes) {
            let function = self.model.create_function(name, Some(self.file), span_of(outer));
            self.attach(container, function)?;
        }
        Ok(())
    }

    fn class(&mut self, outer: &Node, def: &Node, package: NodeId) -> Result<(), ParseError> {
        let Some(name) = field_text(def, "name", self.source_bytes) else {
            return Ok(());
        };
        let kind = if PythonParser::is_interface(def, self.source_bytes) {
            TypeKind::Interface
        } else {
            TypeKind::Class
        };
        let ty = self.model.create_type(name, kind, Some(self.file), span_of(outer));
        self.attach(package, ty)?;

        let Some(body) = def.child_by_field_name("body") else {
            return Ok(());
        };
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            let inner = PythonParser::definition(member);
            if inner.kind() == "function_definition" {
                self.function(&member, &inner, ty)?;
            }
        }
        Ok(())
    }

    fn module(&mut self, root: &Node, package: NodeId) -> Result<(), ParseError> {
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            let def = PythonParser::definition(node);
            match def.kind() {
                "function_definition" => self.function(&node, &def, package)?,
                "class_definition" => self.class(&node, &def, package)?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl LanguageParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &[&str] {
        &["py"]
    }

    fn package_separator(&self) -> &str {
        "."
    }

    fn parse(&self, unit: &SourceUnit, source: &str, model: &mut CodeModel) -> Result<(), ParseError> {
        let tree = PYTHON_PARSER
            .with(|parser| parser.borrow_mut().parse(source, None))
            .ok_or_else(|| ParseError::Parse(unit.path.clone()))?;

        let file = model.add_file(unit.path.clone(), Language::Python, source.to_string());
        let package = model.package(&self.package_name(unit));
        let mut builder = Builder {
            model,
            file,
            path: &unit.path,
            source_bytes: source.as_bytes(),
        };
        builder.module(&tree.root_node(), package)
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}
