use crate::define_parser;
use crate::model::{CodeModel, FileId, GLOBAL_PACKAGE, Language, ModelError, NodeId, TypeKind};
use crate::parser::common::{field_text, span_of};
use crate::parser::{LanguageParser, ParseError, SourceUnit};
use std::path::Path;
use tree_sitter::Node;

define_parser!(RUST_PARSER, tree_sitter_rust::LANGUAGE);

pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }
}

struct Builder<'a> {
    model: &'a mut CodeModel,
    file: FileId,
    path: &'a Path,
    source: &'a [u8],
}

impl Builder<'_> {
    fn attach(&mut self, container: NodeId, child: NodeId) -> Result<(), ParseError> {
        self.model
            .add_child(container, child)
            .map_err(|source: ModelError| ParseError::Model {
                path: self.path.to_path_buf(),
                source,
            })
    }

    fn function(&mut self, node: &Node, container: NodeId) -> Result<(), ParseError> {
        if let Some(name) = field_text(node, "name", self.source) {
            let function = self.model.create_function(name, Some(self.file), span_of(node));
            self.attach(container, function)?;
        }
        Ok(())
    }

    /// Finds the named type in `package`, creating a class when an `impl`
    /// block comes before (or without) its declaration.
    fn type_in(&mut self, package: NodeId, name: &str, kind: TypeKind, node: &Node) -> Result<NodeId, ParseError> {
        if let Some(existing) = self.model.find_type(package, name) {
            return Ok(existing);
        }
        let ty = self.model.create_type(name, kind, Some(self.file), span_of(node));
        self.attach(package, ty)?;
        Ok(ty)
    }

    fn declare_type(&mut self, node: &Node, package: NodeId, kind: TypeKind) -> Result<Option<NodeId>, ParseError> {
        let Some(name) = field_text(node, "name", self.source) else {
            return Ok(None);
        };
        let ty = self.type_in(package, name, kind, node)?;
        // A type first seen through an impl block gets its declaration span.
        self.model.set_span(ty, Some(self.file), span_of(node));
        Ok(Some(ty))
    }

    fn methods(&mut self, body: &Node, ty: NodeId) -> Result<(), ParseError> {
        let mut cursor = body.walk();
        for item in body.children(&mut cursor) {
            match item.kind() {
                "function_item" | "function_signature_item" => self.function(&item, ty)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn items(&mut self, parent: &Node, package: NodeId) -> Result<(), ParseError> {
        let mut cursor = parent.walk();

        for node in parent.children(&mut cursor) {
            match node.kind() {
                "function_item" => self.function(&node, package)?,
                "struct_item" | "enum_item" | "union_item" => {
                    self.declare_type(&node, package, TypeKind::Class)?;
                }
                "trait_item" => {
                    if let Some(ty) = self.declare_type(&node, package, TypeKind::Interface)? {
                        if let Some(body) = node.child_by_field_name("body") {
                            self.methods(&body, ty)?;
                        }
                    }
                }
                "impl_item" => {
                    let name = node
                        .child_by_field_name("type")
                        .and_then(|t| base_type_name(&t, self.source));
                    let (Some(name), Some(body)) = (name, node.child_by_field_name("body")) else {
                        continue;
                    };
                    let ty = self.type_in(package, &name, TypeKind::Class, &node)?;
                    self.methods(&body, ty)?;
                }
                "mod_item" => {
                    // Only inline modules; `mod foo;` is a separate file.
                    let (Some(name), Some(body)) = (
                        field_text(&node, "name", self.source),
                        node.child_by_field_name("body"),
                    ) else {
                        continue;
                    };
                    let outer = &self.model.entity(package).name;
                    let nested = if outer == GLOBAL_PACKAGE {
                        name.to_string()
                    } else {
                        format!("{}::{}", outer, name)
                    };
                    let inner = self.model.package(&nested);
                    self.items(&body, inner)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// `Foo` for `Foo`, `Foo<T>`, `a::b::Foo` and `&Foo`.
fn base_type_name(node: &Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "generic_type" | "reference_type" | "pointer_type" => {
            base_type_name(&node.child_by_field_name("type")?, source)
        }
        "scoped_type_identifier" => field_text(node, "name", source).map(str::to_string),
        _ => node.utf8_text(source).ok().map(str::to_string),
    }
}

impl LanguageParser for RustParser {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn package_separator(&self) -> &str {
        "::"
    }

    fn parse(&self, unit: &SourceUnit, source: &str, model: &mut CodeModel) -> Result<(), ParseError> {
        let tree = RUST_PARSER
            .with(|parser| parser.borrow_mut().parse(source, None))
            .ok_or_else(|| ParseError::Parse(unit.path.clone()))?;

        let file = model.add_file(unit.path.clone(), Language::Rust, source.to_string());
        let package = model.package(&self.package_name(unit));
        let mut builder = Builder {
            model,
            file,
            path: &unit.path,
            source: source.as_bytes(),
        };
        builder.items(&tree.root_node(), package)
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Span};
    use indoc::indoc;
    use std::path::PathBuf;

    fn parse(relative: &str, source: &str) -> CodeModel {
        let mut model = CodeModel::new();
        let unit = SourceUnit::new(PathBuf::from("/src").join(relative), PathBuf::from("/src"));
        RustParser::new().parse(&unit, source, &mut model).unwrap();
        model
    }

    fn names(model: &CodeModel, ids: impl Iterator<Item = NodeId>) -> Vec<String> {
        ids.map(|id| model.entity(id).name.clone()).collect()
    }

    #[test]
    fn test_maps_items_to_model() {
        let model = parse(
            "app/core/service.rs",
            indoc! {"
                pub trait Store {
                    fn load(&self) -> u32;
                    fn save(&mut self) {}
                }

                impl Service {
                    pub fn run(&self) {}
                }

                pub struct Service {
                    size: u32,
                }

                impl Store for Service {
                    fn load(&self) -> u32 { 1 }
                    fn save(&mut self) {}
                }

                enum Mode { A, B }

                pub fn start() {}
            "},
        );

        let package = model.find_package("app::core").unwrap();
        assert_eq!(names(&model, model.types(package)), vec!["Store", "Service", "Mode"]);
        assert_eq!(names(&model, model.functions(package)), vec!["start"]);

        let store = model.find_type(package, "Store").unwrap();
        assert_eq!(model.entity(store).kind, EntityKind::Type(TypeKind::Interface));
        assert_eq!(names(&model, model.functions(store)), vec!["load", "save"]);

        let service = model.find_type(package, "Service").unwrap();
        assert_eq!(names(&model, model.functions(service)), vec!["run", "load", "save"]);
        assert_eq!(model.entity(service).span, Span::new(10, 12));
    }

    #[test]
    fn test_generic_and_scoped_impl_targets() {
        let model = parse(
            "lib.rs",
            indoc! {"
                impl<T> Wrapper<T> {
                    fn get(&self) -> &T { &self.0 }
                }
                impl std::fmt::Display for crate::Name {
                    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result { Ok(()) }
                }
            "},
        );

        let package = model.find_package(GLOBAL_PACKAGE).unwrap();
        assert_eq!(names(&model, model.types(package)), vec!["Wrapper", "Name"]);
    }

    #[test]
    fn test_inline_modules_become_nested_packages() {
        let model = parse(
            "net/mod.rs",
            indoc! {"
                fn outer() {}
                mod tcp {
                    pub fn connect() {}
                    mod tls {
                        pub struct Session;
                    }
                }
                mod udp;
            "},
        );

        let tcp = model.find_package("net::tcp").unwrap();
        assert_eq!(names(&model, model.functions(tcp)), vec!["connect"]);
        let tls = model.find_package("net::tcp::tls").unwrap();
        assert_eq!(model.type_count(tls), 1);
        assert!(model.find_package("net::udp").is_none());
        assert_eq!(model.files().count(), 1);
    }
}
