use crate::model::Span;
use tree_sitter::Node;

/// 1-based inclusive line span of a syntax node.
pub fn span_of(node: &Node) -> Span {
    Span::new(node.start_position().row + 1, node.end_position().row + 1)
}

/// Text of the node's `field` child, e.g. the `name` of a declaration.
pub fn field_text<'a>(node: &Node, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field)?.utf8_text(source).ok()
}

/// Macro to define a thread-local parser with a given language.
/// Usage: `define_parser!(PARSER_NAME, language_fn)`
#[macro_export]
macro_rules! define_parser {
    ($name:ident, $language:expr) => {
        thread_local! {
            static $name: std::cell::RefCell<tree_sitter::Parser> = std::cell::RefCell::new({
                let mut parser = tree_sitter::Parser::new();
                parser.set_language(&$language.into()).expect(concat!("Failed to set ", stringify!($name), " language"));
                parser
            });
        }
    };
}
