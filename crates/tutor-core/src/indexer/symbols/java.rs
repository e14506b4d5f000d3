//! Java symbol extraction.

use tree_sitter::Node;

use super::{
    cyclomatic, leading_comment, line_end, line_start, named_children, node_text,
    ComplexityRules,
};
use crate::indexer::parser::ParseResult;
use crate::models::{ClassInfo, FunctionInfo, ImportInfo, SymbolInfo};

const RULES: ComplexityRules = ComplexityRules {
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "enhanced_for_statement",
        "while_statement",
        "do_statement",
        "catch_clause",
        "ternary_expression",
        "switch_label",
    ],
    binary_kind: "binary_expression",
    short_circuit_operators: &["&&", "||"],
    nested_scopes: &["lambda_expression", "class_body", "method_declaration"],
};

const COMMENT_KINDS: &[&str] = &["block_comment", "line_comment", "comment"];

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

pub fn extract(parsed: &ParseResult) -> SymbolInfo {
    let source = parsed.source_bytes();
    let mut info = SymbolInfo::default();

    for node in named_children(parsed.root_node()) {
        let kind = node.kind();
        if kind == "import_declaration" {
            info.imports.push(import(node, source));
        } else if TYPE_DECLARATIONS.contains(&kind) {
            let class = type_declaration(node, source);
            if modifiers_text(node, source).contains("public") {
                info.exports.push(class.name.clone());
            }
            info.classes.push(class);
        }
    }
    info
}

fn modifiers(node: Node<'_>) -> Option<Node<'_>> {
    named_children(node)
        .into_iter()
        .find(|c| c.kind() == "modifiers")
}

fn modifiers_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    modifiers(node).map(|m| node_text(m, source)).unwrap_or("")
}

fn annotations(node: Node<'_>, source: &[u8]) -> Vec<String> {
    modifiers(node)
        .map(|m| {
            named_children(m)
                .into_iter()
                .filter(|c| matches!(c.kind(), "marker_annotation" | "annotation"))
                .map(|c| node_text(c, source).trim_start_matches('@').to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn import(node: Node<'_>, source: &[u8]) -> ImportInfo {
    let mut module = named_children(node)
        .into_iter()
        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
        .map(|c| node_text(c, source).to_string())
        .unwrap_or_default();
    let wildcard = named_children(node).iter().any(|c| c.kind() == "asterisk");
    if wildcard {
        module.push_str(".*");
    }
    let symbol = module.rsplit('.').next().unwrap_or_default().to_string();
    ImportInfo {
        module,
        symbols: vec![symbol],
        is_relative: false,
        line_number: line_start(node),
    }
}

fn type_declaration(node: Node<'_>, source: &[u8]) -> ClassInfo {
    let mut base_classes = Vec::new();
    if let Some(superclass) = node.child_by_field_name("superclass") {
        for t in named_children(superclass) {
            base_classes.push(node_text(t, source).to_string());
        }
    }
    let interface_lists = ["interfaces", "extends_interfaces"];
    for child in named_children(node) {
        if child.kind() == "super_interfaces" || interface_lists.contains(&child.kind()) {
            for list in named_children(child) {
                for t in named_children(list) {
                    base_classes.push(node_text(t, source).to_string());
                }
            }
        }
    }

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(body) {
            if matches!(member.kind(), "method_declaration" | "constructor_declaration") {
                methods.push(method(member, source));
            }
        }
    }

    ClassInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        methods,
        base_classes,
        docstring: leading_comment(node, source, COMMENT_KINDS),
        decorators: annotations(node, source),
        line_start: line_start(node),
        line_end: line_end(node),
    }
}

fn method(node: Node<'_>, source: &[u8]) -> FunctionInfo {
    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| {
            named_children(params)
                .into_iter()
                .filter_map(|p| match p.kind() {
                    "formal_parameter" => p
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source).to_string()),
                    "spread_parameter" => named_children(p)
                        .into_iter()
                        .find(|c| c.kind() == "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"))
                        .map(|n| node_text(n, source).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    FunctionInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        parameters,
        return_type: node
            .child_by_field_name("type")
            .map(|t| node_text(t, source).to_string()),
        docstring: leading_comment(node, source, COMMENT_KINDS),
        line_start: line_start(node),
        line_end: line_end(node),
        complexity: cyclomatic(node.child_by_field_name("body"), source, &RULES),
        is_async: false,
        decorators: annotations(node, source),
    }
}

#[cfg(test)]
mod tests {
    use crate::indexer::parser::ParserRegistry;
    use crate::models::SymbolInfo;

    fn extract(src: &str) -> SymbolInfo {
        let registry = ParserRegistry::with_default_grammars();
        let parsed = registry
            .parse("src/main/java/com/example/App.java", src.as_bytes())
            .unwrap();
        registry.extract(&parsed).unwrap()
    }

    #[test]
    fn test_imports_and_wildcards() {
        let info = extract(
            "package com.example;\n\nimport java.util.List;\nimport com.example.util.*;\n\npublic class App {}\n",
        );
        assert_eq!(info.imports.len(), 2);
        assert_eq!(info.imports[0].module, "java.util.List");
        assert_eq!(info.imports[0].symbols, vec!["List"]);
        assert_eq!(info.imports[0].line_number, 3);
        assert_eq!(info.imports[1].module, "com.example.util.*");
        assert_eq!(info.exports, vec!["App"]);
    }

    #[test]
    fn test_class_methods_and_complexity() {
        let info = extract(
            "public class Service extends Base implements Runnable {\n    /** Runs it. */\n    @Override\n    public void run() {\n        for (int i = 0; i < 3; i++) {\n            if (i > 1 && ready) { work(); }\n        }\n    }\n\n    private String name(String first, int count) {\n        return first;\n    }\n}\n",
        );
        assert_eq!(info.classes.len(), 1);
        let c = &info.classes[0];
        assert_eq!(c.name, "Service");
        assert_eq!(c.base_classes, vec!["Base", "Runnable"]);
        assert_eq!(c.methods.len(), 2);
        let run = &c.methods[0];
        assert_eq!(run.name, "run");
        assert_eq!(run.decorators, vec!["Override"]);
        assert_eq!(run.docstring.as_deref(), Some("Runs it."));
        assert_eq!(run.return_type.as_deref(), Some("void"));
        // 1 + for + if + &&
        assert_eq!(run.complexity, 4);
        let name = &c.methods[1];
        assert_eq!(name.parameters, vec!["first", "count"]);
        assert_eq!(name.return_type.as_deref(), Some("String"));
    }

    #[test]
    fn test_package_private_class_not_exported() {
        let info = extract("class Hidden {\n    void go() {}\n}\n");
        assert_eq!(info.classes.len(), 1);
        assert!(info.exports.is_empty());
    }
}
