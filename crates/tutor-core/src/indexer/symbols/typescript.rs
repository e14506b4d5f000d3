//! TypeScript / JavaScript symbol extraction.

use tree_sitter::Node;

use super::{
    cyclomatic, has_token, leading_comment, line_end, line_start, named_children, node_text,
    unquote, ComplexityRules,
};
use crate::indexer::parser::ParseResult;
use crate::models::{ClassInfo, FunctionInfo, ImportInfo, SymbolInfo};

const RULES: ComplexityRules = ComplexityRules {
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    binary_kind: "binary_expression",
    short_circuit_operators: &["&&", "||", "??"],
    nested_scopes: &[
        "function_declaration",
        "function_expression",
        "generator_function_declaration",
        "arrow_function",
        "method_definition",
        "class_declaration",
        "class",
    ],
};

const COMMENT_KINDS: &[&str] = &["comment"];

pub fn extract(parsed: &ParseResult) -> SymbolInfo {
    let source = parsed.source_bytes();
    let mut info = SymbolInfo::default();
    for node in named_children(parsed.root_node()) {
        visit_top_level(node, source, &mut info, false);
    }
    info
}

fn visit_top_level(node: Node<'_>, source: &[u8], info: &mut SymbolInfo, exported: bool) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let f = function(node, node, source, Vec::new());
            if exported {
                info.exports.push(f.name.clone());
            }
            info.functions.push(f);
        }
        "class_declaration" | "abstract_class_declaration" => {
            let c = class(node, source);
            if exported {
                info.exports.push(c.name.clone());
            }
            info.classes.push(c);
        }
        "interface_declaration" => {
            let c = interface(node, source);
            if exported {
                info.exports.push(c.name.clone());
            }
            info.classes.push(c);
        }
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children(node) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let name = declarator
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                if exported && !name.is_empty() {
                    info.exports.push(name.clone());
                }
                let Some(value) = declarator.child_by_field_name("value") else {
                    continue;
                };
                if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                    let mut f = function(value, node, source, Vec::new());
                    f.name = name;
                    info.functions.push(f);
                }
            }
        }
        "export_statement" => {
            if let Some(declaration) = node.child_by_field_name("declaration") {
                visit_top_level(declaration, source, info, true);
            } else if let Some(value) = node.child_by_field_name("value") {
                // export default <expression>
                if matches!(value.kind(), "identifier") {
                    info.exports.push(node_text(value, source).to_string());
                } else {
                    info.exports.push("default".to_string());
                }
            }
            for child in named_children(node) {
                if child.kind() == "export_clause" {
                    for spec in named_children(child) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let exported_as = spec
                            .child_by_field_name("alias")
                            .or_else(|| spec.child_by_field_name("name"));
                        if let Some(n) = exported_as {
                            info.exports.push(node_text(n, source).to_string());
                        }
                    }
                }
            }
            if let Some(source_node) = node.child_by_field_name("source") {
                // export { x } from "./y" is also a dependency
                let module = unquote(node_text(source_node, source));
                info.imports.push(ImportInfo {
                    is_relative: module.starts_with('.'),
                    module,
                    symbols: Vec::new(),
                    line_number: line_start(node),
                });
            }
        }
        "import_statement" => info.imports.push(import(node, source)),
        _ => {}
    }
}

/// `node` is the function-like node; `anchor` is the statement a doc comment
/// would sit above.
fn function(node: Node<'_>, anchor: Node<'_>, source: &[u8], decorators: Vec<String>) -> FunctionInfo {
    let parameters = if let Some(params) = node.child_by_field_name("parameters") {
        parameters(params, source)
    } else if let Some(single) = node.child_by_field_name("parameter") {
        vec![node_text(single, source).to_string()]
    } else {
        Vec::new()
    };
    FunctionInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        parameters,
        return_type: node
            .child_by_field_name("return_type")
            .map(|r| type_annotation(node_text(r, source))),
        docstring: doc_comment(anchor, source),
        line_start: line_start(anchor),
        line_end: line_end(node),
        complexity: cyclomatic(Some(node), source, &RULES),
        is_async: has_token(node, "async"),
        decorators,
    }
}

fn doc_comment(anchor: Node<'_>, source: &[u8]) -> Option<String> {
    let target = match anchor.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => anchor,
    };
    leading_comment(target, source, COMMENT_KINDS)
}

fn type_annotation(raw: &str) -> String {
    raw.trim().trim_start_matches(':').trim().to_string()
}

fn parameters(params: Node<'_>, source: &[u8]) -> Vec<String> {
    named_children(params)
        .into_iter()
        .filter_map(|param| match param.kind() {
            "required_parameter" | "optional_parameter" => param
                .child_by_field_name("pattern")
                .map(|p| node_text(p, source).to_string()),
            "identifier" | "rest_pattern" | "assignment_pattern" => {
                Some(node_text(param, source).to_string())
            }
            _ => None,
        })
        .collect()
}

fn heritage(node: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "class_heritage" => {
                for clause in named_children(child) {
                    for base in named_children(clause) {
                        if base.kind() != "type_arguments" {
                            bases.push(node_text(base, source).to_string());
                        }
                    }
                }
            }
            "extends_type_clause" => {
                for base in named_children(child) {
                    bases.push(node_text(base, source).to_string());
                }
            }
            _ => {}
        }
    }
    bases
}

fn class(node: Node<'_>, source: &[u8]) -> ClassInfo {
    let decorators: Vec<String> = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "decorator")
        .map(|c| decorator_name(c, source))
        .collect();

    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut pending: Vec<String> = Vec::new();
        for member in named_children(body) {
            match member.kind() {
                "decorator" => pending.push(decorator_name(member, source)),
                "method_definition" => {
                    let mut decorators = std::mem::take(&mut pending);
                    decorators.extend(
                        named_children(member)
                            .into_iter()
                            .filter(|c| c.kind() == "decorator")
                            .map(|c| decorator_name(c, source)),
                    );
                    methods.push(function(member, member, source, decorators));
                }
                _ => pending.clear(),
            }
        }
    }

    ClassInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        methods,
        base_classes: heritage(node, source),
        docstring: doc_comment(node, source),
        decorators,
        line_start: line_start(node),
        line_end: line_end(node),
    }
}

fn interface(node: Node<'_>, source: &[u8]) -> ClassInfo {
    ClassInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        methods: Vec::new(),
        base_classes: heritage(node, source),
        docstring: doc_comment(node, source),
        decorators: Vec::new(),
        line_start: line_start(node),
        line_end: line_end(node),
    }
}

fn decorator_name(node: Node<'_>, source: &[u8]) -> String {
    node_text(node, source).trim_start_matches('@').trim().to_string()
}

fn import(node: Node<'_>, source: &[u8]) -> ImportInfo {
    let module = node
        .child_by_field_name("source")
        .map(|s| unquote(node_text(s, source)))
        .unwrap_or_default();
    let mut symbols = Vec::new();
    for child in named_children(node) {
        if child.kind() != "import_clause" {
            continue;
        }
        for part in named_children(child) {
            match part.kind() {
                "identifier" => symbols.push(node_text(part, source).to_string()),
                "namespace_import" => symbols.push("*".to_string()),
                "named_imports" => {
                    for spec in named_children(part) {
                        if spec.kind() == "import_specifier" {
                            if let Some(name) = spec.child_by_field_name("name") {
                                symbols.push(node_text(name, source).to_string());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    ImportInfo {
        is_relative: module.starts_with('.'),
        module,
        symbols,
        line_number: line_start(node),
    }
}
