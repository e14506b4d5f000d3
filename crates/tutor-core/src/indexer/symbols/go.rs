//! Go symbol extraction.

use tree_sitter::Node;

use super::{
    cyclomatic, leading_comment, line_end, line_start, named_children, node_text, unquote,
    ComplexityRules,
};
use crate::indexer::parser::ParseResult;
use crate::models::{ClassInfo, FunctionInfo, ImportInfo, SymbolInfo};

const RULES: ComplexityRules = ComplexityRules {
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    binary_kind: "binary_expression",
    short_circuit_operators: &["&&", "||"],
    nested_scopes: &["func_literal"],
};

const COMMENT_KINDS: &[&str] = &["comment"];

/// Go exports by capitalization.
fn is_exported(name: &str) -> bool {
    name.starts_with(|c: char| c.is_uppercase())
}

pub fn extract(parsed: &ParseResult) -> SymbolInfo {
    let source = parsed.source_bytes();
    let mut info = SymbolInfo::default();
    let mut methods: Vec<(String, FunctionInfo)> = Vec::new();

    for node in named_children(parsed.root_node()) {
        match node.kind() {
            "import_declaration" => collect_imports(node, source, &mut info.imports),
            "function_declaration" => info.functions.push(function(node, source)),
            "method_declaration" => {
                let receiver = receiver_type(node, source);
                methods.push((receiver, function(node, source)));
            }
            "type_declaration" => {
                for spec in named_children(node) {
                    if spec.kind() != "type_spec" {
                        continue;
                    }
                    let is_type = spec
                        .child_by_field_name("type")
                        .is_some_and(|t| matches!(t.kind(), "struct_type" | "interface_type"));
                    if is_type {
                        info.classes.push(type_spec(node, spec, source));
                    }
                }
            }
            _ => {}
        }
    }

    // Attach methods to their receiver type when it is declared in this file.
    for (receiver, method) in methods {
        match info.classes.iter_mut().find(|c| c.name == receiver) {
            Some(class) => class.methods.push(method),
            None => info.functions.push(method),
        }
    }

    info.exports = info
        .functions
        .iter()
        .map(|f| f.name.clone())
        .chain(info.classes.iter().map(|c| c.name.clone()))
        .filter(|name| is_exported(name))
        .collect();
    info
}

fn collect_imports(node: Node<'_>, source: &[u8], out: &mut Vec<ImportInfo>) {
    let mut specs = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "import_spec" => specs.push(child),
            "import_spec_list" => specs.extend(
                named_children(child)
                    .into_iter()
                    .filter(|c| c.kind() == "import_spec"),
            ),
            _ => {}
        }
    }
    for spec in specs {
        let Some(path) = spec.child_by_field_name("path") else {
            continue;
        };
        let module = unquote(node_text(path, source));
        let symbols = spec
            .child_by_field_name("name")
            .map(|alias| vec![node_text(alias, source).to_string()])
            .unwrap_or_default();
        out.push(ImportInfo {
            is_relative: module.starts_with("./") || module.starts_with("../"),
            module,
            symbols,
            line_number: line_start(spec),
        });
    }
}

fn receiver_type(node: Node<'_>, source: &[u8]) -> String {
    node.child_by_field_name("receiver")
        .and_then(|list| {
            named_children(list)
                .into_iter()
                .find(|p| p.kind() == "parameter_declaration")
        })
        .and_then(|param| param.child_by_field_name("type"))
        .map(|t| {
            let text = node_text(t, source).trim_start_matches('*');
            text.split('[').next().unwrap_or(text).to_string()
        })
        .unwrap_or_default()
}

fn function(node: Node<'_>, source: &[u8]) -> FunctionInfo {
    let mut parameters = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        for param in named_children(list) {
            if !matches!(
                param.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let mut cursor = param.walk();
            for name in param.children_by_field_name("name", &mut cursor) {
                parameters.push(node_text(name, source).to_string());
            }
        }
    }

    FunctionInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        parameters,
        return_type: node
            .child_by_field_name("result")
            .map(|r| node_text(r, source).to_string()),
        docstring: leading_comment(node, source, COMMENT_KINDS),
        line_start: line_start(node),
        line_end: line_end(node),
        complexity: cyclomatic(node.child_by_field_name("body"), source, &RULES),
        is_async: false,
        decorators: Vec::new(),
    }
}

fn type_spec(declaration: Node<'_>, spec: Node<'_>, source: &[u8]) -> ClassInfo {
    // Embedded struct fields and embedded interfaces read as base types.
    let mut base_classes = Vec::new();
    if let Some(ty) = spec.child_by_field_name("type") {
        let members: Vec<Node<'_>> = named_children(ty)
            .into_iter()
            .flat_map(|child| match child.kind() {
                "field_declaration_list" => named_children(child),
                _ => vec![child],
            })
            .collect();
        for member in members {
            let embedded = match member.kind() {
                "field_declaration" => member.child_by_field_name("name").is_none(),
                "type_elem" | "constraint_elem" => true,
                _ => false,
            };
            if embedded {
                let text = node_text(member, source).trim_start_matches('*');
                base_classes.push(text.to_string());
            }
        }
    }

    ClassInfo {
        name: spec
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        methods: Vec::new(),
        base_classes,
        docstring: leading_comment(declaration, source, COMMENT_KINDS),
        decorators: Vec::new(),
        line_start: line_start(declaration),
        line_end: line_end(declaration),
    }
}

#[cfg(test)]
mod tests {
    use crate::indexer::parser::ParserRegistry;
    use crate::models::SymbolInfo;

    fn extract(src: &str) -> SymbolInfo {
        let registry = ParserRegistry::with_default_grammars();
        let parsed = registry.parse("pkg/server/server.go", src.as_bytes()).unwrap();
        registry.extract(&parsed).unwrap()
    }

    #[test]
    fn test_imports_single_and_block() {
        let info = extract(
            "package main\n\nimport \"fmt\"\n\nimport (\n\t\"os\"\n\tstr \"strings\"\n)\n",
        );
        let modules: Vec<&str> = info.imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["fmt", "os", "strings"]);
        assert_eq!(info.imports[2].symbols, vec!["str"]);
        assert_eq!(info.imports[1].line_number, 6);
    }

    #[test]
    fn test_functions_and_complexity() {
        let info = extract(
            "package main\n\n// Run starts the loop.\nfunc Run(a, b int, name string) error {\n\tfor i := 0; i < a; i++ {\n\t\tif i > b || name == \"\" {\n\t\t\treturn nil\n\t\t}\n\t}\n\treturn nil\n}\n\nfunc helper() {}\n",
        );
        assert_eq!(info.functions.len(), 2);
        let run = &info.functions[0];
        assert_eq!(run.name, "Run");
        assert_eq!(run.parameters, vec!["a", "b", "name"]);
        assert_eq!(run.return_type.as_deref(), Some("error"));
        assert_eq!(run.docstring.as_deref(), Some("Run starts the loop."));
        // 1 + for + if + ||
        assert_eq!(run.complexity, 4);
        assert_eq!(info.exports, vec!["Run"]);
    }

    #[test]
    fn test_methods_attach_to_struct() {
        let info = extract(
            "package server\n\ntype Server struct {\n\tBase\n\taddr string\n}\n\nfunc (s *Server) Listen() error {\n\treturn nil\n}\n",
        );
        assert_eq!(info.classes.len(), 1);
        let server = &info.classes[0];
        assert_eq!(server.name, "Server");
        assert_eq!(server.base_classes, vec!["Base"]);
        assert_eq!(server.methods.len(), 1);
        assert_eq!(server.methods[0].name, "Listen");
        assert!(info.functions.is_empty());
    }
}
