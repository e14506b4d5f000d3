//! Python symbol extraction.

use tree_sitter::Node;

use super::{
    children, clean_docstring, cyclomatic, has_token, is_public_name, line_end, line_start,
    named_children, node_text, unquote, ComplexityRules,
};
use crate::indexer::parser::ParseResult;
use crate::models::{ClassInfo, FunctionInfo, ImportInfo, SymbolInfo};

const RULES: ComplexityRules = ComplexityRules {
    decision_kinds: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
        "boolean_operator",
        "for_in_clause",
        "if_clause",
        "case_clause",
    ],
    binary_kind: "",
    short_circuit_operators: &[],
    nested_scopes: &["function_definition", "class_definition", "lambda"],
};

pub fn extract(parsed: &ParseResult) -> SymbolInfo {
    let source = parsed.source_bytes();
    let root = parsed.root_node();
    let mut info = SymbolInfo::default();
    let mut declared_exports: Option<Vec<String>> = None;

    for node in named_children(root) {
        match node.kind() {
            "function_definition" => info.functions.push(function(node, source, Vec::new())),
            "class_definition" => info.classes.push(class(node, source, Vec::new())),
            "decorated_definition" => {
                let decorators = decorator_names(node, source);
                if let Some(definition) = node.child_by_field_name("definition") {
                    match definition.kind() {
                        "function_definition" => {
                            let mut f = function(definition, source, decorators);
                            f.line_start = line_start(node);
                            info.functions.push(f);
                        }
                        "class_definition" => {
                            let mut c = class(definition, source, decorators);
                            c.line_start = line_start(node);
                            info.classes.push(c);
                        }
                        _ => {}
                    }
                }
            }
            "expression_statement" => {
                if let Some(names) = dunder_all(node, source) {
                    declared_exports = Some(names);
                }
            }
            _ => {}
        }
    }

    collect_imports(root, source, &mut info.imports);

    info.exports = declared_exports.unwrap_or_else(|| {
        info.functions
            .iter()
            .map(|f| f.name.clone())
            .chain(info.classes.iter().map(|c| c.name.clone()))
            .filter(|name| is_public_name(name))
            .collect()
    });
    info
}

fn decorator_names(decorated: Node<'_>, source: &[u8]) -> Vec<String> {
    named_children(decorated)
        .into_iter()
        .filter(|c| c.kind() == "decorator")
        .map(|c| node_text(c, source).trim_start_matches('@').trim().to_string())
        .collect()
}

fn function(node: Node<'_>, source: &[u8], decorators: Vec<String>) -> FunctionInfo {
    let body = node.child_by_field_name("body");
    FunctionInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default(),
        parameters: node
            .child_by_field_name("parameters")
            .map(|p| parameters(p, source))
            .unwrap_or_default(),
        return_type: node
            .child_by_field_name("return_type")
            .map(|r| node_text(r, source).to_string()),
        docstring: body.and_then(|b| docstring(b, source)),
        line_start: line_start(node),
        line_end: line_end(node),
        complexity: cyclomatic(body, source, &RULES),
        is_async: has_token(node, "async"),
        decorators,
    }
}

fn parameters(params: Node<'_>, source: &[u8]) -> Vec<String> {
    named_children(params)
        .into_iter()
        .filter_map(|param| {
            let name = match param.kind() {
                "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    node_text(param, source).to_string()
                }
                "default_parameter" | "typed_default_parameter" => param
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())?,
                "typed_parameter" => named_children(param)
                    .first()
                    .map(|n| node_text(*n, source).to_string())?,
                _ => return None,
            };
            Some(name)
        })
        .collect()
}

fn docstring(body: Node<'_>, source: &[u8]) -> Option<String> {
    let first = named_children(body).into_iter().next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = named_children(first).into_iter().next()?;
    if expr.kind() != "string" {
        return None;
    }
    clean_docstring(node_text(expr, source))
}

fn class(node: Node<'_>, source: &[u8], decorators: Vec<String>) -> ClassInfo {
    let body = node.child_by_field_name("body");
    let base_classes = node
        .child_by_field_name("superclasses")
        .map(|bases| {
            named_children(bases)
                .into_iter()
                .filter(|b| matches!(b.kind(), "identifier" | "attribute" | "subscript"))
                .map(|b| node_text(b, source).to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut methods = Vec::new();
    if let Some(body) = body {
        for member in named_children(body) {
            match member.kind() {
                "function_definition" => methods.push(function(member, source, Vec::new())),
                "decorated_definition" => {
                    let decorators = decorator_names(member, source);
                    if let Some(def) = member.child_by_field_name("definition") {
                        if def.kind() == "function_definition" {
                            let mut method = function(def, source, decorators);
                            method.line_start = line_start(member);
                            methods.push(method);
                        }
                    }
                }
                _ => {}
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
        docstring: body.and_then(|b| docstring(b, source)),
        decorators,
        line_start: line_start(node),
        line_end: line_end(node),
    }
}

/// `__all__ = ["a", "b"]` at module level.
fn dunder_all(statement: Node<'_>, source: &[u8]) -> Option<Vec<String>> {
    let assignment = named_children(statement)
        .into_iter()
        .find(|n| n.kind() == "assignment")?;
    let left = assignment.child_by_field_name("left")?;
    if node_text(left, source) != "__all__" {
        return None;
    }
    let right = assignment.child_by_field_name("right")?;
    if !matches!(right.kind(), "list" | "tuple") {
        return None;
    }
    Some(
        named_children(right)
            .into_iter()
            .filter(|n| n.kind() == "string")
            .map(|n| unquote(node_text(n, source)))
            .collect(),
    )
}

/// Imports anywhere in the module, including conditional and function-local
/// ones.
fn collect_imports(root: Node<'_>, source: &[u8], out: &mut Vec<ImportInfo>) {
    let mut stack = vec![root];
    let mut found: Vec<Node<'_>> = Vec::new();
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                found.push(node)
            }
            _ => stack.extend(named_children(node)),
        }
    }
    found.sort_by_key(|n| n.start_byte());

    for node in found {
        let line_number = line_start(node);
        if node.kind() == "import_statement" {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let module = match name.kind() {
                    "aliased_import" => name
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source).to_string())
                        .unwrap_or_default(),
                    _ => node_text(name, source).to_string(),
                };
                out.push(ImportInfo {
                    module,
                    symbols: Vec::new(),
                    is_relative: false,
                    line_number,
                });
            }
            continue;
        }

        let module = if node.kind() == "future_import_statement" {
            "__future__".to_string()
        } else {
            node.child_by_field_name("module_name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default()
        };
        let mut symbols = Vec::new();
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let symbol = match name.kind() {
                "aliased_import" => name
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default(),
                _ => node_text(name, source).to_string(),
            };
            symbols.push(symbol);
        }
        if children(node).iter().any(|c| c.kind() == "wildcard_import") {
            symbols.push("*".to_string());
        }
        out.push(ImportInfo {
            is_relative: module.starts_with('.'),
            module,
            symbols,
            line_number,
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::indexer::parser::ParserRegistry;
    use crate::models::SymbolInfo;

    fn extract(src: &str) -> SymbolInfo {
        let registry = ParserRegistry::with_default_grammars();
        let parsed = registry.parse("pkg/module.py", src.as_bytes()).unwrap();
        registry.extract(&parsed).unwrap()
    }

    #[test]
    fn test_functions_with_docstring_and_params() {
        let info = extract(
            "def greet(name, greeting: str = \"hi\", *args, **kwargs) -> str:\n    \"\"\"Say hello.\"\"\"\n    return greeting + name\n",
        );
        assert_eq!(info.functions.len(), 1);
        let f = &info.functions[0];
        assert_eq!(f.name, "greet");
        assert_eq!(f.parameters, vec!["name", "greeting", "*args", "**kwargs"]);
        assert_eq!(f.return_type.as_deref(), Some("str"));
        assert_eq!(f.docstring.as_deref(), Some("Say hello."));
        assert_eq!(f.line_start, 1);
        assert_eq!(f.line_end, 3);
        assert_eq!(f.complexity, 1);
        assert!(!f.is_async);
    }

    #[test]
    fn test_async_and_decorators() {
        let info = extract(
            "@app.get(\"/users\")\nasync def list_users():\n    return []\n",
        );
        let f = &info.functions[0];
        assert!(f.is_async);
        assert_eq!(f.decorators, vec!["app.get(\"/users\")"]);
        assert_eq!(f.line_start, 1);
    }

    #[test]
    fn test_complexity_counts_branches() {
        let info = extract(
            "def f(x):\n    if x > 0 and x < 10:\n        return 1\n    elif x < 0:\n        return 2\n    for i in range(3):\n        pass\n    return 0\n",
        );
        // 1 + if + and + elif + for
        assert_eq!(info.functions[0].complexity, 5);
    }

    #[test]
    fn test_nested_function_not_counted_in_parent() {
        let info = extract(
            "def outer():\n    def inner(y):\n        if y:\n            return 1\n    return inner\n",
        );
        assert_eq!(info.functions.len(), 1);
        assert_eq!(info.functions[0].complexity, 1);
    }

    #[test]
    fn test_class_with_methods_and_bases() {
        let info = extract(
            "class Dog(Animal, mixins.Loud):\n    \"\"\"A dog.\"\"\"\n\n    def bark(self):\n        return 'woof'\n\n    @property\n    def name(self):\n        return self._name\n",
        );
        assert_eq!(info.classes.len(), 1);
        let c = &info.classes[0];
        assert_eq!(c.name, "Dog");
        assert_eq!(c.base_classes, vec!["Animal", "mixins.Loud"]);
        assert_eq!(c.docstring.as_deref(), Some("A dog."));
        assert_eq!(c.methods.len(), 2);
        assert_eq!(c.methods[0].name, "bark");
        assert_eq!(c.methods[0].parameters, vec!["self"]);
        assert_eq!(c.methods[1].decorators, vec!["property"]);
    }

    #[test]
    fn test_imports() {
        let info = extract(
            "import os\nimport numpy as np\nfrom . import sibling\nfrom ..core.models import User, Team as T\nfrom typing import *\n",
        );
        assert_eq!(info.imports.len(), 5);
        assert_eq!(info.imports[0].module, "os");
        assert_eq!(info.imports[1].module, "numpy");
        assert_eq!(info.imports[2].module, ".");
        assert!(info.imports[2].is_relative);
        assert_eq!(info.imports[2].symbols, vec!["sibling"]);
        assert_eq!(info.imports[3].module, "..core.models");
        assert_eq!(info.imports[3].symbols, vec!["User", "Team"]);
        assert_eq!(info.imports[3].line_number, 4);
        assert_eq!(info.imports[4].symbols, vec!["*"]);
    }

    #[test]
    fn test_exports_default_to_public_names() {
        let info = extract("def visible():\n    pass\n\ndef _hidden():\n    pass\n\nclass Thing:\n    pass\n");
        assert_eq!(info.exports, vec!["visible", "Thing"]);
    }

    #[test]
    fn test_exports_honor_dunder_all() {
        let info = extract("__all__ = [\"only_this\"]\n\ndef only_this():\n    pass\n\ndef other():\n    pass\n");
        assert_eq!(info.exports, vec!["only_this"]);
    }
}
