//! Symbol and import extraction from parsed syntax trees.
//!
//! Each language module walks its own tree-sitter node kinds; the helpers
//! here (text, spans, docstrings, cyclomatic complexity) are shared.

use tree_sitter::Node;

pub mod go;
pub mod java;
pub mod python;
pub mod typescript;

/// Node kinds that drive the complexity count for one language.
pub(crate) struct ComplexityRules {
    /// Each occurrence adds one decision point.
    pub decision_kinds: &'static [&'static str],
    /// Binary expression kind whose `operator` field may short-circuit.
    pub binary_kind: &'static str,
    pub short_circuit_operators: &'static [&'static str],
    /// Nested bodies that are scored on their own, not in the enclosing one.
    pub nested_scopes: &'static [&'static str],
}

pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub(crate) fn line_start(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

pub(crate) fn line_end(node: Node<'_>) -> usize {
    node.end_position().row + 1
}

pub(crate) fn named_children<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub(crate) fn children<'tree>(node: Node<'tree>) -> Vec<Node<'tree>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub(crate) fn has_token(node: Node<'_>, token: &str) -> bool {
    children(node).iter().any(|c| c.kind() == token)
}

/// Cyclomatic complexity of a body: one plus every decision point below it,
/// skipping nested function scopes.
pub(crate) fn cyclomatic(body: Option<Node<'_>>, source: &[u8], rules: &ComplexityRules) -> u32 {
    let Some(body) = body else {
        return 1;
    };
    let mut complexity = 1u32;
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        for child in named_children(node) {
            let kind = child.kind();
            if rules.nested_scopes.contains(&kind) {
                continue;
            }
            if rules.decision_kinds.contains(&kind) {
                complexity += 1;
            } else if kind == rules.binary_kind {
                let operator = child
                    .child_by_field_name("operator")
                    .map(|op| node_text(op, source))
                    .unwrap_or("");
                if rules.short_circuit_operators.contains(&operator) {
                    complexity += 1;
                }
            }
            stack.push(child);
        }
    }
    complexity
}

/// Doc comment directly above `node` (consecutive comment siblings with no
/// blank line in between), with comment markers stripped.
pub(crate) fn leading_comment(node: Node<'_>, source: &[u8], comment_kinds: &[&str]) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut expected_end_row = node.start_position().row;
    let mut current = node.prev_sibling();
    while let Some(prev) = current {
        if !comment_kinds.contains(&prev.kind()) {
            break;
        }
        if prev.end_position().row + 1 < expected_end_row {
            break;
        }
        lines.insert(0, clean_comment(node_text(prev, source)));
        expected_end_row = prev.start_position().row;
        current = prev.prev_sibling();
    }
    let joined = lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn clean_comment(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix("/**")
                .or_else(|| line.strip_prefix("/*"))
                .or_else(|| line.strip_prefix("//"))
                .unwrap_or(line);
            let line = line.strip_suffix("*/").unwrap_or(line);
            let line = line.strip_prefix('*').unwrap_or(line);
            line.trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip string prefixes and quotes from a string literal.
pub(crate) fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = trimmed.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if let Some(inner) = body.strip_prefix(quote).and_then(|b| b.strip_suffix(quote)) {
            return inner.to_string();
        }
    }
    body.to_string()
}

/// Collapse a docstring to its trimmed lines.
pub(crate) fn clean_docstring(raw: &str) -> Option<String> {
    let text = unquote(raw);
    let cleaned = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub(crate) fn is_public_name(name: &str) -> bool {
    !name.starts_with('_')
}
