//! Language dispatch over pluggable grammars.
//!
//! A [`ParserRegistry`] maps file extensions to language tags and language
//! tags to [`LanguageGrammar`] implementations. Adding a language is a
//! `register` call; the dispatch path never changes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tree_sitter::Node;

use crate::errors::{TutorError, TutorResult};
use crate::indexer::symbols;
use crate::models::SymbolInfo;

pub const PYTHON: &str = "python";
pub const TYPESCRIPT: &str = "typescript";
pub const JAVA: &str = "java";
pub const GO: &str = "go";

/// Output of a grammar run over one file. Owned by the caller; never cached.
pub struct ParseResult {
    pub path: String,
    pub language: &'static str,
    pub source: String,
    pub tree: tree_sitter::Tree,
    pub parse_duration: Duration,
    pub has_errors: bool,
    /// 1-based line of the first ERROR or MISSING node.
    pub first_error_line: Option<usize>,
}

impl ParseResult {
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }
}

/// A parser capability registered under a language tag.
pub trait LanguageGrammar: Send + Sync {
    fn language(&self) -> &'static str;

    /// Extensions handled by this grammar, with the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn ts_language(&self) -> tree_sitter::Language;

    /// Walk a parse result produced by this grammar into symbols.
    fn extract(&self, parsed: &ParseResult) -> SymbolInfo;

    fn parse(&self, path: &str, source: String) -> TutorResult<ParseResult> {
        let started = Instant::now();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.ts_language())
            .map_err(|e| TutorError::Parse(format!("Failed to set language: {e}")))?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| TutorError::Parse(format!("Failed to parse {path}")))?;
        let root = tree.root_node();
        let has_errors = root.has_error();
        let first_error_line = if has_errors {
            first_error_line(root)
        } else {
            None
        };
        Ok(ParseResult {
            path: path.to_string(),
            language: self.language(),
            source,
            parse_duration: started.elapsed(),
            has_errors,
            first_error_line,
            tree,
        })
    }
}

fn first_error_line(root: Node<'_>) -> Option<usize> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|c| c.has_error() || c.is_missing())
            .collect();
        // Reverse so the leftmost child is visited first.
        stack.extend(children.into_iter().rev());
    }
    None
}

// ---------------------------------------------------------------------------
// Built-in tree-sitter grammars
// ---------------------------------------------------------------------------

pub struct PythonGrammar;

impl LanguageGrammar for PythonGrammar {
    fn language(&self) -> &'static str {
        PYTHON
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".py", ".pyi"]
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, parsed: &ParseResult) -> SymbolInfo {
        symbols::python::extract(parsed)
    }
}

/// TypeScript and JavaScript, parsed with the TSX dialect so JSX is accepted.
pub struct TypeScriptGrammar;

impl LanguageGrammar for TypeScriptGrammar {
    fn language(&self) -> &'static str {
        TYPESCRIPT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".ts", ".tsx", ".js", ".jsx", ".mjs"]
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    }

    fn extract(&self, parsed: &ParseResult) -> SymbolInfo {
        symbols::typescript::extract(parsed)
    }
}

pub struct JavaGrammar;

impl LanguageGrammar for JavaGrammar {
    fn language(&self) -> &'static str {
        JAVA
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".java"]
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn extract(&self, parsed: &ParseResult) -> SymbolInfo {
        symbols::java::extract(parsed)
    }
}

pub struct GoGrammar;

impl LanguageGrammar for GoGrammar {
    fn language(&self) -> &'static str {
        GO
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".go"]
    }

    fn ts_language(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn extract(&self, parsed: &ParseResult) -> SymbolInfo {
        symbols::go::extract(parsed)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct ParserRegistry {
    grammars: HashMap<&'static str, Arc<dyn LanguageGrammar>>,
    extensions: HashMap<String, &'static str>,
}

impl ParserRegistry {
    /// An empty registry; nothing is supported until grammars are registered.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_grammars() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonGrammar));
        registry.register(Arc::new(TypeScriptGrammar));
        registry.register(Arc::new(JavaGrammar));
        registry.register(Arc::new(GoGrammar));
        registry
    }

    /// Register a grammar under its language tag, replacing any previous
    /// grammar for that tag and claiming its extensions.
    pub fn register(&mut self, grammar: Arc<dyn LanguageGrammar>) {
        let language = grammar.language();
        for ext in grammar.extensions() {
            self.extensions.insert(ext.to_lowercase(), language);
        }
        self.grammars.insert(language, grammar);
    }

    pub fn detect_language(&self, path: &str) -> Option<&'static str> {
        let ext = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
        self.extensions.get(&ext).copied()
    }

    pub fn is_supported(&self, path: &str) -> bool {
        self.detect_language(path)
            .is_some_and(|lang| self.grammars.contains_key(lang))
    }

    /// Registered language tags, sorted.
    pub fn languages(&self) -> Vec<&'static str> {
        let mut languages: Vec<&'static str> = self.grammars.keys().copied().collect();
        languages.sort_unstable();
        languages
    }

    /// Parse `source` as the language detected for `path`.
    ///
    /// Syntax errors do not fail the parse; they are reported through
    /// `ParseResult::has_errors`.
    pub fn parse(&self, path: &str, source: &[u8]) -> TutorResult<ParseResult> {
        let grammar = self
            .detect_language(path)
            .and_then(|lang| self.grammars.get(lang))
            .ok_or_else(|| TutorError::UnsupportedLanguage(path.to_string()))?;
        let text = String::from_utf8(source.to_vec())
            .map_err(|_| TutorError::Parse(format!("{path} is not valid UTF-8")))?;
        grammar.parse(path, text)
    }

    pub fn extract(&self, parsed: &ParseResult) -> TutorResult<SymbolInfo> {
        let grammar = self
            .grammars
            .get(parsed.language)
            .ok_or_else(|| TutorError::UnsupportedLanguage(parsed.path.clone()))?;
        Ok(grammar.extract(parsed))
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language_by_extension() {
        let registry = ParserRegistry::with_default_grammars();
        assert_eq!(registry.detect_language("src/app.py"), Some(PYTHON));
        assert_eq!(registry.detect_language("src/App.TSX"), Some(TYPESCRIPT));
        assert_eq!(registry.detect_language("Main.java"), Some(JAVA));
        assert_eq!(registry.detect_language("cmd/main.go"), Some(GO));
    }

    #[test]
    fn test_detect_language_unsupported_returns_none() {
        let registry = ParserRegistry::with_default_grammars();
        assert_eq!(registry.detect_language("README.md"), None);
        assert_eq!(registry.detect_language("Makefile"), None);
        assert!(!registry.is_supported("lib.rs"));
    }

    #[test]
    fn test_detect_language_is_deterministic() {
        let registry = ParserRegistry::with_default_grammars();
        for _ in 0..3 {
            assert_eq!(registry.detect_language("a/b/c.ts"), Some(TYPESCRIPT));
        }
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = ParserRegistry::new();
        assert!(!registry.is_supported("app.py"));
        assert!(matches!(
            registry.parse("app.py", b"x = 1"),
            Err(TutorError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_register_custom_grammar_claims_extension() {
        struct Pyw;
        impl LanguageGrammar for Pyw {
            fn language(&self) -> &'static str {
                "pythonw"
            }
            fn extensions(&self) -> &'static [&'static str] {
                &[".pyw"]
            }
            fn ts_language(&self) -> tree_sitter::Language {
                tree_sitter_python::LANGUAGE.into()
            }
            fn extract(&self, parsed: &ParseResult) -> SymbolInfo {
                symbols::python::extract(parsed)
            }
        }
        let mut registry = ParserRegistry::with_default_grammars();
        registry.register(Arc::new(Pyw));
        assert_eq!(registry.detect_language("gui.pyw"), Some("pythonw"));
        let parsed = registry.parse("gui.pyw", b"def main():\n    pass\n").unwrap();
        let symbols = registry.extract(&parsed).unwrap();
        assert_eq!(symbols.functions[0].name, "main");
        assert_eq!(
            registry.languages(),
            vec!["go", "java", "python", "pythonw", "typescript"]
        );
    }

    #[test]
    fn test_parse_reports_syntax_errors() {
        let registry = ParserRegistry::with_default_grammars();
        let parsed = registry
            .parse("bad.py", b"def ok():\n    return 1\n\ndef broken(:\n")
            .unwrap();
        assert!(parsed.has_errors);
        assert!(parsed.first_error_line.is_some());
    }

    #[test]
    fn test_parse_clean_source() {
        let registry = ParserRegistry::with_default_grammars();
        let parsed = registry.parse("ok.go", b"package main\n\nfunc main() {}\n").unwrap();
        assert!(!parsed.has_errors);
        assert_eq!(parsed.language, GO);
        assert_eq!(parsed.root_node().kind(), "source_file");
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        let registry = ParserRegistry::with_default_grammars();
        let err = registry.parse("bin.py", &[0xff, 0xfe, 0x00]).err().unwrap();
        assert!(matches!(err, TutorError::Parse(_)));
    }
}
