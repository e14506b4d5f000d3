//! Idiom detection over extracted symbols and raw source text.
//!
//! Detection is heuristic: each detector combines symbol facts (decorators,
//! base classes, async flags) with line-level regex matches and emits at most
//! one `DetectedPattern` per tag, carrying up to [`MAX_EVIDENCE`] evidence
//! lines.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::models::{DetectedPattern, SymbolInfo};

pub const API_ENDPOINT: &str = "api_endpoint";
pub const ASYNC_AWAIT: &str = "async_await";
pub const DECORATOR_USAGE: &str = "decorator_usage";
pub const CLASS_HIERARCHY: &str = "class_hierarchy";
pub const ERROR_HANDLING: &str = "error_handling";
pub const TEST_SUITE: &str = "test_suite";
pub const DATA_MODEL: &str = "data_model";
pub const CONTEXT_MANAGER: &str = "context_manager";
pub const DEPENDENCY_INJECTION: &str = "dependency_injection";

const MAX_EVIDENCE: usize = 5;
const MAX_EVIDENCE_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once via LazyLock)
// ---------------------------------------------------------------------------

static ROUTE_DECORATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*@\w+\.(?:get|post|put|patch|delete|route|api_route|websocket)\s*\(").unwrap()
});

static SPRING_MAPPING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*@(?:Get|Post|Put|Patch|Delete|Request)Mapping\b").unwrap()
});

static EXPRESS_ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:app|router|server)\.(?:get|post|put|patch|delete|all|use)\s*\(\s*['"`]/"#)
        .unwrap()
});

static GO_HANDLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(?:HandleFunc|Handle|GET|POST|PUT|PATCH|DELETE)\s*\(\s*`?\x22/").unwrap()
});

static AWAIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bawait\b").unwrap());

static GO_ASYNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*go\s+(?:func\b|[A-Za-z_][\w.]*\s*\()").unwrap());

static ERROR_HANDLING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:try\s*[:{(]|try$|except\b|catch\b|\}\s*catch\b|finally\b|\}\s*finally\b|raise\b|throw\b|if\s+err\s*!=\s*nil)",
    )
    .unwrap()
});

static TEST_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|/)(?:tests?/|__tests__/|test_[^/]+\.py$|[^/]+_test\.(?:py|go)$|[^/]+\.(?:test|spec)\.[jt]sx?$|[^/]+Tests?\.java$)",
    )
    .unwrap()
});

static TEST_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:describe|it|test)\s*\(\s*['\x22`]|^\s*@(?:Test|ParameterizedTest)\b|\bassert\w*\s*[\s(]").unwrap()
});

static DATA_MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*@(?:dataclass|dataclasses\.dataclass|attr\.s|attrs\.define|Entity|Table|Data|Value|Embeddable)\b|^\s*(?:public\s+)?record\s+\w+\s*\(|`(?:json|db|gorm|yaml):\x22",
    )
    .unwrap()
});

static WITH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?with\s+.+:\s*(?:#.*)?$").unwrap());

static TRY_WITH_RESOURCES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*try\s*\(").unwrap());

static DEFER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*defer\s+").unwrap());

static INJECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(?:Inject|Autowired|Injectable)\b|\bDepends\s*\(|\binject\s*\(").unwrap()
});

const DATA_MODEL_BASES: &[&str] = &["BaseModel", "Model", "Schema", "TypedDict", "NamedTuple"];

const CONTEXT_MANAGER_METHODS: &[&str] = &["__enter__", "__exit__", "__aenter__", "__aexit__"];

const CONSTRUCTOR_NAMES: &[&str] = &["__init__", "constructor"];

/// Lines of `source` matching `re`, as (1-indexed line, trimmed text).
fn matching_lines(source: &str, re: &Regex) -> Vec<(usize, String)> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(idx, line)| (idx + 1, evidence_text(line)))
        .collect()
}

fn evidence_text(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= MAX_EVIDENCE_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX_EVIDENCE_CHARS).collect();
        cut.push('…');
        cut
    }
}

/// Confidence that grows with the number of occurrences and saturates at `cap`.
fn scaled(base: f64, per_hit: f64, hits: usize, cap: f64) -> f64 {
    (base + per_hit * hits.saturating_sub(1) as f64).min(cap)
}

fn pattern(tag: &str, confidence: f64, hits: Vec<(usize, String)>) -> DetectedPattern {
    let mut pattern = DetectedPattern::new(tag, confidence);
    let count = hits.len();
    let mut hits = hits;
    hits.sort();
    hits.dedup();
    pattern.line_numbers = hits.iter().map(|(line, _)| *line).collect();
    pattern.line_numbers.dedup();
    pattern.evidence = hits
        .into_iter()
        .take(MAX_EVIDENCE)
        .map(|(_, text)| text)
        .collect();
    pattern.metadata.insert("occurrences".into(), json!(count));
    pattern
}

/// Run every detector over one file.
pub fn detect_patterns(symbols: &SymbolInfo, source: &str, path: &str) -> Vec<DetectedPattern> {
    let detectors: [fn(&SymbolInfo, &str, &str) -> Option<DetectedPattern>; 9] = [
        detect_api_endpoints,
        detect_async_await,
        detect_decorator_usage,
        detect_class_hierarchy,
        detect_error_handling,
        detect_test_suite,
        detect_data_model,
        detect_context_manager,
        detect_dependency_injection,
    ];
    detectors
        .iter()
        .filter_map(|detect| detect(symbols, source, path))
        .collect()
}

fn detect_api_endpoints(_symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let mut hits = Vec::new();
    let mut frameworks = BTreeSet::new();
    for (re, framework) in [
        (&*ROUTE_DECORATOR_RE, "decorator_routes"),
        (&*SPRING_MAPPING_RE, "spring"),
        (&*EXPRESS_ROUTE_RE, "express"),
        (&*GO_HANDLER_RE, "net_http"),
    ] {
        let found = matching_lines(source, re);
        if !found.is_empty() {
            frameworks.insert(framework);
        }
        hits.extend(found);
    }
    if hits.is_empty() {
        return None;
    }
    let mut detected = pattern(API_ENDPOINT, scaled(0.6, 0.1, hits.len(), 0.95), hits);
    detected
        .metadata
        .insert("frameworks".into(), json!(frameworks.into_iter().collect::<Vec<_>>()));
    Some(detected)
}

fn detect_async_await(symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let async_functions: Vec<(usize, String)> = symbols
        .all_functions()
        .filter(|f| f.is_async)
        .map(|f| (f.line_start, format!("async {}", f.name)))
        .collect();
    let awaits = matching_lines(source, &AWAIT_RE);
    let goroutines = matching_lines(source, &GO_ASYNC_RE);
    if async_functions.is_empty() && awaits.is_empty() && goroutines.is_empty() {
        return None;
    }
    let async_count = async_functions.len();
    let await_count = awaits.len();
    let mut hits = async_functions;
    hits.extend(awaits);
    hits.extend(goroutines);
    let confidence = if async_count > 0 && await_count > 0 {
        scaled(0.7, 0.05, hits.len(), 0.95)
    } else {
        scaled(0.5, 0.05, hits.len(), 0.8)
    };
    let mut detected = pattern(ASYNC_AWAIT, confidence, hits);
    detected
        .metadata
        .insert("async_functions".into(), json!(async_count));
    Some(detected)
}

fn detect_decorator_usage(symbols: &SymbolInfo, _source: &str, _path: &str) -> Option<DetectedPattern> {
    let mut hits = Vec::new();
    let mut names = BTreeSet::new();
    for function in symbols.all_functions() {
        for decorator in &function.decorators {
            names.insert(decorator_name(decorator));
            hits.push((function.line_start, format!("@{decorator} {}", function.name)));
        }
    }
    for class in &symbols.classes {
        for decorator in &class.decorators {
            names.insert(decorator_name(decorator));
            hits.push((class.line_start, format!("@{decorator} {}", class.name)));
        }
    }
    if hits.is_empty() {
        return None;
    }
    let distinct = names.len();
    let mut detected = pattern(DECORATOR_USAGE, scaled(0.5, 0.1, distinct, 0.9), hits);
    detected
        .metadata
        .insert("decorators".into(), json!(names.into_iter().collect::<Vec<_>>()));
    Some(detected)
}

fn decorator_name(decorator: &str) -> String {
    decorator
        .split('(')
        .next()
        .unwrap_or(decorator)
        .trim()
        .to_string()
}

fn detect_class_hierarchy(symbols: &SymbolInfo, _source: &str, _path: &str) -> Option<DetectedPattern> {
    let hits: Vec<(usize, String)> = symbols
        .classes
        .iter()
        .filter_map(|class| {
            let bases: Vec<&str> = class
                .base_classes
                .iter()
                .map(String::as_str)
                .filter(|b| *b != "object")
                .collect();
            if bases.is_empty() {
                None
            } else {
                Some((class.line_start, format!("{}({})", class.name, bases.join(", "))))
            }
        })
        .collect();
    if hits.is_empty() {
        return None;
    }
    Some(pattern(
        CLASS_HIERARCHY,
        scaled(0.6, 0.1, hits.len(), 0.9),
        hits,
    ))
}

fn detect_error_handling(_symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let hits = matching_lines(source, &ERROR_HANDLING_RE);
    if hits.is_empty() {
        return None;
    }
    Some(pattern(
        ERROR_HANDLING,
        scaled(0.5, 0.1, hits.len(), 0.9),
        hits,
    ))
}

fn detect_test_suite(symbols: &SymbolInfo, source: &str, path: &str) -> Option<DetectedPattern> {
    let path_match = TEST_PATH_RE.is_match(path);
    let mut hits: Vec<(usize, String)> = symbols
        .all_functions()
        .filter(|f| {
            f.name.starts_with("test_")
                || f.name.starts_with("Test")
                || f.decorators.iter().any(|d| d == "Test")
        })
        .map(|f| (f.line_start, f.name.clone()))
        .collect();
    let test_functions = hits.len();
    hits.extend(matching_lines(source, &TEST_CALL_RE));
    if !path_match && test_functions == 0 {
        return None;
    }
    let confidence = match (path_match, hits.is_empty()) {
        (true, false) => scaled(0.8, 0.02, hits.len(), 0.95),
        (true, true) => 0.5,
        (false, _) => scaled(0.6, 0.05, hits.len(), 0.85),
    };
    let mut detected = pattern(TEST_SUITE, confidence, hits);
    detected
        .metadata
        .insert("test_functions".into(), json!(test_functions));
    detected.metadata.insert("test_path".into(), json!(path_match));
    Some(detected)
}

fn detect_data_model(symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let mut hits = matching_lines(source, &DATA_MODEL_RE);
    for class in &symbols.classes {
        if let Some(base) = class
            .base_classes
            .iter()
            .find(|b| DATA_MODEL_BASES.contains(&b.rsplit('.').next().unwrap_or(b.as_str())))
        {
            hits.push((class.line_start, format!("{}({base})", class.name)));
        }
    }
    if hits.is_empty() {
        return None;
    }
    Some(pattern(DATA_MODEL, scaled(0.7, 0.05, hits.len(), 0.95), hits))
}

fn detect_context_manager(symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let mut hits = matching_lines(source, &WITH_RE);
    hits.extend(matching_lines(source, &TRY_WITH_RESOURCES_RE));
    hits.extend(matching_lines(source, &DEFER_RE));
    let mut defines_protocol = false;
    for class in &symbols.classes {
        let protocol_methods: Vec<&str> = class
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .filter(|name| CONTEXT_MANAGER_METHODS.contains(name))
            .collect();
        if protocol_methods.len() >= 2 {
            defines_protocol = true;
            hits.push((class.line_start, format!("{} implements {}", class.name, protocol_methods.join("/"))));
        }
    }
    for function in symbols.all_functions() {
        if function
            .decorators
            .iter()
            .any(|d| d.ends_with("contextmanager"))
        {
            defines_protocol = true;
            hits.push((function.line_start, format!("@contextmanager {}", function.name)));
        }
    }
    if hits.is_empty() {
        return None;
    }
    let confidence = if defines_protocol {
        scaled(0.85, 0.02, hits.len(), 0.95)
    } else {
        scaled(0.5, 0.05, hits.len(), 0.8)
    };
    let mut detected = pattern(CONTEXT_MANAGER, confidence, hits);
    detected
        .metadata
        .insert("defines_protocol".into(), json!(defines_protocol));
    Some(detected)
}

fn detect_dependency_injection(symbols: &SymbolInfo, source: &str, _path: &str) -> Option<DetectedPattern> {
    let mut hits = matching_lines(source, &INJECTION_RE);
    let explicit = !hits.is_empty();
    // Constructor injection: a class whose constructor takes collaborators.
    for class in &symbols.classes {
        for method in &class.methods {
            let is_constructor =
                CONSTRUCTOR_NAMES.contains(&method.name.as_str()) || method.name == class.name;
            let collaborators = method
                .parameters
                .iter()
                .filter(|p| !matches!(p.as_str(), "self" | "cls" | "this"))
                .count();
            if is_constructor && collaborators >= 2 {
                hits.push((
                    method.line_start,
                    format!("{}({})", class.name, method.parameters.join(", ")),
                ));
            }
        }
    }
    if hits.is_empty() {
        return None;
    }
    let confidence = if explicit {
        scaled(0.75, 0.05, hits.len(), 0.95)
    } else {
        scaled(0.4, 0.05, hits.len(), 0.6)
    };
    Some(pattern(DEPENDENCY_INJECTION, confidence, hits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassInfo, FunctionInfo};

    fn tags(patterns: &[DetectedPattern]) -> Vec<&str> {
        patterns.iter().map(|p| p.pattern_type.as_str()).collect()
    }

    fn find<'a>(patterns: &'a [DetectedPattern], tag: &str) -> &'a DetectedPattern {
        patterns
            .iter()
            .find(|p| p.pattern_type == tag)
            .unwrap_or_else(|| panic!("missing pattern {tag}"))
    }

    #[test]
    fn test_plain_file_has_no_patterns() {
        let patterns = detect_patterns(&SymbolInfo::default(), "x = 1\ny = 2\n", "src/a.py");
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_flask_endpoint_and_decorators() {
        let source = "@app.get(\"/users\")\ndef list_users():\n    return []\n";
        let symbols = SymbolInfo {
            functions: vec![FunctionInfo {
                name: "list_users".into(),
                decorators: vec!["app.get(\"/users\")".into()],
                line_start: 1,
                line_end: 3,
                complexity: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        let patterns = detect_patterns(&symbols, source, "src/api.py");
        let api = find(&patterns, API_ENDPOINT);
        assert_eq!(api.line_numbers, vec![1]);
        assert!(api.confidence >= 0.6);
        let decorators = find(&patterns, DECORATOR_USAGE);
        assert_eq!(decorators.metadata["decorators"], json!(["app.get"]));
    }

    #[test]
    fn test_express_and_spring_routes() {
        let ts = "router.get('/items', handler);\napp.post(\"/items\", create);\n";
        let patterns = detect_patterns(&SymbolInfo::default(), ts, "src/routes.ts");
        assert_eq!(find(&patterns, API_ENDPOINT).line_numbers, vec![1, 2]);

        let java = "    @GetMapping(\"/health\")\n    public String health() { return \"ok\"; }\n";
        let patterns = detect_patterns(&SymbolInfo::default(), java, "src/Health.java");
        assert!(tags(&patterns).contains(&API_ENDPOINT));
    }

    #[test]
    fn test_async_await_and_error_handling() {
        let source = "async def fetch():\n    try:\n        await client.get()\n    except Exception:\n        raise\n";
        let symbols = SymbolInfo {
            functions: vec![FunctionInfo {
                name: "fetch".into(),
                is_async: true,
                line_start: 1,
                line_end: 5,
                complexity: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        let patterns = detect_patterns(&symbols, source, "src/fetch.py");
        let async_pattern = find(&patterns, ASYNC_AWAIT);
        assert!(async_pattern.confidence >= 0.7);
        assert_eq!(async_pattern.metadata["async_functions"], json!(1));
        let errors = find(&patterns, ERROR_HANDLING);
        assert_eq!(errors.line_numbers, vec![2, 4, 5]);
    }

    #[test]
    fn test_go_error_checks_and_defer() {
        let source = "func run() error {\n\tf, err := os.Open(p)\n\tif err != nil {\n\t\treturn err\n\t}\n\tdefer f.Close()\n\treturn nil\n}\n";
        let patterns = detect_patterns(&SymbolInfo::default(), source, "cmd/run.go");
        assert_eq!(find(&patterns, ERROR_HANDLING).line_numbers, vec![3]);
        assert_eq!(find(&patterns, CONTEXT_MANAGER).line_numbers, vec![6]);
    }

    #[test]
    fn test_test_suite_by_path_and_functions() {
        let symbols = SymbolInfo {
            functions: vec![FunctionInfo {
                name: "test_add".into(),
                line_start: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        let source = "def test_add():\n    assert add(1, 2) == 3\n";
        let patterns = detect_patterns(&symbols, source, "tests/test_math.py");
        let suite = find(&patterns, TEST_SUITE);
        assert!(suite.confidence >= 0.8);
        assert_eq!(suite.metadata["test_path"], json!(true));

        let patterns = detect_patterns(&SymbolInfo::default(), "x = 1\n", "src/math.py");
        assert!(!tags(&patterns).contains(&TEST_SUITE));
    }

    #[test]
    fn test_class_hierarchy_and_data_model() {
        let symbols = SymbolInfo {
            classes: vec![
                ClassInfo {
                    name: "User".into(),
                    base_classes: vec!["pydantic.BaseModel".into()],
                    line_start: 3,
                    ..Default::default()
                },
                ClassInfo {
                    name: "Plain".into(),
                    base_classes: vec!["object".into()],
                    line_start: 8,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let patterns = detect_patterns(&symbols, "", "src/models.py");
        assert_eq!(find(&patterns, CLASS_HIERARCHY).line_numbers, vec![3]);
        assert_eq!(find(&patterns, DATA_MODEL).line_numbers, vec![3]);
    }

    #[test]
    fn test_context_manager_protocol() {
        let enter = FunctionInfo {
            name: "__enter__".into(),
            ..Default::default()
        };
        let exit = FunctionInfo {
            name: "__exit__".into(),
            ..Default::default()
        };
        let symbols = SymbolInfo {
            classes: vec![ClassInfo {
                name: "Session".into(),
                methods: vec![enter, exit],
                line_start: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        let patterns = detect_patterns(&symbols, "", "src/session.py");
        let cm = find(&patterns, CONTEXT_MANAGER);
        assert!(cm.confidence >= 0.85);
        assert_eq!(cm.metadata["defines_protocol"], json!(true));
    }

    #[test]
    fn test_dependency_injection_explicit_and_constructor() {
        let source = "def handler(db = Depends(get_db)):\n    pass\n";
        let patterns = detect_patterns(&SymbolInfo::default(), source, "src/api.py");
        assert!(find(&patterns, DEPENDENCY_INJECTION).confidence >= 0.75);

        let symbols = SymbolInfo {
            classes: vec![ClassInfo {
                name: "Service".into(),
                methods: vec![FunctionInfo {
                    name: "__init__".into(),
                    parameters: vec!["self".into(), "repo".into(), "clock".into()],
                    line_start: 2,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let patterns = detect_patterns(&symbols, "", "src/service.py");
        let di = find(&patterns, DEPENDENCY_INJECTION);
        assert!(di.confidence < 0.75);
        assert_eq!(di.line_numbers, vec![2]);
    }

    #[test]
    fn test_evidence_is_capped() {
        let source = "raise A\n".repeat(12);
        let patterns = detect_patterns(&SymbolInfo::default(), &source, "src/a.py");
        let errors = find(&patterns, ERROR_HANDLING);
        assert_eq!(errors.line_numbers.len(), 12);
        assert_eq!(errors.evidence.len(), MAX_EVIDENCE);
        assert_eq!(errors.metadata["occurrences"], json!(12));
        assert!(errors.confidence <= 0.9);
    }

    #[test]
    fn test_line_listed_once_with_several_evidences() {
        let p = pattern(
            ASYNC_AWAIT,
            0.5,
            vec![
                (3, "await fetch()".into()),
                (1, "async def run():".into()),
                (3, "async with lock:".into()),
            ],
        );
        assert_eq!(p.line_numbers, vec![1, 3]);
        assert_eq!(p.evidence.len(), 3);
    }
}
