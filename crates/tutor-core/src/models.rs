//! Shared typed models used across extraction, caching, persistence and the
//! analysis engine.
//!
//! Every type here has exactly one serde schema, and the same JSON codec is
//! used for cache values, per-file snapshots and whole-codebase snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::DependencyGraph;

/// Version of the persisted snapshot envelope.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Weights of the teaching-value sub-scores: documentation, complexity,
/// pattern, structure.
pub const TEACHING_WEIGHTS: [f64; 4] = [0.30, 0.25, 0.25, 0.20];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of raw content.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// First 16 hex characters of the SHA-256 of a path string.
pub fn short_path_hash(path: &str) -> String {
    let digest = content_hash(path.as_bytes());
    digest[..16].to_string()
}

pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// 1. Symbols
// ---------------------------------------------------------------------------

/// A function or method.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
    pub docstring: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub complexity: u32,
    pub is_async: bool,
    pub decorators: Vec<String>,
}

/// A class, interface, struct or other named type with methods.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub methods: Vec<FunctionInfo>,
    pub base_classes: Vec<String>,
    pub docstring: Option<String>,
    pub decorators: Vec<String>,
    pub line_start: usize,
    pub line_end: usize,
}

/// A single import statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub module: String,
    pub symbols: Vec<String>,
    pub is_relative: bool,
    pub line_number: usize,
}

/// Everything the extractor pulls out of one file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<String>,
}

impl SymbolInfo {
    /// Top-level functions followed by every class method.
    pub fn all_functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
    }
}

// ---------------------------------------------------------------------------
// 2. Patterns
// ---------------------------------------------------------------------------

/// An idiom detected in a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub pattern_type: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub line_numbers: Vec<usize>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DetectedPattern {
    pub fn new(pattern_type: &str, confidence: f64) -> Self {
        Self {
            pattern_type: pattern_type.to_string(),
            confidence: clamp01(confidence),
            evidence: Vec::new(),
            line_numbers: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Codebase-wide tally of a pattern tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub pattern_type: String,
    pub occurrences: usize,
    pub files: Vec<String>,
    pub avg_confidence: f64,
}

// ---------------------------------------------------------------------------
// 3. Metrics and scores
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub cyclomatic_complexity: u32,
    pub avg_complexity: f64,
    pub max_complexity: u32,
    pub lines_of_code: usize,
    pub comment_lines: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub documentation_coverage: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TeachingValueScore {
    pub total: f64,
    pub documentation_score: f64,
    pub complexity_score: f64,
    pub pattern_score: f64,
    pub structure_score: f64,
    pub explanation: String,
}

impl TeachingValueScore {
    /// Weighted combination of the sub-scores, clamped to [0, 1].
    pub fn recompute_total(&self) -> f64 {
        let [doc, complexity, pattern, structure] = TEACHING_WEIGHTS;
        clamp01(
            doc * self.documentation_score
                + complexity * self.complexity_score
                + pattern * self.pattern_score
                + structure * self.structure_score,
        )
    }
}

// ---------------------------------------------------------------------------
// 4. FileAnalysis
// ---------------------------------------------------------------------------

/// The analysis of a single source file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    pub language: String,
    /// SHA-256 of the content. Files recorded without being read carry a
    /// stand-in instead (`oversize:<bytes>`, `unreadable`, or empty after a
    /// timeout or worker panic).
    pub content_hash: String,
    pub symbols: SymbolInfo,
    pub patterns: Vec<DetectedPattern>,
    pub complexity: ComplexityMetrics,
    pub teaching_value: TeachingValueScore,
    pub errors: Vec<String>,
    pub has_errors: bool,
    pub analyzed_at: DateTime<Utc>,
    pub analysis_ms: f64,
    pub cache_hit: bool,
}

impl FileAnalysis {
    /// An analysis carrying only an error, used when a file could not be
    /// analyzed at all (unreadable, timed out, worker panic).
    pub fn failed(path: &str, language: &str, content_hash: &str, error: String) -> Self {
        Self {
            path: path.to_string(),
            language: language.to_string(),
            content_hash: content_hash.to_string(),
            symbols: SymbolInfo::default(),
            patterns: Vec::new(),
            complexity: ComplexityMetrics::default(),
            teaching_value: TeachingValueScore::default(),
            errors: vec![error],
            has_errors: true,
            analyzed_at: Utc::now(),
            analysis_ms: 0.0,
            cache_hit: false,
        }
    }

    /// Same analysis, marked as served from a cache or snapshot.
    pub fn served_from_cache(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

// ---------------------------------------------------------------------------
// 5. Codebase-level results
// ---------------------------------------------------------------------------

/// A file ranked by its teaching value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeachingFile {
    pub path: String,
    pub score: f64,
    pub reason: String,
}

/// Aggregates that depend only on the merged file set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseMetrics {
    pub total_files: usize,
    pub total_lines: usize,
    pub total_functions: usize,
    pub total_classes: usize,
    pub total_imports: usize,
    pub avg_complexity: f64,
    pub max_complexity: u32,
    pub avg_documentation_coverage: f64,
    pub avg_teaching_value: f64,
    pub files_with_errors: usize,
    pub languages: BTreeMap<String, usize>,
    pub circular_dependency_count: usize,
    pub external_package_count: usize,
}

/// Facts about one `analyze_codebase` run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub incremental: bool,
    pub files_analyzed: usize,
    pub files_reused: usize,
    pub files_failed: usize,
    pub files_timed_out: usize,
    pub cache_hit_rate: f64,
    pub duration_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodebaseAnalysis {
    pub codebase_id: String,
    pub root: String,
    pub files: BTreeMap<String, FileAnalysis>,
    pub dependency_graph: DependencyGraph,
    pub global_patterns: Vec<PatternSummary>,
    pub top_teaching_files: Vec<TeachingFile>,
    pub metrics: CodebaseMetrics,
    pub scan: ScanStats,
    pub analyzed_at: DateTime<Utc>,
}

/// Envelope written to `analysis.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub analysis: CodebaseAnalysis,
}

/// Path to content-hash map used for change detection.
pub type FileManifest = BTreeMap<String, String>;
