//! Complexity metrics and the teaching-value score.

use crate::models::{
    clamp01, ComplexityMetrics, DetectedPattern, SymbolInfo, TeachingValueScore,
};

/// Average complexity range that scores 1.0.
const IDEAL_COMPLEXITY: (f64, f64) = (2.0, 8.0);
/// File size range (non-blank lines) that earns the size component.
const IDEAL_LINES: (usize, usize) = (20, 500);
/// Pattern confidence sum at which the pattern score saturates.
const PATTERN_SATURATION: f64 = 3.0;

const COMMENT_PREFIXES: &[&str] = &["#", "//", "/*", "*", "*/"];

pub fn compute_complexity(symbols: &SymbolInfo, source: &str) -> ComplexityMetrics {
    let mut lines_of_code = 0;
    let mut comment_lines = 0;
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines_of_code += 1;
        if COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            comment_lines += 1;
        }
    }

    let complexities: Vec<u32> = symbols.all_functions().map(|f| f.complexity.max(1)).collect();
    let cyclomatic_complexity: u32 = complexities.iter().sum();
    let function_count = complexities.len();
    let avg_complexity = if function_count == 0 {
        0.0
    } else {
        f64::from(cyclomatic_complexity) / function_count as f64
    };

    let documentable = function_count + symbols.classes.len();
    let documented = symbols
        .all_functions()
        .filter(|f| f.docstring.is_some())
        .count()
        + symbols
            .classes
            .iter()
            .filter(|c| c.docstring.is_some())
            .count();
    let documentation_coverage = if documentable == 0 {
        0.0
    } else {
        documented as f64 / documentable as f64
    };

    ComplexityMetrics {
        cyclomatic_complexity,
        avg_complexity,
        max_complexity: complexities.iter().copied().max().unwrap_or(0),
        lines_of_code,
        comment_lines,
        function_count,
        class_count: symbols.classes.len(),
        documentation_coverage,
    }
}

/// 1.0 inside the ideal range, decaying towards trivial and towards tangled code.
fn complexity_score(metrics: &ComplexityMetrics) -> f64 {
    let avg = metrics.avg_complexity;
    let (low, high) = IDEAL_COMPLEXITY;
    if metrics.function_count == 0 || avg <= 0.0 {
        0.0
    } else if avg < low {
        0.5 + 0.5 * (avg - 1.0).max(0.0) / (low - 1.0)
    } else if avg <= high {
        1.0
    } else {
        high / avg
    }
}

fn pattern_score(patterns: &[DetectedPattern]) -> f64 {
    let total: f64 = patterns.iter().map(|p| p.confidence).sum();
    (total / PATTERN_SATURATION).min(1.0)
}

fn structure_score(symbols: &SymbolInfo, metrics: &ComplexityMetrics) -> f64 {
    let (min_lines, max_lines) = IDEAL_LINES;
    let checks = [
        !symbols.functions.is_empty() || metrics.function_count > 0,
        !symbols.classes.is_empty(),
        (min_lines..=max_lines).contains(&metrics.lines_of_code),
        !symbols.imports.is_empty(),
    ];
    checks.iter().filter(|ok| **ok).count() as f64 / checks.len() as f64
}

pub fn score_teaching_value(
    symbols: &SymbolInfo,
    metrics: &ComplexityMetrics,
    patterns: &[DetectedPattern],
) -> TeachingValueScore {
    let mut score = TeachingValueScore {
        total: 0.0,
        documentation_score: clamp01(metrics.documentation_coverage),
        complexity_score: clamp01(complexity_score(metrics)),
        pattern_score: clamp01(pattern_score(patterns)),
        structure_score: clamp01(structure_score(symbols, metrics)),
        explanation: String::new(),
    };
    score.total = score.recompute_total();
    score.explanation = explain(&score, patterns);
    score
}

fn explain(score: &TeachingValueScore, patterns: &[DetectedPattern]) -> String {
    let components = [
        ("documentation", score.documentation_score),
        ("complexity", score.complexity_score),
        ("patterns", score.pattern_score),
        ("structure", score.structure_score),
    ];
    let strengths: Vec<&str> = components
        .iter()
        .filter(|(_, value)| *value >= 0.7)
        .map(|(name, _)| *name)
        .collect();
    let weaknesses: Vec<&str> = components
        .iter()
        .filter(|(_, value)| *value < 0.3)
        .map(|(name, _)| *name)
        .collect();

    let mut parts = Vec::new();
    if !strengths.is_empty() {
        parts.push(format!("strong {}", strengths.join(", ")));
    }
    if !weaknesses.is_empty() {
        parts.push(format!("weak {}", weaknesses.join(", ")));
    }
    if !patterns.is_empty() {
        let mut tags: Vec<&str> = patterns.iter().map(|p| p.pattern_type.as_str()).collect();
        tags.sort_unstable();
        tags.dedup();
        parts.push(format!("shows {}", tags.join(", ")));
    }
    if parts.is_empty() {
        "average teaching value".to_string()
    } else {
        parts.join("; ")
    }
}
