//! Analysis orchestration: single files with cache-first lookup, whole
//! codebases with incremental diffing and bounded parallel fan-out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, SCAN_PREFIX};
use crate::config::{EngineConfig, TutorConfig};
use crate::errors::{TutorError, TutorResult};
use crate::graph::DependencyGraph;
use crate::indexer::filesystem::{relative_to_root, DiskTree, SourceTree};
use crate::indexer::imports::ImportResolver;
use crate::indexer::metrics::{compute_complexity, score_teaching_value};
use crate::indexer::parser::ParserRegistry;
use crate::indexer::patterns::detect_patterns;
use crate::indexer::pipeline::{parallel_map, run_bounded, CancellationToken, TaskOutcome};
use crate::models::{
    content_hash, CodebaseAnalysis, CodebaseMetrics, FileAnalysis, FileManifest, PatternSummary,
    ScanStats, SymbolInfo, TeachingFile,
};
use crate::store::snapshots::{validate_codebase_id, PersistenceManager};

/// Per-run options for [`AnalysisEngine::analyze_codebase_with`].
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Reuse stored analyses of files whose content hash is unchanged.
    pub incremental: bool,
    /// Consult and fill the cache for individual files.
    pub use_cache: bool,
    pub cancel: CancellationToken,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            incremental: true,
            use_cache: true,
            cancel: CancellationToken::new(),
        }
    }
}

/// Counters accumulated over the engine's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_files_analyzed: u64,
    pub total_cache_hits: u64,
    pub total_cache_misses: u64,
    pub cache_hit_rate: f64,
    pub total_analysis_time_ms: f64,
    pub avg_time_per_file_ms: f64,
    pub slow_operations_count: u64,
    pub errors_count: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    files_analyzed: u64,
    cache_hits: u64,
    cache_misses: u64,
    analysis_time_ms: f64,
    slow_operations: u64,
    errors: u64,
}

/// Cache key of one file analysis: path plus the first 16 hex chars of the
/// content hash.
pub fn file_cache_key(rel_path: &str, hash: &str) -> String {
    let short = hash.get(..16).unwrap_or(hash);
    format!("file:{rel_path}:{short}")
}

pub fn scan_cache_key(codebase_id: &str) -> String {
    format!("{SCAN_PREFIX}{codebase_id}")
}

/// Run parse, extraction, pattern detection and scoring over one file's
/// content. Never fails: problems are recorded in `errors`.
pub fn analyze_source(
    registry: &ParserRegistry,
    path: &str,
    language: &str,
    source: &[u8],
) -> FileAnalysis {
    let started = Instant::now();
    let hash = content_hash(source);
    let parsed = match registry.parse(path, source) {
        Ok(parsed) => parsed,
        Err(e) => {
            let message = match e {
                TutorError::Parse(msg) => format!("ParseError: {msg}"),
                other => other.to_string(),
            };
            let mut failed = FileAnalysis::failed(path, language, &hash, message);
            failed.analysis_ms = elapsed_ms(started);
            return failed;
        }
    };

    let mut errors = Vec::new();
    if parsed.has_errors {
        errors.push(match parsed.first_error_line {
            Some(line) => format!("ParseError: syntax error at line {line}"),
            None => "ParseError: syntax error".to_string(),
        });
    }
    let symbols = match registry.extract(&parsed) {
        Ok(symbols) => symbols,
        Err(e) => {
            errors.push(format!("ExtractionError: {e}"));
            SymbolInfo::default()
        }
    };
    let patterns = detect_patterns(&symbols, &parsed.source, path);
    let complexity = compute_complexity(&symbols, &parsed.source);
    let teaching_value = score_teaching_value(&symbols, &complexity, &patterns);

    FileAnalysis {
        path: path.to_string(),
        language: language.to_string(),
        content_hash: hash,
        symbols,
        patterns,
        complexity,
        teaching_value,
        has_errors: !errors.is_empty(),
        errors,
        analyzed_at: Utc::now(),
        analysis_ms: elapsed_ms(started),
        cache_hit: false,
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Manifest entry of a file that could not be read.
const UNREADABLE_STAMP: &str = "unreadable";

/// Why a file was recorded without being hashed.
enum Unhashed {
    TooLarge(u64),
    Unreadable(String),
}

impl Unhashed {
    /// Stands in for the content hash in the manifest, so an unchanged
    /// failure is reused like any other file.
    fn stamp(&self) -> String {
        match self {
            Unhashed::TooLarge(size) => format!("oversize:{size}"),
            Unhashed::Unreadable(_) => UNREADABLE_STAMP.to_string(),
        }
    }

    fn into_error(self, limit: u64) -> String {
        match self {
            Unhashed::TooLarge(size) => {
                format!("FileTooLarge: {size} bytes exceeds limit of {limit} bytes")
            }
            Unhashed::Unreadable(error) => error,
        }
    }
}

fn read_checked(tree: &dyn SourceTree, path: &str, limit: u64) -> Result<Vec<u8>, Unhashed> {
    match tree.file_size(path) {
        Ok(size) if size > limit => return Err(Unhashed::TooLarge(size)),
        Ok(_) => {}
        Err(e) => return Err(Unhashed::Unreadable(format!("ReadError: {e}"))),
    }
    tree.read(path).map_err(|e| Unhashed::Unreadable(format!("ReadError: {e}")))
}

struct Job {
    path: String,
    language: &'static str,
}

/// Ties the parser registry, cache and persistence together for one
/// project root.
pub struct AnalysisEngine {
    root: PathBuf,
    config: EngineConfig,
    cache: Arc<CacheManager>,
    persistence: PersistenceManager,
    registry: Arc<ParserRegistry>,
    tree: Arc<dyn SourceTree>,
    counters: Mutex<EngineCounters>,
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

impl AnalysisEngine {
    pub fn new(
        root: impl Into<PathBuf>,
        config: EngineConfig,
        cache: Arc<CacheManager>,
        persistence: PersistenceManager,
    ) -> Self {
        let root = root.into();
        let tree: Arc<dyn SourceTree> = Arc::new(DiskTree::new(root.clone(), &config.exclude));
        Self {
            root,
            config,
            cache,
            persistence,
            registry: Arc::new(ParserRegistry::with_default_grammars()),
            tree,
            counters: Mutex::new(EngineCounters::default()),
        }
    }

    /// Engine with a fresh cache (durable tier opened) and persistence store
    /// laid out as `config` describes.
    pub fn from_config(root: impl Into<PathBuf>, config: &TutorConfig) -> Self {
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        if !cache.initialize() {
            warn!("durable cache unavailable, continuing memory-only");
        }
        Self::new(
            root,
            config.engine.clone(),
            cache,
            PersistenceManager::new(&config.persistence),
        )
    }

    /// Replace how files are enumerated and read. The tree's root should be
    /// the engine's root.
    pub fn with_source_tree(mut self, tree: Arc<dyn SourceTree>) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Single file
    // -----------------------------------------------------------------------

    /// Analyze one file under the root, serving a cached analysis of the
    /// same content when `use_cache` is set.
    pub fn analyze_file(&self, path: impl AsRef<Path>, use_cache: bool) -> TutorResult<FileAnalysis> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(TutorError::validation("file path must not be empty"));
        }
        let rel = relative_to_root(&self.root, path)?;
        let language = self
            .registry
            .detect_language(&rel)
            .ok_or_else(|| TutorError::UnsupportedLanguage(rel.clone()))?;

        let limit = self.config.max_file_bytes;
        let source = match read_checked(self.tree.as_ref(), &rel, limit) {
            Ok(source) => source,
            Err(unhashed) => {
                let stamp = unhashed.stamp();
                let error = unhashed.into_error(limit);
                return Ok(self.record_failure(&rel, language, &stamp, error));
            }
        };

        let key = file_cache_key(&rel, &content_hash(&source));
        if use_cache {
            if let Some(cached) = self.cache.get_analysis::<FileAnalysis>(&key) {
                self.counters.lock().cache_hits += 1;
                debug!(path = %rel, "file analysis served from cache");
                return Ok(cached.served_from_cache());
            }
        }

        let analysis = analyze_source(&self.registry, &rel, language, &source);
        self.record_analysis(&analysis, use_cache);
        if let Err(e) = self.cache.set_analysis(&key, &analysis, None) {
            warn!(path = %rel, error = %e, "failed to cache file analysis");
        }
        if let Err(e) = self
            .persistence
            .save_file_analysis(&self.config.default_codebase_id, &analysis)
        {
            warn!(path = %rel, error = %e, "failed to persist file analysis");
        }
        Ok(analysis)
    }

    fn record_failure(&self, rel: &str, language: &str, hash: &str, error: String) -> FileAnalysis {
        warn!(path = %rel, error = %error, "file analysis failed");
        let analysis = FileAnalysis::failed(rel, language, hash, error);
        self.record_analysis(&analysis, false);
        analysis
    }

    fn record_analysis(&self, analysis: &FileAnalysis, cache_consulted: bool) {
        let slow = analysis.analysis_ms > self.config.slow_threshold.as_secs_f64() * 1000.0;
        if slow {
            warn!(
                path = %analysis.path,
                analysis_ms = analysis.analysis_ms,
                "slow file analysis"
            );
        }
        let mut counters = self.counters.lock();
        counters.files_analyzed += 1;
        counters.analysis_time_ms += analysis.analysis_ms;
        if cache_consulted {
            counters.cache_misses += 1;
        }
        if slow {
            counters.slow_operations += 1;
        }
        if analysis.has_errors {
            counters.errors += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Whole codebase
    // -----------------------------------------------------------------------

    pub fn analyze_codebase(
        &self,
        codebase_id: &str,
        incremental: bool,
        use_cache: bool,
    ) -> TutorResult<CodebaseAnalysis> {
        self.analyze_codebase_with(
            codebase_id,
            &ScanOptions {
                incremental,
                use_cache,
                cancel: CancellationToken::new(),
            },
        )
    }

    /// Analyze every supported file under the root, then rebuild the graph
    /// and aggregates from the merged set and persist the result.
    ///
    /// On cancellation nothing is persisted or cached.
    pub fn analyze_codebase_with(
        &self,
        codebase_id: &str,
        options: &ScanOptions,
    ) -> TutorResult<CodebaseAnalysis> {
        validate_codebase_id(codebase_id)?;
        let started = Instant::now();
        let cancel = &options.cancel;
        cancel.check()?;

        let candidates: Vec<(String, &'static str)> = self
            .tree
            .list_files()?
            .into_iter()
            .filter_map(|path| self.registry.detect_language(&path).map(|lang| (path, lang)))
            .collect();
        info!(
            codebase_id,
            root = %self.root.display(),
            files = candidates.len(),
            incremental = options.incremental,
            "codebase analysis started"
        );

        let previous: FileManifest = if options.incremental {
            self.persistence.load_file_hashes(codebase_id)?
        } else {
            FileManifest::new()
        };

        let mut files: BTreeMap<String, FileAnalysis> = BTreeMap::new();
        let mut jobs: Vec<Job> = Vec::new();
        let mut scan = ScanStats {
            incremental: options.incremental,
            ..Default::default()
        };

        let limit = self.config.max_file_bytes;
        let tree = self.tree.as_ref();
        let probes = parallel_map(&candidates, self.config.workers, |(path, _)| {
            read_checked(tree, path, limit).map(|data| content_hash(&data))
        });
        cancel.check()?;

        for ((path, language), probe) in candidates.into_iter().zip(probes) {
            let reused = match &probe {
                Ok(hash) => self.reuse(codebase_id, &path, hash, &previous, options),
                Err(unhashed) => {
                    self.reuse_stored(codebase_id, &path, &unhashed.stamp(), &previous, options)
                }
            };
            if let Some(reused) = reused {
                self.counters.lock().cache_hits += 1;
                scan.files_reused += 1;
                files.insert(path, reused);
                continue;
            }
            match probe {
                Ok(_) => jobs.push(Job { path, language }),
                Err(unhashed) => {
                    let stamp = unhashed.stamp();
                    let error = unhashed.into_error(limit);
                    let failed = self.record_failure(&path, language, &stamp, error);
                    files.insert(path, failed);
                    scan.files_analyzed += 1;
                }
            }
        }

        let fresh = self.run_jobs(jobs, options.use_cache, cancel, &mut scan)?;
        for analysis in fresh {
            if options.use_cache && analysis.content_hash.len() >= 16 {
                let key = file_cache_key(&analysis.path, &analysis.content_hash);
                if let Err(e) = self.cache.set_analysis(&key, &analysis, None) {
                    warn!(path = %analysis.path, error = %e, "failed to cache file analysis");
                }
            }
            files.insert(analysis.path.clone(), analysis);
        }
        cancel.check()?;

        let resolver = ImportResolver::for_root(&self.root, files.keys());
        let dependency_graph = DependencyGraph::build(&files, &resolver);
        let metrics = codebase_metrics(&files, &dependency_graph);
        let global_patterns = pattern_summary(&files);
        let top_teaching_files = top_teaching_files(&files, self.config.top_files);

        scan.files_failed = files
            .values()
            .filter(|f| f.has_errors && !f.cache_hit)
            .count();
        scan.cache_hit_rate = if files.is_empty() {
            0.0
        } else {
            scan.files_reused as f64 / files.len() as f64
        };
        scan.duration_ms = elapsed_ms(started);

        let analysis = CodebaseAnalysis {
            codebase_id: codebase_id.to_string(),
            root: self.root.display().to_string(),
            files,
            dependency_graph,
            global_patterns,
            top_teaching_files,
            metrics,
            scan,
            analyzed_at: Utc::now(),
        };

        cancel.check()?;
        self.persist_scan(&analysis)?;

        info!(
            codebase_id,
            files = analysis.metrics.total_files,
            analyzed = analysis.scan.files_analyzed,
            reused = analysis.scan.files_reused,
            failed = analysis.scan.files_failed,
            timed_out = analysis.scan.files_timed_out,
            cycles = analysis.metrics.circular_dependency_count,
            duration_ms = analysis.scan.duration_ms,
            "codebase analysis finished"
        );
        Ok(analysis)
    }

    /// The last snapshot of `path`, when the manifest and the snapshot both
    /// record `stamp`.
    fn reuse_stored(
        &self,
        codebase_id: &str,
        path: &str,
        stamp: &str,
        previous: &FileManifest,
        options: &ScanOptions,
    ) -> Option<FileAnalysis> {
        if !options.incremental || previous.get(path).map(String::as_str) != Some(stamp) {
            return None;
        }
        match self.persistence.load_file_analysis(codebase_id, path) {
            Ok(Some(stored)) if stored.content_hash == stamp => Some(stored.served_from_cache()),
            Ok(_) => None,
            Err(e) => {
                warn!(path, error = %e, "stored file analysis unreadable, re-analyzing");
                None
            }
        }
    }

    /// A stored or cached analysis of exactly this content, if any.
    fn reuse(
        &self,
        codebase_id: &str,
        path: &str,
        hash: &str,
        previous: &FileManifest,
        options: &ScanOptions,
    ) -> Option<FileAnalysis> {
        if let Some(stored) = self.reuse_stored(codebase_id, path, hash, previous, options) {
            return Some(stored);
        }
        if options.use_cache {
            if let Some(cached) = self
                .cache
                .get_analysis::<FileAnalysis>(&file_cache_key(path, hash))
                .filter(|c| c.content_hash == hash)
            {
                return Some(cached.served_from_cache());
            }
        }
        None
    }

    fn run_jobs(
        &self,
        jobs: Vec<Job>,
        use_cache: bool,
        cancel: &CancellationToken,
        scan: &mut ScanStats,
    ) -> TutorResult<Vec<FileAnalysis>> {
        let labels: Vec<(String, &'static str)> =
            jobs.iter().map(|j| (j.path.clone(), j.language)).collect();
        let registry = Arc::clone(&self.registry);
        let tree = Arc::clone(&self.tree);

        let outcomes = run_bounded(
            jobs,
            self.config.workers,
            self.config.file_timeout,
            cancel,
            move |job: Job| match tree.read(&job.path) {
                Ok(source) => analyze_source(&registry, &job.path, job.language, &source),
                Err(e) => FileAnalysis::failed(
                    &job.path,
                    job.language,
                    UNREADABLE_STAMP,
                    format!("ReadError: {e}"),
                ),
            },
        )?;

        let mut results = Vec::with_capacity(outcomes.len());
        for ((path, language), outcome) in labels.into_iter().zip(outcomes) {
            scan.files_analyzed += 1;
            let analysis = match outcome {
                TaskOutcome::Completed(analysis) => {
                    debug!(path = %path, analysis_ms = analysis.analysis_ms, "file analyzed");
                    analysis
                }
                TaskOutcome::TimedOut => {
                    scan.files_timed_out += 1;
                    warn!(path = %path, timeout = ?self.config.file_timeout, "file analysis timed out");
                    FileAnalysis::failed(
                        &path,
                        language,
                        "",
                        format!(
                            "Timeout: analysis exceeded {}",
                            humanize(self.config.file_timeout)
                        ),
                    )
                }
                TaskOutcome::Panicked(message) => {
                    warn!(path = %path, panic = %message, "file analysis panicked");
                    FileAnalysis::failed(&path, language, "", format!("WorkerPanic: {message}"))
                }
            };
            self.record_analysis(&analysis, use_cache);
            results.push(analysis);
        }
        Ok(results)
    }

    /// Per-file snapshots and the full snapshot, then the manifest, then
    /// pruning of vanished files, then the scan cache entry.
    fn persist_scan(&self, analysis: &CodebaseAnalysis) -> TutorResult<()> {
        let id = analysis.codebase_id.as_str();
        let stale = self.persistence.load_file_hashes(id)?;

        self.persistence.save_analysis(analysis)?;
        let manifest: FileManifest = analysis
            .files
            .values()
            .map(|f| (f.path.clone(), f.content_hash.clone()))
            .collect();
        self.persistence.save_file_hashes(id, &manifest)?;

        for path in stale.keys().filter(|p| !analysis.files.contains_key(*p)) {
            match self.persistence.remove_file_analysis(id, path) {
                Ok(_) => debug!(codebase_id = id, path = %path, "pruned snapshot of removed file"),
                Err(e) => warn!(codebase_id = id, path = %path, error = %e, "failed to prune snapshot"),
            }
        }

        if let Err(e) = self.cache.set_analysis(&scan_cache_key(id), analysis, None) {
            warn!(codebase_id = id, error = %e, "failed to cache codebase analysis");
        }
        Ok(())
    }

    /// Latest analysis of `codebase_id`, from the cache or the snapshot
    /// store.
    pub fn load_codebase(&self, codebase_id: &str) -> TutorResult<Option<CodebaseAnalysis>> {
        validate_codebase_id(codebase_id)?;
        let key = scan_cache_key(codebase_id);
        if let Some(cached) = self.cache.get_analysis::<CodebaseAnalysis>(&key) {
            return Ok(Some(cached));
        }
        let stored = self.persistence.load_analysis(codebase_id)?;
        if let Some(analysis) = &stored {
            if let Err(e) = self.cache.set_analysis(&key, analysis, None) {
                warn!(codebase_id, error = %e, "failed to cache codebase analysis");
            }
        }
        Ok(stored)
    }

    /// Drop the cached and persisted analysis of `codebase_id`. True if a
    /// snapshot existed.
    pub fn forget_codebase(&self, codebase_id: &str) -> TutorResult<bool> {
        validate_codebase_id(codebase_id)?;
        self.cache.delete(&scan_cache_key(codebase_id));
        let removed = self.persistence.delete_analysis(codebase_id)?;
        info!(codebase_id, removed, "codebase forgotten");
        Ok(removed)
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let c = self.counters.lock();
        let lookups = c.cache_hits + c.cache_misses;
        PerformanceMetrics {
            total_files_analyzed: c.files_analyzed,
            total_cache_hits: c.cache_hits,
            total_cache_misses: c.cache_misses,
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                c.cache_hits as f64 / lookups as f64
            },
            total_analysis_time_ms: c.analysis_time_ms,
            avg_time_per_file_ms: if c.files_analyzed == 0 {
                0.0
            } else {
                c.analysis_time_ms / c.files_analyzed as f64
            },
            slow_operations_count: c.slow_operations,
            errors_count: c.errors,
        }
    }
}

fn humanize(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Aggregates over the merged file set. Independent of how each analysis
/// was obtained.
pub fn codebase_metrics(
    files: &BTreeMap<String, FileAnalysis>,
    graph: &DependencyGraph,
) -> CodebaseMetrics {
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();
    for file in files.values() {
        *languages.entry(file.language.clone()).or_default() += 1;
    }
    CodebaseMetrics {
        total_files: files.len(),
        total_lines: files.values().map(|f| f.complexity.lines_of_code).sum(),
        total_functions: files.values().map(|f| f.complexity.function_count).sum(),
        total_classes: files.values().map(|f| f.complexity.class_count).sum(),
        total_imports: files.values().map(|f| f.symbols.imports.len()).sum(),
        avg_complexity: mean(
            files
                .values()
                .filter(|f| f.complexity.function_count > 0)
                .map(|f| f.complexity.avg_complexity),
        ),
        max_complexity: files
            .values()
            .map(|f| f.complexity.max_complexity)
            .max()
            .unwrap_or(0),
        avg_documentation_coverage: mean(
            files.values().map(|f| f.complexity.documentation_coverage),
        ),
        avg_teaching_value: mean(files.values().map(|f| f.teaching_value.total)),
        files_with_errors: files.values().filter(|f| f.has_errors).count(),
        languages,
        circular_dependency_count: graph.circular_dependencies.len(),
        external_package_count: graph.external_packages.len(),
    }
}

/// Tally of every detected pattern tag, most frequent first.
pub fn pattern_summary(files: &BTreeMap<String, FileAnalysis>) -> Vec<PatternSummary> {
    struct Tally {
        occurrences: usize,
        confidence: f64,
        files: Vec<String>,
    }
    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for file in files.values() {
        for pattern in &file.patterns {
            let tally = tallies.entry(pattern.pattern_type.as_str()).or_insert(Tally {
                occurrences: 0,
                confidence: 0.0,
                files: Vec::new(),
            });
            tally.occurrences += 1;
            tally.confidence += pattern.confidence;
            if tally.files.last() != Some(&file.path) {
                tally.files.push(file.path.clone());
            }
        }
    }
    let mut summary: Vec<PatternSummary> = tallies
        .into_iter()
        .map(|(tag, t)| PatternSummary {
            pattern_type: tag.to_string(),
            occurrences: t.occurrences,
            avg_confidence: t.confidence / t.occurrences as f64,
            files: t.files,
        })
        .collect();
    summary.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.pattern_type.cmp(&b.pattern_type))
    });
    summary
}

/// The `limit` highest-scoring files; ties broken by path.
pub fn top_teaching_files(files: &BTreeMap<String, FileAnalysis>, limit: usize) -> Vec<TeachingFile> {
    let mut ranked: Vec<&FileAnalysis> = files.values().collect();
    ranked.sort_by(|a, b| {
        b.teaching_value
            .total
            .total_cmp(&a.teaching_value.total)
            .then_with(|| a.path.cmp(&b.path))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|f| TeachingFile {
            path: f.path.clone(),
            score: f.teaching_value.total,
            reason: f.teaching_value.explanation.clone(),
        })
        .collect()
}
