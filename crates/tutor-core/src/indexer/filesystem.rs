//! Source enumeration and reading for codebase scans.

use std::path::{Component, Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::config::DEFAULT_DATA_DIR;
use crate::errors::{TutorError, TutorResult};

/// Never analyzed, whatever the ignore files say.
const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*secret*",
    "*credential*",
];

const IMPLICIT_IGNORED_DIRS: &[&str] = &[".git", DEFAULT_DATA_DIR, "node_modules", "__pycache__"];

/// Per-project ignore file, same syntax as `.gitignore`.
pub const IGNORE_FILENAME: &str = ".tutorignore";

/// Enumerates and reads the files of one project.
pub trait SourceTree: Send + Sync {
    fn root(&self) -> &Path;

    /// Root-relative, `/`-separated paths of every candidate file, sorted.
    fn list_files(&self) -> TutorResult<Vec<String>>;

    fn read(&self, rel_path: &str) -> std::io::Result<Vec<u8>>;

    fn file_size(&self, rel_path: &str) -> std::io::Result<u64>;
}

/// A project on the local filesystem. Honors `.gitignore`, `.tutorignore`
/// and the configured exclude globs.
#[derive(Clone, Debug)]
pub struct DiskTree {
    root: PathBuf,
    exclude: Vec<String>,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>, exclude: &[String]) -> Self {
        Self {
            root: root.into(),
            exclude: exclude
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| p.trim_start_matches("./").to_string())
                .collect(),
        }
    }

    fn overrides(&self) -> TutorResult<ignore::overrides::Override> {
        let mut builder = OverrideBuilder::new(&self.root);
        let implicit = IMPLICIT_IGNORED_DIRS.iter().map(|d| format!("{d}/"));
        let sensitive = DEFAULT_SENSITIVE_EXCLUDE_PATTERNS.iter().map(|p| p.to_string());
        for pattern in implicit.chain(sensitive).chain(self.exclude.iter().cloned()) {
            builder
                .add(&format!("!{pattern}"))
                .map_err(|e| TutorError::validation(format!("invalid exclude glob {pattern:?}: {e}")))?;
        }
        builder
            .build()
            .map_err(|e| TutorError::validation(format!("invalid exclude globs: {e}")))
    }
}

impl SourceTree for DiskTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_files(&self) -> TutorResult<Vec<String>> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .follow_links(false)
            .add_custom_ignore_filename(IGNORE_FILENAME)
            .overrides(self.overrides()?);

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(normalize_rel_path(rel));
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, rel_path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.root.join(rel_path))
    }

    fn file_size(&self, rel_path: &str) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.root.join(rel_path))?.len())
    }
}

/// `/`-separated form of a relative path.
pub fn normalize_rel_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Root-relative form of `path`, rejecting anything that escapes `root`.
pub fn relative_to_root(root: &Path, path: &Path) -> TutorResult<String> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let mut parts: Vec<String> = Vec::new();
    let rel = joined
        .strip_prefix(root)
        .map_err(|_| TutorError::validation(format!("{} is outside {}", path.display(), root.display())))?;
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(TutorError::validation(format!(
                        "{} is outside {}",
                        path.display(),
                        root.display()
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        return Err(TutorError::validation(format!("{} names no file", path.display())));
    }
    Ok(parts.join("/"))
}
