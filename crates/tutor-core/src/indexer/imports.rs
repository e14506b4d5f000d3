//! Import resolution from language-specific import records to project files
//! or external package buckets.

use std::collections::BTreeSet;
use std::path::Path;

use crate::indexer::parser::{GO, JAVA, PYTHON, TYPESCRIPT};
use crate::models::ImportInfo;

/// Where an import points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportTarget {
    /// A root-relative path of a file in the analyzed set.
    Internal(String),
    /// An external package bucket.
    External(String),
    /// A relative import that names no file in the set.
    Unresolved,
}

const TS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs"];

/// Resolves imports against a fixed set of root-relative file paths.
#[derive(Clone, Debug, Default)]
pub struct ImportResolver {
    files: BTreeSet<String>,
    go_module: Option<String>,
}

impl ImportResolver {
    pub fn new<I, S>(files: I, go_module: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            go_module,
        }
    }

    /// Resolver for a project root, picking up the Go module path from
    /// `go.mod` when present.
    pub fn for_root<I, S>(root: &Path, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(files, read_go_module(root))
    }

    pub fn resolve(&self, source_path: &str, language: &str, import: &ImportInfo) -> ImportTarget {
        let module = import.module.trim();
        if module.is_empty() {
            return ImportTarget::Unresolved;
        }
        let resolved = match language {
            PYTHON => self.resolve_python(source_path, module, &import.symbols),
            JAVA => self.resolve_java(module),
            TYPESCRIPT => self.resolve_typescript(source_path, module),
            GO => self.resolve_go(source_path, module),
            _ => None,
        };
        if let Some(path) = resolved {
            return ImportTarget::Internal(path);
        }
        match external_package(language, module) {
            Some(bucket) => ImportTarget::External(bucket),
            None => ImportTarget::Unresolved,
        }
    }

    fn first_existing<I>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = String>,
    {
        candidates
            .into_iter()
            .map(|c| normalize_posix_path(&c))
            .find(|c| self.files.contains(c))
    }

    fn resolve_python(&self, source_path: &str, module: &str, symbols: &[String]) -> Option<String> {
        let base = if module.starts_with('.') {
            let levels = module.chars().take_while(|&c| c == '.').count();
            let suffix = &module[levels..];
            let mut base_dir = parent_dir(source_path).to_string();
            for _ in 0..levels.saturating_sub(1) {
                base_dir = parent_dir(&base_dir).to_string();
            }
            join(&base_dir, &suffix.replace('.', "/"))
        } else {
            module.replace('.', "/")
        };

        if let Some(found) = self.first_existing([format!("{base}.py")]) {
            return Some(found);
        }
        // `from pkg import submodule` names a file before the package itself
        symbols
            .iter()
            .filter(|s| s.as_str() != "*")
            .find_map(|symbol| self.first_existing([format!("{}.py", join(&base, symbol))]))
            .or_else(|| self.first_existing([format!("{base}/__init__.py")]))
    }

    fn resolve_java(&self, module: &str) -> Option<String> {
        if let Some(package) = module.strip_suffix(".*") {
            let package_dir = package.replace('.', "/");
            return self
                .files
                .iter()
                .find(|p| {
                    p.ends_with(".java")
                        && (parent_dir(p) == package_dir
                            || parent_dir(p).ends_with(&format!("/{package_dir}")))
                })
                .cloned();
        }
        let relative = format!("{}.java", module.replace('.', "/"));
        let nested = format!("/{relative}");
        self.files
            .iter()
            .find(|p| **p == relative || p.ends_with(&nested))
            .cloned()
    }

    fn resolve_typescript(&self, source_path: &str, module: &str) -> Option<String> {
        if !module.starts_with('.') {
            return None;
        }
        let base = normalize_posix_path(&join(parent_dir(source_path), module));
        let mut candidates = vec![base.clone()];
        // `./util.js` written against a `util.ts` source
        if let Some((stem, _)) = base.rsplit_once('.').filter(|(_, ext)| TS_EXTENSIONS.contains(ext)) {
            candidates.extend(TS_EXTENSIONS.iter().map(|ext| format!("{stem}.{ext}")));
        }
        candidates.extend(TS_EXTENSIONS.iter().map(|ext| format!("{base}.{ext}")));
        candidates.extend(TS_EXTENSIONS.iter().map(|ext| format!("{base}/index.{ext}")));
        self.first_existing(candidates)
    }

    fn resolve_go(&self, source_path: &str, module: &str) -> Option<String> {
        let package_dir = if module.starts_with('.') {
            normalize_posix_path(&join(parent_dir(source_path), module))
        } else {
            let root_module = self.go_module.as_deref()?;
            let rest = module.strip_prefix(root_module)?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return None;
            }
            rest.trim_start_matches('/').to_string()
        };
        // A Go import names a package directory; any non-test file in it stands in.
        let in_package = |p: &&String| p.ends_with(".go") && parent_dir(p) == package_dir;
        self.files
            .iter()
            .filter(in_package)
            .find(|p| !p.ends_with("_test.go"))
            .or_else(|| self.files.iter().find(in_package))
            .cloned()
    }
}

/// External package bucket of an unresolved import, or `None` for relative
/// imports that simply point nowhere.
pub fn external_package(language: &str, module: &str) -> Option<String> {
    let module = module.trim();
    if module.is_empty() || module.starts_with('.') {
        return None;
    }
    let bucket = match language {
        PYTHON => module.split('.').next().unwrap_or(module).to_string(),
        TYPESCRIPT => {
            let mut parts = module.split('/');
            match (parts.next(), parts.next()) {
                (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
                (Some(name), _) => name.to_string(),
                _ => module.to_string(),
            }
        }
        JAVA => {
            let module = module.strip_suffix(".*").unwrap_or(module);
            module.split('.').take(2).collect::<Vec<_>>().join(".")
        }
        GO => {
            let segments: Vec<&str> = module.split('/').collect();
            if segments.len() >= 3 && segments[0].contains('.') {
                segments[..3].join("/")
            } else {
                module.to_string()
            }
        }
        _ => module.to_string(),
    };
    Some(bucket)
}

fn read_go_module(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(root.join("go.mod")).ok()?;
    content.lines().find_map(|line| {
        line.trim()
            .strip_prefix("module ")
            .map(|name| name.trim().trim_matches('"').to_string())
    })
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{dir}/{rest}"),
    }
}

pub(crate) fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(module: &str) -> ImportInfo {
        ImportInfo {
            module: module.into(),
            is_relative: module.starts_with('.'),
            line_number: 1,
            ..Default::default()
        }
    }

    fn import_with(module: &str, symbols: &[&str]) -> ImportInfo {
        ImportInfo {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..import(module)
        }
    }

    #[test]
    fn test_normalize_posix_path() {
        assert_eq!(normalize_posix_path("src/./a/../b.ts"), "src/b.ts");
        assert_eq!(normalize_posix_path("./a"), "a");
        assert_eq!(normalize_posix_path("../../x"), "x");
    }

    #[test]
    fn test_python_resolution() {
        let r = ImportResolver::new(
            ["pkg/__init__.py", "pkg/models.py", "pkg/api/views.py", "pkg/api/util.py"],
            None,
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import("pkg.models")),
            ImportTarget::Internal("pkg/models.py".into())
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import("pkg")),
            ImportTarget::Internal("pkg/__init__.py".into())
        );
        assert_eq!(
            r.resolve("pkg/api/views.py", PYTHON, &import(".util")),
            ImportTarget::Internal("pkg/api/util.py".into())
        );
        assert_eq!(
            r.resolve("pkg/api/views.py", PYTHON, &import("..models")),
            ImportTarget::Internal("pkg/models.py".into())
        );
        assert_eq!(
            r.resolve("pkg/api/views.py", PYTHON, &import_with(".", &["util"])),
            ImportTarget::Internal("pkg/api/util.py".into())
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import_with("pkg", &["models"])),
            ImportTarget::Internal("pkg/models.py".into())
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import_with("pkg", &["helper"])),
            ImportTarget::Internal("pkg/__init__.py".into())
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import("requests.adapters")),
            ImportTarget::External("requests".into())
        );
        assert_eq!(
            r.resolve("app.py", PYTHON, &import(".missing")),
            ImportTarget::Unresolved
        );
    }

    #[test]
    fn test_typescript_resolution() {
        let r = ImportResolver::new(
            ["src/app.ts", "src/lib/util.ts", "src/components/index.tsx"],
            None,
        );
        assert_eq!(
            r.resolve("src/app.ts", TYPESCRIPT, &import("./lib/util")),
            ImportTarget::Internal("src/lib/util.ts".into())
        );
        assert_eq!(
            r.resolve("src/lib/util.ts", TYPESCRIPT, &import("../components")),
            ImportTarget::Internal("src/components/index.tsx".into())
        );
        assert_eq!(
            r.resolve("src/app.ts", TYPESCRIPT, &import("./lib/util.js")),
            ImportTarget::Internal("src/lib/util.ts".into())
        );
        assert_eq!(
            r.resolve("src/app.ts", TYPESCRIPT, &import("@angular/core/testing")),
            ImportTarget::External("@angular/core".into())
        );
        assert_eq!(
            r.resolve("src/app.ts", TYPESCRIPT, &import("lodash/fp")),
            ImportTarget::External("lodash".into())
        );
    }

    #[test]
    fn test_java_resolution() {
        let r = ImportResolver::new(
            [
                "src/main/java/com/example/App.java",
                "src/main/java/com/example/util/Strings.java",
            ],
            None,
        );
        assert_eq!(
            r.resolve("x.java", JAVA, &import("com.example.util.Strings")),
            ImportTarget::Internal("src/main/java/com/example/util/Strings.java".into())
        );
        assert_eq!(
            r.resolve("x.java", JAVA, &import("com.example.util.*")),
            ImportTarget::Internal("src/main/java/com/example/util/Strings.java".into())
        );
        assert_eq!(
            r.resolve("x.java", JAVA, &import("java.util.List")),
            ImportTarget::External("java.util".into())
        );
    }

    #[test]
    fn test_go_resolution() {
        let r = ImportResolver::new(
            ["main.go", "internal/store/store.go", "internal/store/store_test.go"],
            Some("github.com/acme/app".into()),
        );
        assert_eq!(
            r.resolve("main.go", GO, &import("github.com/acme/app/internal/store")),
            ImportTarget::Internal("internal/store/store.go".into())
        );
        assert_eq!(
            r.resolve("main.go", GO, &import("github.com/acme/application")),
            ImportTarget::External("github.com/acme/application".into())
        );
        assert_eq!(
            r.resolve("main.go", GO, &import("github.com/spf13/cobra/doc")),
            ImportTarget::External("github.com/spf13/cobra".into())
        );
        assert_eq!(
            r.resolve("main.go", GO, &import("net/http")),
            ImportTarget::External("net/http".into())
        );
    }

    #[test]
    fn test_go_module_read_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/tool\n\ngo 1.22\n").unwrap();
        let r = ImportResolver::for_root(dir.path(), ["cmd/run.go"]);
        assert_eq!(
            r.resolve("main.go", GO, &import("example.com/tool/cmd")),
            ImportTarget::Internal("cmd/run.go".into())
        );
    }
}
