//! File-level dependency graph built from resolved imports.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{TutorError, TutorResult};
use crate::indexer::imports::{ImportResolver, ImportTarget};
use crate::models::FileAnalysis;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub path: String,
    pub language: String,
    /// In-project files this file imports, sorted.
    pub imports: Vec<String>,
    /// In-project files importing this file, sorted.
    pub imported_by: Vec<String>,
    /// External package buckets this file imports, sorted.
    pub external_imports: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub import_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Each cycle starts and ends at the same node: `[a, b, a]`.
    pub circular_dependencies: Vec<Vec<String>>,
    pub external_packages: BTreeMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    /// Build the graph over every analyzed file. Files with errors still
    /// become nodes.
    pub fn build(files: &BTreeMap<String, FileAnalysis>, resolver: &ImportResolver) -> Self {
        let mut nodes: BTreeMap<String, GraphNode> = files
            .values()
            .map(|f| {
                (
                    f.path.clone(),
                    GraphNode {
                        path: f.path.clone(),
                        language: f.language.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let mut edge_counts: BTreeMap<(String, String), usize> = BTreeMap::new();
        let mut external_packages: BTreeMap<String, usize> = BTreeMap::new();
        let mut externals_by_file: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for file in files.values() {
            for import in &file.symbols.imports {
                match resolver.resolve(&file.path, &file.language, import) {
                    ImportTarget::Internal(target) => {
                        if target == file.path || !nodes.contains_key(&target) {
                            continue;
                        }
                        *edge_counts.entry((file.path.clone(), target)).or_default() += 1;
                    }
                    ImportTarget::External(package) => {
                        *external_packages.entry(package.clone()).or_default() += 1;
                        externals_by_file
                            .entry(file.path.clone())
                            .or_default()
                            .insert(package);
                    }
                    ImportTarget::Unresolved => {}
                }
            }
        }

        let mut edges = Vec::with_capacity(edge_counts.len());
        for ((source, target), import_count) in edge_counts {
            if let Some(node) = nodes.get_mut(&source) {
                node.imports.push(target.clone());
            }
            if let Some(node) = nodes.get_mut(&target) {
                node.imported_by.push(source.clone());
            }
            edges.push(GraphEdge {
                source,
                target,
                import_count,
            });
        }
        for (path, packages) in externals_by_file {
            if let Some(node) = nodes.get_mut(&path) {
                node.external_imports = packages.into_iter().collect();
            }
        }
        for node in nodes.values_mut() {
            node.imports.sort();
            node.imported_by.sort();
        }

        let mut graph = Self {
            nodes,
            edges,
            circular_dependencies: Vec::new(),
            external_packages,
        };
        graph.circular_dependencies = graph.find_cycles();
        graph
    }

    /// Iterative three-color DFS from every node in path order. Each back edge
    /// into a gray node yields one cycle.
    fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut color: BTreeMap<&str, Color> =
            self.nodes.keys().map(|k| (k.as_str(), Color::White)).collect();
        let mut cycles = Vec::new();

        for start in self.nodes.keys() {
            if color.get(start.as_str()) != Some(&Color::White) {
                continue;
            }
            // (node, index of the next neighbor to visit)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            color.insert(start.as_str(), Color::Gray);

            while let Some((node, next)) = stack.last().copied() {
                let neighbors = self.dependencies_of(node);
                let Some(neighbor) = neighbors.get(next) else {
                    color.insert(node, Color::Black);
                    stack.pop();
                    continue;
                };
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                match color.get(neighbor.as_str()).copied() {
                    Some(Color::White) => {
                        color.insert(neighbor.as_str(), Color::Gray);
                        stack.push((neighbor.as_str(), 0));
                    }
                    Some(Color::Gray) => {
                        if let Some(pos) = stack.iter().position(|(n, _)| *n == neighbor.as_str()) {
                            let mut cycle: Vec<String> =
                                stack[pos..].iter().map(|(n, _)| n.to_string()).collect();
                            cycle.push(neighbor.clone());
                            cycles.push(cycle);
                        }
                    }
                    _ => {}
                }
            }
        }
        cycles
    }

    pub fn dependencies_of(&self, path: &str) -> &[String] {
        self.nodes
            .get(path)
            .map(|n| n.imports.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, path: &str) -> &[String] {
        self.nodes
            .get(path)
            .map(|n| n.imported_by.as_slice())
            .unwrap_or(&[])
    }

    /// The `n` files with the most importers, ties broken by path.
    pub fn most_imported(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .nodes
            .values()
            .filter(|node| !node.imported_by.is_empty())
            .map(|node| (node.path.clone(), node.imported_by.len()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Every edge endpoint is a node, and `imported_by` mirrors the edges.
    pub fn check_consistency(&self) -> TutorResult<()> {
        let mut expected_forward: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut expected_reverse: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(TutorError::validation(format!(
                        "edge {} -> {} references unknown node {endpoint}",
                        edge.source, edge.target
                    )));
                }
            }
            expected_forward
                .entry(edge.source.as_str())
                .or_default()
                .insert(edge.target.as_str());
            expected_reverse
                .entry(edge.target.as_str())
                .or_default()
                .insert(edge.source.as_str());
        }
        for (path, node) in &self.nodes {
            let forward: BTreeSet<&str> = node.imports.iter().map(String::as_str).collect();
            let reverse: BTreeSet<&str> = node.imported_by.iter().map(String::as_str).collect();
            if forward != expected_forward.remove(path.as_str()).unwrap_or_default() {
                return Err(TutorError::validation(format!(
                    "imports of {path} disagree with edges"
                )));
            }
            if reverse != expected_reverse.remove(path.as_str()).unwrap_or_default() {
                return Err(TutorError::validation(format!(
                    "imported_by of {path} disagrees with edges"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportInfo, SymbolInfo};

    fn file(path: &str, imports: &[&str]) -> FileAnalysis {
        let mut analysis = FileAnalysis::failed(path, "python", "h", String::new());
        analysis.errors.clear();
        analysis.has_errors = false;
        analysis.symbols = SymbolInfo {
            imports: imports
                .iter()
                .enumerate()
                .map(|(i, m)| ImportInfo {
                    module: m.to_string(),
                    line_number: i + 1,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        analysis
    }

    fn graph(files: Vec<FileAnalysis>) -> DependencyGraph {
        let map: BTreeMap<String, FileAnalysis> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();
        let resolver = ImportResolver::new(map.keys().cloned(), None);
        DependencyGraph::build(&map, &resolver)
    }

    #[test]
    fn test_acyclic_graph() {
        let g = graph(vec![
            file("a.py", &["b", "c", "os"]),
            file("b.py", &["c", "os.path"]),
            file("c.py", &[]),
        ]);
        assert_eq!(g.nodes.len(), 3);
        assert!(g.circular_dependencies.is_empty());
        assert_eq!(g.dependencies_of("a.py"), ["b.py", "c.py"]);
        assert_eq!(g.dependents_of("c.py"), ["a.py", "b.py"]);
        assert_eq!(g.external_packages.get("os"), Some(&2));
        assert_eq!(g.nodes["a.py"].external_imports, vec!["os"]);
        assert_eq!(g.most_imported(1), vec![("c.py".to_string(), 2)]);
        g.check_consistency().unwrap();
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(vec![file("a.py", &["b"]), file("b.py", &["a"])]);
        assert_eq!(
            g.circular_dependencies,
            vec![vec!["a.py".to_string(), "b.py".to_string(), "a.py".to_string()]]
        );
        g.check_consistency().unwrap();
    }

    #[test]
    fn test_longer_cycle_and_self_import() {
        let g = graph(vec![
            file("a.py", &["a", "b"]),
            file("b.py", &["c"]),
            file("c.py", &["a"]),
        ]);
        assert_eq!(g.circular_dependencies.len(), 1);
        assert_eq!(g.circular_dependencies[0], vec!["a.py", "b.py", "c.py", "a.py"]);
        assert!(g.dependencies_of("a.py").iter().all(|p| p != "a.py"));
    }

    #[test]
    fn test_repeated_imports_count_on_one_edge() {
        let g = graph(vec![file("a.py", &["b", "b"]), file("b.py", &[])]);
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.edges[0].import_count, 2);
    }

    #[test]
    fn test_check_consistency_detects_drift() {
        let mut g = graph(vec![file("a.py", &["b"]), file("b.py", &[])]);
        g.nodes.get_mut("b.py").unwrap().imported_by.clear();
        assert!(g.check_consistency().unwrap_err().is_validation());

        let mut g = graph(vec![file("a.py", &["b"]), file("b.py", &[])]);
        g.nodes.remove("b.py");
        assert!(g.check_consistency().is_err());
    }

    #[test]
    fn test_cycle_report_is_reproducible() {
        let files = vec![
            file("x.py", &["y"]),
            file("y.py", &["z", "x"]),
            file("z.py", &["y"]),
        ];
        let first = graph(files.clone());
        let second = graph(files.into_iter().rev().collect());
        assert_eq!(first.circular_dependencies, second.circular_dependencies);
        assert_eq!(first.circular_dependencies.len(), 2);
    }
}
