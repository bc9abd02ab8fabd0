//! Dependency graph construction and queries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use forge_cache::{SourceFile, SourceHasher};
use forge_common::ContentHash;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::debug;

use crate::discover::discover_sources;
use crate::error::GraphError;
use crate::imports::{parse_imports, ImportRef, ImportStyle};
use crate::language::SourceLanguage;

/// Identity of a graph node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    /// A file on disk, inside or outside the source roots.
    File(PathBuf),
    /// An external package or SDK module, identified by name.
    Module(String),
    /// A relative import that matched no file. Holds the path it pointed at.
    Unresolved(PathBuf),
}

impl NodeKey {
    /// Returns the file path for [`NodeKey::File`] nodes.
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            NodeKey::File(path) => Some(path),
            _ => None,
        }
    }
}

/// One compilation unit in the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyNode {
    /// Node identity.
    pub key: NodeKey,
    /// Snapshot of the file, for file nodes.
    pub source: Option<SourceFile>,
    /// `true` for leaves outside the declared roots (external files,
    /// packages, unresolved imports). External nodes are never expanded.
    pub external: bool,
    /// Detected language, for project files.
    pub language: Option<SourceLanguage>,
}

impl DependencyNode {
    /// Returns the content hash of file nodes.
    pub fn hash(&self) -> Option<ContentHash> {
        self.source.as_ref().map(|s| s.hash)
    }
}

/// Directed import graph of one target. Edges run from importer to imported.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<DependencyNode, ()>,
    index: HashMap<NodeKey, NodeIndex>,
    roots: Vec<PathBuf>,
}

/// Builds the dependency graph for the given source roots.
///
/// Every discovered file is snapshotted (hashed in parallel) and its imports
/// parsed. Fails if a root or a source file cannot be read, or if the imports
/// form a cycle.
pub fn build_graph(roots: &[PathBuf]) -> Result<DependencyGraph, GraphError> {
    let roots: Vec<PathBuf> = roots.iter().map(|r| absolute(r)).collect();

    let mut files = BTreeSet::new();
    for root in &roots {
        files.extend(discover_sources(root)?);
    }
    let files: Vec<PathBuf> = files.into_iter().collect();

    let snapshots = SourceHasher::snapshot(&files, |path, bytes| {
        SourceLanguage::detect(path)
            .map(|language| (language, parse_imports(language, &String::from_utf8_lossy(bytes))))
    })?;
    // Discovery only yields files with a known language.
    let parsed: Vec<(SourceFile, SourceLanguage, Vec<ImportRef>)> = snapshots
        .into_iter()
        .filter_map(|(source, parsed)| parsed.map(|(language, imports)| (source, language, imports)))
        .collect();

    let mut builder = GraphBuilder::new(roots, &files);
    for (source, language, _) in &parsed {
        builder.add_node(DependencyNode {
            key: NodeKey::File(source.path.clone()),
            source: Some(source.clone()),
            external: false,
            language: Some(*language),
        });
    }
    for (source, language, imports) in &parsed {
        let from = builder.index[&NodeKey::File(source.path.clone())];
        for import in imports {
            let to = builder.resolve(&source.path, *language, import)?;
            builder.graph.update_edge(from, to, ());
        }
    }

    let graph = builder.finish();
    graph.check_acyclic()?;
    debug!(
        files = files.len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built dependency graph"
    );
    Ok(graph)
}

struct GraphBuilder {
    graph: DiGraph<DependencyNode, ()>,
    index: HashMap<NodeKey, NodeIndex>,
    roots: Vec<PathBuf>,
    /// Project files by file name, for package-qualified lookups.
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl GraphBuilder {
    fn new(roots: Vec<PathBuf>, files: &[PathBuf]) -> Self {
        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for file in files {
            if let Some(name) = file.file_name() {
                by_name
                    .entry(name.to_string_lossy().into_owned())
                    .or_default()
                    .push(file.clone());
            }
        }
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            roots,
            by_name,
        }
    }

    fn add_node(&mut self, node: DependencyNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.key) {
            return idx;
        }
        let key = node.key.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        idx
    }

    fn leaf(&mut self, key: NodeKey) -> NodeIndex {
        self.add_node(DependencyNode {
            key,
            source: None,
            external: true,
            language: None,
        })
    }

    /// Resolves one import to a node, creating external leaves as needed.
    fn resolve(
        &mut self,
        importer: &Path,
        language: SourceLanguage,
        import: &ImportRef,
    ) -> Result<NodeIndex, GraphError> {
        let resolved = match import.style {
            ImportStyle::Path => self.resolve_path(importer, language, &import.specifier),
            ImportStyle::Qualified => self
                .resolve_qualified(&import.specifier)
                .map_or_else(|| NodeKey::Module(import.specifier.clone()), NodeKey::File),
            ImportStyle::Package | ImportStyle::Module => NodeKey::Module(import.specifier.clone()),
        };

        if let Some(&idx) = self.index.get(&resolved) {
            return Ok(idx);
        }
        match resolved {
            // A real file that was not discovered: outside the roots, or a
            // non-source asset. Hashed, but its own imports are not followed.
            NodeKey::File(path) => {
                let source = SourceHasher::snapshot_file(&path)?;
                Ok(self.add_node(DependencyNode {
                    key: NodeKey::File(path),
                    source: Some(source),
                    external: true,
                    language: None,
                }))
            }
            key => Ok(self.leaf(key)),
        }
    }

    fn resolve_path(&self, importer: &Path, language: SourceLanguage, spec: &str) -> NodeKey {
        let spec = if language.bare_specifiers_are_paths() {
            spec.split(['?', '#']).next().unwrap_or(spec)
        } else {
            spec
        };

        let base = match spec.strip_prefix('/') {
            Some(rooted) if language.bare_specifiers_are_paths() => self
                .root_of(importer)
                .map(|root| root.join(rooted))
                .unwrap_or_else(|| PathBuf::from(spec)),
            Some(_) => PathBuf::from(spec),
            None => importer
                .parent()
                .map(|dir| dir.join(spec))
                .unwrap_or_else(|| PathBuf::from(spec)),
        };
        let candidate = normalize(&base);

        probe(&candidate, language)
            .map(NodeKey::File)
            .unwrap_or(NodeKey::Unresolved(candidate))
    }

    fn resolve_qualified(&self, name: &str) -> Option<PathBuf> {
        let segments: Vec<&str> = name.split('.').collect();
        // `import static a.b.C.member` names a member; retry without trailing segments.
        for len in (1..=segments.len()).rev() {
            let (last, dirs) = segments[..len].split_last()?;
            for ext in SourceLanguage::Java.probe_extensions() {
                let file_name = format!("{last}.{ext}");
                let mut suffix: PathBuf = dirs.iter().collect();
                suffix.push(&file_name);
                let found = self
                    .by_name
                    .get(&file_name)
                    .and_then(|paths| paths.iter().find(|p| p.ends_with(&suffix)));
                if let Some(path) = found {
                    return Some(path.clone());
                }
            }
        }
        None
    }

    fn root_of(&self, path: &Path) -> Option<&PathBuf> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
    }

    fn finish(self) -> DependencyGraph {
        DependencyGraph {
            graph: self.graph,
            index: self.index,
            roots: self.roots,
        }
    }
}

/// Tries `candidate` as written, with each of the language's extensions
/// appended, as an SCSS partial, and as a directory index.
fn probe(candidate: &Path, language: SourceLanguage) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    let name = candidate.file_name()?.to_string_lossy().into_owned();
    let exts = language.probe_extensions();

    let with_ext = exts
        .iter()
        .map(|ext| candidate.with_file_name(format!("{name}.{ext}")));
    let partials = (language == SourceLanguage::Style)
        .then(|| {
            exts.iter()
                .map(|ext| candidate.with_file_name(format!("_{name}.{ext}")))
        })
        .into_iter()
        .flatten();
    let index = exts.iter().map(|ext| candidate.join(format!("index.{ext}")));

    with_ext.chain(partials).chain(index).find(|p| p.is_file())
}

/// Makes a path absolute against the current directory and normalizes it.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        std::env::current_dir()
            .map(|cwd| normalize(&cwd.join(path)))
            .unwrap_or_else(|_| normalize(path))
    }
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Expresses `path` relative to `base` when it lies inside it.
pub(crate) fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

impl DependencyGraph {
    /// Returns the normalized source roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of import edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates over every node.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.graph.node_weights()
    }

    /// Returns the project files (discovered under the roots), sorted.
    pub fn source_files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self
            .nodes()
            .filter(|n| !n.external)
            .filter_map(|n| n.key.as_file())
            .collect();
        files.sort();
        files
    }

    /// Looks up a node by key.
    pub fn node(&self, key: &NodeKey) -> Option<&DependencyNode> {
        self.index.get(key).map(|&idx| &self.graph[idx])
    }

    /// Returns the direct imports of `file`, sorted.
    pub fn dependencies_of(&self, file: &Path) -> Vec<&NodeKey> {
        self.neighbors(file, Direction::Outgoing)
    }

    /// Returns the files that directly import `file`, sorted.
    pub fn importers_of(&self, file: &Path) -> Vec<&NodeKey> {
        self.neighbors(file, Direction::Incoming)
    }

    fn neighbors(&self, file: &Path, direction: Direction) -> Vec<&NodeKey> {
        let Some(&idx) = self.index.get(&NodeKey::File(file.to_path_buf())) else {
            return Vec::new();
        };
        let mut keys: Vec<&NodeKey> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| &self.graph[n].key)
            .collect();
        keys.sort();
        keys
    }

    /// Returns the content hash of every file node, keyed by its path
    /// relative to `base` (absolute when outside it).
    pub fn file_hashes(&self, base: &Path) -> BTreeMap<PathBuf, ContentHash> {
        self.nodes()
            .filter_map(|n| Some((relative_to(base, n.key.as_file()?), n.hash()?)))
            .collect()
    }

    /// Returns the `(path, hash)` pairs that identify this graph for
    /// fingerprinting: every file node, plus module and unresolved leaves
    /// under a synthetic path derived from their name.
    pub fn fingerprint_inputs(&self, base: &Path) -> Vec<(PathBuf, ContentHash)> {
        let mut inputs: Vec<(PathBuf, ContentHash)> = self
            .nodes()
            .map(|node| match (&node.key, node.hash()) {
                (NodeKey::File(path), Some(hash)) => (relative_to(base, path), hash),
                (NodeKey::Module(name), _) => (
                    PathBuf::from(format!("module:{name}")),
                    ContentHash::from_bytes(name.as_bytes()),
                ),
                (key, _) => {
                    let text = format!("unresolved:{}", relative_to(base, key_path(key)).display());
                    (PathBuf::from(&text), ContentHash::from_bytes(text.as_bytes()))
                }
            })
            .collect();
        inputs.sort();
        inputs
    }

    /// Fails with [`GraphError::CyclicDependency`] if any import cycle exists.
    ///
    /// Cycles are found as strongly connected components; the reported cycle
    /// is the one whose smallest member path sorts first, and every member
    /// file is named.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut cycles: Vec<Vec<PathBuf>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&n| self.graph.contains_edge(n, n))
            })
            .map(|scc| {
                let mut members: Vec<PathBuf> = scc
                    .iter()
                    .map(|&n| key_path(&self.graph[n].key).to_path_buf())
                    .collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        match cycles.into_iter().next() {
            Some(members) => Err(GraphError::CyclicDependency { members }),
            None => Ok(()),
        }
    }

    pub(crate) fn inner(&self) -> &DiGraph<DependencyNode, ()> {
        &self.graph
    }
}

fn key_path(key: &NodeKey) -> &Path {
    match key {
        NodeKey::File(path) | NodeKey::Unresolved(path) => path,
        NodeKey::Module(name) => Path::new(name.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn single_file_graph() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let a = write(&src, "a.js", "console.log('hi');\n");

        let graph = build_graph(&[src]).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.source_files(), vec![a.as_path()]);
    }

    #[test]
    fn resolves_relative_imports_with_probing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let main = write(&src, "main.ts", "import { x } from './util';\nimport w from './widgets';\n");
        let util = write(&src, "util.ts", "export const x = 1;\n");
        let widgets = write(&src, "widgets/index.tsx", "export default 1;\n");

        let graph = build_graph(&[src]).unwrap();
        assert_eq!(
            graph.dependencies_of(&main),
            vec![&NodeKey::File(util.clone()), &NodeKey::File(widgets)]
        );
        assert_eq!(graph.importers_of(&util), vec![&NodeKey::File(main)]);
    }

    #[test]
    fn packages_and_unresolved_become_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let app = write(&src, "app.js", "import React from 'react';\nimport gone from './gone';\n");

        let graph = build_graph(&[src.clone()]).unwrap();
        let deps = graph.dependencies_of(&app);
        assert_eq!(
            deps,
            vec![
                &NodeKey::Module("react".to_string()),
                &NodeKey::Unresolved(src.join("gone")),
            ]
        );
        assert!(graph.nodes().filter(|n| n.external).count() == 2);
    }

    #[test]
    fn file_outside_roots_is_hashed_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let shared = write(dir.path(), "shared/theme.css", "body {}\n");
        let site = write(&src, "site.css", "@import '../shared/theme.css';\n");

        let graph = build_graph(&[src]).unwrap();
        let node = graph.node(&NodeKey::File(shared.clone())).unwrap();
        assert!(node.external);
        assert_eq!(node.hash(), Some(ContentHash::from_bytes(b"body {}\n")));
        assert_eq!(graph.dependencies_of(&site), vec![&NodeKey::File(shared.clone())]);
        assert!(graph.dependencies_of(&shared).is_empty());
    }

    #[test]
    fn html_references_resolve_next_to_document() {
        let dir = tempfile::tempdir().unwrap();
        let web = dir.path().join("web");
        let index = write(
            &web,
            "index.html",
            "<link rel=\"stylesheet\" href=\"css/site.css?v=3\"><script src=\"/js/app.js\"></script>",
        );
        let css = write(&web, "css/site.css", "");
        let js = write(&web, "js/app.js", "");

        let graph = build_graph(&[web]).unwrap();
        assert_eq!(
            graph.dependencies_of(&index),
            vec![&NodeKey::File(css), &NodeKey::File(js)]
        );
    }

    #[test]
    fn java_qualified_imports() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("app/src/main/java");
        let main = write(
            &src,
            "com/example/Main.java",
            "package com.example;\nimport com.example.util.Strings;\nimport java.util.List;\n",
        );
        let strings = write(&src, "com/example/util/Strings.java", "package com.example.util;\n");

        let graph = build_graph(&[dir.path().join("app")]).unwrap();
        assert_eq!(
            graph.dependencies_of(&main),
            vec![
                &NodeKey::File(strings),
                &NodeKey::Module("java.util.List".to_string()),
            ]
        );
    }

    #[test]
    fn poh_imports_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let main = write(&src, "main.poh", "Start Program\nImport \"lib/math\"\nEnd Program\n");
        let math = write(&src, "lib/math.poh", "");

        let graph = build_graph(&[src]).unwrap();
        assert_eq!(graph.dependencies_of(&main), vec![&NodeKey::File(math)]);
    }

    #[test]
    fn two_file_cycle_names_both_members() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let a = write(&src, "a.js", "import './b.js';\n");
        let b = write(&src, "b.js", "import './a.js';\n");

        let err = build_graph(&[src]).unwrap_err();
        match err {
            GraphError::CyclicDependency { members } => assert_eq!(members, vec![a, b]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn three_file_cycle_and_self_import() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src, "a.js", "import './b.js';\n");
        write(&src, "b.js", "import './c.js';\n");
        write(&src, "c.js", "import './a.js';\n");
        let err = build_graph(&[src]).unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { ref members } if members.len() == 3));

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let me = write(&src, "me.js", "import './me.js';\n");
        let err = build_graph(&[src]).unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { ref members } if members == &vec![me]));
    }

    #[test]
    fn missing_root_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_graph(&[dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }));
    }

    #[test]
    fn fingerprint_inputs_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write(&src, "b.js", "import 'lodash';\n");
        write(&src, "a.js", "");

        let graph = build_graph(&[src]).unwrap();
        let inputs = graph.fingerprint_inputs(dir.path());
        let paths: Vec<_> = inputs.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("module:lodash"),
                PathBuf::from("src/a.js"),
                PathBuf::from("src/b.js"),
            ]
        );
        let hashes = graph.file_hashes(dir.path());
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[Path::new("src/a.js")], ContentHash::from_bytes(b""));
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d.js")), PathBuf::from("/a/c/d.js"));
    }
}
