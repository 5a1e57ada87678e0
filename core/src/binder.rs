//! Reference Binder (4.C): links each file's imports and qualified calls to
//! the modules they reference, building the incoming-reference lists and the
//! interned DependencyGraph.
//!
//! Grounded on `build_enhanced_graph`'s best-effort module-name fallback: a
//! resolver miss is not an error, it just means the call/import contributes
//! no edge unless a module of that name happens to already exist in the
//! project model.

use crate::analyzer::{Call, IncomingReference, ReferenceKind, SourceFile};
use crate::resolver::{self, ImportRef, ResolvedKind, PACKAGE_MARKER};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub target: ModuleId,
    pub kind: ReferenceKind,
    pub resolved_path: Option<std::path::PathBuf>,
}

/// Directed graph over interned module ids, at most one edge per `(u, v, kind)`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    ids: HashMap<String, ModuleId>,
    adjacency: HashMap<ModuleId, Vec<Edge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, module: &str) -> ModuleId {
        if let Some(id) = self.ids.get(module) {
            return *id;
        }
        let id = ModuleId(self.names.len() as u32);
        self.names.push(module.to_string());
        self.ids.insert(module.to_string(), id);
        id
    }

    pub fn module_name(&self, id: ModuleId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn add_edge(&mut self, source: ModuleId, edge: Edge) {
        let edges = self.adjacency.entry(source).or_default();
        if !edges.iter().any(|e| e.target == edge.target && e.kind == edge.kind) {
            edges.push(edge);
        }
    }

    pub fn edges_from(&self, source: ModuleId) -> &[Edge] {
        self.adjacency.get(&source).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn module_count(&self) -> usize {
        self.names.len()
    }
}

/// Bind all references across `files`, mutating each file's `incoming` list
/// and returning the built dependency graph. `files` is keyed by absolute path
/// so qualifier/module lookups can find a file's module name.
pub fn bind(files: &mut HashMap<std::path::PathBuf, SourceFile>) -> DependencyGraph {
    let mut graph = DependencyGraph::new();

    // module_name -> one representative absolute path, for best-effort fallback binding.
    let module_to_path: HashMap<String, std::path::PathBuf> =
        files.iter().map(|(p, f)| (f.module.clone(), p.clone())).collect();

    let paths: Vec<std::path::PathBuf> = files.keys().cloned().collect();

    for path in &paths {
        let (source_module, plain_imports, from_imports, calls) = {
            let f = &files[path];
            (f.module.clone(), f.plain_imports.clone(), f.from_imports.clone(), f.calls.clone())
        };
        let source_id = graph.intern(&source_module);

        for imp in &plain_imports {
            let resolution = resolver::resolve(&ImportRef::Plain { module_name: &imp.name, from_file: path });
            bind_one(&mut graph, &mut *files, &module_to_path, source_id, &source_module, &imp.name, resolution);
        }

        for imp in &from_imports {
            if imp.module.is_empty() {
                // `from . import helpers` / `from .. import helpers`: there is no
                // module to resolve, only a package directory. Each imported name
                // is itself a submodule of that directory, so resolve and bind
                // each one independently.
                for name in &imp.names {
                    let resolution = resolver::resolve(&ImportRef::From {
                        module_name: name,
                        relative_level: imp.level,
                        from_file: path,
                    });
                    bind_one(&mut graph, &mut *files, &module_to_path, source_id, &source_module, name, resolution);
                }
            } else {
                let resolution = resolver::resolve(&ImportRef::From {
                    module_name: &imp.module,
                    relative_level: imp.level,
                    from_file: path,
                });
                bind_one(&mut graph, &mut *files, &module_to_path, source_id, &source_module, &imp.module, resolution);
            }
        }

        for call in &calls {
            if let Call::Qualified { qualifier, .. } = call {
                if let Some(target_path) = module_to_path.get(qualifier) {
                    let target_module = files[target_path].module.clone();
                    let target_id = graph.intern(&target_module);
                    graph.add_edge(
                        source_id,
                        Edge { target: target_id, kind: ReferenceKind::Call, resolved_path: Some(target_path.clone()) },
                    );
                    files.get_mut(target_path).unwrap().add_incoming(IncomingReference {
                        source_module: source_module.clone(),
                        kind: ReferenceKind::Call,
                    });
                }
            }
        }
    }

    graph
}

fn bind_one(
    graph: &mut DependencyGraph,
    files: &mut HashMap<std::path::PathBuf, SourceFile>,
    module_to_path: &HashMap<String, std::path::PathBuf>,
    source_id: ModuleId,
    source_module: &str,
    fallback_module_name: &str,
    resolution: resolver::ResolveResult,
) {
    let target_path = match resolution {
        Ok(resolved) => {
            let candidate = match resolved.kind {
                ResolvedKind::File => Some(resolved.absolute_path),
                // A resolved package has no file of its own; the module it
                // contributes is represented by its marker file.
                ResolvedKind::Package => Some(resolved.absolute_path.join(PACKAGE_MARKER)),
                ResolvedKind::NamespacePackage => None,
            };
            match candidate {
                Some(p) if files.contains_key(&p) => Some(p),
                _ => module_to_path.get(fallback_module_name).cloned(),
            }
        }
        Err(_) => module_to_path.get(fallback_module_name).cloned(),
    };

    let Some(target_path) = target_path else { return };
    let target_module = files[&target_path].module.clone();
    let target_id = graph.intern(&target_module);
    graph.add_edge(
        source_id,
        Edge { target: target_id, kind: ReferenceKind::Import, resolved_path: Some(target_path.clone()) },
    );
    files.get_mut(&target_path).unwrap().add_incoming(IncomingReference {
        source_module: source_module.to_string(),
        kind: ReferenceKind::Import,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn binds_relative_import_and_builds_graph_edge() {
        let root = tempdir().unwrap();
        let pkg = root.path().join("a").join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(root.path().join("a").join(crate::resolver::PACKAGE_MARKER), "").unwrap();
        fs::write(pkg.join(crate::resolver::PACKAGE_MARKER), "").unwrap();
        fs::write(pkg.join("m.py"), "from . import helpers\n").unwrap();
        fs::write(pkg.join("helpers.py"), "").unwrap();

        let mut files = HashMap::new();
        for name in ["m.py", "helpers.py"] {
            let path = pkg.join(name);
            let text = fs::read_to_string(&path).unwrap();
            let sf = analyze(&path, root.path(), &text);
            files.insert(path, sf);
        }

        let graph = bind(&mut files);
        let helpers = files.get(&pkg.join("helpers.py")).unwrap();
        assert!(helpers.incoming.iter().any(|r| r.source_module == "a.pkg.m" && r.kind == ReferenceKind::Import));
        assert!(graph.module_count() >= 2);
    }

    #[test]
    fn qualified_call_binds_only_when_module_exists() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("caller.py"), "logger.info()\n").unwrap();
        fs::write(root.path().join("logger.py"), "").unwrap();

        let mut files = HashMap::new();
        for name in ["caller.py", "logger.py"] {
            let path = root.path().join(name);
            let text = fs::read_to_string(&path).unwrap();
            files.insert(path.clone(), analyze(&path, root.path(), &text));
        }
        bind(&mut files);
        let logger = files.get(&root.path().join("logger.py")).unwrap();
        assert!(logger.incoming.iter().any(|r| r.kind == ReferenceKind::Call));
    }
}
