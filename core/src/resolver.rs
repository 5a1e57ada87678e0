//! Path Resolver (4.A): maps a symbolic Python import to a concrete file
//! under the source root.
//!
//! Grounded on the dotted/relative resolution walk in the original
//! `resolve_dotted_import`/`resolve_imported_file_path` pair: local-first,
//! then parent-relative, always preferring an explicit package marker over a
//! namespace package.

use std::path::{Path, PathBuf};

pub const PACKAGE_MARKER: &str = "__init__.py";
pub const SOURCE_EXT: &str = "py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    File,
    Package,
    NamespacePackage,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub absolute_path: PathBuf,
    pub kind: ResolvedKind,
}

#[derive(Debug, Clone)]
pub struct ResolutionMiss {
    pub reason: String,
}

pub type ResolveResult = Result<Resolved, ResolutionMiss>;

/// A symbolic reference to resolve, in the two shapes 4.A distinguishes.
#[derive(Debug, Clone)]
pub enum ImportRef<'a> {
    Plain { module_name: &'a str, from_file: &'a Path },
    From { module_name: &'a str, relative_level: u32, from_file: &'a Path },
}

fn has_package_marker(dir: &Path) -> bool {
    dir.join(PACKAGE_MARKER).is_file()
}

fn source_file_in(dir: &Path, stem: &str) -> Option<PathBuf> {
    let candidate = dir.join(format!("{stem}.{SOURCE_EXT}"));
    candidate.is_file().then_some(candidate)
}

/// Classify a directory as package / namespace package, given its existence
/// is already established by the caller.
fn classify_dir(dir: PathBuf) -> Resolved {
    if has_package_marker(&dir) {
        Resolved { absolute_path: dir, kind: ResolvedKind::Package }
    } else {
        Resolved { absolute_path: dir, kind: ResolvedKind::NamespacePackage }
    }
}

/// Descend through the dotted components of `module_name` starting at `base`,
/// requiring a directory for every intermediate component and accepting a
/// file, package, or namespace package at the terminal one.
fn descend_dotted(base: &Path, module_name: &str) -> ResolveResult {
    if module_name.is_empty() {
        return if base.is_dir() {
            Ok(classify_dir(base.to_path_buf()))
        } else {
            Err(ResolutionMiss { reason: format!("base path does not exist: {}", base.display()) })
        };
    }
    let parts: Vec<&str> = module_name.split('.').collect();
    let mut cursor = base.to_path_buf();
    for (i, part) in parts.iter().enumerate() {
        let is_terminal = i == parts.len() - 1;
        if is_terminal {
            if let Some(f) = source_file_in(&cursor, part) {
                return Ok(Resolved { absolute_path: f, kind: ResolvedKind::File });
            }
            let candidate_dir = cursor.join(part);
            if candidate_dir.is_dir() {
                return Ok(classify_dir(candidate_dir));
            }
            return Err(ResolutionMiss { reason: format!("no file or directory named '{part}'") });
        } else {
            cursor = cursor.join(part);
            if !cursor.is_dir() {
                return Err(ResolutionMiss {
                    reason: format!("intermediate segment '{part}' is not a directory"),
                });
            }
        }
    }
    unreachable!("module_name is non-empty so the loop always returns")
}

/// Probe an atomic (non-dotted) name: sibling file, sibling package dir,
/// parent-sibling file, parent-sibling package dir, in that order.
fn probe_atomic(start_dir: &Path, name: &str) -> ResolveResult {
    if let Some(f) = source_file_in(start_dir, name) {
        return Ok(Resolved { absolute_path: f, kind: ResolvedKind::File });
    }
    let sibling_dir = start_dir.join(name);
    if sibling_dir.is_dir() {
        return Ok(classify_dir(sibling_dir));
    }
    if let Some(parent) = start_dir.parent() {
        if let Some(f) = source_file_in(parent, name) {
            return Ok(Resolved { absolute_path: f, kind: ResolvedKind::File });
        }
        let parent_sibling_dir = parent.join(name);
        if parent_sibling_dir.is_dir() {
            return Ok(classify_dir(parent_sibling_dir));
        }
    }
    Err(ResolutionMiss { reason: format!("no match for '{name}' from {}", start_dir.display()) })
}

/// Resolve `reference` against the source tree. `from_file` must be a real path
/// inside the tree (its parent directory is used as the resolution base).
pub fn resolve(reference: &ImportRef) -> ResolveResult {
    match *reference {
        ImportRef::Plain { module_name, from_file } => {
            let start_dir = from_file.parent().unwrap_or_else(|| Path::new("."));
            if module_name.contains('.') {
                descend_dotted(start_dir, module_name)
            } else {
                probe_atomic(start_dir, module_name)
            }
        }
        ImportRef::From { module_name, relative_level, from_file } => {
            if relative_level > 0 {
                let start_dir = from_file.parent().unwrap_or_else(|| Path::new("."));
                let mut base = start_dir.to_path_buf();
                for _ in 0..relative_level.saturating_sub(1) {
                    base = match base.parent() {
                        Some(p) => p.to_path_buf(),
                        None => {
                            return Err(ResolutionMiss {
                                reason: "relative import ascends above the source root".to_string(),
                            })
                        }
                    };
                }
                descend_dotted(&base, module_name)
            } else if module_name.contains('.') {
                let start_dir = from_file.parent().unwrap_or_else(|| Path::new("."));
                descend_dotted(start_dir, module_name)
            } else {
                let start_dir = from_file.parent().unwrap_or_else(|| Path::new("."));
                probe_atomic(start_dir, module_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn resolves_relative_import_to_sibling_module() {
        let root = tempdir().unwrap();
        let pkg = root.path().join("a").join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join(PACKAGE_MARKER), "").unwrap();
        fs::write(pkg.join("m.py"), "from . import helpers\n").unwrap();
        fs::write(pkg.join("helpers.py"), "").unwrap();

        let from_file = pkg.join("m.py");
        let r = resolve(&ImportRef::From { module_name: "helpers", relative_level: 1, from_file: &from_file });
        let resolved = r.expect("expected helpers.py to resolve");
        assert_eq!(resolved.absolute_path, pkg.join("helpers.py"));
        assert_eq!(resolved.kind, ResolvedKind::File);
    }

    #[test]
    fn reports_missing_segment_on_dotted_miss() {
        let root = tempdir().unwrap();
        let file = root.path().join("mod.py");
        fs::write(&file, "import no.such.mod\n").unwrap();

        let r = resolve(&ImportRef::Plain { module_name: "no.such.mod", from_file: &file });
        let err = r.expect_err("expected a miss");
        assert!(err.reason.contains("no"));
    }

    #[test]
    fn prefers_package_marker_over_namespace_package() {
        let root = tempdir().unwrap();
        let file = root.path().join("m.py");
        fs::write(&file, "").unwrap();
        let pkg_dir = root.path().join("sub");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join(PACKAGE_MARKER), "").unwrap();

        let r = resolve(&ImportRef::Plain { module_name: "sub", from_file: &file }).unwrap();
        assert_eq!(r.kind, ResolvedKind::Package);
    }
}
