//! Source Analyzer (4.B): parses one Python source file into its symbolic
//! record — imports, definitions, call sites — with a purpose-built
//! line scanner rather than a full AST parser.
//!
//! Grounded on `EnhancedCodeVisitor`/`determine_module_name` from the
//! original analysis pass; reimplemented here as regex-driven line scanning
//! since no Python-parsing crate is pulled into this workspace.

use crate::resolver::PACKAGE_MARKER;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// `import a.b.c` / `import a.b.c as x`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainImport {
    pub name: String,
    pub alias: String,
}

/// `from .a.b import x, y` / `from a import x`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromImport {
    pub module: String,
    pub names: Vec<String>,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Import {
    Plain(PlainImport),
    From(FromImport),
}

/// A call expression site. Qualified only for `identifier.attribute(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Qualified { qualifier: String, attribute: String },
    Free { expression: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    Import,
    Call,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingReference {
    pub source_module: String,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub absolute_path: PathBuf,
    pub module: String,
    pub plain_imports: Vec<PlainImport>,
    pub from_imports: Vec<FromImport>,
    pub definitions: Vec<String>,
    pub calls: Vec<Call>,
    pub incoming: Vec<IncomingReference>,
}

impl SourceFile {
    /// Append a reference, deduplicating by `(source_module, kind)`.
    pub fn add_incoming(&mut self, reference: IncomingReference) {
        if !self
            .incoming
            .iter()
            .any(|r| r.source_module == reference.source_module && r.kind == reference.kind)
        {
            self.incoming.push(reference);
        }
    }
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+([A-Za-z_][\w\.]*)(?:\s+as\s+(\w+))?").unwrap())
}

fn from_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*from\s+(\.*)([A-Za-z_][\w\.]*)?\s+import\s+(.+)$").unwrap()
    })
}

fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*def\s+(\w+)\s*\(").unwrap())
}

fn qualified_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_]\w*)\.([A-Za-z_]\w*)\s*\(").unwrap())
}

fn free_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\w.])([A-Za-z_]\w*)\s*\(").unwrap())
}

const PYTHON_KEYWORDS: &[&str] = &[
    "if", "for", "while", "with", "def", "class", "return", "elif", "except", "print", "not",
    "and", "or", "in", "is", "lambda", "yield", "assert", "raise", "del", "global", "nonlocal",
];

/// Parse one Python file's text into a `SourceFile`. `absolute_path` is used
/// only for module-name derivation and is not re-read from disk here.
pub fn analyze(absolute_path: &Path, source_root: &Path, text: &str) -> SourceFile {
    let mut plain_imports = Vec::new();
    let mut from_imports = Vec::new();
    let mut definitions = Vec::new();
    let mut calls = Vec::new();

    for line in text.lines() {
        if let Some(c) = import_re().captures(line) {
            let name = c.get(1).unwrap().as_str().to_string();
            let alias = c.get(2).map(|m| m.as_str().to_string()).unwrap_or_else(|| name.clone());
            plain_imports.push(PlainImport { name, alias });
            continue;
        }
        if let Some(c) = from_import_re().captures(line) {
            let dots = c.get(1).map(|m| m.as_str().len() as u32).unwrap_or(0);
            let module = c.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            let names: Vec<String> = c
                .get(3)
                .unwrap()
                .as_str()
                .split(',')
                .map(|n| n.trim().split(" as ").next().unwrap_or("").trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            from_imports.push(FromImport { module, names, level: dots });
            continue;
        }
        if let Some(c) = def_re().captures(line) {
            definitions.push(c.get(1).unwrap().as_str().to_string());
        }

        for c in qualified_call_re().captures_iter(line) {
            let qualifier = c.get(1).unwrap().as_str().to_string();
            let attribute = c.get(2).unwrap().as_str().to_string();
            if !PYTHON_KEYWORDS.contains(&qualifier.as_str()) {
                calls.push(Call::Qualified { qualifier, attribute });
            }
        }
        for c in free_call_re().captures_iter(line) {
            let name = c.get(1).unwrap().as_str();
            if PYTHON_KEYWORDS.contains(&name) {
                continue;
            }
            // Skip names already captured as the qualifier of a dotted call on this line.
            if qualified_call_re().captures_iter(line).any(|qc| qc.get(2).unwrap().as_str() == name) {
                continue;
            }
            calls.push(Call::Free { expression: name.to_string() });
        }
    }

    let module = determine_module_name(absolute_path, source_root);

    SourceFile {
        absolute_path: absolute_path.to_path_buf(),
        module,
        plain_imports,
        from_imports,
        definitions,
        calls,
        incoming: Vec::new(),
    }
}

/// Walk the directory chain from the source root to `absolute_path`,
/// accumulating package-marked directories and resetting on the first
/// directory that lacks a marker.
pub fn determine_module_name(absolute_path: &Path, source_root: &Path) -> String {
    let rel = absolute_path.strip_prefix(source_root).unwrap_or(absolute_path);
    let mut components: Vec<String> = Vec::new();
    let mut accumulator: Vec<String> = Vec::new();
    let mut cursor = source_root.to_path_buf();

    if let Some(parent) = rel.parent() {
        for part in parent.components() {
            let name = part.as_os_str().to_string_lossy().to_string();
            cursor = cursor.join(&name);
            if cursor.join(PACKAGE_MARKER).is_file() {
                accumulator.push(name);
            } else {
                accumulator.clear();
            }
        }
    }
    components.extend(accumulator);

    let basename = rel.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if basename == PACKAGE_MARKER {
        components.join(".")
    } else {
        let stem = Path::new(&basename).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or(basename);
        if components.is_empty() {
            stem
        } else {
            format!("{}.{}", components.join("."), stem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extracts_plain_and_from_imports() {
        let root = tempdir().unwrap();
        let file = root.path().join("m.py");
        let src = "import os\nimport numpy as np\nfrom . import helpers\nfrom a.b import c, d as e\n";
        fs::write(&file, src).unwrap();

        let sf = analyze(&file, root.path(), src);
        assert_eq!(sf.plain_imports, vec![
            PlainImport { name: "os".into(), alias: "os".into() },
            PlainImport { name: "numpy".into(), alias: "np".into() },
        ]);
        assert_eq!(sf.from_imports[0], FromImport { module: "".into(), names: vec!["helpers".into()], level: 1 });
        assert_eq!(sf.from_imports[1].names, vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn records_qualified_and_free_calls() {
        let root = tempdir().unwrap();
        let file = root.path().join("m.py");
        let src = "def run():\n    logger.info(\"x\")\n    helper()\n";
        fs::write(&file, src).unwrap();

        let sf = analyze(&file, root.path(), src);
        assert_eq!(sf.definitions, vec!["run".to_string()]);
        assert!(sf.calls.contains(&Call::Qualified { qualifier: "logger".into(), attribute: "info".into() }));
        assert!(sf.calls.contains(&Call::Free { expression: "helper".into() }));
    }

    #[test]
    fn module_name_resets_on_non_package_directory() {
        let root = tempdir().unwrap();
        let pkg = root.path().join("a").join("pkg");
        let loose = root.path().join("a").join("scripts");
        fs::create_dir_all(&pkg).unwrap();
        fs::create_dir_all(&loose).unwrap();
        fs::write(pkg.join(PACKAGE_MARKER), "").unwrap();
        // "a" itself has no marker, so the accumulator resets there.

        let m1 = determine_module_name(&pkg.join("x.py"), root.path());
        assert_eq!(m1, "pkg.x");

        let m2 = determine_module_name(&loose.join("y.py"), root.path());
        assert_eq!(m2, "y");
    }

    #[test]
    fn package_marker_file_itself_names_its_package() {
        let root = tempdir().unwrap();
        let pkg = root.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join(PACKAGE_MARKER), "").unwrap();

        let m = determine_module_name(&pkg.join(PACKAGE_MARKER), root.path());
        assert_eq!(m, "pkg");
    }
}
