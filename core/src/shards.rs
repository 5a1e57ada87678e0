//! Shard Extractor (4.F): converts office-family files into numbered text
//! shards and maintains the bidirectional ShardMap.
//!
//! Grounded on `convert_excel_to_text`/`convert_word_to_text`/
//! `convert_pdf_to_text`/`convert_ppt_to_text`/`convert_all_files` and
//! `save_mapping` from the original shard pipeline. Office byte-level
//! decoding is delegated to `calamine` (spreadsheets), a zip+XML walk
//! (docx/odt/pptx), and `pdf-extract` (PDF) — all treated as black boxes.

use crate::config::BinaryExtensionSet;
use crate::error::{CoreError, CoreResult};
use crate::progress::{Cadence, ProgressSink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardLabel {
    Sheet(String),
    Page(usize),
}

#[derive(Debug, Clone)]
pub struct Shard {
    pub id: u64,
    pub origin_absolute_path: PathBuf,
    pub label: ShardLabel,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdToFileEntry {
    original_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sheet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardMap {
    id_to_file: BTreeMap<String, IdToFileEntry>,
    relative_path_to_id: BTreeMap<String, String>,
}

impl ShardMap {
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Ok(ShardMap::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Io { path: Some(path.to_path_buf()), message: e.to_string() })?;
        serde_json::from_str(&raw).map_err(|e| CoreError::CorruptState { message: e.to_string() })
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::CorruptState { message: e.to_string() })?;
        std::fs::write(&tmp, body)
            .map_err(|e| CoreError::Io { path: Some(tmp.clone()), message: e.to_string() })?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CoreError::Io { path: Some(path.to_path_buf()), message: e.to_string() })?;
        Ok(())
    }

    pub fn origin_of(&self, shard_id: &str) -> Option<(&str, Option<&str>, Option<usize>)> {
        self.id_to_file.get(shard_id).map(|e| (e.original_file.as_str(), e.sheet.as_deref(), e.page))
    }

    pub fn ids_for_origin(&self, origin_absolute: &str) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .id_to_file
            .iter()
            .filter(|(_, e)| e.original_file == origin_absolute)
            .filter_map(|(id, _)| id.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn highest_id(&self) -> u64 {
        self.id_to_file.keys().filter_map(|k| k.parse::<u64>().ok()).max().unwrap_or(0)
    }

    fn known_relative_paths(&self) -> impl Iterator<Item = &String> {
        self.relative_path_to_id.keys()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfficeFamily {
    Spreadsheet,
    WordProcessor,
    Pdf,
    Presentation,
}

fn classify(ext: &str) -> Option<OfficeFamily> {
    match ext.to_lowercase().as_str() {
        "xls" | "xlsx" | "xlsm" => Some(OfficeFamily::Spreadsheet),
        "doc" | "docx" | "odt" => Some(OfficeFamily::WordProcessor),
        "pdf" => Some(OfficeFamily::Pdf),
        "ppt" | "pptx" => Some(OfficeFamily::Presentation),
        _ => None,
    }
}

/// Delete every `<id>.txt` under `shard_dir` not referenced by `keep`. Passing
/// `ShardMap::default()` clears the whole lake; passing a just-committed map
/// reclaims whatever a crash between the first shard write and the mapping
/// write left behind.
pub fn reclaim_orphans(shard_dir: &Path, keep: &ShardMap) -> CoreResult<()> {
    if !shard_dir.is_dir() {
        return Ok(());
    }
    let known: std::collections::HashSet<&String> = keep.known_relative_paths().collect();
    for entry in std::fs::read_dir(shard_dir)
        .map_err(|e| CoreError::Io { path: Some(shard_dir.to_path_buf()), message: e.to_string() })?
        .flatten()
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !known.contains(&name.to_string()) {
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}

fn extract_spreadsheet(path: &Path) -> CoreResult<Vec<(String, String)>> {
    use calamine::{open_workbook_auto, Reader};
    let mut wb = open_workbook_auto(path)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    let mut out = Vec::new();
    for sheet_name in wb.sheet_names().to_owned() {
        if let Ok(range) = wb.worksheet_range(&sheet_name) {
            let mut body = String::new();
            for row in range.rows() {
                let line: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                body.push_str(&line.join("\t"));
                body.push('\n');
            }
            out.push((sheet_name, body));
        }
    }
    Ok(out)
}

fn extract_pdf(path: &Path) -> CoreResult<Vec<String>> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    // pdf-extract separates pages with form feeds, matching the word-processor
    // splitting convention below.
    Ok(split_on_form_feed(&text))
}

fn split_on_form_feed(text: &str) -> Vec<String> {
    let pieces: Vec<String> = text.split('\x0c').map(|p| p.to_string()).filter(|p| !p.trim().is_empty()).collect();
    if pieces.is_empty() {
        vec![text.to_string()]
    } else {
        pieces
    }
}

fn read_zip_xml_part(path: &Path, part: &str) -> CoreResult<String> {
    let file = std::fs::File::open(path).map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    let mut entry = archive
        .by_name(part)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    Ok(xml)
}

fn extract_text_nodes(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                if let Ok(unescaped) = t.unescape() {
                    out.push_str(&unescaped);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        buf.clear();
    }
    out
}

fn extract_word(path: &Path) -> CoreResult<Vec<String>> {
    let xml = read_zip_xml_part(path, "word/document.xml")?;
    let text = extract_text_nodes(&xml);
    Ok(split_on_form_feed(&text))
}

fn extract_presentation(path: &Path) -> CoreResult<Vec<String>> {
    let file = std::fs::File::open(path).map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;

    let mut slide_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|e| e.name().to_string()))
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .collect();
    slide_names.sort_by_key(|n| slide_number(n));

    let mut out = Vec::new();
    for name in slide_names {
        let mut entry = archive
            .by_name(&name)
            .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .map_err(|e| CoreError::Extraction { path: path.to_path_buf(), message: e.to_string() })?;
        out.push(extract_text_nodes(&xml));
    }
    Ok(out)
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

/// Extract every shard for one origin file. Returns an empty list (logged,
/// non-fatal) if the file's extension is not an office family, or if
/// extraction fails outright.
fn extract_origin(path: &Path) -> Vec<(ShardLabel, String)> {
    let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
    let Some(family) = classify(&ext) else { return Vec::new() };

    let result: CoreResult<Vec<(ShardLabel, String)>> = match family {
        OfficeFamily::Spreadsheet => extract_spreadsheet(path)
            .map(|sheets| sheets.into_iter().map(|(name, body)| (ShardLabel::Sheet(name), body)).collect()),
        OfficeFamily::WordProcessor => {
            extract_word(path).map(|pages| pages.into_iter().enumerate().map(|(i, body)| (ShardLabel::Page(i + 1), body)).collect())
        }
        OfficeFamily::Pdf => {
            extract_pdf(path).map(|pages| pages.into_iter().enumerate().map(|(i, body)| (ShardLabel::Page(i + 1), body)).collect())
        }
        OfficeFamily::Presentation => extract_presentation(path)
            .map(|slides| slides.into_iter().enumerate().map(|(i, body)| (ShardLabel::Page(i + 1), body)).collect()),
    };

    match result {
        Ok(shards) => shards,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "shard extraction failed for one origin");
            Vec::new()
        }
    }
}

/// Run a full extraction pass over every office-family file under `root`
/// (excluding anything already inside `shard_dir`), writing shards and a
/// fresh `mapping.json` to `shard_dir`.
///
/// The docs lake is cleared at the start of every run (matching the original
/// `clear_docs_lake_dir` + `file_id = 1` behavior): shards are re-extracted
/// from scratch each time rather than appended to, so a shard superseded or
/// dropped between runs never lingers on disk to be served stale. Clearing
/// unconditionally also reclaims whatever a crash between the first shard
/// write and the mapping write left behind from a prior, incomplete run.
pub fn extract_all(
    root: &Path,
    shard_dir: &Path,
    _binary_exts: &BinaryExtensionSet,
    progress: &dyn ProgressSink,
) -> CoreResult<ShardMap> {
    std::fs::create_dir_all(shard_dir)
        .map_err(|e| CoreError::Io { path: Some(shard_dir.to_path_buf()), message: e.to_string() })?;
    reclaim_orphans(shard_dir, &ShardMap::default())?;

    let office_files: Vec<PathBuf> = ignore::WalkBuilder::new(root)
        .hidden(false)
        .build()
        .flatten()
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.is_file())
        .filter(|p| !p.starts_with(shard_dir))
        .filter(|p| {
            let ext = p.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
            classify(&ext).is_some()
        })
        .collect();

    let cadence = Cadence::new(office_files.len(), 5);
    let mut next_id: u64 = 1;
    let mut map = ShardMap::default();

    for origin in &office_files {
        let origin_abs = origin.canonicalize().unwrap_or_else(|_| origin.clone());
        for (label, body) in extract_origin(origin) {
            let id = next_id;
            next_id += 1;
            let shard_path = shard_dir.join(format!("{id}.txt"));
            std::fs::write(&shard_path, &body)
                .map_err(|e| CoreError::Io { path: Some(shard_path.clone()), message: e.to_string() })?;

            let entry = IdToFileEntry {
                original_file: origin_abs.to_string_lossy().to_string(),
                page: match &label {
                    ShardLabel::Page(p) => Some(*p),
                    ShardLabel::Sheet(_) => None,
                },
                sheet: match &label {
                    ShardLabel::Sheet(s) => Some(s.clone()),
                    ShardLabel::Page(_) => None,
                },
            };
            map.id_to_file.insert(id.to_string(), entry);
            map.relative_path_to_id.insert(format!("{id}.txt"), id.to_string());
        }
        if let Some(pct) = cadence.tick() {
            progress.report("shard_extraction", pct);
        }
    }

    map.save(&shard_dir.join("mapping.json"))?;
    reclaim_orphans(shard_dir, &map)?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use tempfile::tempdir;

    #[test]
    fn shard_map_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let mut map = ShardMap::default();
        map.id_to_file.insert(
            "1".to_string(),
            IdToFileEntry { original_file: "/a/report.xlsx".to_string(), page: None, sheet: Some("A".to_string()) },
        );
        map.relative_path_to_id.insert("1.txt".to_string(), "1".to_string());
        let path = dir.path().join("mapping.json");
        map.save(&path).unwrap();

        let loaded = ShardMap::load(&path).unwrap();
        assert_eq!(loaded.origin_of("1"), Some(("/a/report.xlsx", Some("A"), None)));
    }

    #[test]
    fn extraction_skips_non_office_files() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "hello").unwrap();
        let shard_dir = root.path().join("__docs__");
        let binary_exts = BinaryExtensionSet::default();
        let map = extract_all(root.path(), &shard_dir, &binary_exts, &NullProgress).unwrap();
        assert!(map.id_to_file.is_empty());
    }

    #[test]
    fn reclaim_orphans_removes_unreferenced_shard_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("5.txt"), "orphan").unwrap();
        let previous = ShardMap::default();
        reclaim_orphans(dir.path(), &previous).unwrap();
        assert!(!dir.path().join("5.txt").exists());
    }

    #[test]
    fn stale_shard_from_a_prior_committed_run_does_not_survive_the_next_run() {
        let root = tempdir().unwrap();
        let shard_dir = root.path().join("__docs__");
        std::fs::create_dir_all(&shard_dir).unwrap();
        std::fs::write(shard_dir.join("7.txt"), "stale").unwrap();
        let mut stale_map = ShardMap::default();
        stale_map.id_to_file.insert(
            "7".to_string(),
            IdToFileEntry { original_file: "/old/report.xlsx".to_string(), page: None, sheet: Some("A".to_string()) },
        );
        stale_map.relative_path_to_id.insert("7.txt".to_string(), "7".to_string());
        stale_map.save(&shard_dir.join("mapping.json")).unwrap();

        let binary_exts = BinaryExtensionSet::default();
        let new_map = extract_all(root.path(), &shard_dir, &binary_exts, &NullProgress).unwrap();

        assert!(!shard_dir.join("7.txt").exists());
        assert!(new_map.id_to_file.is_empty());
    }
}
