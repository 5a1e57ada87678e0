//! Agent Orchestrator (4.I): a tool-using retrieval loop over a fixed tool
//! set, driven by an `AgentModel` abstraction.
//!
//! Grounded on `search_agent.py`'s tool roster (`KeywordSuggestion`,
//! `FileContentSearch`, `FileContentRetrieval`, `CodeStructureAnalysis`,
//! `ProjectOverview`, `DirectoryExplorer`, `FilenameSearch`) and
//! `search_file_with_retry`/`search_files_recorded`'s retry-then-fallback
//! shape. The upstream wires those tools to a LangChain agent backed by a
//! real LLM; here the LLM call is abstracted behind `AgentModel` so the loop
//! and its tests run deterministically offline, with `HeuristicModel` as the
//! default keyword-matching implementation.

use crate::state::AppState;
use codescope_core::folder::{self, FolderNode};
use codescope_core::query;
use codescope_core::tokenizer::Tokenizer;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Context the agent is given budget to read before truncation kicks in.
const AGENT_TOKEN_BUDGET: usize = 9_000;
const MAX_AGENT_STEPS: usize = 6;

const OFFICE_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "doc", "docx", "odt", "ppt", "pptx", "pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    KeywordSuggestion,
    FileContentSearch,
    FileContentRetrieval,
    CodeStructureAnalysis,
    ProjectOverview,
    DirectoryExplorer,
    FilenameSearch,
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolName::KeywordSuggestion => "KeywordSuggestion",
            ToolName::FileContentSearch => "FileContentSearch",
            ToolName::FileContentRetrieval => "FileContentRetrieval",
            ToolName::CodeStructureAnalysis => "CodeStructureAnalysis",
            ToolName::ProjectOverview => "ProjectOverview",
            ToolName::DirectoryExplorer => "DirectoryExplorer",
            ToolName::FilenameSearch => "FilenameSearch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool: ToolName,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub enum AgentStep {
    Act { tool: ToolName, input: String },
    Finish { response: String },
}

#[derive(Debug, Clone)]
pub enum AgentError {
    Upstream { message: String },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Upstream { message } => write!(f, "agent model error: {message}"),
        }
    }
}

impl std::error::Error for AgentError {}

/// Abstraction over the model driving the loop's next action. A real
/// provider is wired in by implementing this trait against an HTTP client;
/// `HeuristicModel` is the deterministic offline default.
pub trait AgentModel: Send + Sync {
    fn complete(&self, prompt: &str, tool_results: &[ToolResult]) -> Result<AgentStep, AgentError>;
}

/// Deterministic, network-free default: search by content, fall back to a
/// filename search, retrieve the best match, then summarize it. Exercises
/// the full tool-calling loop without any external model dependency.
pub struct HeuristicModel;

impl AgentModel for HeuristicModel {
    fn complete(&self, prompt: &str, tool_results: &[ToolResult]) -> Result<AgentStep, AgentError> {
        let query_text = extract_query(prompt);

        let step = match tool_results.last() {
            None => AgentStep::Act { tool: ToolName::FileContentSearch, input: query_text },
            Some(last) if last.tool == ToolName::FileContentSearch => match extract_first_path(&last.output) {
                Some(path) => AgentStep::Act { tool: ToolName::FileContentRetrieval, input: path },
                None => AgentStep::Act { tool: ToolName::FilenameSearch, input: format!("{query_text} .") },
            },
            Some(last) if last.tool == ToolName::FilenameSearch => match extract_first_path(&last.output) {
                Some(path) => AgentStep::Act { tool: ToolName::FileContentRetrieval, input: path },
                None => AgentStep::Finish {
                    response: format!("no file could be found matching: {query_text}"),
                },
            },
            Some(last) if last.tool == ToolName::FileContentRetrieval => AgentStep::Finish {
                response: summarize_retrieval(&last.input, &last.output),
            },
            _ => AgentStep::Finish { response: "agent loop reached an unexpected state".to_string() },
        };
        Ok(step)
    }
}

fn extract_query(prompt: &str) -> String {
    for line in prompt.lines() {
        if let Some(rest) = line.strip_prefix("issue: ") {
            return rest.to_string();
        }
    }
    prompt.lines().next().unwrap_or_default().to_string()
}

fn extract_first_path(tool_output: &str) -> Option<String> {
    tool_output.lines().find_map(|line| line.strip_prefix("- ")).map(|rest| {
        rest.split(" (score:").next().unwrap_or(rest).trim().to_string()
    })
}

fn summarize_retrieval(path: &str, content: &str) -> String {
    let preview: String = content.chars().take(280).collect();
    format!("found relevant content in {path}:\n{preview}")
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Action { tool: ToolName, input: String },
    Observation { tool: ToolName, output: String },
    Finish { response: String },
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub response: String,
    pub search_queries: Vec<String>,
    pub file_paths: Vec<String>,
}

/// Drive the tool loop to completion (or the step cap), emitting `AgentEvent`s
/// through `on_event` as it goes so a caller can forward them over SSE.
pub fn run_agent(
    state: &AppState,
    issue: &str,
    trace_log: &str,
    search_keywords: &str,
    mut on_event: impl FnMut(AgentEvent),
) -> Result<AgentOutcome, AgentError> {
    let index_type = if search_keywords.trim().is_empty() { "docs" } else { "other" };

    let mut prompt = format!("issue: {issue}\n");
    if !trace_log.is_empty() {
        prompt.push_str(&format!("trace_log: {trace_log}\n"));
    }
    if !search_keywords.is_empty() {
        prompt.push_str(&format!("keywords: {search_keywords}\n"));
    }

    let mut tool_results: Vec<ToolResult> = Vec::new();
    let mut search_queries = Vec::new();
    let mut file_paths = Vec::new();

    for _ in 0..MAX_AGENT_STEPS {
        let step = state.model.complete(&prompt, &tool_results)?;
        match step {
            AgentStep::Finish { response } => {
                on_event(AgentEvent::Finish { response: response.clone() });
                return Ok(AgentOutcome { response, search_queries, file_paths });
            }
            AgentStep::Act { tool, input } => {
                on_event(AgentEvent::Action { tool, input: input.clone() });
                let output = dispatch_tool(state, tool, &input, index_type, &mut search_queries, &mut file_paths);
                on_event(AgentEvent::Observation { tool, output: output.clone() });
                tool_results.push(ToolResult { tool, input, output });
            }
        }
    }

    let response = tool_results
        .last()
        .map(|r| r.output.clone())
        .unwrap_or_else(|| "agent reached its step limit without a final answer".to_string());
    on_event(AgentEvent::Finish { response: response.clone() });
    Ok(AgentOutcome { response, search_queries, file_paths })
}

fn dispatch_tool(
    state: &AppState,
    tool: ToolName,
    input: &str,
    index_type: &str,
    search_queries: &mut Vec<String>,
    file_paths: &mut Vec<String>,
) -> String {
    match tool {
        ToolName::KeywordSuggestion => run_keyword_suggestion(state, input),
        ToolName::FileContentSearch => run_file_content_search(state, input, index_type, search_queries),
        ToolName::FileContentRetrieval => run_file_content_retrieval(state, input, file_paths),
        ToolName::CodeStructureAnalysis => run_code_structure_analysis(state, input),
        ToolName::ProjectOverview => run_project_overview(state, input),
        ToolName::DirectoryExplorer => run_directory_explorer(state, input),
        ToolName::FilenameSearch => run_filename_search(state, input, search_queries),
    }
}

fn run_keyword_suggestion(state: &AppState, query_text: &str) -> String {
    let snapshot = state.snapshot();
    let suggestions = query::suggest(&snapshot.other_partition, query_text, 10);
    if suggestions.is_empty() {
        "no suggestions found".to_string()
    } else {
        suggestions.join(", ")
    }
}

fn run_file_content_search(
    state: &AppState,
    query_text: &str,
    index_type: &str,
    search_queries: &mut Vec<String>,
) -> String {
    let snapshot = state.snapshot();
    let partition = if index_type == "docs" { &snapshot.docs_partition } else { &snapshot.other_partition };
    let root = state.config.snapshot().root.clone();

    let mut hits = query::fused_retrieval(partition, &snapshot.filename_index, query_text, 5);
    if index_type == "docs" {
        for hit in hits.iter_mut() {
            query::normalize_docs_hit(hit, &snapshot.shard_map, &root);
        }
    }
    search_queries.push(query_text.to_string());

    if hits.is_empty() {
        return "no matching files were found".to_string();
    }
    let mut out = String::from("matching files:\n");
    for hit in &hits {
        out.push_str(&format!("- {} (score: {:.2})\n", hit.path, hit.score));
        if let Some(page) = hit.page {
            out.push_str(&format!("  page: {page}\n"));
        }
        if let Some(sheet) = &hit.sheet {
            out.push_str(&format!("  sheet: {sheet}\n"));
        }
    }
    out
}

pub(crate) fn truncate_to_token_budget(content: &str, tokenizer: &dyn Tokenizer, budget: usize) -> String {
    if tokenizer.count_tokens(content) <= budget {
        return content.to_string();
    }
    let mut end = (budget * 3).min(content.len());
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...truncated, content exceeds the context budget", &content[..end])
}

fn run_file_content_retrieval(state: &AppState, rel_path: &str, file_paths: &mut Vec<String>) -> String {
    let config = state.config.snapshot();
    let root = match config.root.canonicalize() {
        Ok(p) => p,
        Err(_) => return "source root is not accessible".to_string(),
    };
    let shard_dir = config.shard_dir_path();

    let candidate = root.join(rel_path.trim_start_matches("./"));
    let full = match candidate.canonicalize() {
        Ok(p) => p,
        Err(_) => return format!("file does not exist: {rel_path}"),
    };
    if !full.starts_with(&root) {
        return "access denied: path escapes the source root".to_string();
    }
    if let Ok(shard_dir_canon) = shard_dir.canonicalize() {
        if full.starts_with(&shard_dir_canon) {
            return "access denied: path is inside the shard directory".to_string();
        }
    }

    let snapshot = state.snapshot();
    let ext = full.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();

    let content = if OFFICE_EXTENSIONS.contains(&ext.as_str()) {
        let origin = full.to_string_lossy().to_string();
        let ids = snapshot.shard_map.ids_for_origin(&origin);
        if ids.is_empty() {
            return "content not available for this file".to_string();
        }
        let mut combined = String::new();
        for id in ids {
            if let Ok(text) = std::fs::read_to_string(shard_dir.join(format!("{id}.txt"))) {
                combined.push_str(&text);
                combined.push('\n');
            }
        }
        combined.trim().to_string()
    } else {
        match std::fs::read_to_string(&full) {
            Ok(text) => text,
            Err(_) => return "unable to read file contents as text".to_string(),
        }
    };

    let tokenizer = codescope_core::tokenizer::default_tokenizer();
    let truncated = truncate_to_token_budget(&content, tokenizer.as_ref(), AGENT_TOKEN_BUDGET);

    let rel_owned = rel_path.to_string();
    if !file_paths.contains(&rel_owned) {
        file_paths.push(rel_owned);
    }
    truncated
}

fn run_code_structure_analysis(state: &AppState, rel_path: &str) -> String {
    let config = state.config.snapshot();
    let full = config.root.join(rel_path.trim_start_matches("./"));
    let snapshot = state.snapshot();

    let Some(source_file) = snapshot.files.get(&full) else {
        return format!("no code structure analysis available for {rel_path} (not a recognized Python file)");
    };

    let mut out = format!("module: {}\n", source_file.module);
    out.push_str("imports:\n");
    for import in &source_file.plain_imports {
        out.push_str(&format!("- import {}\n", import.name));
    }
    for import in &source_file.from_imports {
        out.push_str(&format!("- from {} import {}\n", import.module, import.names.join(", ")));
    }
    out.push_str(&format!("definitions: {}\n", source_file.definitions.join(", ")));
    out.push_str(&format!("incoming references ({}):\n", source_file.incoming.len()));
    for reference in &source_file.incoming {
        out.push_str(&format!("- {} ({:?})\n", reference.source_module, reference.kind));
    }
    out
}

fn run_project_overview(state: &AppState, input: &str) -> String {
    let snapshot = state.snapshot();
    let mut parts = input.split_whitespace();
    let mode = parts.next().unwrap_or("top");
    let limit: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(10).max(1);

    let mut counts: Vec<(&String, &usize)> = snapshot.folder_tree.counts.iter().collect();
    if mode.eq_ignore_ascii_case("worst") {
        counts.sort_by(|a, b| a.1.cmp(b.1));
    } else {
        counts.sort_by(|a, b| b.1.cmp(a.1));
    }
    counts.truncate(limit);

    if counts.is_empty() {
        return "project contains no recognized files".to_string();
    }
    let mut out = String::from("extension distribution:\n");
    for (ext, count) in counts {
        let label = if ext.is_empty() { "(no extension)".to_string() } else { format!(".{ext}") };
        out.push_str(&format!("- {label}: {count}\n"));
    }
    out
}

fn find_node<'a>(root: &'a FolderNode, rel_path: &Path) -> Option<&'a FolderNode> {
    let mut node = root;
    for component in rel_path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name == "." || name.is_empty() {
            continue;
        }
        node = node.children.iter().find(|c| c.name == name)?;
    }
    Some(node)
}

fn run_directory_explorer(state: &AppState, input: &str) -> String {
    let mut parts = input.split_whitespace();
    let folder_arg = parts.next().unwrap_or(".");
    let ext_filter = parts.next().unwrap_or("*");
    let max_depth = parts.next().and_then(|s| s.parse::<usize>().ok());

    let snapshot = state.snapshot();
    let rel = Path::new(folder_arg.trim_start_matches("./"));
    let Some(node) = find_node(&snapshot.folder_tree, rel) else {
        return format!("directory not found: {folder_arg}");
    };

    let lines = folder::display(node, ext_filter, max_depth);
    if lines.is_empty() {
        return format!("no files with extension {ext_filter} under {folder_arg}");
    }
    let mut out = String::new();
    for line in lines {
        out.push_str(&"  ".repeat(line.depth));
        out.push_str(&format!("{} ({})\n", line.name, line.count));
    }
    out
}

fn filename_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w\-.]+\.\w+").unwrap())
}

fn run_filename_search(state: &AppState, input: &str, search_queries: &mut Vec<String>) -> String {
    let mut parts = input.split_whitespace();
    let query_text = parts.next().unwrap_or("").to_string();
    let folder_arg = parts.next().unwrap_or(".");
    let ext_filter = parts.next();

    let snapshot = state.snapshot();
    let folder_prefix = if folder_arg == "." || folder_arg.is_empty() {
        None
    } else {
        Some(folder_arg.trim_start_matches("./"))
    };

    let mut hits = query::search_filenames(&snapshot.filename_index, &query_text, false, folder_prefix, ext_filter, 10);
    if hits.is_empty() {
        if let Some(extracted) = filename_like_re().find(&query_text).map(|m| m.as_str().to_string()) {
            hits = query::search_filenames(&snapshot.filename_index, &extracted, false, folder_prefix, ext_filter, 10);
            search_queries.push(extracted);
        } else {
            search_queries.push(query_text.clone());
        }
    } else {
        search_queries.push(query_text.clone());
    }

    if hits.is_empty() {
        "no matching filenames found".to_string()
    } else {
        let mut out = String::from("matching filenames:\n");
        for path in hits {
            out.push_str(&format!("- {}\n", path.display()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescope_core::{BinaryExtensionSet, Config, SharedConfig};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn build_state(root: &Path) -> AppState {
        let mut config = Config::new(root.to_path_buf());
        config.shard_dir = "__docs__".to_string();
        config.index_dir = "index".to_string();
        let binary_exts = BinaryExtensionSet::default();
        let cancel = Arc::new(AtomicBool::new(false));
        let result = codescope_core::ingest::run(&config, &binary_exts, &codescope_core::progress::NullProgress, &cancel).unwrap();
        AppState::new(SharedConfig::new(config), binary_exts, result, Arc::new(HeuristicModel))
    }

    #[test]
    fn heuristic_model_walks_search_then_retrieve_then_finish() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("widget.py"), "def widget():\n    return 'widget handler'\n").unwrap();
        let state = build_state(root.path());

        let mut events = Vec::new();
        let outcome = run_agent(&state, "widget handler", "", "widget", |e| events.push(e)).unwrap();

        assert!(!outcome.file_paths.is_empty() || outcome.response.contains("no file"));
        assert!(events.iter().any(|e| matches!(e, AgentEvent::Finish { .. })));
    }

    #[test]
    fn retrieval_rejects_paths_outside_source_root() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.py"), "x").unwrap();
        let state = build_state(root.path());
        let mut file_paths = Vec::new();
        let out = run_file_content_retrieval(&state, "../outside", &mut file_paths);
        assert!(out.contains("does not exist") || out.contains("access denied"));
    }

    #[test]
    fn truncation_appends_elision_notice_past_budget() {
        let tokenizer = codescope_core::tokenizer::BytesEstimateTokenizer;
        let long = "x".repeat(100_000);
        let out = truncate_to_token_budget(&long, &tokenizer, 10);
        assert!(out.ends_with("content exceeds the context budget"));
    }
}
