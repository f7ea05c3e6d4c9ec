use crate::context::DocumentContext;
use crate::library::{Applicability, PLAIN_LANGUAGE, Tool};

/// Whether `tool` should be shown for the document described by `ctx`.
/// Applicability and language must both pass.
pub fn visible(tool: &Tool, ctx: &DocumentContext) -> bool {
    applicable(tool.applicability, ctx) && language_matches(tool, ctx.language_id.as_deref())
}

pub fn applicable(applicability: Applicability, ctx: &DocumentContext) -> bool {
    let titled = ctx.has_path;
    let remote = ctx.is_remote;
    match applicability {
        Applicability::All => true,
        Applicability::Local => titled && !remote,
        Applicability::Remote => titled && remote,
        Applicability::Titled => titled,
        Applicability::Untitled => !titled,
    }
}

/// Empty `languages` accepts everything; a document with no detected
/// language only matches `"plain"`.
pub fn language_matches(tool: &Tool, language: Option<&str>) -> bool {
    if tool.languages.is_empty() {
        return true;
    }
    match language {
        None => tool.languages.contains(PLAIN_LANGUAGE),
        Some(id) => tool.languages.contains(id),
    }
}
