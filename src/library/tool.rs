use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use crate::accel::Accelerator;

/// Opaque tool identity. Assigned when a library is loaded and stable for as
/// long as that library lives; never written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(Uuid);

impl ToolId {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0.simple())
    }
}

/// When a tool may run, based on the document's save state and locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Applicability {
    #[default]
    All,
    Local,
    Remote,
    Titled,
    Untitled,
}

impl Applicability {
    pub fn as_str(self) -> &'static str {
        match self {
            Applicability::All => "all",
            Applicability::Local => "local",
            Applicability::Remote => "remote",
            Applicability::Titled => "titled",
            Applicability::Untitled => "untitled",
        }
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language token that matches documents with no detected language.
pub const PLAIN_LANGUAGE: &str = "plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub(crate) id: ToolId,
    pub name: String,
    pub comment: String,
    pub command: String,
    pub shortcut: Option<Accelerator>,
    pub applicability: Applicability,
    /// Empty means no language restriction.
    pub languages: BTreeSet<String>,
}

impl Tool {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            id: ToolId::new(),
            name: name.to_owned(),
            comment: String::new(),
            command: command.to_owned(),
            shortcut: None,
            applicability: Applicability::All,
            languages: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ToolId {
        self.id
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_owned();
        self
    }

    pub fn with_shortcut(mut self, shortcut: Accelerator) -> Self {
        self.shortcut = Some(shortcut);
        self
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = Tool::new("a", "true");
        let b = Tool::new("a", "true");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_display_is_uppercase_hex() {
        let id = ToolId::new().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn applicability_defaults_to_all() {
        assert_eq!(Applicability::default(), Applicability::All);
        assert_eq!(Tool::new("t", "true").applicability, Applicability::All);
    }
}
