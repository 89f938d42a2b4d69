//! Wiki link parsing and formatting for vault note references.
//!
//! Supports the link shapes the sync engine stores in frontmatter:
//! - Basic links: `[[Tasks/Note]]`
//! - Aliases: `[[Tasks/Note|Display Text]]`
//!
//! Targets are vault-relative paths without the `.md` extension.

use serde::{Deserialize, Serialize};

/// A parsed wiki link from a frontmatter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiLink {
    /// The link target: a vault-relative path without extension
    pub target: String,
    /// Display alias if present
    pub alias: Option<String>,
}

impl WikiLink {
    /// Build a link to a note path with a display alias.
    ///
    /// A trailing `.md` on the target is stripped; the alias is omitted when
    /// it equals the target's file name (Obsidian renders them identically).
    pub fn new(target: &str, alias: &str) -> Self {
        let target = target.strip_suffix(".md").unwrap_or(target).to_string();
        let name = target.rsplit('/').next().unwrap_or(&target);
        let alias = if alias.is_empty() || alias == name {
            None
        } else {
            Some(alias.to_string())
        };
        Self { target, alias }
    }

    /// Parse a `[[target]]` or `[[target|alias]]` string.
    ///
    /// Returns None if the value is not bracketed as a wiki link.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let inner = trimmed.strip_prefix("[[")?.strip_suffix("]]")?;

        let (target, alias) = match inner.find('|') {
            Some(pipe) => (&inner[..pipe], Some(inner[pipe + 1..].to_string())),
            None => (inner, None),
        };

        let target = target.trim();
        if target.is_empty() {
            return None;
        }

        Some(Self {
            target: target.strip_suffix(".md").unwrap_or(target).to_string(),
            alias: alias.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        })
    }

    /// The note name: last path component of the target.
    pub fn name(&self) -> &str {
        self.target.rsplit('/').next().unwrap_or(&self.target)
    }

    /// Returns alias if present, otherwise the name
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.name())
    }

    /// Whether this link points at the given note path (`.md` optional).
    pub fn points_to(&self, path: &str) -> bool {
        self.target == path.strip_suffix(".md").unwrap_or(path)
    }
}

impl std::fmt::Display for WikiLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "[[{}|{}]]", self.target, alias),
            None => write!(f, "[[{}]]", self.target),
        }
    }
}

/// Format a `[[target|alias]]` link string for a note path.
pub fn format_link(path: &str, alias: &str) -> String {
    WikiLink::new(path, alias).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_basic_link() {
        assert_eq!(format_link("Tasks/Buy milk.md", "Buy milk"), "[[Tasks/Buy milk]]");
    }

    #[test]
    fn format_link_with_alias() {
        assert_eq!(
            format_link("Tasks/Projects/Personal.md", "My Stuff"),
            "[[Tasks/Projects/Personal|My Stuff]]"
        );
    }

    #[test]
    fn alias_equal_to_name_is_dropped() {
        let link = WikiLink::new("Tasks/Note", "Note");
        assert_eq!(link.alias, None);
        assert_eq!(link.to_string(), "[[Tasks/Note]]");
    }

    #[test]
    fn parse_basic_link() {
        let link = WikiLink::parse("[[Tasks/Note]]").unwrap();
        assert_eq!(link.target, "Tasks/Note");
        assert_eq!(link.alias, None);
        assert_eq!(link.name(), "Note");
    }

    #[test]
    fn parse_link_with_alias() {
        let link = WikiLink::parse("[[Tasks/Note|Display Text]]").unwrap();
        assert_eq!(link.target, "Tasks/Note");
        assert_eq!(link.alias, Some("Display Text".to_string()));
        assert_eq!(link.display_name(), "Display Text");
    }

    #[test]
    fn parse_strips_md_extension() {
        let link = WikiLink::parse("[[Tasks/Note.md]]").unwrap();
        assert_eq!(link.target, "Tasks/Note");
    }

    #[test]
    fn parse_rejects_non_links() {
        assert!(WikiLink::parse("Tasks/Note").is_none());
        assert!(WikiLink::parse("[[]]").is_none());
        assert!(WikiLink::parse("").is_none());
    }

    #[test]
    fn points_to_compares_without_extension() {
        let link = WikiLink::parse("[[Tasks/Note]]").unwrap();
        assert!(link.points_to("Tasks/Note.md"));
        assert!(link.points_to("Tasks/Note"));
        assert!(!link.points_to("Tasks/Other.md"));
    }

    #[test]
    fn round_trip_display_parse() {
        let original = WikiLink::new("Tasks/Projects/Home", "Home Project");
        let parsed = WikiLink::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }
}
