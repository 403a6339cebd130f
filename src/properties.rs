//! Core data types for inline block properties.
//!
//! A document line such as
//!
//! ```text
//! Ship the release ^rel-1 [status: todo, owner: [[Alice]], blocked-by: ^qa-2]
//! ```
//!
//! carries one [`Block`] (`rel-1`) with three [`Property`] entries. Each property value is parsed
//! into a [`ParsedValue`] holding the typed [`Link`]s it embeds: `[[Alice]]` is a
//! [`LinkKind::Note`] link and `^qa-2` a [`LinkKind::Block`] reference.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

/// The two kinds of typed reference a property value may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    /// `[[target]]` or `[[target|alias]]`, a reference to a whole document.
    Note,
    /// `^identifier`, a reference to a block.
    Block,
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LinkKind::Note => write!(f, "note"),
            LinkKind::Block => write!(f, "block"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    /// The link exactly as written, e.g. `[[Note|alias]]` or `^task-1`.
    pub raw: String,
    /// Trimmed link target: the note link path or the bare block id.
    pub target: String,
    pub alias: Option<String>,
}

impl Link {
    pub fn note(raw: &str, target: &str, alias: Option<&str>) -> Link {
        Link {
            kind: LinkKind::Note,
            raw: raw.to_string(),
            target: target.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    pub fn block(raw: &str, target: &str) -> Link {
        Link {
            kind: LinkKind::Block,
            raw: raw.to_string(),
            target: target.to_string(),
            alias: None,
        }
    }

    /// The text a consumer should display for this link.
    pub fn display_text(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.target)
    }
}

/// A property value together with the links extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedValue {
    pub raw: String,
    pub links: Vec<Link>,
}

impl ParsedValue {
    pub fn block_refs(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.kind == LinkKind::Block)
    }

    pub fn note_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.kind == LinkKind::Note)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    /// Raw (trimmed) value text.
    pub value: String,
    pub parsed: ParsedValue,
    /// Byte range of the trimmed value within the parsed buffer, including any offset bias.
    pub value_span: Range<usize>,
}

impl Property {
    pub fn pair(&self) -> (&str, &str) {
        (self.key.as_str(), self.value.as_str())
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// One addressable block: a `^id` marker followed by a bracketed property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub properties: Vec<Property>,
    /// Byte range of the whole `^id [ ... ]` match.
    pub range: Range<usize>,
    /// Byte range from the opening `[` through the closing `]`.
    pub bracket: Range<usize>,
}

impl Block {
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// A named, reusable set of properties ("preset") that can be stamped onto a new block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTemplate {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<TemplateProperty>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateProperty {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl PropertyTemplate {
    /// Renders the bracket body, `key: value, key2: value2`.
    pub fn render(&self) -> String {
        self.properties
            .iter()
            .map(|p| format!("{}: {}", p.key, p.value))
            .collect::<Vec<String>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_link_display_text_prefers_alias() {
        let link = Link::note("[[Projects/Plan|the plan]]", "Projects/Plan", Some("the plan"));
        assert_eq!(link.display_text(), "the plan");
        let link = Link::block("^t1", "t1");
        assert_eq!(link.display_text(), "t1");
    }

    #[test]
    fn test_template_render() {
        let template = PropertyTemplate {
            name: "task".to_string(),
            properties: vec![
                TemplateProperty {
                    key: "status".to_string(),
                    value: "todo".to_string(),
                },
                TemplateProperty {
                    key: "due".to_string(),
                    value: String::new(),
                },
            ],
        };
        assert_eq!(template.render(), "status: todo, due: ");
    }
}
