use crate::document::ElementHandle;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How an element's visible text has to match.
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Substring match. `:has-text` and bare `text=` are case-insensitive, `:contains` is not.
    Contains { needle: String, case_sensitive: bool },
    /// Whole (whitespace-normalized) text equals the value.
    Exact(String),
    Pattern(Regex),
    /// A `text=/.../` whose pattern did not compile. Never matches; querying it is an error.
    Unparseable(String),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        let text = normalize_whitespace(text);
        match self {
            TextMatch::Contains {
                needle,
                case_sensitive: true,
            } => text.contains(needle.as_str()),
            TextMatch::Contains {
                needle,
                case_sensitive: false,
            } => text.to_lowercase().contains(&needle.to_lowercase()),
            TextMatch::Exact(expected) => text == *expected,
            TextMatch::Pattern(re) => re.is_match(&text),
            TextMatch::Unparseable(_) => false,
        }
    }
}

/// A parsed selector-like string, as accepted by [`crate::document::Document::query`].
///
/// Supported forms:
/// - plain CSS: `nav a[href]`
/// - `button:has-text("Save")` (case-insensitive contains)
/// - `button:contains('Save')` (case-sensitive contains)
/// - `text=/clients/i`, `text="Clients"`, `text=Clients` (deepest matching element)
#[derive(Debug, Clone)]
pub struct ElementQuery {
    raw: String,
    pub css: String,
    pub text: Option<TextMatch>,
    /// Keep only the innermost matching elements (the `text=` engine).
    pub deepest: bool,
}

impl ElementQuery {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(body) = trimmed.strip_prefix("text=") {
            return Self {
                raw: raw.to_string(),
                css: "*".to_string(),
                text: Some(parse_text_engine(body)),
                deepest: true,
            };
        }

        for (pseudo, case_sensitive) in [(":has-text(", false), (":contains(", true)] {
            if let Some(start) = trimmed.rfind(pseudo)
                && trimmed.ends_with(')')
            {
                let css = trimmed[..start].trim();
                let arg = &trimmed[start + pseudo.len()..trimmed.len() - 1];
                return Self {
                    raw: raw.to_string(),
                    css: if css.is_empty() { "*".to_string() } else { css.to_string() },
                    text: Some(TextMatch::Contains {
                        needle: unquote(arg).to_string(),
                        case_sensitive,
                    }),
                    deepest: false,
                };
            }
        }

        Self {
            raw: raw.to_string(),
            css: trimmed.to_string(),
            text: None,
            deepest: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches_text(&self, text: &str) -> bool {
        self.text.as_ref().is_none_or(|m| m.matches(text))
    }
}

impl FromStr for ElementQuery {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ElementQuery {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ElementQuery {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

fn parse_text_engine(body: &str) -> TextMatch {
    let body = body.trim();

    if let Some(rest) = body.strip_prefix('/')
        && let Some(end) = rest.rfind('/')
    {
        let pattern = &rest[..end];
        let flags = &rest[end + 1..];
        return match RegexBuilder::new(pattern)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
        {
            Ok(re) => TextMatch::Pattern(re),
            Err(e) => TextMatch::Unparseable(e.to_string()),
        };
    }

    if body.len() >= 2
        && ((body.starts_with('"') && body.ends_with('"'))
            || (body.starts_with('\'') && body.ends_with('\'')))
    {
        return TextMatch::Exact(normalize_whitespace(&body[1..body.len() - 1]));
    }

    TextMatch::Contains {
        needle: body.to_string(),
        case_sensitive: false,
    }
}

fn unquote(arg: &str) -> &str {
    let arg = arg.trim();
    if arg.len() >= 2
        && ((arg.starts_with('"') && arg.ends_with('"'))
            || (arg.starts_with('\'') && arg.ends_with('\'')))
    {
        &arg[1..arg.len() - 1]
    } else {
        arg
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One strategy for finding an element. Lower `priority` is tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateLocator {
    pub description: String,
    pub query: ElementQuery,
    pub priority: u32,
}

impl CandidateLocator {
    pub fn new(description: impl Into<String>, query: &str, priority: u32) -> Self {
        Self {
            description: description.into(),
            query: ElementQuery::parse(query),
            priority,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

impl PartialEq for CandidateLocator {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
            && self.description == other.description
            && self.query.as_str() == other.query.as_str()
    }
}

/// A named purpose and the ordered strategies that can fulfil it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub locators: Vec<CandidateLocator>,
}

impl Intent {
    pub fn new(name: impl Into<String>, mut locators: Vec<CandidateLocator>) -> Self {
        locators.sort_by_key(|l| l.priority);
        Self {
            name: name.into(),
            locators,
        }
    }

    /// Priority follows list position.
    pub fn from_selectors<S: AsRef<str>>(name: impl Into<String>, selectors: &[S]) -> Self {
        let locators = selectors
            .iter()
            .enumerate()
            .map(|(i, s)| CandidateLocator::new(s.as_ref(), s.as_ref(), i as u32))
            .collect();
        Self::new(name, locators)
    }

    /// Fallback cascade for reaching a section by keyword.
    pub fn for_section(keyword: &str) -> Self {
        Self::new(format!("open section {}", keyword), section_locators(keyword, 0))
    }

    /// Locators that find `element` again in a later snapshot.
    pub fn for_element(element: &ElementHandle) -> Self {
        let mut locators = Vec::new();
        let tag = element.tag.as_str();

        if let Some(id) = element.attr("id").filter(|id| !id.is_empty()) {
            locators.push(CandidateLocator::new(
                "element id",
                &format!("[id=\"{}\"]", escape_attr(id)),
                0,
            ));
        }
        if let Some(href) = element.href().filter(|h| !h.is_empty()) {
            locators.push(CandidateLocator::new(
                "link target",
                &format!("{}[href=\"{}\"]", tag, escape_attr(href)),
                1,
            ));
        }
        let text = normalize_whitespace(&element.text);
        if !text.is_empty() {
            locators.push(CandidateLocator::new(
                "visible text",
                &format!("{}:has-text(\"{}\")", tag, text.replace('"', "")),
                2,
            ));
        }
        if let Some(label) = element.attr("aria-label").filter(|l| !l.is_empty()) {
            locators.push(CandidateLocator::new(
                "accessible label",
                &format!("[aria-label=\"{}\"]", escape_attr(label)),
                3,
            ));
        }

        let name = if element.name.is_empty() {
            format!("activate <{}>", tag)
        } else {
            format!("activate '{}'", element.name)
        };
        Self::new(name, locators)
    }

    pub fn extend(mut self, more: Vec<CandidateLocator>) -> Self {
        self.locators.extend(more);
        self.locators.sort_by_key(|l| l.priority);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }
}

/// Keyword cascade used to reach a named section: text, href, then loose id/class matches.
pub fn section_locators(keyword: &str, base_priority: u32) -> Vec<CandidateLocator> {
    let lower = keyword.to_lowercase();
    let escaped = regex::escape(&lower);
    let attr = escape_attr(&lower);
    let text = lower.replace('"', "");

    let strategies = [
        ("text match", format!("text=/{}/i", escaped)),
        ("href path", format!("a[href*=\"/{}\"]", attr)),
        ("href contains", format!("a[href*=\"{}\"]", attr)),
        ("link text", format!("a:has-text(\"{}\")", text)),
        ("button text", format!("button:has-text(\"{}\")", text)),
        ("id contains", format!("[id*=\"{}\"]", attr)),
        ("class contains", format!("[class*=\"{}\"]", attr)),
    ];

    strategies
        .into_iter()
        .enumerate()
        .map(|(i, (desc, query))| CandidateLocator::new(desc, &query, base_priority + i as u32))
        .collect()
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
