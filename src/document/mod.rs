//! Message body model and the preparation pipeline that reduces it before it
//! is handed to a provider.

pub mod images;
pub mod prepare;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use kuchiki::NodeRef;
use kuchiki::iter::NodeEdge;
use kuchiki::traits::*;
use tracing::{debug, warn};

use crate::core::models::ContentPart;
use images::{MAX_IMAGES_TOTAL, content_id, is_forwardable_src};
pub use prepare::{MAX_SUMMARIZE_TEXT_SIZE, PrepareOptions, prepare_document, truncate_text};

/// Line width used when rendering the rich text representation.
const RENDER_WIDTH: usize = 400;

/// Elements nested deeper than this are collapsed into their text content.
pub const MAX_NESTING_DEPTH: usize = 256;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];
/// Where a truncated text node may be cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncateMode {
    /// Any character boundary.
    Character,
    /// The last whitespace before the limit.
    #[default]
    Word,
    /// The end of the last complete sentence before the limit.
    Sentence,
}

impl FromStr for TruncateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" | "char" | "chars" => Ok(TruncateMode::Character),
            "word" | "words" => Ok(TruncateMode::Word),
            "sentence" | "sentences" => Ok(TruncateMode::Sentence),
            other => Err(format!("Unknown truncate mode: {other}")),
        }
    }
}

impl fmt::Display for TruncateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TruncateMode::Character => "character",
            TruncateMode::Word => "word",
            TruncateMode::Sentence => "sentence",
        };
        f.write_str(name)
    }
}

/// A parsed message body.
///
/// Holds the serialized `<body>` content so documents can cross task
/// boundaries; the kuchiki tree is rebuilt on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichDocument {
    html: String,
}

impl RichDocument {
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let document = kuchiki::parse_html().one(html);
        flatten_deep(&document);
        Self::from_tree(&document)
    }

    pub(crate) fn tree(&self) -> NodeRef {
        let document = kuchiki::parse_html().one(self.html.as_str());
        flatten_deep(&document);
        document
    }

    pub(crate) fn from_tree(document: &NodeRef) -> Self {
        Self {
            html: extract_body_html(document),
        }
    }

    /// Whitespace-normalized text content. Block boundaries and line breaks
    /// become single spaces.
    #[must_use]
    pub fn text(&self) -> String {
        let mut raw = String::new();
        for edge in self.tree().traverse() {
            match edge {
                NodeEdge::Start(node) | NodeEdge::End(node) if is_boundary(&node) => raw.push(' '),
                NodeEdge::Start(node) => {
                    if let Some(text) = node.as_text() {
                        raw.push_str(&text.borrow());
                    }
                }
                NodeEdge::End(_) => {}
            }
        }
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[must_use]
    pub fn to_html(&self) -> String {
        self.html.clone()
    }

    /// Image sources in document order.
    #[must_use]
    pub fn image_sources(&self) -> Vec<String> {
        self.tree()
            .descendants()
            .elements()
            .filter(|element| element.name.local.as_ref() == "img")
            .filter_map(|element| {
                element
                    .attributes
                    .borrow()
                    .get("src")
                    .filter(|src| !src.trim().is_empty())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Content ids of `cid:` images, deduplicated, in document order.
    #[must_use]
    pub fn inline_image_cids(&self) -> Vec<String> {
        let mut cids: Vec<String> = Vec::new();
        for src in self.image_sources() {
            if let Some(cid) = content_id(&src)
                && !cids.iter().any(|c| c == cid)
            {
                cids.push(cid.to_string());
            }
        }
        cids
    }

    /// Rich representation: the rendered text followed by the document's
    /// images.
    ///
    /// `cid:` images are replaced by the data URI found in `inline_images`
    /// and skipped when missing. The text part never exceeds
    /// [`MAX_SUMMARIZE_TEXT_SIZE`] and is cut the way `mode` asks for.
    #[must_use]
    pub fn content_parts(
        &self,
        inline_images: &HashMap<String, String>,
        mode: TruncateMode,
    ) -> Vec<ContentPart> {
        let mut parts = Vec::new();

        let rendered = html2text::config::plain()
            .string_from_read(self.html.as_bytes(), RENDER_WIDTH)
            .unwrap_or_else(|e| {
                warn!("Falling back to plain text, failed to render document: {}", e);
                self.text()
            });
        let rendered = truncate_text(rendered.trim(), MAX_SUMMARIZE_TEXT_SIZE, mode);
        if !rendered.trim().is_empty() {
            parts.push(ContentPart::Text(rendered));
        }

        let sources = self.image_sources();
        let mut seen: Vec<&str> = Vec::new();
        for src in &sources {
            if seen.len() >= MAX_IMAGES_TOTAL {
                break;
            }
            let url = match content_id(src) {
                Some(cid) => match inline_images.get(cid) {
                    Some(uri) => uri.as_str(),
                    None => continue,
                },
                None if is_forwardable_src(src) => src.trim(),
                None => continue,
            };
            if seen.contains(&url) {
                continue;
            }
            seen.push(url);
            parts.push(ContentPart::Image {
                url: url.to_string(),
            });
        }

        parts
    }
}

fn is_boundary(node: &NodeRef) -> bool {
    node.as_element().is_some_and(|element| {
        let tag = element.name.local.as_ref();
        tag == "br" || BLOCK_ELEMENTS.contains(&tag)
    })
}

/// Replaces every element at [`MAX_NESTING_DEPTH`] with its own text so
/// serializing and rendering never walk an unbounded depth.
fn flatten_deep(document: &NodeRef) {
    let mut depth = 0usize;
    let mut deepest = Vec::new();
    for edge in document.traverse() {
        match edge {
            NodeEdge::Start(node) if node.as_element().is_some() => {
                depth += 1;
                if depth == MAX_NESTING_DEPTH {
                    deepest.push(node);
                }
            }
            NodeEdge::End(node) if node.as_element().is_some() => depth -= 1,
            _ => {}
        }
    }

    if deepest.is_empty() {
        return;
    }
    debug!(
        "Collapsing {} elements nested deeper than {} levels",
        deepest.len(),
        MAX_NESTING_DEPTH
    );
    for node in deepest {
        let text = node.text_contents();
        let children: Vec<NodeRef> = node.children().collect();
        for child in children {
            child.detach();
        }
        node.append(NodeRef::new_text(text));
    }
}

fn extract_body_html(document: &NodeRef) -> String {
    if let Ok(mut bodies) = document.select("body")
        && let Some(body) = bodies.next()
    {
        return body
            .as_node()
            .children()
            .map(|child| child.to_string())
            .collect();
    }
    document.to_string()
}
