//! The fixed preparation sequence applied to every body before summarizing:
//! signature stripping (optional), quote stripping, view sanitization and
//! truncation. Each step runs on the output of the previous one.

use kuchiki::traits::*;
use kuchiki::{ElementData, NodeRef};
use tracing::debug;

use super::images::{content_id, is_forwardable_src};
use super::{RichDocument, TruncateMode};

/// Upper bound on the text handed to a provider, in bytes.
pub const MAX_SUMMARIZE_TEXT_SIZE: usize = 10 * 1024;

const SIGNATURE_CLASSES: &[&str] = &[
    "gmail_signature",
    "x_gmail_signature",
    "moz-signature",
    "signature",
    "x_signature",
];

const QUOTE_CLASSES: &[&str] = &[
    "gmail_quote",
    "gmail_quote_container",
    "x_gmail_quote",
    "moz-cite-prefix",
    "yahoo_quoted",
    "protonmail_quote",
    "zmail_extra",
];

/// Elements after which everything in the same parent is a quoted reply.
const REPLY_HEADER_IDS: &[&str] = &["appendonsend", "divRplyFwdMsg", "x_divRplyFwdMsg"];

const UNSAFE_ELEMENTS: &[&str] = &[
    "applet", "base", "button", "embed", "form", "frame", "frameset", "head", "iframe", "input",
    "link", "meta", "noscript", "object", "script", "select", "style", "svg", "template",
    "textarea", "title",
];

const ALLOWED_ATTRIBUTES: &[&str] = &["href", "src", "alt", "title", "class", "id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    pub remove_signatures: bool,
    pub max_size: usize,
    pub truncate_mode: TruncateMode,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            remove_signatures: false,
            max_size: MAX_SUMMARIZE_TEXT_SIZE,
            truncate_mode: TruncateMode::default(),
        }
    }
}

/// Runs the preparation sequence in place.
///
/// `max_size` is clamped to [`MAX_SUMMARIZE_TEXT_SIZE`]; afterwards
/// `document.text().len()` never exceeds it.
pub fn prepare_document(document: &mut RichDocument, options: &PrepareOptions) {
    let root = document.tree();

    if options.remove_signatures {
        remove_signatures(&root);
    }
    remove_quotes(&root);
    sanitize_view(&root);

    let max_size = options.max_size.min(MAX_SUMMARIZE_TEXT_SIZE);
    if truncate_view(&root, max_size, options.truncate_mode) {
        debug!("Document truncated to {} bytes of text", max_size);
    }

    *document = RichDocument::from_tree(&root);
}

fn has_class(element: &ElementData, class: &str) -> bool {
    element
        .attributes
        .borrow()
        .get("class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c.eq_ignore_ascii_case(class)))
}

fn has_id(element: &ElementData, id: &str) -> bool {
    element
        .attributes
        .borrow()
        .get("id")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(id))
}

fn detach_all(nodes: Vec<NodeRef>) {
    for node in nodes {
        node.detach();
    }
}

fn elements_matching(root: &NodeRef, predicate: fn(&ElementData) -> bool) -> Vec<NodeRef> {
    root.descendants()
        .filter(|node| node.as_element().is_some_and(predicate))
        .collect()
}

fn is_signature(element: &ElementData) -> bool {
    SIGNATURE_CLASSES.iter().any(|c| has_class(element, c)) || has_id(element, "signature")
}

/// Byte offset of a `-- ` signature delimiter line within `text`.
fn signature_delimiter(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim() == "--" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Drops signature blocks, then cuts each text node at its `-- ` delimiter
/// along with the siblings after it. Delimiters inside quotes belong to the
/// quoted message and are left for quote removal.
fn remove_signatures(root: &NodeRef) {
    detach_all(elements_matching(root, is_signature));

    let delimited: Vec<(NodeRef, usize)> = root
        .descendants()
        .text_nodes()
        .filter_map(|text| {
            let offset = signature_delimiter(&text.borrow())?;
            Some((text.as_node().clone(), offset))
        })
        .filter(|(node, _)| {
            !node
                .ancestors()
                .any(|ancestor| ancestor.as_element().is_some_and(is_quote))
        })
        .collect();

    for (node, offset) in delimited {
        if let Some(text) = node.as_text() {
            text.borrow_mut().truncate(offset);
        }
        detach_all(node.following_siblings().collect());
    }
}

fn is_quote(element: &ElementData) -> bool {
    element.name.local.as_ref() == "blockquote"
        || QUOTE_CLASSES.iter().any(|c| has_class(element, c))
        || element
            .attributes
            .borrow()
            .get("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("cite"))
}

fn is_reply_header(element: &ElementData) -> bool {
    REPLY_HEADER_IDS.iter().any(|id| has_id(element, id))
}

fn remove_quotes(root: &NodeRef) {
    detach_all(elements_matching(root, is_quote));

    for header in elements_matching(root, is_reply_header) {
        detach_all(header.following_siblings().collect());
        header.detach();
    }

    for text in root.descendants().text_nodes() {
        let stripped = {
            let current = text.borrow();
            current.contains('>').then(|| strip_quoted_lines(&current))
        };
        if let Some(stripped) = stripped {
            *text.borrow_mut() = stripped;
        }
    }
}

fn strip_quoted_lines(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.trim_start().starts_with('>'))
        .collect()
}

fn is_hidden(element: &ElementData) -> bool {
    let attrs = element.attributes.borrow();
    if attrs.contains("hidden") {
        return true;
    }
    if attrs
        .get("aria-hidden")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    {
        return true;
    }
    attrs.get("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_unsafe_link(value: &str) -> bool {
    let lowered: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    lowered.starts_with("javascript:") || lowered.starts_with("vbscript:") || lowered.starts_with("data:")
}

fn keeps_image(element: &ElementData) -> bool {
    element
        .attributes
        .borrow()
        .get("src")
        .is_some_and(|src| content_id(src).is_some() || is_forwardable_src(src))
}

fn sanitize_view(root: &NodeRef) {
    let nodes: Vec<NodeRef> = root.descendants().collect();
    for node in nodes {
        if node.as_comment().is_some() {
            node.detach();
            continue;
        }
        let Some(element) = node.as_element() else {
            continue;
        };
        let tag = element.name.local.as_ref();
        if UNSAFE_ELEMENTS.contains(&tag)
            || tag.contains(':')
            || is_hidden(element)
            || (tag == "img" && !keeps_image(element))
        {
            node.detach();
            continue;
        }
        prune_attributes(tag, element);
    }
}

fn prune_attributes(tag: &str, element: &ElementData) {
    let mut attrs = element.attributes.borrow_mut();
    let mut to_remove = Vec::new();
    for (name, attr) in attrs.map.iter() {
        let local = name.local.as_ref();
        let keep = ALLOWED_ATTRIBUTES.contains(&local)
            && !(local == "href" && is_unsafe_link(&attr.value))
            && !(local == "src" && tag != "img");
        if !keep {
            to_remove.push(name.clone());
        }
    }
    for name in to_remove {
        attrs.map.remove(&name);
    }
}

/// Charges each text node its length plus one separator against `max_size`.
/// The node that overflows is cut and everything after it in document order
/// is removed. Returns true when anything was cut.
fn truncate_view(root: &NodeRef, max_size: usize, mode: TruncateMode) -> bool {
    let mut remaining = max_size;
    let mut overflow = None;

    for text in root.descendants().text_nodes() {
        let cost = text.borrow().len() + 1;
        if cost <= remaining {
            remaining -= cost;
            continue;
        }
        let cut = truncate_text(&text.borrow(), remaining.saturating_sub(1), mode);
        *text.borrow_mut() = cut;
        overflow = Some(text.as_node().clone());
        break;
    }

    let Some(node) = overflow else {
        return false;
    };
    for level in node.inclusive_ancestors() {
        detach_all(level.following_siblings().collect());
    }
    if node.as_text().is_some_and(|text| text.borrow().is_empty()) {
        node.detach();
    }
    true
}

/// Cuts `text` to at most `max_bytes` bytes, never inside a UTF-8 sequence,
/// preferring the boundary `mode` asks for.
#[must_use]
pub fn truncate_text(text: &str, max_bytes: usize, mode: TruncateMode) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let head = &text[..end];

    let word_cut = || {
        if text[end..].starts_with(char::is_whitespace) {
            return head.trim_end();
        }
        head.rfind(char::is_whitespace)
            .map_or(head, |i| head[..i].trim_end())
    };

    let cut = match mode {
        TruncateMode::Character => head,
        TruncateMode::Word => word_cut(),
        TruncateMode::Sentence => {
            let sentence_end = head
                .char_indices()
                .filter(|(i, c)| {
                    matches!(c, '.' | '!' | '?')
                        && text[i + c.len_utf8()..].starts_with(char::is_whitespace)
                })
                .map(|(i, c)| i + c.len_utf8())
                .last();
            sentence_end.map_or_else(word_cut, |i| &head[..i])
        }
    };

    if cut.is_empty() && mode != TruncateMode::Character {
        return head.to_string();
    }
    cut.to_string()
}
