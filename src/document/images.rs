//! Image handling for rich request bodies.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Largest inline (`cid:`) image embedded as a data URI.
pub const INLINE_IMAGE_MAX_BYTES: usize = 64 * 1024;
/// Largest `data:` URI carried over from the document itself.
pub const DATA_URI_MAX_LEN: usize = 96 * 1024;
/// Upper bound on image parts attached to a single request.
pub const MAX_IMAGES_TOTAL: usize = 10;

const ALLOWED_IMAGE_MIME: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[must_use]
pub fn canonicalize_mime(mime: &str) -> String {
    let main = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match main.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn is_allowed_image_mime(mime: &str) -> bool {
    let canonical = canonicalize_mime(mime);
    ALLOWED_IMAGE_MIME.contains(&canonical.as_str())
}

/// An image attachment referenced from the body by content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    #[must_use]
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: canonicalize_mime(&mime.into()),
            bytes,
        }
    }

    /// Whether this image may be sent to a provider at all.
    #[must_use]
    pub fn is_embeddable(&self) -> bool {
        is_allowed_image_mime(&self.mime)
            && !self.bytes.is_empty()
            && self.bytes.len() <= INLINE_IMAGE_MAX_BYTES
    }

    #[must_use]
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Returns the content id of a `cid:` image source.
#[must_use]
pub fn content_id(src: &str) -> Option<&str> {
    let src = src.trim();
    let rest = src.get(..4).filter(|p| p.eq_ignore_ascii_case("cid:"))?;
    let cid = src[rest.len()..].trim_matches(|c| c == '<' || c == '>');
    (!cid.is_empty()).then_some(cid)
}

/// Whether a document image source can be forwarded as-is.
#[must_use]
pub fn is_forwardable_src(src: &str) -> bool {
    let lowered = src.trim().to_ascii_lowercase();
    if lowered.starts_with("data:") {
        let mime = lowered["data:".len()..].split([';', ',']).next().unwrap_or("");
        return is_allowed_image_mime(mime) && src.len() <= DATA_URI_MAX_LEN;
    }
    url::Url::parse(src.trim()).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
