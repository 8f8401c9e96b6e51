//! Message storage boundary.
//!
//! The summarizer only reads: message metadata, whether a body file exists,
//! the parsed body, and inline images referenced from it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::models::{MessageId, MessageMetadata};
use crate::document::RichDocument;
use crate::document::images::InlineImage;
use crate::errors::SummarizeError;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageMetadata>, SummarizeError>;

    fn document_path(&self, id: MessageId) -> PathBuf;

    async fn document_exists(&self, id: MessageId) -> bool {
        tokio::fs::try_exists(self.document_path(id))
            .await
            .unwrap_or(false)
    }

    async fn parse_document(&self, path: &Path) -> Result<RichDocument, SummarizeError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            SummarizeError::DocumentError(format!("{}: {e}", path.display()))
        })?;
        Ok(RichDocument::parse(&String::from_utf8_lossy(&bytes)))
    }

    async fn inline_image(
        &self,
        _id: MessageId,
        _cid: &str,
    ) -> Result<Option<InlineImage>, SummarizeError> {
        Ok(None)
    }
}

/// Directory-backed store.
///
/// Layout, per message id `N`:
/// - `N.json`: [`MessageMetadata`]
/// - `N.html`: the body
/// - `N/<cid>.<ext>`: inline images, the extension giving the MIME type
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, id: MessageId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn attachments_dir(&self, id: MessageId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

/// Content ids are mail-supplied; keep only characters that cannot walk
/// out of the attachment directory.
fn safe_file_stem(cid: &str) -> Option<String> {
    let stem: String = cid
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('.').to_string();
    (!stem.is_empty()).then_some(stem)
}

#[async_trait]
impl MessageStore for DirectoryStore {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageMetadata>, SummarizeError> {
        let path = self.metadata_path(id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata for message {} at {}", id, path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut metadata: MessageMetadata = serde_json::from_str(&raw)?;
        if metadata.id != id {
            warn!(
                "Metadata file {} carries id {}, expected {}",
                path.display(),
                metadata.id,
                id
            );
            metadata.id = id;
        }
        Ok(Some(metadata))
    }

    fn document_path(&self, id: MessageId) -> PathBuf {
        self.root.join(format!("{id}.html"))
    }

    async fn inline_image(
        &self,
        id: MessageId,
        cid: &str,
    ) -> Result<Option<InlineImage>, SummarizeError> {
        let Some(stem) = safe_file_stem(cid) else {
            return Ok(None);
        };

        let dir = self.attachments_dir(id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s == stem);
            if !matches {
                continue;
            }

            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let bytes = tokio::fs::read(&path).await?;
            return Ok(Some(InlineImage::new(mime.essence_str(), bytes)));
        }

        Ok(None)
    }
}
