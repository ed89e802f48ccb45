//! JSON fixture files: a content tree dump and a recorded change feed.
//!
//! ```json
//! {
//!   "document": [{ "id": 1, "key": "…", "content_type": "home", "data": { "name": "Home" } }],
//!   "media": [],
//!   "member": []
//! }
//! ```
//!
//! A change file is a JSON array of [`ChangeBatch`] objects.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{changes::ChangeBatch, entities::NodeRecord, types::ContentKind};

use super::error::InfraError;
use super::memory::MemorySource;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFixture {
    #[serde(default)]
    pub document: Vec<NodeRecord>,
    #[serde(default)]
    pub media: Vec<NodeRecord>,
    #[serde(default)]
    pub member: Vec<NodeRecord>,
}

impl ContentFixture {
    pub fn nodes(&self, kind: ContentKind) -> &[NodeRecord] {
        match kind {
            ContentKind::Document => &self.document,
            ContentKind::Media => &self.media,
            ContentKind::Member => &self.member,
        }
    }

    pub fn into_source(self) -> MemorySource {
        let source = MemorySource::new();
        source.replace(ContentKind::Document, self.document);
        source.replace(ContentKind::Media, self.media);
        source.replace(ContentKind::Member, self.member);
        source
    }
}

async fn read_json<T>(path: &Path) -> Result<T, InfraError>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = tokio::fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|err| InfraError::fixture(path, err.to_string()))
}

pub async fn load_content(path: &Path) -> Result<ContentFixture, InfraError> {
    let fixture: ContentFixture = read_json(path).await?;
    for kind in ContentKind::ALL {
        for record in fixture.nodes(kind) {
            record
                .validate()
                .map_err(|err| InfraError::fixture(path, format!("{kind}: {err}")))?;
        }
    }
    info!(
        path = %path.display(),
        documents = fixture.document.len(),
        media = fixture.media.len(),
        members = fixture.member.len(),
        "Loaded content fixture"
    );
    Ok(fixture)
}

pub async fn load_changes(path: &Path) -> Result<Vec<ChangeBatch>, InfraError> {
    let batches: Vec<ChangeBatch> = read_json(path).await?;
    info!(path = %path.display(), batches = batches.len(), "Loaded change fixture");
    Ok(batches)
}
