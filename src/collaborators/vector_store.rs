//! The vector database ("watched-frames store"). Only `search-by-filter`
//! and a point-existence check are consumed (§1); upsert is performed by
//! the media pipeline collaborator itself, not by this crate.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{Condition, Filter, ScrollPointsBuilder};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// `true` iff at least one point with payload `video_code == code`
    /// exists in `collection`. Transport errors are reported to the caller
    /// (C7 maps them to `false` for that code rather than aborting).
    async fn point_exists(&self, collection: &str, code: &str) -> anyhow::Result<bool>;
}

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn connect(url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn point_exists(&self, collection: &str, code: &str) -> anyhow::Result<bool> {
        let filter = Filter::must([Condition::matches("video_code", code.to_string())]);
        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(collection).filter(filter).limit(1))
            .await?;
        Ok(!response.result.is_empty())
    }
}
