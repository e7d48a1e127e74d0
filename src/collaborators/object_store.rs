//! The object store (videos in, frames out). Anonymous access when no
//! credentials are configured, mirroring the original's anonymous-vs-signed
//! client selection.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> anyhow::Result<()>;
    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
    async fn exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool>;
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn connect(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> anyhow::Result<()> {
        let output = self.client.get_object().bucket(bucket).key(key).send().await?;
        let bytes = output.body.collect().await?.into_bytes();
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(aws_sdk_s3::error::SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
