use std::time::Duration;

use livesync_core::{EntitySnapshot, Subject, SubjectKind};
use url::Url;

use crate::stream::endpoint;
use crate::{decode_snapshot, ChannelError};

/// Fetches the current remote state of a subject.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, subject: &Subject) -> Result<EntitySnapshot, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    api_base: Url,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(api_base: &str, request_timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            api_base: Url::parse(api_base)?,
            client,
        })
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, subject: &Subject) -> Result<EntitySnapshot, ChannelError> {
        let collection = match subject.kind {
            SubjectKind::Batch => "batches",
            SubjectKind::Verification => "verifications",
            SubjectKind::Chat => return Err(ChannelError::Unsupported(subject.kind.to_string())),
        };
        let url = endpoint(&self.api_base, &[collection, subject.id.as_str()])?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await?;
        decode_snapshot(&body)
    }
}
