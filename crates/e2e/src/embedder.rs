//! Embedding fenced frames into the top-level test page

use async_trait::async_trait;
use url::Url;

use crate::error::E2eResult;

/// Something that can append a `<fencedframe>` navigated to a URL.
///
/// Returns once the frame has been inserted; its content reports back only
/// through the signal relay.
#[async_trait]
pub trait FrameEmbedder: Send + Sync {
    async fn embed_fenced_frame(&self, url: &Url) -> E2eResult<()>;
}
