//! The transport seam.
//!
//! Client libraries under test send every call through a [`Transport`]. The
//! recorder wraps a real one, the replayer stands in for it, and the code
//! under test cannot tell which it got.

use crate::error::Result;
use crate::model::{RequestRecord, ResponseRecord};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(feature = "http")]
pub mod http;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one call. Failures the caller should see as a failed call are
    /// reported as [`crate::Error::Transport`]; the recorder converts any other
    /// error into one so that a replay returns the same error.
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord> {
        (**self).send(request).await
    }
}
