// SPDX-License-Identifier: Apache-2.0

use crate::topology::payload::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tower::BoxError;

/// Anything that accepts messages: processors, exporters and the internal
/// fanout/routing nodes between them.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(&self, message: Message) -> Result<(), BoxError>;
}

#[async_trait]
impl<T> Consumer for Arc<T>
where
    T: Consumer + ?Sized,
{
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        (**self).consume(message).await
    }
}
