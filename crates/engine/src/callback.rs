//! Context-id callbacks and the single-slot registry holding the active one.

use crate::error::CallbackError;
use adchain_core::Multihash;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Finite, single-pass stream of the multihashes under a context id.
pub type MultihashStream = Pin<Box<dyn Stream<Item = Result<Multihash, CallbackError>> + Send>>;

/// Maps a context id to the content currently advertised under it.
#[async_trait]
pub trait Callback: Send + Sync + 'static {
    async fn lookup(&self, context_id: &[u8]) -> Result<MultihashStream, CallbackError>;
}

struct FnCallback<F>(F);

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&[u8]) -> Result<Vec<Multihash>, CallbackError> + Send + Sync + 'static,
{
    async fn lookup(&self, context_id: &[u8]) -> Result<MultihashStream, CallbackError> {
        let multihashes = (self.0)(context_id)?;
        Ok(Box::pin(futures::stream::iter(
            multihashes.into_iter().map(Ok::<_, CallbackError>),
        )))
    }
}

/// Adapt a synchronous closure into a [`Callback`].
pub fn callback_fn<F>(f: F) -> Arc<dyn Callback>
where
    F: Fn(&[u8]) -> Result<Vec<Multihash>, CallbackError> + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}

/// A callback returning the same multihashes for every context id.
pub fn to_callback(multihashes: Vec<Multihash>) -> Arc<dyn Callback> {
    callback_fn(move |_| Ok(multihashes.clone()))
}

/// Holds at most one callback. Registering replaces the previous one.
#[derive(Default)]
pub struct CallbackRegistry {
    slot: RwLock<Option<Arc<dyn Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, callback: Arc<dyn Callback>) {
        *self.slot.write().await = Some(callback);
    }

    /// The active callback, if any.
    pub async fn current(&self) -> Option<Arc<dyn Callback>> {
        self.slot.read().await.clone()
    }
}
