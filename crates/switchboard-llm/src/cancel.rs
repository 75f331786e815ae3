//! Binding of an external cancellation token to in-flight work

use std::future::Future;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Per-call view of the caller's cancellation token
///
/// The bridge only observes the token; it never creates or triggers one.
/// Cancelling drops whatever future or stream is being guarded, which aborts
/// the underlying HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct CancellationBridge {
    token: Option<CancellationToken>,
}

impl CancellationBridge {
    pub fn new(token: Option<&CancellationToken>) -> Self {
        Self {
            token: token.cloned(),
        }
    }

    pub const fn from_token(token: Option<CancellationToken>) -> Self {
        Self { token }
    }

    pub fn is_requested(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves once cancellation is requested; never resolves without a token
    pub async fn requested(&self) {
        match self.token {
            Some(ref token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    /// Race `fut` against cancellation
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        if self.is_requested() {
            return Err(LlmError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.requested() => Err(LlmError::Cancelled),
            result = fut => result,
        }
    }

    /// Cancellable sleep
    pub async fn sleep(&self, duration: Duration) -> Result<(), LlmError> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Stop yielding from `inner` as soon as cancellation is observed
    ///
    /// Items already produced by `inner` but not yet handed out are discarded,
    /// and `inner` is dropped the moment cancellation wins.
    pub fn guard_stream<S, T>(&self, inner: S) -> impl Stream<Item = T> + Send + use<S, T>
    where
        S: Stream<Item = T> + Send + Unpin + 'static,
        T: Send + 'static,
    {
        let bridge = self.clone();
        stream::unfold(Some(inner), move |state| {
            let bridge = bridge.clone();
            async move {
                let mut inner = state?;
                if bridge.is_requested() {
                    return None;
                }
                let item = tokio::select! {
                    biased;
                    () = bridge.requested() => None,
                    item = inner.next() => item,
                };
                match item {
                    Some(item) if !bridge.is_requested() => Some((item, Some(inner))),
                    _ => None,
                }
            }
        })
    }
}
