//! @ai:module:intent Cooperative abort signals and signal merging
//! @ai:module:layer infrastructure
//! @ai:module:public_api AbortController, AbortSignal, merge_signals
//! @ai:module:stateless false

use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// @ai:intent Owner side of an abort signal
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    /// @ai:intent Create a controller that has not been aborted
    /// @ai:effects pure
    pub fn new() -> Self {
        Self::default()
    }

    /// @ai:intent Abort every signal derived from this controller
    /// @ai:effects state:write
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// @ai:intent Observer handle for this controller
    /// @ai:effects pure
    pub fn signal(&self) -> AbortSignal {
        AbortSignal::from(self.token.clone())
    }
}

/// @ai:intent Read-only cancellation token, possibly composed of two others
///
/// Clones share the same source; `same_signal` compares that identity.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    source: Arc<Source>,
}

#[derive(Debug)]
enum Source {
    Token(CancellationToken),
    Either(AbortSignal, AbortSignal),
}

impl From<CancellationToken> for AbortSignal {
    fn from(token: CancellationToken) -> Self {
        Self {
            source: Arc::new(Source::Token(token)),
        }
    }
}

impl AbortSignal {
    /// @ai:intent Whether this signal has fired
    /// @ai:effects pure
    pub fn is_aborted(&self) -> bool {
        match self.source.as_ref() {
            Source::Token(token) => token.is_cancelled(),
            Source::Either(a, b) => a.is_aborted() || b.is_aborted(),
        }
    }

    /// @ai:intent Future that resolves once the signal fires
    /// @ai:effects pure
    pub fn aborted(&self) -> BoxFuture<'_, ()> {
        match self.source.as_ref() {
            Source::Token(token) => token.cancelled().boxed(),
            Source::Either(a, b) => future::select(a.aborted(), b.aborted())
                .map(|_| ())
                .boxed(),
        }
    }

    /// @ai:intent True when both handles observe the same source
    /// @ai:effects pure
    pub fn same_signal(&self, other: &AbortSignal) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

/// @ai:intent Combine two optional signals into one that fires when either fires
/// @ai:post a single present input is returned as-is
/// @ai:effects pure
pub fn merge_signals(a: Option<AbortSignal>, b: Option<AbortSignal>) -> Option<AbortSignal> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(AbortSignal {
            source: Arc::new(Source::Either(a, b)),
        }),
    }
}
