//! Injectable clock abstraction.
//!
//! All time-dependent code paths (simple-executor timeout, capsule
//! handshake timeout, per-call request timeout) resolve time through this
//! trait instead of calling `tokio::time` directly, so tests can drive
//! timeouts deterministically (spec §4.5, §4.6, §9).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A source of time and sleep/timeout primitives.
///
/// The production implementation ([`SystemClock`]) simply delegates to
/// `tokio::time`. Tests substitute [`tokio::time::pause`]-driven fakes by
/// constructing a [`SystemClock`] under `#[tokio::test(start_paused =
/// true)]` and advancing with `tokio::time::advance`, which keeps the
/// trait itself trivial while still giving deterministic tests.
pub trait Clock: Send + Sync + 'static {
    /// Race `fut` against a timer of `duration`. Returns `Err(())` if the
    /// timer fires first.
    fn timeout<'a, T>(
        &'a self,
        duration: Duration,
        fut: impl Future<Output = T> + Send + 'a,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<T, ()>> + Send + 'a>>
    where
        T: Send + 'a;

    /// Sleep for `duration`.
    fn sleep<'a>(&'a self, duration: Duration) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// The production clock: thin wrapper over `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timeout<'a, T>(
        &'a self,
        duration: Duration,
        fut: impl Future<Output = T> + Send + 'a,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<T, ()>> + Send + 'a>>
    where
        T: Send + 'a,
    {
        Box::pin(async move { tokio::time::timeout(duration, fut).await.map_err(|_| ()) })
    }

    fn sleep<'a>(&'a self, duration: Duration) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A shared handle to a [`Clock`] implementation, cheap to clone and pass
/// into executors and capsule managers.
pub type SharedClock = Arc<dyn Clock>;

/// Construct the default production clock handle.
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
