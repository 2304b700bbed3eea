//! Lazily refreshed session/cookie cache for adapters whose sources
//! require a pre-fetch handshake.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::Result;

struct Session {
    cookie: String,
    acquired: Instant,
}

/// Cookie cache with a short TTL, keyed by source.
///
/// The handshake closure runs only when no fresh cookie is cached; a
/// blocked response should call [`SessionCache::invalidate`] and retry
/// once, which forces a fresh handshake.
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<String, Session>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached cookie for a source, running the handshake if the
    /// cache entry is missing or older than `ttl`.
    pub async fn cookie<F, Fut>(&self, source: &str, ttl: Duration, handshake: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(session) = entries.get(source) {
            if session.acquired.elapsed() < ttl {
                return Ok(session.cookie.clone());
            }
        }

        // Lock held across the handshake: one refresh at a time per cache.
        let cookie = handshake().await?;
        entries.insert(
            source.to_string(),
            Session {
                cookie: cookie.clone(),
                acquired: Instant::now(),
            },
        );
        Ok(cookie)
    }

    /// Drop the cached session for a source.
    pub async fn invalidate(&self, source: &str) {
        self.entries.lock().await.remove(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_handshake_runs_once_while_fresh() {
        let cache = SessionCache::new();
        let handshakes = AtomicUsize::new(0);

        for _ in 0..3 {
            let cookie = cache
                .cookie("toonily", TTL, || async {
                    handshakes.fetch_add(1, Ordering::SeqCst);
                    Ok("session=abc".to_string())
                })
                .await
                .unwrap();
            assert_eq!(cookie, "session=abc");
        }

        assert_eq!(handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = SessionCache::new();
        let handshakes = AtomicUsize::new(0);

        async fn run(cache: &SessionCache, handshakes: &AtomicUsize) -> String {
            cache
                .cookie("toonily", TTL, || async {
                    let n = handshakes.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("session={}", n))
                })
                .await
                .unwrap()
        }

        assert_eq!(run(&cache, &handshakes).await, "session=0");
        cache.invalidate("toonily").await;
        assert_eq!(run(&cache, &handshakes).await, "session=1");
    }

    #[tokio::test]
    async fn test_expired_session_refreshes() {
        let cache = SessionCache::new();
        let handshakes = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .cookie("toonily", Duration::from_millis(0), || async {
                    handshakes.fetch_add(1, Ordering::SeqCst);
                    Ok("session=abc".to_string())
                })
                .await
                .unwrap();
        }

        assert_eq!(handshakes.load(Ordering::SeqCst), 2);
    }
}
