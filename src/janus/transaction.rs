//! Transaction correlation
//!
//! Janus replies to a request out of band, tagged with the request's
//! `transaction` id. Code that needs the reply registers a one-shot handler
//! here; the gateway-to-client path resolves it when the reply shows up.

use futures::future::BoxFuture;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{ProxyError, Result, CODE_DUPLICATE_TRANSACTION};
use super::message::JanusMessage;

pub type TransactionFuture = BoxFuture<'static, Result<()>>;
type Handler = Box<dyn FnOnce(JanusMessage) -> TransactionFuture + Send>;

struct Pending {
    handler: Handler,
    created_at: Instant,
}

pub struct TransactionRegistry {
    pending: Mutex<HashMap<String, Pending>>,
    /// Entries older than this are dropped; `None` keeps them forever
    timeout: Option<Duration>,
}

impl TransactionRegistry {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a handler for a pending transaction id
    ///
    /// An id that is already pending is rejected with a recoverable error
    /// carrying that id; the pending handler is left untouched.
    pub fn add<F, Fut>(&self, id: impl Into<String>, handler: F) -> Result<()>
    where
        F: FnOnce(JanusMessage) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let id = id.into();
        self.purge_expired();

        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(ProxyError::recoverable(
                format!("Transaction {} is already pending", id),
                CODE_DUPLICATE_TRANSACTION,
                Some(id),
            ));
        }
        debug!("Transaction {} added", id);
        pending.insert(
            id,
            Pending {
                handler: Box::new(move |message| -> TransactionFuture { Box::pin(handler(message)) }),
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Take the handler for `id` and run it with the reply
    ///
    /// Returns `None` when nothing is waiting for this id.
    pub fn resolve(&self, id: &str, message: JanusMessage) -> Option<TransactionFuture> {
        self.purge_expired();
        let entry = self.pending.lock().remove(id)?;
        debug!("Transaction {} resolved", id);
        Some((entry.handler)(message))
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop handlers that waited longer than the timeout
    pub fn purge_expired(&self) -> usize {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return 0,
        };

        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|id, entry| {
            let alive = entry.created_at.elapsed() < timeout;
            if !alive {
                warn!("Transaction {} expired without a reply", id);
            }
            alive
        });
        before - pending.len()
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reply() -> JanusMessage {
        JanusMessage::from_value(json!({"janus": "success", "transaction": "t1"}))
    }

    #[tokio::test]
    async fn resolves_exactly_once() {
        let registry = TransactionRegistry::new(None);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        registry
            .add("t1", move |message| async move {
                assert!(message.is_success());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert!(registry.is_pending("t1"));

        registry.resolve("t1", reply()).unwrap().await.unwrap();
        assert!(registry.resolve("t1", reply()).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_is_not_a_transaction() {
        let registry = TransactionRegistry::new(None);
        assert!(registry.resolve("nope", reply()).is_none());
    }

    #[test]
    fn duplicate_pending_id_is_rejected() {
        let registry = TransactionRegistry::new(None);
        registry.add("t1", |_| async { Ok(()) }).unwrap();

        let err = registry.add("t1", |_| async { Ok(()) }).unwrap_err();
        match err {
            ProxyError::Recoverable(e) => {
                assert_eq!(e.code, CODE_DUPLICATE_TRANSACTION);
                assert_eq!(e.transaction.as_deref(), Some("t1"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let registry = TransactionRegistry::new(None);
        registry
            .add("t1", |_| async {
                Err(ProxyError::recoverable("Cannot publish", 490, Some("t1".into())))
            })
            .unwrap();

        let err = registry.resolve("t1", reply()).unwrap().await.unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let registry = TransactionRegistry::new(Some(Duration::from_millis(20)));
        registry.add("t1", |_| async { Ok(()) }).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(registry.resolve("t1", reply()).is_none());
        assert!(registry.is_empty());
    }
}
