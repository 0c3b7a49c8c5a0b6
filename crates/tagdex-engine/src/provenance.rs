//! Source verification hooks.
//!
//! A [`ProvenanceChecker`] knows how to confirm that a record's file really came from a
//! given source site. Checkers are registered in a [`ProvenanceRegistry`]; after ingest,
//! pending records with a supported source are offered to a bounded queue that a
//! [`ProvenanceWorker`] drains. No checkers ship with the crate.

use std::sync::Arc;

use async_trait::async_trait;
use tagdex_document::Record;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::UpstreamError;

/// Result of checking one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The source hosts the same file.
    Match,
    /// The source hosts a different file.
    Mismatch,
    /// The source could not be checked.
    Unavailable,
}

/// Verifies record files against one family of source sites.
#[async_trait]
pub trait ProvenanceChecker: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether this checker understands `url`.
    fn supports(&self, url: &Url) -> bool;

    /// Compares the record's file with what `source` hosts.
    async fn verify(&self, record: &Record, source: &Url) -> Result<Verdict, UpstreamError>;
}

/// The registered checkers, tried in registration order.
#[derive(Default, Clone)]
pub struct ProvenanceRegistry {
    /// Checkers in priority order.
    checkers: Vec<Arc<dyn ProvenanceChecker>>,
}

impl ProvenanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a checker.
    pub fn register(&mut self, checker: Arc<dyn ProvenanceChecker>) {
        self.checkers.push(checker);
    }

    /// Number of registered checkers.
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Returns true when no checker is registered.
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// The first checker supporting any of the record's sources, with that source.
    pub fn checker_for(&self, record: &Record) -> Option<(Arc<dyn ProvenanceChecker>, Url)> {
        record
            .sources
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .find_map(|url| {
                self.checkers
                    .iter()
                    .find(|c| c.supports(&url))
                    .map(|c| (Arc::clone(c), url))
            })
    }
}

/// A record waiting for verification.
pub struct Candidate {
    /// Record to verify.
    pub record: Record,
    /// Source to verify against.
    pub source: Url,
    /// Checker handling the source.
    pub checker: Arc<dyn ProvenanceChecker>,
}

/// Sending side of the verification queue.
#[derive(Clone)]
pub struct ProvenanceQueue {
    /// Checkers deciding what is offered.
    registry: Arc<ProvenanceRegistry>,
    /// Bounded queue.
    tx: mpsc::Sender<Candidate>,
}

impl ProvenanceQueue {
    /// Creates a queue holding at most `capacity` candidates, and the worker draining it.
    pub fn new(registry: ProvenanceRegistry, capacity: usize) -> (Self, ProvenanceWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            registry: Arc::new(registry),
            tx,
        };
        (queue, ProvenanceWorker { rx })
    }

    /// Offers a freshly ingested record. Returns true when it was queued.
    ///
    /// Only pending, non-deleted records with a supported source qualify. A full queue
    /// drops the record; it will be offered again on its next update.
    pub fn offer(&self, record: &Record) -> bool {
        if !record.flags.pending || record.flags.deleted {
            return false;
        }
        let Some((checker, source)) = self.registry.checker_for(record) else {
            return false;
        };
        let candidate = Candidate {
            record: record.clone(),
            source,
            checker,
        };
        match self.tx.try_send(candidate) {
            Ok(()) => true,
            Err(TrySendError::Full(c)) => {
                debug!(post_id = c.record.id, "verification queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Receiving side of the verification queue.
pub struct ProvenanceWorker {
    /// Bounded queue.
    rx: mpsc::Receiver<Candidate>,
}

impl ProvenanceWorker {
    /// Verifies queued records until the queue closes or `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let candidate = tokio::select! {
                () = shutdown.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(candidate) => candidate,
                    None => break,
                },
            };
            Self::verify(&candidate).await;
        }
        debug!("provenance worker stopped");
    }

    /// Verifies one candidate and logs the verdict.
    async fn verify(candidate: &Candidate) {
        let checker = candidate.checker.name();
        let post_id = candidate.record.id;
        match candidate
            .checker
            .verify(&candidate.record, &candidate.source)
            .await
        {
            Ok(verdict) => info!(post_id, checker, source = %candidate.source, ?verdict, "source checked"),
            Err(e) => warn!(post_id, checker, error = %e, "source check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use tagdex_document::{Rating, RecordFlags, TagBuckets};

    use super::*;

    /// Accepts one host and counts verifications.
    #[derive(Default)]
    struct HostChecker {
        /// Verifications performed.
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProvenanceChecker for HostChecker {
        fn name(&self) -> &str {
            "host"
        }

        fn supports(&self, url: &Url) -> bool {
            url.host_str() == Some("art.example")
        }

        async fn verify(&self, _record: &Record, _source: &Url) -> Result<Verdict, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::Match)
        }
    }

    /// A pending record with the given sources.
    fn pending(id: u64, sources: &[&str]) -> Record {
        Record {
            id,
            tags: TagBuckets::new(),
            uploader_id: 1,
            approver_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            content_hash: String::new(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            rating: Rating::Safe,
            width: 1,
            height: 1,
            duration: 0.0,
            favorite_count: 0,
            score: 0,
            parent_id: None,
            children: Default::default(),
            file_type: "png".into(),
            file_size: 1,
            comment_count: 0,
            flags: RecordFlags {
                pending: true,
                ..RecordFlags::default()
            },
        }
    }

    /// Queue with one registered host checker.
    fn queue(capacity: usize) -> (Arc<HostChecker>, ProvenanceQueue, ProvenanceWorker) {
        let checker = Arc::new(HostChecker::default());
        let mut registry = ProvenanceRegistry::new();
        registry.register(checker.clone());
        let (queue, worker) = ProvenanceQueue::new(registry, capacity);
        (checker, queue, worker)
    }

    #[test]
    fn only_pending_supported_records_qualify() {
        let (_checker, queue, _worker) = queue(8);
        assert!(queue.offer(&pending(1, &["not a url", "https://art.example/1"])));
        assert!(!queue.offer(&pending(2, &["https://elsewhere.example/2"])));

        let mut approved = pending(3, &["https://art.example/3"]);
        approved.flags.pending = false;
        assert!(!queue.offer(&approved));

        let mut deleted = pending(4, &["https://art.example/4"]);
        deleted.flags.deleted = true;
        assert!(!queue.offer(&deleted));
    }

    #[test]
    fn full_queue_drops_offers() {
        let (_checker, queue, _worker) = queue(1);
        assert!(queue.offer(&pending(1, &["https://art.example/1"])));
        assert!(!queue.offer(&pending(2, &["https://art.example/2"])));
    }

    #[tokio::test]
    async fn worker_drains_until_queue_closes() {
        let (checker, queue, worker) = queue(8);
        queue.offer(&pending(1, &["https://art.example/1"]));
        queue.offer(&pending(2, &["https://art.example/2"]));
        drop(queue);

        worker.run(CancellationToken::new()).await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
    }
}
