//! Batched evaluation scheduler.
//!
//! Search workers submit single positions and block on a [`Ticket`]. A
//! dispatcher thread drains the request channel into batches of up to
//! `batch_size` positions, waiting at most `batch_wait` after the first
//! request of a batch, and makes one `evaluate_batch` call per batch. Each
//! submitter receives exactly its own result; a batch-level failure is
//! delivered to every submitter of that batch.
//!
//! With batching disabled every request is evaluated synchronously on the
//! caller's thread as a batch of one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use engine_core::Position;
use tracing::{debug, warn};

use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};

type Reply = Result<EvalResult, EvaluatorError>;

struct EvalRequest<S> {
    position: Position<S>,
    reply: Sender<Reply>,
}

/// Handle for one in-flight request.
pub struct Ticket {
    rx: Receiver<Reply>,
}

impl Ticket {
    /// Block until the result arrives.
    pub fn recv(&self) -> Reply {
        match self.rx.recv() {
            Ok(reply) => reply,
            Err(_) => Err(EvaluatorError::Unavailable(
                "dispatcher dropped the request".into(),
            )),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Reply> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(EvaluatorError::Unavailable(
                "dispatcher dropped the request".into(),
            ))),
        }
    }
}

/// Scheduler counters.
#[derive(Debug, Default)]
pub struct BatchStats {
    batches: AtomicU64,
    items: AtomicU64,
    largest: AtomicU64,
    failures: AtomicU64,
}

impl BatchStats {
    fn record(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(size as u64, Ordering::Relaxed);
        self.largest.fetch_max(size as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            largest: self.largest.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStatsSnapshot {
    pub batches: u64,
    pub items: u64,
    pub largest: u64,
    pub failures: u64,
}

impl BatchStatsSnapshot {
    pub fn mean_batch(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.items as f64 / self.batches as f64
        }
    }
}

enum Mode<S> {
    Inline(Arc<dyn Evaluator<S>>),
    Batched {
        requests: Mutex<Option<Sender<EvalRequest<S>>>>,
        dispatcher: Mutex<Option<JoinHandle<()>>>,
    },
}

/// Aggregates evaluation requests into batches for one evaluator.
pub struct BatchScheduler<S> {
    mode: Mode<S>,
    stats: Arc<BatchStats>,
}

impl<S> fmt::Debug for BatchScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Inline(_) => "inline",
            Mode::Batched { .. } => "batched",
        };
        f.debug_struct("BatchScheduler")
            .field("mode", &mode)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<S: Send + Sync + 'static> BatchScheduler<S> {
    /// Synchronous single-item evaluation on the caller's thread.
    pub fn inline(evaluator: Arc<dyn Evaluator<S>>) -> Self {
        Self {
            mode: Mode::Inline(evaluator),
            stats: Arc::new(BatchStats::default()),
        }
    }

    /// Batching scheduler with a dedicated dispatcher thread.
    pub fn batched(
        evaluator: Arc<dyn Evaluator<S>>,
        batch_size: usize,
        batch_wait: Duration,
    ) -> Result<Self, EvaluatorError> {
        let (tx, rx) = mpsc::channel::<EvalRequest<S>>();
        let stats = Arc::new(BatchStats::default());
        let thread_stats = Arc::clone(&stats);
        let batch_size = batch_size.max(1);

        let handle = std::thread::Builder::new()
            .name("eval-dispatch".into())
            .spawn(move || dispatch_loop(evaluator, rx, batch_size, batch_wait, thread_stats))
            .map_err(|e| EvaluatorError::Unavailable(format!("spawn dispatcher: {e}")))?;

        Ok(Self {
            mode: Mode::Batched {
                requests: Mutex::new(Some(tx)),
                dispatcher: Mutex::new(Some(handle)),
            },
            stats,
        })
    }

    pub fn is_batched(&self) -> bool {
        matches!(self.mode, Mode::Batched { .. })
    }

    /// Queue a position. In inline mode the evaluation runs before this
    /// returns and the ticket is already resolved.
    pub fn submit(&self, position: Position<S>) -> Result<Ticket, EvaluatorError> {
        let (reply, rx) = mpsc::channel();
        match &self.mode {
            Mode::Inline(evaluator) => {
                self.stats.record(1);
                let result = evaluator.evaluate_batch(&[&position]).and_then(|mut out| {
                    if out.len() == 1 {
                        out.pop().ok_or_else(|| {
                            EvaluatorError::Malformed("evaluator returned no result".into())
                        })
                    } else {
                        Err(EvaluatorError::Malformed(format!(
                            "evaluator returned {} results for 1 position",
                            out.len()
                        )))
                    }
                });
                if result.is_err() {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                }
                let _ = reply.send(result);
            }
            Mode::Batched { requests, .. } => {
                let sender = requests
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .as_ref()
                    .cloned()
                    .ok_or_else(|| EvaluatorError::Unavailable("scheduler shut down".into()))?;
                sender
                    .send(EvalRequest { position, reply })
                    .map_err(|_| EvaluatorError::Unavailable("dispatcher stopped".into()))?;
            }
        }
        Ok(Ticket { rx })
    }

    /// Submit and block for the result.
    pub fn evaluate(&self, position: Position<S>) -> Reply {
        self.submit(position)?.recv()
    }

    pub fn stats(&self) -> BatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting requests and join the dispatcher once queued batches
    /// have been answered.
    pub fn shutdown(&self) {
        if let Mode::Batched {
            requests,
            dispatcher,
        } = &self.mode
        {
            requests.lock().unwrap_or_else(|e| e.into_inner()).take();
            let handle = dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("evaluation dispatcher panicked");
                }
            }
        }
    }
}

impl<S> Drop for BatchScheduler<S> {
    fn drop(&mut self) {
        if let Mode::Batched {
            requests,
            dispatcher,
        } = &mut self.mode
        {
            requests.get_mut().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(handle) = dispatcher.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = handle.join();
            }
        }
    }
}

fn dispatch_loop<S>(
    evaluator: Arc<dyn Evaluator<S>>,
    rx: Receiver<EvalRequest<S>>,
    batch_size: usize,
    batch_wait: Duration,
    stats: Arc<BatchStats>,
) {
    // Ends when every sender is gone and the queue is drained.
    while let Ok(first) = rx.recv() {
        let mut batch = Vec::with_capacity(batch_size);
        batch.push(first);
        let deadline = Instant::now() + batch_wait;

        while batch.len() < batch_size {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_timeout(deadline - now) {
                Ok(request) => batch.push(request),
                Err(_) => break,
            }
        }

        stats.record(batch.len());
        let positions: Vec<&Position<S>> = batch.iter().map(|r| &r.position).collect();
        let outcome = evaluator.evaluate_batch(&positions);
        drop(positions);

        match outcome {
            Ok(results) if results.len() == batch.len() => {
                debug!(size = batch.len(), "evaluated batch");
                for (request, result) in batch.into_iter().zip(results) {
                    let _ = request.reply.send(Ok(result));
                }
            }
            Ok(results) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                let err = EvaluatorError::Malformed(format!(
                    "evaluator returned {} results for {} positions",
                    results.len(),
                    batch.len()
                ));
                for request in batch {
                    let _ = request.reply.send(Err(err.clone()));
                }
            }
            Err(err) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(size = batch.len(), error = %err, "batch evaluation failed");
                for request in batch {
                    let _ = request.reply.send(Err(err.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use std::sync::Barrier;

    /// Policy encodes the state so results can be matched to submitters.
    struct EchoEvaluator {
        calls: AtomicU64,
    }

    impl Evaluator<u32> for EchoEvaluator {
        fn evaluate_batch(
            &self,
            positions: &[&Position<u32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(positions
                .iter()
                .map(|p| EvalResult {
                    policy: vec![*p.state() as f32],
                    value: *p.state() as f32 / 100.0,
                })
                .collect())
        }
    }

    struct FailingEvaluator;

    impl Evaluator<u32> for FailingEvaluator {
        fn evaluate_batch(
            &self,
            _positions: &[&Position<u32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            Err(EvaluatorError::EvaluationFailed("model offline".into()))
        }
    }

    struct ShortEvaluator;

    impl Evaluator<u32> for ShortEvaluator {
        fn evaluate_batch(
            &self,
            _positions: &[&Position<u32>],
        ) -> Result<Vec<EvalResult>, EvaluatorError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_inline_single_request() {
        let scheduler = BatchScheduler::<u32>::inline(Arc::new(UniformEvaluator::new(2)));
        let result = scheduler.evaluate(Position::new(1u32)).unwrap();
        assert_eq!(result.policy, vec![0.5, 0.5]);
        assert!(!scheduler.is_batched());
        assert_eq!(scheduler.stats().batches, 1);
        assert_eq!(scheduler.stats().largest, 1);
    }

    #[test]
    fn test_batched_single_request_matches_inline() {
        let evaluator: Arc<dyn Evaluator<u32>> = Arc::new(EchoEvaluator {
            calls: AtomicU64::new(0),
        });
        let inline = BatchScheduler::inline(Arc::clone(&evaluator));
        let batched =
            BatchScheduler::batched(evaluator, 8, Duration::from_millis(1)).unwrap();

        let a = inline.evaluate(Position::new(7)).unwrap();
        let b = batched.evaluate(Position::new(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(batched.stats().items, 1);
    }

    #[test]
    fn test_full_batch_routes_results_to_submitters() {
        const N: usize = 8;
        let evaluator = Arc::new(EchoEvaluator {
            calls: AtomicU64::new(0),
        });
        let scheduler = Arc::new(
            BatchScheduler::batched(
                Arc::clone(&evaluator) as Arc<dyn Evaluator<u32>>,
                N,
                Duration::from_secs(5),
            )
            .unwrap(),
        );
        let barrier = Arc::new(Barrier::new(N));

        let handles: Vec<_> = (0..N as u32)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    (i, scheduler.evaluate(Position::new(i)).unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (i, result) = handle.join().unwrap();
            assert_eq!(result.policy, vec![i as f32]);
        }
        // Batch closes as soon as it is full, long before the wait expires.
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
        let stats = scheduler.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.largest, N as u64);
        assert!((stats.mean_batch() - N as f64).abs() < 1e-9);
    }

    #[test]
    fn test_batch_error_reaches_every_submitter() {
        let scheduler = Arc::new(
            BatchScheduler::batched(
                Arc::new(FailingEvaluator) as Arc<dyn Evaluator<u32>>,
                4,
                Duration::from_millis(20),
            )
            .unwrap(),
        );
        let handles: Vec<_> = (0..4u32)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || scheduler.evaluate(Position::new(i)))
            })
            .collect();
        for handle in handles {
            assert!(matches!(
                handle.join().unwrap(),
                Err(EvaluatorError::EvaluationFailed(_))
            ));
        }
        assert!(scheduler.stats().failures >= 1);
    }

    #[test]
    fn test_wrong_result_count_is_malformed() {
        let scheduler =
            BatchScheduler::<u32>::batched(Arc::new(ShortEvaluator), 2, Duration::from_millis(1))
                .unwrap();
        assert!(matches!(
            scheduler.evaluate(Position::new(1)),
            Err(EvaluatorError::Malformed(_))
        ));

        let inline = BatchScheduler::<u32>::inline(Arc::new(ShortEvaluator));
        assert!(matches!(
            inline.evaluate(Position::new(1)),
            Err(EvaluatorError::Malformed(_))
        ));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let scheduler = BatchScheduler::batched(
            Arc::new(UniformEvaluator::new(1)) as Arc<dyn Evaluator<u32>>,
            4,
            Duration::from_millis(1),
        )
        .unwrap();
        scheduler.shutdown();
        assert!(matches!(
            scheduler.evaluate(Position::new(0)),
            Err(EvaluatorError::Unavailable(_))
        ));
    }

    #[test]
    fn test_ticket_timeout() {
        let (_tx, rx) = mpsc::channel();
        let ticket = Ticket { rx };
        assert!(ticket.recv_timeout(Duration::from_millis(1)).is_none());
    }
}
