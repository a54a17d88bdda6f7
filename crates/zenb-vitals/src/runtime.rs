//! Threaded monitoring runtime.
//!
//! Architecture:
//! - Capture threads push samples through cloneable [`SampleSender`]s into a
//!   bounded channel (`try_send`, drops are counted, never blocks capture)
//! - One worker thread owns the [`Session`], drains samples and ticks it on a
//!   fixed interval
//! - Events go out on a bounded channel to the consumer; the latest values
//!   are also cached behind a lock for polling readers
//! - Atomic metrics for observability

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::aggregate::SessionAggregate;
use crate::buffer::{ChannelKind, Sample};
use crate::config::{ConfigError, ProcessingConfig};
use crate::error::{SessionError, VitalsError};
use crate::measurement::PipelineEvent;
use crate::session::{LatestValues, Session};

/// Worker metrics tracked atomically
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub samples_accepted: AtomicU64,
    pub samples_rejected: AtomicU64,
    pub sample_queue_drops: AtomicU64,
    pub ticks: AtomicU64,
    pub events_emitted: AtomicU64,
    pub event_queue_drops: AtomicU64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            sample_queue_drops: self.sample_queue_drops.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            event_queue_drops: self.event_queue_drops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub sample_queue_drops: u64,
    pub ticks: u64,
    pub events_emitted: u64,
    pub event_queue_drops: u64,
}

/// Monotonic session clock shared by the worker and the capture side.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Microseconds since the session was started.
    pub fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

/// Commands sent to the worker thread
enum WorkerCmd {
    UpdateConfig {
        config: Box<ProcessingConfig>,
        reply: Sender<Result<(), ConfigError>>,
    },
    Stop {
        reply: Sender<Option<SessionAggregate>>,
    },
}

/// Capture-side handle. Cheap to clone, one per capture thread.
#[derive(Clone)]
pub struct SampleSender {
    tx: Sender<(ChannelKind, Sample)>,
    clock: SessionClock,
    metrics: Arc<WorkerMetrics>,
}

impl SampleSender {
    /// Queue a sample. Returns `false` when the queue is full or the session
    /// is gone; the sample is dropped and counted.
    pub fn send(&self, kind: ChannelKind, sample: Sample) -> bool {
        match self.tx.try_send((kind, sample)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let drops = self.metrics.sample_queue_drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops.is_power_of_two() {
                    log::warn!("sample queue full, {drops} samples dropped so far");
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue a sample stamped with the session clock.
    pub fn send_now(&self, kind: ChannelKind, value: f32) -> bool {
        self.send(kind, Sample::scalar(self.clock.now_us(), value))
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }
}

/// Handle to a running monitoring session.
///
/// Dropping the handle stops the session and joins the worker.
pub struct MonitoringHandle {
    samples: SampleSender,
    commands: Sender<WorkerCmd>,
    events: Receiver<PipelineEvent>,
    latest: Arc<RwLock<LatestValues>>,
    metrics: Arc<WorkerMetrics>,
    worker_thread: Option<thread::JoinHandle<()>>,
    aggregate: Option<SessionAggregate>,
}

impl MonitoringHandle {
    /// Validate `config`, enable `channels` and start monitoring on a worker
    /// thread. Sample timestamps are expected in [`SessionClock`] time.
    pub fn start(config: ProcessingConfig, channels: &[ChannelKind]) -> Result<Self, VitalsError> {
        let clock = SessionClock::new();
        let mut session = Session::new(config)?;
        for &kind in channels {
            session.enable_channel(kind)?;
        }
        session.start(clock.now_us())?;

        let cfg = session.config().session.clone();
        let (sample_tx, sample_rx) = bounded(cfg.sample_queue_capacity);
        let (event_tx, event_rx) = bounded(cfg.event_queue_capacity);
        let (cmd_tx, cmd_rx) = bounded(8);
        let latest = Arc::new(RwLock::new(LatestValues::default()));
        let metrics = Arc::new(WorkerMetrics::default());

        let worker = Worker {
            session,
            clock,
            samples: sample_rx,
            commands: cmd_rx,
            events: event_tx,
            latest: Arc::clone(&latest),
            metrics: Arc::clone(&metrics),
        };
        let worker_thread = thread::Builder::new()
            .name("zenb-vitals-worker".into())
            .spawn(move || worker.run())
            .map_err(|e| SessionError::Worker(e.to_string()))?;

        Ok(Self {
            samples: SampleSender {
                tx: sample_tx,
                clock,
                metrics: Arc::clone(&metrics),
            },
            commands: cmd_tx,
            events: event_rx,
            latest,
            metrics,
            worker_thread: Some(worker_thread),
            aggregate: None,
        })
    }

    pub fn sample_sender(&self) -> SampleSender {
        self.samples.clone()
    }

    /// Consumer side of the event stream. Ends after `SessionEnded`.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Values from the most recent tick.
    pub fn latest(&self) -> LatestValues {
        self.latest.read().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn clock(&self) -> SessionClock {
        self.samples.clock
    }

    /// Apply a new configuration between ticks.
    pub fn update_config(&self, config: ProcessingConfig) -> Result<(), VitalsError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(WorkerCmd::UpdateConfig {
                config: Box::new(config),
                reply,
            })
            .map_err(|_| SessionError::Stopped)?;
        rx.recv().map_err(|_| SessionError::Stopped)?.map_err(Into::into)
    }

    /// Stop monitoring and join the worker.
    ///
    /// Only the call that actually stops the worker returns the aggregate;
    /// later calls return `None`. Use [`MonitoringHandle::aggregate`] to read
    /// it again.
    pub fn stop(&mut self) -> Option<SessionAggregate> {
        let handle = self.worker_thread.take()?;
        let (reply, rx) = bounded(1);
        if self.commands.send(WorkerCmd::Stop { reply }).is_ok() {
            self.aggregate = rx.recv().ok().flatten();
        }
        if handle.join().is_err() {
            log::error!("monitoring worker panicked");
        }
        self.aggregate.clone()
    }

    /// Aggregate of a stopped session, `None` while monitoring.
    pub fn aggregate(&self) -> Option<&SessionAggregate> {
        self.aggregate.as_ref()
    }
}

impl Drop for MonitoringHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    session: Session,
    clock: SessionClock,
    samples: Receiver<(ChannelKind, Sample)>,
    commands: Receiver<WorkerCmd>,
    events: Sender<PipelineEvent>,
    latest: Arc<RwLock<LatestValues>>,
    metrics: Arc<WorkerMetrics>,
}

impl Worker {
    fn run(mut self) {
        let mut interval = self.tick_interval();
        let mut ticker = tick(interval);
        log::debug!("worker running, tick every {interval:?}");

        loop {
            select! {
                recv(self.samples) -> msg => match msg {
                    Ok((kind, sample)) => self.accept(kind, sample),
                    Err(_) => {
                        // Every sender is gone; finish as if stopped.
                        self.finish();
                        return;
                    }
                },
                recv(ticker) -> _ => self.tick(),
                recv(self.commands) -> cmd => match cmd {
                    Ok(WorkerCmd::UpdateConfig { config, reply }) => {
                        self.drain_samples();
                        let result = self.session.update_config(*config);
                        if result.is_ok() && self.tick_interval() != interval {
                            interval = self.tick_interval();
                            ticker = tick(interval);
                        }
                        let _ = reply.send(result);
                    }
                    Ok(WorkerCmd::Stop { reply }) => {
                        let aggregate = self.finish();
                        let _ = reply.send(aggregate);
                        return;
                    }
                    Err(_) => {
                        self.finish();
                        return;
                    }
                },
            }
        }
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.session.config().session.tick_interval_ms.max(1))
    }

    fn accept(&mut self, kind: ChannelKind, sample: Sample) {
        let counter = if self.session.push(kind, sample) {
            &self.metrics.samples_accepted
        } else {
            &self.metrics.samples_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn drain_samples(&mut self) {
        while let Ok((kind, sample)) = self.samples.try_recv() {
            self.accept(kind, sample);
        }
    }

    fn tick(&mut self) {
        self.drain_samples();
        let events = self.session.tick(self.clock.now_us());
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        *self.latest.write() = self.session.latest().clone();
        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: PipelineEvent) {
        match self.events.try_send(event) {
            Ok(()) => {
                self.metrics.events_emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.event_queue_drops.fetch_add(1, Ordering::Relaxed);
                log::warn!("event queue full, dropping event");
            }
            // Nobody listening
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn finish(&mut self) -> Option<SessionAggregate> {
        self.drain_samples();
        let aggregate = self.session.stop(self.clock.now_us());
        if let Some(agg) = &aggregate {
            self.emit(PipelineEvent::SessionEnded(agg.clone()));
        }
        aggregate
    }
}
