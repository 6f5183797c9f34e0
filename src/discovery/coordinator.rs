//! Discovery run coordination
//!
//! Bounded worker pool fed by a backpressured address channel. Results flow
//! through an mpsc sink into the run aggregate; progress is a projection of
//! completed-probe counts on a watch channel, and per-host failures are
//! published on a broadcast bus. Cancellation stops dispatch immediately and
//! abandons in-flight probes without awaiting them.

use super::prober::HostProber;
use super::{
    DiscoveryEvent, DiscoveryProgress, DiscoveryRun, HostOutcome, RunState, SkippedHost,
};
use crate::compliance::ComplianceEvaluator;
use crate::config::DiscoveryConfig;
use crate::credentials::CredentialResolver;
use crate::error::{FailureStage, SkipReason};
use crate::protocols::build_probe_set;
use crate::utils::{AddressSpaceExpander, AddressSpaceSpec};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Progress state shared between workers and observers
struct ProgressTracker {
    inner: Mutex<DiscoveryProgress>,
    tx: watch::Sender<DiscoveryProgress>,
}

impl ProgressTracker {
    fn new(tx: watch::Sender<DiscoveryProgress>) -> Self {
        Self {
            inner: Mutex::new(DiscoveryProgress::new(0)),
            tx,
        }
    }

    fn update<F: FnOnce(&mut DiscoveryProgress)>(&self, f: F) {
        let snapshot = {
            let mut progress = self.inner.lock().expect("progress lock poisoned");
            f(&mut progress);
            progress.clone()
        };
        let _ = self.tx.send(snapshot);
    }
}

/// Bounded-concurrency scheduler for discovery runs
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    resolver: Arc<CredentialResolver>,
    prober: Arc<HostProber>,
    cancel: CancellationToken,
    progress_rx: watch::Receiver<DiscoveryProgress>,
    tracker: Arc<ProgressTracker>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryCoordinator {
    pub fn new(
        config: DiscoveryConfig,
        resolver: Arc<CredentialResolver>,
        evaluator: Arc<ComplianceEvaluator>,
    ) -> crate::Result<Self> {
        config.validate()?;

        let probes = build_probe_set(&config)?;
        let prober = Arc::new(HostProber::new(probes, resolver.clone(), evaluator));
        let (progress_tx, progress_rx) = watch::channel(DiscoveryProgress::new(0));
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            resolver,
            prober,
            cancel: CancellationToken::new(),
            tracker: Arc::new(ProgressTracker::new(progress_tx)),
            progress_rx,
            event_tx,
        })
    }

    /// Token callers use to cancel the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to progress snapshots
    pub fn progress(&self) -> watch::Receiver<DiscoveryProgress> {
        self.progress_rx.clone()
    }

    /// Subscribe to per-host failure events
    pub fn events(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Execute one discovery run. Only configuration problems error; every
    /// per-host failure is data in the returned run, and cancellation yields
    /// a normal run built from whatever completed.
    pub async fn run(&self, spec: &AddressSpaceSpec) -> crate::Result<DiscoveryRun> {
        if self.resolver.is_empty() {
            return Err(crate::DiscoveryError::NoCredentialSource);
        }

        let started_at = Utc::now();

        // Expanding
        let sequence = AddressSpaceExpander::expand(spec)?;
        let total = sequence.len();
        self.tracker.update(|p| {
            *p = DiscoveryProgress::new(total);
        });
        log::info!("discovery run over {} addresses ({})", total, spec);

        // Scanning
        self.tracker.update(|p| p.state = RunState::Scanning);

        let workers = self.config.concurrency.min(total.max(1));
        let (addr_tx, addr_rx) = mpsc::channel::<std::net::Ipv4Addr>(workers * 2);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<HostOutcome>(workers);
        let addr_rx = Arc::new(tokio::sync::Mutex::new(addr_rx));

        // Producer: feeds the bounded channel, stops on cancellation
        let producer = {
            let cancel = self.cancel.clone();
            let sequence = sequence.clone();
            tokio::spawn(async move {
                for address in sequence.iter() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = addr_tx.send(address) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let mut worker_handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let addr_rx = addr_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let prober = self.prober.clone();
            let cancel = self.cancel.clone();
            let tracker = self.tracker.clone();

            worker_handles.push(tokio::spawn(async move {
                loop {
                    let address = {
                        let mut rx = addr_rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            address = rx.recv() => address,
                        }
                    };
                    let Some(address) = address else { break };

                    tracker.update(|p| p.dispatched += 1);

                    // Abandon the in-flight probe on cancellation; whatever
                    // completed before the cancellation point still counts.
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => break,
                        outcome = prober.discover(address, &cancel) => outcome,
                    };

                    if matches!(
                        outcome,
                        HostOutcome::Skipped { reason: SkipReason::Cancelled, .. }
                    ) {
                        break;
                    }

                    tracker.update(|p| p.completed += 1);
                    if outcome_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(outcome_tx);

        // Aggregate until every worker has dropped its sender
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                HostOutcome::Discovered(result) => {
                    log::debug!("{}: discovered ({} protocols)", result.address, result.protocols.len());
                    results.push(*result);
                }
                HostOutcome::Skipped { address, reason } => {
                    self.publish_failure(address, reason);
                    skipped.push(SkippedHost { address, reason });
                }
            }
        }

        self.tracker.update(|p| p.state = RunState::Aggregating);

        let _ = producer.await;
        for handle in worker_handles {
            let _ = handle.await;
        }

        let cancelled = self.cancel.is_cancelled();
        let run = DiscoveryRun {
            requested: spec.clone(),
            results,
            skipped,
            started_at,
            completed_at: Utc::now(),
            cancelled,
        };

        self.tracker.update(|p| p.state = RunState::Done);
        let summary = run.summary();
        log::info!(
            "run finished{}: {} healthy, {} unreachable, {} auth-failed, {} without credentials",
            if cancelled { " (cancelled)" } else { "" },
            summary.healthy,
            summary.unreachable,
            summary.auth_failed,
            summary.no_credentials
        );

        Ok(run)
    }

    fn publish_failure(&self, address: std::net::Ipv4Addr, reason: SkipReason) {
        let stage = match reason {
            SkipReason::NoCredentials => FailureStage::CredentialResolution,
            _ => FailureStage::Probe,
        };
        log::warn!("{}: {} at stage {}", address, reason, stage);
        let _ = self.event_tx.send(DiscoveryEvent {
            address,
            stage,
            reason: reason.to_string(),
        });
    }
}
