//! Scrape coordinator
//!
//! Runs one cycle across every configured target. Each target gets its own
//! task; the cycle finishes once every task has finished, failed, panicked
//! or hit the per-target deadline. A target never takes another target's
//! measurements down with it.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::catalogue::Catalogue;
use crate::core::measurement::{Measurement, PollOutcome};
use crate::core::poller::{DevicePoller, PollSettings, DEFAULT_SESSION_TIMEOUT};
use crate::core::target::Target;
use crate::core::transport::SessionClient;

pub use crate::core::target::resolve_targets;

/// Default deadline for one target's whole cycle
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ScrapeSettings {
    pub session_timeout: Duration,
    /// `None` waits for every target however long it takes
    pub scrape_timeout: Option<Duration>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            scrape_timeout: Some(DEFAULT_SCRAPE_TIMEOUT),
        }
    }
}

/// Everything one cycle produced
#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    /// Samples of all targets; no ordering across targets
    pub measurements: Vec<Measurement>,
    pub reachable: usize,
    pub unreachable: usize,
    /// Reachable targets with a cut-short phase direction
    pub partial: usize,
    pub duration: Duration,
}

impl ScrapeResult {
    fn record(&mut self, outcome: PollOutcome) {
        if outcome.is_reachable() {
            self.reachable += 1;
            if outcome.is_partial() {
                self.partial += 1;
            }
        } else {
            self.unreachable += 1;
        }
        self.measurements.extend(outcome.into_measurements());
    }

    pub fn targets(&self) -> usize {
        self.reachable + self.unreachable
    }
}

/// Fans one poller out per target and waits for all of them
#[derive(Debug, Clone)]
pub struct Coordinator {
    poller: Arc<DevicePoller>,
    catalogue: Arc<Catalogue>,
    targets: Arc<[Target]>,
    settings: ScrapeSettings,
}

impl Coordinator {
    pub fn new(
        client: Arc<dyn SessionClient>,
        catalogue: Arc<Catalogue>,
        targets: Vec<Target>,
        settings: ScrapeSettings,
    ) -> Self {
        let poller = DevicePoller::new(
            client,
            PollSettings {
                session_timeout: settings.session_timeout,
            },
        );
        Self {
            poller: Arc::new(poller),
            catalogue,
            targets: targets.into(),
            settings,
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Run one cycle over all targets
    pub async fn scrape(&self) -> ScrapeResult {
        let started = Instant::now();

        let mut pending: FuturesUnordered<_> = self
            .targets
            .iter()
            .map(|target| {
                let address = target.address.clone();
                let handle = tokio::spawn(poll_with_deadline(
                    Arc::clone(&self.poller),
                    target.clone(),
                    self.settings.scrape_timeout,
                ));
                async move { (address, handle.await) }
            })
            .collect();

        let mut result = ScrapeResult::default();
        while let Some((address, joined)) = pending.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(address = %address, "Poller task failed: {}", e);
                    PollOutcome::unreachable(address, format!("poller task failed: {}", e))
                },
            };
            result.record(outcome);
        }
        result.duration = started.elapsed();

        if result.unreachable > 0 {
            info!(
                targets = result.targets(),
                unreachable = result.unreachable,
                partial = result.partial,
                duration_ms = result.duration.as_millis() as u64,
                "Scrape finished with unreachable targets"
            );
        } else {
            debug!(
                targets = result.targets(),
                partial = result.partial,
                duration_ms = result.duration.as_millis() as u64,
                "Scrape finished"
            );
        }
        result
    }
}

async fn poll_with_deadline(
    poller: Arc<DevicePoller>,
    target: Target,
    deadline: Option<Duration>,
) -> PollOutcome {
    let Some(limit) = deadline else {
        return poller.poll(&target).await;
    };
    match tokio::time::timeout(limit, poller.poll(&target)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(address = %target.address, "No result within {:?}", limit);
            PollOutcome::unreachable(&target.address, format!("no result within {:?}", limit))
        },
    }
}
