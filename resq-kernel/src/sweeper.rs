//! Background expiry of stale SOS reports.
//!
//! Scans once at startup, then once per interval, until the shutdown signal flips.

use crate::config::ExpiryConf;
use crate::registry::SharedRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub fn spawn_sweeper(
    registry: SharedRegistry,
    expiry: ExpiryConf,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let ttl = expiry.ttl();
    let every = expiry.sweep_interval();
    tracing::info!(ttl_secs = ttl.whole_seconds(), interval_secs = every.as_secs(), "starting expiry sweeper");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match registry.sweep_expired(ttl) {
                        Ok(evicted) if !evicted.is_empty() => {
                            tracing::debug!(devices = ?evicted, "sweep evicted reports");
                        }
                        Ok(_) => {}
                        // the eviction stands in memory; next successful save catches the file up
                        Err(e) => tracing::warn!(error = %e, "sweep could not persist evictions"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("expiry sweeper stopped");
                        break;
                    }
                }
            }
        }
    })
}
