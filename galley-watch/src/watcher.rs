use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use galley_core::KitchenName;
use galley_sync::remote::ServingSummary;
use galley_sync::RecipeRemote;

use crate::error::WatchError;

pub type SharedRemote = Arc<dyn RecipeRemote + Send + Sync>;

const EVENT_BUFFER: usize = 64;
const DEFAULT_MAX_FAILURES: u32 = 5;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub kitchen: KitchenName,
    pub interval: Duration,
    /// Consecutive failed polls tolerated before the watcher gives up.
    pub max_failures: u32,
}

impl WatchConfig {
    pub fn new(kitchen: KitchenName, interval: Duration) -> Result<Self, WatchError> {
        if kitchen.0.trim().is_empty() {
            return Err(WatchError::InvalidConfig(
                "kitchen name must not be empty".to_string(),
            ));
        }
        if interval.is_zero() {
            return Err(WatchError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            kitchen,
            interval,
            max_failures: DEFAULT_MAX_FAILURES,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ServingChange {
    Started,
    StatusChanged { previous: String },
    Finished,
}

/// One observed change; `serving` is the latest known summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServingEvent {
    pub kitchen: String,
    pub serving: ServingSummary,
    #[serde(flatten)]
    pub change: ServingChange,
}

/// Changes between the last snapshot and the current poll, ordered by
/// serving id.
pub fn diff_servings(
    previous: &BTreeMap<String, ServingSummary>,
    current: &[ServingSummary],
) -> Vec<(ServingSummary, ServingChange)> {
    let current: BTreeMap<&str, &ServingSummary> = current
        .iter()
        .map(|s| (s.serving_id.as_str(), s))
        .collect();

    let mut changes = Vec::new();
    for (id, serving) in &current {
        match previous.get(*id) {
            None => changes.push(((*serving).clone(), ServingChange::Started)),
            Some(known) if known.status != serving.status => changes.push((
                (*serving).clone(),
                ServingChange::StatusChanged {
                    previous: known.status.clone(),
                },
            )),
            Some(_) => {}
        }
    }
    for (id, known) in previous {
        if !current.contains_key(id.as_str()) {
            changes.push((known.clone(), ServingChange::Finished));
        }
    }
    changes.sort_by(|a, b| a.0.serving_id.cmp(&b.0.serving_id));
    changes
}

/// Polls one kitchen. Constructed per invocation; nothing is global.
pub struct ActiveServingWatcher {
    config: WatchConfig,
    remote: SharedRemote,
}

impl ActiveServingWatcher {
    pub fn new(config: WatchConfig, remote: SharedRemote) -> Self {
        Self { config, remote }
    }

    /// Start polling on the current Tokio runtime.
    pub fn spawn(self) -> WatchHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(self.run(event_tx, stop_rx));
        WatchHandle {
            stop: stop_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(
        self,
        events: mpsc::Sender<ServingEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), WatchError> {
        let kitchen = self.config.kitchen.clone();
        let mut known: BTreeMap<String, ServingSummary> = BTreeMap::new();
        let mut failures = 0u32;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(kitchen = %kitchen, interval_ms = self.config.interval.as_millis() as u64, "watching active servings");

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let remote = self.remote.clone();
                    let target = kitchen.clone();
                    let polled = tokio::task::spawn_blocking(move || remote.active_servings(&target))
                        .await
                        .map_err(|err| WatchError::Join { task: "poll", reason: err.to_string() })?;

                    let servings = match polled {
                        Ok(servings) => {
                            failures = 0;
                            servings
                        }
                        Err(err) => {
                            failures += 1;
                            tracing::warn!(kitchen = %kitchen, failures, error = %err, "polling active servings failed");
                            if failures >= self.config.max_failures {
                                return Err(WatchError::Remote { failures, source: err });
                            }
                            continue;
                        }
                    };

                    for (serving, change) in diff_servings(&known, &servings) {
                        tracing::debug!(kitchen = %kitchen, serving = %serving.serving_id, ?change, "serving changed");
                        let event = ServingEvent {
                            kitchen: kitchen.to_string(),
                            serving,
                            change,
                        };
                        if events.send(event).await.is_err() {
                            tracing::debug!("event receiver dropped; stopping watcher");
                            return Ok(());
                        }
                    }
                    known = servings
                        .into_iter()
                        .map(|s| (s.serving_id.clone(), s))
                        .collect();
                }
            }
        }

        tracing::info!(kitchen = %kitchen, "watcher stopped");
        Ok(())
    }
}

/// Running watcher: receives events and stops it.
pub struct WatchHandle {
    stop: watch::Sender<bool>,
    events: mpsc::Receiver<ServingEvent>,
    task: JoinHandle<Result<(), WatchError>>,
}

impl WatchHandle {
    /// Next event; `None` once the watcher has ended.
    pub async fn next_event(&mut self) -> Option<ServingEvent> {
        self.events.recv().await
    }

    /// Signal the watcher to stop and wait for it; returns the watcher's own
    /// error if it ended on one.
    pub async fn stop(self) -> Result<(), WatchError> {
        let WatchHandle { stop, events, task } = self;
        let _ = stop.send(true);
        drop(events);
        match task.await {
            Ok(result) => result,
            Err(err) => Err(WatchError::Join {
                task: "watcher",
                reason: err.to_string(),
            }),
        }
    }
}

/// Run `watcher` on a fresh runtime until ctrl-c or a fatal error, handing
/// each event to `on_event`.
pub fn run_blocking<F>(watcher: ActiveServingWatcher, mut on_event: F) -> Result<(), WatchError>
where
    F: FnMut(&ServingEvent),
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(WatchError::Runtime)?;
    runtime.block_on(async move {
        let mut handle = watcher.spawn();
        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(event) => on_event(&event),
                    None => break,
                },
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => tracing::info!("received ctrl-c, stopping watcher"),
                        Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed"),
                    }
                    break;
                }
            }
        }
        handle.stop().await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serving(id: &str, status: &str) -> ServingSummary {
        ServingSummary {
            serving_id: id.to_string(),
            recipe: "demo".to_string(),
            variation: "prod".to_string(),
            status: status.to_string(),
            started_at: None,
        }
    }

    fn snapshot(servings: &[ServingSummary]) -> BTreeMap<String, ServingSummary> {
        servings
            .iter()
            .map(|s| (s.serving_id.clone(), s.clone()))
            .collect()
    }

    #[test]
    fn rejects_zero_interval_and_blank_kitchen() {
        assert!(WatchConfig::new(KitchenName::from("dev"), Duration::ZERO).is_err());
        assert!(WatchConfig::new(KitchenName::from(" "), Duration::from_secs(1)).is_err());
        let config = WatchConfig::new(KitchenName::from("dev"), Duration::from_secs(1)).unwrap();
        assert_eq!(config.max_failures, DEFAULT_MAX_FAILURES);
    }

    #[test]
    fn diff_reports_started_changed_and_finished() {
        let previous = snapshot(&[serving("a", "RUNNING"), serving("b", "RUNNING")]);
        let current = vec![serving("b", "COMPLETED"), serving("c", "RUNNING")];

        let changes = diff_servings(&previous, &current);

        assert_eq!(
            changes,
            vec![
                (serving("a", "RUNNING"), ServingChange::Finished),
                (
                    serving("b", "COMPLETED"),
                    ServingChange::StatusChanged {
                        previous: "RUNNING".to_string()
                    }
                ),
                (serving("c", "RUNNING"), ServingChange::Started),
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_yields_nothing() {
        let servings = vec![serving("a", "RUNNING")];
        assert!(diff_servings(&snapshot(&servings), &servings).is_empty());
    }

    #[test]
    fn event_serializes_flat() {
        let event = ServingEvent {
            kitchen: "dev".to_string(),
            serving: serving("a", "COMPLETED"),
            change: ServingChange::StatusChanged {
                previous: "RUNNING".to_string(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["change"], json!("status_changed"));
        assert_eq!(value["previous"], json!("RUNNING"));
        assert_eq!(value["serving"]["serving_id"], json!("a"));
    }
}
