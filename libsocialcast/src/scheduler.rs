//! Due-post scheduler
//!
//! One background loop per process. Each tick reads the due posts once and
//! dispatches them concurrently; each post ends up `published` or `failed`
//! on its own, and no publish is retried. A post whose publish succeeded but
//! whose status could not be saved is kept out of later ticks, and only the
//! status write is retried.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::platforms::{Publisher, PublisherRegistry};
use crate::rate_limiter::RateLimiters;
use crate::types::{PostStatus, ScheduledPost};

/// Outcome counts for one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    db: Database,
    limiters: RateLimiters,
    publishers: RwLock<PublisherRegistry>,
    poll_interval: Duration,
    running: Mutex<Option<RunningLoop>>,
    /// Published posts whose status write failed: post id to external id
    unrecorded: StdMutex<HashMap<String, String>>,
}

impl Scheduler {
    pub fn new(db: Database, limiters: RateLimiters, poll_interval: Duration) -> Self {
        Self {
            db,
            limiters,
            publishers: RwLock::new(PublisherRegistry::new()),
            poll_interval,
            running: Mutex::new(None),
            unrecorded: StdMutex::new(HashMap::new()),
        }
    }

    /// Register the publish dispatcher for its platform
    pub fn register_publisher(&self, publisher: Arc<dyn Publisher>) {
        info!("Registered publisher for {}", publisher.platform());
        self.publishers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(publisher);
    }

    /// Register every publisher in `registry`
    pub fn register_all(&self, registry: &PublisherRegistry) {
        for platform in registry.platforms() {
            if let Ok(publisher) = registry.get(platform) {
                self.register_publisher(publisher);
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start the polling loop. Returns `false` if it was already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Scheduler already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        *running = Some(RunningLoop { shutdown, task });
        true
    }

    /// Stop the loop and wait for an in-flight tick to finish.
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().await.take();
        let Some(running) = running else {
            return false;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            error!("Scheduler loop ended abnormally: {}", e);
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Scheduler starting (poll interval {:?})", self.poll_interval);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let now = chrono::Utc::now().timestamp();
            if let Err(e) = self.tick(now).await {
                error!("Error processing due posts: {}", e);
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = sleep(self.poll_interval) => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// Publish every post due at `now`.
    ///
    /// Fails only if the due posts cannot be read; per-post problems are
    /// recorded on the post and counted in the report. Status writes left
    /// over from earlier ticks are retried first and counted as published.
    pub async fn tick(&self, now: i64) -> Result<TickReport> {
        let recorded = self.record_unrecorded().await;
        let unrecorded: HashSet<String> = self.unrecorded_ids();

        let mut seen = HashSet::new();
        let due: Vec<ScheduledPost> = self
            .db
            .get_due_posts(now)
            .await?
            .into_iter()
            .filter(|post| !unrecorded.contains(&post.id))
            .filter(|post| seen.insert(post.id.clone()))
            .collect();

        if due.is_empty() {
            debug!("No posts due");
            return Ok(TickReport {
                published: recorded,
                ..TickReport::default()
            });
        }

        info!("Found {} post(s) due for publishing", due.len());
        let outcomes = futures::future::join_all(due.iter().map(|post| self.dispatch(post))).await;

        let dispatched = outcomes.iter().filter(|ok| **ok).count();
        let report = TickReport {
            due: due.len(),
            published: dispatched + recorded,
            failed: due.len() - dispatched,
        };
        info!(
            "Tick complete: {} due, {} published, {} failed",
            report.due, report.published, report.failed
        );
        Ok(report)
    }

    fn unrecorded_ids(&self) -> HashSet<String> {
        self.unrecorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Retry the status write for posts published in an earlier tick.
    /// Returns how many were saved as published.
    async fn record_unrecorded(&self) -> usize {
        let pending: Vec<(String, String)> = self
            .unrecorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, external_id)| (id.clone(), external_id.clone()))
            .collect();

        let mut recorded = 0;
        for (id, external_id) in pending {
            match self
                .db
                .update_post_status(&id, PostStatus::Published, Some(&external_id))
                .await
            {
                Ok(updated) => {
                    if updated {
                        info!("Recorded post {} as published ({})", id, external_id);
                        recorded += 1;
                    } else {
                        warn!("Post {} was no longer scheduled when its status was retried", id);
                    }
                    self.unrecorded
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                }
                Err(e) => {
                    warn!("Status of published post {} still cannot be saved: {}", id, e);
                }
            }
        }
        recorded
    }

    /// Publish one post; returns whether it ended up published
    async fn dispatch(&self, post: &ScheduledPost) -> bool {
        debug!("Processing post {} for {}/{}", post.id, post.server_id, post.platform);

        let account = match self.db.get_account(&post.server_id, post.platform).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                let reason = format!(
                    "No {} account connected for server {}",
                    post.platform, post.server_id
                );
                return self.fail(post, &reason).await;
            }
            Err(e) => return self.fail(post, &e.to_string()).await,
        };

        let publisher = self
            .publishers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(post.platform);
        let publisher = match publisher {
            Ok(publisher) => publisher,
            Err(e) => return self.fail(post, &e.to_string()).await,
        };

        self.limiters.for_platform(post.platform).admit().await;

        match publisher.publish(&account, &post.content()).await {
            Ok(external_id) => {
                match self
                    .db
                    .update_post_status(&post.id, PostStatus::Published, Some(&external_id))
                    .await
                {
                    Ok(true) => {
                        info!("Published post {} as {}", post.id, external_id);
                        true
                    }
                    Ok(false) => {
                        warn!(
                            "Post {} was published as {} but was no longer scheduled",
                            post.id, external_id
                        );
                        false
                    }
                    Err(e) => {
                        error!(
                            "Post {} was published as {} but its status could not be saved: {}",
                            post.id, external_id, e
                        );
                        self.unrecorded
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(post.id.clone(), external_id);
                        false
                    }
                }
            }
            Err(e) => self.fail(post, &e.to_string()).await,
        }
    }

    async fn fail(&self, post: &ScheduledPost, reason: &str) -> bool {
        error!("Failed to publish post {}: {}", post.id, reason);
        if let Err(e) = self.db.record_failure(&post.id, reason).await {
            error!("Could not mark post {} failed: {}", post.id, e);
        }
        false
    }
}
