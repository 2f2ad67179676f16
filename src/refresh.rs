//! Periodic feed refresh with stale-result protection.
//!
//! `DashboardState` is the single container the renderers read from. It is
//! only mutated through the transitions below, and every transition that
//! follows an await point carries the generation it was started under:
//! once `begin` or `retire` has moved the generation on, a late result is
//! dropped without touching the state.
//!
//! The server keeps one loop per time window in a [`RefreshPool`], so pages
//! showing different windows never reschedule each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{FeedSource, TimeWindow};
use crate::errors::QuakeviewError;
use crate::models::Feature;

/// Default time between refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Capacity of the refresh notification channel.
const NOTIFY_CAPACITY: usize = 16;

/// Sent after every applied fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refreshed {
    pub window: TimeWindow,
    pub generation: u64,
}

/// Whether a fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
}

/// Everything the dashboard renders from.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    /// Window the current generation fetches
    pub window: TimeWindow,
    /// Last successfully fetched record set
    pub records: Vec<Feature>,
    /// User-facing message from the last failed fetch
    pub error: Option<String>,
    pub phase: Phase,
    /// Bumped on every start and teardown
    pub generation: u64,
    /// When `records` was last replaced
    pub last_updated: Option<DateTime<Utc>>,
}

impl DashboardState {
    /// Start a new generation for `window` and enter Fetching.
    ///
    /// Records and error are kept so the previous view stays visible.
    pub fn begin(&mut self, window: TimeWindow) -> u64 {
        self.generation += 1;
        self.window = window;
        self.phase = Phase::Fetching;
        self.generation
    }

    /// Re-enter Fetching for a timer tick. Returns `false` if stale.
    pub fn mark_fetching(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.phase = Phase::Fetching;
        true
    }

    /// Apply a fetch result. Returns `false` (and changes nothing) if stale.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<Vec<Feature>, QuakeviewError>,
    ) -> bool {
        if generation != self.generation {
            return false;
        }

        match result {
            Ok(records) => {
                self.records = records;
                self.error = None;
                self.last_updated = Some(Utc::now());
            }
            Err(e) => {
                self.error = Some(e.user_message().to_string());
            }
        }
        self.phase = Phase::Idle;
        true
    }

    /// Tear down: invalidate any in-flight fetch and go Idle.
    pub fn retire(&mut self) {
        self.generation += 1;
        self.phase = Phase::Idle;
    }

    /// True while the first fetch is outstanding and nothing is on screen.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Fetching && self.records.is_empty()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Feature> {
        self.records.iter().find(|e| e.id == id)
    }
}

/// Polls a [`FeedSource`] for the active window.
pub struct RefreshLoop<S: FeedSource> {
    source: Arc<S>,
    state: Arc<Mutex<DashboardState>>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    notify: broadcast::Sender<Refreshed>,
}

impl<S: FeedSource> RefreshLoop<S> {
    /// Create an idle loop. Nothing is fetched until [`start`](Self::start).
    pub fn new(source: Arc<S>, interval: Duration, notify: broadcast::Sender<Refreshed>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(DashboardState::default())),
            interval,
            task: Mutex::new(None),
            notify,
        }
    }

    /// Fetch `window` now and then every interval, replacing any
    /// previous schedule.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, window: TimeWindow) {
        let mut task = lock(&self.task);
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let generation = lock(&self.state).begin(window);
        info!("refreshing {window} feed every {}s", self.interval.as_secs());

        *task = Some(tokio::spawn(poll_feed(
            Arc::clone(&self.source),
            Arc::clone(&self.state),
            self.notify.clone(),
            window,
            generation,
            self.interval,
        )));
    }

    /// Start `window` unless it is already being polled.
    ///
    /// Returns `true` if a new schedule was started.
    pub fn switch_window(&self, window: TimeWindow) -> bool {
        let running = lock(&self.task).as_ref().is_some_and(|t| !t.is_finished());
        if running && lock(&self.state).window == window {
            return false;
        }
        self.start(window);
        true
    }

    /// Cancel the schedule; results still in flight are discarded.
    pub fn stop(&self) {
        lock(&self.state).retire();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            debug!("refresh task stopped");
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DashboardState {
        lock(&self.state).clone()
    }

    /// Clone of the record with `id`, if the current set has it.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Feature> {
        lock(&self.state).find(id).cloned()
    }
}

impl<S: FeedSource> Drop for RefreshLoop<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_feed<S: FeedSource>(
    source: Arc<S>,
    state: Arc<Mutex<DashboardState>>,
    notify: broadcast::Sender<Refreshed>,
    window: TimeWindow,
    generation: u64,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !lock(&state).mark_fetching(generation) {
            break;
        }

        let result = source.fetch(window).await.map(|feed| feed.features);
        if let Err(e) = &result {
            warn!("{window} feed fetch failed, will retry: {e}");
        }

        let count = result.as_ref().map_or(0, Vec::len);
        if !lock(&state).complete(generation, result) {
            debug!("discarding stale {window} result (generation {generation})");
            break;
        }

        debug!("{window} feed refreshed with {count} events");
        // No subscribers is fine
        let _ = notify.send(Refreshed { window, generation });
    }
}

/// One [`RefreshLoop`] per time window, each started on first use.
pub struct RefreshPool<S: FeedSource> {
    source: Arc<S>,
    interval: Duration,
    loops: Mutex<HashMap<TimeWindow, RefreshLoop<S>>>,
    notify: broadcast::Sender<Refreshed>,
}

impl<S: FeedSource> RefreshPool<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        let (notify, _rx) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            source: Arc::new(source),
            interval,
            loops: Mutex::new(HashMap::new()),
            notify,
        }
    }

    /// Make sure `window` is being polled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ensure(&self, window: TimeWindow) {
        self.with_loop(window, |_| ());
    }

    /// Copy of `window`'s state, starting its loop if needed.
    #[must_use]
    pub fn snapshot(&self, window: TimeWindow) -> DashboardState {
        self.with_loop(window, RefreshLoop::snapshot)
    }

    /// Look up a record by id in any window's current set.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<Feature> {
        lock(&self.loops).values().find_map(|refresh| refresh.find(id))
    }

    /// Receive every applied fetch, from all windows.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Refreshed> {
        self.notify.subscribe()
    }

    /// Stop every loop; results still in flight are discarded.
    pub fn stop(&self) {
        for refresh in lock(&self.loops).values() {
            refresh.stop();
        }
    }

    fn with_loop<T>(&self, window: TimeWindow, f: impl FnOnce(&RefreshLoop<S>) -> T) -> T {
        let mut loops = lock(&self.loops);
        let refresh = loops.entry(window).or_insert_with(|| {
            debug!("creating {window} refresh loop");
            RefreshLoop::new(Arc::clone(&self.source), self.interval, self.notify.clone())
        });
        // Restarts only a loop that is not running
        refresh.switch_window(window);
        f(refresh)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;

    use super::*;
    use crate::errors::FETCH_FAILURE_MESSAGE;
    use crate::models::{test_feature, FeatureCollection};

    /// Replays queued responses, each after an optional delay.
    struct ScriptedSource {
        responses: Mutex<VecDeque<(Duration, Result<Vec<Feature>, String>)>>,
        calls: Mutex<Vec<TimeWindow>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<(Duration, Result<Vec<Feature>, String>)>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FeedSource for ScriptedSource {
        fn fetch(
            &self,
            window: TimeWindow,
        ) -> impl Future<Output = Result<FeatureCollection, QuakeviewError>> + Send {
            lock(&self.calls).push(window);
            let next = lock(&self.responses).pop_front();
            async move {
                let (delay, result) =
                    next.unwrap_or((Duration::ZERO, Err("script exhausted".into())));
                tokio::time::sleep(delay).await;
                result
                    .map(|features| FeatureCollection {
                        type_: "FeatureCollection".into(),
                        metadata: None,
                        features,
                    })
                    .map_err(QuakeviewError::InvalidResponse)
            }
        }
    }

    fn refresh_loop(
        source: ScriptedSource,
    ) -> (RefreshLoop<ScriptedSource>, broadcast::Receiver<Refreshed>) {
        let (notify, updates) = broadcast::channel(NOTIFY_CAPACITY);
        let refresh = RefreshLoop::new(Arc::new(source), DEFAULT_REFRESH_INTERVAL, notify);
        (refresh, updates)
    }

    fn quakes() -> Vec<Feature> {
        vec![
            test_feature("1", Some(6.2), "Tokyo"),
            test_feature("2", Some(3.1), "Reno"),
        ]
    }

    #[test]
    fn test_complete_ignores_stale_generation() {
        let mut state = DashboardState::default();
        let old = state.begin(TimeWindow::Hour);
        let current = state.begin(TimeWindow::Week);
        assert_ne!(old, current);

        assert!(!state.complete(old, Ok(quakes())));
        assert!(state.records.is_empty());
        assert_eq!(state.phase, Phase::Fetching);
        assert_eq!(state.window, TimeWindow::Week);

        assert!(state.complete(current, Ok(quakes())));
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.last_updated.is_some());
    }

    #[test]
    fn test_failure_keeps_records_and_success_clears_error() {
        let mut state = DashboardState::default();
        let generation = state.begin(TimeWindow::Day);
        assert!(state.complete(generation, Ok(quakes())));

        assert!(state.mark_fetching(generation));
        assert!(state.complete(
            generation,
            Err(QuakeviewError::InvalidResponse("boom".into()))
        ));
        assert_eq!(state.error.as_deref(), Some(FETCH_FAILURE_MESSAGE));
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.phase, Phase::Idle);

        assert!(state.mark_fetching(generation));
        assert!(state.complete(generation, Ok(vec![test_feature("3", Some(1.0), "Lima")])));
        assert!(state.error.is_none());
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn test_retire_invalidates_in_flight() {
        let mut state = DashboardState::default();
        let generation = state.begin(TimeWindow::Day);
        state.retire();
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.mark_fetching(generation));
        assert!(!state.complete(generation, Ok(quakes())));
        assert!(state.records.is_empty());
    }

    #[test]
    fn test_is_loading_only_without_records() {
        let mut state = DashboardState::default();
        let generation = state.begin(TimeWindow::Day);
        assert!(state.is_loading());
        state.complete(generation, Ok(quakes()));
        state.mark_fetching(generation);
        assert!(!state.is_loading());
        assert_eq!(state.find("2").map(Feature::place), Some("Reno"));
        assert!(state.find("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_every_interval() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(quakes())),
            (Duration::ZERO, Ok(vec![test_feature("9", Some(5.0), "Lima")])),
        ]);
        let (refresh, mut updates) = refresh_loop(source);

        refresh.start(TimeWindow::Hour);
        let first = updates.recv().await.unwrap();
        let state = refresh.snapshot();
        assert_eq!(first.window, TimeWindow::Hour);
        assert_eq!(state.generation, first.generation);
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.phase, Phase::Idle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(lock(&refresh.source.calls).len(), 1);

        updates.recv().await.unwrap();
        assert_eq!(refresh.snapshot().records[0].id, "9");
        assert_eq!(*lock(&refresh.source.calls), vec![TimeWindow::Hour; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_records() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(quakes())),
            (Duration::ZERO, Err("503".into())),
        ]);
        let (refresh, mut updates) = refresh_loop(source);

        refresh.start(TimeWindow::Day);
        updates.recv().await.unwrap();
        updates.recv().await.unwrap();

        let state = refresh.snapshot();
        assert_eq!(state.error.as_deref(), Some(FETCH_FAILURE_MESSAGE));
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_fetch_discards_late_result() {
        let source = ScriptedSource::new(vec![(Duration::from_secs(5), Ok(quakes()))]);
        let (refresh, _updates) = refresh_loop(source);

        refresh.start(TimeWindow::Week);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(refresh.snapshot().phase, Phase::Fetching);

        refresh.stop();
        let before = refresh.snapshot();
        tokio::time::sleep(Duration::from_secs(120)).await;
        let after = refresh.snapshot();

        assert!(after.records.is_empty());
        assert_eq!(after.phase, Phase::Idle);
        assert_eq!(after.generation, before.generation);
        assert!(after.last_updated.is_none());
        assert_eq!(lock(&refresh.source.calls).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_switch_supersedes_slow_fetch() {
        let slow_hour: Vec<Feature> = vec![test_feature("h", Some(2.0), "Hour")];
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(10), Ok(slow_hour)),
            (Duration::ZERO, Ok(quakes())),
        ]);
        let (refresh, mut updates) = refresh_loop(source);

        refresh.start(TimeWindow::Hour);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(refresh.switch_window(TimeWindow::Week));

        updates.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        let state = refresh.snapshot();
        assert_eq!(state.window, TimeWindow::Week);
        assert_eq!(state.records.len(), 2);
        assert!(state.find("h").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_same_window_is_noop() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(quakes()))]);
        let (refresh, _updates) = refresh_loop(source);

        assert!(refresh.switch_window(TimeWindow::Day));
        let generation = refresh.snapshot().generation;
        assert!(!refresh.switch_window(TimeWindow::Day));
        assert_eq!(refresh.snapshot().generation, generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_windows_poll_independently() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(quakes())),
            (Duration::ZERO, Ok(vec![test_feature("h", Some(2.0), "Hour")])),
        ]);
        let pool = RefreshPool::new(source, DEFAULT_REFRESH_INTERVAL);
        let mut updates = pool.subscribe();

        pool.ensure(TimeWindow::Day);
        assert_eq!(updates.recv().await.unwrap().window, TimeWindow::Day);
        pool.ensure(TimeWindow::Hour);
        assert_eq!(updates.recv().await.unwrap().window, TimeWindow::Hour);

        let day = pool.snapshot(TimeWindow::Day);
        let hour = pool.snapshot(TimeWindow::Hour);
        assert_eq!(day.window, TimeWindow::Day);
        assert_eq!(day.records.len(), 2);
        assert_eq!(hour.window, TimeWindow::Hour);
        assert_eq!(hour.records[0].id, "h");

        // Reading either window again must not restart the other
        for _ in 0..10 {
            assert_eq!(pool.snapshot(TimeWindow::Hour).generation, hour.generation);
            assert_eq!(pool.snapshot(TimeWindow::Day).generation, day.generation);
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            *lock(&pool.source.calls),
            vec![TimeWindow::Day, TimeWindow::Hour]
        );

        assert_eq!(pool.find("h").map(|e| e.id), Some("h".to_string()));
        assert!(pool.find("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_stop_retires_every_window() {
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(5), Ok(quakes())),
            (Duration::from_secs(5), Ok(quakes())),
        ]);
        let pool = RefreshPool::new(source, DEFAULT_REFRESH_INTERVAL);
        pool.ensure(TimeWindow::Day);
        pool.ensure(TimeWindow::Week);
        tokio::time::sleep(Duration::from_secs(1)).await;

        pool.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;

        for refresh in lock(&pool.loops).values() {
            let state = refresh.snapshot();
            assert!(state.records.is_empty());
            assert_eq!(state.phase, Phase::Idle);
        }
        assert_eq!(lock(&pool.source.calls).len(), 2);
    }
}
