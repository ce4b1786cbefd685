use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use itemboard_core::testing::{item, item_done};
use itemboard_core::{Failure, Item, ItemId};
use itemboard_runtime_config::RecoveryPolicy;
use itemboard_sync::{
    BoardState, ChannelGuard, ChannelKind, ChannelSink, ItemBackend, PushEvent, PushSource,
    RealtimeStatus, SessionError, SessionHandle, SessionOptions, mount,
};

// ── Fakes ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeBackend {
    items: Mutex<Vec<Item>>,
    next_id: AtomicUsize,
    fetch_error: Mutex<Option<String>>,
    mutations_fail: AtomicBool,
    fetches: AtomicUsize,
    creates: AtomicUsize,
}

impl FakeBackend {
    fn with(items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            next_id: AtomicUsize::new(100),
            ..Self::default()
        })
    }

    fn fail_fetch(&self, message: Option<&str>) {
        *self.fetch_error.lock().unwrap() = message.map(str::to_string);
    }

    fn remove(&self, id: &str) {
        self.items.lock().unwrap().retain(|i| i.id.as_str() != id);
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_mutation(&self) -> Result<(), Failure> {
        if self.mutations_fail.load(Ordering::SeqCst) {
            Err(Failure::new("backend down"))
        } else {
            Ok(())
        }
    }
}

impl ItemBackend for FakeBackend {
    async fn fetch_all(&self) -> Result<Vec<Item>, Failure> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fetch_error.lock().unwrap().clone() {
            return Err(Failure::new(message));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn submit_create(&self, title: &str) -> Result<Item, Failure> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let created = item(&id, title);
        self.items.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn submit_update(&self, id: &ItemId, completed: bool) -> Result<Item, Failure> {
        self.check_mutation()?;
        let mut items = self.items.lock().unwrap();
        let found = items
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_else(|| Failure::new("not found"))?;
        found.completed = completed;
        Ok(found.clone())
    }

    async fn submit_delete(&self, id: &ItemId) -> Result<bool, Failure> {
        self.check_mutation()?;
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|i| &i.id != id);
        Ok(items.len() != before)
    }
}

/// Records every sink handed out so tests can drive the channels.
#[derive(Default)]
struct FakePush {
    sinks: Mutex<Vec<ChannelSink>>,
    released: Arc<AtomicUsize>,
}

impl FakePush {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Most recent sink for `kind`.
    fn sink(&self, kind: ChannelKind) -> ChannelSink {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.kind() == kind)
            .cloned()
            .expect("channel was never subscribed")
    }

    fn first_sink(&self, kind: ChannelKind) -> ChannelSink {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.kind() == kind)
            .cloned()
            .expect("channel was never subscribed")
    }

    fn subscriptions(&self) -> HashMap<ChannelKind, usize> {
        let mut counts = HashMap::new();
        for sink in self.sinks.lock().unwrap().iter() {
            *counts.entry(sink.kind()).or_insert(0) += 1;
        }
        counts
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl PushSource for FakePush {
    fn subscribe(&self, kind: ChannelKind, sink: ChannelSink) -> ChannelGuard {
        assert_eq!(sink.kind(), kind);
        self.sinks.lock().unwrap().push(sink);
        let released = Arc::clone(&self.released);
        ChannelGuard::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

struct Mounted {
    backend: Arc<FakeBackend>,
    push: Arc<FakePush>,
    handle: SessionHandle<FakeBackend>,
    board: watch::Receiver<BoardState>,
}

async fn mounted_with(items: Vec<Item>, options: SessionOptions) -> Mounted {
    let backend = FakeBackend::with(items);
    let push = FakePush::new();
    let handle = mount(Arc::clone(&backend), Arc::clone(&push), options);
    let mut board = handle.subscribe();
    board.wait_for(|s| !s.loading).await.unwrap();
    Mounted {
        backend,
        push,
        handle,
        board,
    }
}

async fn mounted(items: Vec<Item>) -> Mounted {
    mounted_with(items, SessionOptions::default()).await
}

async fn wait_until(board: &mut watch::Receiver<BoardState>, f: impl FnMut(&BoardState) -> bool) -> BoardState {
    board.wait_for(f).await.unwrap().clone()
}

/// Paused-clock timers fire on millisecond ticks.
fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

fn ids(state: &BoardState) -> Vec<&str> {
    state.items.iter().map(|i| i.id.as_str()).collect()
}

// ── Loading ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn mount_loads_snapshot_and_opens_three_channels() {
    let m = mounted(vec![item("1", "A"), item("2", "B")]).await;

    let state = m.handle.board();
    assert_eq!(ids(&state), ["1", "2"]);
    assert_eq!(state.error, None);
    assert_eq!(state.realtime, RealtimeStatus::Connected);

    let subs = m.push.subscriptions();
    for kind in ChannelKind::ALL {
        assert_eq!(subs.get(&kind), Some(&1));
    }
    assert_eq!(m.backend.fetches(), 1);
}

#[tokio::test]
async fn failed_load_then_successful_reload() {
    let backend = FakeBackend::with(vec![item("1", "A")]);
    backend.fail_fetch(Some("network error"));
    let push = FakePush::new();
    let handle = mount(Arc::clone(&backend), push, SessionOptions::default());
    let mut board = handle.subscribe();

    let state = wait_until(&mut board, |s| !s.loading).await;
    assert_eq!(state.error.as_deref(), Some("network error"));
    assert!(state.items.is_empty());

    backend.fail_fetch(None);
    handle.reload().unwrap();
    let state = wait_until(&mut board, |s| !s.loading && s.items.len() == 1).await;
    assert_eq!(state.error, None);
    assert_eq!(ids(&state), ["1"]);
}

#[tokio::test]
async fn background_load_failure_keeps_the_list() {
    let mut m = mounted(vec![item("1", "A")]).await;

    m.backend.fail_fetch(Some("timeout"));
    m.handle.reload().unwrap();
    let state = wait_until(&mut m.board, |s| s.error.is_some()).await;
    assert_eq!(state.error.as_deref(), Some("timeout"));
    assert_eq!(ids(&state), ["1"]);
    assert!(!state.loading);
}

#[tokio::test]
async fn reload_replaces_the_list_with_the_snapshot() {
    let mut m = mounted(vec![item("1", "A"), item("2", "B")]).await;

    m.backend.remove("1");
    m.handle.reload().unwrap();
    let state = wait_until(&mut m.board, |s| !s.loading && s.items.len() == 1).await;
    assert_eq!(ids(&state), ["2"]);
}

// ── Local mutations ─────────────────────────────────────────────────────

#[tokio::test]
async fn created_item_and_its_echo_appear_once() {
    let mut m = mounted(vec![]).await;

    let created = m.handle.create_item("  Milk  ").await.unwrap();
    assert_eq!(created.title, "Milk");
    wait_until(&mut m.board, |s| s.items.len() == 1).await;

    let sink = m.push.sink(ChannelKind::Created);
    assert!(sink.push(PushEvent::Created(created.clone())));
    assert!(sink.push(PushEvent::Created(item("x", "Eggs"))));

    let state = wait_until(&mut m.board, |s| s.items.len() >= 2).await;
    assert_eq!(ids(&state), [created.id.as_str(), "x"]);
}

#[tokio::test]
async fn blank_title_is_rejected_without_a_request() {
    let m = mounted(vec![]).await;

    let err = m.handle.create_item("   ").await.unwrap_err();
    assert!(matches!(err, SessionError::EmptyTitle));
    assert_eq!(m.backend.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn toggle_flips_the_current_flag() {
    let mut m = mounted(vec![item("1", "A")]).await;

    let updated = m.handle.toggle_item(&ItemId::from("1")).await.unwrap();
    assert!(updated.completed);
    let state = wait_until(&mut m.board, |s| s.items.completed_count() == 1).await;
    assert_eq!(ids(&state), ["1"]);

    m.handle.toggle_item(&ItemId::from("1")).await.unwrap();
    wait_until(&mut m.board, |s| s.items.completed_count() == 0).await;

    let err = m.handle.toggle_item(&ItemId::from("nope")).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownItem(id) if id.as_str() == "nope"));
}

#[tokio::test]
async fn delete_removes_locally() {
    let mut m = mounted(vec![item("1", "A"), item("2", "B")]).await;

    assert!(m.handle.delete_item(&ItemId::from("1")).await.unwrap());
    let state = wait_until(&mut m.board, |s| s.items.len() == 1).await;
    assert_eq!(ids(&state), ["2"]);
}

#[tokio::test]
async fn mutation_failure_leaves_list_and_sets_error() {
    let mut m = mounted(vec![item("1", "A")]).await;
    m.backend.mutations_fail.store(true, Ordering::SeqCst);

    let err = m.handle.create_item("B").await.unwrap_err();
    assert!(matches!(err, SessionError::Mutation { action: "create", .. }));
    let state = wait_until(&mut m.board, |s| s.error.is_some()).await;
    assert_eq!(state.error.as_deref(), Some("backend down"));
    assert_eq!(ids(&state), ["1"]);

    // the next action clears the error
    m.backend.mutations_fail.store(false, Ordering::SeqCst);
    m.handle.create_item("B").await.unwrap();
    let state = wait_until(&mut m.board, |s| s.items.len() == 2).await;
    assert_eq!(state.error, None);
}

// ── Pushes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn pushes_follow_the_merge_rules() {
    let mut m = mounted(vec![item("1", "A")]).await;

    m.push
        .sink(ChannelKind::Created)
        .push(PushEvent::Created(item("2", "B")));
    let state = wait_until(&mut m.board, |s| s.items.len() == 2).await;
    assert_eq!(ids(&state), ["1", "2"]);

    m.push
        .sink(ChannelKind::Updated)
        .push(PushEvent::Updated(item_done("1", "A")));
    let state = wait_until(&mut m.board, |s| s.items.completed_count() == 1).await;
    assert_eq!(ids(&state), ["1", "2"]);
    assert!(state.items.get(&ItemId::from("1")).unwrap().completed);

    let deletes = m.push.sink(ChannelKind::Deleted);
    deletes.push(PushEvent::Deleted(Some(ItemId::from("2"))));
    let state = wait_until(&mut m.board, |s| s.items.len() == 1).await;
    assert_eq!(ids(&state), ["1"]);

    deletes.push(PushEvent::Deleted(Some(ItemId::from("2"))));
    m.push
        .sink(ChannelKind::Updated)
        .push(PushEvent::Updated(item("7", "unknown")));
    m.push
        .sink(ChannelKind::Created)
        .push(PushEvent::Created(item("3", "C")));
    let state = wait_until(&mut m.board, |s| s.items.len() == 2).await;
    assert_eq!(ids(&state), ["1", "3"]);
    assert_eq!(m.backend.fetches(), 1);
}

#[tokio::test]
async fn opaque_delete_push_triggers_reload() {
    let mut m = mounted(vec![item("1", "A"), item("2", "B")]).await;

    m.backend.remove("2");
    m.push
        .sink(ChannelKind::Deleted)
        .push(PushEvent::Deleted(None));
    let state = wait_until(&mut m.board, |s| !s.loading && s.items.len() == 1).await;
    assert_eq!(ids(&state), ["1"]);
    assert_eq!(m.backend.fetches(), 2);
}

// ── Channel failure and recovery ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn channel_failure_recovers_after_exactly_the_delay() {
    let mut m = mounted(vec![item("1", "A")]).await;

    let failed_at = Instant::now();
    m.push.sink(ChannelKind::Updated).fail("socket closed");
    let state = wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;
    assert_eq!(state.error, None);

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(m.handle.board().realtime, RealtimeStatus::Disconnected);
    assert_eq!(m.backend.fetches(), 1);

    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Connected).await;
    assert_elapsed(failed_at, Duration::from_secs(5));
    wait_until(&mut m.board, |s| !s.loading).await;
    assert_eq!(m.backend.fetches(), 2);

    // the failed channel was replaced, the others left alone
    let subs = m.push.subscriptions();
    assert_eq!(subs[&ChannelKind::Updated], 2);
    assert_eq!(subs[&ChannelKind::Created], 1);
    assert_eq!(subs[&ChannelKind::Deleted], 1);
    assert_eq!(m.push.released(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(m.backend.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn resync_only_keeps_the_failed_channel() {
    let options = SessionOptions {
        recovery: RecoveryPolicy::ResyncOnly,
        ..SessionOptions::default()
    };
    let mut m = mounted_with(vec![item("1", "A")], options).await;

    m.push.sink(ChannelKind::Created).fail("socket closed");
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Connected).await;
    wait_until(&mut m.board, |s| !s.loading).await;

    assert_eq!(m.backend.fetches(), 2);
    assert_eq!(m.push.subscriptions()[&ChannelKind::Created], 1);
    assert_eq!(m.push.released(), 0);
}

#[tokio::test(start_paused = true)]
async fn another_failure_restarts_the_countdown() {
    let mut m = mounted(vec![item("1", "A")]).await;

    let first = Instant::now();
    m.push.sink(ChannelKind::Created).fail("first");
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    m.push.sink(ChannelKind::Updated).fail("second");

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(m.handle.board().realtime, RealtimeStatus::Disconnected);
    assert_eq!(m.backend.fetches(), 1);

    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Connected).await;
    assert_elapsed(first, Duration::from_secs(8));
    wait_until(&mut m.board, |s| !s.loading).await;
    assert_eq!(m.backend.fetches(), 2);
    assert_eq!(m.push.released(), 2);
}

#[tokio::test]
async fn huge_recovery_delay_keeps_the_session_alive() {
    let options = SessionOptions {
        recovery_delay: Duration::from_secs(u64::MAX),
        ..SessionOptions::default()
    };
    let mut m = mounted_with(vec![item("1", "A")], options).await;

    m.push.sink(ChannelKind::Created).fail("socket closed");
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;

    let created = m.handle.create_item("B").await.unwrap();
    let state = wait_until(&mut m.board, |s| s.items.len() == 2).await;
    assert_eq!(ids(&state), ["1", created.id.as_str()]);
    assert_eq!(state.realtime, RealtimeStatus::Disconnected);
    m.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn released_channel_is_ignored() {
    let mut m = mounted(vec![]).await;

    let old = m.push.first_sink(ChannelKind::Created);
    old.fail("socket closed");
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Connected).await;
    wait_until(&mut m.board, |s| !s.loading).await;

    old.push(PushEvent::Created(item("ghost", "from the old channel")));
    old.fail("late error");
    m.push
        .sink(ChannelKind::Created)
        .push(PushEvent::Created(item("1", "A")));

    let state = wait_until(&mut m.board, |s| !s.items.is_empty()).await;
    assert_eq!(ids(&state), ["1"]);
    assert_eq!(state.realtime, RealtimeStatus::Connected);
}

#[tokio::test]
async fn channel_failure_is_not_a_user_error() {
    let mut m = mounted(vec![item("1", "A")]).await;

    m.push.sink(ChannelKind::Deleted).fail("socket closed");
    let state = wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;
    assert_eq!(state.error, None);
    assert_eq!(ids(&state), ["1"]);
    assert_eq!(state.status_caption(), "Reconnecting...");
}

// ── Teardown ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unmount_releases_channels_and_cancels_recovery() {
    let mut m = mounted(vec![item("1", "A")]).await;

    let sink = m.push.sink(ChannelKind::Created);
    sink.fail("socket closed");
    wait_until(&mut m.board, |s| s.realtime == RealtimeStatus::Disconnected).await;

    let push = Arc::clone(&m.push);
    let backend = Arc::clone(&m.backend);
    let board = m.board.clone();
    m.handle.unmount().await;

    assert_eq!(push.released(), 3);
    assert!(sink.is_closed());
    assert!(!sink.push(PushEvent::Created(item("2", "B"))));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.fetches(), 1);
    assert_eq!(board.borrow().realtime, RealtimeStatus::Disconnected);
}

#[tokio::test]
async fn board_closes_after_unmount() {
    let backend = FakeBackend::with(vec![]);
    let handle = mount(Arc::clone(&backend), FakePush::new(), SessionOptions::default());
    let mut board = handle.subscribe();
    board.wait_for(|s| !s.loading).await.unwrap();

    handle.unmount().await;
    assert!(board.has_changed().is_err());
}
