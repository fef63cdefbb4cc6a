//! End-to-end behaviour of the relay core: fan-out, buffering, draining and
//! bridging, wired together the way the server wires them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use roomcast_relay::{
    ConnectionHub, ConnectionId, DurableQueue, EventRouter, FlushWorker, LocalBridge,
    MemoryQueue, Message, MessageStore, RelayError, RelayResult, RoomRegistry, RouterConfig,
    ServerEvent, DEFAULT_FLUSH_INTERVAL,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Storage double recording every persist call.
#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<Message>>,
    reject_text: Option<String>,
}

impl RecordingStore {
    fn rejecting(text: &str) -> Self {
        Self {
            calls: Mutex::default(),
            reject_text: Some(text.to_string()),
        }
    }

    fn calls(&self) -> Vec<Message> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn persist(&self, message: &Message) -> RelayResult<()> {
        self.calls.lock().unwrap().push(message.clone());
        match &self.reject_text {
            Some(text) if *text == message.text => Err(RelayError::persistence("rejected by store")),
            _ => Ok(()),
        }
    }
}

/// Storage double that appends to the queue while a drain is in progress.
struct AppendingStore {
    queue: Arc<MemoryQueue>,
    late_entry: String,
    appended: Mutex<bool>,
}

#[async_trait]
impl MessageStore for AppendingStore {
    async fn persist(&self, _message: &Message) -> RelayResult<()> {
        let first = {
            let mut appended = self.appended.lock().unwrap();
            !std::mem::replace(&mut *appended, true)
        };
        if first {
            self.queue.append(&self.late_entry).await?;
        }
        Ok(())
    }
}

/// Storage double for a worker that gets overtaken: during its first persist
/// another worker runs a full cycle on the same queue, then a client appends.
struct OvertakenStore {
    rival: FlushWorker,
    queue: Arc<MemoryQueue>,
    late_entry: String,
    texts: Mutex<Vec<String>>,
}

impl OvertakenStore {
    fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for OvertakenStore {
    async fn persist(&self, message: &Message) -> RelayResult<()> {
        let first = self.texts.lock().unwrap().is_empty();
        if first {
            self.rival.drain_once().await?;
            self.queue.append(&self.late_entry).await?;
        }
        self.texts.lock().unwrap().push(message.text.clone());
        Ok(())
    }
}

fn message(room: &str, text: &str) -> Message {
    Message::new(room, text, "u-1", "Ada", "https://example.com/ada.png").unwrap()
}

fn router(queue: Arc<MemoryQueue>, bridge: LocalBridge, instance_id: &str) -> EventRouter {
    EventRouter::new(
        RoomRegistry::new(),
        ConnectionHub::default(),
        queue,
        Arc::new(bridge),
        RouterConfig {
            channel: "MESSAGES".into(),
            instance_id: instance_id.into(),
        },
    )
}

async fn connect(router: &EventRouter, id: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
    let connection = ConnectionId::from(id);
    let rx = router.hub().register(connection.clone()).await;
    (connection, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> Option<ServerEvent> {
    timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

async fn assert_silent(rx: &mut mpsc::Receiver<ServerEvent>) {
    let event = timeout(Duration::from_millis(200), rx.recv()).await.ok().flatten();
    assert!(event.is_none(), "unexpected event {event:?}");
}

#[tokio::test]
async fn drain_persists_single_entry_and_empties_queue() {
    let queue = Arc::new(MemoryQueue::new());
    queue.append(&message("Q1", "hi").to_entry().unwrap()).await.unwrap();
    let store = Arc::new(RecordingStore::default());

    let report = FlushWorker::new(queue.clone(), store.clone(), DEFAULT_FLUSH_INTERVAL)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(report.persisted, 1);
    assert_eq!(store.calls(), vec![message("Q1", "hi")]);
    assert!(queue.is_empty().await.unwrap());
    assert!(queue.quarantined().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_entry_is_quarantined_without_persist_call() {
    let queue = Arc::new(MemoryQueue::new());
    queue.append(&message("Q1", "hi").to_entry().unwrap()).await.unwrap();
    queue.append("{\"roomId\": \"Q1\", \"text\":").await.unwrap();
    let store = Arc::new(RecordingStore::default());

    let report = FlushWorker::new(queue.clone(), store.clone(), DEFAULT_FLUSH_INTERVAL)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(report.quarantined, 1);
    assert_eq!(store.calls().len(), 1);
    assert!(queue.is_empty().await.unwrap());
    assert_eq!(
        queue.quarantined().await.unwrap(),
        vec!["{\"roomId\": \"Q1\", \"text\":".to_string()]
    );
}

#[tokio::test]
async fn poison_entry_does_not_stop_the_rest_of_the_batch() {
    let queue = Arc::new(MemoryQueue::new());
    queue.append("garbage").await.unwrap();
    queue.append(&message("Q1", "after").to_entry().unwrap()).await.unwrap();
    queue.append(&message("Q2", "later").to_entry().unwrap()).await.unwrap();
    let store = Arc::new(RecordingStore::default());

    FlushWorker::new(queue.clone(), store.clone(), DEFAULT_FLUSH_INTERVAL)
        .drain_once()
        .await
        .unwrap();

    let texts: Vec<String> = store.calls().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["after", "later"]);
}

#[tokio::test]
async fn every_failure_is_quarantined_exactly_once() {
    let queue = Arc::new(MemoryQueue::new());
    let rejected = message("Q1", "reject me").to_entry().unwrap();
    queue.append(&rejected).await.unwrap();
    queue.append("not json").await.unwrap();
    queue.append(&message("Q1", "ok").to_entry().unwrap()).await.unwrap();
    let store = Arc::new(RecordingStore::rejecting("reject me"));
    let worker = FlushWorker::new(queue.clone(), store, DEFAULT_FLUSH_INTERVAL);

    worker.drain_once().await.unwrap();
    worker.drain_once().await.unwrap();

    assert_eq!(
        queue.quarantined().await.unwrap(),
        vec![rejected, "not json".to_string()]
    );
}

#[tokio::test]
async fn entries_appended_during_drain_survive_the_trim() {
    let queue = Arc::new(MemoryQueue::new());
    queue.append(&message("Q1", "first").to_entry().unwrap()).await.unwrap();
    queue.append(&message("Q1", "second").to_entry().unwrap()).await.unwrap();
    let late = message("Q1", "late").to_entry().unwrap();
    let store = Arc::new(AppendingStore {
        queue: queue.clone(),
        late_entry: late.clone(),
        appended: Mutex::new(false),
    });

    let report = FlushWorker::new(queue.clone(), store, DEFAULT_FLUSH_INTERVAL)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(report.trimmed, 2);
    assert_eq!(queue.peek_all().await.unwrap(), vec![late]);
}

#[tokio::test]
async fn overtaken_worker_leaves_entries_appended_after_the_rival_trim() {
    let queue = Arc::new(MemoryQueue::new());
    queue.append(&message("Q1", "a").to_entry().unwrap()).await.unwrap();
    queue.append(&message("Q1", "b").to_entry().unwrap()).await.unwrap();
    let late = message("Q1", "late").to_entry().unwrap();

    let rival_store = Arc::new(RecordingStore::default());
    let rival = FlushWorker::new(queue.clone(), rival_store.clone(), DEFAULT_FLUSH_INTERVAL);
    let store = Arc::new(OvertakenStore {
        rival: rival.clone(),
        queue: queue.clone(),
        late_entry: late.clone(),
        texts: Mutex::default(),
    });

    let report = FlushWorker::new(queue.clone(), store.clone(), DEFAULT_FLUSH_INTERVAL)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(report.persisted, 2);
    assert_eq!(report.trimmed, 0);
    assert_eq!(store.texts(), vec!["a", "b"]);
    assert_eq!(rival_store.calls(), vec![message("Q1", "a"), message("Q1", "b")]);
    assert_eq!(queue.peek_all().await.unwrap(), vec![late]);

    let report = rival.drain_once().await.unwrap();
    assert_eq!(report.trimmed, 1);
    assert_eq!(rival_store.calls().last(), Some(&message("Q1", "late")));
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn room_fan_out_reaches_members_only() {
    let queue = Arc::new(MemoryQueue::new());
    let router = router(queue, LocalBridge::default(), "node-a");
    let (a, mut a_rx) = connect(&router, "a").await;
    let (b, mut b_rx) = connect(&router, "b").await;
    let (c, mut c_rx) = connect(&router, "c").await;
    router.handle_join(&a, "Q1").await.unwrap();
    router.handle_join(&c, "Q2").await.unwrap();

    router.handle_client_message(&b, message("Q1", "hi")).await.unwrap();

    assert_eq!(
        a_rx.try_recv().ok(),
        Some(ServerEvent::Message { payload: message("Q1", "hi") })
    );
    assert!(b_rx.try_recv().is_err());
    assert!(c_rx.try_recv().is_err());
}

#[tokio::test]
async fn sender_is_excluded_from_its_own_fan_out() {
    let queue = Arc::new(MemoryQueue::new());
    let router = router(queue.clone(), LocalBridge::default(), "node-a");
    let _listener = router.listen_bridge().await.unwrap();
    let (a, mut a_rx) = connect(&router, "a").await;
    let (b, mut b_rx) = connect(&router, "b").await;
    router.handle_join(&a, "Q1").await.unwrap();
    router.handle_join(&b, "Q1").await.unwrap();

    let delivered = router.handle_client_message(&a, message("Q1", "hi")).await.unwrap();
    router.settle().await;

    assert_eq!(delivered, 1);
    assert!(matches!(next_event(&mut b_rx).await, Some(ServerEvent::Message { .. })));
    assert_silent(&mut a_rx).await;
    assert_silent(&mut b_rx).await;
    assert_eq!(queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn bridge_delivers_to_rooms_on_other_instances() {
    let bus = LocalBridge::default();
    let node_a = router(Arc::new(MemoryQueue::new()), bus.clone(), "node-a");
    let node_b = router(Arc::new(MemoryQueue::new()), bus.clone(), "node-b");
    let _listen_a = node_a.listen_bridge().await.unwrap();
    let _listen_b = node_b.listen_bridge().await.unwrap();

    let (sender, mut sender_rx) = connect(&node_a, "sender").await;
    let (remote, mut remote_rx) = connect(&node_b, "remote").await;
    let (elsewhere, mut elsewhere_rx) = connect(&node_b, "elsewhere").await;
    node_a.handle_join(&sender, "Q1").await.unwrap();
    node_b.handle_join(&remote, "Q1").await.unwrap();
    node_b.handle_join(&elsewhere, "Q2").await.unwrap();

    node_a.handle_client_message(&sender, message("Q1", "across")).await.unwrap();
    node_a.settle().await;

    assert_eq!(
        next_event(&mut remote_rx).await,
        Some(ServerEvent::Message { payload: message("Q1", "across") })
    );
    assert_silent(&mut sender_rx).await;
    assert_silent(&mut elsewhere_rx).await;
}

#[tokio::test]
async fn rejected_message_is_not_buffered() {
    let queue = Arc::new(MemoryQueue::new());
    let router = router(queue.clone(), LocalBridge::default(), "node-a");
    let blank = Message {
        room_id: String::new(),
        text: "lost".into(),
        sender_id: "u".into(),
        sender_name: "n".into(),
        sender_avatar: String::new(),
    };

    let err = router.handle_client_message(&"a".into(), blank).await.unwrap_err();
    router.settle().await;

    assert!(matches!(err, RelayError::EmptyRoom));
    assert!(queue.is_empty().await.unwrap());
}
