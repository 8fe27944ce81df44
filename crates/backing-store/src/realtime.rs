//! Supabase realtime change feed.
//!
//! One websocket carries every subscription. The connection is opened on the
//! first subscribe, rejoins all live channels after a reconnect, and backs off
//! exponentially between attempts.

use crate::phoenix::{self, PhoenixMessage};
use crate::{ChangeFeed, ChangeFilter, ChangeSubscription, RowChange, StoreError, StoreResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hub_config_and_utils::RealtimeConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Channel {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<RowChange>,
}

struct Shared {
    url: String,
    config: RealtimeConfig,
    access_token: RwLock<Option<String>>,
    state: RwLock<ConnectionState>,
    channels: Mutex<HashMap<String, Channel>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    next_ref: AtomicU64,
}

impl Shared {
    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().expect("realtime state lock poisoned") = state;
    }

    fn token(&self) -> Option<String> {
        self.access_token.read().expect("realtime token lock poisoned").clone()
    }

    /// Queues a message on the live socket. Dropped when disconnected; joins
    /// are replayed on connect.
    fn send(&self, msg: &PhoenixMessage) {
        let outgoing = self.outgoing.lock().expect("realtime sender lock poisoned");
        let Some(sender) = outgoing.as_ref() else {
            return;
        };
        match msg.to_json() {
            Ok(json) => {
                let _ = sender.send(Message::Text(json.into()));
            }
            Err(e) => warn!(error = %e, event = %msg.event, "Failed to encode realtime message"),
        }
    }

    fn join(&self, topic: &str, filter: &ChangeFilter) {
        let token = self.token();
        let msg = PhoenixMessage::join(topic, filter, token.as_deref(), &self.next_ref());
        self.send(&msg);
    }

    fn leave(&self, topic: &str) {
        let removed = self
            .channels
            .lock()
            .expect("realtime channels lock poisoned")
            .remove(topic);
        if removed.is_some() {
            debug!(topic, "Leaving realtime channel");
            self.send(&PhoenixMessage::leave(topic, &self.next_ref()));
        }
    }

    fn rejoin_all(&self) {
        let channels: Vec<(String, ChangeFilter)> = self
            .channels
            .lock()
            .expect("realtime channels lock poisoned")
            .iter()
            .map(|(topic, channel)| (topic.clone(), channel.filter.clone()))
            .collect();
        for (topic, filter) in channels {
            self.join(&topic, &filter);
        }
    }

    fn route(&self, msg: &PhoenixMessage) {
        if let Some(status) = msg.reply_status() {
            if status != "ok" {
                warn!(topic = %msg.topic, status, "Realtime request rejected");
            }
            return;
        }
        if msg.event == phoenix::EVENT_ERROR || msg.event == phoenix::EVENT_CLOSE {
            debug!(topic = %msg.topic, event = %msg.event, "Realtime channel closed by server");
            return;
        }
        let Some(change) = msg.postgres_change() else {
            return;
        };

        let mut channels = self.channels.lock().expect("realtime channels lock poisoned");
        let Some(channel) = channels.get(&msg.topic) else {
            return;
        };
        let Some(change) = channel.filter.claim(change) else {
            debug!(topic = %msg.topic, "Ignoring change outside channel filter");
            return;
        };
        if channel.tx.send(change).is_err() {
            channels.remove(&msg.topic);
        }
    }
}

/// Supabase realtime client implementing [`ChangeFeed`].
pub struct RealtimeClient {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// `url` is the realtime websocket endpoint, see
    /// [`hub_config_and_utils::Config::realtime_url`].
    pub fn new(url: impl Into<String>, config: RealtimeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                config,
                access_token: RwLock::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
                channels: Mutex::new(HashMap::new()),
                outgoing: Mutex::new(None),
                next_ref: AtomicU64::new(1),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read().expect("realtime state lock poisoned")
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.shared.channels.lock().expect("realtime channels lock poisoned").len()
    }

    /// Replace the session token used for row-level security, pushing it to
    /// every joined channel.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.shared.access_token.write().expect("realtime token lock poisoned") = token.clone();
        let Some(token) = token else {
            return;
        };
        let topics: Vec<String> = self
            .shared
            .channels
            .lock()
            .expect("realtime channels lock poisoned")
            .keys()
            .cloned()
            .collect();
        for topic in topics {
            let msg = PhoenixMessage::access_token(&topic, &token, &self.shared.next_ref());
            self.shared.send(&msg);
        }
    }

    /// Close the socket and drop every channel.
    pub fn disconnect(&self) {
        if let Some(task) = self.task.lock().expect("realtime task lock poisoned").take() {
            task.abort();
        }
        self.shared.outgoing.lock().expect("realtime sender lock poisoned").take();
        self.shared.channels.lock().expect("realtime channels lock poisoned").clear();
        self.shared.set_state(ConnectionState::Disconnected);
        info!("Disconnected from realtime");
    }

    fn ensure_started(&self) {
        let mut task = self.task.lock().expect("realtime task lock poisoned");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run(shared)));
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(&self, filter: ChangeFilter) -> StoreResult<ChangeSubscription> {
        if filter.user_id.is_empty() {
            return Err(StoreError::Config("change filter needs a user id".to_string()));
        }

        let topic = format!(
            "realtime:hub:{}:{}:{}",
            filter.collection.table(),
            filter.user_id,
            self.shared.next_ref()
        );
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.channels.lock().expect("realtime channels lock poisoned").insert(
            topic.clone(),
            Channel {
                filter: filter.clone(),
                tx,
            },
        );

        self.ensure_started();
        self.shared.join(&topic, &filter);
        debug!(topic = %topic, collection = %filter.collection, "Subscribed to realtime changes");

        let shared = Arc::clone(&self.shared);
        Ok(ChangeSubscription::new(filter, rx, move || shared.leave(&topic)))
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
pub(crate) fn backoff_delay(config: &RealtimeConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let secs = std::cmp::min(
        config.reconnect_base_delay_secs.saturating_mul(factor),
        config.reconnect_max_delay_secs,
    );
    Duration::from_secs(secs)
}

async fn run(shared: Arc<Shared>) {
    let mut attempts: u32 = 0;
    loop {
        match connect_once(&shared).await {
            Ok(()) => {
                info!("Realtime connection closed");
                attempts = 0;
            }
            Err(e) => error!(error = %e, "Realtime connection failed"),
        }
        shared.outgoing.lock().expect("realtime sender lock poisoned").take();
        shared.set_state(ConnectionState::Disconnected);

        attempts += 1;
        if attempts > shared.config.max_reconnect_attempts {
            warn!("Max realtime reconnect attempts reached");
            // Subscribers see their streams end.
            shared.channels.lock().expect("realtime channels lock poisoned").clear();
            return;
        }

        let delay = backoff_delay(&shared.config, attempts);
        info!(attempt = attempts, delay_secs = delay.as_secs(), "Scheduling realtime reconnect");
        tokio::time::sleep(delay).await;
    }
}

/// Runs one connection until it closes. `Ok` means the socket was established.
async fn connect_once(shared: &Shared) -> StoreResult<()> {
    shared.set_state(ConnectionState::Connecting);
    info!("Connecting to realtime");

    let (ws_stream, _) = connect_async(shared.url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    *shared.outgoing.lock().expect("realtime sender lock poisoned") = Some(out_tx);
    shared.set_state(ConnectionState::Connected);
    shared.rejoin_all();
    info!("Connected to realtime");

    let mut heartbeat = interval(Duration::from_secs(shared.config.heartbeat_interval_secs.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let json = PhoenixMessage::heartbeat(&shared.next_ref()).to_json()?;
                write.send(Message::Text(json.into())).await?;
            }
            outgoing = out_rx.recv() => match outgoing {
                Some(msg) => write.send(msg).await?,
                None => return Ok(()),
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => match PhoenixMessage::from_json(text.as_str()) {
                    Ok(msg) => shared.route(&msg),
                    Err(e) => warn!(error = %e, "Failed to parse realtime message"),
                },
                Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}
