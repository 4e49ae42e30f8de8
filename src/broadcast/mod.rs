//! Broadcast module - bounded fan-out of pipeline events
//!
//! Named channels ("decisions", "regimes", "alerts") each own a bounded
//! FIFO queue. Publishing is synchronous and never blocks the pipeline:
//! when a queue is full the oldest message is dropped and counted. A
//! background task drains queues to subscribers under a per-subscriber
//! delivery budget and probes liveness with heartbeats; subscribers that
//! stop consuming are evicted rather than allowed to stall the rest.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{debug, info, warn};

use crate::common::types::OutboundMessage;
use crate::config::BroadcastConfig;

pub const CHANNEL_DECISIONS: &str = "decisions";
pub const CHANNEL_REGIMES: &str = "regimes";
pub const CHANNEL_ALERTS: &str = "alerts";

/// Lifecycle of one named channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No subscribers, nothing queued
    Empty,
    /// At least one subscriber attached
    Active,
    /// No subscribers but messages retained for the next one
    Draining,
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<OutboundMessage>,
    missed_heartbeats: u32,
}

#[derive(Default)]
struct Counters {
    published: u64,
    delivered: u64,
    dropped: u64,
    evicted: u64,
}

struct Channel {
    queue: VecDeque<OutboundMessage>,
    subscribers: Vec<Subscriber>,
    counters: Counters,
}

impl Channel {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            subscribers: Vec::new(),
            counters: Counters::default(),
        }
    }

    fn state(&self) -> ChannelState {
        if !self.subscribers.is_empty() {
            ChannelState::Active
        } else if !self.queue.is_empty() {
            ChannelState::Draining
        } else {
            ChannelState::Empty
        }
    }
}

/// Per-channel metrics as exposed on the status surface
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMetrics {
    pub name: String,
    pub state: ChannelState,
    pub subscribers: usize,
    pub queued: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted: u64,
}

/// Receiving end of one subscription
pub struct SubscriberHandle {
    pub id: u64,
    receiver: mpsc::Receiver<OutboundMessage>,
}

impl SubscriberHandle {
    /// Next message; `None` once evicted or the manager shut down
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out hub owning every named channel
pub struct BroadcastManager {
    config: BroadcastConfig,
    channels: Mutex<HashMap<String, Channel>>,
    next_subscriber_id: AtomicU64,
}

impl BroadcastManager {
    pub fn new(config: BroadcastConfig) -> Self {
        let mut channels = HashMap::new();
        for name in [CHANNEL_DECISIONS, CHANNEL_REGIMES, CHANNEL_ALERTS] {
            channels.insert(name.to_string(), Channel::new());
        }
        Self {
            config,
            channels: Mutex::new(channels),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Enqueue one message; never blocks the caller
    ///
    /// A full queue sheds its oldest message, so the retained window is
    /// always the most recent `channel_capacity` publishes.
    pub fn publish(&self, channel: &str, message: OutboundMessage) {
        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        let channel = channels
            .entry(channel.to_string())
            .or_insert_with(Channel::new);
        channel.queue.push_back(message);
        channel.counters.published += 1;
        // Deliberately sheds the oldest entry, not the incoming one: the
        // retained window is always the most recent publishes.
        if channel.queue.len() > self.config.channel_capacity {
            channel.queue.pop_front();
            channel.counters.dropped += 1;
        }
    }

    /// Attach a new subscriber to a channel
    pub fn subscribe(&self, channel: &str) -> SubscriberHandle {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) =
            crate::common::channels::create_outbound_channel_with_size(self.config.subscriber_capacity);

        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        channels
            .entry(channel.to_string())
            .or_insert_with(Channel::new)
            .subscribers
            .push(Subscriber {
                id,
                sender,
                missed_heartbeats: 0,
            });
        info!(channel, subscriber = id, "Subscriber attached");
        SubscriberHandle { id, receiver }
    }

    /// Detach a subscriber; unknown ids are a no-op
    pub fn unsubscribe(&self, channel: &str, id: u64) {
        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        if let Some(channel) = channels.get_mut(channel) {
            channel.subscribers.retain(|s| s.id != id);
        }
    }

    /// Deliver every queued message on every channel with subscribers
    ///
    /// Channels without subscribers are skipped so their queues keep
    /// retaining messages for late joiners.
    pub async fn drain_all(&self) {
        let names: Vec<String> = {
            let channels = self.channels.lock().expect("broadcast lock poisoned");
            channels.keys().cloned().collect()
        };
        for name in names {
            self.drain_channel(&name).await;
        }
    }

    async fn drain_channel(&self, name: &str) {
        // Snapshot the batch and senders, then deliver without the lock
        // so a slow subscriber never blocks publishers.
        let (batch, senders) = {
            let mut channels = self.channels.lock().expect("broadcast lock poisoned");
            let channel = match channels.get_mut(name) {
                Some(channel) => channel,
                None => return,
            };
            if channel.subscribers.is_empty() || channel.queue.is_empty() {
                return;
            }
            let batch: Vec<OutboundMessage> = channel.queue.drain(..).collect();
            let senders: Vec<(u64, mpsc::Sender<OutboundMessage>)> = channel
                .subscribers
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect();
            (batch, senders)
        };

        let budget = Duration::from_millis(self.config.publish_timeout_ms);
        let mut delivered = 0u64;
        let mut dropped = 0u64;
        let mut closed: Vec<u64> = Vec::new();

        for message in &batch {
            for (id, sender) in &senders {
                if closed.contains(id) {
                    continue;
                }
                match sender.send_timeout(message.clone(), budget).await {
                    Ok(()) => delivered += 1,
                    Err(SendTimeoutError::Timeout(_)) => {
                        dropped += 1;
                        debug!(channel = name, subscriber = id, "Delivery budget exceeded");
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        dropped += 1;
                        closed.push(*id);
                    }
                }
            }
        }

        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        if let Some(channel) = channels.get_mut(name) {
            channel.counters.delivered += delivered;
            channel.counters.dropped += dropped;
            if !closed.is_empty() {
                channel.subscribers.retain(|s| !closed.contains(&s.id));
                channel.counters.evicted += closed.len() as u64;
                warn!(channel = name, count = closed.len(), "Evicted closed subscribers");
            }
        }
    }

    /// Probe every subscriber with a heartbeat and evict the unresponsive
    pub fn heartbeat_tick(&self) {
        let heartbeat = OutboundMessage::Heartbeat { at: Utc::now() };
        let max_missed = self.config.max_missed_heartbeats;

        let mut channels = self.channels.lock().expect("broadcast lock poisoned");
        for (name, channel) in channels.iter_mut() {
            let mut evicted = 0u64;
            channel.subscribers.retain_mut(|subscriber| {
                match subscriber.sender.try_send(heartbeat.clone()) {
                    Ok(()) => {
                        subscriber.missed_heartbeats = 0;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        subscriber.missed_heartbeats += 1;
                        if subscriber.missed_heartbeats >= max_missed {
                            warn!(
                                channel = %name,
                                subscriber = subscriber.id,
                                "Evicting subscriber after missed heartbeats"
                            );
                            evicted += 1;
                            false
                        } else {
                            true
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        evicted += 1;
                        false
                    }
                }
            });
            channel.counters.evicted += evicted;
        }
    }

    /// Snapshot of every channel's state and counters
    pub fn metrics(&self) -> Vec<ChannelMetrics> {
        let channels = self.channels.lock().expect("broadcast lock poisoned");
        let mut metrics: Vec<ChannelMetrics> = channels
            .iter()
            .map(|(name, channel)| ChannelMetrics {
                name: name.clone(),
                state: channel.state(),
                subscribers: channel.subscribers.len(),
                queued: channel.queue.len(),
                published: channel.counters.published,
                delivered: channel.counters.delivered,
                dropped: channel.counters.dropped,
                evicted: channel.counters.evicted,
            })
            .collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }

    /// Spawn the drain/heartbeat loop; runs until the manager is dropped
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let drain_interval = Duration::from_millis(manager.config.drain_interval_ms);
        let heartbeat_interval = Duration::from_secs(manager.config.heartbeat_interval_seconds);
        tokio::spawn(async move {
            let mut drain = tokio::time::interval(drain_interval);
            let mut heartbeat = tokio::time::interval(heartbeat_interval);
            loop {
                tokio::select! {
                    _ = drain.tick() => manager.drain_all().await,
                    _ = heartbeat.tick() => manager.heartbeat_tick(),
                }
            }
        })
    }
}
