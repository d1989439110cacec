//! Message bus over the process channel
//!
//! Wraps a [`Transport`] (outbound) and the inbound event stream into:
//! - `send`: fire-and-forget envelope
//! - `send_wait`: request/response with a timeout that degrades to `None`
//! - `subscribe`: a multicast stream of inbound events, delivered in arrival
//!   order to every subscriber
//! - `inject`: re-enter an envelope locally (how `submit()` reaches the
//!   active prompt without a round trip)
//!
//! # Request correlation
//!
//! Every `send_wait` carries a fresh `requestId`. A reply echoing that id
//! resolves exactly its waiter. Hosts that only echo the channel are still
//! supported: such a reply resolves the *oldest* waiter on that channel, so
//! concurrent waits on one channel are answered in order instead of racing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::logging;
use crate::protocol::{AppMessage, AppState, Channel};
use crate::transport::{InboundEvent, Transport};

pub const DEFAULT_BUS_CAPACITY: usize = 256;
pub const DEFAULT_SEND_WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// What subscribers observe
#[derive(Debug, Clone)]
pub enum BusEvent {
    Message(AppMessage),
    /// The process channel errored; fatal to the pending prompt
    Failed(String),
    Closed,
}

struct Waiter {
    request_id: String,
    channel: Channel,
    reply: oneshot::Sender<AppMessage>,
}

struct BusInner {
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<BusEvent>,
    waiters: Mutex<Vec<Waiter>>,
    next_request: AtomicU64,
    send_wait_timeout: Duration,
}

/// Cheaply cloneable handle to the bus
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, DEFAULT_BUS_CAPACITY, DEFAULT_SEND_WAIT_TIMEOUT)
    }

    pub fn with_options(
        transport: Arc<dyn Transport>,
        capacity: usize,
        send_wait_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        MessageBus {
            inner: Arc::new(BusInner {
                transport,
                events,
                waiters: Mutex::new(Vec::new()),
                next_request: AtomicU64::new(1),
                send_wait_timeout,
            }),
        }
    }

    /// Forward an inbound event stream into the bus until it ends
    pub fn spawn_pump(&self, inbound: async_channel::Receiver<InboundEvent>) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            while let Ok(event) = inbound.recv().await {
                let closed = matches!(event, InboundEvent::Closed);
                bus.deliver(event);
                if closed {
                    return;
                }
            }
            bus.deliver(InboundEvent::Closed);
        })
    }

    /// Route one inbound event: replies go to their waiter, everything else is
    /// multicast to subscribers
    pub fn deliver(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(msg) => {
                logging::log_channel_event("in", &msg.channel, msg.prompt_id.as_deref());
                if let Some(msg) = self.resolve_waiter(msg) {
                    self.publish(BusEvent::Message(msg));
                }
            }
            InboundEvent::Error(error) => {
                warn!(error = %error, "Process channel error");
                self.publish(BusEvent::Failed(error));
            }
            InboundEvent::Closed => {
                debug!("Process channel closed");
                self.publish(BusEvent::Closed);
            }
        }
    }

    /// Re-enter an envelope locally, as if the host had sent it
    pub fn inject(&self, msg: AppMessage) {
        self.publish(BusEvent::Message(msg));
    }

    fn publish(&self, event: BusEvent) {
        // No receivers is fine: nobody is prompting right now
        let _ = self.inner.events.send(event);
    }

    /// Subscribe to inbound events from this point on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.inner.events.subscribe(),
        }
    }

    /// Live subscriptions; lets callers check nothing leaked
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    pub fn send_message(&self, msg: AppMessage) -> Result<()> {
        logging::log_channel_event("out", &msg.channel, msg.prompt_id.as_deref());
        self.inner.transport.send(&msg)
    }

    /// Fire-and-forget
    pub fn send(&self, channel: Channel, value: Value) -> Result<()> {
        self.send_message(AppMessage::with_value(channel, value))
    }

    /// Fire-and-forget with no payload
    pub fn signal(&self, channel: Channel) -> Result<()> {
        self.send_message(AppMessage::new(channel))
    }

    pub fn send_state(&self, channel: Channel, state: AppState) -> Result<()> {
        self.send_message(AppMessage::with_state(channel, state))
    }

    /// Send and wait for the correlated reply using the bus default timeout
    pub async fn send_wait(&self, channel: Channel, data: Option<Value>) -> Option<Value> {
        self.send_wait_timeout(channel, data, self.inner.send_wait_timeout)
            .await
    }

    /// Send and wait for the correlated reply.
    ///
    /// Resolves to the reply's `value` (or the whole reply envelope when it has
    /// none). A missing reply, a zero-listener transport failure, or a timeout
    /// all resolve to `None`; none of them is an error. `Duration::ZERO` waits
    /// without a timer.
    pub async fn send_wait_timeout(
        &self,
        channel: Channel,
        data: Option<Value>,
        timeout: Duration,
    ) -> Option<Value> {
        let request_id = format!(
            "req-{}",
            self.inner.next_request.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = oneshot::channel();

        // Register before sending so a fast reply can't slip past us
        self.inner.waiters.lock().push(Waiter {
            request_id: request_id.clone(),
            channel: channel.clone(),
            reply: tx,
        });

        let mut msg = AppMessage::new(channel.clone()).request_id(request_id.clone());
        msg.value = data;
        if let Err(e) = self.send_message(msg) {
            warn!(channel = %channel, error = %e, "send_wait could not send request");
            self.remove_waiter(&request_id);
            return None;
        }

        let reply = if timeout.is_zero() {
            rx.await.ok()
        } else {
            tokio::time::timeout(timeout, rx).await.ok().and_then(|r| r.ok())
        };

        match reply {
            Some(reply) => Some(reply.reply_value()),
            None => {
                debug!(
                    channel = %channel,
                    request_id = %request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "send_wait got no reply"
                );
                self.remove_waiter(&request_id);
                None
            }
        }
    }

    fn remove_waiter(&self, request_id: &str) {
        self.inner
            .waiters
            .lock()
            .retain(|w| w.request_id != request_id);
    }

    /// Hand `msg` to its waiter; gives it back when nobody is waiting for it
    fn resolve_waiter(&self, msg: AppMessage) -> Option<AppMessage> {
        let waiter = {
            let mut waiters = self.inner.waiters.lock();
            let position = match &msg.request_id {
                Some(id) => waiters.iter().position(|w| &w.request_id == id),
                None => waiters.iter().position(|w| w.channel == msg.channel),
            };
            position.map(|i| waiters.remove(i))
        };

        match waiter {
            Some(waiter) => {
                if let Err(msg) = waiter.reply.send(msg) {
                    // Waiter gave up between lookup and send; treat as a normal event
                    return Some(msg);
                }
                None
            }
            None => Some(msg),
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_waiters(&self) -> usize {
        self.inner.waiters.lock().len()
    }
}

/// One subscriber's view of the inbound stream
pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// Next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind the message bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{memory_pair, MemoryHost};
    use serde_json::json;

    fn bus_pair() -> (MessageBus, MemoryHost) {
        let (transport, host, inbound) = memory_pair(16);
        let bus = MessageBus::new(Arc::new(transport));
        bus.spawn_pump(inbound);
        (bus, host)
    }

    #[tokio::test]
    async fn test_send_is_fire_and_forget() {
        let (bus, host) = bus_pair();
        bus.send(Channel::SetHint, json!("hello")).unwrap();
        let sent = host.wait_for(Channel::SetHint).await.unwrap();
        assert_eq!(sent.value, Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_send_state_carries_snapshot() {
        let (bus, host) = bus_pair();
        bus.send_state(Channel::SetInput, AppState::with_input("abc")).unwrap();
        let sent = host.wait_for(Channel::SetInput).await.unwrap();
        assert_eq!(sent.state.unwrap().input, "abc");
        assert_eq!(sent.value, None);
    }

    #[tokio::test]
    async fn test_multicast_delivers_same_event_to_every_subscriber() {
        let (bus, host) = bus_pair();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        host.emit_state(Channel::Input, AppState::with_input("x")).await;

        for sub in [&mut a, &mut b] {
            match sub.recv().await {
                Some(BusEvent::Message(msg)) => assert_eq!(msg.channel, Channel::Input),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_wait_resolves_with_reply_value() {
        let (bus, host) = bus_pair();
        let responder = host.clone();
        tokio::spawn(async move {
            let request = responder.wait_for(Channel::GetInput).await.unwrap();
            let reply = AppMessage::with_value(Channel::GetInput, json!("typed"))
                .request_id(request.request_id.unwrap());
            responder.emit(reply).await;
        });

        let value = bus.send_wait(Channel::GetInput, None).await;
        assert_eq!(value, Some(json!("typed")));
        assert_eq!(bus.pending_waiters(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_wait_timeout_is_not_an_error() {
        let (bus, _host) = bus_pair();
        let value = bus
            .send_wait_timeout(Channel::GetAppState, None, Duration::from_millis(50))
            .await;
        assert_eq!(value, None);
        assert_eq!(bus.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_uncorrelated_replies_resolve_waiters_in_order() {
        let (bus, host) = bus_pair();

        let first = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.send_wait(Channel::GetBounds, Some(json!(1))).await })
        };
        host.wait_for(Channel::GetBounds).await.unwrap();
        let second = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.send_wait(Channel::GetBounds, Some(json!(2))).await })
        };
        host.wait_for(Channel::GetBounds).await.unwrap();

        // Host that only echoes the channel, no request id
        host.emit(AppMessage::with_value(Channel::GetBounds, json!("a")))
            .await;
        host.emit(AppMessage::with_value(Channel::GetBounds, json!("b")))
            .await;

        assert_eq!(first.await.unwrap(), Some(json!("a")));
        assert_eq!(second.await.unwrap(), Some(json!("b")));
    }

    #[tokio::test]
    async fn test_correlated_reply_skips_older_waiter() {
        let (bus, host) = bus_pair();

        let first = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.send_wait(Channel::GetBounds, None).await })
        };
        let first_request = host.wait_for(Channel::GetBounds).await.unwrap();
        let second = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.send_wait(Channel::GetBounds, None).await })
        };
        let second_request = host.wait_for(Channel::GetBounds).await.unwrap();

        host.emit(
            AppMessage::with_value(Channel::GetBounds, json!("second"))
                .request_id(second_request.request_id.unwrap()),
        )
        .await;
        host.emit(
            AppMessage::with_value(Channel::GetBounds, json!("first"))
                .request_id(first_request.request_id.unwrap()),
        )
        .await;

        assert_eq!(second.await.unwrap(), Some(json!("second")));
        assert_eq!(first.await.unwrap(), Some(json!("first")));
    }

    #[tokio::test]
    async fn test_channel_failure_is_broadcast() {
        let (bus, host) = bus_pair();
        let mut sub = bus.subscribe();
        host.fail("pipe broke").await;
        assert!(matches!(sub.recv().await, Some(BusEvent::Failed(e)) if e == "pipe broke"));
    }

    #[tokio::test]
    async fn test_inject_reaches_subscribers_without_transport() {
        let (bus, host) = bus_pair();
        let mut sub = bus.subscribe();
        bus.inject(AppMessage::with_value(Channel::ValueSubmitted, json!("v")));
        match sub.recv().await {
            Some(BusEvent::Message(msg)) => assert_eq!(msg.channel, Channel::ValueSubmitted),
            other => panic!("unexpected {:?}", other),
        }
        assert!(host.sent().is_empty());
    }
}
