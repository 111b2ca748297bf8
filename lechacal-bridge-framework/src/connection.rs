//! MQTT event loop driver.
//!
//! rumqttc only makes progress while its [`EventLoop`] is polled. The driver
//! polls it in a dedicated task and reports the link state over a
//! [`watch`] channel, so tasks that must react to (re)connections never
//! publish from inside the event loop task itself.

use std::time::Duration;

use rumqttc::{ConnectReturnCode, Event, EventLoop, Packet};
use tokio::sync::watch;

/// State of the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection acknowledged yet.
    Connecting,
    /// Broker accepted the connection. `session` counts connections since
    /// start, so every reconnection is observable as a new value.
    Connected { session: u64 },
    /// Connection lost; the driver is waiting to reconnect.
    Disconnected,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }
}

/// Create the link state channel in its initial state.
pub fn link_channel() -> (watch::Sender<LinkState>, watch::Receiver<LinkState>) {
    watch::channel(LinkState::Connecting)
}

/// Poll `event_loop` forever, publishing link state changes to `state`.
///
/// Connection errors are logged and retried after `reconnect_delay`; rumqttc
/// reconnects on the next poll.
pub async fn drive_event_loop(
    mut event_loop: EventLoop,
    state: watch::Sender<LinkState>,
    reconnect_delay: Duration,
) {
    let mut sessions: u64 = 0;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    sessions += 1;
                    tracing::info!(session = sessions, "Connected to MQTT broker");
                    state.send_replace(LinkState::Connected { session: sessions });
                } else {
                    tracing::error!(code = ?ack.code, "MQTT broker refused connection");
                    mark_disconnected(&state);
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("MQTT broker sent disconnect");
                mark_disconnected(&state);
            }
            Ok(event) => {
                tracing::trace!(?event, "MQTT event");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_secs = reconnect_delay.as_secs(),
                    "MQTT connection error"
                );
                mark_disconnected(&state);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

fn mark_disconnected(state: &watch::Sender<LinkState>) {
    state.send_if_modified(|current| {
        if *current == LinkState::Disconnected {
            false
        } else {
            *current = LinkState::Disconnected;
            true
        }
    });
}

/// Follows the link state and yields each broker connection exactly once.
#[derive(Debug, Clone)]
pub struct ConnectionWatcher {
    link: watch::Receiver<LinkState>,
    last_session: u64,
}

impl ConnectionWatcher {
    pub fn new(link: watch::Receiver<LinkState>) -> Self {
        Self {
            link,
            last_session: 0,
        }
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// Wait for a connection not yet returned by this watcher.
    ///
    /// Returns immediately when the link is already connected on a session this
    /// watcher has not seen. Returns `None` once the driver is gone.
    pub async fn next_connection(&mut self) -> Option<u64> {
        loop {
            let state = *self.link.borrow_and_update();
            if let LinkState::Connected { session } = state {
                if session > self.last_session {
                    self.last_session = session;
                    return Some(session);
                }
            }

            if self.link.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_already_connected_is_reported_once() {
        let (tx, rx) = link_channel();
        tx.send_replace(LinkState::Connected { session: 1 });

        let mut watcher = ConnectionWatcher::new(rx);
        assert_eq!(watcher.next_connection().await, Some(1));

        drop(tx);
        assert_eq!(watcher.next_connection().await, None);
    }

    #[tokio::test]
    async fn test_reconnection_is_reported() {
        let (tx, rx) = link_channel();
        let mut watcher = ConnectionWatcher::new(rx);
        assert_eq!(watcher.state(), LinkState::Connecting);

        tx.send_replace(LinkState::Connected { session: 1 });
        assert_eq!(watcher.next_connection().await, Some(1));

        mark_disconnected(&tx);
        tx.send_replace(LinkState::Connected { session: 2 });
        assert_eq!(watcher.next_connection().await, Some(2));
        assert!(watcher.state().is_connected());
    }

    #[tokio::test]
    async fn test_waits_for_connection() {
        let (tx, rx) = link_channel();
        let mut watcher = ConnectionWatcher::new(rx);

        let waiter = tokio::spawn(async move { watcher.next_connection().await });
        tx.send_replace(LinkState::Disconnected);
        tx.send_replace(LinkState::Connected { session: 3 });

        assert_eq!(waiter.await.unwrap(), Some(3));
    }

    #[test]
    fn test_mark_disconnected_only_notifies_on_change() {
        let (tx, mut rx) = link_channel();
        mark_disconnected(&tx);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        mark_disconnected(&tx);
        assert!(!rx.has_changed().unwrap());
        assert!(!rx.borrow().is_connected());
    }
}
