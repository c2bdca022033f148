use crate::connection::Connection;
use domain::Cipher;
use events::{Bus, SubscriberKind};
use log::*;
use std::sync::Arc;

pub struct Manager {
    bus: Bus,
    cipher: Arc<Cipher>,
}

impl Manager {
    pub fn new(bus: Bus, cipher: Arc<Cipher>) -> Self {
        Self { bus, cipher }
    }

    /// Register a new SSE connection on the bus. Events published from now on reach it.
    pub fn connect(&self) -> Connection {
        let subscription = self.bus.subscribe(SubscriberKind::Sse);
        info!("Registered new SSE connection {}", subscription.id());
        Connection::new(subscription, Arc::clone(&self.cipher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::Event;
    use futures_util::{pin_mut, StreamExt};
    use std::time::Duration;
    use tokio::time::timeout;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

    fn setup() -> (Bus, Arc<Cipher>, Manager) {
        let bus = Bus::new(16);
        let cipher = Arc::new(Cipher::new(&TEST_KEY.parse().unwrap()));
        let manager = Manager::new(bus.clone(), Arc::clone(&cipher));
        (bus, cipher, manager)
    }

    async fn next_plaintext(connection: &mut Connection, cipher: &Cipher) -> String {
        let payload = timeout(Duration::from_secs(1), connection.next_frame())
            .await
            .expect("frame should arrive")
            .expect("bus should be open");
        String::from_utf8(cipher.decrypt_encoded(&payload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_every_connection_receives_each_event_once_in_order() {
        let (bus, cipher, manager) = setup();
        let mut connections: Vec<Connection> = (0..3).map(|_| manager.connect()).collect();

        bus.publish(Event::new("first"));
        bus.publish(Event::new("second"));

        for connection in connections.iter_mut() {
            assert_eq!(next_plaintext(connection, &cipher).await, "first");
            assert_eq!(next_plaintext(connection, &cipher).await, "second");
            assert!(
                timeout(Duration::from_millis(50), connection.next_frame())
                    .await
                    .is_err(),
                "no duplicate frames expected"
            );
        }
    }

    #[tokio::test]
    async fn test_frames_are_freshly_encrypted_per_connection() {
        let (bus, _cipher, manager) = setup();
        let mut first = manager.connect();
        let mut second = manager.connect();

        bus.publish(Event::new("same event"));

        let a = first.next_frame().await.unwrap();
        let b = second.next_frame().await.unwrap();
        assert_ne!(a, b, "each delivery uses its own nonce");
    }

    #[tokio::test]
    async fn test_dropping_connection_unregisters_from_bus() {
        let (bus, _cipher, manager) = setup();
        let connection = manager.connect();
        assert_eq!(bus.subscriber_count(), 1);

        drop(connection);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_closes() {
        let (bus, _cipher, manager) = setup();
        let stream = manager.connect().into_stream();
        pin_mut!(stream);

        bus.publish(Event::new("before shutdown"));
        bus.close();

        assert!(stream.next().await.is_some());
        assert!(timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should finish")
            .is_none());
    }
}
