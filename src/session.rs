//! # Live Reload Session
//!
//! Handle condiviso per le notifiche di live reload verso i browser connessi.
//!
//! ## Responsabilità:
//! - Creato una sola volta dalla composition root (`Pipeline`) e passato esplicitamente
//!   agli stage che devono notificare (styles, scripts, watcher) e al dev server
//! - Broadcast di eventi `Reload` (ricarica pagina) e `Inject` (aggiorna solo i CSS)
//! - Nessun client connesso ⇒ la notifica è un no-op
//!
//! ## Trasporto:
//! - `tokio::sync::broadcast`: ogni client SSE del dev server è un receiver

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Notification pushed to connected browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadEvent {
    /// Full page reload
    Reload,
    /// Stylesheet changed, refresh `<link>` tags without reloading
    Inject { path: String },
}

impl ReloadEvent {
    /// SSE event name understood by the injected client script
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::Inject { .. } => "css",
        }
    }
}

/// Live reload broadcast handle
#[derive(Debug, Clone)]
pub struct ReloadSession {
    sender: broadcast::Sender<ReloadEvent>,
}

impl ReloadSession {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Register a new client
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn reload(&self) {
        self.broadcast(ReloadEvent::Reload);
    }

    pub fn inject(&self, path: impl Into<String>) {
        self.broadcast(ReloadEvent::Inject { path: path.into() });
    }

    fn broadcast(&self, event: ReloadEvent) {
        // Err only means nobody is listening
        match self.sender.send(event.clone()) {
            Ok(clients) => debug!("Sent {:?} to {} client(s)", event, clients),
            Err(_) => debug!("No live reload clients for {:?}", event),
        }
    }
}

impl Default for ReloadSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_without_clients_is_noop() {
        let session = ReloadSession::new();
        assert_eq!(session.client_count(), 0);
        session.reload();
        session.inject("css/index.css");
    }

    #[tokio::test]
    async fn test_clients_receive_events() {
        let session = ReloadSession::new();
        let mut first = session.subscribe();
        let mut second = session.clone().subscribe();

        session.inject("css/index.css");
        session.reload();

        let expected = ReloadEvent::Inject {
            path: "css/index.css".to_string(),
        };
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
        assert_eq!(first.recv().await.unwrap(), ReloadEvent::Reload);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ReloadEvent::Reload.event_name(), "reload");
        assert_eq!(
            ReloadEvent::Inject { path: "x.css".into() }.event_name(),
            "css"
        );
    }
}
