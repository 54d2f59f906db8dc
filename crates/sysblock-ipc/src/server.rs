//! IPC server implementation

use sysblock_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response,
};
use sysblock_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Message from a connection task to the service loop
#[derive(Debug)]
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    subscribers: Arc<AtomicUsize>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Root and the service's own user may drive enforcement; anyone else
/// only observes.
pub fn role_for_uid(uid: Option<u32>, service_uid: u32) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Host,
        Some(u) if u == service_uid => ClientRole::Host,
        _ => ClientRole::Observer,
    }
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(AtomicUsize::new(0)),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages. Only the first call gets it.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;
        let service_uid = nix::unistd::getuid().as_raw();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid, service_uid);

                    let info = ClientInfo {
                        client_id,
                        role,
                        uid,
                    };

                    debug!(client_id = %client_id, uid = ?uid, role = ?role, "Accepted connection");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id,
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                    subscribed: false,
                },
            );
        }

        let _ = self
            .message_tx
            .send(ServerMessage::ClientConnected { client_id, info });

        let clients = self.clients.clone();
        let subscribers = self.subscribers.clone();
        let message_tx = self.message_tx.clone();

        // reader
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %client_id, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<Request>(line) {
                            Ok(request) => {
                                let subscribe = match request.command {
                                    Command::SubscribeEvents => Some(true),
                                    Command::UnsubscribeEvents => Some(false),
                                    _ => None,
                                };
                                if let Some(flag) = subscribe {
                                    let mut clients = clients.write().await;
                                    if let Some(handle) = clients.get_mut(&client_id) {
                                        if handle.subscribed != flag {
                                            handle.subscribed = flag;
                                            if flag {
                                                subscribers.fetch_add(1, Ordering::SeqCst);
                                            } else {
                                                subscribers.fetch_sub(1, Ordering::SeqCst);
                                            }
                                        }
                                    }
                                }

                                let _ = message_tx
                                    .send(ServerMessage::Request { client_id, request });
                            }
                            Err(e) => {
                                warn!(client_id = %client_id, error = %e, "Invalid request");
                                let response = Response::error(
                                    0,
                                    ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()),
                                );
                                if let Ok(json) = serde_json::to_string(&response) {
                                    let _ = response_tx.send(json);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %client_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            // dropping the handle closes the writer's response channel
            remove_client(&clients, &subscribers, &client_id).await;
        });

        // writer
        let mut event_rx = self.event_tx.subscribe();
        let clients_writer = self.clients.clone();
        let subscribers_writer = self.subscribers.clone();
        let message_tx_writer = self.message_tx.clone();

        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    maybe = response_rx.recv() => {
                        let Some(mut msg) = maybe else { break };
                        msg.push('\n');
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            debug!(client_id = %client_id, error = %e, "Write error");
                            break;
                        }
                    }

                    received = event_rx.recv() => {
                        let event = match received {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(
                                    client_id = %client_id,
                                    skipped,
                                    "Subscriber lagging, events dropped"
                                );
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        let is_subscribed = {
                            let clients = clients_writer.read().await;
                            clients.get(&client_id).is_some_and(|h| h.subscribed)
                        };

                        if is_subscribed {
                            if let Ok(mut msg) = serde_json::to_string(&event) {
                                msg.push('\n');
                                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                                    debug!(client_id = %client_id, error = %e, "Event write error");
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            remove_client(&clients_writer, &subscribers_writer, &client_id).await;
            let _ = message_tx_writer.send(ServerMessage::ClientDisconnected { client_id });
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Sender feeding every connection's event writer
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Live count of connections subscribed to events. Every connection
    /// listens on the broadcast channel, so its receiver count says nothing
    /// about who asked for events.
    pub fn subscribers(&self) -> Arc<AtomicUsize> {
        self.subscribers.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn remove_client(
    clients: &RwLock<HashMap<ClientId, ClientHandle>>,
    subscribers: &AtomicUsize,
    client_id: &ClientId,
) {
    let mut clients = clients.write().await;
    if let Some(handle) = clients.remove(client_id) {
        if handle.subscribed {
            subscribers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Peer UID from SO_PEERCRED
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpcClient;
    use std::time::Duration;
    use sysblock_api::{EventPayload, ResponsePayload, ResponseResult};
    use tempfile::tempdir;

    #[test]
    fn roles_by_uid() {
        assert_eq!(role_for_uid(Some(0), 1000), ClientRole::Host);
        assert_eq!(role_for_uid(Some(1000), 1000), ClientRole::Host);
        assert_eq!(role_for_uid(Some(1001), 1000), ClientRole::Observer);
        assert_eq!(role_for_uid(None, 1000), ClientRole::Observer);
    }

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        assert!(socket_path.exists());
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn request_response_and_events() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("sysblockd.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();
        let server = Arc::new(server);
        let mut messages = server.take_message_receiver().await.unwrap();
        assert!(server.take_message_receiver().await.is_none());

        let accept = server.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        // ping and subscribe succeed, everything else is refused
        let responder = server.clone();
        tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                if let ServerMessage::Request { client_id, request } = msg {
                    let id = request.request_id;
                    let response = match request.command {
                        Command::SubscribeEvents => {
                            Response::success(id, ResponsePayload::Subscribed { client_id })
                        }
                        Command::Ping => Response::success(id, ResponsePayload::Pong),
                        _ => Response::error(
                            id,
                            ErrorInfo::new(ErrorCode::FrozenLine, "Line 3 is frozen").at_line(3),
                        ),
                    };
                    let _ = responder.send_response(&client_id, response).await;
                }
            }
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let response = client.send(Command::Ping).await.unwrap();
        assert_eq!(response.request_id, 1);
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));

        let refused = client
            .call(Command::SaveConfig {
                text: String::new(),
            })
            .await;
        match refused {
            Err(IpcError::Rejected(info)) => {
                assert_eq!(info.code, ErrorCode::FrozenLine);
                assert_eq!(info.line, Some(3));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        // connected but not yet listening
        assert_eq!(server.client_count().await, 1);
        assert_eq!(server.subscriber_count(), 0);

        let mut events = client.subscribe().await.unwrap();
        assert_eq!(server.subscriber_count(), 1);
        server.broadcast_event(Event::new(EventPayload::HideOverlay));
        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.payload, EventPayload::HideOverlay);

        drop(events);
        tokio::time::timeout(Duration::from_secs(2), async {
            while server.subscriber_count() > 0 || server.client_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
