//! WebSocket Registry Server
//!
//! Async WebSocket front end for the registry. Each connection
//! authenticates once with a JWT, then issues registry requests as the
//! address derived from the token. Every registry event is pushed to all
//! authenticated connections, and settled matches are drained from the
//! registry's reveal queue on a fixed interval.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::address::Address;
use crate::fhe::capability::FheCapability;
use crate::game::events::RegistryEvent;
use crate::game::oracle::RevealRequest;
use super::auth::{authenticate, AuthConfig, AuthError};
use super::gateway::RegistryGateway;
use super::protocol::{AuthRequest, AuthResult, ClientMessage, ErrorCode, MoveFrame, ServerMessage};

/// Connection identifier.
pub type ConnectionId = Uuid;

type ClientMap = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle time after which a connection is dropped.
    pub idle_timeout: Duration,
    /// How often the reveal queue is drained.
    pub reveal_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            reveal_interval: Duration::from_secs(1),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("RPS_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("RPS_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: std::env::var("RPS_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            reveal_interval: std::env::var("RPS_REVEAL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_interval),
            ..defaults
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum RpsServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Remote peer.
    peer: SocketAddr,
    /// Address after auth.
    address: Option<Address>,
    /// Connection time.
    connected_at: DateTime<Utc>,
    /// Outbound queue.
    sender: mpsc::Sender<ServerMessage>,
}

/// The registry server.
pub struct RpsServer<F> {
    config: ServerConfig,
    auth: Arc<AuthConfig>,
    gateway: RegistryGateway<F>,
    clients: ClientMap,
    /// One permit per connection slot, taken before the handshake.
    connection_permits: Arc<Semaphore>,
    /// Where drained reveal requests go; logged and dropped when unset.
    reveal_sink: Option<mpsc::Sender<RevealRequest>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<F> RpsServer<F>
where
    F: FheCapability + Send + Sync + 'static,
{
    /// Create a new server.
    pub fn new(config: ServerConfig, auth: AuthConfig, gateway: RegistryGateway<F>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            connection_permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            auth: Arc::new(auth),
            gateway,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            reveal_sink: None,
            shutdown_tx,
        }
    }

    /// Forward drained reveal requests to a decryption consumer.
    pub fn with_reveal_sink(mut self, sink: mpsc::Sender<RevealRequest>) -> Self {
        self.reveal_sink = Some(sink);
        self
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), RpsServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RpsServerError> {
        info!("Registry server listening on {}", listener.local_addr()?);

        let events = self.gateway.subscribe_events().await;
        let fanout_handle = tokio::spawn(Self::run_event_fanout(events, self.clients.clone()));
        let reveal_handle = tokio::spawn(Self::run_reveal_drain(
            self.gateway.clone(),
            self.reveal_sink.clone(),
            self.config.reveal_interval,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match self.connection_permits.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Connection limit reached, rejecting {}", peer);
                                    continue;
                                }
                            };

                            info!("New connection from {}", peer);
                            self.handle_connection(stream, peer, permit);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        fanout_handle.abort();
        reveal_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    ///
    /// `permit` holds the connection slot until the task ends.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, permit: OwnedSemaphorePermit) {
        let clients = self.clients.clone();
        let gateway = self.gateway.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", peer, e);
                    return;
                }
            };

            let conn_id = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(conn_id, ConnectedClient {
                peer,
                address: None,
                connected_at: Utc::now(),
                sender: msg_tx.clone(),
            });

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = tokio::time::timeout(config.idle_timeout, ws_receiver.next()) => {
                        let msg = match msg {
                            Ok(msg) => msg,
                            Err(_) => {
                                info!("Dropping idle connection {}", conn_id);
                                break;
                            }
                        };
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(
                                            conn_id, client_msg, &clients, &gateway, &auth, &config,
                                        ).await
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", conn_id, e);
                                        ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                let reply = match MoveFrame::from_bytes(&data) {
                                    Ok(frame) => {
                                        Self::handle_client_message(
                                            conn_id, frame.into_message(), &clients, &gateway, &auth, &config,
                                        ).await
                                    }
                                    Err(e) => {
                                        debug!("Invalid binary frame from {}: {}", conn_id, e);
                                        ServerMessage::error(ErrorCode::InvalidInput, "Invalid move frame")
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", conn_id);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", conn_id, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies flush before the socket goes away
            drop(msg_tx);
            if let Some(client) = clients.write().await.remove(&conn_id) {
                let lifetime = Utc::now() - client.connected_at;
                info!(
                    "Client {} ({}) cleaned up after {}s",
                    conn_id,
                    client.peer,
                    lifetime.num_seconds()
                );
            }
            let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;
        });
    }

    /// Route one client message.
    async fn handle_client_message(
        conn_id: ConnectionId,
        msg: ClientMessage,
        clients: &ClientMap,
        gateway: &RegistryGateway<F>,
        auth: &AuthConfig,
        config: &ServerConfig,
    ) -> ServerMessage {
        match msg {
            ClientMessage::Auth(request) => Self::handle_auth(conn_id, request, clients, auth, config).await,
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: Utc::now().timestamp_millis().max(0) as u64,
            },
            other => {
                let caller = clients.read().await.get(&conn_id).and_then(|c| c.address);
                gateway.execute(caller, other).await
            }
        }
    }

    /// Handle authentication.
    async fn handle_auth(
        conn_id: ConnectionId,
        request: AuthRequest,
        clients: &ClientMap,
        auth: &AuthConfig,
        config: &ServerConfig,
    ) -> ServerMessage {
        let address = match authenticate(&request.token, auth) {
            Ok(address) => address,
            Err(e) => {
                warn!("Auth failed for {}: {}", conn_id, e);
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    AuthError::NotConfigured => ErrorCode::AuthFailed,
                    _ => ErrorCode::InvalidToken,
                };
                return ServerMessage::AuthResult(AuthResult {
                    success: false,
                    address: None,
                    code: Some(code),
                    error: Some(e.to_string()),
                    server_version: config.version.clone(),
                });
            }
        };

        let mut clients = clients.write().await;
        match clients.get_mut(&conn_id) {
            Some(client) if client.address.is_some_and(|a| a != address) => {
                return ServerMessage::error(ErrorCode::AuthFailed, "connection already authenticated");
            }
            Some(client) => client.address = Some(address),
            None => return ServerMessage::error(ErrorCode::InternalError, "unknown connection"),
        }

        info!(
            "Client {} authenticated as {} (client version {})",
            conn_id,
            address.short(),
            request.client_version
        );

        ServerMessage::AuthResult(AuthResult {
            success: true,
            address: Some(address),
            code: None,
            error: None,
            server_version: config.version.clone(),
        })
    }

    /// Push every registry event to every authenticated client.
    async fn run_event_fanout(mut events: broadcast::Receiver<RegistryEvent>, clients: ClientMap) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event fan-out lagged, {} events dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let clients = clients.read().await;
            for (conn_id, client) in clients.iter().filter(|(_, c)| c.address.is_some()) {
                let msg = ServerMessage::Event { event: event.clone() };
                if client.sender.try_send(msg).is_err() {
                    debug!("Event dropped for slow client {}", conn_id);
                }
            }
        }
    }

    /// Periodically move settled matches out of the registry's reveal queue.
    async fn run_reveal_drain(
        gateway: RegistryGateway<F>,
        sink: Option<mpsc::Sender<RevealRequest>>,
        period: Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            for request in gateway.take_reveal_requests().await {
                match &sink {
                    Some(sink) => {
                        if let Err(e) = sink.try_send(request) {
                            warn!("Reveal sink unavailable, match {} left on its record", e.into_inner().match_id);
                        }
                    }
                    None => {
                        info!(
                            "Match {} settled, result {} awaiting decryption",
                            request.match_id,
                            request.result.handle()
                        );
                    }
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Connection slots still free.
    pub fn available_slots(&self) -> usize {
        self.connection_permits.available_permits()
    }

    /// Authenticated connection count.
    pub async fn authenticated_count(&self) -> usize {
        self.clients.read().await.values().filter(|c| c.address.is_some()).count()
    }

    /// The gateway this server dispatches into.
    pub fn gateway(&self) -> &RegistryGateway<F> {
        &self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhe::local::{LocalFhe, LocalFheConfig};
    use crate::game::events::RegistryEventData;
    use crate::game::registry::{MatchRegistry, RegistryConfig};
    use crate::network::auth::tests::{claims_for, mint_token, TEST_SECRET};
    use tokio_tungstenite::connect_async;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        }
    }

    fn server_with(config: ServerConfig) -> RpsServer<LocalFhe> {
        let registry_config = RegistryConfig::default();
        let fhe = LocalFhe::new(registry_config.contract_address, LocalFheConfig::default());
        let gateway = RegistryGateway::new(MatchRegistry::new(registry_config, fhe));
        RpsServer::new(config, AuthConfig::with_secret(TEST_SECRET), gateway)
    }

    fn server() -> RpsServer<LocalFhe> {
        server_with(test_config())
    }

    async fn start() -> (Arc<RpsServer<LocalFhe>>, String) {
        start_with(server()).await
    }

    async fn start_with(server: RpsServer<LocalFhe>) -> (Arc<RpsServer<LocalFhe>>, String) {
        let server = Arc::new(server);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, url)
    }

    async fn next_message<S>(ws: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for message")
                .expect("stream closed")
                .unwrap();
            if let Message::Text(text) = msg {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    fn auth_message(sub: &str) -> Message {
        let token = mint_token(&claims_for(sub), TEST_SECRET);
        let msg = ClientMessage::Auth(AuthRequest { token, client_version: "test".into() });
        Message::Text(msg.to_json().unwrap())
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.reveal_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server();
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.authenticated_count().await, 0);
        assert_eq!(server.available_slots(), 1000);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_reveals_drained_while_serving() {
        let (sink, mut drained) = mpsc::channel(16);
        let config = ServerConfig { reveal_interval: Duration::from_millis(10), ..test_config() };
        let (server, _url) = start_with(server_with(config).with_reveal_sink(sink)).await;
        let gateway = server.gateway().clone();

        let alice = Address::from_subject("alice");
        let bob = Address::from_subject("bob");
        for expected_id in 1..=3u64 {
            let reply = gateway.execute(Some(alice), ClientMessage::CreateMatch).await;
            assert!(matches!(reply, ServerMessage::MatchCreated { match_id } if match_id == expected_id));
            gateway.execute(Some(bob), ClientMessage::JoinMatch { match_id: expected_id }).await;
            for (who, mv) in [(alice, 0u8), (bob, 1u8)] {
                let input = gateway.with_registry(|r| r.fhe().encryptor().encrypt_u8(mv, &who)).await;
                gateway.execute(Some(who), ClientMessage::SubmitMove { match_id: expected_id, input }).await;
            }
            let reply = gateway.execute(Some(alice), ClientMessage::RequestReveal { match_id: expected_id }).await;
            assert!(matches!(reply, ServerMessage::Ok { .. }), "reveal failed: {:?}", reply);
        }

        let mut ids = Vec::new();
        while ids.len() < 3 {
            let request = tokio::time::timeout(Duration::from_secs(5), drained.recv())
                .await
                .expect("timed out waiting for drained reveal")
                .expect("sink closed");
            ids.push(request.match_id);
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(gateway.take_reveal_requests().await.is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_slot_reserved_before_handshake() {
        let config = ServerConfig { max_connections: 1, ..test_config() };
        let (server, url) = start_with(server_with(config)).await;

        let (first, _) = connect_async(url.as_str()).await.unwrap();
        assert_eq!(server.available_slots(), 0);

        let second = tokio::time::timeout(Duration::from_secs(5), connect_async(url.as_str())).await;
        assert!(matches!(second, Ok(Err(_))), "second connection should be refused");

        drop(first);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_auth_then_create_receives_reply_and_event() {
        let (server, url) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        ws.send(Message::Text(ClientMessage::CreateMatch.to_json().unwrap())).await.unwrap();
        match next_message(&mut ws).await {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::NotAuthenticated),
            other => panic!("Unexpected reply: {:?}", other),
        }

        ws.send(auth_message("alice")).await.unwrap();
        let alice = match next_message(&mut ws).await {
            ServerMessage::AuthResult(result) => {
                assert!(result.success);
                result.address.unwrap()
            }
            other => panic!("Unexpected reply: {:?}", other),
        };
        assert_eq!(alice, Address::from_subject("alice"));

        ws.send(Message::Text(ClientMessage::CreateMatch.to_json().unwrap())).await.unwrap();
        let mut saw_reply = false;
        let mut saw_event = false;
        while !(saw_reply && saw_event) {
            match next_message(&mut ws).await {
                ServerMessage::MatchCreated { match_id } => {
                    assert_eq!(match_id, 1);
                    saw_reply = true;
                }
                ServerMessage::Event { event } => {
                    assert_eq!(event.data, RegistryEventData::match_created(1, alice));
                    saw_event = true;
                }
                other => panic!("Unexpected message: {:?}", other),
            }
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_token_and_bad_frames() {
        let (server, url) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        let msg = ClientMessage::Auth(AuthRequest { token: "garbage".into(), client_version: "test".into() });
        ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
        match next_message(&mut ws).await {
            ServerMessage::AuthResult(result) => {
                assert!(!result.success);
                assert_eq!(result.code, Some(ErrorCode::InvalidToken));
                assert!(result.error.is_some());
            }
            other => panic!("Unexpected reply: {:?}", other),
        }

        ws.send(Message::Text("{\"type\":\"nonsense\"}".into())).await.unwrap();
        match next_message(&mut ws).await {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::InvalidInput),
            other => panic!("Unexpected reply: {:?}", other),
        }

        ws.send(Message::Binary(vec![0xff])).await.unwrap();
        match next_message(&mut ws).await {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::InvalidInput),
            other => panic!("Unexpected reply: {:?}", other),
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (server, url) = start().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        ws.send(Message::Text(ClientMessage::Ping { timestamp: 77 }.to_json().unwrap())).await.unwrap();
        match next_message(&mut ws).await {
            ServerMessage::Pong { timestamp, server_time } => {
                assert_eq!(timestamp, 77);
                assert!(server_time > 0);
            }
            other => panic!("Unexpected reply: {:?}", other),
        }

        server.shutdown();
    }
}
