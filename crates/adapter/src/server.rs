//! TCP host for a session
//!
//! Accepts players, runs the nickname handshake, and relays protocol lines.
//! A line from one client is parsed, handed to the local session as a
//! [`SessionEvent::Remote`], and forwarded verbatim to every other client.
//! Lines produced by the local session go to every seated client.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::discovery::{broadcast_addr, local_ipv4, run_beacon, Beacon};
use crate::protocol::parse_message;
use crate::session::{SessionConfig, SessionEvent};
use crate::types::{HANDSHAKE_INVALID_NICKNAME, HANDSHAKE_TIMEOUT_SECS, HANDSHAKE_WELCOME};

/// Address the host binds and advertises
pub fn advertised_host(config: &SessionConfig) -> Ipv4Addr {
    config
        .host
        .or_else(local_ipv4)
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Why a nickname was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Empty,
    HostNickname,
    Taken,
    Full,
}

/// Seated players
pub struct ServerState {
    config: SessionConfig,
    clients: RwLock<Vec<ClientHandle>>,
}

/// Handle to a seated client
pub struct ClientHandle {
    pub id: usize,
    pub nickname: String,
    pub addr: SocketAddr,
    pub tx: mpsc::UnboundedSender<String>,
}

impl ServerState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(Vec::new()),
        }
    }

    /// Seat a client, or say why not
    pub async fn admit(&self, handle: ClientHandle) -> Result<(), Refusal> {
        let nickname = handle.nickname.trim();
        if nickname.is_empty() {
            return Err(Refusal::Empty);
        }
        if nickname == self.config.nickname {
            return Err(Refusal::HostNickname);
        }
        let mut clients = self.clients.write().await;
        if clients.iter().any(|c| c.nickname == nickname) {
            return Err(Refusal::Taken);
        }
        if clients.len() >= self.config.players {
            return Err(Refusal::Full);
        }
        clients.push(handle);
        Ok(())
    }

    pub async fn remove(&self, id: usize) -> Option<String> {
        let mut clients = self.clients.write().await;
        let idx = clients.iter().position(|c| c.id == id)?;
        Some(clients.remove(idx).nickname)
    }

    pub async fn seated(&self) -> Vec<String> {
        self.clients
            .read()
            .await
            .iter()
            .map(|c| c.nickname.clone())
            .collect()
    }

    async fn broadcast(&self, line: &str, except: Option<usize>) {
        let clients = self.clients.read().await;
        for c in clients.iter().filter(|c| Some(c.id) != except) {
            let _ = c.tx.send(line.to_string());
        }
    }
}

/// Run the host until `shutdown` flips.
///
/// Binds `config.host:config.port` (port 0 picks a free one) and reports the
/// bound address through `ready_tx`. While seats are open and
/// `config.broadcast` is set, the session code is announced on the LAN;
/// `beacon_rx` lets the session suppress it.
pub async fn run_host(
    config: SessionConfig,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    mut line_rx: mpsc::UnboundedReceiver<String>,
    beacon_rx: watch::Receiver<bool>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let host = advertised_host(&config);
    let listener = TcpListener::bind(SocketAddrV4::new(host, config.port)).await?;
    let bound = listener.local_addr()?;
    info!(%bound, code = bound.port(), "session open");
    if let Some(tx) = ready_tx {
        let _ = tx.send(bound);
    }

    if config.broadcast {
        let beacon = Beacon::new(host, bound.port());
        let target = SocketAddr::V4(SocketAddrV4::new(broadcast_addr(host), bound.port()));
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_beacon(beacon, target, beacon_rx, shutdown).await {
                error!("beacon failed: {}", e);
            }
        });
    }

    let state = Arc::new(ServerState::new(config));
    let mut client_id_counter = 0usize;

    // Outbound dispatcher.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                state.broadcast(&line, None).await;
            }
        });
    }

    loop {
        let (socket, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };
        client_id_counter += 1;
        let client_id = client_id_counter;
        debug!(client_id, %addr, "connection accepted");

        let state = Arc::clone(&state);
        let event_tx = event_tx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, addr, client_id, state, event_tx, shutdown).await
            {
                warn!(client_id, "client error: {}", e);
            }
        });
    }

    info!("session closed");
    Ok(())
}

/// Handshake, then relay lines until the client goes away
async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    client_id: usize,
    state: Arc<ServerState>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = tokio::io::split(socket);
    let mut lines = BufReader::new(reader).lines();

    let Some(nickname) = read_nickname(&mut lines, client_id, &mut shutdown).await? else {
        return Ok(());
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = ClientHandle {
        id: client_id,
        nickname: nickname.clone(),
        addr,
        tx,
    };
    if let Err(refusal) = state.admit(handle).await {
        warn!(client_id, %nickname, ?refusal, "nickname refused");
        writer
            .write_all(format!("{HANDSHAKE_INVALID_NICKNAME}\n").as_bytes())
            .await?;
        writer.flush().await?;
        return Ok(());
    }
    writer
        .write_all(format!("{HANDSHAKE_WELCOME}\n").as_bytes())
        .await?;
    writer.flush().await?;
    info!(client_id, %nickname, %addr, "client seated");
    let _ = event_tx.send(SessionEvent::PeerJoined(nickname.clone()));

    let write_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let result = relay_lines(&mut lines, client_id, &state, &event_tx, &mut shutdown).await;

    state.remove(client_id).await;
    write_task.abort();
    info!(client_id, %nickname, "client left");
    let _ = event_tx.send(SessionEvent::PeerLeft(nickname));
    result
}

/// First line of a connection, or `None` if it never came
async fn read_nickname<R>(
    lines: &mut Lines<BufReader<R>>,
    client_id: usize,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    if *shutdown.borrow() {
        return Ok(None);
    }
    let deadline = tokio::time::sleep(Duration::from_secs(HANDSHAKE_TIMEOUT_SECS));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                return match line? {
                    Some(line) => Ok(Some(line.trim().to_string())),
                    None => {
                        debug!(client_id, "closed before handshake");
                        Ok(None)
                    }
                };
            }
            _ = &mut deadline => {
                warn!(client_id, "no nickname within {}s", HANDSHAKE_TIMEOUT_SECS);
                return Ok(None);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(None);
                }
            }
        }
    }
}

async fn relay_lines<R>(
    lines: &mut Lines<BufReader<R>>,
    client_id: usize,
    state: &ServerState,
    event_tx: &mpsc::UnboundedSender<SessionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_message(trimmed) {
            Ok(msg) => {
                debug!(client_id, command = msg.command(), "received");
                state.broadcast(trimmed, Some(client_id)).await;
                let _ = event_tx.send(SessionEvent::Remote(msg));
            }
            Err(e) => warn!(client_id, "dropping line: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        ServerState::new(SessionConfig {
            nickname: "host".into(),
            ..SessionConfig::default()
        })
    }

    fn handle(id: usize, nickname: &str) -> ClientHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ClientHandle {
            id,
            nickname: nickname.into(),
            addr: "127.0.0.1:1".parse().unwrap(),
            tx,
        }
    }

    #[tokio::test]
    async fn test_admit_rules() {
        let state = state();
        assert_eq!(state.admit(handle(1, "")).await, Err(Refusal::Empty));
        assert_eq!(state.admit(handle(1, "host")).await, Err(Refusal::HostNickname));
        assert_eq!(state.admit(handle(1, "bob")).await, Ok(()));
        assert_eq!(state.admit(handle(2, "bob")).await, Err(Refusal::Taken));
        assert_eq!(state.admit(handle(3, "carol")).await, Err(Refusal::Full));
        assert_eq!(state.seated().await, vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_frees_seat() {
        let state = state();
        state.admit(handle(1, "bob")).await.unwrap();
        assert_eq!(state.remove(1).await.as_deref(), Some("bob"));
        assert_eq!(state.remove(1).await, None);
        assert_eq!(state.admit(handle(2, "carol")).await, Ok(()));
    }

    #[tokio::test]
    async fn test_silent_connection_closed_on_shutdown() {
        use tokio::io::AsyncReadExt;

        let config = SessionConfig {
            host: Some(Ipv4Addr::LOCALHOST),
            port: 0,
            nickname: "host".into(),
            broadcast: false,
            ..SessionConfig::default()
        };
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_line_tx, line_rx) = mpsc::unbounded_channel();
        let (_beacon_tx, beacon_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let server = tokio::spawn(run_host(
            config,
            event_tx,
            line_rx,
            beacon_rx,
            Some(ready_tx),
            shutdown_rx,
        ));
        let addr = ready_rx.await.unwrap();

        let mut silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
            .await
            .expect("connection still open after shutdown");
        assert!(matches!(read, Ok(0) | Err(_)));

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_keeps_partial_line_across_wakeups() {
        use crate::engine::GameMessage;

        let (mut peer, socket) = tokio::io::duplex(256);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let relay = tokio::spawn(async move {
            let state = state();
            let mut lines = BufReader::new(socket).lines();
            relay_lines(&mut lines, 1, &state, &event_tx, &mut shutdown_rx).await
        });

        peer.write_all(br#"{"command":"score","#).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.write_all(b"\"score\":5}\n").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SessionEvent::Remote(GameMessage::Score { score: 5 }))
        );

        drop(peer);
        relay.await.unwrap().unwrap();
    }

    #[test]
    fn test_advertised_host_prefers_config() {
        let config = SessionConfig {
            host: Some(Ipv4Addr::new(10, 0, 0, 7)),
            ..SessionConfig::default()
        };
        assert_eq!(advertised_host(&config), Ipv4Addr::new(10, 0, 0, 7));
    }
}
