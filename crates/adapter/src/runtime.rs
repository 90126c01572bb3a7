//! Session runtime integration.
//!
//! Wires the transport to the session task. The async `start_*` functions
//! run inside an existing tokio runtime; [`SessionHandle`] owns its own
//! runtime for a synchronous front end.

use std::net::SocketAddr;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::client::{join, JoinError};
use crate::core::rng::clock_seed;
use crate::discovery::session_code;
use crate::engine::{GameController, Role};
use crate::protocol::parse_message;
use crate::server::run_host;
use crate::session::{run_session, LocalCommand, Session, SessionConfig, SessionEvent, SessionUpdate};

/// Channels into a running session
pub struct RunningSession {
    pub event_tx: mpsc::UnboundedSender<SessionEvent>,
    pub update_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    pub shutdown_tx: watch::Sender<bool>,
    /// Host: bound listening address
    pub addr: Option<SocketAddr>,
}

/// Open a hosted session and wait until it listens
pub async fn start_host(config: SessionConfig, seed: u32) -> anyhow::Result<RunningSession> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (beacon_tx, beacon_rx) = watch::channel(true);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ready_tx, ready_rx) = oneshot::channel();

    let server = tokio::spawn(run_host(
        config.clone(),
        event_tx.clone(),
        line_rx,
        beacon_rx,
        Some(ready_tx),
        shutdown_rx.clone(),
    ));
    let addr = match ready_rx.await {
        Ok(addr) => addr,
        Err(_) => {
            return Err(match server.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => anyhow!("host stopped before listening"),
                Err(e) => e.into(),
            })
        }
    };

    let controller = GameController::new(config.controller_config(Role::Host), seed);
    let session =
        Session::new(controller, config.players, Some(line_tx), update_tx).with_beacon(beacon_tx);
    tokio::spawn(run_session(session, event_rx, shutdown_rx));

    Ok(RunningSession {
        event_tx,
        update_rx,
        shutdown_tx,
        addr: Some(addr),
    })
}

/// Run a session over an already joined connection
pub fn start_client(
    config: &SessionConfig,
    stream: BufReader<TcpStream>,
    seed: u32,
) -> RunningSession {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (reader, mut writer) = tokio::io::split(stream);

    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    {
        let event_tx = event_tx.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                let read = tokio::select! {
                    read = lines.next_line() => read,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                        continue;
                    }
                };
                let line = match read {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("host connection failed: {}", e);
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_message(trimmed) {
                    Ok(msg) => {
                        debug!(command = msg.command(), "received");
                        let _ = event_tx.send(SessionEvent::Remote(msg));
                    }
                    Err(e) => warn!("dropping line: {}", e),
                }
            }
            let _ = event_tx.send(SessionEvent::ConnectionLost);
        });
    }

    let controller = GameController::new(config.controller_config(Role::Client), seed);
    let session = Session::new(controller, config.players, Some(line_tx), update_tx);
    tokio::spawn(run_session(session, event_rx, shutdown_rx));

    RunningSession {
        event_tx,
        update_rx,
        shutdown_tx,
        addr: None,
    }
}

/// A local game with no transport
pub fn start_solo(config: &SessionConfig, seed: u32) -> RunningSession {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = GameController::new(config.controller_config(Role::Host), seed);
    let session = Session::new(controller, 0, None, update_tx);
    tokio::spawn(run_session(session, event_rx, shutdown_rx));

    RunningSession {
        event_tx,
        update_rx,
        shutdown_tx,
        addr: None,
    }
}

/// Running session for a synchronous front end
pub struct SessionHandle {
    _rt: Runtime,
    running: RunningSession,
}

impl SessionHandle {
    /// Host a session; returns once the listener is bound
    pub fn host(config: SessionConfig) -> anyhow::Result<Self> {
        let rt = Runtime::new()?;
        let running = rt.block_on(start_host(config, clock_seed()))?;
        Ok(Self { _rt: rt, running })
    }

    /// Discover and join the session announcing `code`
    pub fn join(config: SessionConfig, code: &str) -> Result<Self, JoinError> {
        let rt = Runtime::new()?;
        let running = rt.block_on(async {
            let stream = join(code, &config.nickname, config.discovery_window).await?;
            Ok::<_, JoinError>(start_client(&config, stream, clock_seed()))
        })?;
        Ok(Self { _rt: rt, running })
    }

    pub fn solo(config: SessionConfig) -> anyhow::Result<Self> {
        let rt = Runtime::new()?;
        let running = {
            let _guard = rt.enter();
            start_solo(&config, clock_seed())
        };
        Ok(Self { _rt: rt, running })
    }

    /// Session code to share with the other player (host only)
    pub fn session_code(&self) -> Option<String> {
        self.running.addr.map(|a| session_code(a.port()))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.addr
    }

    pub fn send(&self, cmd: LocalCommand) {
        let _ = self.running.event_tx.send(SessionEvent::Local(cmd));
    }

    pub fn try_recv(&mut self) -> Option<SessionUpdate> {
        self.running.update_rx.try_recv().ok()
    }

    pub fn shutdown(&self) {
        let _ = self.running.shutdown_tx.send(true);
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
