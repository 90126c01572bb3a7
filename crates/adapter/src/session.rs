//! Session task - the single owner of a peer's game controller
//!
//! Local input, peer messages, connection changes and clock ticks all arrive
//! as [`SessionEvent`]s on one channel and are applied in order by
//! [`run_session`]. Nothing else touches the controller, so a local swap and a
//! peer update can never interleave.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::engine::{
    ControllerConfig, ControllerError, ControllerEvent, ErrorCause, GameController, GameMessage,
    Phase, Role, TurnReport,
};
use crate::protocol::encode_message;
use crate::types::{
    GameMode, Pos, TieBreak, CLOCK_TICK_SECS, DEFAULT_PORT, DEFAULT_TIME_LIMIT_SECS,
    DISCOVERY_WINDOW_SECS, TIME_LIMIT_MAX_SECS, TIME_LIMIT_MIN_SECS,
};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Address to bind and advertise; `None` picks the LAN address
    pub host: Option<Ipv4Addr>,
    /// Listening port, which is also the session code
    pub port: u16,
    pub nickname: String,
    pub mode: GameMode,
    pub time_limit: u32,
    pub tie_break: TieBreak,
    /// Opponents the host waits for
    pub players: usize,
    pub discovery_window: Duration,
    /// Host announces its session code on the LAN
    pub broadcast: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            nickname: "player".to_string(),
            mode: GameMode::Chess,
            time_limit: DEFAULT_TIME_LIMIT_SECS,
            tie_break: TieBreak::Draw,
            players: 1,
            discovery_window: Duration::from_secs(DISCOVERY_WINDOW_SECS),
            broadcast: true,
        }
    }
}

impl SessionConfig {
    /// Create from `MATCH3_*` environment variables
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();
        let var = |name: &str| {
            env::var(name)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let host = var("MATCH3_HOST").and_then(|s| s.parse().ok());
        let port = var("MATCH3_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);
        let nickname = var("MATCH3_NICKNAME").unwrap_or(defaults.nickname);
        let mode = var("MATCH3_MODE")
            .and_then(|s| GameMode::from_str(&s))
            .unwrap_or(defaults.mode);
        let time_limit = var("MATCH3_TIME_LIMIT")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.time_limit)
            .clamp(TIME_LIMIT_MIN_SECS, TIME_LIMIT_MAX_SECS);
        let tie_break = var("MATCH3_TIE_BREAK")
            .and_then(|s| TieBreak::from_str(&s))
            .unwrap_or(defaults.tie_break);
        if let Some(n) = var("MATCH3_PLAYERS")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n != defaults.players)
        {
            warn!(requested = n, "only one opponent per session is supported");
        }
        let discovery_window = var("MATCH3_DISCOVERY_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.discovery_window);

        Self {
            host,
            port,
            nickname,
            mode,
            time_limit,
            tie_break,
            players: defaults.players,
            discovery_window,
            broadcast: defaults.broadcast,
        }
    }

    pub fn controller_config(&self, role: Role) -> ControllerConfig {
        ControllerConfig::new(self.nickname.clone(), role)
            .with_mode(self.mode)
            .with_time_limit(self.time_limit)
            .with_tie_break(self.tie_break)
    }
}

/// Input from the local player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    /// Host only: deal the board to everyone in the lobby
    Start,
    Swap(Pos, Pos),
    /// Stop playing and announce the score
    Finish,
}

/// Everything the session task reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Local(LocalCommand),
    Remote(GameMessage),
    PeerJoined(String),
    PeerLeft(String),
    /// Client side: the host connection closed
    ConnectionLost,
}

/// Output for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Host: nicknames currently seated
    Lobby(Vec<String>),
    /// A local swap and its cascades
    Turn(TurnReport),
    Controller(ControllerEvent),
    /// Local command refused
    Rejected(String),
    /// Snapshot after each applied event
    Status(Status),
}

/// Summary of controller state for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub my_step: bool,
    pub current_player: String,
    pub score: u32,
    pub opponent_score: u32,
    pub elapsed: u32,
    pub board: Option<crate::core::BoardMatrix>,
}

/// Owned session state, driven by [`run_session`]
pub struct Session {
    controller: GameController,
    seats: usize,
    lobby: Vec<String>,
    lines: Option<mpsc::UnboundedSender<String>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    beacon: Option<watch::Sender<bool>>,
}

impl Session {
    pub fn new(
        controller: GameController,
        seats: usize,
        lines: Option<mpsc::UnboundedSender<String>>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Self {
        Self {
            controller,
            seats,
            lobby: Vec::new(),
            lines,
            updates,
            beacon: None,
        }
    }

    /// Host: seat changes toggle the discovery beacon
    pub fn with_beacon(mut self, beacon: watch::Sender<bool>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    pub fn controller(&self) -> &GameController {
        &self.controller
    }

    pub fn lobby(&self) -> &[String] {
        &self.lobby
    }

    /// Apply one event, then flush messages and updates
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Local(cmd) => self.apply_local(cmd),
            SessionEvent::Remote(msg) => {
                let command = msg.command();
                if let Err(e) = self.controller.handle_message(msg) {
                    warn!(command, "dropping peer message: {}", e);
                }
            }
            SessionEvent::PeerJoined(nickname) => {
                info!(%nickname, "player joined");
                self.lobby.push(nickname);
                self.publish_lobby();
            }
            SessionEvent::PeerLeft(nickname) => {
                self.lobby.retain(|n| *n != nickname);
                if self.controller.phase() == &Phase::WaitingToStart {
                    info!(%nickname, "player left the lobby");
                    self.publish_lobby();
                } else {
                    error!(%nickname, "player left during the game");
                    self.controller.handle_error(ErrorCause::PlayerLeft(nickname));
                }
            }
            SessionEvent::ConnectionLost => {
                self.controller.handle_error(ErrorCause::ServerLost);
            }
        }
        self.flush();
    }

    /// One clock second
    pub fn tick(&mut self) {
        if self.controller.mode() == GameMode::Time && self.controller.in_progress() {
            self.controller.tick_clock();
            self.flush();
        }
    }

    fn apply_local(&mut self, cmd: LocalCommand) {
        let result = match cmd {
            LocalCommand::Start => self.start(),
            LocalCommand::Swap(a, b) => self.controller.local_swap(a, b).map(|report| {
                if !report.swap.success {
                    let _ = self
                        .updates
                        .send(SessionUpdate::Rejected("no match".to_string()));
                }
                let _ = self.updates.send(SessionUpdate::Turn(report));
            }),
            LocalCommand::Finish => {
                if self.controller.in_progress() {
                    self.controller.finish();
                    Ok(())
                } else {
                    Err(ControllerError::NotInProgress)
                }
            }
        };
        if let Err(e) = result {
            debug!(?cmd, "local command refused: {}", e);
            let _ = self.updates.send(SessionUpdate::Rejected(e.to_string()));
        }
    }

    fn start(&mut self) -> Result<(), ControllerError> {
        if self.controller.role() != Role::Host {
            return Err(ControllerError::NotHost);
        }
        let mut players = vec![self.controller.nickname().to_string()];
        players.extend(self.lobby.iter().cloned());
        self.controller.new_game(&players)?;
        if let Some(beacon) = &self.beacon {
            let _ = beacon.send(false);
        }
        Ok(())
    }

    fn publish_lobby(&mut self) {
        if let Some(beacon) = &self.beacon {
            let open = self.controller.phase() == &Phase::WaitingToStart
                && self.lobby.len() < self.seats;
            let _ = beacon.send(open);
        }
        let _ = self.updates.send(SessionUpdate::Lobby(self.lobby.clone()));
    }

    fn flush(&mut self) {
        for msg in self.controller.drain_outbound() {
            let Some(lines) = &self.lines else {
                continue;
            };
            match encode_message(&msg) {
                Ok(line) => {
                    debug!(command = msg.command(), "sending");
                    let _ = lines.send(line);
                }
                Err(e) => error!(command = msg.command(), "encode failed: {}", e),
            }
        }
        for event in self.controller.drain_events() {
            let _ = self.updates.send(SessionUpdate::Controller(event));
        }
        let _ = self.updates.send(SessionUpdate::Status(self.status()));
    }

    fn status(&self) -> Status {
        Status {
            phase: self.controller.phase().clone(),
            my_step: self.controller.is_my_step(),
            current_player: self.controller.current_player().to_string(),
            score: self.controller.score(),
            opponent_score: self.controller.opponent_score(),
            elapsed: self.controller.elapsed(),
            board: self.controller.board().map(|b| b.to_matrix()),
        }
    }
}

/// Drive `session` until the event channel closes or `shutdown` flips
pub async fn run_session(
    mut session: Session,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clock = tokio::time::interval(Duration::from_secs(CLOCK_TICK_SECS));
    clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    clock.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => session.apply(event),
                    None => break,
                }
            }
            _ = clock.tick() => session.tick(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("session task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_message;

    fn host_session(
        mode: GameMode,
    ) -> (
        Session,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<SessionUpdate>,
    ) {
        let config = SessionConfig {
            nickname: "alice".into(),
            mode,
            ..SessionConfig::default()
        };
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let controller = GameController::new(config.controller_config(Role::Host), 11);
        (
            Session::new(controller, config.players, Some(line_tx), update_tx),
            line_rx,
            update_rx,
        )
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.players, 1);
        assert_eq!(config.mode, GameMode::Chess);
        assert_eq!(config.time_limit, 60);
    }

    #[test]
    fn test_start_deals_to_lobby() {
        let (mut session, mut lines, _updates) = host_session(GameMode::Chess);
        session.apply(SessionEvent::PeerJoined("bob".into()));
        session.apply(SessionEvent::Local(LocalCommand::Start));

        let line = lines.try_recv().unwrap();
        let GameMessage::StartGame { nicknames, .. } = parse_message(&line).unwrap() else {
            panic!("expected start_game");
        };
        assert_eq!(nicknames, vec!["alice".to_string(), "bob".to_string()]);
        assert!(session.controller().in_progress());
    }

    #[test]
    fn test_beacon_follows_seats() {
        let (session, _lines, _updates) = host_session(GameMode::Chess);
        let (beacon_tx, beacon_rx) = watch::channel(true);
        let mut session = session.with_beacon(beacon_tx);

        session.apply(SessionEvent::PeerJoined("bob".into()));
        assert!(!*beacon_rx.borrow());
        session.apply(SessionEvent::PeerLeft("bob".into()));
        assert!(*beacon_rx.borrow());
        assert!(session.lobby().is_empty());
    }

    #[test]
    fn test_leaving_mid_game_is_an_error() {
        let (mut session, _lines, mut updates) = host_session(GameMode::Chess);
        session.apply(SessionEvent::PeerJoined("bob".into()));
        session.apply(SessionEvent::Local(LocalCommand::Start));
        session.apply(SessionEvent::PeerLeft("bob".into()));

        let mut saw_error = false;
        while let Ok(update) = updates.try_recv() {
            if update
                == SessionUpdate::Controller(ControllerEvent::Error(ErrorCause::PlayerLeft(
                    "bob".into(),
                )))
            {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_client_cannot_start() {
        let (update_tx, mut updates) = mpsc::unbounded_channel();
        let controller =
            GameController::new(SessionConfig::default().controller_config(Role::Client), 1);
        let mut session = Session::new(controller, 1, None, update_tx);
        session.apply(SessionEvent::Local(LocalCommand::Start));
        assert!(matches!(updates.try_recv(), Ok(SessionUpdate::Rejected(_))));
    }

    #[test]
    fn test_bad_peer_message_is_dropped() {
        let (mut session, mut lines, _updates) = host_session(GameMode::Chess);
        session.apply(SessionEvent::Remote(GameMessage::Score { score: 3 }));
        session.apply(SessionEvent::Remote(GameMessage::Swap {
            a: Pos::new(0, 0),
            b: Pos::new(0, 1),
            next_player: "alice".into(),
            board: Default::default(),
            success: true,
            removed: Vec::new(),
            bonuses: Vec::new(),
        }));
        assert!(lines.try_recv().is_err());
        assert_eq!(session.controller().opponent_score(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_ticks_in_time_mode() {
        let (mut session, mut lines, _updates) = host_session(GameMode::Time);
        session.apply(SessionEvent::Local(LocalCommand::Start));
        assert!(lines.try_recv().is_ok());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(session, event_rx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        drop(event_tx);

        let mut times = Vec::new();
        while let Ok(line) = lines.try_recv() {
            if let Ok(GameMessage::Time { time }) = parse_message(&line) {
                times.push(time);
            }
        }
        assert_eq!(times, vec![1, 2, 3]);
    }
}
