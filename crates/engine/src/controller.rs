//! Game controller - turn order, scoring, clocks and peer replication
//!
//! One controller runs on each peer and owns that peer's copy of the board.
//! Local actions are resolved on the local board and queued as
//! [`GameMessage`]s for the peer; peer messages replace the local copy with
//! the sender's result instead of recomputing it, so whichever engine made a
//! random decision stays authoritative for it.
//!
//! The controller performs no I/O. Owners drain [`GameController::drain_outbound`]
//! into the transport and [`GameController::drain_events`] into the UI after
//! every call.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{
    Board, BoardMatrix, BonusPlacement, Fall, MatchOutcome, MatrixError, Refill, SimpleRng, Spawn,
    SwapOutcome,
};
use crate::message::GameMessage;
use crate::scoring::{decide_winner, points_for};
use crate::types::{
    GameMode, Pos, TieBreak, DEFAULT_TIME_LIMIT_SECS, SCORE_TARGET, TIME_LIMIT_MAX_SECS,
    TIME_LIMIT_MIN_SECS,
};

/// Which side of the session this controller runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub nickname: String,
    pub role: Role,
    pub mode: GameMode,
    pub time_limit: u32,
    pub tie_break: TieBreak,
    pub score_target: u32,
}

impl ControllerConfig {
    pub fn new(nickname: impl Into<String>, role: Role) -> Self {
        Self {
            nickname: nickname.into(),
            role,
            mode: GameMode::Chess,
            time_limit: DEFAULT_TIME_LIMIT_SECS,
            tie_break: TieBreak::Draw,
            score_target: SCORE_TARGET,
        }
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_time_limit(mut self, secs: u32) -> Self {
        self.time_limit = secs.clamp(TIME_LIMIT_MIN_SECS, TIME_LIMIT_MAX_SECS);
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

/// Why a session ended abnormally
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCause {
    /// Client side: the host connection dropped
    ServerLost,
    /// Host side: this player disconnected
    PlayerLeft(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    WaitingToStart,
    InProgress,
    Finished(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ended { winner: Option<String>, score: u32 },
    Error(ErrorCause),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("game already started")]
    AlreadyStarted,
    #[error("only the host can start a game")]
    NotHost,
    #[error("game is not in progress")]
    NotInProgress,
    #[error("local player already finished")]
    AlreadyFinished,
    #[error("not your turn (current player: {0})")]
    NotYourTurn(String),
    #[error("position ({}, {}) is off the board", .0.row, .0.col)]
    OutOfBounds(Pos),
    #[error("cells ({}, {}) and ({}, {}) are not adjacent", .0.row, .0.col, .1.row, .1.col)]
    NotAdjacent(Pos, Pos),
    #[error("a game needs at least one player")]
    NoPlayers,
    #[error("bad board from peer: {0}")]
    Matrix(#[from] MatrixError),
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    StartGame,
    /// A peer's swap was replayed onto the local board
    Swap {
        a: Pos,
        b: Pos,
        success: bool,
        removed: Vec<Pos>,
        bonuses: Vec<BonusPlacement>,
    },
    /// A peer's refill (and, for cascade rounds, its match) was replayed
    AutoSwap {
        fallen: Vec<Fall>,
        spawned: Vec<Spawn>,
        removed: Vec<Pos>,
        bonuses: Vec<BonusPlacement>,
    },
    OpponentBoard,
    OpponentScore(u32),
    OpponentTime(u32),
    OpponentFinished(u32),
    EndGame { winner: Option<String>, score: u32 },
    Error(ErrorCause),
}

/// One refill round of a local turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeStep {
    /// Spontaneous match cleared before this refill; `None` for the first refill
    pub matched: Option<MatchOutcome>,
    pub refill: Refill,
    pub board: BoardMatrix,
}

/// Everything a local swap did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub swap: SwapOutcome,
    /// Board right after the swap, before gravity
    pub swap_board: BoardMatrix,
    pub cascades: Vec<CascadeStep>,
    pub points: u32,
}

#[derive(Debug, Clone)]
pub struct GameController {
    config: ControllerConfig,
    phase: Phase,
    rng: SimpleRng,
    queue: Vec<String>,
    current: String,
    nicknames: Vec<String>,
    board: Option<Board>,
    opponent_board: Option<BoardMatrix>,
    score: u32,
    opponent_score: u32,
    elapsed: u32,
    opponent_elapsed: u32,
    finished_locally: bool,
    opponent_finished: bool,
    opponent_finished_first: bool,
    outbound: VecDeque<GameMessage>,
    events: VecDeque<ControllerEvent>,
}

impl GameController {
    pub fn new(config: ControllerConfig, seed: u32) -> Self {
        Self {
            config,
            phase: Phase::WaitingToStart,
            rng: SimpleRng::new(seed),
            queue: Vec::new(),
            current: String::new(),
            nicknames: Vec::new(),
            board: None,
            opponent_board: None,
            score: 0,
            opponent_score: 0,
            elapsed: 0,
            opponent_elapsed: 0,
            finished_locally: false,
            opponent_finished: false,
            opponent_finished_first: false,
            outbound: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.config.nickname
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn time_limit(&self) -> u32 {
        self.config.time_limit
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn in_progress(&self) -> bool {
        self.phase == Phase::InProgress
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn current_player(&self) -> &str {
        &self.current
    }

    pub fn nicknames(&self) -> &[String] {
        &self.nicknames
    }

    pub fn opponent_nickname(&self) -> Option<&str> {
        self.nicknames
            .iter()
            .map(String::as_str)
            .find(|n| *n != self.config.nickname)
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    /// Read-only mirror of the opponent's board (time mode)
    pub fn opponent_board(&self) -> Option<&BoardMatrix> {
        self.opponent_board.as_ref()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn opponent_score(&self) -> u32 {
        self.opponent_score
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn opponent_elapsed(&self) -> u32 {
        self.opponent_elapsed
    }

    pub fn finished_locally(&self) -> bool {
        self.finished_locally
    }

    /// Whether local input may act right now
    ///
    /// Time mode lets every player act at all times; chess mode only the
    /// current player.
    pub fn is_my_step(&self) -> bool {
        if !self.in_progress() || self.finished_locally {
            return false;
        }
        match self.config.mode {
            GameMode::Time => true,
            GameMode::Chess => self.current == self.config.nickname,
        }
    }

    /// Messages waiting for the transport
    pub fn drain_outbound(&mut self) -> Vec<GameMessage> {
        self.outbound.drain(..).collect()
    }

    /// Events waiting for the presentation layer
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        self.events.drain(..).collect()
    }

    /// Start a game as the authority: shuffle turn order, create the board
    /// and announce both to the peers.
    pub fn new_game(&mut self, players: &[String]) -> Result<(), ControllerError> {
        if self.phase != Phase::WaitingToStart {
            return Err(ControllerError::AlreadyStarted);
        }
        if players.is_empty() {
            return Err(ControllerError::NoPlayers);
        }

        self.nicknames = players.to_vec();
        self.queue = players.to_vec();
        self.rng.shuffle(&mut self.queue);
        self.current = self.queue[0].clone();

        let board = Board::new(self.rng.next_u32());
        let matrix = board.to_matrix();
        self.board = Some(board);
        self.begin();

        info!(
            mode = self.config.mode.as_str(),
            queue = ?self.queue,
            "new game"
        );
        self.outbound.push_back(GameMessage::StartGame {
            mode: self.config.mode,
            queue: self.queue.clone(),
            current: self.current.clone(),
            nicknames: self.nicknames.clone(),
            board: matrix,
            time_limit: self.config.time_limit,
        });
        self.events.push_back(ControllerEvent::StartGame);
        Ok(())
    }

    /// Resolve a local swap, including every cascade it causes.
    ///
    /// Rejected swaps (no run, no bonus) leave the board and turn unchanged
    /// and are not sent anywhere.
    pub fn local_swap(&mut self, a: Pos, b: Pos) -> Result<TurnReport, ControllerError> {
        if !self.in_progress() {
            return Err(ControllerError::NotInProgress);
        }
        if self.finished_locally {
            return Err(ControllerError::AlreadyFinished);
        }
        if !self.is_my_step() {
            return Err(ControllerError::NotYourTurn(self.current.clone()));
        }
        for p in [a, b] {
            if !p.in_bounds() {
                return Err(ControllerError::OutOfBounds(p));
            }
        }
        if !a.is_adjacent(b) {
            return Err(ControllerError::NotAdjacent(a, b));
        }
        let board = self.board.as_mut().ok_or(ControllerError::NotInProgress)?;

        let swap = board.swap(a, b);
        let swap_board = board.to_matrix();
        if !swap.success {
            debug!(?a, ?b, "swap rejected");
            return Ok(TurnReport {
                swap,
                swap_board,
                cascades: Vec::new(),
                points: 0,
            });
        }

        let points = points_for(&swap);
        let mut cascades = Vec::new();
        let refill = board.collapse_and_fill();
        cascades.push(CascadeStep {
            matched: None,
            refill,
            board: board.to_matrix(),
        });
        while board.step() {
            let matched = board.get_auto_matched();
            let refill = board.collapse_and_fill();
            cascades.push(CascadeStep {
                matched: Some(matched),
                refill,
                board: board.to_matrix(),
            });
        }

        let report = TurnReport {
            swap,
            swap_board,
            cascades,
            points,
        };
        self.publish_turn(a, b, &report);
        Ok(report)
    }

    /// Advance the local clock by one second (time mode only)
    pub fn tick_clock(&mut self) {
        if self.config.mode != GameMode::Time || !self.in_progress() || self.finished_locally {
            return;
        }
        self.elapsed += 1;
        self.outbound
            .push_back(GameMessage::Time { time: self.elapsed });
        if self.elapsed > self.config.time_limit {
            info!(elapsed = self.elapsed, "time limit reached");
            self.finish();
        }
    }

    /// Stop playing locally.
    ///
    /// If the opponent already finished the result is decided here and
    /// announced; otherwise the local score is announced and the controller
    /// waits for the opponent.
    pub fn finish(&mut self) {
        if !self.in_progress() || self.finished_locally {
            return;
        }
        self.finished_locally = true;
        self.opponent_finished_first = self.opponent_finished;
        if self.opponent_finished {
            self.compute_and_end_game();
        } else {
            info!(score = self.score, "finished, waiting for opponent");
            self.outbound
                .push_back(GameMessage::Finish { score: self.score });
        }
    }

    /// Transport failure: the session is over regardless of mode
    pub fn handle_error(&mut self, cause: ErrorCause) {
        if matches!(self.phase, Phase::Finished(Outcome::Ended { .. })) {
            debug!(?cause, "connection closed after game end");
            return;
        }
        warn!(?cause, "session failed");
        self.phase = Phase::Finished(Outcome::Error(cause.clone()));
        self.events.push_back(ControllerEvent::Error(cause));
    }

    /// Apply a message from the peer
    pub fn handle_message(&mut self, msg: GameMessage) -> Result<(), ControllerError> {
        debug!(command = msg.command(), "applying peer message");
        match msg {
            GameMessage::StartGame {
                mode,
                queue,
                current,
                nicknames,
                board,
                time_limit,
            } => {
                if self.phase != Phase::WaitingToStart {
                    return Err(ControllerError::AlreadyStarted);
                }
                let seed = self.rng.next_u32();
                self.board = Some(Board::from_matrix(&board, seed)?);
                let clamped = time_limit.clamp(TIME_LIMIT_MIN_SECS, TIME_LIMIT_MAX_SECS);
                if clamped != time_limit {
                    warn!(time_limit, clamped, "peer time limit out of range");
                }
                self.config.mode = mode;
                self.config.time_limit = clamped;
                self.queue = queue;
                self.current = current;
                self.nicknames = nicknames;
                self.begin();
                self.events.push_back(ControllerEvent::StartGame);
            }
            GameMessage::Swap {
                a,
                b,
                next_player,
                board,
                success,
                removed,
                bonuses,
            } => {
                self.require_in_progress()?;
                if success {
                    self.replace_board(&board)?;
                }
                self.current = next_player;
                self.events.push_back(ControllerEvent::Swap {
                    a,
                    b,
                    success,
                    removed,
                    bonuses,
                });
            }
            GameMessage::AutoSwap {
                fallen,
                spawned,
                board,
            } => {
                self.require_in_progress()?;
                self.replace_board(&board)?;
                self.events.push_back(ControllerEvent::AutoSwap {
                    fallen,
                    spawned,
                    removed: Vec::new(),
                    bonuses: Vec::new(),
                });
            }
            GameMessage::AutoSwapCircle {
                fallen,
                removed,
                spawned,
                bonuses,
                board,
            } => {
                self.require_in_progress()?;
                self.replace_board(&board)?;
                self.events.push_back(ControllerEvent::AutoSwap {
                    fallen,
                    spawned,
                    removed,
                    bonuses,
                });
            }
            GameMessage::Board { board } => {
                board.decode()?;
                self.opponent_board = Some(board);
                self.events.push_back(ControllerEvent::OpponentBoard);
            }
            GameMessage::Score { score } => {
                self.opponent_score = score;
                self.events.push_back(ControllerEvent::OpponentScore(score));
            }
            GameMessage::Time { time } => {
                self.opponent_elapsed = time;
                self.events.push_back(ControllerEvent::OpponentTime(time));
            }
            GameMessage::Finish { score } => {
                self.opponent_finished = true;
                self.opponent_score = score;
                self.events.push_back(ControllerEvent::OpponentFinished(score));
                // Both sides finished before hearing from each other: the host decides.
                if self.finished_locally && self.in_progress() && self.config.role == Role::Host {
                    self.compute_and_end_game();
                }
            }
            GameMessage::EndGame { winner, score } => {
                if self.is_finished() {
                    return Ok(());
                }
                self.end_game(winner, score);
            }
        }
        Ok(())
    }

    fn begin(&mut self) {
        self.phase = Phase::InProgress;
        self.score = 0;
        self.opponent_score = 0;
        self.elapsed = 0;
        self.opponent_elapsed = 0;
        self.finished_locally = false;
        self.opponent_finished = false;
        self.opponent_finished_first = false;
    }

    fn require_in_progress(&self) -> Result<(), ControllerError> {
        if self.in_progress() {
            Ok(())
        } else {
            Err(ControllerError::NotInProgress)
        }
    }

    fn replace_board(&mut self, matrix: &BoardMatrix) -> Result<(), ControllerError> {
        match self.board.as_mut() {
            Some(board) => board.replace_from_matrix(matrix)?,
            None => self.board = Some(Board::from_matrix(matrix, self.rng.next_u32())?),
        }
        Ok(())
    }

    fn next_player(&self) -> String {
        let idx = self
            .queue
            .iter()
            .position(|p| *p == self.current)
            .map(|i| (i + 1) % self.queue.len())
            .unwrap_or(0);
        self.queue.get(idx).cloned().unwrap_or_default()
    }

    fn publish_turn(&mut self, a: Pos, b: Pos, report: &TurnReport) {
        self.score += report.points;

        match self.config.mode {
            GameMode::Chess => {
                self.current = self.next_player();
                self.outbound.push_back(GameMessage::Swap {
                    a,
                    b,
                    next_player: self.current.clone(),
                    board: report.swap_board.clone(),
                    success: true,
                    removed: report.swap.removed.iter().copied().collect(),
                    bonuses: report.swap.bonuses.clone(),
                });
                for step in &report.cascades {
                    let msg = match &step.matched {
                        None => GameMessage::AutoSwap {
                            fallen: step.refill.fallen.clone(),
                            spawned: step.refill.spawned.clone(),
                            board: step.board.clone(),
                        },
                        Some(matched) => GameMessage::AutoSwapCircle {
                            fallen: step.refill.fallen.clone(),
                            removed: matched.removed.iter().copied().collect(),
                            spawned: step.refill.spawned.clone(),
                            bonuses: matched.bonuses.clone(),
                            board: step.board.clone(),
                        },
                    };
                    self.outbound.push_back(msg);
                }
            }
            GameMode::Time => {
                for step in &report.cascades {
                    self.outbound.push_back(GameMessage::Board {
                        board: step.board.clone(),
                    });
                }
                self.outbound
                    .push_back(GameMessage::Score { score: self.score });
                if self.score > self.config.score_target {
                    info!(score = self.score, "score target reached");
                    self.finish();
                }
            }
        }
    }

    fn compute_and_end_game(&mut self) {
        let verdict = decide_winner(
            &self.config.nickname,
            self.score,
            self.opponent_nickname(),
            self.opponent_score,
            self.opponent_finished_first,
            self.config.tie_break,
        );
        self.outbound.push_back(GameMessage::EndGame {
            winner: verdict.winner.clone(),
            score: verdict.score,
        });
        self.end_game(verdict.winner, verdict.score);
    }

    fn end_game(&mut self, winner: Option<String>, score: u32) {
        info!(?winner, score, "game over");
        self.phase = Phase::Finished(Outcome::Ended {
            winner: winner.clone(),
            score,
        });
        self.events
            .push_back(ControllerEvent::EndGame { winner, score });
    }
}
