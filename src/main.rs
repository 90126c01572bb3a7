//! Match-3 duel runner (default binary).
//!
//! A line-oriented front end: the board is printed as its matrix codes and
//! moves are typed as `swap <row> <col> <row> <col>`.

use std::io::BufRead;
use std::net::Ipv4Addr;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use match3_duel::adapter::{LocalCommand, SessionConfig, SessionHandle, SessionUpdate, Status};
use match3_duel::core::BoardMatrix;
use match3_duel::engine::{ControllerEvent, ErrorCause};
use match3_duel::types::{GameMode, Pos, TieBreak};

const POLL_MS: u64 = 50;

/// Two-player LAN match-3
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Player nickname (overrides MATCH3_NICKNAME)
    #[arg(short, long, global = true)]
    nickname: Option<String>,
    /// Game mode: chess or time (overrides MATCH3_MODE)
    #[arg(short, long, global = true, value_parser = parse_mode)]
    mode: Option<GameMode>,
    /// Time mode limit in seconds, 20 to 999 (overrides MATCH3_TIME_LIMIT)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(20..=999))]
    time_limit: Option<u32>,
    /// Equal-score rule: draw or first_finisher (overrides MATCH3_TIE_BREAK)
    #[arg(long, global = true, value_parser = parse_tie_break)]
    tie_break: Option<TieBreak>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a session and wait for an opponent
    Host {
        /// Listening port, also the session code
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind and advertise
        #[arg(long)]
        host: Option<Ipv4Addr>,
        /// Do not announce the session on the LAN
        #[arg(long)]
        no_broadcast: bool,
    },
    /// Join a session by its code
    Join {
        code: String,
        /// Seconds to wait for the host's beacon
        #[arg(long)]
        discovery_secs: Option<u64>,
    },
    /// Play alone on a local board
    Solo,
}

fn parse_mode(s: &str) -> Result<GameMode, String> {
    GameMode::from_str(s).ok_or_else(|| format!("unknown mode {s:?} (chess or time)"))
}

fn parse_tie_break(s: &str) -> Result<TieBreak, String> {
    TieBreak::from_str(s).ok_or_else(|| format!("unknown tie break {s:?} (draw or first_finisher)"))
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env();
    if let Some(nickname) = cli.nickname {
        config.nickname = nickname;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(secs) = cli.time_limit {
        config.time_limit = secs;
    }
    if let Some(tie_break) = cli.tie_break {
        config.tie_break = tie_break;
    }

    let handle = match cli.command {
        Command::Host {
            port,
            host,
            no_broadcast,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if host.is_some() {
                config.host = host;
            }
            config.broadcast = !no_broadcast;
            let handle = SessionHandle::host(config)?;
            if let Some(code) = handle.session_code() {
                println!("Session code: {code}");
            }
            println!("Waiting for an opponent; type `start` once they have joined.");
            handle
        }
        Command::Join {
            code,
            discovery_secs,
        } => {
            if let Some(secs) = discovery_secs {
                config.discovery_window = Duration::from_secs(secs);
            }
            println!("Looking for session {code}...");
            let handle = SessionHandle::join(config, &code)?;
            println!("Connected. Waiting for the host to start.");
            handle
        }
        Command::Solo => {
            let handle = SessionHandle::solo(config)?;
            handle.send(LocalCommand::Start);
            handle
        }
    };

    run(handle, spawn_stdin())
}

fn spawn_stdin() -> Receiver<String> {
    let (tx, rx) = channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn run(mut handle: SessionHandle, input: Receiver<String>) -> Result<()> {
    let mut shown_board: Option<BoardMatrix> = None;
    let mut last_status: Option<Status> = None;

    loop {
        match input.try_recv() {
            Ok(line) => match parse_input(&line) {
                Some(Input::Quit) => break,
                Some(Input::Command(cmd)) => handle.send(cmd),
                Some(Input::Board) => {
                    if let Some(board) = &shown_board {
                        print_board(board);
                    }
                }
                Some(Input::Help) => print_help(),
                None if line.trim().is_empty() => {}
                None => println!("Unrecognized input; type `help`."),
            },
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        while let Some(update) = handle.try_recv() {
            match update {
                SessionUpdate::Lobby(players) => println!("Players seated: {players:?}"),
                SessionUpdate::Rejected(reason) => println!("Rejected: {reason}"),
                SessionUpdate::Turn(report) if report.swap.success => {
                    println!(
                        "Cleared {} cells in {} refill(s), +{} points",
                        report.swap.removed.len(),
                        report.cascades.len(),
                        report.points
                    );
                }
                SessionUpdate::Turn(_) => {}
                SessionUpdate::Controller(event) => {
                    if describe(&event) {
                        return Ok(());
                    }
                }
                SessionUpdate::Status(status) => {
                    if status.board.is_some() && status.board != shown_board {
                        shown_board = status.board.clone();
                        if let Some(board) = &shown_board {
                            print_board(board);
                        }
                    }
                    let turn_changed = last_status.as_ref().map(|s| s.my_step) != Some(status.my_step);
                    if turn_changed && status.my_step {
                        println!("Your move. Score {} vs {}", status.score, status.opponent_score);
                    }
                    last_status = Some(status);
                }
            }
        }

        std::thread::sleep(Duration::from_millis(POLL_MS));
    }

    handle.shutdown();
    Ok(())
}

/// Print an event; returns true when the session is over
fn describe(event: &ControllerEvent) -> bool {
    match event {
        ControllerEvent::StartGame => println!("Game started."),
        ControllerEvent::OpponentScore(score) => println!("Opponent score: {score}"),
        ControllerEvent::OpponentFinished(score) => {
            println!("Opponent finished with {score} points.")
        }
        ControllerEvent::EndGame { winner, score } => {
            match winner {
                Some(winner) => println!("Game over: {winner} wins with {score} points."),
                None => println!("Game over: draw at {score} points."),
            }
            return true;
        }
        ControllerEvent::Error(ErrorCause::ServerLost) => {
            println!("Connection to the host was lost.");
            return true;
        }
        ControllerEvent::Error(ErrorCause::PlayerLeft(nickname)) => {
            println!("{nickname} left the game.");
            return true;
        }
        ControllerEvent::Swap { .. }
        | ControllerEvent::AutoSwap { .. }
        | ControllerEvent::OpponentBoard
        | ControllerEvent::OpponentTime(_) => {}
    }
    false
}

fn print_board(board: &BoardMatrix) {
    print!("   ");
    for col in 0..board.rows().first().map(Vec::len).unwrap_or(0) {
        print!("{col:<3}");
    }
    println!();
    for (row, line) in board.to_string().lines().enumerate() {
        println!("{row:<3}{line}");
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start                      deal the board (host)");
    println!("  swap <row> <col> <row> <col>");
    println!("  finish                     stop and submit your score");
    println!("  board                      show the board again");
    println!("  quit                       leave the session");
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(LocalCommand),
    Board,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let input = match words.next()? {
        "start" => Input::Command(LocalCommand::Start),
        "finish" => Input::Command(LocalCommand::Finish),
        "board" => Input::Board,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        "swap" => {
            let mut n = || words.next()?.parse::<usize>().ok();
            let a = Pos::new(n()?, n()?);
            let b = Pos::new(n()?, n()?);
            Input::Command(LocalCommand::Swap(a, b))
        }
        _ => return None,
    };
    Some(input)
}
