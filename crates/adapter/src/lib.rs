//! Session transport - LAN play between two peers
//!
//! One player hosts, the other joins with a short session code. After a
//! nickname handshake both sides exchange line-delimited JSON records and
//! each applies the other's results to its own controller.
//!
//! # Joining
//!
//! 1. **Host**: binds a TCP port; the port number is the session code
//! 2. **Beacon**: while seats are open the host broadcasts
//!    `"<code>:<host>:<port>"` over UDP to its subnet every 5 seconds
//! 3. **Discovery**: the client binds the code port and waits up to 15
//!    seconds for a matching beacon
//! 4. **Handshake**: the client sends its nickname as one line; the host
//!    answers `WELCOME` or `INVALID_NICKNAME` (empty, the host's own name,
//!    already taken, or no seat left)
//!
//! # Records
//!
//! Every record carries a `command` field:
//!
//! | command | fields |
//! |---|---|
//! | `start_game` | mode, queue_players, current_player, nicknames, board, time_limit |
//! | `swap` | a_row, a_col, b_row, b_col, next_player, board, success, removed, bonuses |
//! | `auto_swap` | fallen, spawned, board |
//! | `auto_swap_circle` | fallen, removed, spawned, bonuses, board |
//! | `board` | board |
//! | `score` | score |
//! | `time` | time |
//! | `finish` | score |
//! | `end_game` | winner, score |
//!
//! Records that fail to parse are logged and dropped; a closed connection
//! ends the game with an error.
//!
//! # Environment Variables
//!
//! - `MATCH3_HOST`: address to bind and advertise (default: LAN address)
//! - `MATCH3_PORT`: listening port and session code (default: 8080)
//! - `MATCH3_NICKNAME`: player name (default: "player")
//! - `MATCH3_MODE`: `chess` or `time` (default: chess)
//! - `MATCH3_TIME_LIMIT`: time mode limit in seconds, 20 to 999 (default: 60)
//! - `MATCH3_TIE_BREAK`: `draw` or `first_finisher` (default: draw)
//! - `MATCH3_DISCOVERY_SECS`: how long a client looks for the host (default: 15)
//!
//! # Testing
//!
//! A host can be driven by hand with netcat:
//!
//! ```bash
//! nc 127.0.0.1 8080
//! bob
//! {"command":"score","score":12}
//! ```

pub mod client;
pub mod discovery;
pub mod protocol;
pub mod runtime;
pub mod server;
pub mod session;

pub use match3_duel_core as core;
pub use match3_duel_engine as engine;
pub use match3_duel_types as types;

pub use client::{connect, handshake, join, JoinError};
pub use discovery::{find_server, Beacon};
pub use protocol::{encode_message, parse_message, ProtocolError, WireMessage};
pub use runtime::{start_client, start_host, start_solo, RunningSession, SessionHandle};
pub use server::{run_host, ServerState};
pub use session::{
    run_session, LocalCommand, Session, SessionConfig, SessionEvent, SessionUpdate, Status,
};
