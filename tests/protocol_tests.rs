//! Controller traffic through the JSON line codec

use match3_duel::adapter::protocol::parse_record;
use match3_duel::adapter::{encode_message, parse_message, ProtocolError, WireMessage};
use match3_duel::core::{Board, BoardMatrix};
use match3_duel::engine::{ControllerConfig, GameController, GameMessage, Role};
use match3_duel::types::{GameMode, Pos, BOARD_COLS, BOARD_ROWS};

fn legal_swap(board: &Board) -> Option<(Pos, Pos)> {
    for r in 0..BOARD_ROWS {
        for c in 0..BOARD_COLS {
            let a = Pos::new(r, c);
            for b in [Pos::new(r, c + 1), Pos::new(r + 1, c)] {
                if b.in_bounds() && board.clone().swap(a, b).success {
                    return Some((a, b));
                }
            }
        }
    }
    None
}

/// Encode, check the line, decode, and deliver
fn relay(from: &mut GameController, to: &mut GameController) -> usize {
    let out = from.drain_outbound();
    for msg in &out {
        let line = encode_message(msg).unwrap();
        assert!(!line.contains('\n'));
        let parsed = parse_message(&line).unwrap();
        assert_eq!(&parsed, msg, "{line}");
        to.handle_message(parsed).unwrap();
    }
    out.len()
}

fn play(mode: GameMode) {
    let mut host = GameController::new(
        ControllerConfig::new("alice", Role::Host).with_mode(mode),
        77,
    );
    let mut client = GameController::new(ControllerConfig::new("bob", Role::Client), 78);
    host.new_game(&["alice".to_string(), "bob".to_string()])
        .unwrap();
    assert_eq!(relay(&mut host, &mut client), 1);

    for _ in 0..4 {
        let (mover, follower) = if host.is_my_step() {
            (&mut host, &mut client)
        } else {
            (&mut client, &mut host)
        };
        let (a, b) = legal_swap(mover.board().unwrap()).unwrap();
        mover.local_swap(a, b).unwrap();
        mover.tick_clock();
        assert!(relay(mover, follower) > 1);
    }

    host.finish();
    client.finish();
    relay(&mut client, &mut host);
    relay(&mut host, &mut client);
    assert!(host.is_finished());
    assert!(client.is_finished());
}

#[test]
fn test_chess_traffic_survives_the_wire() {
    play(GameMode::Chess);
}

#[test]
fn test_time_traffic_survives_the_wire() {
    play(GameMode::Time);
}

#[test]
fn test_hand_written_lines() {
    assert_eq!(
        parse_message(r#"{"command":"finish","score":12}"#).unwrap(),
        GameMessage::Finish { score: 12 }
    );
    assert_eq!(
        parse_message(r#"{"time":3,"command":"time"}"#).unwrap(),
        GameMessage::Time { time: 3 }
    );
    assert_eq!(
        parse_record(r#"{"command":"end_game","winner":"bob","score":40}"#)
            .unwrap()
            .command(),
        "end_game"
    );
    assert!(matches!(
        parse_record(r#"{"command":"score","score":5}"#).unwrap(),
        WireMessage::Score(_)
    ));
}

#[test]
fn test_legacy_board_line() {
    let mut rows = Board::new(11).to_matrix().into_rows();
    rows[7][0] = "B".to_string();
    rows[7][1] = "v".to_string();
    let line = format!(
        r#"{{"command":"board","board":{}}}"#,
        serde_json::to_string(&rows).unwrap()
    );
    let GameMessage::Board { board } = parse_message(&line).unwrap() else {
        panic!("expected board");
    };
    // Re-encoding writes the two-letter codes.
    let encoded = BoardMatrix::encode(&board.decode().unwrap());
    assert_eq!(encoded.rows()[7][0], "BP");
    assert_eq!(encoded.rows()[7][1], "VO");
}

#[test]
fn test_rejects_garbage() {
    assert!(matches!(
        parse_message(r#"{"command":"warp"}"#),
        Err(ProtocolError::UnknownCommand(_))
    ));
    assert!(matches!(
        parse_message("INVALID_NICKNAME"),
        Err(ProtocolError::Json(_))
    ));
}
