//! Two controllers wired back to back, no transport

use match3_duel::core::Board;
use match3_duel::engine::{
    ControllerConfig, ControllerEvent, GameController, GameMessage, Outcome, Phase, Role,
};
use match3_duel::types::{GameMode, Pos, BOARD_COLS, BOARD_ROWS};

fn players() -> Vec<String> {
    vec!["A".to_string(), "B".to_string()]
}

fn pair(mode: GameMode) -> (GameController, GameController) {
    let host = GameController::new(
        ControllerConfig::new("A", Role::Host)
            .with_mode(mode)
            .with_time_limit(45),
        1234,
    );
    let client = GameController::new(ControllerConfig::new("B", Role::Client), 99);
    (host, client)
}

fn deliver(from: &mut GameController, to: &mut GameController) -> Vec<GameMessage> {
    let out = from.drain_outbound();
    for msg in &out {
        to.handle_message(msg.clone()).unwrap();
    }
    out
}

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

#[test]
fn test_chess_start_gives_first_queued_player_the_move() {
    for seed in 0..10 {
        let mut host = GameController::new(ControllerConfig::new("A", Role::Host), seed);
        let mut client = GameController::new(ControllerConfig::new("B", Role::Client), seed + 1);
        host.new_game(&players()).unwrap();
        deliver(&mut host, &mut client);

        let first = host.queue()[0].clone();
        assert_eq!(client.queue()[0], first);
        let movers: Vec<&str> = [&host, &client]
            .into_iter()
            .filter(|c| c.is_my_step())
            .map(|c| c.nickname())
            .collect();
        assert_eq!(movers, vec![first.as_str()]);
    }
}

#[test]
fn test_chess_game_keeps_boards_in_sync() {
    let (mut host, mut client) = pair(GameMode::Chess);
    host.new_game(&players()).unwrap();
    deliver(&mut host, &mut client);

    for _ in 0..6 {
        let host_moves = host.is_my_step();
        let (mover, follower) = if host_moves {
            (&mut host, &mut client)
        } else {
            (&mut client, &mut host)
        };
        let (a, b) = legal_swap(mover.board().unwrap()).unwrap();
        let report = mover.local_swap(a, b).unwrap();
        assert!(report.swap.success);
        assert!(report.points > 0);
        deliver(mover, follower);

        assert_eq!(
            host.board().unwrap().to_matrix(),
            client.board().unwrap().to_matrix()
        );
        assert_ne!(host.is_my_step(), host_moves);
        assert_eq!(host.current_player(), client.current_player());
    }
}

#[test]
fn test_time_game_runs_to_end() {
    let (mut host, mut client) = pair(GameMode::Time);
    host.new_game(&players()).unwrap();
    deliver(&mut host, &mut client);
    assert_eq!(client.mode(), GameMode::Time);
    assert_eq!(client.time_limit(), 45);

    let (a, b) = legal_swap(host.board().unwrap()).unwrap();
    let report = host.local_swap(a, b).unwrap();
    assert!(report.points > 0);
    host.tick_clock();
    deliver(&mut host, &mut client);
    assert_eq!(client.opponent_score(), host.score());
    assert_eq!(client.opponent_elapsed(), 1);

    host.finish();
    deliver(&mut host, &mut client);
    assert!(client
        .drain_events()
        .contains(&ControllerEvent::OpponentFinished(host.score())));
    assert!(!client.is_finished());

    client.finish();
    let end = deliver(&mut client, &mut host);
    let expected = Phase::Finished(Outcome::Ended {
        winner: Some("A".to_string()),
        score: host.score(),
    });
    assert_eq!(
        end,
        vec![GameMessage::EndGame {
            winner: Some("A".to_string()),
            score: host.score()
        }]
    );
    assert_eq!(client.phase(), &expected);
    assert_eq!(host.phase(), &expected);
    assert!(host.drain_events().contains(&ControllerEvent::EndGame {
        winner: Some("A".to_string()),
        score: host.score()
    }));
}

#[test]
fn test_actions_after_end_are_refused() {
    let (mut host, mut client) = pair(GameMode::Time);
    host.new_game(&players()).unwrap();
    deliver(&mut host, &mut client);
    host.finish();
    client.finish();
    deliver(&mut client, &mut host);
    deliver(&mut host, &mut client);
    assert!(host.is_finished());
    assert!(client.is_finished());

    assert!(host.local_swap(Pos::new(0, 0), Pos::new(0, 1)).is_err());
    host.tick_clock();
    assert!(host.drain_outbound().is_empty());
}

#[test]
fn test_cascades_do_not_score() {
    let mut cascaded = 0;
    for seed in 0..50 {
        let mut host = GameController::new(
            ControllerConfig::new("A", Role::Host).with_mode(GameMode::Time),
            seed,
        );
        host.new_game(&players()).unwrap();
        let (a, b) = legal_swap(host.board().unwrap()).unwrap();
        let report = host.local_swap(a, b).unwrap();
        if report.cascades.len() > 1 {
            cascaded += 1;
        }
        let matched = report.swap.removed.len() + report.swap.bonuses.len();
        assert_eq!(report.points, matched as u32, "seed {seed}");
        assert_eq!(host.score(), report.points);
    }
    assert!(cascaded > 0);
}
