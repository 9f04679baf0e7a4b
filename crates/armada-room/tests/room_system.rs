//! Integration tests for the room system, driven through channel-backed
//! clients with no network involved.

use std::sync::Arc;
use std::time::Duration;

use armada_protocol::{ClientId, Envelope, PayloadKind, Phase};
use armada_room::{LOBBY_ROOM, MAX_SHIPS, Registry, Room, RoomClient, RoomError};
use tokio::sync::mpsc::{self, UnboundedReceiver};

type Rx = UnboundedReceiver<Envelope>;

fn connect(registry: &Arc<Registry>, name: &str) -> (Arc<RoomClient>, Rx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = RoomClient::new(registry.next_client_id(), name, tx);
    registry
        .join_room(LOBBY_ROOM, &client)
        .expect("lobby join failed");
    (client, rx)
}

fn drain(rx: &mut Rx) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        envelopes.push(envelope);
    }
    envelopes
}

fn contains_kind(envelopes: &[Envelope], predicate: impl Fn(&PayloadKind) -> bool) -> bool {
    envelopes.iter().any(|e| predicate(&e.kind))
}

/// Creates a game room with two members, both readied up, so the session
/// is in PLACE.
fn start_two_player_session(
    registry: &Arc<Registry>,
) -> (Arc<Room>, (Arc<RoomClient>, Rx), (Arc<RoomClient>, Rx)) {
    let (alice, alice_rx) = connect(registry, "alice");
    let (bob, bob_rx) = connect(registry, "bob");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    let arena = registry.join_room("arena", &bob).unwrap();
    arena.handle_ready(&alice).unwrap();
    arena.handle_ready(&bob).unwrap();
    assert_eq!(arena.phase(), Some(Phase::Place));
    (arena, (alice, alice_rx), (bob, bob_rx))
}

/// Places all of a player's ships along the given row.
fn place_row(room: &Room, client: &Arc<RoomClient>, row: u32) {
    for col in 0..MAX_SHIPS {
        room.handle_place(client, row, col).unwrap();
    }
}

#[tokio::test]
async fn test_client_ids_are_monotonic_from_one() {
    let registry = Registry::new();
    assert_eq!(registry.next_client_id(), ClientId(1));
    assert_eq!(registry.next_client_id(), ClientId(2));
    assert_eq!(registry.next_client_id(), ClientId(3));
}

#[tokio::test]
async fn test_client_is_in_one_room_at_a_time() {
    let registry = Registry::new();
    let (alice, _alice_rx) = connect(&registry, "alice");
    let lobby = registry.lobby();
    assert!(lobby.contains(alice.id()));

    registry.create_room("arena").unwrap();
    let arena = registry.join_room("arena", &alice).unwrap();

    assert!(!lobby.contains(alice.id()));
    assert!(arena.contains(alice.id()));
    assert_eq!(lobby.member_count(), 0);
    assert_eq!(arena.member_count(), 1);
}

#[tokio::test]
async fn test_duplicate_room_name_is_rejected_case_insensitively() {
    let registry = Registry::new();
    registry.create_room("Arena").unwrap();
    assert_eq!(
        registry.create_room("arena").map(|_| ()),
        Err(RoomError::DuplicateRoom("arena".to_string()))
    );
    assert_eq!(
        registry.create_room("lobby").map(|_| ()),
        Err(RoomError::DuplicateRoom("lobby".to_string()))
    );
}

#[tokio::test]
async fn test_join_unknown_room_fails() {
    let registry = Registry::new();
    let (alice, _rx) = connect(&registry, "alice");
    assert_eq!(
        registry.join_room("atlantis", &alice).map(|_| ()),
        Err(RoomError::RoomNotFound("atlantis".to_string()))
    );
    // Still in the lobby.
    assert!(registry.lobby().contains(alice.id()));
}

#[tokio::test]
async fn test_list_rooms_sorts_and_caps_at_ten() {
    let registry = Registry::new();
    // Created out of order on purpose.
    for suffix in [3, 12, 1, 7, 10, 5, 2, 11, 4, 9, 6, 8] {
        registry.create_room(&format!("r{suffix:02}")).unwrap();
    }

    let all = registry.list_rooms("r");
    assert_eq!(all.len(), 10);
    let expected: Vec<String> = (1..=10).map(|n| format!("r{n:02}")).collect();
    assert_eq!(all, expected);

    assert_eq!(registry.list_rooms("R07"), vec!["r07".to_string()]);
    assert!(registry.list_rooms("atlantis").is_empty());
}

#[tokio::test]
async fn test_newcomer_gets_membership_sync_and_join_notice() {
    let registry = Registry::new();
    let (alice, mut alice_rx) = connect(&registry, "alice");
    let (bob, mut bob_rx) = connect(&registry, "bob");

    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);
    registry.join_room("arena", &bob).unwrap();

    let to_bob = drain(&mut bob_rx);
    // Clear marker first, then one sync entry for alice.
    assert!(matches!(to_bob[0].kind, PayloadKind::SyncClient { name: None }));
    assert!(contains_kind(&to_bob, |k| matches!(
        k,
        PayloadKind::SyncClient { name: Some(n) } if n == &alice.display_name()
    )));
    assert!(contains_kind(&to_bob, |k| matches!(
        k,
        PayloadKind::RoomJoin { name: Some(n), .. } if n == &bob.display_name()
    )));

    // Existing members see the join too.
    let to_alice = drain(&mut alice_rx);
    assert!(contains_kind(&to_alice, |k| matches!(
        k,
        PayloadKind::RoomJoin { name: Some(n), .. } if n == &bob.display_name()
    )));
}

#[tokio::test]
async fn test_relay_formats_sender_and_room_lines() {
    let registry = Registry::new();
    let (alice, _alice_rx) = connect(&registry, "alice");
    let (_bob, mut bob_rx) = connect(&registry, "bob");
    let lobby = registry.lobby();
    drain(&mut bob_rx);

    lobby.handle_message(&alice, "ahoy").unwrap();
    lobby.relay(None, "maintenance at noon");

    let to_bob = drain(&mut bob_rx);
    let texts: Vec<&str> = to_bob
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect();
    assert!(texts.contains(&format!("{}: ahoy", alice.display_name()).as_str()));
    assert!(texts.contains(&"Room[lobby]: maintenance at noon"));
}

#[tokio::test]
async fn test_reverse_relays_reversed_text() {
    let registry = Registry::new();
    let (alice, mut alice_rx) = connect(&registry, "alice");
    let lobby = registry.lobby();
    drain(&mut alice_rx);

    lobby.handle_reverse(&alice, "draobrats").unwrap();
    let envelopes = drain(&mut alice_rx);
    assert!(envelopes.iter().any(|e| {
        e.message.as_deref() == Some(&format!("{}: starboard", alice.display_name()))
    }));
}

#[tokio::test]
async fn test_broadcast_evicts_only_the_dead_member() {
    let registry = Registry::new();
    let (alice, _alice_rx) = connect(&registry, "alice");
    let (_bob, mut bob_rx) = connect(&registry, "bob");
    let (carol, carol_rx) = connect(&registry, "carol");
    let lobby = registry.lobby();
    drop(carol_rx);
    drain(&mut bob_rx);

    lobby.handle_message(&alice, "anyone home?").unwrap();

    assert_eq!(lobby.member_count(), 2);
    assert!(!lobby.contains(carol.id()));

    let to_bob = drain(&mut bob_rx);
    // Bob still got the chat line, plus a disconnect notice for carol.
    assert!(contains_kind(&to_bob, |k| matches!(k, PayloadKind::Message)));
    assert!(to_bob.iter().any(|e| {
        e.sender_id == carol.id() && matches!(e.kind, PayloadKind::Disconnect)
    }));
}

#[tokio::test]
async fn test_empty_game_room_closes_and_lobby_survives() {
    let registry = Registry::new();
    let (alice, _rx) = connect(&registry, "alice");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    assert_eq!(registry.room_count(), 2);

    registry.join_room(LOBBY_ROOM, &alice).unwrap();

    assert!(registry.room("arena").is_none());
    assert_eq!(registry.room_count(), 1);
    assert!(registry.lobby().contains(alice.id()));

    // The lobby itself never closes, even when empty.
    registry.lobby().handle_disconnect(&alice);
    assert_eq!(registry.lobby().member_count(), 0);
    assert!(registry.room(LOBBY_ROOM).is_some());
}

#[tokio::test]
async fn test_ready_quorum_of_one_does_not_start() {
    let registry = Registry::new();
    let (alice, _rx) = connect(&registry, "alice");
    let (bob, _bob_rx) = connect(&registry, "bob");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    let arena = registry.join_room("arena", &bob).unwrap();

    arena.handle_ready(&alice).unwrap();
    assert_eq!(arena.phase(), Some(Phase::Ready));
}

#[tokio::test]
async fn test_ready_untoggle_cancels_the_quorum() {
    let registry = Registry::new();
    let (alice, _rx) = connect(&registry, "alice");
    let (bob, _bob_rx) = connect(&registry, "bob");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    let arena = registry.join_room("arena", &bob).unwrap();

    arena.handle_ready(&alice).unwrap();
    arena.handle_ready(&alice).unwrap(); // un-ready
    arena.handle_ready(&bob).unwrap();
    assert_eq!(arena.phase(), Some(Phase::Ready));
}

#[tokio::test]
async fn test_second_ready_starts_the_session_immediately() {
    let registry = Registry::new();
    let (arena, (_alice, mut alice_rx), _bob) = {
        let (alice, alice_rx) = connect(&registry, "alice");
        let (bob, bob_rx) = connect(&registry, "bob");
        registry.create_room("arena").unwrap();
        registry.join_room("arena", &alice).unwrap();
        let arena = registry.join_room("arena", &bob).unwrap();
        arena.handle_ready(&alice).unwrap();
        assert_eq!(arena.phase(), Some(Phase::Ready));
        arena.handle_ready(&bob).unwrap();
        (arena, (alice, alice_rx), (bob, bob_rx))
    };

    assert_eq!(arena.phase(), Some(Phase::Place));
    let envelopes = drain(&mut alice_rx);
    assert!(contains_kind(&envelopes, |k| matches!(
        k,
        PayloadKind::Phase { phase: Phase::Place }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_ready_timer_expiry_without_quorum_resets() {
    let registry = Registry::new();
    let (alice, mut alice_rx) = connect(&registry, "alice");
    let (bob, _bob_rx) = connect(&registry, "bob");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &alice).unwrap();
    let arena = registry.join_room("arena", &bob).unwrap();

    arena.handle_ready(&alice).unwrap();
    drain(&mut alice_rx);

    tokio::time::sleep(Duration::from_secs(35)).await;

    assert_eq!(arena.phase(), Some(Phase::Ready));
    let envelopes = drain(&mut alice_rx);
    // The countdown was visible, then the check failed and reset state.
    assert!(contains_kind(&envelopes, |k| matches!(
        k,
        PayloadKind::Time { seconds, .. } if *seconds > 0
    )));
    assert!(contains_kind(&envelopes, |k| matches!(k, PayloadKind::ResetReady)));
}

#[tokio::test]
async fn test_place_guard_chain() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), _bob) = start_two_player_session(&registry);

    // A third member joining mid-session is not ready.
    let (carol, _carol_rx) = connect(&registry, "carol");
    registry.join_room("arena", &carol).unwrap();
    assert_eq!(
        arena.handle_place(&carol, 0, 0),
        Err(RoomError::NotReady)
    );

    // Attacks are not legal during PLACE.
    assert_eq!(
        arena.handle_attack(&alice, 0, 0),
        Err(RoomError::PhaseMismatch(Phase::Place))
    );

    // A non-member cannot act at all.
    let (mallory, _mallory_rx) = connect(&registry, "mallory");
    assert_eq!(
        arena.handle_place(&mallory, 0, 0),
        Err(RoomError::PlayerNotFound)
    );

    // Game actions in the lobby hit a plain room.
    assert_eq!(
        registry.lobby().handle_ready(&mallory),
        Err(RoomError::NotGameRoom)
    );

    // Out-of-bounds placement is rejected without consuming anything.
    assert_eq!(
        arena.handle_place(&alice, 9, 9),
        Err(RoomError::InvalidCoordinate(9, 9))
    );
}

#[tokio::test]
async fn test_place_cap_and_transition_to_attack() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), (bob, _bob_rx)) = start_two_player_session(&registry);

    place_row(&arena, &alice, 0);
    // Alice is done; a sixth placement is rejected.
    assert_eq!(
        arena.handle_place(&alice, 0, 0),
        Err(RoomError::AlreadyTookTurn)
    );
    assert_eq!(arena.phase(), Some(Phase::Place));

    place_row(&arena, &bob, 1);
    assert_eq!(arena.phase(), Some(Phase::Attack));
    assert!(arena.current_turn().is_some());
}

#[tokio::test]
async fn test_attack_hit_awards_points_and_passes_the_turn() {
    let registry = Registry::new();
    let (arena, (alice, mut alice_rx), (bob, mut bob_rx)) =
        start_two_player_session(&registry);
    place_row(&arena, &alice, 0);
    place_row(&arena, &bob, 1);

    let first = arena.current_turn().expect("attack phase has a current player");
    let (attacker, attacker_rx, target_row) = if first == alice.id() {
        (&alice, &mut alice_rx, 1) // alice shoots at bob's row
    } else {
        (&bob, &mut bob_rx, 0)
    };
    drain(attacker_rx);

    // The other player cannot shoot out of turn.
    let out_of_turn = if first == alice.id() { &bob } else { &alice };
    assert_eq!(
        arena.handle_attack(out_of_turn, target_row, 0),
        Err(RoomError::NotPlayersTurn)
    );

    arena.handle_attack(attacker, target_row, 0).unwrap();

    let envelopes = drain(attacker_rx);
    assert!(contains_kind(&envelopes, |k| matches!(
        k,
        PayloadKind::Points { points: 1 }
    )));
    // Turn passed to the other player.
    let second = arena.current_turn().unwrap();
    assert_ne!(second, first);

    // Attacking the struck cell again awards nothing.
    let (second_attacker, second_rx) = if second == alice.id() {
        (&alice, &mut alice_rx)
    } else {
        (&bob, &mut bob_rx)
    };
    drain(second_rx);
    arena.handle_attack(second_attacker, target_row, 0).unwrap();
    let envelopes = drain(second_rx);
    assert!(!contains_kind(&envelopes, |k| matches!(k, PayloadKind::Points { .. })));
}

#[tokio::test]
async fn test_six_points_ends_the_session() {
    let registry = Registry::new();
    let (arena, (alice, mut alice_rx), (bob, _bob_rx)) =
        start_two_player_session(&registry);

    // Stack six ships into (0, 0) between the two players.
    for _ in 0..MAX_SHIPS {
        arena.handle_place(&bob, 0, 0).unwrap();
    }
    arena.handle_place(&alice, 0, 0).unwrap();
    for col in 1..MAX_SHIPS {
        arena.handle_place(&alice, 2, col).unwrap();
    }
    assert_eq!(arena.phase(), Some(Phase::Attack));
    drain(&mut alice_rx);

    let current = arena.current_turn().unwrap();
    let attacker = if current == alice.id() { &alice } else { &bob };
    arena.handle_attack(attacker, 0, 0).unwrap();

    // Six points is an immediate win and a full reset.
    assert_eq!(arena.phase(), Some(Phase::Ready));
    assert_eq!(arena.current_turn(), None);
    let envelopes = drain(&mut alice_rx);
    assert!(contains_kind(&envelopes, |k| matches!(
        k,
        PayloadKind::Points { points: 6 }
    )));
    assert!(contains_kind(&envelopes, |k| matches!(k, PayloadKind::ResetReady)));
    assert!(contains_kind(&envelopes, |k| matches!(k, PayloadKind::ResetTurn)));

    // The room is immediately reusable.
    arena.handle_ready(&alice).unwrap();
    assert_eq!(arena.phase(), Some(Phase::Ready));
}

#[tokio::test]
async fn test_turn_order_is_complete_and_round_cap_ends_the_session() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), (bob, _bob_rx)) = start_two_player_session(&registry);
    place_row(&arena, &alice, 0);
    place_row(&arena, &bob, 1);

    let by_id = |id: ClientId| if id == alice.id() { &alice } else { &bob };

    // Attack round one: both players act exactly once.
    let first = arena.current_turn().unwrap();
    arena.handle_attack(by_id(first), 4, 0).unwrap();
    let second = arena.current_turn().unwrap();
    assert_ne!(second, first);
    arena.handle_attack(by_id(second), 4, 1).unwrap();

    // New round, same order from the top.
    assert_eq!(arena.phase(), Some(Phase::Attack));
    assert_eq!(arena.current_turn(), Some(first));

    // Attack round two exhausts the round cap.
    arena.handle_attack(by_id(first), 4, 2).unwrap();
    arena.handle_attack(by_id(second), 4, 3).unwrap();
    assert_eq!(arena.phase(), Some(Phase::Ready));
}

#[tokio::test]
async fn test_skip_consumes_the_turn() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), (bob, _bob_rx)) = start_two_player_session(&registry);
    place_row(&arena, &alice, 0);
    place_row(&arena, &bob, 1);

    let first = arena.current_turn().unwrap();
    let skipper = if first == alice.id() { &alice } else { &bob };
    arena.handle_skip(skipper).unwrap();
    assert_ne!(arena.current_turn(), Some(first));

    // Skipping again out of turn is rejected.
    assert_eq!(arena.handle_skip(skipper), Err(RoomError::NotPlayersTurn));
}

#[tokio::test]
async fn test_disconnect_during_turn_passes_play_on() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), (bob, _bob_rx)) = start_two_player_session(&registry);
    place_row(&arena, &alice, 0);
    place_row(&arena, &bob, 1);

    let current = arena.current_turn().unwrap();
    let (leaver, stayer) = if current == alice.id() {
        (&alice, &bob)
    } else {
        (&bob, &alice)
    };

    arena.handle_disconnect(leaver);

    assert!(!arena.contains(leaver.id()));
    assert_eq!(arena.current_turn(), Some(stayer.id()));
    assert_eq!(arena.phase(), Some(Phase::Attack));
}

#[tokio::test]
async fn test_last_player_leaving_mid_session_ends_it() {
    let registry = Registry::new();
    let (arena, (alice, _alice_rx), (bob, _bob_rx)) = start_two_player_session(&registry);

    // A spectator keeps the room alive while both players leave.
    let (carol, _carol_rx) = connect(&registry, "carol");
    registry.join_room("arena", &carol).unwrap();

    arena.handle_disconnect(&alice);
    arena.handle_disconnect(&bob);

    assert_eq!(arena.phase(), Some(Phase::Ready));
    assert!(arena.is_running());
    assert_eq!(arena.member_count(), 1);
}

#[tokio::test]
async fn test_mid_session_joiner_gets_state_sync() {
    let registry = Registry::new();
    let (_arena, (alice, _alice_rx), _bob) = start_two_player_session(&registry);

    let (carol, mut carol_rx) = connect(&registry, "carol");
    drain(&mut carol_rx);
    registry.join_room("arena", &carol).unwrap();

    let envelopes = drain(&mut carol_rx);
    assert!(contains_kind(&envelopes, |k| matches!(
        k,
        PayloadKind::Phase { phase: Phase::Place }
    )));
    assert!(envelopes.iter().any(|e| {
        e.sender_id == alice.id()
            && matches!(e.kind, PayloadKind::SyncReady { ready: true })
    }));
    assert!(envelopes.iter().any(|e| {
        e.sender_id == alice.id() && matches!(e.kind, PayloadKind::Points { .. })
    }));
}

#[tokio::test]
async fn test_shutdown_disconnects_everyone() {
    let registry = Registry::new();
    let (alice, mut alice_rx) = connect(&registry, "alice");
    let (bob, _bob_rx) = connect(&registry, "bob");
    registry.create_room("arena").unwrap();
    registry.join_room("arena", &bob).unwrap();
    drain(&mut alice_rx);

    registry.shutdown();

    assert!(alice.room().is_none());
    assert!(bob.room().is_none());
    let envelopes = drain(&mut alice_rx);
    assert!(contains_kind(&envelopes, |k| matches!(k, PayloadKind::Disconnect)));
}
