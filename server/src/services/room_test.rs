use super::*;
use crate::state::test_helpers::drain;
use uuid::Uuid;

fn connect(registry: &mut RoomRegistry) -> (ConnectionId, mpsc::Receiver<Envelope>) {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(64);
    registry.connect(conn_id, tx);
    (conn_id, rx)
}

fn kinds(rx: &mut mpsc::Receiver<Envelope>) -> Vec<String> {
    drain(rx).into_iter().map(|envelope| envelope.kind).collect()
}

fn decode(envelope: &Envelope) -> ServerMessage {
    ServerMessage::from_envelope(envelope).expect("server message")
}

// =============================================================================
// ROOM IDS
// =============================================================================

#[test]
fn generated_room_id_has_prefix_and_hex_body() {
    let id = generate_room_id();
    let body = id.strip_prefix(ROOM_ID_PREFIX).expect("prefix");
    assert_eq!(body.len(), 32);
    assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generated_room_ids_are_distinct() {
    let ids: std::collections::HashSet<_> = (0..256).map(|_| generate_room_id()).collect();
    assert_eq!(ids.len(), 256);
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(RoomError::NotFound("x".into()).error_code(), "E_ROOM_NOT_FOUND");
    assert_eq!(RoomError::NotInRoom.error_code(), "E_NOT_IN_ROOM");
    assert_eq!(RoomError::UnknownConnection(Uuid::nil()).error_code(), "E_UNKNOWN_CONNECTION");
}

// =============================================================================
// CREATE
// =============================================================================

#[test]
fn create_room_replies_with_id_and_count_one() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx) = connect(&mut registry);

    let room_id = registry.create_room(a).expect("create");

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        decode(&sent[0]),
        ServerMessage::RoomCreated(RoomCreated { room_id: room_id.clone(), participant_count: 1 })
    );
    assert_eq!(registry.room_of(a), Some(&room_id));
    let room = registry.room(&room_id).expect("room");
    assert_eq!(room.owner, a);
    assert_eq!(room.participant_count(), 1);
}

#[test]
fn create_room_from_unknown_connection_fails() {
    let mut registry = RoomRegistry::new();
    let ghost = Uuid::new_v4();
    assert_eq!(registry.create_room(ghost), Err(RoomError::UnknownConnection(ghost)));
    assert_eq!(registry.room_count(), 0);
}

#[test]
fn create_room_while_in_room_leaves_previous() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let first = registry.create_room(a).expect("create");
    drain(&mut rx_a);

    let second = registry.create_room(a).expect("create again");

    assert_ne!(first, second);
    assert!(registry.room(&first).is_none(), "emptied room is deleted");
    assert_eq!(registry.room_of(a), Some(&second));
    assert_eq!(registry.room_count(), 1);
    assert_eq!(kinds(&mut rx_a), vec!["createRoom"]);
}

// =============================================================================
// JOIN
// =============================================================================

#[test]
fn join_notifies_joiner_owner_and_all_members() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    drain(&mut rx_a);

    let count = registry.join_room(b, &room_id).expect("join");
    assert_eq!(count, 2);

    let to_b = drain(&mut rx_b);
    assert_eq!(to_b.len(), 2);
    assert_eq!(
        decode(&to_b[0]),
        ServerMessage::Joined(ParticipantCount { room_id: room_id.clone(), participant_count: 2 })
    );
    assert_eq!(
        decode(&to_b[1]),
        ServerMessage::ParticipantCountUpdate(ParticipantCount { room_id: room_id.clone(), participant_count: 2 })
    );

    let to_a = drain(&mut rx_a);
    assert_eq!(to_a.len(), 2);
    assert_eq!(decode(&to_a[0]), ServerMessage::NewUserJoined);
    assert_eq!(to_a[1].kind, "participantCountUpdate");
}

#[test]
fn join_unknown_room_fails_without_side_effects() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    registry.join_room(b, &room_id).expect("join");
    drain(&mut rx_a);
    drain(&mut rx_b);

    let err = registry.join_room(b, "room_doesnotexist").expect_err("missing room");

    assert_eq!(err, RoomError::NotFound("room_doesnotexist".into()));
    assert_eq!(registry.room_of(b), Some(&room_id), "membership unchanged");
    assert_eq!(registry.room(&room_id).map(Room::participant_count), Some(2));
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn rejoining_same_room_only_repeats_joined() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    registry.join_room(b, &room_id).expect("join");
    drain(&mut rx_a);
    drain(&mut rx_b);

    let count = registry.join_room(b, &room_id).expect("rejoin");

    assert_eq!(count, 2);
    assert_eq!(kinds(&mut rx_b), vec!["joined"]);
    assert!(drain(&mut rx_a).is_empty());
}

#[test]
fn owner_rejoining_own_room_gets_no_new_user_notice() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    drain(&mut rx_a);

    registry.join_room(a, &room_id).expect("rejoin");

    assert_eq!(kinds(&mut rx_a), vec!["joined"]);
}

#[test]
fn switching_rooms_updates_both_rooms() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let (c, mut rx_c) = connect(&mut registry);
    let first = registry.create_room(a).expect("create");
    registry.join_room(c, &first).expect("join");
    let second = registry.create_room(b).expect("create");
    drain(&mut rx_a);
    drain(&mut rx_b);
    drain(&mut rx_c);

    registry.join_room(c, &second).expect("switch");

    assert_eq!(registry.room(&first).map(Room::participant_count), Some(1));
    assert_eq!(registry.room(&second).map(Room::participant_count), Some(2));
    let to_a = drain(&mut rx_a);
    assert_eq!(to_a.len(), 1);
    assert_eq!(
        decode(&to_a[0]),
        ServerMessage::ParticipantCountUpdate(ParticipantCount { room_id: first, participant_count: 1 })
    );
    assert_eq!(kinds(&mut rx_b), vec!["newUserJoined", "participantCountUpdate"]);
    assert_eq!(kinds(&mut rx_c), vec!["joined", "participantCountUpdate"]);
}

#[test]
fn join_after_owner_left_still_succeeds() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let (c, mut rx_c) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    registry.join_room(b, &room_id).expect("join");
    registry.disconnect(a);
    drain(&mut rx_b);

    let count = registry.join_room(c, &room_id).expect("join");

    assert_eq!(count, 2);
    assert_eq!(kinds(&mut rx_c), vec!["joined", "participantCountUpdate"]);
    assert_eq!(kinds(&mut rx_b), vec!["participantCountUpdate"]);
}

#[test]
fn owner_in_another_room_gets_no_new_user_notice() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let (c, mut rx_c) = connect(&mut registry);
    let first = registry.create_room(a).expect("create");
    registry.join_room(b, &first).expect("join");
    let second = registry.create_room(a).expect("create second");
    drain(&mut rx_a);
    drain(&mut rx_b);

    registry.join_room(c, &first).expect("join first");

    assert_eq!(registry.room_of(a), Some(&second));
    assert_eq!(registry.room(&first).map(|room| room.owner), Some(a));
    assert!(kinds(&mut rx_a).is_empty(), "former owner must not be asked for a snapshot");
    assert_eq!(kinds(&mut rx_b), vec!["participantCountUpdate"]);
    assert_eq!(kinds(&mut rx_c), vec!["joined", "participantCountUpdate"]);
}

// =============================================================================
// LEAVE / DISCONNECT
// =============================================================================

#[test]
fn leave_broadcasts_new_count_to_remaining_members() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, mut rx_b) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    registry.join_room(b, &room_id).expect("join");
    drain(&mut rx_a);
    drain(&mut rx_b);

    assert_eq!(registry.leave(b), Some(room_id.clone()));

    assert!(registry.room_of(b).is_none());
    let to_a = drain(&mut rx_a);
    assert_eq!(
        decode(&to_a[0]),
        ServerMessage::ParticipantCountUpdate(ParticipantCount { room_id, participant_count: 1 })
    );
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn last_leave_deletes_room() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");

    registry.disconnect(a);

    assert!(registry.room(&room_id).is_none());
    assert_eq!(registry.room_count(), 0);
    assert!(!registry.is_connected(a));

    let (b, _rx_b) = connect(&mut registry);
    assert_eq!(registry.join_room(b, &room_id), Err(RoomError::NotFound(room_id)));
}

#[test]
fn leave_without_room_is_noop() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    assert_eq!(registry.leave(a), None);
    assert_eq!(registry.leave(Uuid::new_v4()), None);
    assert!(drain(&mut rx_a).is_empty());
}

#[test]
fn counts_follow_join_and_leave_sequence() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    let mut members = Vec::new();
    for expected in 2..=5 {
        let (conn, rx) = connect(&mut registry);
        assert_eq!(registry.join_room(conn, &room_id), Ok(expected));
        members.push((conn, rx));
    }
    for (i, (conn, _)) in members.iter().enumerate() {
        registry.leave(*conn);
        assert_eq!(registry.room(&room_id).map(Room::participant_count), Some(4 - i));
    }
}

// =============================================================================
// QUERIES / DELIVERY
// =============================================================================

#[test]
fn participant_count_of_requires_room() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = connect(&mut registry);
    assert_eq!(registry.participant_count_of(a), Err(RoomError::NotInRoom));

    let room_id = registry.create_room(a).expect("create");
    assert_eq!(
        registry.participant_count_of(a),
        Ok(ParticipantCount { room_id, participant_count: 1 })
    );
}

#[test]
fn closed_member_channel_does_not_block_fanout() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = connect(&mut registry);
    let (b, rx_b) = connect(&mut registry);
    let room_id = registry.create_room(a).expect("create");
    registry.join_room(b, &room_id).expect("join");
    drain(&mut rx_a);
    drop(rx_b);

    assert_eq!(registry.broadcast_participant_count(&room_id), 1);
    assert_eq!(kinds(&mut rx_a), vec!["participantCountUpdate"]);
}

#[test]
fn full_queue_drops_frame() {
    let mut registry = RoomRegistry::new();
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(1);
    registry.connect(conn_id, tx);

    assert!(registry.notify(conn_id, &ServerMessage::NewUserJoined));
    assert!(!registry.notify(conn_id, &ServerMessage::NewUserJoined));
    assert_eq!(drain(&mut rx).len(), 1);
}

