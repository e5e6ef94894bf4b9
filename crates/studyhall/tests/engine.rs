//! Integration tests for the engine: real WebSocket clients against a
//! running server, exercising auth, joins, broadcasts, and teardown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use studyhall::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock verifier
// =========================================================================

/// The credential is the user's name; "expired" is turned away.
struct RosterVerifier;

impl IdentityVerifier for RosterVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential == "expired" {
            return Err(AuthError::InvalidCredential("token expired".into()));
        }
        Ok(Identity {
            user_id: UserId::from(credential),
            display_name: credential.to_string(),
            role: Role::Student,
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts an engine on a random port. Returns the address plus the
/// control-plane handles.
async fn start_engine() -> (String, SessionManager<MemoryStore>, Arc<Router>)
{
    let engine = EngineBuilder::new()
        .bind("127.0.0.1:0")
        .build(RosterVerifier, MemoryStore::new())
        .await
        .expect("engine should build");

    let addr = engine
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let sessions = engine.sessions();
    let router = engine.router();

    tokio::spawn(async move {
        let _ = engine.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, sessions, router)
}

async fn connect(addr: &str, token: &str) -> ClientWs {
    let (ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/?token={token}"))
            .await
            .expect("should connect");
    ws
}

async fn connect_anonymous(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn ident(name: &str) -> Identity {
    Identity {
        user_id: UserId::from(name),
        display_name: name.to_string(),
        role: Role::Student,
    }
}

async fn create_room(
    sessions: &SessionManager<MemoryStore>,
    host: &str,
    max_participants: usize,
    settings: SessionSettings,
) -> RoomCode {
    sessions
        .create_session(
            &ident(host),
            SessionKind::Quiz,
            max_participants,
            settings,
        )
        .await
        .expect("create should succeed")
        .session
        .room_code
}

async fn send_event(ws: &mut ClientWs, event: &ClientEvent) {
    let bytes = serde_json::to_vec(event).expect("encode");
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

async fn recv_event(ws: &mut ClientWs) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
        .expect("recv failed");
    serde_json::from_slice(&msg.into_data()).expect("decode server event")
}

/// Reads events until one matches, panicking after too many misses.
async fn recv_until<F>(ws: &mut ClientWs, mut want: F) -> ServerEvent
where
    F: FnMut(&ServerEvent) -> bool,
{
    for _ in 0..25 {
        let event = recv_event(ws).await;
        if want(&event) {
            return event;
        }
    }
    panic!("expected event did not arrive");
}

/// Eats queued events until the stream goes quiet.
async fn drain_events(ws: &mut ClientWs) {
    while let Ok(Some(Ok(_))) =
        tokio::time::timeout(Duration::from_millis(50), ws.next()).await
    {}
}

/// Asserts that nothing arrives for a little while.
async fn assert_quiet(ws: &mut ClientWs) {
    let result =
        tokio::time::timeout(Duration::from_millis(100), ws.next()).await;
    assert!(result.is_err(), "expected no event, got {result:?}");
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_missing_credential_is_refused() {
    let (addr, _, _) = start_engine().await;
    let mut ws = connect_anonymous(&addr).await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, .. } => assert_eq!(code, ErrorCode::Auth),
        other => panic!("expected auth error, got {other:?}"),
    }

    // The server hangs up after refusing.
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for close");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_credential_is_refused() {
    let (addr, _, _) = start_engine().await;
    let mut ws = connect(&addr, "expired").await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, message } => {
            assert_eq!(code, ErrorCode::Auth);
            assert!(message.contains("invalid credential"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_receives_full_state_first() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut ws = connect(&addr, "alia").await;
    send_event(&mut ws, &ClientEvent::Join { room_code: code.clone() }).await;

    let first = recv_event(&mut ws).await;
    match first {
        ServerEvent::State { session, participants } => {
            assert_eq!(session.room_code, code);
            assert!(session.is_active);
            let names: Vec<_> = participants
                .iter()
                .map(|p| p.user_id.as_str())
                .collect();
            assert_eq!(names, ["host", "alia"]);
        }
        other => panic!("expected session.state first, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_unknown_room_is_rejected() {
    let (addr, _, _) = start_engine().await;

    let mut ws = connect(&addr, "alia").await;
    send_event(
        &mut ws,
        &ClientEvent::Join { room_code: RoomCode::from("ZZZZ99") },
    )
    .await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, .. } => {
            assert_eq!(code, ErrorCode::NotFound);
        }
        other => panic!("expected not-found error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_room_hears_about_new_participants() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;

    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;

    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::ParticipantJoined { .. })
    })
    .await;
    match event {
        ServerEvent::ParticipantJoined { user_id, display_name } => {
            assert_eq!(user_id.as_str(), "alia");
            assert_eq!(display_name, "alia");
        }
        other => panic!("expected participantJoined, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_room_rejects_over_the_wire() {
    let (addr, sessions, _) = start_engine().await;
    // Capacity 2: the host record plus one live joiner.
    let code =
        create_room(&sessions, "host", 2, SessionSettings::default()).await;

    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let first = recv_event(&mut alia).await;
    assert!(matches!(first, ServerEvent::State { .. }));

    let mut ravi = connect(&addr, "ravi").await;
    send_event(&mut ravi, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let event = recv_event(&mut ravi).await;
    match event {
        ServerEvent::Error { code, .. } => assert_eq!(code, ErrorCode::Full),
        other => panic!("expected full error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_switching_rooms_leaves_the_first() {
    let (addr, sessions, _) = start_engine().await;
    let code_a =
        create_room(&sessions, "host-a", 8, SessionSettings::default()).await;
    let code_b =
        create_room(&sessions, "host-b", 8, SessionSettings::default()).await;

    let mut ws = connect(&addr, "alia").await;
    send_event(&mut ws, &ClientEvent::Join { room_code: code_a.clone() })
        .await;
    send_event(&mut ws, &ClientEvent::Join { room_code: code_b.clone() })
        .await;

    let state_b = recv_until(&mut ws, |e| {
        matches!(e, ServerEvent::State { session, .. }
            if session.room_code == code_b)
    })
    .await;
    assert!(matches!(state_b, ServerEvent::State { .. }));

    // The first room saw her go inactive.
    let snapshot = sessions
        .session_snapshot(&code_a)
        .await
        .expect("room A is still live");
    let alia = snapshot
        .participants
        .iter()
        .find(|p| p.user_id.as_str() == "alia")
        .expect("record survives the switch");
    assert!(!alia.is_active);
}

// =========================================================================
// Scores and leaderboard
// =========================================================================

#[tokio::test]
async fn test_score_update_broadcasts_standings_to_everyone() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;
    drain_events(&mut alia).await;

    send_event(
        &mut alia,
        &ClientEvent::ScoreUpdate { room_code: code.clone(), score: 40 },
    )
    .await;

    // Standings include the sender — every client converges on the
    // same snapshot.
    for ws in [&mut host, &mut alia] {
        let event = recv_until(ws, |e| {
            matches!(e, ServerEvent::Leaderboard { .. })
        })
        .await;
        match event {
            ServerEvent::Leaderboard { entries } => {
                assert_eq!(entries[0].user_id.as_str(), "alia");
                assert_eq!(entries[0].score, 40);
                assert_eq!(entries[0].rank, 1);
            }
            other => panic!("expected leaderboard, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_score_update_without_membership_is_rejected() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    // Authenticated, but never joined the room.
    let mut ws = connect(&addr, "alia").await;
    send_event(
        &mut ws,
        &ClientEvent::ScoreUpdate { room_code: code, score: 10 },
    )
    .await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, .. } => {
            assert_eq!(code, ErrorCode::NotParticipant);
        }
        other => panic!("expected not-participant error, got {other:?}"),
    }
}

// =========================================================================
// Leaving and disconnects
// =========================================================================

#[tokio::test]
async fn test_leave_notifies_the_room() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;

    send_event(&mut alia, &ClientEvent::Leave {}).await;

    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::ParticipantLeft { .. })
    })
    .await;
    match event {
        ServerEvent::ParticipantLeft { user_id } => {
            assert_eq!(user_id.as_str(), "alia");
        }
        other => panic!("expected participantLeft, got {other:?}"),
    }
}

#[tokio::test]
async fn test_leave_without_a_room_is_rejected() {
    let (addr, _, _) = start_engine().await;

    let mut ws = connect(&addr, "alia").await;
    send_event(&mut ws, &ClientEvent::Leave {}).await;

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, message } => {
            assert_eq!(code, ErrorCode::NotParticipant);
            assert!(message.contains("not currently in a session"));
        }
        other => panic!("expected not-participant error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_flips_participant_inactive() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;

    // Drop the transport without saying goodbye.
    alia.close(None).await.expect("close");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = sessions.session_snapshot(&code).await.unwrap();
    let record = snapshot
        .participants
        .iter()
        .find(|p| p.user_id.as_str() == "alia")
        .expect("record survives disconnect");
    assert!(!record.is_active);

    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::ParticipantLeft { .. })
    })
    .await;
    assert!(matches!(
        event,
        ServerEvent::ParticipantLeft { user_id } if user_id.as_str() == "alia"
    ));
}

// =========================================================================
// Chat and typing
// =========================================================================

#[tokio::test]
async fn test_chat_reaches_the_whole_room() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;
    drain_events(&mut alia).await;

    send_event(
        &mut alia,
        &ClientEvent::Chat { text: "anyone on problem 4?".into() },
    )
    .await;

    // Chat includes the sender, so both clients render the same line.
    for ws in [&mut host, &mut alia] {
        let event =
            recv_until(ws, |e| matches!(e, ServerEvent::Chat { .. })).await;
        match event {
            ServerEvent::Chat { user_id, display_name, text } => {
                assert_eq!(user_id.as_str(), "alia");
                assert_eq!(display_name, "alia");
                assert_eq!(text, "anyone on problem 4?");
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_typing_indicator_skips_the_sender() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;
    drain_events(&mut alia).await;

    send_event(&mut alia, &ClientEvent::Typing { is_typing: true }).await;

    let event =
        recv_until(&mut host, |e| matches!(e, ServerEvent::Typing { .. }))
            .await;
    assert!(matches!(
        event,
        ServerEvent::Typing { user_id, is_typing: true }
            if user_id.as_str() == "alia"
    ));

    // No echo back to the typist.
    assert_quiet(&mut alia).await;
}

#[tokio::test]
async fn test_chat_without_a_room_is_rejected() {
    let (addr, _, _) = start_engine().await;

    let mut ws = connect(&addr, "alia").await;
    send_event(&mut ws, &ClientEvent::Chat { text: "hello?".into() }).await;

    let event = recv_event(&mut ws).await;
    assert!(matches!(
        event,
        ServerEvent::Error { code: ErrorCode::NotParticipant, .. }
    ));
}

// =========================================================================
// Host controls
// =========================================================================

#[tokio::test]
async fn test_non_host_end_is_forbidden() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut alia).await;

    send_event(&mut alia, &ClientEvent::End { room_code: code.clone() })
        .await;

    let event = recv_event(&mut alia).await;
    match event {
        ServerEvent::Error { code, .. } => {
            assert_eq!(code, ErrorCode::Forbidden);
        }
        other => panic!("expected forbidden error, got {other:?}"),
    }

    // The attempt changed nothing.
    let snapshot = sessions.session_snapshot(&code).await.unwrap();
    assert!(snapshot.session.is_active);
}

#[tokio::test]
async fn test_host_end_broadcasts_ended_and_tears_down() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;
    let session_id = sessions
        .session_snapshot(&code)
        .await
        .unwrap()
        .session
        .session_id;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;
    drain_events(&mut alia).await;

    send_event(&mut host, &ClientEvent::End { room_code: code.clone() })
        .await;

    for ws in [&mut host, &mut alia] {
        let event =
            recv_until(ws, |e| matches!(e, ServerEvent::Ended { .. })).await;
        assert!(matches!(
            event,
            ServerEvent::Ended { session_id: id } if id == session_id
        ));
    }

    // The room is gone: a late joiner is told the session ended.
    let mut late = connect(&addr, "late").await;
    send_event(&mut late, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let event = recv_event(&mut late).await;
    match event {
        ServerEvent::Error { code, .. } => {
            assert_eq!(code, ErrorCode::SessionInactive);
        }
        other => panic!("expected session-inactive error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_kick_notifies_target_and_unbinds_them() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut host = connect(&addr, "host").await;
    send_event(&mut host, &ClientEvent::Join { room_code: code.clone() })
        .await;
    let mut alia = connect(&addr, "alia").await;
    send_event(&mut alia, &ClientEvent::Join { room_code: code.clone() })
        .await;
    drain_events(&mut host).await;
    drain_events(&mut alia).await;

    send_event(
        &mut host,
        &ClientEvent::Kick {
            room_code: code.clone(),
            user_id: UserId::from("alia"),
        },
    )
    .await;

    // The target hears why.
    let event = recv_until(&mut alia, |e| {
        matches!(e, ServerEvent::Notification { .. })
    })
    .await;
    match event {
        ServerEvent::Notification { event, data } => {
            assert_eq!(event, "session.kicked");
            assert_eq!(data["roomCode"], code.as_str());
        }
        other => panic!("expected kicked notification, got {other:?}"),
    }

    // The room sees a departure.
    let event = recv_until(&mut host, |e| {
        matches!(e, ServerEvent::ParticipantLeft { .. })
    })
    .await;
    assert!(matches!(
        event,
        ServerEvent::ParticipantLeft { user_id } if user_id.as_str() == "alia"
    ));

    // The kicked connection is no longer bound: room-scoped events
    // from it are refused at the door.
    send_event(&mut alia, &ClientEvent::Chat { text: "wait!".into() }).await;
    let event = recv_event(&mut alia).await;
    assert!(matches!(
        event,
        ServerEvent::Error { code: ErrorCode::NotParticipant, .. }
    ));
}

// =========================================================================
// Personal channel and malformed input
// =========================================================================

#[tokio::test]
async fn test_notification_reaches_only_the_target_user() {
    let (addr, _, router) = start_engine().await;

    let mut alia = connect(&addr, "alia").await;
    let mut ravi = connect(&addr, "ravi").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = router
        .notify(
            &UserId::from("alia"),
            "xp.award",
            serde_json::json!({ "amount": 50 }),
        )
        .await;
    assert_eq!(delivered, 1);

    let event = recv_event(&mut alia).await;
    match event {
        ServerEvent::Notification { event, data } => {
            assert_eq!(event, "xp.award");
            assert_eq!(data["amount"], 50);
        }
        other => panic!("expected notification, got {other:?}"),
    }

    assert_quiet(&mut ravi).await;
}

#[tokio::test]
async fn test_malformed_event_gets_bad_request_and_connection_survives() {
    let (addr, sessions, _) = start_engine().await;
    let code =
        create_room(&sessions, "host", 8, SessionSettings::default()).await;

    let mut ws = connect(&addr, "alia").await;
    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");

    let event = recv_event(&mut ws).await;
    match event {
        ServerEvent::Error { code, .. } => {
            assert_eq!(code, ErrorCode::BadRequest);
        }
        other => panic!("expected bad-request error, got {other:?}"),
    }

    // The connection still works afterwards.
    send_event(&mut ws, &ClientEvent::Join { room_code: code }).await;
    let event = recv_event(&mut ws).await;
    assert!(matches!(event, ServerEvent::State { .. }));
}
