//! A small, runnable Studyhall server: one pre-created study group,
//! development auth, everything in memory.
//!
//! Run it, then connect WebSocket clients with any name as the token:
//!
//! ```text
//! ws://127.0.0.1:8080/?token=alia
//! ws://127.0.0.1:8080/?token=okafor:instructor
//! ```
//!
//! and join the room code printed at startup. Set `STUDYHALL_ADDR` to
//! bind somewhere else, and `RUST_LOG` to adjust logging.

use studyhall::prelude::*;

/// Accepts tokens of the form `name` or `name:instructor`.
///
/// Anyone may enter under any name — fine for a demo, obviously not
/// for production. A real deployment implements [`IdentityVerifier`]
/// against its auth provider instead.
struct DemoVerifier;

impl IdentityVerifier for DemoVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let (name, role) = match credential.split_once(':') {
            Some((name, "instructor")) => (name, Role::Instructor),
            Some((name, _)) => (name, Role::Student),
            None => (credential, Role::Student),
        };
        if name.is_empty() {
            return Err(AuthError::InvalidCredential(
                "token carries no name".into(),
            ));
        }
        Ok(Identity {
            user_id: UserId::from(name),
            display_name: name.to_string(),
            role,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "study_night=info,studyhall=info".into()),
        )
        .init();

    let addr = std::env::var("STUDYHALL_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let engine = EngineBuilder::new()
        .bind(&addr)
        .build(DemoVerifier, MemoryStore::new())
        .await?;

    // One session is waiting before the first client connects, so the
    // printed room code can go straight onto the projector.
    let sessions = engine.sessions();
    let host = Identity {
        user_id: UserId::from("okafor"),
        display_name: "Prof. Okafor".to_string(),
        role: Role::Instructor,
    };
    let snapshot = sessions
        .create_session(
            &host,
            SessionKind::StudyGroup,
            12,
            SessionSettings::default(),
        )
        .await?;

    tracing::info!(
        addr = %engine.local_addr()?,
        room_code = %snapshot.session.room_code,
        "study night is open, join with the room code"
    );

    engine.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Boots the demo wiring on a random port; returns the address and
    /// the pre-created session's room code.
    async fn start() -> (String, RoomCode) {
        let engine = EngineBuilder::new()
            .bind("127.0.0.1:0")
            .build(DemoVerifier, MemoryStore::new())
            .await
            .unwrap();
        let addr = engine.local_addr().unwrap().to_string();

        let sessions = engine.sessions();
        let host = Identity {
            user_id: UserId::from("okafor"),
            display_name: "Prof. Okafor".to_string(),
            role: Role::Instructor,
        };
        let snapshot = sessions
            .create_session(
                &host,
                SessionKind::StudyGroup,
                12,
                SessionSettings::default(),
            )
            .await
            .unwrap();

        tokio::spawn(async move {
            let _ = engine.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        (addr, snapshot.session.room_code)
    }

    async fn ws(addr: &str, token: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{addr}/?token={token}"
        ))
        .await
        .unwrap();
        ws
    }

    fn enc(event: &ClientEvent) -> Message {
        Message::Binary(JsonCodec.encode(event).unwrap().into())
    }

    fn dec(msg: Message) -> ServerEvent {
        JsonCodec.decode(&msg.into_data()).unwrap()
    }

    #[tokio::test]
    async fn test_verifier_parses_name_and_role() {
        let prof = DemoVerifier.verify("okafor:instructor").await.unwrap();
        assert_eq!(prof.role, Role::Instructor);
        assert_eq!(prof.display_name, "okafor");

        let student = DemoVerifier.verify("alia").await.unwrap();
        assert_eq!(student.role, Role::Student);

        assert!(DemoVerifier.verify(":instructor").await.is_err());
    }

    #[tokio::test]
    async fn test_demo_session_is_joinable_over_the_wire() {
        let (addr, code) = start().await;

        let mut client = ws(&addr, "alia").await;
        client
            .send(enc(&ClientEvent::Join { room_code: code.clone() }))
            .await
            .unwrap();

        let msg = client.next().await.unwrap().unwrap();
        match dec(msg) {
            ServerEvent::State { session, participants } => {
                assert_eq!(session.room_code, code);
                assert_eq!(session.host_user_id.as_str(), "okafor");
                assert_eq!(participants.len(), 2);
            }
            other => panic!("expected session.state, got {other:?}"),
        }
    }
}
