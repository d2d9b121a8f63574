use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use murmur_types::ChatError;
use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::identity::{Identity, IdentityResolver};
use crate::registry::SessionHandle;
use crate::router::MessageRouter;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SESSION_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Outbound events buffered per session before live deliveries are dropped.
    pub session_queue: usize,
    pub heartbeat_interval: Duration,
    pub identify_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_queue: DEFAULT_SESSION_QUEUE,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            identify_timeout: IDENTIFY_TIMEOUT,
        }
    }
}

/// Everything the `/gateway` route needs.
#[derive(Clone)]
pub struct GatewayState {
    pub router: MessageRouter,
    pub resolver: Arc<dyn IdentityResolver>,
    pub config: GatewayConfig,
}

/// The `/gateway` WebSocket route, to be merged into the server's router.
pub fn routes(state: GatewayState) -> Router {
    Router::new().route("/gateway", get(ws_upgrade)).with_state(state)
}

/// GET /gateway: a `?token=` query authenticates at upgrade time and a bad
/// token is refused with 401; without one the client must send `Identify`
/// as its first frame.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.get("token") else {
        return ws
            .on_upgrade(move |socket| handle_connection(socket, state.router, state.resolver, state.config))
            .into_response();
    };

    match state.resolver.resolve(token) {
        Ok(identity) => ws
            .on_upgrade(move |socket| handle_connection_authenticated(socket, state.router, identity, state.config))
            .into_response(),
        Err(err) => {
            warn!("Gateway upgrade rejected: {}", err);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Handle a WebSocket whose token was already verified at the HTTP upgrade,
/// so the Identify handshake is skipped.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    router: MessageRouter,
    identity: Identity,
    config: GatewayConfig,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway (pre-authenticated)", identity.username, identity.user_id);

    if send_event(&mut sender, &ready(&identity)).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, router, identity, config).await;
}

/// Handle a WebSocket that must authenticate with an `Identify` command first.
pub async fn handle_connection(
    socket: WebSocket,
    router: MessageRouter,
    resolver: Arc<dyn IdentityResolver>,
    config: GatewayConfig,
) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match wait_for_identify(&mut receiver, resolver.as_ref(), config.identify_timeout).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("WebSocket client failed to identify, closing");
            let _ = send_event(&mut sender, &error_event(&err)).await;
            return;
        }
    };

    info!("{} ({}) connected to gateway", identity.username, identity.user_id);

    if send_event(&mut sender, &ready(&identity)).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, router, identity, config).await;
}

type WsSink = futures_util::stream::SplitSink<WebSocket, Message>;
type WsStream = futures_util::stream::SplitStream<WebSocket>;

async fn run_connection_loop(
    mut sender: WsSink,
    mut receiver: WsStream,
    router: MessageRouter,
    identity: Identity,
    config: GatewayConfig,
) {
    let (session, mut session_rx) = SessionHandle::new(identity.user_id, config.session_queue);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let heartbeat_interval = config.heartbeat_interval;
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = session_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_router = router.clone();
    let recv_session = session.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_router, &recv_session, &recv_identity, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.user_id,
                            e,
                            truncate(&text, 200)
                        );
                        let err = ChatError::Validation(format!("malformed command: {}", e));
                        let _ = recv_session.deliver(error_event(&err));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    router.disconnect(&session).await;
    info!("{} ({}) disconnected from gateway", identity.username, identity.user_id);
}

async fn wait_for_identify(
    receiver: &mut WsStream,
    resolver: &dyn IdentityResolver,
    timeout: Duration,
) -> Result<Identity, ChatError> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return resolver.resolve(&token);
                }
            }
        }
        Err(ChatError::Unauthorized)
    };

    tokio::time::timeout(timeout, identify)
        .await
        .unwrap_or(Err(ChatError::Unauthorized))
}

/// Apply one client command. Failures go back to this session only.
pub async fn handle_command(
    router: &MessageRouter,
    session: &SessionHandle,
    identity: &Identity,
    cmd: GatewayCommand,
) {
    let result = match cmd {
        GatewayCommand::Identify { .. } => Ok(()), // Already handled

        GatewayCommand::JoinChat { chat_id } => {
            router.join(session, chat_id).await;
            Ok(())
        }

        GatewayCommand::LeaveChat { chat_id } => {
            router.leave(session, chat_id).await;
            Ok(())
        }

        GatewayCommand::SendMessage {
            chat_id,
            sender_id,
            body,
        } => match sender_id {
            Some(claimed) if claimed != identity.user_id => {
                warn!(
                    "{} ({}) tried to send as {}",
                    identity.username, identity.user_id, claimed
                );
                Err(ChatError::Unauthorized)
            }
            _ => router.send(chat_id, identity.user_id, &body).await.map(|_| ()),
        },
    };

    if let Err(err) = result {
        debug!("{} ({}) command failed: {}", identity.username, identity.user_id, err);
        let _ = session.deliver(error_event(&err));
    }
}

fn ready(identity: &Identity) -> GatewayEvent {
    GatewayEvent::Ready {
        user_id: identity.user_id,
        username: identity.username.clone(),
    }
}

fn error_event(err: &ChatError) -> GatewayEvent {
    GatewayEvent::Error {
        kind: err.kind(),
        message: err.to_string(),
    }
}

async fn send_event(sender: &mut WsSink, event: &GatewayEvent) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| warn!("Failed to encode event: {}", e))?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| debug!("WebSocket send failed: {}", e))
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_db::{Database, MessageStore};
    use murmur_types::ErrorKind;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::router::DEFAULT_SEND_TIMEOUT;

    fn setup() -> (MessageRouter, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (MessageRouter::new(db.clone(), DEFAULT_SEND_TIMEOUT), db)
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "ada".into(),
        }
    }

    fn next_event(rx: &mut mpsc::Receiver<GatewayEvent>) -> Option<GatewayEvent> {
        rx.try_recv().ok()
    }

    #[tokio::test]
    async fn join_then_send_echoes_to_sender() {
        let (router, db) = setup();
        let me = identity();
        let chat = db.find_or_create_direct_chat(me.user_id, Uuid::new_v4()).unwrap();
        let (session, mut rx) = SessionHandle::new(me.user_id, 8);

        handle_command(&router, &session, &me, GatewayCommand::JoinChat { chat_id: chat.id }).await;
        handle_command(
            &router,
            &session,
            &me,
            GatewayCommand::SendMessage {
                chat_id: chat.id,
                sender_id: Some(me.user_id),
                body: "hello".into(),
            },
        )
        .await;

        match next_event(&mut rx) {
            Some(GatewayEvent::ReceiveMessage(m)) => {
                assert_eq!(m.body, "hello");
                assert_eq!(m.sender_id, me.user_id);
            }
            other => panic!("expected ReceiveMessage, got {:?}", other),
        }
        assert!(next_event(&mut rx).is_none());
    }

    #[tokio::test]
    async fn impersonation_is_rejected() {
        let (router, db) = setup();
        let me = identity();
        let other = Uuid::new_v4();
        let chat = db.find_or_create_direct_chat(me.user_id, other).unwrap();
        let (session, mut rx) = SessionHandle::new(me.user_id, 8);
        router.join(&session, chat.id).await;

        handle_command(
            &router,
            &session,
            &me,
            GatewayCommand::SendMessage {
                chat_id: chat.id,
                sender_id: Some(other),
                body: "not me".into(),
            },
        )
        .await;

        match next_event(&mut rx) {
            Some(GatewayEvent::Error { kind, .. }) => assert_eq!(kind, ErrorKind::Unauthorized),
            other => panic!("expected Error, got {:?}", other),
        }
        assert_eq!(db.count_messages(&chat.id.to_string()).unwrap(), 0);
    }

    #[tokio::test]
    async fn errors_go_to_the_sending_session_only() {
        let (router, db) = setup();
        let me = identity();
        let peer = identity();
        let chat = db.find_or_create_direct_chat(me.user_id, peer.user_id).unwrap();
        let (mine, mut my_rx) = SessionHandle::new(me.user_id, 8);
        let (theirs, mut their_rx) = SessionHandle::new(peer.user_id, 8);
        router.join(&mine, chat.id).await;
        router.join(&theirs, chat.id).await;

        handle_command(
            &router,
            &mine,
            &me,
            GatewayCommand::SendMessage {
                chat_id: chat.id,
                sender_id: None,
                body: "   ".into(),
            },
        )
        .await;

        match next_event(&mut my_rx) {
            Some(GatewayEvent::Error { kind, .. }) => assert_eq!(kind, ErrorKind::ValidationError),
            other => panic!("expected Error, got {:?}", other),
        }
        assert!(next_event(&mut their_rx).is_none());
    }

    #[tokio::test]
    async fn leave_command_unsubscribes() {
        let (router, db) = setup();
        let me = identity();
        let chat = db.find_or_create_direct_chat(me.user_id, Uuid::new_v4()).unwrap();
        let (session, _rx) = SessionHandle::new(me.user_id, 8);

        handle_command(&router, &session, &me, GatewayCommand::JoinChat { chat_id: chat.id }).await;
        assert_eq!(router.rooms().members(chat.id).await, vec![session.clone()]);

        handle_command(&router, &session, &me, GatewayCommand::LeaveChat { chat_id: chat.id }).await;
        assert!(router.rooms().members(chat.id).await.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("short", 200), "short");
    }
}
