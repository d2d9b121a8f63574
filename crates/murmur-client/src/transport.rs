use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_types::api::{ChatResponse, CreateChatRequest, HistoryQuery, SendMessageRequest};
use murmur_types::events::{GatewayCommand, GatewayEvent};
use murmur_types::{Chat, ChatError, Message};

use crate::error::ClientError;
use crate::session::ClientSession;

/// HTTP + gateway access to a Murmur server for one authenticated user.
#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// GET /chats/{chat_id}/messages
    pub async fn fetch_history(&self, chat_id: Uuid, query: HistoryQuery) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(format!("{}/chats/{}/messages", self.base_url, chat_id))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;

        let response = check_status(response, chat_id).await?;
        Ok(response.json().await?)
    }

    /// POST /chats: the direct chat with `other_user_id`, created on first use.
    pub async fn open_direct_chat(&self, other_user_id: Uuid) -> Result<Chat, ClientError> {
        let response = self
            .http
            .post(format!("{}/chats", self.base_url))
            .bearer_auth(&self.token)
            .json(&CreateChatRequest { other_user_id })
            .send()
            .await?;

        let response = check_status(response, other_user_id).await?;
        let body: ChatResponse = response.json().await?;
        Ok(body.chat)
    }

    /// POST /chats/{chat_id}/messages: send without a gateway connection.
    pub async fn post_message(&self, chat_id: Uuid, body: &str) -> Result<Message, ClientError> {
        let response = self
            .http
            .post(format!("{}/chats/{}/messages", self.base_url, chat_id))
            .bearer_auth(&self.token)
            .json(&SendMessageRequest { body: body.to_string() })
            .send()
            .await?;

        let response = check_status(response, chat_id).await?;
        Ok(response.json().await?)
    }

    /// Open the gateway with the token in the upgrade request and wait for
    /// `Ready`. A rejected token fails the upgrade with 401.
    pub async fn connect(&self) -> Result<GatewayConnection, ClientError> {
        let url = format!("{}/gateway?token={}", self.ws_base(), self.token);
        let mut connection = open_gateway(&url).await?;
        connection.await_ready().await?;
        Ok(connection)
    }

    /// Open the gateway without credentials and authenticate with an
    /// `Identify` command as the first frame.
    pub async fn identify(&self) -> Result<GatewayConnection, ClientError> {
        let url = format!("{}/gateway", self.ws_base());
        let mut connection = open_gateway(&url).await?;
        connection
            .send_command(&GatewayCommand::Identify {
                token: self.token.clone(),
            })
            .await?;
        connection.await_ready().await?;
        Ok(connection)
    }

    fn ws_base(&self) -> String {
        self.base_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1)
    }

    /// Open a chat on `connection`: join its room and fetch its history.
    ///
    /// The join and the fetch run concurrently; messages pushed before the
    /// fetch returns are reconciled with it by id.
    pub async fn sync_chat(
        &self,
        connection: &mut GatewayConnection,
        chat_id: Uuid,
        query: HistoryQuery,
    ) -> Result<usize, ClientError> {
        let ticket = {
            let session = connection.session_mut()?;
            session.open_chat(chat_id);
            if session.has_pending_fetch() {
                debug!("Superseding outstanding history fetch for chat {}", chat_id);
            }
            session
                .begin_history_fetch()
                .ok_or_else(|| ClientError::Protocol("no chat open".into()))?
        };

        let join = GatewayCommand::JoinChat { chat_id };
        let (joined, history) = tokio::join!(
            connection.send_command(&join),
            self.fetch_history(chat_id, query),
        );

        let session = connection.session_mut()?;
        let history = match (joined, history) {
            (Ok(()), Ok(history)) => history,
            (Err(e), _) | (_, Err(e)) => {
                session.abandon_history_fetch(ticket);
                return Err(e);
            }
        };

        Ok(session.complete_history_fetch(ticket, history).unwrap_or(0))
    }
}

async fn open_gateway(url: &str) -> Result<GatewayConnection, ClientError> {
    match tokio_tungstenite::connect_async(url).await {
        Ok((stream, _)) => Ok(GatewayConnection {
            stream,
            session: None,
        }),
        Err(WsError::Http(response)) if response.status().as_u16() == 401 => {
            warn!("Gateway refused the token");
            Err(ChatError::Unauthorized.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn check_status(response: reqwest::Response, subject: Uuid) -> Result<reqwest::Response, ClientError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(ChatError::Unauthorized.into()),
        StatusCode::NOT_FOUND => Err(ChatError::ChatNotFound(subject).into()),
        status => {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// A live gateway connection and the session state it feeds.
pub struct GatewayConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    session: Option<ClientSession>,
}

impl GatewayConnection {
    pub fn session(&self) -> Option<&ClientSession> {
        self.session.as_ref()
    }

    /// Wait for `Ready` and build the session from it. An `Error` frame
    /// instead means the `Identify` token was refused.
    async fn await_ready(&mut self) -> Result<(), ClientError> {
        loop {
            match self.read_event().await? {
                Some(event @ GatewayEvent::Ready { .. }) => {
                    self.session = ClientSession::from_ready(&event);
                    break;
                }
                Some(GatewayEvent::Error { kind, message }) => {
                    warn!("Gateway refused connection ({:?}): {}", kind, message);
                    return Err(ChatError::Unauthorized.into());
                }
                Some(other) => debug!("Ignoring {:?} before Ready", other),
                None => return Err(ClientError::Protocol("gateway closed before Ready".into())),
            }
        }

        if let Some(session) = &self.session {
            info!("Connected to gateway as {} ({})", session.username(), session.user_id());
        }
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut ClientSession, ClientError> {
        self.session
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("not identified".into()))
    }

    pub async fn send_command(&mut self, command: &GatewayCommand) -> Result<(), ClientError> {
        let text = serde_json::to_string(command)?;
        self.stream.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    pub async fn leave_chat(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        self.send_command(&GatewayCommand::LeaveChat { chat_id }).await?;
        let session = self.session_mut()?;
        if session.current_chat() == Some(chat_id) {
            session.close_chat();
        }
        Ok(())
    }

    pub async fn send_message(&mut self, chat_id: Uuid, body: &str) -> Result<(), ClientError> {
        let sender_id = self.session.as_ref().map(ClientSession::user_id);
        self.send_command(&GatewayCommand::SendMessage {
            chat_id,
            sender_id,
            body: body.to_string(),
        })
        .await
    }

    /// Next event from the gateway, already applied to the session.
    /// `None` once the server closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        let event = self.read_event().await?;
        if let (Some(event), Some(session)) = (&event, self.session.as_mut()) {
            session.apply_event(event);
        }
        Ok(event)
    }

    async fn read_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                WsMessage::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
                WsMessage::Close(_) => return Ok(None),
                // tungstenite answers pings itself
                _ => continue,
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
