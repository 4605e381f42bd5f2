//! One user's conversation with the assistant: the transcript, the send state
//! machine and the event feed observers subscribe to.

use crate::actions::{ActionDispatcher, ActionOutcome};
use crate::constants::{APOLOGY_MESSAGE, SESSION_EVENT_CAPACITY, WELCOME_MESSAGE_ID};
use crate::context::build_context;
use crate::db::DbPool;
use crate::sse::frame_stream;
use crate::store::{chat_log, profiles};
use crate::streaming::{StreamHandler, StreamOutcome};
use crate::transport::{ChatRequest, ChatTransport};
use crate::types::{CounsellorError, Message, Result, Role, WireMessage};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Idle,
    Sending,
    Streaming,
    Done,
    Error,
}

impl SendState {
    pub fn is_busy(&self) -> bool {
        matches!(self, SendState::Sending | SendState::Streaming)
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    MessageAdded(Message),
    /// Full replacement content for an existing message.
    MessageUpdated { id: String, content: String },
    StateChanged(SendState),
    ActionApplied(ActionOutcome),
    /// Store data may have changed; dependent views should re-fetch.
    Refresh,
}

pub fn welcome_message(first_name: Option<&str>) -> Message {
    let name = first_name.filter(|n| !n.is_empty()).unwrap_or("there");
    Message {
        id: WELCOME_MESSAGE_ID.to_string(),
        role: Role::Assistant,
        content: format!(
            "Hello {}! 👋 I'm your AI Counsellor, here to guide you through your study abroad journey.\n\n\
             Based on your profile, I can help you with:\n\
             - **Understanding your profile strengths and gaps**\n\
             - **Recommending universities** (Dream, Target, or Safe)\n\
             - **Explaining why universities fit** your profile\n\
             - **Shortlisting and locking universities**\n\
             - **Creating personalized to-do tasks**\n\n\
             What would you like to discuss today?",
            name
        ),
    }
}

struct Transcript {
    messages: Vec<Message>,
    state: SendState,
    events: broadcast::Sender<SessionEvent>,
}

impl Transcript {
    fn push(&mut self, message: Message) {
        self.messages.push(message.clone());
        let _ = self.events.send(SessionEvent::MessageAdded(message));
    }

    fn replace_content(&mut self, id: &str, content: &str) {
        if let Some(m) = self.messages.iter_mut().find(|m| m.id == id) {
            m.content.clear();
            m.content.push_str(content);
            let _ = self.events.send(SessionEvent::MessageUpdated {
                id: id.to_string(),
                content: content.to_string(),
            });
        }
    }

    fn set_state(&mut self, state: SendState) {
        if self.state != state {
            tracing::debug!("Send state {:?} -> {:?}", self.state, state);
            self.state = state;
            let _ = self.events.send(SessionEvent::StateChanged(state));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    pub state: SendState,
    /// Final assistant text, or the apology when the exchange failed.
    pub reply: String,
}

pub struct ChatSession {
    pool: DbPool,
    user_id: String,
    transport: ChatTransport,
    dispatcher: ActionDispatcher,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(pool: DbPool, transport: ChatTransport, user_id: impl Into<String>, first_name: Option<&str>) -> Self {
        let user_id = user_id.into();
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let dispatcher = ActionDispatcher::new(pool.clone(), user_id.clone(), events.clone());
        Self {
            pool,
            user_id,
            transport,
            dispatcher,
            transcript: Transcript {
                messages: vec![welcome_message(first_name)],
                state: SendState::Idle,
                events,
            },
        }
    }

    /// Opens a session greeting the user by the first word of their profile name.
    pub async fn start(pool: DbPool, transport: ChatTransport, user_id: &str) -> Result<Self> {
        let profile = profiles::get_profile(&pool, user_id).await?;
        let first_name = profile.as_ref().and_then(|p| p.first_name());
        Ok(Self::new(pool, transport, user_id, first_name))
    }

    pub fn messages(&self) -> &[Message] {
        &self.transcript.messages
    }

    pub fn state(&self) -> SendState {
        self.transcript.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.transcript.events.subscribe()
    }

    /// Sends one user message and streams the reply into the transcript.
    ///
    /// Transport and stream failures never surface here: they end the exchange with a single
    /// apology message and `SendState::Error`. `Err` is reserved for rejected input.
    pub async fn send(&mut self, text: &str) -> Result<SendReport> {
        if self.transcript.state.is_busy() {
            return Err(CounsellorError::Busy.into());
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(CounsellorError::Validation("message is empty".into()).into());
        }

        let mut history: Vec<WireMessage> = self
            .transcript
            .messages
            .iter()
            .filter(|m| !m.is_welcome())
            .map(WireMessage::from)
            .collect();
        let user_message = Message::user(text);
        history.push(WireMessage::from(&user_message));

        self.transcript.push(user_message);
        self.transcript.set_state(SendState::Sending);

        match self.exchange(history).await {
            Ok(outcome) => {
                self.transcript.set_state(SendState::Done);
                if let Err(e) =
                    chat_log::append_exchange(&self.pool, &self.user_id, text, &outcome.content).await
                {
                    tracing::error!("Failed to persist chat exchange: {}", e);
                }
                Ok(SendReport {
                    state: SendState::Done,
                    reply: outcome.content,
                })
            }
            Err(e) => {
                tracing::error!("Chat exchange failed: {}", e);
                self.transcript.push(Message::assistant(APOLOGY_MESSAGE));
                self.transcript.set_state(SendState::Error);
                Ok(SendReport {
                    state: SendState::Error,
                    reply: APOLOGY_MESSAGE.to_string(),
                })
            }
        }
    }

    async fn exchange(&mut self, messages: Vec<WireMessage>) -> Result<StreamOutcome> {
        let context = build_context(&self.pool, &self.user_id).await?;
        let request = ChatRequest {
            messages,
            context,
            user_id: self.user_id.clone(),
        };

        let body = self.transport.open_stream(&request).await?;
        self.transcript.set_state(SendState::Streaming);

        let reply = Message::assistant("");
        let reply_id = reply.id.clone();
        self.transcript.push(reply);

        let Self {
            transcript,
            dispatcher,
            ..
        } = self;
        StreamHandler::handle_stream(frame_stream(body), Some(&*dispatcher), |full| {
            transcript.replace_content(&reply_id, full)
        })
        .await
    }
}
