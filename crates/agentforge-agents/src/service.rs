use agentforge_common::{ChatMessage, Error, Result, Role};
use agentforge_db::{AgentRecord, AgentStore, NewAgent, NewMessage, StoredMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{Instrument, error, info, instrument, warn};

use crate::classifier::{ImageReply, UpstreamReply, classify_chat, classify_image};
use crate::conversation::ConversationLog;
use crate::greeting::{greeting_for_goal, is_fresh_conversation, is_greeting};
use crate::naming;
use crate::request::RequestBuilder;
use crate::routing::{Route, classify_model};
use crate::transport::UpstreamTransport;

const OPENING_USER_MESSAGE: &str = "Hello agent, tell me what you can do.";
const IMAGE_OPENING_USER_MESSAGE: &str = "Hello, what can you do?";

const CONNECTION_FALLBACK: &str = "🔄 Connection hiccup! The server seems busy right now. Let's try again in a moment - I'm eager to help you!";
const EMPTY_CHOICES_FALLBACK: &str = "🤔 I think I lost my train of thought there! Let's try again - what would you like to know?";
const MALFORMED_CHOICE_FALLBACK: &str = "😅 I had a small hiccup processing that. Could you try rephrasing your question? I'd love to help!";
const UNEXPECTED_FALLBACK: &str = "⚡ Something unexpected happened! Could you try a shorter message or different wording? I'm here and ready to help! 👍";
const IMAGE_CONNECTION_FALLBACK: &str = "🖼️ I hit a small bump while creating your image. The server might be busy right now. Let's try again in a moment!";
const IMAGE_FAILED_FALLBACK: &str = "🎨 I couldn't create that image. This might be due to content filters or a technical glitch. Try a different description?";

/// Body of a create-agent call.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Agent metadata plus its ordered messages.
#[derive(Debug, Clone, Serialize)]
pub struct ChatHistory {
    pub agent_id: String,
    pub name: Option<String>,
    pub user_name: Option<String>,
    pub model: String,
    pub goal: String,
    pub tools: Vec<String>,
    pub is_image_model: bool,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub name: Option<String>,
    pub model: String,
    pub goal: String,
    pub tools: Vec<String>,
    pub is_image_model: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AgentRecord> for AgentSummary {
    fn from(record: AgentRecord) -> Self {
        Self {
            agent_id: record.id,
            name: record.name,
            model: record.model,
            goal: record.goal,
            tools: record.tools,
            is_image_model: record.is_image_model,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAgents {
    pub user_name: String,
    pub agents: Vec<AgentSummary>,
}

/// Orchestrates agent creation, chat turns, image turns, and naming.
///
/// Chat-facing calls absorb transport failures into a fallback reply.
/// Creation and naming surface every failure.
#[derive(Clone)]
pub struct AgentService {
    store: Arc<AgentStore>,
    log: ConversationLog,
    builder: Arc<RequestBuilder>,
    transport: Arc<dyn UpstreamTransport>,
}

impl AgentService {
    pub fn new(
        store: Arc<AgentStore>,
        builder: RequestBuilder,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Self {
        Self {
            log: ConversationLog::new(Arc::clone(&store)),
            store,
            builder: Arc::new(builder),
            transport,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    #[instrument(skip_all, fields(model = %request.model))]
    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<Value> {
        info!("creating agent with goal: {}", request.goal);

        let class = classify_model(&request.model);
        let agent = NewAgent {
            goal: request.goal.clone(),
            model: request.model.clone(),
            tools: request.tools,
            owner_name: request.user_name,
            name: request.name,
            is_image_model: class.is_image(),
        };
        agent.validate()?;

        if class.is_image() {
            self.builder.ensure_credential(Route::Image)?;
            return self.create_image_agent(&agent);
        }

        let system_prompt = format!("You are an agent with the goal: {}", agent.goal);
        let opening = ConversationLog::opening(&system_prompt, OPENING_USER_MESSAGE);
        let history: Vec<ChatMessage> = opening
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.clone()))
            .collect();

        let prepared = self.builder.build(&agent.model, &agent.goal, &history)?;
        let response = self.transport.send(&prepared).await.inspect_err(|e| {
            error!("agent creation failed to reach upstream: {e}");
        })?;

        match classify_chat(&agent.model, response.status, &response.body) {
            UpstreamReply::Completion { payload, message } => {
                let mut initial = opening.to_vec();
                initial.push(NewMessage::from(message));
                let record = self.store.create_agent(&agent, &initial)?;
                info!("created agent {}", record.id);
                Ok(with_agent_id(payload, &record.id))
            }
            UpstreamReply::EmptyChoices { payload } => {
                warn!("agent creation reply carried no choices, storing seeds only");
                let record = self.store.create_agent(&agent, &opening)?;
                Ok(with_agent_id(payload, &record.id))
            }
            UpstreamReply::MalformedChoice { payload } => {
                warn!("unreadable first choice in creation reply, storing seeds only");
                let record = self.store.create_agent(&agent, &opening)?;
                Ok(with_agent_id(
                    replace_first_choice(payload, MALFORMED_CHOICE_FALLBACK),
                    &record.id,
                ))
            }
            UpstreamReply::ProviderError { status, detail } => {
                error!("upstream rejected agent creation ({status}): {detail}");
                Err(Error::Upstream { status, detail })
            }
            UpstreamReply::Undecodable { reason } => {
                error!("undecodable creation reply: {reason}");
                Err(Error::Agent(format!("Unexpected error: {reason}")))
            }
        }
    }

    fn create_image_agent(&self, agent: &NewAgent) -> Result<Value> {
        let intro = format!(
            "🎨 Hi there! I'm an image generation assistant using {}. I can create images based on your text descriptions. Just describe what you'd like to see, and I'll make it for you!",
            agent.model
        );
        let mut initial = ConversationLog::opening(
            &format!("You are an image generation assistant using {}.", agent.model),
            IMAGE_OPENING_USER_MESSAGE,
        )
        .to_vec();
        initial.push(NewMessage::text(Role::Assistant, intro.clone()));

        let record = self.store.create_agent(agent, &initial)?;
        info!("created image agent {}", record.id);

        Ok(json!({
            "agent_id": record.id,
            "choices": [{
                "message": {"role": "assistant", "content": intro},
                "index": 0,
                "finish_reason": "stop"
            }],
            "model": agent.model,
            "is_image_model": true
        }))
    }

    /// Run one chat turn.
    ///
    /// The turn runs on its own task so a dropped caller cannot cancel it
    /// between the upstream reply and the append.
    pub async fn chat(&self, agent_id: &str, message: &str) -> Result<Value> {
        let this = self.clone();
        let agent_id = agent_id.to_string();
        let message = message.to_string();
        tokio::spawn(async move { this.chat_turn(&agent_id, &message).await }.in_current_span())
            .await
            .map_err(|e| Error::Agent(format!("chat turn aborted: {e}")))?
    }

    #[instrument(skip(self, message))]
    async fn chat_turn(&self, agent_id: &str, message: &str) -> Result<Value> {
        let agent = self.require_agent(agent_id)?;
        require_message(message)?;

        let _guard = self.log.lock(agent_id).await;
        let history = self.log.read(agent_id)?;
        let user = NewMessage::text(Role::User, message);

        if is_fresh_conversation(&history) && is_greeting(message) {
            info!("answering opening greeting locally");
            let greeting = greeting_for_goal(&agent.goal);
            self.log.append_turn(
                agent_id,
                user,
                NewMessage::text(Role::Assistant, greeting.clone()),
            )?;
            return Ok(json!({
                "agent_id": agent_id,
                "model": agent.model,
                "choices": [{
                    "message": {"role": "assistant", "content": greeting},
                    "index": 0,
                    "finish_reason": "stop"
                }]
            }));
        }

        let mut outbound = history;
        outbound.push(ChatMessage::user(message));
        let prepared = self.builder.build(&agent.model, &agent.goal, &outbound)?;

        let (reply, response) = match self.transport.send(&prepared).await {
            Err(Error::Transport(reason)) => {
                warn!("upstream unreachable, replying with fallback: {reason}");
                fallback_envelope(
                    CONNECTION_FALLBACK,
                    &agent.model,
                    Error::Transport(reason).to_string(),
                )
            }
            Err(e) => {
                error!("unexpected failure calling upstream: {e}");
                fallback_envelope(
                    UNEXPECTED_FALLBACK,
                    &agent.model,
                    format!("Unexpected error: {e}"),
                )
            }
            Ok(raw) => match classify_chat(&agent.model, raw.status, &raw.body) {
                UpstreamReply::Completion { payload, message } => (NewMessage::from(message), payload),
                UpstreamReply::EmptyChoices { mut payload } => {
                    warn!("no choices in upstream reply, replying with fallback");
                    let reply = NewMessage::text(Role::Assistant, EMPTY_CHOICES_FALLBACK);
                    if let Some(object) = payload.as_object_mut() {
                        object.insert(
                            "choices".to_string(),
                            json!([fallback_choice(EMPTY_CHOICES_FALLBACK)]),
                        );
                    }
                    (reply, payload)
                }
                UpstreamReply::MalformedChoice { payload } => {
                    warn!("unreadable first choice in upstream reply, replying with fallback");
                    let reply = NewMessage::text(Role::Assistant, MALFORMED_CHOICE_FALLBACK);
                    (reply, replace_first_choice(payload, MALFORMED_CHOICE_FALLBACK))
                }
                UpstreamReply::ProviderError { status, detail } => {
                    error!("upstream rejected chat turn ({status}): {detail}");
                    return Err(Error::Upstream { status, detail });
                }
                UpstreamReply::Undecodable { reason } => {
                    error!("undecodable chat reply: {reason}");
                    fallback_envelope(
                        UNEXPECTED_FALLBACK,
                        &agent.model,
                        format!("Unexpected error: {reason}"),
                    )
                }
            },
        };

        self.finish_turn(&agent, user, reply, response, UNEXPECTED_FALLBACK)
    }

    /// Run one image turn against an image-capable agent.
    pub async fn generate_image(&self, agent_id: &str, message: &str) -> Result<Value> {
        let this = self.clone();
        let agent_id = agent_id.to_string();
        let message = message.to_string();
        tokio::spawn(async move { this.image_turn(&agent_id, &message).await }.in_current_span())
            .await
            .map_err(|e| Error::Agent(format!("image turn aborted: {e}")))?
    }

    #[instrument(skip(self, message))]
    async fn image_turn(&self, agent_id: &str, message: &str) -> Result<Value> {
        let agent = self.require_agent(agent_id)?;
        if !agent.is_image_model {
            return Err(Error::Validation(
                "This agent is not an image generation model".to_string(),
            ));
        }
        require_message(message)?;

        let _guard = self.log.lock(agent_id).await;
        let prepared = self.builder.build_image(&agent.model, message)?;
        let user = NewMessage::text(Role::User, message);

        let (reply, response) = match self.transport.send(&prepared).await {
            Err(Error::Transport(reason)) => {
                warn!("image upstream unreachable, replying with fallback: {reason}");
                fallback_envelope(
                    IMAGE_CONNECTION_FALLBACK,
                    &agent.model,
                    Error::Transport(reason).to_string(),
                )
            }
            Err(e) => {
                error!("unexpected failure calling image upstream: {e}");
                fallback_envelope(
                    IMAGE_FAILED_FALLBACK,
                    &agent.model,
                    format!("Unexpected error: {e}"),
                )
            }
            Ok(raw) => match classify_image(&agent.model, raw.status, &raw.body) {
                ImageReply::Generated { data, url } => {
                    let content =
                        format!("🎨 Here's the image I created based on '{message}'! What do you think?");
                    let response = json!({
                        "choices": [{
                            "message": {
                                "role": "assistant",
                                "content": content,
                                "image_url": url.clone().unwrap_or_default()
                            },
                            "index": 0,
                            "finish_reason": "stop"
                        }],
                        "model": agent.model,
                        "data": data
                    });
                    let reply = NewMessage {
                        role: Role::Assistant,
                        content,
                        image_url: url,
                    };
                    (reply, response)
                }
                ImageReply::ProviderError { status, detail } => {
                    error!("image upstream rejected request ({status}): {detail}");
                    return Err(Error::Upstream { status, detail });
                }
                ImageReply::Undecodable { reason } => {
                    error!("undecodable image reply: {reason}");
                    fallback_envelope(
                        IMAGE_FAILED_FALLBACK,
                        &agent.model,
                        format!("Unexpected error: {reason}"),
                    )
                }
            },
        };

        self.finish_turn(&agent, user, reply, response, IMAGE_FAILED_FALLBACK)
    }

    /// Persist the turn. If that fails, try once more with a fallback reply
    /// so the caller still gets a conversational answer.
    fn finish_turn(
        &self,
        agent: &AgentRecord,
        user: NewMessage,
        reply: NewMessage,
        response: Value,
        fallback: &str,
    ) -> Result<Value> {
        match self.log.append_turn(&agent.id, user.clone(), reply) {
            Ok(()) => Ok(with_agent_id(response, &agent.id)),
            Err(e) => {
                error!("failed to persist turn for agent {}: {e}", agent.id);
                let (reply, envelope) =
                    fallback_envelope(fallback, &agent.model, format!("Unexpected error: {e}"));
                self.log
                    .append_turn(&agent.id, user, reply)
                    .map(|()| with_agent_id(envelope, &agent.id))
                    .map_err(|_| e)
            }
        }
    }

    pub fn chat_history(&self, agent_id: &str) -> Result<ChatHistory> {
        let agent = self.require_agent(agent_id)?;
        let messages = self.log.history(agent_id)?;
        Ok(ChatHistory {
            agent_id: agent.id,
            name: agent.name,
            user_name: agent.user_name,
            model: agent.model,
            goal: agent.goal,
            tools: agent.tools,
            is_image_model: agent.is_image_model,
            created_at: agent.created_at,
            messages,
        })
    }

    pub fn user_agents(&self, user_name: &str) -> Result<UserAgents> {
        let agents = self.store.list_agents_for_user(user_name)?;
        Ok(UserAgents {
            user_name: user_name.to_string(),
            agents: agents.into_iter().map(AgentSummary::from).collect(),
        })
    }

    pub async fn suggest_name(&self, goal: &str) -> Result<String> {
        if goal.trim().is_empty() {
            return Err(Error::Validation("Agent goal is required".to_string()));
        }
        naming::suggest_name(&self.builder, self.transport.as_ref(), goal).await
    }

    fn require_agent(&self, agent_id: &str) -> Result<AgentRecord> {
        self.store.get_agent(agent_id)?.ok_or_else(|| {
            Error::NotFound("Agent not found. Create an agent first.".to_string())
        })
    }
}

fn require_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(Error::Validation("Message is required".to_string()));
    }
    Ok(())
}

fn assistant_json(content: &str) -> Value {
    json!({"role": "assistant", "content": content})
}

fn fallback_choice(content: &str) -> Value {
    json!({"message": assistant_json(content), "index": 0, "finish_reason": "error"})
}

fn replace_first_choice(mut payload: Value, content: &str) -> Value {
    if let Some(first) = payload
        .get_mut("choices")
        .and_then(Value::as_array_mut)
        .and_then(|choices| choices.first_mut())
    {
        *first = fallback_choice(content);
    }
    payload
}

fn fallback_envelope(content: &str, model: &str, error: String) -> (NewMessage, Value) {
    (
        NewMessage::text(Role::Assistant, content),
        json!({
            "choices": [fallback_choice(content)],
            "model": model,
            "error": error
        }),
    )
}

fn with_agent_id(mut payload: Value, agent_id: &str) -> Value {
    if let Some(object) = payload.as_object_mut() {
        object.insert("agent_id".to_string(), json!(agent_id));
    }
    payload
}
