use agentforge_agents::{ChatHistory, CreateAgentRequest, UserAgents};
use agentforge_common::Error;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AgentNameRequest {
    #[serde(default)]
    pub goal: String,
}

/// Error body returned by every endpoint: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

/// Bodies that are not valid JSON for the endpoint are client errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("request failed with {}: {}", status, self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Agent Creation API. Use POST /create-agent to create a new agent."
    }))
}

pub async fn health() -> &'static str {
    "ok"
}

/// POST /create-agent
pub async fn create_agent(
    State(state): State<SharedState>,
    body: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    Ok(Json(state.agents.create_agent(body).await?))
}

/// POST /chat-agent
pub async fn chat_agent(
    State(state): State<SharedState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    info!("chat request for agent {}", body.agent_id);
    Ok(Json(state.agents.chat(&body.agent_id, &body.message).await?))
}

/// POST /generate-image
pub async fn generate_image(
    State(state): State<SharedState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    info!("image request for agent {}", body.agent_id);
    Ok(Json(
        state
            .agents
            .generate_image(&body.agent_id, &body.message)
            .await?,
    ))
}

/// POST /agent-name
pub async fn agent_name(
    State(state): State<SharedState>,
    body: Result<Json<AgentNameRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let name = state.agents.suggest_name(&body.goal).await?;
    Ok(Json(json!({ "name": name })))
}

/// GET /chat-history/{agent_id}
pub async fn chat_history(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
) -> ApiResult<ChatHistory> {
    Ok(Json(state.agents.chat_history(&agent_id)?))
}

/// GET /user-agents/{user_name}
pub async fn user_agents(
    State(state): State<SharedState>,
    Path(user_name): Path<String>,
) -> ApiResult<UserAgents> {
    Ok(Json(state.agents.user_agents(&user_name)?))
}
