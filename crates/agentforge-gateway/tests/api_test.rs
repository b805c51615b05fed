use agentforge_agents::{AgentService, HttpTransport, RequestBuilder};
use agentforge_config::{AppConfig, UpstreamConfig};
use agentforge_db::AgentStore;
use agentforge_gateway::{AppState, build_router};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app_for(upstream_uri: &str) -> Router {
    app_with(UpstreamConfig {
        together_base_url: upstream_uri.to_string(),
        ..Default::default()
    })
}

fn app_with(upstream: UpstreamConfig) -> Router {
    let config = AppConfig {
        upstream,
        ..Default::default()
    };
    let builder = RequestBuilder::from_config(&config.upstream, |key| {
        (key == "TOGETHER_API_KEY").then(|| "tg-test".to_string())
    });
    let store = Arc::new(AgentStore::in_memory().unwrap());
    let agents = AgentService::new(store, builder, Arc::new(HttpTransport::new()));
    build_router(Arc::new(AppState::new(config, agents)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn root_and_health() {
    let app = app_for("http://127.0.0.1:9");
    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().starts_with("Welcome"));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn create_chat_and_read_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Happy to help!")))
        .mount(&server)
        .await;
    let app = app_for(&server.uri());

    let (status, created) = send(
        &app,
        post_json(
            "/create-agent",
            json!({"goal": "explain physics", "model": "llama-3", "user_name": "marie"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let agent_id = created["agent_id"].as_str().unwrap().to_string();

    let (status, reply) = send(
        &app,
        post_json(
            "/chat-agent",
            json!({"agent_id": agent_id, "message": "why is the sky blue?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["choices"][0]["message"]["content"], "Happy to help!");

    let (status, history) = send(&app, get(&format!("/chat-history/{agent_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["goal"], "explain physics");
    assert_eq!(history["user_name"], "marie");
    let roles: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant"]);

    let (status, listing) = send(&app, get("/user-agents/marie")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["agents"][0]["agent_id"], agent_id.as_str());
}

#[tokio::test]
async fn validation_and_not_found_use_detail_body() {
    let app = app_for("http://127.0.0.1:9");

    let (status, body) = send(
        &app,
        post_json("/create-agent", json!({"goal": "", "model": "llama"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Agent goal is required"}));

    let (status, body) = send(
        &app,
        post_json("/chat-agent", json!({"agent_id": "missing", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Agent not found. Create an agent first."}));

    let (status, _) = send(
        &app,
        post_json("/generate-image", json!({"agent_id": "missing", "message": "a cat"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/user-agents/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_or_malformed_fields_are_400_with_detail() {
    let app = app_for("http://127.0.0.1:9");

    let (status, body) = send(&app, post_json("/create-agent", json!({"model": "llama"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Agent goal is required"}));

    let (status, body) = send(&app, post_json("/create-agent", json!({"goal": "cook"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Model name is required"}));

    let (status, body) = send(&app, post_json("/agent-name", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Agent goal is required"}));

    let (status, body) = send(
        &app,
        post_json("/create-agent", json!({"goal": "cook", "model": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some());

    let request = Request::builder()
        .method("POST")
        .uri("/chat-agent")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some());
}

#[tokio::test]
async fn chat_transport_failure_is_a_200_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ready")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // every later call outlives the client timeout
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let app = app_with(UpstreamConfig {
        together_base_url: server.uri(),
        chat_timeout_secs: 1,
        ..Default::default()
    });

    let (_, created) = send(
        &app,
        post_json("/create-agent", json!({"goal": "chat", "model": "llama"})),
    )
    .await;
    let agent_id = created["agent_id"].as_str().unwrap().to_string();

    let (status, reply) = send(
        &app,
        post_json(
            "/chat-agent",
            json!({"agent_id": agent_id, "message": "still there?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        reply["choices"][0]["message"]["content"]
            .as_str()
            .unwrap()
            .starts_with("🔄 Connection hiccup!")
    );
    assert!(reply["error"].as_str().unwrap().starts_with("HTTP Request error:"));

    let (_, history) = send(&app, get(&format!("/chat-history/{agent_id}"))).await;
    assert_eq!(history["messages"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn upstream_status_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "quota exhausted"}})),
        )
        .mount(&server)
        .await;
    let app = app_for(&server.uri());

    let (status, body) = send(
        &app,
        post_json("/create-agent", json!({"goal": "chat", "model": "llama"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["detail"],
        "API rate limit or quota exceeded for llama. Please try again later."
    );
}

#[tokio::test]
async fn agent_name_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Budget Buddy.")))
        .mount(&server)
        .await;
    let app = app_for(&server.uri());

    let (status, body) = send(
        &app,
        post_json("/agent-name", json!({"goal": "track my spending"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Budget Buddy"}));
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = app_for("http://127.0.0.1:9");
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/chat-agent")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}
