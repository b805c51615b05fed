use agentforge_common::{ChatMessage, Error, Result, Role};
use agentforge_config::UpstreamConfig;
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::routing::{Route, classify_model, upstream_model_name};

/// Marker that identifies an already augmented system prompt.
pub const GUIDELINES_MARKER: &str = "Important guidelines for your responses:";

const IMAGE_SIZE: &str = "1024x1024";

/// Endpoint, credential, and timeout for one upstream route.
#[derive(Clone)]
pub struct ProviderProfile {
    pub route: Route,
    pub endpoint: String,
    pub key_env: String,
    api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderProfile {
    pub fn new(
        route: Route,
        endpoint: impl Into<String>,
        key_env: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            route,
            endpoint: endpoint.into(),
            key_env: key_env.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn credential(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "{} API key not found in environment variables",
                self.route.provider_name()
            ))
        })
    }
}

impl fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("route", &self.route)
            .field("endpoint", &self.endpoint)
            .field("key_env", &self.key_env)
            .field("has_credential", &self.has_credential())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A fully assembled outbound call. Building one performs no I/O.
#[derive(Clone)]
pub struct PreparedRequest {
    pub route: Route,
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("PreparedRequest")
            .field("route", &self.route)
            .field("endpoint", &self.endpoint)
            .field("headers", &header_names)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builds chat, image, and naming requests from an agent's model and history.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    together: ProviderProfile,
    openai: ProviderProfile,
    image: ProviderProfile,
    naming_model: String,
    naming_timeout: Duration,
}

impl RequestBuilder {
    pub fn new(
        together: ProviderProfile,
        openai: ProviderProfile,
        image: ProviderProfile,
        naming_model: impl Into<String>,
        naming_timeout: Duration,
    ) -> Self {
        Self {
            together,
            openai,
            image,
            naming_model: naming_model.into(),
            naming_timeout,
        }
    }

    /// Resolve endpoints from config and credentials through `lookup`.
    pub fn from_config<F>(config: &UpstreamConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let together_base = config.together_base_url.trim_end_matches('/');
        let openai_base = config.openai_base_url.trim_end_matches('/');
        let together_key = lookup(&config.together_key_env);
        let openai_key = lookup(&config.openai_key_env);
        let chat_timeout = Duration::from_secs(config.chat_timeout_secs);

        Self::new(
            ProviderProfile::new(
                Route::Together,
                format!("{together_base}/chat/completions"),
                &config.together_key_env,
                together_key.clone(),
                chat_timeout,
            ),
            ProviderProfile::new(
                Route::OpenAi,
                format!("{openai_base}/chat/completions"),
                &config.openai_key_env,
                openai_key,
                chat_timeout,
            ),
            ProviderProfile::new(
                Route::Image,
                format!("{together_base}/images/generations"),
                &config.together_key_env,
                together_key,
                Duration::from_secs(config.image_timeout_secs),
            ),
            &config.naming_model,
            Duration::from_secs(config.naming_timeout_secs),
        )
    }

    pub fn profile(&self, route: Route) -> &ProviderProfile {
        match route {
            Route::Together => &self.together,
            Route::OpenAi => &self.openai,
            Route::Image => &self.image,
        }
    }

    /// Fail with a configuration error when `route` has no credential.
    pub fn ensure_credential(&self, route: Route) -> Result<()> {
        self.profile(route).credential().map(|_| ())
    }

    /// Chat-completion request for `model_id` over `history`.
    ///
    /// The returned messages are a copy: augmentation never touches the
    /// caller's history.
    pub fn build(&self, model_id: &str, goal: &str, history: &[ChatMessage]) -> Result<PreparedRequest> {
        let class = classify_model(model_id);
        if class.is_image() {
            return Err(Error::Validation(format!(
                "{model_id} is an image generation model. Use /generate-image instead."
            )));
        }

        let mut messages = history.to_vec();
        let overlay = class.overlay();
        if overlay.is_some() {
            augment_system_prompt(&mut messages, goal);
        }

        let mut body = Map::new();
        body.insert(
            "model".to_string(),
            json!(upstream_model_name(class.route, model_id)),
        );
        body.insert("messages".to_string(), json!(messages));
        if let Some(overlay) = overlay {
            debug!("applying {:?} sampling overlay for {}", class.family, model_id);
            overlay.apply(&mut body);
        }

        let profile = self.profile(class.route);
        self.prepare(profile, Value::Object(body), profile.timeout)
    }

    /// Image-generation request for `model_id`.
    pub fn build_image(&self, model_id: &str, prompt: &str) -> Result<PreparedRequest> {
        if !classify_model(model_id).is_image() {
            return Err(Error::Validation(
                "This agent is not an image generation model".to_string(),
            ));
        }
        let body = json!({
            "model": model_id,
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
        });
        self.prepare(&self.image, body, self.image.timeout)
    }

    /// Request against the default chat provider using the naming model.
    pub fn build_naming(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
    ) -> Result<PreparedRequest> {
        let body = json!({
            "model": self.naming_model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        self.prepare(&self.together, body, self.naming_timeout)
    }

    fn prepare(
        &self,
        profile: &ProviderProfile,
        body: Value,
        timeout: Duration,
    ) -> Result<PreparedRequest> {
        let key = profile.credential()?;
        Ok(PreparedRequest {
            route: profile.route,
            endpoint: profile.endpoint.clone(),
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {key}")),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
            timeout,
        })
    }
}

/// Rewrite a leading system message into the friendly-guidelines template.
///
/// No-op when the marker is already present or there is no leading system
/// message.
pub fn augment_system_prompt(messages: &mut [ChatMessage], goal: &str) {
    let Some(first) = messages.first_mut() else {
        return;
    };
    if first.role != Role::System || first.content.contains(GUIDELINES_MARKER) {
        return;
    }

    let subject = if goal.trim().is_empty() {
        first.content.as_str()
    } else {
        goal
    };
    first.content = format!(
        "You are a friendly and helpful AI assistant with the following goal: {subject}\n\n\
         {GUIDELINES_MARKER}\n\
         1. Be friendly and conversational\n\
         2. Use at most 1-2 emojis per message (not more)\n\
         3. Keep your responses concise and to the point (under 3 sentences when possible)\n\
         4. Focus on providing direct answers first, then elaborating only if necessary\n\
         5. Be helpful and informative while maintaining a positive tone"
    );
}
