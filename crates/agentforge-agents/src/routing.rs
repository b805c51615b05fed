use serde::Serialize;
use serde_json::{Map, Value, json};

/// Upstream destination for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Together chat completions, the default for every unrecognized model.
    Together,
    OpenAi,
    /// Together image generations.
    Image,
}

impl Route {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Route::Together | Route::Image => "Together",
            Route::OpenAi => "OpenAI",
        }
    }
}

/// Model families that carry a fixed sampling overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Mixtral,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelClass {
    pub route: Route,
    pub family: ModelFamily,
}

impl ModelClass {
    pub fn is_image(&self) -> bool {
        self.route == Route::Image
    }

    pub fn overlay(&self) -> Option<SamplingOverlay> {
        match self.family {
            ModelFamily::Mixtral => Some(SamplingOverlay::MIXTRAL),
            ModelFamily::Other => None,
        }
    }
}

/// Map a model identifier onto its route and family.
///
/// Matching is case-insensitive. Image markers win over provider markers.
pub fn classify_model(model_id: &str) -> ModelClass {
    let lower = model_id.to_lowercase();

    let route = if lower.contains("stable-diffusion") {
        Route::Image
    } else if lower.contains("openai") || lower.starts_with("gpt-") {
        Route::OpenAi
    } else {
        Route::Together
    };

    let family = if lower.contains("mixtral") {
        ModelFamily::Mixtral
    } else {
        ModelFamily::Other
    };

    ModelClass { route, family }
}

/// Model name as the provider expects it. OpenAI does not know the
/// `openai/` routing namespace.
pub fn upstream_model_name<'a>(route: Route, model_id: &'a str) -> &'a str {
    match route {
        Route::OpenAi => model_id.strip_prefix("openai/").unwrap_or(model_id),
        Route::Together | Route::Image => model_id,
    }
}

/// Fixed sampling parameters merged into a chat request body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOverlay {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stop: &'static [&'static str],
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl SamplingOverlay {
    pub const MIXTRAL: SamplingOverlay = SamplingOverlay {
        temperature: 0.75,
        max_tokens: 600,
        top_p: 0.9,
        stop: &["USER:", "ASSISTANT:"],
        frequency_penalty: 0.2,
        presence_penalty: 0.4,
    };

    pub fn apply(&self, body: &mut Map<String, Value>) {
        body.insert("temperature".to_string(), json!(self.temperature));
        body.insert("max_tokens".to_string(), json!(self.max_tokens));
        body.insert("top_p".to_string(), json!(self.top_p));
        body.insert("stop".to_string(), json!(self.stop));
        body.insert("frequency_penalty".to_string(), json!(self.frequency_penalty));
        body.insert("presence_penalty".to_string(), json!(self.presence_penalty));
    }
}
