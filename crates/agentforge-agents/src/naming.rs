use agentforge_common::{ChatMessage, Error, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::request::RequestBuilder;
use crate::transport::UpstreamTransport;

pub const DEFAULT_NAME: &str = "Custom Assistant";

const NAMING_SYSTEM_PROMPT: &str = "You create short, catchy names for AI assistants.";
const NAMING_MAX_TOKENS: u32 = 20;
const NAMING_TEMPERATURE: f64 = 0.7;
const MAX_NAME_WORDS: usize = 3;

fn naming_prompt(goal: &str) -> String {
    format!(
        "Create a short, catchy and HIGHLY RELEVANT name (2-3 words) for an AI assistant with this goal: '{goal}'\n\
         For example:\n\
         - If the goal is about math or algebra, name it something like 'Math Wizard' or 'Algebra Pro'\n\
         - If about budgeting or finance, name it something like 'Budget Buddy' or 'Finance Coach'\n\
         - If about travel, name it something like 'Travel Guide' or 'Journey Planner'\n\
         \n\
         The name MUST directly relate to the primary purpose in the goal.\n\
         Return ONLY the name, no explanations or quotation marks."
    )
}

/// Ask the naming model for a short label for `goal`.
///
/// Failures are surfaced, never templated: transport problems become
/// [`Error::Transport`] and non-2xx responses [`Error::Upstream`].
pub async fn suggest_name(
    builder: &RequestBuilder,
    transport: &dyn UpstreamTransport,
    goal: &str,
) -> Result<String> {
    info!("generating agent name for goal: {}", goal);

    let messages = [
        ChatMessage::system(NAMING_SYSTEM_PROMPT),
        ChatMessage::user(naming_prompt(goal)),
    ];
    let request = builder.build_naming(&messages, NAMING_MAX_TOKENS, NAMING_TEMPERATURE)?;
    let response = transport.send(&request).await?;

    if !(200..300).contains(&response.status) {
        let detail = format!("Error calling Together API: {}", response.body);
        warn!("{}", detail);
        return Err(Error::Upstream {
            status: response.status,
            detail,
        });
    }

    let payload: Value = serde_json::from_str(&response.body)
        .map_err(|e| Error::Agent(format!("Unexpected error: {e}")))?;

    let raw = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str);

    Ok(match raw {
        Some(content) => clean_name(content),
        None => DEFAULT_NAME.to_string(),
    })
}

/// Drop quotes and periods, then keep at most three words.
pub fn clean_name(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '.'))
        .collect();
    stripped
        .split_whitespace()
        .take(MAX_NAME_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
