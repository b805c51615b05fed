//! Local onboarding replies for the first message of a fresh conversation.

use agentforge_common::{ChatMessage, Role};
use regex::Regex;
use std::sync::LazyLock;

static GREETING_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hi|hello|hey|greetings)\b").expect("greeting regex should compile")
});

static PLAN_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)planning|plan").expect("plan regex should compile"));

/// True when `history` is exactly the two opening messages.
pub fn is_fresh_conversation(history: &[ChatMessage]) -> bool {
    matches!(
        history,
        [first, second] if first.role == Role::System && second.role == Role::User
    )
}

/// Greeting or "what model are you" style opener.
pub fn is_greeting(message: &str) -> bool {
    let lower = message.to_lowercase();
    GREETING_WORD.is_match(&lower) || (lower.contains("what") && lower.contains("model"))
}

/// Goal-derived greeting, phrased by the goal's leading verb.
pub fn greeting_for_goal(goal: &str) -> String {
    let goal = goal.trim();
    let lower = goal.to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));

    if goal.is_empty() {
        "👋 Hello! I'm your friendly AI assistant. How can I assist you today?".to_string()
    } else if starts(&["help", "assist"]) {
        format!("👋 Hello! I'm your friendly AI assistant ready to {goal}. How can I help you today?")
    } else if starts(&["create", "make", "build"]) {
        format!(
            "👋 Hello! I'm your friendly AI assistant ready to help you {goal}. What would you like to know?"
        )
    } else if starts(&["answer", "provide"]) {
        format!(
            "👋 Hello! I'm your friendly AI assistant ready to {goal}. What questions do you have?"
        )
    } else if lower.contains("plan") {
        let stripped = PLAN_WORD.replace_all(goal, "");
        let subject = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        format!(
            "👋 Hello! I'm your friendly AI assistant for planning {subject}. How can I assist you today?"
        )
    } else {
        format!(
            "👋 Hello! I'm your friendly AI assistant for {goal}. I'm here to help you. How can I assist you today?"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_detection_uses_whole_words() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("Hello there"));
        assert!(is_greeting("hey!"));
        assert!(is_greeting("What model are you?"));
        assert!(!is_greeting("this is a long question about physics"));
        assert!(!is_greeting("which theme should I pick"));
    }

    #[test]
    fn fresh_conversation_is_exactly_the_seed_pair() {
        let seeds = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        assert!(is_fresh_conversation(&seeds));

        let mut longer = seeds.clone();
        longer.push(ChatMessage::assistant("a"));
        assert!(!is_fresh_conversation(&longer));
        assert!(!is_fresh_conversation(&seeds[..1]));
    }

    #[test]
    fn templates_follow_goal_verb() {
        assert_eq!(
            greeting_for_goal(""),
            "👋 Hello! I'm your friendly AI assistant. How can I assist you today?"
        );
        assert_eq!(
            greeting_for_goal("help students with algebra"),
            "👋 Hello! I'm your friendly AI assistant ready to help students with algebra. How can I help you today?"
        );
        assert_eq!(
            greeting_for_goal("Build a budget"),
            "👋 Hello! I'm your friendly AI assistant ready to help you Build a budget. What would you like to know?"
        );
        assert_eq!(
            greeting_for_goal("answer trivia questions"),
            "👋 Hello! I'm your friendly AI assistant ready to answer trivia questions. What questions do you have?"
        );
        assert_eq!(
            greeting_for_goal("meal planning for the week"),
            "👋 Hello! I'm your friendly AI assistant for planning meal for the week. How can I assist you today?"
        );
        assert_eq!(
            greeting_for_goal("plan a trip to Rome"),
            "👋 Hello! I'm your friendly AI assistant for planning a trip to Rome. How can I assist you today?"
        );
        assert_eq!(
            greeting_for_goal("gardening tips"),
            "👋 Hello! I'm your friendly AI assistant for gardening tips. I'm here to help you. How can I assist you today?"
        );
    }
}
