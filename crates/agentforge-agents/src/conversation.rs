use agentforge_common::{ChatMessage, Error, Result, Role};
use agentforge_db::{AgentStore, NewMessage, StoredMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Append-only message history per agent, backed by the agent store.
///
/// Writers take the agent's lock with [`ConversationLog::lock`] and keep it
/// for the whole read, upstream call, append sequence. The registry map is
/// only touched to fetch the lock, never while awaiting it. Entries are
/// never evicted, so the registry holds at most one lock per agent.
#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<AgentStore>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLog {
    pub fn new(store: Arc<AgentStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// The (system, user) pair that opens every conversation.
    pub fn opening(system_prompt: &str, first_user_message: &str) -> [NewMessage; 2] {
        [
            NewMessage::text(Role::System, system_prompt),
            NewMessage::text(Role::User, first_user_message),
        ]
    }

    pub fn seed(&self, agent_id: &str, system_prompt: &str, first_user_message: &str) -> Result<()> {
        self.store.append_messages(
            agent_id,
            &Self::opening(system_prompt, first_user_message),
        )
    }

    pub fn append(&self, agent_id: &str, role: Role, content: &str) -> Result<()> {
        self.append_message(agent_id, NewMessage::text(role, content))
    }

    pub fn append_message(&self, agent_id: &str, message: NewMessage) -> Result<()> {
        check_content(&message)?;
        self.store.append_messages(agent_id, &[message])
    }

    /// Persist a user message and its reply in one transaction.
    pub fn append_turn(&self, agent_id: &str, user: NewMessage, reply: NewMessage) -> Result<()> {
        check_content(&user)?;
        self.store.append_messages(agent_id, &[user, reply])
    }

    /// Full history in creation order, in upstream wire shape.
    pub fn read(&self, agent_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .store
            .load_messages(agent_id)?
            .iter()
            .map(StoredMessage::to_chat_message)
            .collect())
    }

    /// Full history including ids, timestamps, and image links.
    pub fn history(&self, agent_id: &str) -> Result<Vec<StoredMessage>> {
        self.store.load_messages(agent_id)
    }

    /// Acquire the agent's exclusive lock. Released when the guard drops.
    pub async fn lock(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

fn check_content(message: &NewMessage) -> Result<()> {
    if message.role == Role::User && message.content.trim().is_empty() {
        return Err(Error::Validation("Message content cannot be empty".to_string()));
    }
    Ok(())
}
