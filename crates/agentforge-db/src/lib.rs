pub mod agent_store;
pub mod migrations;

pub use agent_store::{AgentRecord, AgentStore, NewAgent, NewMessage, StoredMessage, UserRecord};
