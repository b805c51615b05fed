use agentforge_common::{ChatMessage, Error, Result, Role};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::migrations::AGENT_SCHEMA_V1;

/// Owner of zero or more agents. Looked up by its unique name.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted agent row, joined with its owner's name.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub name: Option<String>,
    pub model: String,
    pub goal: String,
    pub tools: Vec<String>,
    pub is_image_model: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a new agent before the store assigns id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    pub goal: String,
    pub model: String,
    pub tools: Vec<String>,
    pub owner_name: Option<String>,
    pub name: Option<String>,
    pub is_image_model: bool,
}

impl NewAgent {
    /// Reject agents without a goal or model.
    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(Error::Validation("Agent goal is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Validation("Model name is required".to_string()));
        }
        Ok(())
    }
}

/// Insert shape for one conversation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
}

impl NewMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_url: None,
        }
    }
}

impl From<ChatMessage> for NewMessage {
    fn from(msg: ChatMessage) -> Self {
        Self::text(msg.role, msg.content)
    }
}

/// Persisted message row loaded from the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Durable storage for users, agents, and their append-only message history.
///
/// The connection sits behind a mutex so the store can be shared across
/// request handlers; the guard is never held across an await point.
pub struct AgentStore {
    conn: Mutex<Connection>,
}

impl AgentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening agent store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(AGENT_SCHEMA_V1.sql)
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        conn.pragma_update(None, "user_version", AGENT_SCHEMA_V1.version)
            .map_err(|e| Error::Database(format!("failed to record schema version: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("connection lock poisoned".to_string()))
    }

    /// Current schema version recorded in the database.
    pub fn schema_version(&self) -> Result<u32> {
        self.conn()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))
    }

    /// Persist a new agent together with its opening messages.
    ///
    /// Owner resolution, the agent row, and every initial message share one
    /// transaction: either all of them land or none do.
    pub fn create_agent(&self, agent: &NewAgent, initial: &[NewMessage]) -> Result<AgentRecord> {
        agent.validate()?;

        let agent_id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let tools_json = serde_json::to_string(&agent.tools)
            .map_err(|e| Error::Database(format!("failed to encode tools: {e}")))?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let owner = match agent.owner_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(ensure_user(&tx, name)?),
            _ => None,
        };

        tx.execute(
            "INSERT INTO agents (id, user_id, name, model, goal, tools, is_image_model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                agent_id,
                owner.as_ref().map(|u| u.id),
                agent.name,
                agent.model,
                agent.goal,
                tools_json,
                agent.is_image_model,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert agent: {e}")))?;

        insert_messages(&tx, &agent_id, initial)?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit agent: {e}")))?;

        debug!(
            "created agent {} with {} initial messages",
            agent_id,
            initial.len()
        );

        Ok(AgentRecord {
            id: agent_id,
            user_id: owner.as_ref().map(|u| u.id),
            user_name: owner.map(|u| u.name),
            name: agent.name.clone(),
            model: agent.model.clone(),
            goal: agent.goal.clone(),
            tools: agent.tools.clone(),
            is_image_model: agent.is_image_model,
            created_at,
        })
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT a.id, a.user_id, u.name, a.name, a.model, a.goal, a.tools,
                    a.is_image_model, a.created_at
             FROM agents a
             LEFT JOIN users u ON a.user_id = u.id
             WHERE a.id = ?1",
            params![agent_id],
            agent_from_row,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load agent: {e}")))
    }

    pub fn find_user(&self, name: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, created_at FROM users WHERE name = ?1",
            params![name],
            |row| {
                let created_raw: String = row.get(2)?;
                Ok(UserRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_timestamp(&created_raw),
                })
            },
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load user: {e}")))
    }

    /// Agents owned by `user_name`, oldest first.
    pub fn list_agents_for_user(&self, user_name: &str) -> Result<Vec<AgentRecord>> {
        let user = self
            .find_user(user_name)?
            .ok_or_else(|| Error::NotFound(format!("User '{user_name}' not found")))?;

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT a.id, a.user_id, u.name, a.name, a.model, a.goal, a.tools,
                        a.is_image_model, a.created_at
                 FROM agents a
                 LEFT JOIN users u ON a.user_id = u.id
                 WHERE a.user_id = ?1
                 ORDER BY a.created_at ASC, a.rowid ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare agent query: {e}")))?;

        let rows = stmt
            .query_map(params![user.id], agent_from_row)
            .map_err(|e| Error::Database(format!("failed to list agents: {e}")))?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row.map_err(|e| Error::Database(format!("failed to read agent row: {e}")))?);
        }
        Ok(agents)
    }

    /// Append messages to an existing agent's history in one transaction.
    pub fn append_messages(&self, agent_id: &str, messages: &[NewMessage]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM agents WHERE id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to check agent: {e}")))?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("Agent '{agent_id}' not found")));
        }

        insert_messages(&tx, agent_id, messages)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit messages: {e}")))?;
        Ok(())
    }

    /// Full history of an agent in creation order.
    pub fn load_messages(&self, agent_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, role, content, image_url, created_at
                 FROM messages
                 WHERE agent_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;

        let rows = stmt
            .query_map(params![agent_id], |row| {
                let role_raw: String = row.get(1)?;
                let created_raw: String = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    role_raw,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    created_raw,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to load messages: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, role_raw, content, image_url, created_raw) =
                row.map_err(|e| Error::Database(format!("failed to read message row: {e}")))?;
            messages.push(StoredMessage {
                id,
                role: role_raw.parse()?,
                content,
                image_url,
                created_at: parse_timestamp(&created_raw),
            });
        }
        Ok(messages)
    }
}

fn ensure_user(tx: &Transaction<'_>, name: &str) -> Result<UserRecord> {
    let inserted = tx
        .execute(
            "INSERT INTO users (name, created_at) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("failed to insert user: {e}")))?;
    if inserted > 0 {
        info!("created user '{}'", name);
    }

    tx.query_row(
        "SELECT id, name, created_at FROM users WHERE name = ?1",
        params![name],
        |row| {
            let created_raw: String = row.get(2)?;
            Ok(UserRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_timestamp(&created_raw),
            })
        },
    )
    .map_err(|e| Error::Database(format!("failed to load user: {e}")))
}

fn insert_messages(tx: &Transaction<'_>, agent_id: &str, messages: &[NewMessage]) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO messages (agent_id, role, content, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(|e| Error::Database(format!("failed to prepare message insert: {e}")))?;

    for msg in messages {
        stmt.execute(params![
            agent_id,
            msg.role.as_str(),
            msg.content,
            msg.image_url,
            Utc::now().to_rfc3339(),
        ])
        .map_err(|e| Error::Database(format!("failed to append message: {e}")))?;
    }
    Ok(())
}

fn agent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    let tools_raw: String = row.get(6)?;
    let created_raw: String = row.get(8)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        name: row.get(3)?,
        model: row.get(4)?,
        goal: row.get(5)?,
        tools: serde_json::from_str(&tools_raw).unwrap_or_else(|e| {
            warn!("failed to decode tools '{}': {e}", tools_raw);
            Vec::new()
        }),
        is_image_model: row.get(7)?,
        created_at: parse_timestamp(&created_raw),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(
                "failed to parse timestamp '{}': {e}, falling back to now",
                value
            );
            Utc::now()
        })
}
