use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use runtime::error::WorldError;
use runtime::model::{Agent, AgentMessage, Chat, Event, Role, ToolCall, World};
use runtime::storage::{EventFilter, Storage};
use stream_event::Channel;

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn role_from_str(s: &str) -> Result<Role, WorldError> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(WorldError::Persistence(format!("unknown role {other} in storage"))),
    }
}

fn channel_to_str(channel: Channel) -> &'static str {
    channel.as_str()
}

fn channel_from_str(s: &str) -> Result<Channel, WorldError> {
    match s {
        "message" => Ok(Channel::Message),
        "sse" => Ok(Channel::Sse),
        "world" => Ok(Channel::World),
        "system" => Ok(Channel::System),
        other => Err(WorldError::Persistence(format!("unknown channel {other} in storage"))),
    }
}

fn map_sql(e: rusqlite::Error) -> WorldError {
    WorldError::Persistence(e.to_string())
}

/// SQLite-backed `Storage`. Own DB, one connection serialized behind a
/// `std::sync::Mutex`; every call runs its SQL inside `tokio::task::block_in_place`
/// so the async executor isn't blocked while still giving callers a plain
/// `async fn` surface.
pub struct SqliteStorage {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sql)?;
        Self::init_schema(&conn)?;
        Ok(SqliteStorage { db: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, WorldError> {
        let conn = Connection::open_in_memory().map_err(map_sql)?;
        Self::init_schema(&conn)?;
        Ok(SqliteStorage { db: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<(), WorldError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS worlds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                turn_limit INTEGER NOT NULL,
                main_agent TEXT,
                variables TEXT NOT NULL,
                current_chat_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                world_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                llm_provider TEXT NOT NULL,
                llm_model TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                temperature REAL,
                max_tokens INTEGER,
                auto_reply INTEGER NOT NULL,
                PRIMARY KEY (world_id, id)
            );

            CREATE TABLE IF NOT EXISTS chats (
                world_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                message_count INTEGER NOT NULL,
                PRIMARY KEY (world_id, id)
            );

            CREATE TABLE IF NOT EXISTS agent_messages (
                world_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                sender TEXT,
                chat_id TEXT,
                tool_calls TEXT,
                tool_call_id TEXT,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (world_id, agent_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_agent_messages_chat
                ON agent_messages(world_id, agent_id, chat_id);

            CREATE TABLE IF NOT EXISTS events (
                world_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                chat_id TEXT,
                channel TEXT NOT NULL,
                payload TEXT NOT NULL,
                meta TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (world_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_events_chat ON events(world_id, chat_id);
            "#,
        )
        .map_err(map_sql)
    }

    fn row_to_world(row: &rusqlite::Row) -> rusqlite::Result<World> {
        let created_at: i64 = row.get(7)?;
        let updated_at: i64 = row.get(8)?;
        Ok(World {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            turn_limit: row.get::<_, i64>(3)? as u32,
            main_agent: row.get(4)?,
            variables: row.get(5)?,
            current_chat_id: row.get(6)?,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        })
    }

    fn row_to_agent_meta(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
        Ok(Agent {
            world_id: row.get(0)?,
            id: row.get(1)?,
            name: row.get(2)?,
            agent_type: row.get(3)?,
            llm_provider: row.get(4)?,
            llm_model: row.get(5)?,
            system_prompt: row.get(6)?,
            temperature: row.get::<_, Option<f64>>(7)?.map(|v| v as f32),
            max_tokens: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
            auto_reply: row.get::<_, i64>(9)? != 0,
            memory: Vec::new(),
        })
    }

    fn row_to_chat(row: &rusqlite::Row) -> rusqlite::Result<Chat> {
        let created_at: i64 = row.get(3)?;
        let updated_at: i64 = row.get(4)?;
        Ok(Chat {
            id: row.get(0)?,
            world_id: row.get(1)?,
            name: row.get(2)?,
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
            message_count: row.get::<_, i64>(5)? as u64,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<AgentMessage, WorldError> {
        let role: String = row.get(0).map_err(map_sql)?;
        let content: String = row.get(1).map_err(map_sql)?;
        let sender: Option<String> = row.get(2).map_err(map_sql)?;
        let chat_id: Option<String> = row.get(3).map_err(map_sql)?;
        let message_id: String = row.get(4).map_err(map_sql)?;
        let tool_calls_json: Option<String> = row.get(5).map_err(map_sql)?;
        let tool_call_id: Option<String> = row.get(6).map_err(map_sql)?;
        let created_at: i64 = row.get(7).map_err(map_sql)?;

        let tool_calls = tool_calls_json
            .map(|json| serde_json::from_str::<Vec<ToolCall>>(&json))
            .transpose()
            .map_err(|e| WorldError::Persistence(e.to_string()))?;

        Ok(AgentMessage {
            role: role_from_str(&role)?,
            content,
            sender,
            chat_id,
            message_id,
            tool_calls,
            tool_call_id,
            created_at: from_millis(created_at),
        })
    }

    /// Loads an agent's full memory from `agent_messages` in persisted order,
    /// populating [`Agent::memory`] for trait-contract parity with
    /// `tests_support::InMemoryStorage` (which keeps memory inline on the struct).
    fn load_memory_blocking(conn: &Connection, world_id: &str, agent_id: &str) -> Result<Vec<AgentMessage>, WorldError> {
        let mut stmt = conn
            .prepare(
                "SELECT role, content, sender, chat_id, message_id, tool_calls, tool_call_id, created_at
                 FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2 ORDER BY seq ASC",
            )
            .map_err(map_sql)?;
        let mut out = Vec::new();
        let mut rows = stmt.query(params![world_id, agent_id]).map_err(map_sql)?;
        while let Some(row) = rows.next().map_err(map_sql)? {
            out.push(Self::row_to_message(row)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_world(&self, world: World) -> Result<World, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO worlds (id, name, description, turn_limit, main_agent, variables, current_chat_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    world.id,
                    world.name,
                    world.description,
                    world.turn_limit as i64,
                    world.main_agent,
                    world.variables,
                    world.current_chat_id,
                    to_millis(world.created_at),
                    to_millis(world.updated_at),
                ],
            )
            .map_err(map_sql)?;
            Ok(world)
        })
    }

    async fn get_world(&self, id: &str) -> Result<Option<World>, WorldError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.query_row(
                "SELECT id, name, description, turn_limit, main_agent, variables, current_chat_id, created_at, updated_at
                 FROM worlds WHERE id = ?1",
                params![id],
                Self::row_to_world,
            )
            .optional()
            .map_err(map_sql)
        })
    }

    async fn update_world(&self, world: World) -> Result<World, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let updated_at = Utc::now();
            conn.execute(
                "UPDATE worlds SET name = ?2, description = ?3, turn_limit = ?4, main_agent = ?5,
                 variables = ?6, current_chat_id = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    world.id,
                    world.name,
                    world.description,
                    world.turn_limit as i64,
                    world.main_agent,
                    world.variables,
                    world.current_chat_id,
                    to_millis(updated_at),
                ],
            )
            .map_err(map_sql)?;
            Ok(World { updated_at, ..world })
        })
    }

    async fn delete_world(&self, id: &str) -> Result<(), WorldError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute("DELETE FROM worlds WHERE id = ?1", params![id]).map_err(map_sql)?;
            conn.execute("DELETE FROM agents WHERE world_id = ?1", params![id]).map_err(map_sql)?;
            conn.execute("DELETE FROM chats WHERE world_id = ?1", params![id]).map_err(map_sql)?;
            conn.execute("DELETE FROM agent_messages WHERE world_id = ?1", params![id]).map_err(map_sql)?;
            conn.execute("DELETE FROM events WHERE world_id = ?1", params![id]).map_err(map_sql)?;
            Ok(())
        })
    }

    async fn list_worlds(&self) -> Result<Vec<World>, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, turn_limit, main_agent, variables, current_chat_id, created_at, updated_at
                     FROM worlds ORDER BY created_at ASC",
                )
                .map_err(map_sql)?;
            let rows = stmt.query_map([], Self::row_to_world).map_err(map_sql)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql)
        })
    }

    async fn create_agent(&self, agent: Agent) -> Result<Agent, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO agents (world_id, id, name, agent_type, llm_provider, llm_model, system_prompt, temperature, max_tokens, auto_reply)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    agent.world_id,
                    agent.id,
                    agent.name,
                    agent.agent_type,
                    agent.llm_provider,
                    agent.llm_model,
                    agent.system_prompt,
                    agent.temperature.map(|v| v as f64),
                    agent.max_tokens.map(|v| v as i64),
                    agent.auto_reply as i64,
                ],
            )
            .map_err(map_sql)?;
            Ok(agent)
        })
    }

    async fn get_agent(&self, world_id: &str, agent_id: &str) -> Result<Option<Agent>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let agent = conn
                .query_row(
                    "SELECT world_id, id, name, agent_type, llm_provider, llm_model, system_prompt, temperature, max_tokens, auto_reply
                     FROM agents WHERE world_id = ?1 AND id = ?2",
                    params![world_id, agent_id],
                    Self::row_to_agent_meta,
                )
                .optional()
                .map_err(map_sql)?;
            let Some(mut agent) = agent else { return Ok(None) };
            agent.memory = Self::load_memory_blocking(&conn, &world_id, &agent_id)?;
            Ok(Some(agent))
        })
    }

    async fn update_agent(&self, agent: Agent) -> Result<Agent, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute(
                "UPDATE agents SET name = ?3, agent_type = ?4, llm_provider = ?5, llm_model = ?6,
                 system_prompt = ?7, temperature = ?8, max_tokens = ?9, auto_reply = ?10
                 WHERE world_id = ?1 AND id = ?2",
                params![
                    agent.world_id,
                    agent.id,
                    agent.name,
                    agent.agent_type,
                    agent.llm_provider,
                    agent.llm_model,
                    agent.system_prompt,
                    agent.temperature.map(|v| v as f64),
                    agent.max_tokens.map(|v| v as i64),
                    agent.auto_reply as i64,
                ],
            )
            .map_err(map_sql)?;
            Ok(agent)
        })
    }

    async fn delete_agent(&self, world_id: &str, agent_id: &str) -> Result<(), WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute("DELETE FROM agents WHERE world_id = ?1 AND id = ?2", params![world_id, agent_id]).map_err(map_sql)?;
            conn.execute("DELETE FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2", params![world_id, agent_id]).map_err(map_sql)?;
            Ok(())
        })
    }

    async fn list_agents(&self, world_id: &str) -> Result<Vec<Agent>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT world_id, id, name, agent_type, llm_provider, llm_model, system_prompt, temperature, max_tokens, auto_reply
                     FROM agents WHERE world_id = ?1",
                )
                .map_err(map_sql)?;
            let rows = stmt.query_map(params![world_id], Self::row_to_agent_meta).map_err(map_sql)?;
            let mut agents = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql)?;
            for agent in &mut agents {
                agent.memory = Self::load_memory_blocking(&conn, &world_id, &agent.id)?;
            }
            Ok(agents)
        })
    }

    async fn create_chat(&self, chat: Chat) -> Result<Chat, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO chats (world_id, id, name, created_at, updated_at, message_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    chat.world_id,
                    chat.id,
                    chat.name,
                    to_millis(chat.created_at),
                    to_millis(chat.updated_at),
                    chat.message_count as i64,
                ],
            )
            .map_err(map_sql)?;
            Ok(chat)
        })
    }

    async fn get_chat(&self, world_id: &str, chat_id: &str) -> Result<Option<Chat>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.query_row(
                "SELECT id, world_id, name, created_at, updated_at, message_count FROM chats WHERE world_id = ?1 AND id = ?2",
                params![world_id, chat_id],
                Self::row_to_chat,
            )
            .optional()
            .map_err(map_sql)
        })
    }

    async fn update_chat(&self, chat: Chat) -> Result<Chat, WorldError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let updated_at = Utc::now();
            conn.execute(
                "UPDATE chats SET name = ?3, updated_at = ?4, message_count = ?5 WHERE world_id = ?1 AND id = ?2",
                params![chat.world_id, chat.id, chat.name, to_millis(updated_at), chat.message_count as i64],
            )
            .map_err(map_sql)?;
            Ok(Chat { updated_at, ..chat })
        })
    }

    async fn delete_chat(&self, world_id: &str, chat_id: &str) -> Result<(), WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute("DELETE FROM chats WHERE world_id = ?1 AND id = ?2", params![world_id, chat_id]).map_err(map_sql)?;
            conn.execute("DELETE FROM agent_messages WHERE world_id = ?1 AND chat_id = ?2", params![world_id, chat_id]).map_err(map_sql)?;
            conn.execute("DELETE FROM events WHERE world_id = ?1 AND chat_id = ?2", params![world_id, chat_id]).map_err(map_sql)?;
            Ok(())
        })
    }

    async fn list_chats(&self, world_id: &str) -> Result<Vec<Chat>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT id, world_id, name, created_at, updated_at, message_count FROM chats WHERE world_id = ?1 ORDER BY created_at ASC")
                .map_err(map_sql)?;
            let rows = stmt.query_map(params![world_id], Self::row_to_chat).map_err(map_sql)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql)
        })
    }

    async fn append_agent_message(&self, world_id: &str, agent_id: &str, message: AgentMessage) -> Result<(), WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2",
                    params![world_id, agent_id],
                    |row| row.get(0),
                )
                .map_err(map_sql)?;
            let tool_calls_json = message
                .tool_calls
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| WorldError::Persistence(e.to_string()))?;
            conn.execute(
                "INSERT INTO agent_messages
                 (world_id, agent_id, seq, message_id, role, content, sender, chat_id, tool_calls, tool_call_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    world_id,
                    agent_id,
                    next_seq,
                    message.message_id,
                    role_to_str(message.role),
                    message.content,
                    message.sender,
                    message.chat_id,
                    tool_calls_json,
                    message.tool_call_id,
                    to_millis(message.created_at),
                ],
            )
            .map_err(map_sql)?;
            Ok(())
        })
    }

    async fn load_agent_memory(&self, world_id: &str, agent_id: &str, chat_id: Option<&str>) -> Result<Vec<AgentMessage>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        let chat_id = chat_id.map(str::to_string);
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            match &chat_id {
                Some(cid) => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT role, content, sender, chat_id, message_id, tool_calls, tool_call_id, created_at
                             FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2 AND chat_id = ?3 ORDER BY seq ASC",
                        )
                        .map_err(map_sql)?;
                    let mut out = Vec::new();
                    let mut rows = stmt.query(params![world_id, agent_id, cid]).map_err(map_sql)?;
                    while let Some(row) = rows.next().map_err(map_sql)? {
                        out.push(Self::row_to_message(row)?);
                    }
                    Ok(out)
                }
                None => Self::load_memory_blocking(&conn, &world_id, &agent_id),
            }
        })
    }

    async fn delete_agent_messages_for_chat(&self, world_id: &str, agent_id: &str, chat_id: &str) -> Result<(), WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            conn.execute(
                "DELETE FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2 AND chat_id = ?3",
                params![world_id, agent_id, chat_id],
            )
            .map_err(map_sql)?;
            Ok(())
        })
    }

    async fn rewrite_agent_memory(&self, world_id: &str, agent_id: &str, messages: Vec<AgentMessage>) -> Result<(), WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::task::block_in_place(move || {
            let mut conn = db.lock().unwrap();
            let tx = conn.transaction().map_err(map_sql)?;
            tx.execute("DELETE FROM agent_messages WHERE world_id = ?1 AND agent_id = ?2", params![world_id, agent_id]).map_err(map_sql)?;
            for (seq, message) in messages.into_iter().enumerate() {
                let tool_calls_json = message
                    .tool_calls
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| WorldError::Persistence(e.to_string()))?;
                tx.execute(
                    "INSERT INTO agent_messages
                     (world_id, agent_id, seq, message_id, role, content, sender, chat_id, tool_calls, tool_call_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        world_id,
                        agent_id,
                        (seq + 1) as i64,
                        message.message_id,
                        role_to_str(message.role),
                        message.content,
                        message.sender,
                        message.chat_id,
                        tool_calls_json,
                        message.tool_call_id,
                        to_millis(message.created_at),
                    ],
                )
                .map_err(map_sql)?;
            }
            tx.commit().map_err(map_sql)?;
            Ok(())
        })
    }

    async fn append_event(
        &self,
        world_id: &str,
        chat_id: Option<String>,
        channel: Channel,
        payload: serde_json::Value,
        meta: serde_json::Value,
    ) -> Result<Event, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let next_seq: i64 = conn
                .query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE world_id = ?1", params![world_id], |row| row.get(0))
                .map_err(map_sql)?;
            let created_at = Utc::now();
            let payload_json = serde_json::to_string(&payload).map_err(|e| WorldError::Persistence(e.to_string()))?;
            let meta_json = serde_json::to_string(&meta).map_err(|e| WorldError::Persistence(e.to_string()))?;
            conn.execute(
                "INSERT INTO events (world_id, seq, chat_id, channel, payload, meta, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![world_id, next_seq, chat_id, channel_to_str(channel), payload_json, meta_json, to_millis(created_at)],
            )
            .map_err(map_sql)?;
            Ok(Event { seq: next_seq as u64, world_id, chat_id, channel, payload, meta, created_at })
        })
    }

    async fn read_events(&self, world_id: &str, since_seq: u64, filter: EventFilter) -> Result<Vec<Event>, WorldError> {
        let db = self.db.clone();
        let world_id = world_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            let mut sql = "SELECT world_id, seq, chat_id, channel, payload, meta, created_at FROM events
                           WHERE world_id = ?1 AND seq > ?2"
                .to_string();
            if filter.chat_id.is_some() {
                sql.push_str(" AND chat_id = ?3");
            }
            if let Some(channel) = filter.channel {
                sql.push_str(&format!(" AND channel = '{}'", channel_to_str(channel)));
            }
            sql.push_str(" ORDER BY seq ASC");

            let mut stmt = conn.prepare(&sql).map_err(map_sql)?;
            let mut out = Vec::new();
            let mut rows = match &filter.chat_id {
                Some(cid) => stmt.query(params![world_id, since_seq as i64, cid]).map_err(map_sql)?,
                None => stmt.query(params![world_id, since_seq as i64]).map_err(map_sql)?,
            };
            while let Some(row) = rows.next().map_err(map_sql)? {
                let world_id: String = row.get(0).map_err(map_sql)?;
                let seq: i64 = row.get(1).map_err(map_sql)?;
                let chat_id: Option<String> = row.get(2).map_err(map_sql)?;
                let channel_str: String = row.get(3).map_err(map_sql)?;
                let payload_str: String = row.get(4).map_err(map_sql)?;
                let meta_str: String = row.get(5).map_err(map_sql)?;
                let created_at: i64 = row.get(6).map_err(map_sql)?;
                out.push(Event {
                    seq: seq as u64,
                    world_id,
                    chat_id,
                    channel: channel_from_str(&channel_str)?,
                    payload: serde_json::from_str(&payload_str).map_err(|e| WorldError::Persistence(e.to_string()))?,
                    meta: serde_json::from_str(&meta_str).map_err(|e| WorldError::Persistence(e.to_string()))?,
                    created_at: from_millis(created_at),
                });
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::model::{Agent as RtAgent, AgentMessage as RtAgentMessage, Chat as RtChat, Role as RtRole, World as RtWorld};

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_world() {
        let storage = storage();
        let world = RtWorld::new("w1", "Test World");
        storage.create_world(world.clone()).await.unwrap();
        let loaded = storage.get_world("w1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Test World");
        assert_eq!(loaded.turn_limit, 5);
    }

    #[tokio::test]
    async fn agent_memory_round_trips_and_filters_by_chat() {
        let storage = storage();
        storage.create_world(RtWorld::new("w1", "Test")).await.unwrap();
        storage.create_agent(RtAgent::new("w1", "Bot")).await.unwrap();

        storage
            .append_agent_message("w1", "bot", RtAgentMessage::new(RtRole::User, "hello").with_chat("c1"))
            .await
            .unwrap();
        storage
            .append_agent_message("w1", "bot", RtAgentMessage::new(RtRole::User, "other chat").with_chat("c2"))
            .await
            .unwrap();

        let all = storage.load_agent_memory("w1", "bot", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let c1_only = storage.load_agent_memory("w1", "bot", Some("c1")).await.unwrap();
        assert_eq!(c1_only.len(), 1);
        assert_eq!(c1_only[0].content, "hello");

        let agent = storage.get_agent("w1", "bot").await.unwrap().unwrap();
        assert_eq!(agent.memory.len(), 2);
    }

    #[tokio::test]
    async fn rewrite_agent_memory_replaces_full_log() {
        let storage = storage();
        storage.create_world(RtWorld::new("w1", "Test")).await.unwrap();
        storage.create_agent(RtAgent::new("w1", "Bot")).await.unwrap();
        storage.append_agent_message("w1", "bot", RtAgentMessage::new(RtRole::User, "old")).await.unwrap();

        storage
            .rewrite_agent_memory("w1", "bot", vec![RtAgentMessage::new(RtRole::User, "new")])
            .await
            .unwrap();

        let memory = storage.load_agent_memory("w1", "bot", None).await.unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].content, "new");
    }

    #[tokio::test]
    async fn events_get_gap_free_monotonic_seq_and_chat_filter() {
        let storage = storage();
        storage.create_world(RtWorld::new("w1", "Test")).await.unwrap();

        let e1 = storage
            .append_event("w1", Some("c1".to_string()), Channel::Message, serde_json::json!({"n": 1}), serde_json::json!({}))
            .await
            .unwrap();
        let e2 = storage
            .append_event("w1", Some("c2".to_string()), Channel::Message, serde_json::json!({"n": 2}), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(e1.seq, 1);
        assert_eq!(e2.seq, 2);

        let filtered = storage
            .read_events("w1", 0, EventFilter { chat_id: Some("c1".to_string()), channel: None })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].payload, serde_json::json!({"n": 1}));
    }

    #[tokio::test]
    async fn deleting_a_chat_cascades_its_messages_and_events() {
        let storage = storage();
        storage.create_world(RtWorld::new("w1", "Test")).await.unwrap();
        storage.create_agent(RtAgent::new("w1", "Bot")).await.unwrap();
        storage.create_chat(RtChat::new("c1", "w1")).await.unwrap();
        storage.append_agent_message("w1", "bot", RtAgentMessage::new(RtRole::User, "hi").with_chat("c1")).await.unwrap();
        storage
            .append_event("w1", Some("c1".to_string()), Channel::Message, serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();

        storage.delete_chat("w1", "c1").await.unwrap();

        assert!(storage.get_chat("w1", "c1").await.unwrap().is_none());
        assert!(storage.load_agent_memory("w1", "bot", Some("c1")).await.unwrap().is_empty());
        let events = storage.read_events("w1", 0, EventFilter::default()).await.unwrap();
        assert!(events.is_empty());
    }
}
