//! libSQL backend — async `UserStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::conversation::{ConversationState, Profile};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{CreateOutcome, User, UserStore};

/// URL that selects an in-memory database.
pub const MEMORY_URL: &str = ":memory:";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
/// After [`UserStore::close`] every operation fails with `DatabaseError::Pool`.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Mutex<Option<Connection>>,
}

impl LibSqlBackend {
    /// Open the database named by a connection string: `:memory:`, a plain
    /// path, or a `file:` URL.
    pub async fn open(url: &str) -> Result<Self, DatabaseError> {
        if url == MEMORY_URL {
            return Self::new_memory().await;
        }
        let path = url.strip_prefix("file:").unwrap_or(url);
        Self::new_local(Path::new(path)).await
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(MEMORY_URL)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn: Mutex::new(Some(conn)),
        })
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn()?).await
    }

    /// The open connection, or an error once the store is closed.
    fn conn(&self) -> Result<Connection, DatabaseError> {
        self.conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| DatabaseError::Pool("store is closed".to_string()))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| format!("invalid timestamp {s:?}: {e}"))
}

/// Map a libsql Row to a User.
///
/// Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("read user row: {e}"));

    let identity: String = row.get(0).map_err(read)?;
    let is_paid: i64 = row.get(1).map_err(read)?;
    let state_str: String = row.get(2).map_err(read)?;
    let profile_str: String = row.get(3).map_err(read)?;
    let created_str: String = row.get(4).map_err(read)?;
    let updated_str: String = row.get(5).map_err(read)?;

    let conversation_state: ConversationState = state_str.parse().map_err(|e: String| {
        DatabaseError::Serialization(format!("user {identity}: {e}"))
    })?;
    let profile: Profile = serde_json::from_str(&profile_str).map_err(|e| {
        DatabaseError::Serialization(format!("user {identity}: invalid profile JSON: {e}"))
    })?;

    let timestamp = |column: &str, raw: &str| {
        parse_datetime(raw)
            .map_err(|e| DatabaseError::Serialization(format!("user {identity}: {column}: {e}")))
    };
    let created_at = timestamp("created_at", &created_str)?;
    let updated_at = timestamp("updated_at", &updated_str)?;

    Ok(User {
        identity,
        is_paid: is_paid != 0,
        conversation_state,
        profile,
        created_at,
        updated_at,
    })
}

fn profile_to_json(user: &User) -> Result<String, DatabaseError> {
    serde_json::to_string(&user.profile).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str =
    "identity, is_paid, conversation_state, profile, created_at, updated_at";

#[async_trait]
impl UserStore for LibSqlBackend {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()?
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE identity = ?1"),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_by_identity: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_by_identity: {e}"))),
        }
    }

    async fn create_default(&self, identity: &str) -> Result<CreateOutcome, DatabaseError> {
        let user = User::new_default(identity);
        let profile = profile_to_json(&user)?;

        let inserted = self
            .conn()?
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (identity) DO NOTHING"
                ),
                params![
                    user.identity.clone(),
                    user.is_paid as i64,
                    user.conversation_state.as_str(),
                    profile,
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_default: {e}")))?;

        if inserted > 0 {
            debug!(identity, "User created");
            return Ok(CreateOutcome::Created(user));
        }

        match self.find_by_identity(identity).await? {
            Some(existing) => {
                debug!(identity, "User already existed on create");
                Ok(CreateOutcome::Existing(existing))
            }
            None => Err(DatabaseError::Query(format!(
                "create_default: insert for {identity} was ignored but no row exists"
            ))),
        }
    }

    async fn save(&self, user: &User) -> Result<(), DatabaseError> {
        let profile = profile_to_json(user)?;

        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (identity) DO UPDATE SET
                        is_paid = excluded.is_paid,
                        conversation_state = excluded.conversation_state,
                        profile = excluded.profile,
                        updated_at = excluded.updated_at"
                ),
                params![
                    user.identity.clone(),
                    user.is_paid as i64,
                    user.conversation_state.as_str(),
                    profile,
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save: {e}")))?;

        Ok(())
    }

    async fn count_users(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()?
            .query("SELECT COUNT(*) FROM users", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_users: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_users: {e}")))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_users: {e}"))),
        }
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
        if conn.is_some() {
            info!("Database connection closed");
        }
        Ok(())
    }
}
