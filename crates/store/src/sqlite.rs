//! SQLite session store.
//!
//! One database file holds every table the session needs:
//! - `conversations`: the message log, ordered by its autoincrement key
//! - `problems`: per-problem progress (attempts, completion)
//! - `active_problem`: a single-row pointer to the current problem
//! - `code_snapshots`: saved student code
//! - `settings`: JSON-valued preferences

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use zerotohire_core::error::StoreError;
use zerotohire_core::message::{Message, Role};
use zerotohire_core::problem::{ActiveProblemRef, Difficulty, ProblemId};
use zerotohire_core::store::{CodeSnapshot, SessionStore, StoreStats};

/// A SQLite-backed session store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// The database and all tables are created automatically.
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database lives only as long as its connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    /// Open a store at a filesystem path, creating parent directories.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    problem_id  INTEGER,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    timestamp   TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_problem ON conversations(problem_id, id)",
            ),
            (
                "problems table",
                r#"
                CREATE TABLE IF NOT EXISTS problems (
                    problem_id          INTEGER PRIMARY KEY,
                    title               TEXT NOT NULL DEFAULT '',
                    difficulty          TEXT NOT NULL DEFAULT 'Unknown',
                    completed           INTEGER NOT NULL DEFAULT 0,
                    completed_at        TEXT,
                    attempts_count      INTEGER NOT NULL DEFAULT 0,
                    first_attempted_at  TEXT,
                    last_attempted_at   TEXT
                )
                "#,
            ),
            (
                "active_problem table",
                r#"
                CREATE TABLE IF NOT EXISTS active_problem (
                    slot        INTEGER PRIMARY KEY CHECK (slot = 0),
                    problem_id  INTEGER NOT NULL,
                    title       TEXT NOT NULL,
                    difficulty  TEXT NOT NULL
                )
                "#,
            ),
            (
                "code_snapshots table",
                r#"
                CREATE TABLE IF NOT EXISTS code_snapshots (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    problem_id  INTEGER NOT NULL,
                    code        TEXT NOT NULL,
                    language    TEXT NOT NULL,
                    saved_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "settings table",
                r#"
                CREATE TABLE IF NOT EXISTS settings (
                    key         TEXT PRIMARY KEY,
                    value       TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let problem_id: Option<i64> = row
            .try_get("problem_id")
            .map_err(|e| StoreError::QueryFailed(format!("problem_id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;

        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role}'")))?;

        Ok(Message {
            id: id.to_string(),
            role,
            content,
            problem_id: problem_id.map(|id| ProblemId(id as u64)),
            timestamp: Self::parse_timestamp(&timestamp),
        })
    }

    fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<CodeSnapshot, StoreError> {
        let problem_id: i64 = row
            .try_get("problem_id")
            .map_err(|e| StoreError::QueryFailed(format!("problem_id column: {e}")))?;
        let code: String = row
            .try_get("code")
            .map_err(|e| StoreError::QueryFailed(format!("code column: {e}")))?;
        let language: String = row
            .try_get("language")
            .map_err(|e| StoreError::QueryFailed(format!("language column: {e}")))?;
        let saved_at: String = row
            .try_get("saved_at")
            .map_err(|e| StoreError::QueryFailed(format!("saved_at column: {e}")))?;

        Ok(CodeSnapshot {
            problem_id: ProblemId(problem_id as u64),
            code,
            language,
            saved_at: Self::parse_timestamp(&saved_at),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_message(
        &self,
        role: Role,
        content: &str,
        problem_id: Option<ProblemId>,
    ) -> Result<Message, StoreError> {
        let timestamp = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversations (problem_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(problem_id.map(|id| id.0 as i64))
        .bind(role.as_str())
        .bind(content)
        .bind(timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        Ok(Message {
            id: result.last_insert_rowid().to_string(),
            role,
            content: content.to_string(),
            problem_id,
            timestamp,
        })
    }

    async fn recent_messages(
        &self,
        problem_id: Option<ProblemId>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        // Negative LIMIT means "no limit" in SQLite.
        let limit = limit.map_or(-1, |l| l as i64);
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, problem_id, role, content, timestamp
                FROM conversations
                WHERE ?1 IS NULL OR problem_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            ) ORDER BY id ASC
            "#,
        )
        .bind(problem_id.map(|id| id.0 as i64))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Load history: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn clear_messages(&self, problem_id: Option<ProblemId>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE ?1 IS NULL OR problem_id = ?1")
            .bind(problem_id.map(|id| id.0 as i64))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE messages failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn active_problem(&self) -> Result<Option<ActiveProblemRef>, StoreError> {
        let row = sqlx::query("SELECT problem_id, title, difficulty FROM active_problem WHERE slot = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Load active problem: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row
            .try_get("problem_id")
            .map_err(|e| StoreError::QueryFailed(format!("problem_id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let difficulty: String = row
            .try_get("difficulty")
            .map_err(|e| StoreError::QueryFailed(format!("difficulty column: {e}")))?;

        Ok(Some(ActiveProblemRef {
            id: ProblemId(id as u64),
            title,
            difficulty: Difficulty::parse(&difficulty),
        }))
    }

    async fn set_active_problem(&self, problem: &ActiveProblemRef) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO active_problem (slot, problem_id, title, difficulty)
            VALUES (0, ?1, ?2, ?3)
            ON CONFLICT(slot) DO UPDATE SET
                problem_id = excluded.problem_id,
                title = excluded.title,
                difficulty = excluded.difficulty
            "#,
        )
        .bind(problem.id.0 as i64)
        .bind(&problem.title)
        .bind(problem.difficulty.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Set active problem: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO problems (problem_id, title, difficulty, attempts_count, first_attempted_at, last_attempted_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(problem_id) DO UPDATE SET
                title = excluded.title,
                difficulty = excluded.difficulty,
                attempts_count = problems.attempts_count + 1,
                first_attempted_at = COALESCE(problems.first_attempted_at, excluded.first_attempted_at),
                last_attempted_at = excluded.last_attempted_at
            "#,
        )
        .bind(problem.id.0 as i64)
        .bind(&problem.title)
        .bind(problem.difficulty.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Record attempt: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit active problem: {e}")))?;

        debug!(problem_id = %problem.id, "Active problem updated");
        Ok(())
    }

    async fn clear_active_problem(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM active_problem")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Clear active problem: {e}")))?;
        Ok(())
    }

    async fn mark_completed(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO problems (problem_id, completed, completed_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT(problem_id) DO UPDATE SET
                completed = 1,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(problem_id.0 as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Mark completed: {e}")))?;
        Ok(())
    }

    async fn mark_incomplete(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        sqlx::query("UPDATE problems SET completed = 0, completed_at = NULL WHERE problem_id = ?1")
            .bind(problem_id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Mark incomplete: {e}")))?;
        Ok(())
    }

    async fn is_completed(&self, problem_id: ProblemId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT completed FROM problems WHERE problem_id = ?1")
            .bind(problem_id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Completion lookup: {e}")))?;

        Ok(match row {
            Some(row) => row.try_get::<i64, _>("completed").unwrap_or(0) != 0,
            None => false,
        })
    }

    async fn completed_problems(&self) -> Result<Vec<ProblemId>, StoreError> {
        let rows = sqlx::query(
            "SELECT problem_id FROM problems WHERE completed = 1 ORDER BY completed_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Completed list: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("problem_id")
                    .map(|id| ProblemId(id as u64))
                    .map_err(|e| StoreError::QueryFailed(format!("problem_id column: {e}")))
            })
            .collect()
    }

    async fn save_code(
        &self,
        problem_id: ProblemId,
        code: &str,
        language: &str,
    ) -> Result<CodeSnapshot, StoreError> {
        let saved_at = Utc::now();
        sqlx::query(
            "INSERT INTO code_snapshots (problem_id, code, language, saved_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(problem_id.0 as i64)
        .bind(code)
        .bind(language)
        .bind(saved_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Save code: {e}")))?;

        Ok(CodeSnapshot {
            problem_id,
            code: code.to_string(),
            language: language.to_string(),
            saved_at,
        })
    }

    async fn latest_code(&self, problem_id: ProblemId) -> Result<Option<CodeSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT problem_id, code, language, saved_at FROM code_snapshots WHERE problem_id = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(problem_id.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Latest code: {e}")))?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn reset_problem(&self, problem_id: ProblemId) -> Result<(), StoreError> {
        let id = problem_id.0 as i64;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction: {e}")))?;

        for sql in [
            "DELETE FROM conversations WHERE problem_id = ?1",
            "DELETE FROM code_snapshots WHERE problem_id = ?1",
            "DELETE FROM problems WHERE problem_id = ?1",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("Reset problem {problem_id}: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit reset: {e}")))?;

        info!(problem_id = %problem_id, "Problem reset");
        Ok(())
    }

    async fn setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Load setting {key}: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("value")
            .map_err(|e| StoreError::QueryFailed(format!("value column: {e}")))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::QueryFailed(format!("Setting {key} is not JSON: {e}")))
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Save setting {key}: {e}")))?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM problems WHERE attempts_count > 0) AS attempted,
                (SELECT COUNT(*) FROM problems WHERE completed = 1) AS completed,
                (SELECT COUNT(*) FROM conversations) AS messages
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Stats: {e}")))?;

        let attempted: i64 = row.try_get("attempted").unwrap_or(0);
        let completed: i64 = row.try_get("completed").unwrap_or(0);
        let messages: i64 = row.try_get("messages").unwrap_or(0);

        let rows = sqlx::query(
            "SELECT difficulty, COUNT(*) AS n FROM problems WHERE completed = 1 GROUP BY difficulty",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Stats by difficulty: {e}")))?;

        let mut by_difficulty = BTreeMap::new();
        for row in &rows {
            let difficulty: String = row.try_get("difficulty").unwrap_or_default();
            let n: i64 = row.try_get("n").unwrap_or(0);
            by_difficulty.insert(Difficulty::parse(&difficulty).to_string(), n as u64);
        }

        Ok(StoreStats::from_counts(
            attempted as u64,
            completed as u64,
            messages as u64,
            by_difficulty,
        ))
    }
}
