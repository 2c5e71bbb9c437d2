//! Persistence store (§4.2): a shared, process-wide SQLite-backed log of
//! tasks and their messages. Failures here are logged and swallowed by
//! design — the pipeline never crashes because the store had a bad day.

use ao_domain::task::{MessageKind, MessageRecord, Task};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema
    /// migration. Safe to call concurrently from multiple sessions against
    /// the same pool.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await?;

        let migration_sql = include_str!("../migrations/001_orchestrator_schema.sql");
        sqlx::raw_sql(migration_sql).execute(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let migration_sql = include_str!("../migrations/001_orchestrator_schema.sql");
        sqlx::raw_sql(migration_sql).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert the task if it is absent. A no-op when the task already exists.
    pub async fn ensure_task(&self, task_id: &str, title: &str, created_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO tasks (task_id, title, created_at) VALUES (?1, ?2, ?3)")
            .bind(task_id)
            .bind(title)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rename a task. Returns `true` if a row was updated.
    pub async fn rename_task(&self, task_id: &str, new_title: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE tasks SET title = ?1 WHERE task_id = ?2")
            .bind(new_title)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a task and cascade its messages. Returns `true` if a row was
    /// deleted; a non-existent task is a no-op returning `false`.
    pub async fn delete_task(&self, task_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_task(&self, task_id: &str) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query("SELECT task_id, title, created_at FROM tasks WHERE task_id = ?1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Task {
            task_id: r.get("task_id"),
            title: r.get("title"),
            created_at: parse_rfc3339(r.get("created_at")),
        }))
    }

    pub async fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query("SELECT task_id, title, created_at FROM tasks ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Task {
                task_id: r.get("task_id"),
                title: r.get("title"),
                created_at: parse_rfc3339(r.get("created_at")),
            })
            .collect())
    }

    /// Append a message. When `task_id` is absent, the call is ignored and a
    /// warning is logged — the caller never sees an error for this case.
    pub async fn append_message(
        &self,
        task_id: &str,
        session_id: &str,
        kind: MessageKind,
        payload: &str,
    ) {
        let timestamp = Utc::now();
        let result = sqlx::query(
            "INSERT INTO messages (task_id, session_id, timestamp, kind, payload) \
             SELECT ?1, ?2, ?3, ?4, ?5 WHERE EXISTS (SELECT 1 FROM tasks WHERE task_id = ?1)",
        )
        .bind(task_id)
        .bind(session_id)
        .bind(timestamp.to_rfc3339())
        .bind(kind.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) if r.rows_affected() == 0 => {
                tracing::warn!(task_id, "append_message: task does not exist, dropping message");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(task_id, error = %e, "append_message: store write failed, dropping message");
            }
        }
    }

    /// Messages for a task, ordered by timestamp ascending.
    pub async fn messages_for_task(&self, task_id: &str) -> anyhow::Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            "SELECT task_id, session_id, timestamp, kind, payload FROM messages \
             WHERE task_id = ?1 ORDER BY timestamp ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let kind_str: String = r.get("kind");
                let kind = MessageKind::parse(&kind_str)?;
                Some(MessageRecord {
                    task_id: r.get("task_id"),
                    session_id: r.get("session_id"),
                    timestamp: parse_rfc3339(r.get("timestamp")),
                    kind,
                    payload: r.get("payload"),
                })
            })
            .collect())
    }
}

fn parse_rfc3339(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_task_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_task("t1", "First", Utc::now()).await.unwrap();
        store.ensure_task("t1", "Second attempt at same id", Utc::now()).await.unwrap();
        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.title, "First");
    }

    #[tokio::test]
    async fn rename_task_round_trips() {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_task("t1", "Old", Utc::now()).await.unwrap();
        assert!(store.rename_task("t1", "New").await.unwrap());
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().title, "New");
        assert!(!store.rename_task("missing", "New").await.unwrap());
    }

    #[tokio::test]
    async fn delete_task_cascades_messages() {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_task("t1", "Task", Utc::now()).await.unwrap();
        store.append_message("t1", "s1", MessageKind::UserInput, "hello").await;
        assert!(store.delete_task("t1").await.unwrap());
        assert!(store.messages_for_task("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_nonexistent_task_is_noop() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(!store.delete_task("missing").await.unwrap());
    }

    #[tokio::test]
    async fn append_message_to_missing_task_is_swallowed() {
        let store = Store::open_in_memory().await.unwrap();
        store.append_message("missing", "s1", MessageKind::UserInput, "hello").await;
        assert!(store.messages_for_task("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_for_task_ordered_by_timestamp_ascending() {
        let store = Store::open_in_memory().await.unwrap();
        store.ensure_task("t1", "Task", Utc::now()).await.unwrap();
        for i in 0..5 {
            store
                .append_message("t1", "s1", MessageKind::AgentMessage, &format!("msg-{i}"))
                .await;
        }
        let messages = store.messages_for_task("t1").await.unwrap();
        let payloads: Vec<_> = messages.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
    }
}
