//! SQLite implementation of [`TaskStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature.  Migrations are run automatically
//! on startup via [`SqliteStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to `CARGO_MANIFEST_DIR` (the crate root), so the directory is
//! embedded into the binary.  The database file location is determined at
//! runtime by the connection URL.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used deliberately so that no
//! `DATABASE_URL` environment variable is needed at compile time.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::domain::{TaskKind, TaskState};
use crate::entities::{TaskRecord, TaskStore};

/// SQLite-backed task record store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://easel.db"`
    /// or `"sqlite::memory:"` for tests.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database exists per connection; cap the pool at one
        // connection so every query (and the migrator) sees the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

// ── Row decoding ──────────────────────────────────────────────────────────────

type TaskRow = (
    String,         // id
    Option<String>, // api_task_id
    Option<String>, // api_task_callback
    Option<String>, // name
    String,         // kind
    String,         // status
    String,         // params
    i64,            // priority
    Option<String>, // result
    bool,           // bookmarked
    String,         // created_at
    String,         // updated_at
);

const TASK_COLUMNS: &str = "id, api_task_id, api_task_callback, name, kind, status, params, \
     priority, result, bookmarked, created_at, updated_at";

fn parse_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, column = %column, error = %e, "failed to parse task timestamp; using now");
        Utc::now()
    })
}

fn decode_row(row: TaskRow) -> Result<TaskRecord, sqlx::Error> {
    let (
        id,
        api_task_id,
        api_task_callback,
        name,
        kind,
        status,
        params,
        priority,
        result,
        bookmarked,
        created_at,
        updated_at,
    ) = row;
    Ok(TaskRecord {
        id,
        api_task_id,
        api_task_callback,
        name,
        kind: TaskKind::from_str(&kind).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        status: TaskState::from_str(&status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        params,
        priority,
        result,
        bookmarked,
        created_at: parse_timestamp(&created_at, "created_at"),
        updated_at: parse_timestamp(&updated_at, "updated_at"),
    })
}

// ── TaskStore ─────────────────────────────────────────────────────────────────

impl TaskStore for SqliteStore {
    async fn insert_task(&self, record: TaskRecord) -> Result<(), sqlx::Error> {
        let created_at = record.created_at.to_rfc3339();
        let updated_at = record.updated_at.to_rfc3339();
        sqlx::query(
            "INSERT INTO tasks (id, api_task_id, api_task_callback, name, kind, status, params, \
             priority, result, bookmarked, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&record.id)
        .bind(&record.api_task_id)
        .bind(&record.api_task_callback)
        .bind(&record.name)
        .bind(record.kind.to_string())
        .bind(record.status.to_string())
        .bind(&record.params)
        .bind(record.priority)
        .bind(&record.result)
        .bind(record.bookmarked)
        .bind(&created_at)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_row).transpose()
    }

    async fn update_task_fields(
        &self,
        id: &str,
        name: Option<&str>,
        params: Option<&str>,
        priority: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE tasks SET name = COALESCE(?1, name), params = COALESCE(?2, params), \
             priority = COALESCE(?3, priority), updated_at = ?4 WHERE id = ?5",
        )
        .bind(name)
        .bind(params)
        .bind(priority)
        .bind(&updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_task_status(
        &self,
        id: &str,
        status: TaskState,
        result: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET status = ?1, result = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(status.to_string())
            .bind(result)
            .bind(&updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_bookmarked(&self, id: &str, bookmarked: bool) -> Result<(), sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tasks SET bookmarked = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(bookmarked)
            .bind(&updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<TaskRecord>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'pending' \
             ORDER BY priority DESC, created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn list_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TaskRecord>, i64), sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status IN ('done', 'failed') \
             ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status IN ('done', 'failed')")
                .fetch_one(&self.pool)
                .await?;
        let records = rows
            .into_iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((records, total))
    }

    async fn interrupt_running_tasks(&self, result: &str) -> Result<u64, sqlx::Error> {
        let updated_at = Utc::now().to_rfc3339();
        let outcome = sqlx::query(
            "UPDATE tasks SET status = 'failed', result = ?1, updated_at = ?2 \
             WHERE status = 'running'",
        )
        .bind(result)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:")
            .await
            .expect("in-memory store should open")
    }

    /// Record with a distinct `created_at` per `offset_ms` so ordering tests
    /// are deterministic.
    fn record(id: &str, status: TaskState, priority: i64, offset_ms: i64) -> TaskRecord {
        let at = Utc::now() + Duration::milliseconds(offset_ms);
        TaskRecord {
            id: id.to_owned(),
            api_task_id: None,
            api_task_callback: None,
            name: None,
            kind: TaskKind::Txt2Img,
            status,
            params: r#"{"prompt":"a pier at dawn"}"#.to_owned(),
            priority,
            result: None,
            bookmarked: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = store().await;
        let mut original = record("t-1", TaskState::Pending, 3, 0);
        original.api_task_id = Some("api-9".to_owned());
        original.api_task_callback = Some("http://localhost:9/cb".to_owned());
        original.name = Some("portrait".to_owned());
        store.insert_task(original.clone()).await.unwrap();

        let loaded = store.get_task("t-1").await.unwrap().expect("row exists");
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.api_task_id, original.api_task_id);
        assert_eq!(loaded.api_task_callback, original.api_task_callback);
        assert_eq!(loaded.name, original.name);
        assert_eq!(loaded.kind, TaskKind::Txt2Img);
        assert_eq!(loaded.status, TaskState::Pending);
        assert_eq!(loaded.params, original.params);
        assert_eq!(loaded.priority, 3);
        assert_eq!(loaded.result, None);
        assert!(!loaded.bookmarked);
        assert_eq!(loaded.created_at, original.created_at);

        assert!(store.get_task("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_field_updates() {
        let store = store().await;
        store
            .insert_task(record("t-1", TaskState::Pending, 1, 0))
            .await
            .unwrap();

        store
            .update_task_fields("t-1", Some("renamed"), None, None)
            .await
            .unwrap();
        let loaded = store.get_task("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("renamed"));
        assert_eq!(loaded.priority, 1, "untouched fields must survive");

        store
            .update_task_fields("t-1", None, Some(r#"{"prompt":"edited"}"#), Some(7))
            .await
            .unwrap();
        let loaded = store.get_task("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("renamed"));
        assert_eq!(loaded.params, r#"{"prompt":"edited"}"#);
        assert_eq!(loaded.priority, 7);
    }

    #[tokio::test]
    async fn status_transition_stores_result() {
        let store = store().await;
        store
            .insert_task(record("t-1", TaskState::Pending, 0, 0))
            .await
            .unwrap();

        store
            .set_task_status("t-1", TaskState::Running, None)
            .await
            .unwrap();
        let loaded = store.get_task("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskState::Running);
        assert_eq!(loaded.result, None);

        store
            .set_task_status("t-1", TaskState::Failed, Some(r#"{"error":"boom"}"#))
            .await
            .unwrap();
        let loaded = store.get_task("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskState::Failed);
        assert_eq!(loaded.result_value().unwrap()["error"], "boom");
    }

    #[tokio::test]
    async fn list_pending_orders_by_priority_then_age() {
        let store = store().await;
        store.insert_task(record("low", TaskState::Pending, 1, 0)).await.unwrap();
        store.insert_task(record("high", TaskState::Pending, 9, 10)).await.unwrap();
        store.insert_task(record("mid-old", TaskState::Pending, 5, 20)).await.unwrap();
        store.insert_task(record("mid-new", TaskState::Pending, 5, 30)).await.unwrap();
        store.insert_task(record("done", TaskState::Done, 99, 40)).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid-old", "mid-new", "low"]);
    }

    #[tokio::test]
    async fn history_pages_exclude_pending_and_count_all() {
        let store = store().await;
        store.insert_task(record("pending", TaskState::Pending, 0, 0)).await.unwrap();
        store.insert_task(record("oldest", TaskState::Done, 0, 10)).await.unwrap();
        store.insert_task(record("middle", TaskState::Failed, 0, 20)).await.unwrap();
        store.insert_task(record("newest", TaskState::Done, 0, 30)).await.unwrap();

        let (page, total) = store.list_history(2, 0).await.unwrap();
        assert_eq!(total, 3);
        let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "middle"]);

        let (page, total) = store.list_history(2, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "oldest");
    }

    #[tokio::test]
    async fn bookmark_toggle_leaves_status_and_order_alone() {
        let store = store().await;
        store.insert_task(record("a", TaskState::Pending, 5, 0)).await.unwrap();
        store.insert_task(record("b", TaskState::Pending, 1, 10)).await.unwrap();

        store.set_bookmarked("b", true).await.unwrap();
        let loaded = store.get_task("b").await.unwrap().unwrap();
        assert!(loaded.bookmarked);
        assert_eq!(loaded.status, TaskState::Pending);

        let pending = store.list_pending().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let store = store().await;
        store.insert_task(record("t-1", TaskState::Pending, 0, 0)).await.unwrap();
        store.delete_task("t-1").await.unwrap();
        assert!(store.get_task("t-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn interrupt_marks_only_running_rows_failed() {
        let store = store().await;
        store.insert_task(record("running", TaskState::Running, 0, 0)).await.unwrap();
        store.insert_task(record("pending", TaskState::Pending, 0, 10)).await.unwrap();
        store.insert_task(record("done", TaskState::Done, 0, 20)).await.unwrap();

        let touched = store
            .interrupt_running_tasks(r#"{"error":"interrupted"}"#)
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let loaded = store.get_task("running").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskState::Failed);
        assert_eq!(loaded.result_value().unwrap()["error"], "interrupted");
        assert_eq!(
            store.get_task("pending").await.unwrap().unwrap().status,
            TaskState::Pending
        );
    }
}
