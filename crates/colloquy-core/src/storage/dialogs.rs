//! Repository for dialog rows.
//!
//! The embedded `Template` and `WorkflowData` documents are serialized
//! as JSON into their parent row with the same serde derives the domain
//! uses, so a persisted template round-trips structurally.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dialog::{Dialog, DialogStatus, WorkflowData};
use crate::error::StorageError;
use crate::template::DialogTemplate;

type SqliteExecutor<'e> = &'e mut sqlx::SqliteConnection;

/// Raw dialog row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DialogRow {
    /// Dialog id (UUID text).
    pub id: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Goal text.
    pub goal: Option<String>,
    /// Lifecycle status.
    pub status: String,
    /// State-machine label.
    pub current_state: String,
    /// Embedded workflow document JSON.
    pub workflow_data: String,
    /// Embedded template snapshot JSON.
    pub template: String,
    /// Terminal error description.
    pub error: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 last update time.
    pub updated_at: String,
}

impl TryFrom<DialogRow> for Dialog {
    type Error = StorageError;

    fn try_from(row: DialogRow) -> Result<Self, Self::Error> {
        let decode = |message: String| StorageError::Decode { message };

        let workflow_data: WorkflowData = serde_json::from_str(&row.workflow_data)
            .map_err(|e| decode(format!("dialog workflow_data: {e}")))?;
        let template: DialogTemplate = serde_json::from_str(&row.template)
            .map_err(|e| decode(format!("dialog template: {e}")))?;

        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| decode(format!("dialog id '{}': {e}", row.id)))?,
            description: row.description,
            goal: row.goal,
            status: DialogStatus::from_str(&row.status).map_err(decode)?,
            current_state: row.current_state,
            workflow_data,
            template,
            error: row.error,
            created_at: Some(parse_ts(&row.created_at, "created_at")?),
            updated_at: Some(parse_ts(&row.updated_at, "updated_at")?),
            messages: Vec::new(),
        })
    }
}

fn parse_ts(raw: &str, field: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Decode {
            message: format!("dialog {field}: {e}"),
        })
}

fn encode_documents(dialog: &Dialog) -> Result<(String, String), StorageError> {
    let workflow_data =
        serde_json::to_string(&dialog.workflow_data).map_err(|e| StorageError::Decode {
            message: format!("dialog workflow_data: {e}"),
        })?;
    let template = serde_json::to_string(&dialog.template).map_err(|e| StorageError::Decode {
        message: format!("dialog template: {e}"),
    })?;
    Ok((workflow_data, template))
}

/// Insert a new dialog row. Sets `created_at`/`updated_at` on the
/// passed dialog.
pub async fn create(conn: SqliteExecutor<'_>, dialog: &mut Dialog) -> Result<(), StorageError> {
    let (workflow_data, template) = encode_documents(dialog)?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO dialogs \
         (id, description, goal, status, current_state, workflow_data, template, error, \
          created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(dialog.id.to_string())
    .bind(&dialog.description)
    .bind(&dialog.goal)
    .bind(dialog.status.as_str())
    .bind(&dialog.current_state)
    .bind(workflow_data)
    .bind(template)
    .bind(&dialog.error)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    dialog.created_at = Some(now);
    dialog.updated_at = Some(now);
    Ok(())
}

/// Partial update of the mutable dialog columns. `updated_at` is set by
/// the store.
pub async fn update(conn: SqliteExecutor<'_>, dialog: &Dialog) -> Result<(), StorageError> {
    let (workflow_data, template) = encode_documents(dialog)?;

    sqlx::query(
        "UPDATE dialogs SET \
           description = ?, goal = ?, status = ?, current_state = ?, \
           workflow_data = ?, template = ?, error = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&dialog.description)
    .bind(&dialog.goal)
    .bind(dialog.status.as_str())
    .bind(&dialog.current_state)
    .bind(workflow_data)
    .bind(template)
    .bind(&dialog.error)
    .bind(super::now_rfc3339())
    .bind(dialog.id.to_string())
    .execute(conn)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

const SELECT_COLUMNS: &str = "id, description, goal, status, current_state, workflow_data, \
                              template, error, created_at, updated_at";

/// Fetch a dialog without its messages. Returns `None` if not found.
pub async fn get_by_id(pool: &super::DbPool, id: Uuid) -> Result<Option<Dialog>, StorageError> {
    let row: Option<DialogRow> =
        sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM dialogs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;

    row.map(Dialog::try_from).transpose()
}

/// Fetch a dialog with its messages loaded, ordered by timestamp
/// ascending. Returns `None` if not found.
pub async fn get_with_messages(
    pool: &super::DbPool,
    id: Uuid,
) -> Result<Option<Dialog>, StorageError> {
    let Some(mut dialog) = get_by_id(pool, id).await? else {
        return Ok(None);
    };
    dialog.messages = super::messages::get_by_dialog(pool, id).await?;
    Ok(Some(dialog))
}

/// Most recent dialogs, newest first by creation time.
pub async fn get_recent(pool: &super::DbPool, limit: i64) -> Result<Vec<Dialog>, StorageError> {
    let rows: Vec<DialogRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_COLUMNS} FROM dialogs ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(Dialog::try_from).collect()
}

/// Dialogs in any of the given statuses, newest first.
pub async fn filter_by_status(
    pool: &super::DbPool,
    statuses: &[DialogStatus],
) -> Result<Vec<Dialog>, StorageError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM dialogs WHERE status IN ({placeholders}) \
         ORDER BY created_at DESC"
    );
    let mut query = sqlx::query_as::<_, DialogRow>(&sql);
    for status in statuses {
        query = query.bind(status.as_str());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(Dialog::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    fn template() -> DialogTemplate {
        serde_yaml::from_str(
            "name: t\nmodel: m\nsteps:\n  - name: a\n    type: message\n    role: user\n    content: hi\n",
        )
        .expect("template")
    }

    #[tokio::test]
    async fn create_and_load_round_trips_embedded_template() {
        let pool = init_test_db().await.expect("db");
        let template = template();
        let mut dialog = Dialog::from_template(&template, Some("d".into()), None, None);

        let mut conn = pool.acquire().await.expect("conn");
        create(&mut conn, &mut dialog).await.expect("create");
        drop(conn);

        let loaded = get_by_id(&pool, dialog.id)
            .await
            .expect("load")
            .expect("found");
        assert_eq!(loaded.template, template);
        assert_eq!(loaded.status, DialogStatus::Pending);
        assert_eq!(loaded.current_state, "start");
        assert!(loaded.created_at.is_some());
    }

    #[tokio::test]
    async fn missing_dialog_is_none() {
        let pool = init_test_db().await.expect("db");
        let found = get_by_id(&pool, Uuid::new_v4()).await.expect("query");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn update_persists_workflow_progress() {
        let pool = init_test_db().await.expect("db");
        let mut dialog = Dialog::from_template(&template(), None, None, None);

        let mut conn = pool.acquire().await.expect("conn");
        create(&mut conn, &mut dialog).await.expect("create");

        dialog.status = DialogStatus::Running;
        dialog.current_state = "step_0".to_string();
        dialog.workflow_data.current_step_index = 1;
        update(&mut conn, &dialog).await.expect("update");
        drop(conn);

        let loaded = get_by_id(&pool, dialog.id)
            .await
            .expect("load")
            .expect("found");
        assert_eq!(loaded.status, DialogStatus::Running);
        assert_eq!(loaded.current_state, "step_0");
        assert_eq!(loaded.workflow_data.current_step_index, 1);
    }

    #[tokio::test]
    async fn filter_by_status_matches_any_given() {
        let pool = init_test_db().await.expect("db");
        let mut conn = pool.acquire().await.expect("conn");

        let mut waiting = Dialog::from_template(&template(), None, None, None);
        waiting.status = DialogStatus::WaitingForInput;
        create(&mut conn, &mut waiting).await.expect("create");

        let mut done = Dialog::from_template(&template(), None, None, None);
        done.status = DialogStatus::Completed;
        create(&mut conn, &mut done).await.expect("create");
        drop(conn);

        let found = filter_by_status(
            &pool,
            &[DialogStatus::WaitingForInput, DialogStatus::Running],
        )
        .await
        .expect("filter");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, waiting.id);

        let none = filter_by_status(&pool, &[]).await.expect("filter");
        assert!(none.is_empty());
    }
}
