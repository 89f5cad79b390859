//! Repository for dialog messages.
//!
//! Messages are append-mostly; the upsert-by-id strategy lets a re-run
//! of the same save (or a streaming text extension) update the existing
//! row instead of duplicating it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dialog::{Message, MessageStatus};
use crate::error::StorageError;
use crate::template::MessageRole;

type SqliteExecutor<'e> = &'e mut sqlx::SqliteConnection;

/// Raw message row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    /// Message id (UUID text).
    pub id: String,
    /// Previous message in the chain.
    pub parent_id: Option<String>,
    /// Owning dialog id.
    pub dialog_id: String,
    /// Speaker role.
    pub role: String,
    /// Producing model.
    pub model: Option<String>,
    /// Text payload.
    pub text: String,
    /// Lifecycle status.
    pub status: String,
    /// MIME type.
    pub mime_type: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Free-form metadata JSON.
    pub extra: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let decode = |message: String| StorageError::Decode { message };

        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| decode(format!("message id '{}': {e}", row.id)))?,
            parent_id: row
                .parent_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()
                .map_err(|e| decode(format!("message parent_id: {e}")))?,
            dialog_id: Uuid::parse_str(&row.dialog_id)
                .map_err(|e| decode(format!("message dialog_id: {e}")))?,
            role: MessageRole::from_str(&row.role).map_err(decode)?,
            model: row.model,
            text: row.text,
            status: MessageStatus::from_str(&row.status).map_err(decode)?,
            mime_type: row.mime_type,
            timestamp: DateTime::parse_from_rfc3339(&row.timestamp)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| decode(format!("message timestamp: {e}")))?,
            extra: row
                .extra
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| decode(format!("message extra: {e}")))?,
        })
    }
}

/// Insert-or-update a message by id.
///
/// Role, dialog, and timestamp are fixed at insert; conflicts update
/// only the mutable columns (status, text, model, parent linkage,
/// extra).
pub async fn upsert(conn: SqliteExecutor<'_>, message: &Message) -> Result<(), StorageError> {
    message.validate()?;

    let extra = message
        .extra
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Decode {
            message: format!("message extra: {e}"),
        })?;

    sqlx::query(
        "INSERT INTO messages \
         (id, parent_id, dialog_id, role, model, text, status, mime_type, timestamp, extra) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           parent_id = excluded.parent_id, \
           model = excluded.model, \
           text = excluded.text, \
           status = excluded.status, \
           extra = excluded.extra",
    )
    .bind(message.id.to_string())
    .bind(message.parent_id.map(|id| id.to_string()))
    .bind(message.dialog_id.to_string())
    .bind(message.role.as_str())
    .bind(&message.model)
    .bind(&message.text)
    .bind(message.status.as_str())
    .bind(&message.mime_type)
    .bind(message.timestamp.to_rfc3339())
    .bind(extra)
    .execute(conn)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Fetch a dialog's messages ordered by timestamp ascending.
pub async fn get_by_dialog(
    pool: &super::DbPool,
    dialog_id: Uuid,
) -> Result<Vec<Message>, StorageError> {
    let rows: Vec<MessageRow> = sqlx::query_as(
        "SELECT id, parent_id, dialog_id, role, model, text, status, mime_type, timestamp, extra \
         FROM messages WHERE dialog_id = ? ORDER BY timestamp ASC, rowid ASC",
    )
    .bind(dialog_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(Message::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dialogs;
    use crate::storage::init_test_db;
    use crate::template::DialogTemplate;

    async fn seeded_dialog(pool: &super::super::DbPool) -> crate::dialog::Dialog {
        let template: DialogTemplate =
            serde_yaml::from_str("name: t\nmodel: m\nsteps: []").expect("template");
        let mut dialog = crate::dialog::Dialog::from_template(&template, None, None, None);
        let mut conn = pool.acquire().await.expect("conn");
        dialogs::create(&mut conn, &mut dialog).await.expect("create dialog");
        dialog
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let pool = init_test_db().await.expect("db");
        let dialog = seeded_dialog(&pool).await;

        let mut message = Message::new(
            dialog.id,
            MessageRole::User,
            "first",
            None,
            MessageStatus::Pending,
        );

        let mut conn = pool.acquire().await.expect("conn");
        upsert(&mut conn, &message).await.expect("insert");
        message.text = "extended".to_string();
        message.status = MessageStatus::Delivered;
        upsert(&mut conn, &message).await.expect("update");
        drop(conn);

        let loaded = get_by_dialog(&pool, dialog.id).await.expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "extended");
        assert_eq!(loaded[0].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn assistant_without_model_is_rejected() {
        let pool = init_test_db().await.expect("db");
        let dialog = seeded_dialog(&pool).await;

        let message = Message::new(
            dialog.id,
            MessageRole::Assistant,
            "",
            None,
            MessageStatus::Pending,
        );

        let mut conn = pool.acquire().await.expect("conn");
        let err = upsert(&mut conn, &message).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[tokio::test]
    async fn messages_come_back_in_timestamp_order() {
        let pool = init_test_db().await.expect("db");
        let dialog = seeded_dialog(&pool).await;

        let mut conn = pool.acquire().await.expect("conn");
        for text in ["one", "two", "three"] {
            let message = Message::new(
                dialog.id,
                MessageRole::User,
                text,
                None,
                MessageStatus::Pending,
            );
            upsert(&mut conn, &message).await.expect("insert");
        }
        drop(conn);

        let loaded = get_by_dialog(&pool, dialog.id).await.expect("load");
        let texts: Vec<&str> = loaded.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }
}
