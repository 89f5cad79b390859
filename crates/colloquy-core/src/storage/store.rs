//! Transactional dialog persistence.
//!
//! `DialogStore` owns the save discipline: one transaction updates the
//! dialog row and upserts every message with parent-chain linkage fixed
//! in order. Saves for the same dialog are serialized by an in-process
//! lock keyed by dialog id; cross-process serialization comes from the
//! job queue delivering a dialog's jobs to one worker at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::dialog::{Dialog, MessageStatus};
use crate::error::StorageError;
use crate::storage::{dialogs, messages, DbPool};

/// Transactional save/load for dialogs and their messages.
pub struct DialogStore {
    pool: DbPool,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl DialogStore {
    /// Wrap a connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying pool, for repositories that manage their own scope.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(id).or_default())
    }

    /// Insert a new dialog (no messages yet).
    pub async fn create_dialog(&self, dialog: &mut Dialog) -> Result<(), StorageError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Connection { source: e })?;
        dialogs::create(&mut conn, dialog).await?;
        tracing::info!(dialog_id = %dialog.id, template = %dialog.template.name, "created dialog");
        Ok(())
    }

    /// Save the dialog row and all of its messages in one transaction.
    ///
    /// Parent linkage: message `i > 0` gets `parent_id = messages[i-1].id`.
    /// Messages still in `created` status are written as `pending` (the
    /// row is now durably complete) and the in-memory copy is updated
    /// after commit. On error the transaction rolls back and in-memory
    /// state keeps only what the caller already mutated.
    pub async fn save_dialog(&self, dialog: &mut Dialog) -> Result<(), StorageError> {
        let lock = self.lock_for(dialog.id);
        let _guard = lock.lock().await;

        tracing::debug!(
            dialog_id = %dialog.id,
            state = %dialog.current_state,
            status = dialog.status.as_str(),
            messages = dialog.messages.len(),
            "saving dialog",
        );

        for i in 1..dialog.messages.len() {
            let parent = dialog.messages[i - 1].id;
            dialog.messages[i].parent_id = Some(parent);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection { source: e })?;

        dialogs::update(&mut tx, dialog).await?;

        let mut promoted = Vec::new();
        for (i, message) in dialog.messages.iter().enumerate() {
            if message.status == MessageStatus::Created {
                let mut complete = message.clone();
                complete.status = MessageStatus::Pending;
                messages::upsert(&mut tx, &complete).await?;
                promoted.push(i);
            } else {
                messages::upsert(&mut tx, message).await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Query { source: e })?;

        for i in promoted {
            dialog.messages[i].status = MessageStatus::Pending;
        }

        Ok(())
    }

    /// Load a dialog with its messages. Returns `None` if not found.
    pub async fn load_dialog(&self, id: Uuid) -> Result<Option<Dialog>, StorageError> {
        dialogs::get_with_messages(&self.pool, id).await
    }
}
