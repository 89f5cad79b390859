//! Token usage accounting for LLM completions.

use uuid::Uuid;

use crate::error::StorageError;

/// Accumulated token totals for a dialog.
#[derive(Debug, Clone, Default, sqlx::FromRow, serde::Serialize)]
pub struct UsageTotals {
    /// Total prompt tokens.
    pub input_tokens: i64,
    /// Total completion tokens.
    pub output_tokens: i64,
}

/// Record one completion's token usage.
pub async fn record(
    pool: &super::DbPool,
    dialog_id: Uuid,
    model: &str,
    input_tokens: u32,
    output_tokens: u32,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO llm_usage (dialog_id, model, input_tokens, output_tokens, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(dialog_id.to_string())
    .bind(model)
    .bind(i64::from(input_tokens))
    .bind(i64::from(output_tokens))
    .bind(super::now_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(())
}

/// Sum token usage across a dialog's completions.
pub async fn totals_for_dialog(
    pool: &super::DbPool,
    dialog_id: Uuid,
) -> Result<UsageTotals, StorageError> {
    sqlx::query_as(
        "SELECT COALESCE(SUM(input_tokens), 0) AS input_tokens, \
                COALESCE(SUM(output_tokens), 0) AS output_tokens \
         FROM llm_usage WHERE dialog_id = ?",
    )
    .bind(dialog_id.to_string())
    .fetch_one(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn totals_sum_across_records() {
        let pool = init_test_db().await.expect("db");
        let dialog_id = Uuid::new_v4();

        record(&pool, dialog_id, "m", 10, 5).await.expect("record");
        record(&pool, dialog_id, "m", 7, 3).await.expect("record");
        record(&pool, Uuid::new_v4(), "m", 100, 100)
            .await
            .expect("record");

        let totals = totals_for_dialog(&pool, dialog_id).await.expect("totals");
        assert_eq!(totals.input_tokens, 17);
        assert_eq!(totals.output_tokens, 8);
    }
}
