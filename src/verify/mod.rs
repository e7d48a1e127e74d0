//! C7: polls the vector store for per-code point existence and marks the
//! source table `is_embedded` for codes that verified present.

use std::collections::HashMap;

use crate::collaborators::{SourceTable, VectorStore};

/// For each code, scrolls `collection` with `filter(video_code == code)
/// limit 1`. A transport error for one code maps to `false` for that code
/// only — it never aborts the rest of the batch.
pub async fn verify_batch(
    vector_store: &dyn VectorStore,
    collection: &str,
    codes: &[String],
) -> HashMap<String, bool> {
    let mut results = HashMap::with_capacity(codes.len());
    for code in codes {
        let exists = vector_store.point_exists(collection, code).await.unwrap_or_else(|err| {
            tracing::warn!(code = %code, error = %err, "vector store verification failed, treating as absent");
            false
        });
        results.insert(code.clone(), exists);
    }
    results
}

/// Looks up source-row ids for codes that verified `true` and issues a bulk
/// `is_embedded` update. Codes with no source-row mapping are logged and
/// skipped rather than failing the whole call.
pub async fn mark_embedded(
    source_table: &dyn SourceTable,
    verification: &HashMap<String, bool>,
) -> anyhow::Result<()> {
    let mut ids = Vec::new();
    for (code, verified) in verification {
        if !*verified {
            continue;
        }
        match source_table.id_for_code(code).await? {
            Some(id) => ids.push(id),
            None => tracing::warn!(code = %code, "no source-row mapping for verified code, skipping mark_embedded"),
        }
    }
    source_table.mark_embedded(&ids).await
}
