//! Reported folder status: the stored record, checked against the live
//! folder when it claims to be `indexed`.

use std::collections::HashMap;

use folder_search_core::models::{FolderIndexRecord, IndexStatus};
use folder_search_core::staleness::{compare_with_live, stored_verdict, LiveMetadata, Verdict};

use crate::error::Result;
use crate::provider::Provider;
use crate::status_store::StatusStore;

pub async fn effective_status(
    provider: &dyn Provider,
    folder_path: &str,
    record: Option<&FolderIndexRecord>,
) -> IndexStatus {
    let last_indexed_at = match stored_verdict(record) {
        Verdict::Final(status) => return status,
        Verdict::CheckLive { last_indexed_at } => last_indexed_at,
    };

    let live = match provider.get_metadata(folder_path).await {
        Ok(Some(item)) => LiveMetadata::Modified(item.last_modified),
        Ok(None) => LiveMetadata::Missing,
        Err(e) => {
            tracing::warn!(
                owner = provider.provider_id(),
                folder = folder_path,
                error = %e,
                "metadata lookup failed, reporting indexed"
            );
            LiveMetadata::LookupFailed
        }
    };
    compare_with_live(last_indexed_at, live)
}

/// Status for every requested folder, read with one store query.
pub async fn batch_status(
    store: &StatusStore,
    provider: &dyn Provider,
    folder_paths: &[String],
) -> Result<HashMap<String, IndexStatus>> {
    let records = store
        .get_statuses(provider.provider_id(), folder_paths)
        .await?;

    let mut statuses = HashMap::with_capacity(folder_paths.len());
    for path in folder_paths {
        let status = effective_status(provider, path, records.get(path)).await;
        statuses.insert(path.clone(), status);
    }
    Ok(statuses)
}
