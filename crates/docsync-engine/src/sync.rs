//! Logical documents to KV records, and batched writes.

use serde_json::Value;
use std::collections::BTreeMap;

use docsync_core::error::{Error, Result};
use docsync_core::traits::{Collection, Embedder, Scope};
use docsync_core::types::{
    clean_content, content_id, BatchReport, DocId, Filters, LogicalDocument, MultiMutationResult, SkippedDocument,
    StoredRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fails per key when the id is already stored.
    Insert,
    Upsert,
}

/// Projects a document onto its stored record.
///
/// The embedder runs only when the document carries no embedding. `filters`
/// lands in the record only when non-empty.
pub fn prepare(document: &LogicalDocument, embedder: &dyn Embedder, filters: Option<&Filters>) -> Result<StoredRecord> {
    if document.content.is_empty() {
        return Err(Error::InvalidDocument(format!("Document {} has no content", document.name)));
    }
    tracing::debug!("preparing document: {}", document.name);

    let embedding = match &document.embedding {
        Some(embedding) => embedding.clone(),
        None => embedder
            .embed(&document.content)
            .map_err(|e| Error::Embedding(format!("Failed to generate embedding for document {}: {e}", document.name)))?,
    };

    Ok(StoredRecord {
        id: content_id(&document.content),
        name: document.name.clone(),
        content: clean_content(&document.content),
        meta_data: document.meta_data.clone(),
        embedding,
        filters: filters.filter(|f| !f.is_empty()).cloned(),
    })
}

/// Prepares and writes `documents` in one multi-key call.
///
/// Never fails: unpreparable documents are skipped, per-key and whole-call
/// backend failures are logged and listed in the report.
pub fn write_batch(
    mode: WriteMode,
    collection: &dyn Collection,
    embedder: &dyn Embedder,
    documents: &[LogicalDocument],
    filters: Option<&Filters>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut batch: BTreeMap<DocId, Value> = BTreeMap::new();
    for document in documents {
        match prepare(document, embedder, filters) {
            Ok(record) => {
                batch.insert(record.id.clone(), record.to_value());
            }
            Err(e) => {
                tracing::error!("skipping document {}: {e}", document.name);
                report.skipped.push(SkippedDocument { name: document.name.clone(), reason: e.to_string() });
            }
        }
    }
    report.attempted = batch.len();
    if batch.is_empty() {
        tracing::debug!("nothing to write to {}", collection.name());
        return report;
    }

    let outcome = match mode {
        WriteMode::Insert => collection.insert_multi(&batch),
        WriteMode::Upsert => collection.upsert_multi(&batch),
    };
    match outcome {
        Ok(result) => record_outcome(&mut report, batch, result, mode, collection.name()),
        Err(e) => {
            tracing::error!("{mode:?} of {} documents into {} failed: {e}", batch.len(), collection.name());
            report.failed = batch.into_keys().map(|id| (id, e.to_string())).collect();
        }
    }
    report
}

fn record_outcome(
    report: &mut BatchReport,
    batch: BTreeMap<DocId, Value>,
    result: MultiMutationResult,
    mode: WriteMode,
    collection: &str,
) {
    if !result.all_ok {
        let keys: Vec<&str> = result.exceptions.keys().map(String::as_str).collect();
        tracing::warn!("{mode:?} into {collection} failed for keys: {}", keys.join(", "));
    }
    for id in batch.into_keys() {
        match result.exceptions.get(&id) {
            Some(e) => {
                report.failed.insert(id, e.to_string());
            }
            None => report.stored.push(id),
        }
    }
    if result.all_ok {
        tracing::info!("{mode:?} of {} documents into {collection} succeeded", report.stored.len());
    }
}

pub fn id_exists(collection: &dyn Collection, id: &str) -> bool {
    collection.exists(id).unwrap_or_else(|e| {
        tracing::warn!("existence check for {id} failed: {e}");
        false
    })
}

pub fn doc_exists(collection: &dyn Collection, document: &LogicalDocument) -> bool {
    id_exists(collection, &document.content_id())
}

/// Whether any record in `collection` is named `name`. Errors read as `false`.
pub fn name_exists(scope: &dyn Scope, collection: &str, name: &str) -> bool {
    match scope.find_by_field(collection, "name", &Value::String(name.to_string()), 1) {
        Ok(rows) => !rows.is_empty(),
        Err(e) => {
            tracing::warn!("name lookup for {name} failed: {e}");
            false
        }
    }
}
