//! JSON export and import of the whole record collection.
//!
//! The format is a pretty-printed array of records. Ids and search terms in
//! an export are ignored on import: ids are reassigned and terms re-derived.

use super::{transact, NewRecord, RecordStore};
use crate::core::pool;
use crate::error::StoreError;
use std::io::{Read, Write};
use tracing::info;

/// Write every readable record as JSON. Returns the number written.
pub fn export_json<W: Write>(store: &dyn RecordStore, writer: W) -> Result<usize, StoreError> {
    let records = store.scan_all()?;
    serde_json::to_writer_pretty(writer, &records)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    info!(count = records.len(), "exported records");
    Ok(records.len())
}

/// Add the records from a JSON export. Returns the number imported.
///
/// All records are added in one transaction. Pooled records go through the
/// pool sequencer, so an imported record landing on an occupied slot pushes
/// the existing ones up instead of colliding.
pub fn import_json<R: Read>(store: &dyn RecordStore, reader: R) -> Result<usize, StoreError> {
    let records: Vec<NewRecord> =
        serde_json::from_reader(reader).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let imported = transact(store, |tx| {
        let mut count = 0;
        for record in records {
            if record.pool_id.is_some() {
                pool::insert_pooled(tx, record)?;
            } else {
                tx.insert(NewRecord {
                    pool_index: None,
                    ..record
                })?;
            }
            count += 1;
        }
        Ok(count)
    })?;

    info!(count = imported, "imported records");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryStore;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn export_then_import_into_empty_store() {
        let source = InMemoryStore::new();
        source
            .insert(
                NewRecord::new("https://site/1", "https://cdn/1.png", tags(&["artist:Ann"]))
                    .with_fingerprint("dct8:00000000000000ff"),
            )
            .unwrap();
        source
            .insert(NewRecord::new("https://site/2", "https://cdn/2.png", vec![]).with_pool("p", 0))
            .unwrap();

        let mut json = Vec::new();
        assert_eq!(export_json(&source, &mut json).unwrap(), 2);

        let target = InMemoryStore::new();
        assert_eq!(import_json(&target, json.as_slice()).unwrap(), 2);

        let records = target.scan_all().unwrap();
        assert_eq!(records[0].fingerprint.as_deref(), Some("dct8:00000000000000ff"));
        assert_eq!(records[0].tag_text, vec!["artist:ann", "ann"]);
        assert_eq!(records[1].pool_slot(), Some(("p", 0)));
    }

    #[test]
    fn import_shifts_occupied_pool_slots() {
        let store = InMemoryStore::new();
        store
            .insert(NewRecord::new("old", "old.png", vec![]).with_pool("p", 0))
            .unwrap();

        let json = r#"[{
            "source_url": "new",
            "media_url": "new.png",
            "tags": [],
            "timestamp": "2024-01-01T00:00:00Z",
            "pool_id": "p",
            "pool_index": 0
        }]"#;
        import_json(&store, json.as_bytes()).unwrap();

        let order: Vec<String> = store
            .get_by_pool("p")
            .unwrap()
            .into_iter()
            .map(|r| r.source_url)
            .collect();
        assert_eq!(order, vec!["new", "old"]);
    }

    #[test]
    fn pooled_record_without_index_is_appended() {
        let store = InMemoryStore::new();
        store
            .insert(NewRecord::new("first", "1.png", vec![]).with_pool("p", 0))
            .unwrap();

        let json = r#"[{
            "source_url": "second",
            "media_url": "2.png",
            "timestamp": "2024-01-01T00:00:00Z",
            "pool_id": "p"
        }]"#;
        import_json(&store, json.as_bytes()).unwrap();

        let second = store.get_by_pool_and_index("p", 1).unwrap().unwrap();
        assert_eq!(second.source_url, "second");
    }

    #[test]
    fn malformed_json_imports_nothing() {
        let store = InMemoryStore::new();
        let result = import_json(&store, "[{\"source_url\": 5}]".as_bytes());

        assert!(matches!(result, Err(StoreError::Serialization(_))));
        assert_eq!(store.count().unwrap(), 0);
    }
}
