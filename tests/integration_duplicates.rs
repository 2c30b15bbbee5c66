//! Integration tests for duplicate detection over a SQLite record store.
//!
//! Covers:
//! - Exact and near matches against stored fingerprints
//! - Threshold boundaries
//! - Media without a fingerprint
//! - Falling back to the local scan when the remote index is down

use std::sync::Arc;
use std::time::Duration;
use tagsaver_core::core::hasher::Fingerprint;
use tagsaver_core::core::resolver::{DuplicateResolver, RemoteDuplicateIndex, RemoteVerdict};
use tagsaver_core::core::store::{NewRecord, RecordStore, SqliteStore};
use tagsaver_core::error::RemoteError;
use tagsaver_core::events::{DuplicateEvent, Event, EventChannel};
use tempfile::TempDir;

const STORED: &str = "mean8:0000000000000000";
/// Five bits away from `STORED`
const NEAR: &str = "mean8:000000000000001f";
/// Twelve bits away from `STORED`
const FAR: &str = "mean8:0000000000000fff";

fn store_with(temp: &TempDir, fingerprints: &[&str]) -> Arc<dyn RecordStore> {
    let store = SqliteStore::open(&temp.path().join("records.db")).unwrap();
    for (i, fingerprint) in fingerprints.iter().enumerate() {
        store
            .insert(
                NewRecord::new(
                    format!("https://site/post/{i}"),
                    format!("https://cdn/{i}.png"),
                    vec!["cat".to_string()],
                )
                .with_fingerprint(*fingerprint),
            )
            .unwrap();
    }
    Arc::new(store)
}

fn fp(text: &str) -> Fingerprint {
    Fingerprint::parse(text).unwrap()
}

struct DownRemote;

impl RemoteDuplicateIndex for DownRemote {
    fn probe(&self) -> Result<(), RemoteError> {
        Err(RemoteError::Unreachable("connection refused".to_string()))
    }

    fn lookup(&self, _: &Fingerprint) -> Result<RemoteVerdict, RemoteError> {
        Err(RemoteError::Unreachable("connection refused".to_string()))
    }
}

#[test]
fn identical_fingerprint_is_an_exact_duplicate() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[STORED]));

    let verdict = resolver.check(Some(&fp(STORED)), 0).unwrap();

    assert!(verdict.is_duplicate);
    assert!(verdict.exact_match);
    assert_eq!(
        verdict.matched_record.unwrap().source_url,
        "https://site/post/0"
    );
}

#[test]
fn near_fingerprint_within_threshold_matches() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[STORED]));

    let verdict = resolver.check(Some(&fp(NEAR)), 8).unwrap();

    assert!(verdict.is_duplicate);
    assert!(!verdict.exact_match);
    assert_eq!(verdict.distance, Some(5));
}

#[test]
fn far_fingerprint_beyond_threshold_is_unique() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[STORED]));

    let verdict = resolver.check(Some(&fp(FAR)), 8).unwrap();

    assert!(!verdict.is_duplicate);
    assert!(verdict.matched_record.is_none());
}

#[test]
fn threshold_is_inclusive() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[STORED]));

    assert!(resolver.check(Some(&fp(NEAR)), 5).unwrap().is_duplicate);
    assert!(!resolver.check(Some(&fp(NEAR)), 4).unwrap().is_duplicate);
}

#[test]
fn missing_fingerprint_is_never_a_duplicate() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[STORED]));

    let verdict = resolver.check(None, 64).unwrap();

    assert!(!verdict.is_duplicate);
}

#[test]
fn first_match_in_storage_order_wins() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(&temp, &[FAR, NEAR, STORED]));

    let verdict = resolver.check(Some(&fp(STORED)), 8).unwrap();

    // NEAR is stored before the exact copy and is already within reach
    assert_eq!(
        verdict.matched_record.unwrap().source_url,
        "https://site/post/1"
    );
    assert_eq!(verdict.distance, Some(5));
}

#[test]
fn remote_failure_falls_back_to_the_same_local_answer() {
    let temp = TempDir::new().unwrap();
    let store = store_with(&temp, &[FAR, STORED]);
    let (sender, receiver) = EventChannel::new();

    let local_only = DuplicateResolver::new(Arc::clone(&store));
    let with_remote = DuplicateResolver::new(store)
        .with_remote(Arc::new(DownRemote))
        .with_probe_timeout(Duration::from_millis(200))
        .with_events(sender);

    let query = fp(NEAR);
    let expected = local_only.check(Some(&query), 8).unwrap();
    let actual = with_remote.check(Some(&query), 8).unwrap();

    assert_eq!(actual, expected);
    assert!(actual.is_duplicate);
    assert!(receiver.try_iter().any(|event| matches!(
        event,
        Event::Duplicate(DuplicateEvent::RemoteFallback { .. })
    )));
}

#[test]
fn records_with_other_schemes_are_skipped() {
    let temp = TempDir::new().unwrap();
    let resolver = DuplicateResolver::new(store_with(
        &temp,
        &["dct8:0000000000000000", "not a fingerprint", STORED],
    ));

    let verdict = resolver.check(Some(&fp(NEAR)), 8).unwrap();

    assert_eq!(
        verdict.matched_record.unwrap().source_url,
        "https://site/post/2"
    );
}

#[test]
fn unreadable_record_does_not_hide_later_matches() {
    let temp = TempDir::new().unwrap();
    let store = store_with(&temp, &[FAR, STORED]);
    let conn = rusqlite::Connection::open(temp.path().join("records.db")).unwrap();
    conn.execute(
        "UPDATE records SET source_url = x'00ff' WHERE source_url = 'https://site/post/0'",
        [],
    )
    .unwrap();
    drop(conn);
    let resolver = DuplicateResolver::new(store);

    let verdict = resolver.check(Some(&fp(STORED)), 0).unwrap();

    assert!(verdict.exact_match);
    assert_eq!(
        verdict.matched_record.unwrap().source_url,
        "https://site/post/1"
    );
}
