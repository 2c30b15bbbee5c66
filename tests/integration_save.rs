//! End-to-end tests: media files on disk, saved through the pipeline into
//! a SQLite database, then exported and imported.

use image::{DynamicImage, ImageBuffer, Rgb};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagsaver_core::config::Settings;
use tagsaver_core::core::hasher::MediaRef;
use tagsaver_core::core::pipeline::{SaveOutcome, SavePipeline, SaveRequest};
use tagsaver_core::core::store::{export_json, import_json, RecordStore, SqliteStore};
use tempfile::TempDir;

/// Gray gradient, mirrored left to right when `mirrored`
fn write_gradient(dir: &Path, name: &str, mirrored: bool) -> PathBuf {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(128, 128, |x, y| {
        let x = if mirrored { 127 - x } else { x };
        let v = (x * 200 / 128 + y * 40 / 128) as u8;
        Rgb([v, v, v])
    }));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn pipeline(temp: &TempDir) -> SavePipeline {
    let settings = Settings {
        database: temp.path().join("records.db"),
        ..Settings::default()
    };
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&settings.database).unwrap());
    SavePipeline::builder(store).settings(&settings).build()
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[test]
fn resaved_file_is_refused_even_in_another_format() {
    let temp = TempDir::new().unwrap();
    let png = write_gradient(temp.path(), "cat.png", false);
    let bmp = write_gradient(temp.path(), "cat.bmp", false);
    let pipeline = pipeline(&temp);

    let first = pipeline
        .save(SaveRequest::new(
            "https://site/post/1",
            MediaRef::from_path(&png),
            tags(&["artist:ann", "cat"]),
        ))
        .unwrap();
    assert!(!first.is_duplicate());

    let second = pipeline
        .save(SaveRequest::new(
            "https://site/post/2",
            MediaRef::from_path(&bmp),
            tags(&["cat"]),
        ))
        .unwrap();

    match second {
        SaveOutcome::Duplicate(verdict) => {
            assert!(verdict.is_duplicate);
            assert_eq!(
                verdict.matched_record.unwrap().source_url,
                "https://site/post/1"
            );
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(pipeline.store().count().unwrap(), 1);
}

#[test]
fn different_images_are_both_saved() {
    let temp = TempDir::new().unwrap();
    let left = write_gradient(temp.path(), "left.png", false);
    let right = write_gradient(temp.path(), "right.png", true);
    let pipeline = pipeline(&temp);

    for (page, path) in [("https://site/1", &left), ("https://site/2", &right)] {
        let outcome = pipeline
            .save(SaveRequest::new(page, MediaRef::from_path(path), tags(&["x"])))
            .unwrap();
        assert!(!outcome.is_duplicate());
    }

    assert_eq!(pipeline.store().count().unwrap(), 2);
}

#[test]
fn missing_file_is_saved_without_fingerprint() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline(&temp);

    let outcome = pipeline
        .save(SaveRequest::new(
            "https://site/gone",
            MediaRef::from_path(temp.path().join("gone.png")),
            tags(&["lost"]),
        ))
        .unwrap();

    match outcome {
        SaveOutcome::Saved {
            record,
            fingerprint_skipped,
        } => {
            assert!(record.fingerprint.is_none());
            assert!(fingerprint_skipped.is_some());
        }
        other => panic!("expected save, got {other:?}"),
    }
}

#[test]
fn tag_suggestions_come_from_saved_records() {
    let temp = TempDir::new().unwrap();
    let left = write_gradient(temp.path(), "left.png", false);
    let pipeline = pipeline(&temp);
    pipeline
        .save(SaveRequest::new(
            "https://site/1",
            MediaRef::from_path(&left),
            tags(&["Artist:Ann", "catgirl", "dog"]),
        ))
        .unwrap();

    let found = pipeline.search_tags("CAT").unwrap();

    assert_eq!(found, vec!["catgirl".to_string()]);
}

#[test]
fn export_then_import_into_a_fresh_database() {
    let temp = TempDir::new().unwrap();
    let left = write_gradient(temp.path(), "left.png", false);
    let right = write_gradient(temp.path(), "right.png", true);
    let pipeline = pipeline(&temp);
    pipeline
        .save(
            SaveRequest::new("https://site/1", MediaRef::from_path(&left), tags(&["a"]))
                .in_pool("set", Some(0)),
        )
        .unwrap();
    pipeline
        .save(
            SaveRequest::new("https://site/2", MediaRef::from_path(&right), tags(&["b"]))
                .in_pool("set", None),
        )
        .unwrap();

    let backup = temp.path().join("backup.json");
    let exported = export_json(
        pipeline.store().as_ref(),
        std::fs::File::create(&backup).unwrap(),
    )
    .unwrap();
    assert_eq!(exported, 2);

    let fresh = SqliteStore::open(&temp.path().join("fresh.db")).unwrap();
    let imported = import_json(&fresh, std::fs::File::open(&backup).unwrap()).unwrap();
    assert_eq!(imported, 2);

    let original = pipeline.store().scan_all().unwrap();
    let restored = fresh.scan_all().unwrap();
    for (a, b) in original.iter().zip(&restored) {
        assert_eq!(a.source_url, b.source_url);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.pool_slot(), b.pool_slot());
        assert_eq!(a.tags, b.tags);
    }
}
