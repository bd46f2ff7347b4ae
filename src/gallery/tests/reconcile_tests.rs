use crate::gallery::test_fixtures::{jpeg_with_exif, test_gallery, write_jpeg};
use crate::gallery::{BACKFILL_UPLOADER, PhotoRecord, ReconcileReport};
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;

/// Name, size and mtime of every file under `root`.
fn snapshot(root: &Path) -> BTreeMap<String, (u64, SystemTime)> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let meta = e.metadata().unwrap();
            (
                e.path().strip_prefix(root).unwrap().display().to_string(),
                (meta.len(), meta.modified().unwrap()),
            )
        })
        .collect()
}

#[test]
fn test_backfills_missing_metadata_and_thumbnails() {
    let (gallery, _temp_dir) = test_gallery();
    let uploads = &gallery.config.upload_directory;
    write_jpeg(&uploads.join("old.jpg"), 40, 20);
    std::fs::write(
        uploads.join("camera.jpg"),
        jpeg_with_exif(10, 10, "2020:02:02 02:02:02", "2019:05:06 07:08:09"),
    )
    .unwrap();

    let report = gallery.reconcile().unwrap();
    assert_eq!(report.metadata_created, 2);
    assert_eq!(report.thumbnails_created, 2);
    assert_eq!(report.failures, 0);

    let old = gallery.store.load("old.jpg").unwrap();
    assert_eq!(old.uploader_name, BACKFILL_UPLOADER);
    assert_eq!(old.event_name, "");
    assert_eq!(old.photo_time, None);
    let mtime = std::fs::metadata(uploads.join("old.jpg"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(old.upload_time, chrono::DateTime::<Utc>::from(mtime));

    let camera = gallery.store.load("camera.jpg").unwrap();
    assert_eq!(
        camera.photo_time,
        Some(Utc.with_ymd_and_hms(2019, 5, 6, 7, 8, 9).unwrap())
    );
    assert!(gallery.thumbnails.exists("camera.jpg"));
}

#[test]
fn test_existing_metadata_is_kept() {
    let (gallery, _temp_dir) = test_gallery();
    write_jpeg(&gallery.config.upload_directory.join("kept.jpg"), 8, 8);
    let record = PhotoRecord::new("kept.jpg", "Alice", "Wedding", Utc::now(), None);
    gallery.store.save("kept.jpg", &record).unwrap();

    let report = gallery.reconcile().unwrap();
    assert_eq!(report.metadata_created, 0);
    assert_eq!(gallery.store.load("kept.jpg"), Some(record));
}

#[test]
fn test_second_pass_is_a_noop() {
    let (gallery, temp_dir) = test_gallery();
    let uploads = &gallery.config.upload_directory;
    write_jpeg(&uploads.join("a.jpg"), 30, 10);
    write_jpeg(&uploads.join("IMG_20230814_153012.jpg"), 10, 30);
    std::fs::write(uploads.join("broken.png"), b"nope").unwrap();
    std::fs::write(gallery.store.sidecar_path("gone.jpg"), b"{}").unwrap();

    let first = gallery.reconcile().unwrap();
    assert!(!first.is_noop());
    assert_eq!(first.failures, 1);
    let after_first = snapshot(temp_dir.path());

    let second = gallery.reconcile().unwrap();
    assert!(second.is_noop(), "{:?}", second);
    assert_eq!(snapshot(temp_dir.path()), after_first);
}

#[test]
fn test_orphans_removed_and_nothing_else() {
    let (gallery, _temp_dir) = test_gallery();
    let uploads = &gallery.config.upload_directory;
    write_jpeg(&uploads.join("stays.jpg"), 8, 8);
    write_jpeg(&uploads.join("deleted.jpg"), 8, 8);
    gallery.reconcile().unwrap();

    std::fs::remove_file(uploads.join("deleted.jpg")).unwrap();
    std::fs::write(gallery.thumbnails.directory().join("README"), b"leave me").unwrap();

    let report = gallery.reconcile().unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            metadata_removed: 1,
            thumbnails_removed: 1,
            ..Default::default()
        }
    );

    assert!(gallery.store.exists("stays.jpg"));
    assert!(gallery.thumbnails.exists("stays.jpg"));
    assert!(!gallery.store.exists("deleted.jpg"));
    assert!(!gallery.thumbnails.exists("deleted.jpg"));
    assert!(gallery.thumbnails.directory().join("README").is_file());
}

#[test]
fn test_creates_missing_directories() {
    let (gallery, _temp_dir) = test_gallery();
    std::fs::remove_dir_all(&gallery.config.metadata_directory).unwrap();
    std::fs::remove_dir_all(&gallery.config.upload_directory).unwrap();

    let report = gallery.reconcile().unwrap();
    assert!(report.is_noop());
    assert!(gallery.config.upload_directory.is_dir());
    assert!(gallery.thumbnails.directory().is_dir());
}

#[test]
fn test_filename_date_used_when_no_exif() {
    let (gallery, _temp_dir) = test_gallery();
    write_jpeg(
        &gallery.config.upload_directory.join("PXL_20230814_153012345.jpg"),
        8,
        8,
    );

    gallery.reconcile().unwrap();
    let record = gallery.store.load("PXL_20230814_153012345.jpg").unwrap();
    assert_eq!(
        record.photo_time,
        Some(Utc.with_ymd_and_hms(2023, 8, 14, 15, 30, 12).unwrap())
    );
}
