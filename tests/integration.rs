use tempfile::tempdir;
use whisper::error::WhisperError;
use whisper::whisper::{create, fetch, info, update, update_many, AggregationType, ArchiveSpec};

#[test]
fn create_info_update_fetch_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metric.wsp");

    create(
        &path,
        vec![ArchiveSpec::new(1, 60), ArchiveSpec::new(60, 60), ArchiveSpec::new(3600, 24)],
        0.5,
        AggregationType::Average,
        false,
    )
    .unwrap();

    let header = info(&path).unwrap();
    assert_eq!(header.archive_count(), 3);
    assert_eq!(header.max_retention, 3600 * 24);

    let now = 2_000_000u64;
    for i in 0..10u64 {
        update(&path, i as f64, Some(now - i), Some(now)).unwrap();
    }

    let result = fetch(&path, now - 60, Some(now), Some(now)).unwrap().unwrap();
    assert!(!result.values.is_empty());
    assert!(result.values.iter().all(|p| p.timestamp <= now));
}

#[test]
fn fetch_future_window_returns_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metric.wsp");
    create(&path, vec![ArchiveSpec::new(1, 60)], 0.5, AggregationType::Average, false).unwrap();

    let now = 1_000u64;
    let result = fetch(&path, now + 10, Some(now + 20), Some(now)).unwrap();
    assert!(result.is_none());
}

#[test]
fn fetch_invalid_interval_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metric.wsp");
    create(&path, vec![ArchiveSpec::new(1, 60)], 0.5, AggregationType::Average, false).unwrap();

    let err = fetch(&path, 100, Some(50), Some(1000)).unwrap_err();
    assert!(matches!(err, WhisperError::InvalidTimeInterval { .. }));
}

#[test]
fn corrupt_file_is_reported_with_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("truncated.wsp");
    std::fs::write(&path, [0u8; 10]).unwrap();

    let err = info(&path).unwrap_err();
    match err {
        WhisperError::CorruptWhisperFile { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected CorruptWhisperFile, got {:?}", other),
    }
}

#[test]
fn update_many_writes_every_covered_point() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metric.wsp");
    create(&path, vec![ArchiveSpec::new(1, 120), ArchiveSpec::new(60, 60)], 0.5, AggregationType::Average, false).unwrap();

    let now = 5_000_000u64;
    let points: Vec<(u64, f64)> = (0..50).map(|i| (now - i, i as f64)).collect();
    update_many(&path, &points, Some(now)).unwrap();

    let result = fetch(&path, now - 120, Some(now), Some(now)).unwrap().unwrap();
    assert_eq!(result.values.len(), 50);
}

#[test]
fn update_many_skips_points_outside_retention_without_aborting() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metric.wsp");
    create(&path, vec![ArchiveSpec::new(1, 20)], 0.5, AggregationType::Average, false).unwrap();

    let now = 1_000_000u64;
    let points = vec![(now - 5, 1.0), (now - 1000, 2.0), (now - 3, 3.0)];
    update_many(&path, &points, Some(now)).unwrap();

    let result = fetch(&path, now - 20, Some(now), Some(now)).unwrap().unwrap();
    assert_eq!(result.values.len(), 2);
}
