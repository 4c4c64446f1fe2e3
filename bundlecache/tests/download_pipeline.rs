//! Integration tests for the download pipeline.
//!
//! These tests drive a complete [`CacheFileSystem`] against the in-memory
//! backend and check:
//! - de-duplication of concurrent requests for one bundle
//! - range resume of partial downloads
//! - retry alternating between main and fallback servers
//! - reference counting of shared tasks
//! - local file import and the async driver
//!
//! Run with: `cargo test --test download_pipeline`

mod common;

use std::fs;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bundlecache::download::{MemoryBackend, RequestRecord};
use bundlecache::fs::{DownloadFileOperation, DownloadOptions};
use bundlecache::operation::{drive_to_completion, wait_for_completion};
use bundlecache::{BundleDescriptor, CacheFileSystem, Operation, OperationStatus};

use common::*;

/// Tick the file system and every operation until all are done.
fn drive_all(fs: &mut CacheFileSystem, ops: &mut [DownloadFileOperation]) {
    for _ in 0..10_000 {
        fs.update();
        for op in ops.iter_mut() {
            op.update(fs);
        }
        if ops.iter().all(|op| op.is_done()) {
            return;
        }
    }
    panic!("operations did not finish");
}

fn options(fs: &CacheFileSystem) -> DownloadOptions {
    DownloadOptions::from_settings(&fs.config().download)
}

// ============================================================================
// Basic transfer
// ============================================================================

#[test]
fn test_thousand_byte_bundle_downloads_and_loads() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(7, 1000);
    let bundle = BundleDescriptor::new("A", "A", "A.bundle", 1000, crc32fast::hash(&data));
    backend.insert(main_url(&bundle), data.clone());

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    assert!(!fs.exists(&bundle));
    assert!(fs.need_download(&bundle));

    download(&mut fs, &bundle);
    assert!(fs.exists(&bundle));
    assert!(!fs.need_download(&bundle));

    let mut load = fs.load_bundle(&bundle);
    run_ok(&mut fs, &mut load);
    let container = load.take_container().unwrap();
    assert_eq!(container.bytes.len(), 1000);
    assert_eq!(container.bytes, data);

    // Cached under bundles/<prefix>/<guid>/ with the temp file promoted.
    let layout = fs.layout();
    assert!(layout.bundle_data_path(&bundle).exists());
    assert!(layout.bundle_info_path(&bundle).exists());
    assert!(!layout.temp_path(&bundle.guid).exists());
}

#[test]
fn test_exists_is_idempotent() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(1, 2048);
    let bundle = descriptor("idem", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    download(&mut fs, &bundle);

    let first = fs.exists(&bundle);
    let second = fs.exists(&bundle);
    let third = fs.exists(&bundle);
    assert!(first && second && third);
    assert_eq!(fs.file_count(), 1);
}

#[test]
fn test_download_of_cached_bundle_sends_no_request() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(2, 512);
    let bundle = descriptor("cached", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    download(&mut fs, &bundle);
    download(&mut fs, &bundle);

    assert_eq!(backend.request_count(&main_url(&bundle)), 1);
}

// ============================================================================
// De-duplication
// ============================================================================

#[test]
fn test_concurrent_requests_share_one_transfer() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(4096);
    let data = payload(3, 100_000);
    let bundle = descriptor("shared", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut ops: Vec<_> = (0..5)
        .map(|_| fs.download_file_async(&bundle, options(&fs)))
        .collect();
    drive_all(&mut fs, &mut ops);

    assert_eq!(backend.request_count(&main_url(&bundle)), 1);
    for op in &ops {
        assert_eq!(op.status(), OperationStatus::Succeed);
        assert_eq!(op.downloaded_bytes(), 100_000);
    }
    assert!(fs.exists(&bundle));
    assert_eq!(fs.download_center().task_count(), 0);
}

#[test]
fn test_late_requester_reuses_bundle_cached_after_its_check() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(9, 3000);
    let bundle = descriptor("late", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut first = fs.download_file_async(&bundle, options(&fs));
    let mut second = fs.download_file_async(&bundle, options(&fs));

    // Both pass the cache check before any task exists.
    first.update(&mut fs);
    second.update(&mut fs);

    run_ok(&mut fs, &mut first);
    assert!(fs.exists(&bundle));
    assert_eq!(fs.download_center().task_count(), 0);

    run_ok(&mut fs, &mut second);
    assert_eq!(second.request_count(), 0);
    assert_eq!(backend.request_count(&main_url(&bundle)), 1);
}

#[test]
fn test_path_like_guid_never_touches_disk() {
    let root = tempfile::TempDir::new().unwrap();
    let outside = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(5, 128);
    let escaped = outside.path().join("escaped.bin");
    let mut bundle = descriptor("evil", &data);
    bundle.guid = format!("../../../{}", escaped.display());
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    let mut op = fs.download_file_async(&bundle, options(&fs));
    let error = run_err(&mut fs, &mut op);

    assert!(error.contains("invalid bundle guid"));
    assert_eq!(backend.request_count(&main_url(&bundle)), 0);
    assert!(!escaped.exists());
    assert_eq!(fs.file_count(), 0);
}

#[test]
fn test_remote_file_name_outside_cache_is_stored_inside() {
    let root = tempfile::TempDir::new().unwrap();
    let outside = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(6, 640);
    let escaped = outside.path().join("escaped.bin");
    let mut bundle = descriptor("named", &data);
    bundle.file_name = escaped.to_string_lossy().into_owned();
    backend.insert(main_url(&bundle), data.clone());

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    download(&mut fs, &bundle);

    assert!(!escaped.exists());
    let data_path = fs.layout().bundle_data_path(&bundle);
    assert!(data_path.starts_with(root.path()));
    assert_eq!(fs::read(data_path).unwrap(), data);
}

#[test]
fn test_concurrent_requests_share_failure() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(4, 256);
    let bundle = descriptor("missing", &data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let no_retry = options(&fs).with_failed_try_again(0);
    let mut ops: Vec<_> = (0..3)
        .map(|_| fs.download_file_async(&bundle, no_retry.clone()))
        .collect();
    drive_all(&mut fs, &mut ops);

    assert_eq!(backend.request_count(&main_url(&bundle)), 1);
    for op in &ops {
        assert_eq!(op.status(), OperationStatus::Failed);
        assert!(op.error().unwrap().contains("404"));
    }
    assert!(!fs.exists(&bundle));
}

#[test]
fn test_max_concurrency_limits_active_transfers() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(64);
    let mut config = config(&root);
    config.download = config.download.with_max_concurrency(2);
    let mut fs = CacheFileSystem::new(config, services(&backend));
    initialize(&mut fs);

    let bundles: Vec<_> = (0..6)
        .map(|i| {
            let data = payload(i, 1024);
            let bundle = descriptor(&format!("b{}", i), &data);
            backend.insert(main_url(&bundle), data);
            bundle
        })
        .collect();

    let mut ops: Vec<_> = bundles
        .iter()
        .map(|b| fs.download_file_async(b, options(&fs)))
        .collect();

    for _ in 0..10_000 {
        fs.update();
        assert!(fs.download_center().active_count() <= 2);
        for op in ops.iter_mut() {
            op.update(&mut fs);
        }
        if ops.iter().all(|op| op.is_done()) {
            break;
        }
    }

    assert!(bundles.iter().all(|b| fs.exists(b)));
    // Started in request order.
    let started: Vec<String> = backend.requests().into_iter().map(|r| r.url).collect();
    let expected: Vec<String> = bundles.iter().map(main_url).collect();
    assert_eq!(started, expected);
}

// ============================================================================
// Resume
// ============================================================================

#[test]
fn test_resume_requests_only_missing_range() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(1024);
    let data = payload(5, 8192);
    let bundle = descriptor("resume", &data);
    backend.insert(main_url(&bundle), data.clone());

    let mut config = config(&root);
    config.download = config.download.with_resume_min_size(4096);
    let mut fs = CacheFileSystem::new(config, services(&backend));
    initialize(&mut fs);

    let temp = fs.layout().temp_path(&bundle.guid);
    fs::create_dir_all(temp.parent().unwrap()).unwrap();
    fs::write(&temp, &data[..3000]).unwrap();

    download(&mut fs, &bundle);

    assert_eq!(
        backend.requests(),
        vec![RequestRecord {
            url: main_url(&bundle),
            resume_from: 3000,
        }]
    );
    assert_eq!(fs.read_bundle_file_data(&bundle).unwrap(), data);
    assert!(!temp.exists());
}

#[test]
fn test_resume_with_corrupt_prefix_restarts_from_zero() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(1024);
    let data = payload(6, 8192);
    let bundle = descriptor("bad-prefix", &data);
    backend.insert(main_url(&bundle), data.clone());
    backend.insert(fallback_url(&bundle), data.clone());

    let mut config = config(&root);
    config.download = config.download.with_resume_min_size(4096);
    let mut fs = CacheFileSystem::new(config, services(&backend));
    initialize(&mut fs);

    let temp = fs.layout().temp_path(&bundle.guid);
    fs::create_dir_all(temp.parent().unwrap()).unwrap();
    fs::write(&temp, vec![0xAAu8; 2000]).unwrap();

    download(&mut fs, &bundle);

    let offsets: Vec<u64> = backend.requests().iter().map(|r| r.resume_from).collect();
    assert_eq!(offsets, vec![2000, 0]);
    assert_eq!(fs.read_bundle_file_data(&bundle).unwrap(), data);
}

#[test]
fn test_small_bundle_ignores_partial_file() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(8, 1024);
    let bundle = descriptor("small", &data);
    backend.insert(main_url(&bundle), data.clone());

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let temp = fs.layout().temp_path(&bundle.guid);
    fs::create_dir_all(temp.parent().unwrap()).unwrap();
    fs::write(&temp, &data[..100]).unwrap();

    download(&mut fs, &bundle);
    assert_eq!(backend.requests()[0].resume_from, 0);
    assert_eq!(fs.read_bundle_file_data(&bundle).unwrap(), data);
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn test_retry_alternates_main_and_fallback() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(9, 700);
    let bundle = descriptor("flaky", &data);
    backend.insert_failure(main_url(&bundle), 503);
    backend.insert_failure(fallback_url(&bundle), 503);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut op = fs.download_file_async(&bundle, options(&fs).with_failed_try_again(3));
    let error = run_err(&mut fs, &mut op);
    assert!(error.contains("503"));
    assert_eq!(op.request_count(), 4);

    let urls: Vec<String> = backend.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            main_url(&bundle),
            fallback_url(&bundle),
            main_url(&bundle),
            fallback_url(&bundle),
        ]
    );
}

#[test]
fn test_retry_succeeds_on_fallback() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(10, 900);
    let bundle = descriptor("fallback", &data);
    backend.insert_failure(main_url(&bundle), 500);
    backend.insert(fallback_url(&bundle), data.clone());

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    download(&mut fs, &bundle);

    assert_eq!(backend.request_count(&main_url(&bundle)), 1);
    assert_eq!(backend.request_count(&fallback_url(&bundle)), 1);
    assert_eq!(fs.read_bundle_file_data(&bundle).unwrap(), data);
}

#[test]
fn test_wrong_content_fails_verification() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(11, 600);
    let bundle = descriptor("tampered", &data);
    let mut served = data.clone();
    served[10] ^= 0xFF;
    backend.insert(main_url(&bundle), served.clone());
    backend.insert(fallback_url(&bundle), served);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut op = fs.download_file_async(&bundle, options(&fs).with_failed_try_again(1));
    let error = run_err(&mut fs, &mut op);
    assert!(error.to_lowercase().contains("crc"), "unexpected error: {}", error);
    assert!(!fs.exists(&bundle));
    assert!(!fs.layout().temp_path(&bundle.guid).exists());
}

// ============================================================================
// Reference counting
// ============================================================================

#[test]
fn test_releasing_all_requesters_removes_pending_task() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(12, 300);
    let bundle = descriptor("abandoned", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);
    fs.download_center_mut().pause();

    let mut ops: Vec<_> = (0..2)
        .map(|_| fs.download_file_async(&bundle, options(&fs)))
        .collect();
    for _ in 0..3 {
        fs.update();
        for op in ops.iter_mut() {
            op.update(&mut fs);
        }
    }
    assert_eq!(fs.download_center().pending_count(), 1);
    let task = ops[0].task().cloned().unwrap();
    assert_eq!(task.lock().ref_count(), 2);

    ops[0].abort(&mut fs);
    assert_eq!(task.lock().ref_count(), 1);
    assert_eq!(fs.download_center().task_count(), 1);

    ops[1].abort(&mut fs);
    assert_eq!(fs.download_center().task_count(), 0);
    assert_eq!(ops[1].error(), Some("user abort"));

    fs.download_center_mut().resume();
    for _ in 0..5 {
        fs.update();
    }
    assert!(backend.requests().is_empty());
    assert!(!fs.exists(&bundle));
}

#[test]
fn test_releasing_some_requesters_keeps_task_running() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(128);
    let data = payload(13, 4096);
    let bundle = descriptor("kept", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut ops: Vec<_> = (0..2)
        .map(|_| fs.download_file_async(&bundle, options(&fs)))
        .collect();
    for _ in 0..3 {
        fs.update();
        for op in ops.iter_mut() {
            op.update(&mut fs);
        }
    }

    let (mut first, mut second) = {
        let mut iter = ops.into_iter();
        (iter.next().unwrap(), iter.next().unwrap())
    };
    first.abort(&mut fs);

    let status = wait_for_completion(&mut fs, &mut second);
    assert_eq!(status, OperationStatus::Succeed);
    assert!(fs.exists(&bundle));
}

#[test]
fn test_released_running_task_still_caches() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(256);
    let data = payload(14, 8192);
    let bundle = descriptor("orphan", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let mut op = fs.download_file_async(&bundle, options(&fs));
    while fs.download_center().active_count() == 0 {
        fs.update();
        op.update(&mut fs);
    }
    op.abort(&mut fs);
    assert_eq!(op.status(), OperationStatus::Failed);

    for _ in 0..1_000 {
        if fs.download_center().task_count() == 0 {
            break;
        }
        fs.update();
    }
    assert!(fs.exists(&bundle));
}

// ============================================================================
// Local import and drivers
// ============================================================================

#[test]
fn test_import_file_path_copies_local_file() {
    let root = tempfile::TempDir::new().unwrap();
    let source_dir = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(15, 5000);
    let bundle = descriptor("imported", &data);
    let source = source_dir.path().join("imported.bundle");
    fs::write(&source, &data).unwrap();

    let mut fs = CacheFileSystem::new(
        config(&root),
        services(&backend).with_local_copy(std::sync::Arc::new(
            bundlecache::download::FsLocalCopy,
        )),
    );
    initialize(&mut fs);

    let options = options(&fs).with_import_file_path(&source);
    let mut op = fs.download_file_async(&bundle, options);
    run_ok(&mut fs, &mut op);

    assert!(backend.requests().is_empty());
    assert_eq!(fs.read_bundle_file_data(&bundle).unwrap(), data);
    assert!(source.exists());
}

#[test]
fn test_watchdog_fails_stalled_transfer() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(16, 100);
    let bundle = descriptor("stalled", &data);
    backend.insert_stall(main_url(&bundle));

    let mut config = config(&root);
    config.download = config
        .download
        .with_watchdog_time(Some(Duration::from_millis(20)));
    let mut fs = CacheFileSystem::new(config, services(&backend));
    initialize(&mut fs);

    let mut op = fs.download_file_async(&bundle, options(&fs).with_failed_try_again(0));
    let error = run_err(&mut fs, &mut op);
    assert!(error.contains("watchdog"), "unexpected error: {}", error);
}

#[tokio::test]
async fn test_async_driver_completes_download() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_chunk_size(512);
    let data = payload(17, 4000);
    let bundle = descriptor("async", &data);
    backend.insert(main_url(&bundle), data);

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let cancel = CancellationToken::new();
    let mut op = fs.download_file_async(&bundle, options(&fs));
    let status =
        drive_to_completion(&mut fs, &mut op, Duration::from_millis(1), &cancel).await;
    assert_eq!(status, OperationStatus::Succeed);
    assert!(fs.exists(&bundle));
}

#[tokio::test]
async fn test_async_driver_cancel_aborts_operation() {
    let root = tempfile::TempDir::new().unwrap();
    let backend = MemoryBackend::new();
    let data = payload(18, 100);
    let bundle = descriptor("never", &data);
    backend.insert_stall(main_url(&bundle));

    let mut fs = file_system(&root, &backend);
    initialize(&mut fs);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let mut op = fs.download_file_async(&bundle, options(&fs));
    let status =
        drive_to_completion(&mut fs, &mut op, Duration::from_millis(1), &cancel).await;
    assert_eq!(status, OperationStatus::Failed);
    assert_eq!(op.error(), Some("user abort"));
    assert!(!fs.exists(&bundle));
}
