//! Concurrency-limited download scheduler.
//!
//! The center owns every live [`DownloadTask`], keyed by bundle GUID so
//! concurrent requesters share one transfer. Each tick it advances all
//! tasks, drops finished ones and promotes pending tasks in creation order
//! while staying under the concurrency and per-tick limits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::config::DownloadSettings;
use super::task::{DownloadTask, DownloaderKind, TaskContext};
use super::url::is_local_file_url;
use crate::manifest::BundleDescriptor;

/// Handle to a task shared between the center and its requesters.
pub type SharedTask = Arc<Mutex<DownloadTask>>;

/// Scheduler of bundle downloads.
#[derive(Debug)]
pub struct DownloadCenter {
    tasks: HashMap<String, SharedTask>,
    settings: DownloadSettings,
    next_sequence: u64,
    paused: bool,
}

impl DownloadCenter {
    pub fn new(settings: DownloadSettings) -> Self {
        Self {
            tasks: HashMap::new(),
            settings,
            next_sequence: 0,
            paused: false,
        }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Request a download, joining an existing transfer for the same GUID.
    ///
    /// The returned task holds one reference for the caller, to be given
    /// back through [`DownloadCenter::release`].
    pub fn download_file(
        &mut self,
        bundle: &BundleDescriptor,
        url: &str,
        temp_path: PathBuf,
    ) -> SharedTask {
        if let Some(existing) = self.tasks.get(&bundle.guid) {
            let mut task = existing.lock();
            // A failed task lingers until the next tick; a new request retries.
            if task.is_succeeded() || !task.is_done() {
                task.reference();
                return Arc::clone(existing);
            }
        }

        let kind = if is_local_file_url(url) {
            DownloaderKind::LocalCopy
        } else if bundle.file_size >= self.settings.resume_min_size {
            DownloaderKind::Resumable
        } else {
            DownloaderKind::Normal
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        debug!(guid = %bundle.guid, ?kind, sequence, "Queued download");

        let task = Arc::new(Mutex::new(DownloadTask::new(
            bundle.clone(),
            url,
            kind,
            temp_path,
            sequence,
        )));
        self.tasks.insert(bundle.guid.clone(), Arc::clone(&task));
        task
    }

    /// Give back one reference.
    ///
    /// A task nobody waits for is aborted if it has not started yet; a
    /// running task is left to finish so its result is still cached.
    pub fn release(&mut self, task: &SharedTask) {
        let (guid, abandoned) = {
            let mut task = task.lock();
            task.release();
            (task.bundle().guid.clone(), task.ref_count() == 0 && task.is_pending())
        };
        if !abandoned {
            return;
        }

        task.lock().abort();
        if self
            .tasks
            .get(&guid)
            .is_some_and(|current| Arc::ptr_eq(current, task))
        {
            self.tasks.remove(&guid);
        }
        debug!(guid = %guid, "Dropped unreferenced pending download");
    }

    /// Advance every task and start pending ones.
    pub fn update(&mut self, ctx: &mut TaskContext<'_>) {
        ctx.backend.update();

        let mut finished = Vec::new();
        for (guid, task) in &self.tasks {
            let mut task = task.lock();
            if task.ref_count() == 0 && task.is_pending() {
                task.abort();
            }
            task.update(ctx);
            if task.is_done() {
                finished.push(guid.clone());
            }
        }
        for guid in finished {
            self.tasks.remove(&guid);
        }

        if self.paused {
            return;
        }

        let active = self.active_count();
        if active >= self.settings.max_concurrency {
            return;
        }
        let budget = (self.settings.max_concurrency - active)
            .min(self.settings.max_requests_per_tick);

        let mut pending: Vec<(u64, SharedTask)> = self
            .tasks
            .values()
            .filter_map(|task| {
                let guard = task.lock();
                guard.is_pending().then(|| (guard.sequence(), Arc::clone(task)))
            })
            .collect();
        pending.sort_by_key(|(sequence, _)| *sequence);

        for (_, task) in pending.into_iter().take(budget) {
            task.lock().start(ctx);
        }
    }

    /// Abort and forget every task.
    pub fn abort_all(&mut self) {
        for task in self.tasks.values() {
            task.lock().abort();
        }
        self.tasks.clear();
    }

    /// Stop promoting pending tasks. Running transfers continue.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn task(&self, guid: &str) -> Option<SharedTask> {
        self.tasks.get(guid).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| t.lock().is_active()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.values().filter(|t| t.lock().is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLayout, CacheStore};
    use crate::download::MemoryBackend;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: CacheStore,
        backend: MemoryBackend,
        center: DownloadCenter,
    }

    impl Fixture {
        fn new(settings: DownloadSettings) -> Self {
            let dir = TempDir::new().unwrap();
            let store = CacheStore::new(CacheLayout::new(dir.path(), "pkg"));
            store.ensure_dirs().unwrap();
            Self {
                _dir: dir,
                store,
                backend: MemoryBackend::new().with_chunk_size(100),
                center: DownloadCenter::new(settings),
            }
        }

        fn bundle(&self, guid: &str, len: usize) -> BundleDescriptor {
            let data = vec![guid.as_bytes()[0]; len];
            self.backend.insert(url(guid), data.clone());
            BundleDescriptor::new(
                guid,
                guid,
                format!("{}.bundle", guid),
                len as u64,
                crc32fast::hash(&data),
            )
        }

        fn request(&mut self, bundle: &BundleDescriptor) -> SharedTask {
            let temp = self.store.layout().temp_path(&bundle.guid);
            self.center.download_file(bundle, &url(&bundle.guid), temp)
        }

        fn tick(&mut self) {
            let settings = self.center.settings().clone();
            let mut ctx = TaskContext {
                store: &mut self.store,
                backend: &self.backend,
                local_copy: None,
                settings: &settings,
                package_name: "pkg",
            };
            self.center.update(&mut ctx);
        }
    }

    fn url(guid: &str) -> String {
        format!("mem://{}", guid)
    }

    #[test]
    fn test_same_guid_shares_one_task() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 1000);

        let tasks: Vec<_> = (0..5).map(|_| fx.request(&bundle)).collect();

        assert_eq!(fx.center.task_count(), 1);
        assert!(tasks.iter().all(|t| Arc::ptr_eq(t, &tasks[0])));
        assert_eq!(tasks[0].lock().ref_count(), 5);

        for _ in 0..20 {
            fx.tick();
        }
        assert!(tasks.iter().all(|t| t.lock().is_succeeded()));
        assert_eq!(fx.backend.request_count(&url("A")), 1);
        assert_eq!(fx.center.task_count(), 0);
    }

    #[test]
    fn test_concurrency_and_per_tick_limits() {
        let settings = DownloadSettings::default()
            .with_max_concurrency(3)
            .with_max_requests_per_tick(2);
        let mut fx = Fixture::new(settings);
        let bundles: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|g| fx.bundle(g, 1000))
            .collect();
        for b in &bundles {
            fx.request(b);
        }

        fx.tick();
        assert_eq!(fx.center.active_count(), 2);
        assert_eq!(fx.center.pending_count(), 3);

        fx.tick();
        assert_eq!(fx.center.active_count(), 3);
        assert_eq!(fx.center.pending_count(), 2);
    }

    #[test]
    fn test_pending_tasks_start_in_request_order() {
        let settings = DownloadSettings::default().with_max_concurrency(1);
        let mut fx = Fixture::new(settings);
        let first = fx.bundle("Z", 1000);
        let second = fx.bundle("A", 1000);
        let first_task = fx.request(&first);
        let second_task = fx.request(&second);

        fx.tick();

        assert!(first_task.lock().is_active());
        assert!(second_task.lock().is_pending());
    }

    #[test]
    fn test_release_all_requesters_drops_pending_task() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 1000);
        let a = fx.request(&bundle);
        let b = fx.request(&bundle);

        fx.center.release(&a);
        assert_eq!(fx.center.task_count(), 1);

        fx.center.release(&b);
        assert_eq!(fx.center.task_count(), 0);
        assert!(b.lock().error().is_some());

        fx.tick();
        assert_eq!(fx.backend.request_count(&url("A")), 0);
    }

    #[test]
    fn test_release_keeps_task_while_referenced() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 300);
        let a = fx.request(&bundle);
        let b = fx.request(&bundle);

        fx.center.release(&a);
        for _ in 0..10 {
            fx.tick();
        }

        assert!(b.lock().is_succeeded());
        assert!(fx.store.exists("A"));
    }

    #[test]
    fn test_released_running_task_still_caches() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 1000);
        let task = fx.request(&bundle);
        fx.tick();
        assert!(task.lock().is_active());

        fx.center.release(&task);
        assert_eq!(fx.center.task_count(), 1);
        for _ in 0..20 {
            fx.tick();
        }

        assert!(fx.store.exists("A"));
    }

    #[test]
    fn test_pause_stops_promotion() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 100);
        let task = fx.request(&bundle);

        fx.center.pause();
        fx.tick();
        assert!(task.lock().is_pending());

        fx.center.resume();
        fx.tick();
        assert!(!task.lock().is_pending());
    }

    #[test]
    fn test_failed_task_replaced_on_new_request() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let bundle = fx.bundle("A", 100);
        fx.backend.insert_failure(url("A"), 500);
        let failed = fx.request(&bundle);
        fx.tick();
        assert!(failed.lock().is_done());

        let retry = fx.request(&bundle);
        assert!(!Arc::ptr_eq(&failed, &retry));
        assert!(retry.lock().is_pending());
    }

    #[test]
    fn test_resumable_kind_chosen_by_size() {
        let settings = DownloadSettings::default().with_resume_min_size(500);
        let mut fx = Fixture::new(settings);
        let small = fx.bundle("S", 499);
        let large = fx.bundle("L", 500);

        assert_eq!(fx.request(&small).lock().kind(), DownloaderKind::Normal);
        assert_eq!(fx.request(&large).lock().kind(), DownloaderKind::Resumable);

        let temp = fx.store.layout().temp_path("F");
        let local = fx.center.download_file(&small, "file:///bundles/S.bundle", temp);
        // Same GUID as a live task, so the existing task is shared.
        assert_eq!(local.lock().kind(), DownloaderKind::Normal);
    }

    #[test]
    fn test_abort_all() {
        let mut fx = Fixture::new(DownloadSettings::default());
        let a = fx.bundle("A", 1000);
        let task = fx.request(&a);
        fx.tick();

        fx.center.abort_all();

        assert_eq!(fx.center.task_count(), 0);
        assert!(task.lock().is_done());
    }
}
