//! Pending-job queue with dedup and in-flight tracking.
//!
//! A queued path is never also processing. A path enqueued again while it
//! is processing is deferred instead, and replayed into the queue once its
//! batch finishes.

use std::collections::{HashMap, HashSet, VecDeque};

use notenav_core::{ContentJob, VaultFile};

/// Result of [`JobQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at the tail.
    Queued,
    /// Already queued; the pending snapshot was replaced.
    Refreshed,
    /// Currently processing; replayed after the batch.
    Deferred,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    order: VecDeque<String>,
    queued: HashMap<String, VaultFile>,
    processing: HashSet<String>,
    dirty: HashMap<String, VaultFile>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, file: VaultFile) -> Enqueued {
        if self.processing.contains(&file.path) {
            self.dirty.insert(file.path.clone(), file);
            return Enqueued::Deferred;
        }
        if let Some(pending) = self.queued.get_mut(&file.path) {
            *pending = file;
            return Enqueued::Refreshed;
        }
        self.order.push_back(file.path.clone());
        self.queued.insert(file.path.clone(), file);
        Enqueued::Queued
    }

    /// Remove up to `max` jobs from the head.
    pub fn take(&mut self, max: usize) -> Vec<ContentJob> {
        let mut jobs = Vec::with_capacity(max.min(self.order.len()));
        while jobs.len() < max {
            let Some(path) = self.order.pop_front() else {
                break;
            };
            if let Some(file) = self.queued.remove(&path) {
                jobs.push(ContentJob::new(file));
            }
        }
        jobs
    }

    pub fn mark_processing<'a>(&mut self, paths: impl IntoIterator<Item = &'a str>) {
        for path in paths {
            self.processing.insert(path.to_string());
        }
    }

    /// Clear processing marks and hand back files deferred meanwhile.
    pub fn finish_processing<'a>(
        &mut self,
        paths: impl IntoIterator<Item = &'a str>,
    ) -> Vec<VaultFile> {
        let mut replay = Vec::new();
        for path in paths {
            self.processing.remove(path);
            if let Some(file) = self.dirty.remove(path) {
                replay.push(file);
            }
        }
        replay
    }

    /// Clear every processing mark and hand back all deferred files.
    pub fn finish_all(&mut self) -> Vec<VaultFile> {
        self.processing.clear();
        self.dirty.drain().map(|(_, file)| file).collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
        self.processing.clear();
        self.dirty.clear();
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn is_queued(&self, path: &str) -> bool {
        self.queued.contains_key(path)
    }

    pub fn is_processing(&self, path: &str) -> bool {
        self.processing.contains(path)
    }

    pub fn is_deferred(&self, path: &str) -> bool {
        self.dirty.contains_key(path)
    }

    pub fn processing_len(&self) -> usize {
        self.processing.len()
    }
}
