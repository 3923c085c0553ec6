//! Memoizing, request-deduplicating wrapper around a [`ReferenceLookup`].
//!
//! Each key gets one `tokio::sync::OnceCell`. Concurrent callers asking for
//! the same key while a fetch is in flight wait on that cell instead of
//! issuing their own request. Failed fetches are not cached, so the next
//! caller retries. Dropping the fetching future releases the cell for the
//! next caller.
//!
//! [`MemoizedLookup::invalidate`] starts a new generation: every cell is
//! replaced, so a fetch that was in flight when the cache was invalidated
//! completes into a detached cell and its result is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use courseplan_catalog::{CourseId, PrerequisiteRule, Programme, RequirementPath};
use rust_decimal::Decimal;
use tokio::sync::OnceCell;

use crate::error::LookupError;
use crate::traits::ReferenceLookup;

type Cells<T> = HashMap<String, Arc<OnceCell<T>>>;

#[derive(Default)]
struct Caches {
    generation: u64,
    units: Cells<Decimal>,
    rules: Cells<Option<PrerequisiteRule>>,
    preclusions: Cells<Vec<CourseId>>,
    paths: Cells<RequirementPath>,
    programmes: Cells<Programme>,
}

fn cell_for<T>(cells: &mut Cells<T>, key: &str) -> Arc<OnceCell<T>> {
    cells
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone()
}

/// Caches every answer of the wrapped lookup, keyed by course/path/programme id.
pub struct MemoizedLookup<L> {
    inner: L,
    caches: Mutex<Caches>,
}

impl<L: ReferenceLookup> MemoizedLookup<L> {
    pub fn new(inner: L) -> Self {
        MemoizedLookup {
            inner,
            caches: Mutex::new(Caches::default()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Drop every cached entry and start a new generation.
    pub fn invalidate(&self) {
        let mut caches = self.lock();
        let generation = caches.generation + 1;
        *caches = Caches {
            generation,
            ..Caches::default()
        };
        tracing::debug!(generation, "reference cache invalidated");
    }

    /// Current cache generation. Starts at 0, bumped by [`invalidate`](Self::invalidate).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Whether the unit value of `course` is already cached.
    pub fn has_units(&self, course: &str) -> bool {
        self.lock()
            .units
            .get(course)
            .is_some_and(|cell| cell.initialized())
    }

    fn lock(&self) -> MutexGuard<'_, Caches> {
        // Recover data even if mutex was poisoned by a panic in another thread
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<L: ReferenceLookup> ReferenceLookup for MemoizedLookup<L> {
    async fn get_units(&self, course: &str) -> Result<Decimal, LookupError> {
        let cell = cell_for(&mut self.lock().units, course);
        cell.get_or_try_init(|| self.inner.get_units(course))
            .await
            .copied()
    }

    async fn get_prerequisite_rule(
        &self,
        course: &str,
    ) -> Result<Option<PrerequisiteRule>, LookupError> {
        let cell = cell_for(&mut self.lock().rules, course);
        cell.get_or_try_init(|| self.inner.get_prerequisite_rule(course))
            .await
            .cloned()
    }

    async fn get_preclusions(&self, course: &str) -> Result<Vec<CourseId>, LookupError> {
        let cell = cell_for(&mut self.lock().preclusions, course);
        cell.get_or_try_init(|| self.inner.get_preclusions(course))
            .await
            .cloned()
    }

    async fn get_requirement_path(&self, path: &str) -> Result<RequirementPath, LookupError> {
        let cell = cell_for(&mut self.lock().paths, path);
        cell.get_or_try_init(|| self.inner.get_requirement_path(path))
            .await
            .cloned()
    }

    async fn get_programme(&self, programme: &str) -> Result<Programme, LookupError> {
        let cell = cell_for(&mut self.lock().programmes, programme);
        cell.get_or_try_init(|| self.inner.get_programme(programme))
            .await
            .cloned()
    }

    async fn preload(&self, courses: &[CourseId]) {
        for course in courses {
            if let Err(e) = self.get_units(course).await {
                tracing::debug!(course = %course, error = %e, "preload skipped units");
            }
            if let Err(e) = self.get_prerequisite_rule(course).await {
                tracing::debug!(course = %course, error = %e, "preload skipped prerequisites");
            }
            if let Err(e) = self.get_preclusions(course).await {
                tracing::debug!(course = %course, error = %e, "preload skipped preclusions");
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
