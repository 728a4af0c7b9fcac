//! Snapshot undo/redo history.
//!
//! The history keeps one full-scene [`SceneSnapshot`] per accepted mutation.
//! Entry 0 is the sentinel captured at startup and is never popped.
//!
//! Restoring a snapshot goes through [`DrawingSurface::load_document`], which
//! fires the same mutation events as a user edit. The [`ReplayLock`] is held
//! from the moment a replay starts until the surface reports completion, so
//! those events are ignored instead of being recorded as new entries. The
//! lock travels inside the completion callback as a [`ReplayGuard`]; if a
//! surface drops the callback without calling it, the guard still releases
//! the lock and the replay is abandoned.

use crate::canvas::{CanvasDocument, SceneSnapshot};
use crate::surface::{DrawingSurface, LoadError, MutationListener, SceneEvent, SharedListener};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Default number of entries kept, sentinel included.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Non-fatal history conditions and restore failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("Can't undo further")]
    UndoUnderflow,
    #[error("Nothing to redo")]
    RedoEmpty,
    #[error("A restore is already in progress")]
    ReplayInFlight,
    #[error("History has not been initialized")]
    Uninitialized,
    #[error("Failed to restore snapshot: {0}")]
    RestoreFailure(String),
}

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Outcome of a successfully started undo or redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    /// The surface finished loading before `undo`/`redo` returned.
    Completed,
    /// The surface will report completion later; the lock stays held until then.
    Pending,
}

/// Re-entrancy lock suppressing history recording during replays.
///
/// Cloning shares the lock. It is held while at least one [`ReplayGuard`]
/// from the current epoch is alive.
#[derive(Debug, Clone, Default)]
pub struct ReplayLock {
    holders: Rc<Cell<usize>>,
    epoch: Rc<Cell<u64>>,
}

impl ReplayLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.holders.get() > 0
    }

    /// Take the lock until the returned guard is dropped.
    pub fn acquire(&self) -> ReplayGuard {
        self.holders.set(self.holders.get() + 1);
        ReplayGuard {
            holders: Rc::clone(&self.holders),
            epoch: Rc::clone(&self.epoch),
            acquired_in: self.epoch.get(),
        }
    }

    /// Release the lock regardless of outstanding guards and start a new
    /// epoch. Guards acquired before the call no longer count.
    ///
    /// This only touches the lock; use [`HistoryManager::abandon_replay`] to
    /// also give up an undo or redo that will never complete.
    pub fn force_release(&self) {
        if self.is_held() {
            log::warn!("Force-releasing replay lock with {} holder(s)", self.holders.get());
        }
        self.holders.set(0);
        self.epoch.set(self.epoch.get().wrapping_add(1));
    }
}

/// RAII holder of a [`ReplayLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReplayGuard {
    holders: Rc<Cell<usize>>,
    epoch: Rc<Cell<u64>>,
    acquired_in: u64,
}

impl fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("holders", &self.holders.get())
            .field("stale", &self.is_stale())
            .finish()
    }
}

impl ReplayGuard {
    fn is_stale(&self) -> bool {
        self.epoch.get() != self.acquired_in
    }
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        if self.is_stale() {
            log::trace!("Dropping replay guard from a force-released epoch");
            return;
        }
        self.holders.set(self.holders.get().saturating_sub(1));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayKind {
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy)]
struct PendingReplay {
    /// Distinguishes this replay from later ones after an abandon.
    id: u64,
    kind: ReplayKind,
    /// Stack lengths when the replay started; commit is skipped if they moved.
    undo_len: usize,
    redo_len: usize,
}

/// History state shared between the manager handle and the surface.
#[derive(Debug)]
struct HistoryState {
    entries: Vec<SceneSnapshot>,
    redo: Vec<SceneSnapshot>,
    max_depth: Option<usize>,
    lock: ReplayLock,
    pending: Option<PendingReplay>,
    next_replay: u64,
}

impl HistoryState {
    fn is_current(&self, pending: &PendingReplay) -> bool {
        self.pending.is_some_and(|p| p.id == pending.id)
    }

    fn record(&mut self, document: &CanvasDocument) -> bool {
        if self.lock.is_held() {
            log::trace!("History locked, snapshot suppressed");
            return false;
        }
        if self.entries.is_empty() {
            log::debug!("History not initialized, snapshot ignored");
            return false;
        }
        let snapshot = match SceneSnapshot::capture(document) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Failed to capture snapshot: {}", e);
                return false;
            }
        };

        self.entries.push(snapshot);
        self.redo.clear();

        // Evict the oldest entry above the sentinel.
        if let Some(max) = self.max_depth {
            while self.entries.len() > max.max(2) {
                self.entries.remove(1);
            }
        }
        true
    }

    fn finish(&mut self, pending: PendingReplay, result: &Result<(), LoadError>) {
        if !self.is_current(&pending) {
            log::warn!("Ignoring completion of abandoned {:?}", pending.kind);
            return;
        }
        self.pending = None;

        if let Err(e) = result {
            log::error!("Failed to restore snapshot during {:?}: {}", pending.kind, e);
            return;
        }
        if self.entries.len() != pending.undo_len || self.redo.len() != pending.redo_len {
            log::warn!("History changed while a restore was in flight; leaving stacks as they are");
            return;
        }

        match pending.kind {
            ReplayKind::Undo => {
                if let Some(top) = self.entries.pop() {
                    self.redo.push(top);
                }
            }
            ReplayKind::Redo => {
                if let Some(next) = self.redo.pop() {
                    self.entries.push(next);
                }
            }
        }
    }
}

impl MutationListener for HistoryState {
    fn on_mutation(&mut self, event: &SceneEvent, document: &CanvasDocument) {
        if self.record(document) {
            log::debug!("Recorded snapshot {} after {}", self.entries.len() - 1, event);
        }
    }
}

/// Travels inside the load callback. Clears the pending replay even if the
/// callback is dropped uncalled.
struct ReplayTicket {
    state: Weak<RefCell<HistoryState>>,
    pending: PendingReplay,
    outcome: Rc<RefCell<Option<Result<(), LoadError>>>>,
    finished: bool,
    // Dropped last, after the stacks are committed.
    _guard: ReplayGuard,
}

impl ReplayTicket {
    fn complete(mut self, result: Result<(), LoadError>) {
        if let Some(state) = self.state.upgrade() {
            state.borrow_mut().finish(self.pending, &result);
        }
        *self.outcome.borrow_mut() = Some(result);
        self.finished = true;
    }
}

impl Drop for ReplayTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::warn!("Surface dropped the {:?} completion callback; abandoning restore", self.pending.kind);
        if let Some(state) = self.state.upgrade() {
            if let Ok(mut state) = state.try_borrow_mut() {
                if state.is_current(&self.pending) {
                    state.pending = None;
                }
            }
        }
    }
}

/// Snapshot history for one editing session.
///
/// Cloning yields another handle to the same history.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    state: Rc<RefCell<HistoryState>>,
    lock: ReplayLock,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_DEPTH))
    }
}

impl HistoryManager {
    /// Create an empty history. `max_depth` of `None` keeps every entry.
    pub fn new(max_depth: Option<usize>) -> Self {
        let lock = ReplayLock::new();
        let state = HistoryState {
            entries: Vec::new(),
            redo: Vec::new(),
            max_depth,
            lock: lock.clone(),
            pending: None,
            next_replay: 0,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            lock,
        }
    }

    /// Listener to subscribe on the surface.
    pub fn listener(&self) -> SharedListener {
        self.state.clone()
    }

    /// The re-entrancy lock.
    pub fn lock(&self) -> &ReplayLock {
        &self.lock
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    /// Replace all history with a single sentinel entry.
    pub fn initialize(&self, document: &CanvasDocument) -> HistoryResult<()> {
        let snapshot = SceneSnapshot::capture(document)
            .map_err(|e| HistoryError::RestoreFailure(e.to_string()))?;
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        state.redo.clear();
        state.pending = None;
        state.entries.push(snapshot);
        Ok(())
    }

    /// Append a snapshot of `document` unless the lock is held.
    /// Returns whether an entry was appended.
    pub fn record_snapshot(&self, document: &CanvasDocument) -> bool {
        self.state.borrow_mut().record(document)
    }

    /// Number of entries, sentinel included.
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    pub fn redo_len(&self) -> usize {
        self.state.borrow().redo.len()
    }

    pub fn can_undo(&self) -> bool {
        let state = self.state.borrow();
        state.pending.is_none() && state.entries.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        let state = self.state.borrow();
        state.pending.is_none() && !state.redo.is_empty()
    }

    /// Whether an undo or redo is waiting for the surface.
    pub fn is_replaying(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    /// The most recent entry.
    pub fn current(&self) -> Option<SceneSnapshot> {
        self.state.borrow().entries.last().cloned()
    }

    /// The sentinel entry.
    pub fn sentinel(&self) -> Option<SceneSnapshot> {
        self.state.borrow().entries.first().cloned()
    }

    /// All entries, oldest first.
    pub fn snapshots(&self) -> Vec<SceneSnapshot> {
        self.state.borrow().entries.clone()
    }

    /// Give up an undo or redo whose completion callback will never run.
    ///
    /// Clears the in-flight replay without touching the stacks and
    /// force-releases the lock. A late completion of the abandoned replay is
    /// ignored. Returns false if nothing was in flight.
    pub fn abandon_replay(&self) -> bool {
        let abandoned = self.state.borrow_mut().pending.take();
        self.lock.force_release();
        match abandoned {
            Some(pending) => {
                log::warn!("Abandoned {:?} that never completed", pending.kind);
                true
            }
            None => false,
        }
    }

    /// Step back one entry and restore it into `surface`.
    ///
    /// The top entry is only discarded once the surface reports a successful
    /// load; a failed load leaves the history untouched.
    pub fn undo(&self, surface: &mut dyn DrawingSurface) -> HistoryResult<ReplayStatus> {
        self.replay(ReplayKind::Undo, surface)
    }

    /// Re-apply the most recently undone entry.
    pub fn redo(&self, surface: &mut dyn DrawingSurface) -> HistoryResult<ReplayStatus> {
        self.replay(ReplayKind::Redo, surface)
    }

    fn replay(&self, kind: ReplayKind, surface: &mut dyn DrawingSurface) -> HistoryResult<ReplayStatus> {
        let (document, ticket, outcome) = {
            let mut state = self.state.borrow_mut();
            if state.pending.is_some() {
                log::info!("Restore already in progress, ignoring {:?}", kind);
                return Err(HistoryError::ReplayInFlight);
            }

            let target = match kind {
                ReplayKind::Undo => {
                    if state.entries.is_empty() {
                        return Err(HistoryError::Uninitialized);
                    }
                    if state.entries.len() <= 1 {
                        log::info!("Can't undo further");
                        return Err(HistoryError::UndoUnderflow);
                    }
                    state.entries[state.entries.len() - 2].clone()
                }
                ReplayKind::Redo => match state.redo.last() {
                    Some(next) => next.clone(),
                    None => {
                        log::info!("Nothing to redo");
                        return Err(HistoryError::RedoEmpty);
                    }
                },
            };

            let document = target.to_document().map_err(|e| {
                log::error!("Snapshot is not loadable, history left unchanged: {}", e);
                HistoryError::RestoreFailure(e.to_string())
            })?;

            state.next_replay += 1;
            let pending = PendingReplay {
                id: state.next_replay,
                kind,
                undo_len: state.entries.len(),
                redo_len: state.redo.len(),
            };
            state.pending = Some(pending);

            let outcome = Rc::new(RefCell::new(None));
            let ticket = ReplayTicket {
                state: Rc::downgrade(&self.state),
                pending,
                outcome: Rc::clone(&outcome),
                finished: false,
                _guard: self.lock.acquire(),
            };
            (document, ticket, outcome)
        };

        surface.load_document(document, Box::new(move |result| ticket.complete(result)));

        let result = outcome.borrow_mut().take();
        match result {
            None => Ok(ReplayStatus::Pending),
            Some(Ok(())) => Ok(ReplayStatus::Completed),
            Some(Err(e)) => Err(HistoryError::RestoreFailure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::shapes::{Ellipse, Rectangle};
    use crate::surface::{LoadCallback, SubscriptionId};
    use kurbo::Point;

    fn wired() -> (Canvas, HistoryManager) {
        let mut canvas = Canvas::new();
        let history = HistoryManager::new(None);
        canvas.subscribe(history.listener());
        history.initialize(canvas.document()).unwrap();
        (canvas, history)
    }

    #[test]
    fn test_initialize_records_sentinel() {
        let (_canvas, history) = wired();
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_edits_are_recorded() {
        let (mut canvas, history) = wired();
        canvas.add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        canvas.add_shape(Ellipse::circle(Point::ZERO, 5.0).into());
        assert_eq!(history.len(), 3);
        assert_eq!(history.current().unwrap().to_document().unwrap(), *canvas.document());
    }

    #[test]
    fn test_lock_suppresses_recording() {
        let (mut canvas, history) = wired();
        let guard = history.lock().acquire();
        for _ in 0..5 {
            canvas.add_shape(Rectangle::new(Point::ZERO, 1.0, 1.0).into());
        }
        assert!(!history.record_snapshot(canvas.document()));
        assert_eq!(history.len(), 1);
        drop(guard);
        assert!(!history.is_locked());
        assert!(history.record_snapshot(canvas.document()));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_nested_guards() {
        let lock = ReplayLock::new();
        let a = lock.acquire();
        let b = lock.acquire();
        drop(a);
        assert!(lock.is_held());
        drop(b);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_force_release() {
        let lock = ReplayLock::new();
        let guard = lock.acquire();
        lock.force_release();
        assert!(!lock.is_held());
        drop(guard);
        assert!(!lock.is_held());
        let _again = lock.acquire();
        assert!(lock.is_held());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_holder() {
        let lock = ReplayLock::new();
        let stale = lock.acquire();
        lock.force_release();
        let fresh = lock.acquire();
        drop(stale);
        assert!(lock.is_held());
        drop(fresh);
        assert!(!lock.is_held());
    }

    #[test]
    fn test_undo_restores_previous_and_does_not_grow() {
        let (mut canvas, history) = wired();
        let id = canvas.add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        let after_rect = canvas.to_document();
        canvas.add_shape(Ellipse::circle(Point::ZERO, 5.0).into());

        assert_eq!(history.undo(&mut canvas), Ok(ReplayStatus::Completed));
        assert_eq!(history.len(), 2);
        assert_eq!(canvas.to_document(), after_rect);
        assert!(canvas.get_shape(id).is_some());
        assert!(!history.is_locked());
    }

    #[test]
    fn test_undo_underflow() {
        let (mut canvas, history) = wired();
        assert_eq!(history.undo(&mut canvas), Err(HistoryError::UndoUnderflow));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_undo_before_initialize() {
        let mut canvas = Canvas::new();
        let history = HistoryManager::default();
        assert_eq!(history.undo(&mut canvas), Err(HistoryError::Uninitialized));
        assert!(!history.record_snapshot(canvas.document()));
    }

    #[test]
    fn test_redo_reapplies_and_new_edit_clears() {
        let (mut canvas, history) = wired();
        canvas.add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        let with_rect = canvas.to_document();

        history.undo(&mut canvas).unwrap();
        assert!(canvas.is_empty());
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut canvas), Ok(ReplayStatus::Completed));
        assert_eq!(canvas.to_document(), with_rect);
        assert_eq!(history.len(), 2);
        assert_eq!(history.redo(&mut canvas), Err(HistoryError::RedoEmpty));

        history.undo(&mut canvas).unwrap();
        canvas.add_shape(Ellipse::circle(Point::ZERO, 1.0).into());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_max_depth_keeps_sentinel() {
        let mut canvas = Canvas::new();
        let history = HistoryManager::new(Some(3));
        canvas.subscribe(history.listener());
        history.initialize(canvas.document()).unwrap();
        let sentinel = history.sentinel().unwrap();

        for i in 0..10 {
            canvas.add_shape(Rectangle::new(Point::new(f64::from(i), 0.0), 1.0, 1.0).into());
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.sentinel().unwrap(), sentinel);
        assert_eq!(history.current().unwrap().to_document().unwrap(), *canvas.document());
    }

    #[test]
    fn test_corrupt_snapshot_leaves_stack_untouched() {
        let (mut canvas, history) = wired();
        canvas.add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        // Stack becomes [blank, broken, rect]; undo would restore the broken entry.
        history
            .state
            .borrow_mut()
            .entries
            .insert(1, SceneSnapshot::from_json_unchecked("{broken"));
        let before = history.snapshots();

        assert!(matches!(history.undo(&mut canvas), Err(HistoryError::RestoreFailure(_))));
        assert_eq!(history.snapshots(), before);
        assert!(!history.is_locked());
        assert!(!history.is_replaying());
    }

    /// Surface that holds the load callback until told to finish.
    #[derive(Default)]
    struct DeferredSurface {
        inner: Canvas,
        queued: Option<(CanvasDocument, LoadCallback)>,
    }

    impl DeferredSurface {
        fn finish(&mut self, result: Result<(), LoadError>) {
            let (document, callback) = self.queued.take().unwrap();
            if result.is_ok() {
                self.inner.load_document(document, Box::new(|_| {}));
            }
            callback(result);
        }

        fn drop_callback(&mut self) {
            self.queued = None;
        }
    }

    impl DrawingSurface for DeferredSurface {
        fn to_document(&self) -> CanvasDocument {
            self.inner.to_document()
        }

        fn load_document(&mut self, document: CanvasDocument, on_complete: LoadCallback) {
            self.queued = Some((document, on_complete));
        }

        fn subscribe(&mut self, listener: SharedListener) -> SubscriptionId {
            self.inner.subscribe(listener)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
            self.inner.unsubscribe(id)
        }

        fn render(&mut self) {
            self.inner.render();
        }
    }

    fn wired_deferred() -> (DeferredSurface, HistoryManager) {
        let mut surface = DeferredSurface::default();
        let history = HistoryManager::new(None);
        surface.subscribe(history.listener());
        history.initialize(&surface.to_document()).unwrap();
        surface.inner.add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        surface.inner.add_shape(Ellipse::circle(Point::ZERO, 3.0).into());
        (surface, history)
    }

    #[test]
    fn test_lock_held_until_deferred_completion() {
        let (mut surface, history) = wired_deferred();
        assert_eq!(history.len(), 3);

        assert_eq!(history.undo(&mut surface), Ok(ReplayStatus::Pending));
        assert!(history.is_locked());
        assert_eq!(history.len(), 3);

        // A second undo while in flight is a no-op.
        assert_eq!(history.undo(&mut surface), Err(HistoryError::ReplayInFlight));

        surface.finish(Ok(()));
        assert!(!history.is_locked());
        assert_eq!(history.len(), 2);
        assert_eq!(surface.to_document().len(), 1);
    }

    #[test]
    fn test_deferred_failure_keeps_stack() {
        let (mut surface, history) = wired_deferred();
        let before = history.snapshots();
        history.undo(&mut surface).unwrap();
        surface.finish(Err(LoadError::Rejected("busy".into())));
        assert_eq!(history.snapshots(), before);
        assert!(!history.is_locked());
        assert!(history.can_undo());
    }

    #[test]
    fn test_dropped_callback_releases_lock() {
        let (mut surface, history) = wired_deferred();
        history.undo(&mut surface).unwrap();
        assert!(history.is_locked());
        surface.drop_callback();
        assert!(!history.is_locked());
        assert!(!history.is_replaying());
        assert_eq!(history.len(), 3);
        assert!(history.can_undo());
    }

    #[test]
    fn test_abandon_stalled_undo_recovers() {
        let (mut surface, history) = wired_deferred();
        assert_eq!(history.undo(&mut surface), Ok(ReplayStatus::Pending));
        let (_, stalled) = surface.queued.take().unwrap();

        assert!(history.abandon_replay());
        assert!(!history.is_locked());
        assert!(!history.is_replaying());
        assert!(history.can_undo());
        assert_eq!(history.len(), 3);

        assert_eq!(history.undo(&mut surface), Ok(ReplayStatus::Pending));
        assert!(history.is_locked());

        // The stalled loader finally reports back; it must not disturb the
        // replay now in flight.
        stalled(Ok(()));
        assert!(history.is_locked());
        assert!(history.is_replaying());
        assert_eq!(history.len(), 3);

        // Noise while the new replay runs is still suppressed.
        surface.inner.add_shape(Rectangle::new(Point::ZERO, 2.0, 2.0).into());
        assert_eq!(history.len(), 3);

        surface.finish(Ok(()));
        assert!(!history.is_locked());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_abandon_with_dropped_stale_callback() {
        let (mut surface, history) = wired_deferred();
        history.undo(&mut surface).unwrap();
        let (_, stalled) = surface.queued.take().unwrap();
        history.abandon_replay();
        history.undo(&mut surface).unwrap();

        drop(stalled);
        assert!(history.is_locked());
        assert!(history.is_replaying());

        surface.finish(Ok(()));
        assert_eq!(history.len(), 2);
        assert!(!history.abandon_replay());
    }
}
