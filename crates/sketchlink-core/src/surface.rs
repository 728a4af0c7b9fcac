//! The drawing-surface contract the history manager and editor depend on.
//!
//! A surface owns the live scene. It can serialize the scene to a
//! [`CanvasDocument`], replace it from one (completion is reported through a
//! callback that may fire later), publish mutation events, and redraw.

use crate::canvas::CanvasDocument;
use crate::shapes::ShapeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A mutation of the live scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    ObjectAdded(ShapeId),
    ObjectRemoved(ShapeId),
    ObjectModified(ShapeId),
}

impl SceneEvent {
    pub fn shape_id(&self) -> ShapeId {
        match self {
            SceneEvent::ObjectAdded(id)
            | SceneEvent::ObjectRemoved(id)
            | SceneEvent::ObjectModified(id) => *id,
        }
    }
}

impl fmt::Display for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneEvent::ObjectAdded(id) => write!(f, "object:added {id}"),
            SceneEvent::ObjectRemoved(id) => write!(f, "object:removed {id}"),
            SceneEvent::ObjectModified(id) => write!(f, "object:modified {id}"),
        }
    }
}

/// Receives mutation events together with the post-mutation document.
pub trait MutationListener {
    fn on_mutation(&mut self, event: &SceneEvent, document: &CanvasDocument);
}

/// Listener handle shared between the surface and its owner.
pub type SharedListener = Rc<RefCell<dyn MutationListener>>;

/// Handle returned by [`DrawingSurface::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Why a surface refused to load a document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("Invalid document: {0}")]
    Invalid(String),
    #[error("Load rejected: {0}")]
    Rejected(String),
}

/// Completion callback for [`DrawingSurface::load_document`].
pub type LoadCallback = Box<dyn FnOnce(Result<(), LoadError>)>;

/// Capabilities required from the drawing surface.
pub trait DrawingSurface {
    /// Serialize the live scene.
    fn to_document(&self) -> CanvasDocument;

    /// Replace the live scene.
    ///
    /// `on_complete` runs once the scene has finished updating. It may run
    /// before this method returns or at some later point. A surface that
    /// drops the callback without calling it abandons the load.
    fn load_document(&mut self, document: CanvasDocument, on_complete: LoadCallback);

    /// Register a listener for mutation events.
    fn subscribe(&mut self, listener: SharedListener) -> SubscriptionId;

    /// Remove a listener. Returns false if the id was unknown.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Redraw the scene.
    fn render(&mut self);
}
