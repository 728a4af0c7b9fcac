//! Canvas document and the in-memory drawing surface.

use crate::shapes::{SerializableColor, Shape, ShapeId, ShapeKind};
use crate::surface::{
    DrawingSurface, LoadCallback, LoadError, SceneEvent, SharedListener, SubscriptionId,
};
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// Errors produced when parsing or validating a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Malformed document JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported document version {0}")]
    UnsupportedVersion(u32),
    #[error("Duplicate object id {0}")]
    DuplicateId(ShapeId),
    #[error("Object {0} has non-finite coordinates")]
    NonFinite(ShapeId),
}

/// A canvas document: the full serializable scene.
///
/// Objects are stored back to front, so serializing the same document twice
/// produces identical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Background color (None = host default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<SerializableColor>,
    /// All objects in z-order (back to front).
    #[serde(default)]
    pub objects: Vec<Shape>,
}

impl Default for CanvasDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasDocument {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            background: None,
            objects: Vec::new(),
        }
    }

    /// Get a shape by ID.
    pub fn get_shape(&self, id: ShapeId) -> Option<&Shape> {
        self.objects.iter().find(|s| s.id() == id)
    }

    /// Position of a shape in z-order.
    pub fn index_of(&self, id: ShapeId) -> Option<usize> {
        self.objects.iter().position(|s| s.id() == id)
    }

    /// Shapes whose label equals `label`, back to front.
    pub fn find_by_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Shape> + 'a {
        self.objects.iter().filter(move |s| s.label() == Some(label))
    }

    /// Shapes of one kind, back to front.
    pub fn shapes_of_kind(&self, kind: ShapeKind) -> impl Iterator<Item = &Shape> {
        self.objects.iter().filter(move |s| s.kind() == kind)
    }

    /// Get the bounding box of all shapes.
    pub fn bounds(&self) -> Option<Rect> {
        self.objects
            .iter()
            .map(Shape::bounds)
            .reduce(|acc, b| acc.union(b))
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Get the number of shapes.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check structural validity: supported version, unique ids, finite geometry.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.version == 0 || self.version > DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion(self.version));
        }
        let mut seen = HashSet::with_capacity(self.objects.len());
        for shape in &self.objects {
            let id = shape.id();
            if !seen.insert(id) {
                return Err(DocumentError::DuplicateId(id));
            }
            if !shape.is_finite() {
                return Err(DocumentError::NonFinite(id));
            }
        }
        Ok(())
    }

    /// Serialize to canonical compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to indented JSON for humans.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse and validate a document.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let document: Self = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }
}

/// A frozen copy of a document, held as its canonical JSON text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SceneSnapshot(Rc<str>);

impl SceneSnapshot {
    /// Capture the current state of `document`.
    pub fn capture(document: &CanvasDocument) -> Result<Self, serde_json::Error> {
        Ok(Self(document.to_json()?.into()))
    }

    /// Wrap already-serialized document text without validating it.
    pub fn from_json_unchecked(json: impl Into<Rc<str>>) -> Self {
        Self(json.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the snapshot back into a validated document.
    pub fn to_document(&self) -> Result<CanvasDocument, DocumentError> {
        CanvasDocument::from_json(&self.0)
    }
}

impl fmt::Debug for SceneSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneSnapshot({} bytes)", self.0.len())
    }
}

/// Errors from direct canvas edits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanvasError {
    #[error("No object with id {0}")]
    NotFound(ShapeId),
    #[error("Edit would leave object {0} with non-finite coordinates")]
    NonFinite(ShapeId),
}

/// The in-memory drawing surface.
///
/// Every edit publishes the matching [`SceneEvent`] to subscribers, including
/// the edits performed while loading a document.
#[derive(Default)]
pub struct Canvas {
    document: CanvasDocument,
    listeners: Vec<(SubscriptionId, SharedListener)>,
    next_subscription: u64,
    frames_rendered: u64,
}

impl Canvas {
    /// Create an empty canvas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a canvas showing an existing document. No events are fired.
    pub fn with_document(document: CanvasDocument) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// The live document.
    pub fn document(&self) -> &CanvasDocument {
        &self.document
    }

    pub fn get_shape(&self, id: ShapeId) -> Option<&Shape> {
        self.document.get_shape(id)
    }

    pub fn len(&self) -> usize {
        self.document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Number of times the scene has been redrawn.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Number of active subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn emit(&self, event: SceneEvent) {
        log::trace!("{event}");
        for (_, listener) in &self.listeners {
            listener.borrow_mut().on_mutation(&event, &self.document);
        }
    }

    /// Add a shape on top of the scene. A colliding id is regenerated.
    pub fn add_shape(&mut self, mut shape: Shape) -> ShapeId {
        if self.document.get_shape(shape.id()).is_some() {
            shape.regenerate_id();
        }
        let id = shape.id();
        self.document.objects.push(shape);
        self.emit(SceneEvent::ObjectAdded(id));
        id
    }

    /// Remove a shape from the scene.
    pub fn remove_shape(&mut self, id: ShapeId) -> Option<Shape> {
        let index = self.document.index_of(id)?;
        let shape = self.document.objects.remove(index);
        self.emit(SceneEvent::ObjectRemoved(id));
        Some(shape)
    }

    /// Modify a shape in place. Edits that produce non-finite geometry are
    /// rolled back.
    pub fn update_shape<F>(&mut self, id: ShapeId, edit: F) -> Result<(), CanvasError>
    where
        F: FnOnce(&mut Shape),
    {
        let index = self.document.index_of(id).ok_or(CanvasError::NotFound(id))?;
        let before = self.document.objects[index].clone();
        let shape = &mut self.document.objects[index];
        edit(shape);
        if !shape.is_finite() {
            *shape = before;
            return Err(CanvasError::NonFinite(id));
        }
        // Ids are immutable through edits.
        if shape.id() != id {
            *shape = before;
            return Err(CanvasError::NotFound(id));
        }
        self.emit(SceneEvent::ObjectModified(id));
        Ok(())
    }

    /// Bring a shape to the front (topmost).
    pub fn bring_to_front(&mut self, id: ShapeId) -> Result<(), CanvasError> {
        let index = self.document.index_of(id).ok_or(CanvasError::NotFound(id))?;
        let shape = self.document.objects.remove(index);
        self.document.objects.push(shape);
        self.emit(SceneEvent::ObjectModified(id));
        Ok(())
    }

    /// Send a shape to the back (bottommost).
    pub fn send_to_back(&mut self, id: ShapeId) -> Result<(), CanvasError> {
        let index = self.document.index_of(id).ok_or(CanvasError::NotFound(id))?;
        let shape = self.document.objects.remove(index);
        self.document.objects.insert(0, shape);
        self.emit(SceneEvent::ObjectModified(id));
        Ok(())
    }

    /// Set the background. Background changes publish no object event.
    pub fn set_background(&mut self, color: Option<SerializableColor>) {
        self.document.background = color;
    }

    /// Remove every shape, publishing one removal per shape.
    pub fn clear(&mut self) {
        while let Some(shape) = self.document.objects.pop() {
            self.emit(SceneEvent::ObjectRemoved(shape.id()));
        }
    }
}

impl DrawingSurface for Canvas {
    fn to_document(&self) -> CanvasDocument {
        self.document.clone()
    }

    fn load_document(&mut self, document: CanvasDocument, on_complete: LoadCallback) {
        if let Err(e) = document.validate() {
            log::warn!("Refusing to load document: {}", e);
            on_complete(Err(LoadError::Invalid(e.to_string())));
            return;
        }

        self.clear();
        self.document.version = document.version;
        self.document.background = document.background;
        for shape in document.objects {
            let id = shape.id();
            self.document.objects.push(shape);
            self.emit(SceneEvent::ObjectAdded(id));
        }
        self.render();
        on_complete(Ok(()));
    }

    fn subscribe(&mut self, listener: SharedListener) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn render(&mut self) {
        self.frames_rendered += 1;
        log::trace!("Rendered frame {} ({} objects)", self.frames_rendered, self.document.len());
    }
}
