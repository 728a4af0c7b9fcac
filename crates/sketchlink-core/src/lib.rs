//! SketchLink Core Library
//!
//! Platform-agnostic scene model, snapshot undo history and share-token codec
//! for the SketchLink drawing editor.

pub mod canvas;
pub mod codec;
pub mod commands;
pub mod config;
pub mod editor;
pub mod history;
pub mod shapes;
pub mod share;
pub mod surface;
pub mod svg;

pub use canvas::{Canvas, CanvasDocument, CanvasError, DocumentError, SceneSnapshot};
pub use codec::{CodecOptions, DecodeError, DecodeStage, EncodeError, ShareCodec};
pub use commands::{Attribute, Command, CommandError, CommandReport, CommandScript, Target};
pub use config::{ConfigError, SketchConfig};
pub use editor::{Editor, EditorError, StartupSource};
pub use history::{HistoryError, HistoryManager, ReplayGuard, ReplayLock, ReplayStatus};
pub use shapes::{SerializableColor, Shape, ShapeId, ShapeKind, ShapeStyle};
pub use share::{ShareError, share_url, token_from_url};
pub use surface::{DrawingSurface, LoadCallback, LoadError, MutationListener, SceneEvent, SubscriptionId};
pub use svg::{SvgOptions, to_svg};
