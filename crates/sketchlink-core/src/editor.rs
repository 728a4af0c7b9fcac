//! Editor: wires a drawing surface to the history and the share codec.

use crate::canvas::{Canvas, CanvasDocument, DocumentError};
use crate::codec::{DecodeError, EncodeError, ShareCodec};
use crate::commands::{CommandError, CommandReport, CommandScript};
use crate::config::SketchConfig;
use crate::history::{HistoryError, HistoryManager, ReplayStatus};
use crate::share::{self, ShareError};
use crate::surface::{DrawingSurface, SubscriptionId};
use crate::svg::{self, SvgOptions};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type EditorResult<T> = Result<T, EditorError>;

/// Where the startup scene came from.
#[derive(Debug)]
pub enum StartupSource {
    /// Decoded from the share token.
    Shared,
    /// No token was present.
    Blank,
    /// A token was present but could not be decoded; started blank.
    Fallback(DecodeError),
}

/// A surface plus its undo history and share codec.
///
/// Dropping the editor unsubscribes the history from the surface.
pub struct Editor<S: DrawingSurface> {
    surface: S,
    history: HistoryManager,
    codec: ShareCodec,
    svg: SvgOptions,
    subscription: SubscriptionId,
}

impl<S: DrawingSurface> Editor<S> {
    pub fn new(mut surface: S, config: &SketchConfig) -> Self {
        let history = HistoryManager::new(config.history.max_depth);
        let subscription = surface.subscribe(history.listener());
        Self {
            surface,
            history,
            codec: ShareCodec::new(config.codec),
            svg: config.svg.clone(),
            subscription,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access for user edits; mutations are recorded as they happen.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn codec(&self) -> &ShareCodec {
        &self.codec
    }

    /// Load the startup scene and capture it as the history sentinel.
    ///
    /// `fragment` is the URL fragment, with or without its `#`. A fragment
    /// that fails to decode is logged and replaced by a blank scene.
    pub fn initialize(&mut self, fragment: Option<&str>) -> EditorResult<StartupSource> {
        let fragment = fragment
            .map(|f| f.trim().trim_start_matches('#'))
            .filter(|f| !f.is_empty());

        let (document, source) = match fragment {
            None => (CanvasDocument::new(), StartupSource::Blank),
            Some(token) => match self.codec.decode(token) {
                Ok(document) => {
                    log::info!("Loaded shared drawing ({} objects)", document.len());
                    (document, StartupSource::Shared)
                }
                Err(err) => {
                    log::error!("{} ({} stage): {}", err.user_message(), err.stage(), err);
                    (CanvasDocument::new(), StartupSource::Fallback(err))
                }
            },
        };

        self.initialize_document(document)?;
        Ok(source)
    }

    /// Load `document` without recording it and make it the history sentinel.
    pub fn initialize_document(&mut self, document: CanvasDocument) -> EditorResult<()> {
        document.validate()?;
        self.history.initialize(&document)?;
        let guard = self.history.lock().acquire();
        self.surface.load_document(
            document,
            Box::new(move |result| {
                drop(guard);
                if let Err(e) = result {
                    log::error!("Failed to load startup scene: {}", e);
                }
            }),
        );
        Ok(())
    }

    pub fn undo(&mut self) -> EditorResult<ReplayStatus> {
        Ok(self.history.undo(&mut self.surface)?)
    }

    pub fn redo(&mut self) -> EditorResult<ReplayStatus> {
        Ok(self.history.redo(&mut self.surface)?)
    }

    /// Share token for the current scene.
    pub fn share(&self) -> EditorResult<String> {
        Ok(self.codec.encode(&self.surface.to_document())?)
    }

    /// `base` with the current scene's token as its fragment.
    pub fn share_url(&self, base: &str) -> EditorResult<Url> {
        let token = self.share()?;
        Ok(share::share_url(base, &token)?)
    }

    pub fn export_svg(&self) -> String {
        svg::to_svg(&self.surface.to_document(), &self.svg)
    }
}

impl Editor<Canvas> {
    /// Apply a command batch as one undoable step.
    ///
    /// History recording is suppressed while the commands run and a single
    /// snapshot is taken afterwards. If any command fails the scene is
    /// restored to its state before the batch and nothing is recorded.
    pub fn apply_script(&mut self, script: &CommandScript) -> EditorResult<CommandReport> {
        if self.history.is_replaying() {
            return Err(HistoryError::ReplayInFlight.into());
        }

        let before = self.surface.to_document();
        let result = {
            let _guard = self.history.lock().acquire();
            script.apply(&mut self.surface)
        };

        match result {
            Ok(report) => {
                self.surface.render();
                self.history.record_snapshot(self.surface.document());
                if let Some(summary) = &script.summary {
                    log::info!("{}", summary);
                }
                Ok(report)
            }
            Err(err) => {
                log::warn!("Command batch failed, restoring previous scene: {}", err);
                let guard = self.history.lock().acquire();
                self.surface.load_document(
                    before,
                    Box::new(move |result| {
                        drop(guard);
                        if let Err(e) = result {
                            log::error!("Failed to restore scene after command error: {}", e);
                        }
                    }),
                );
                Err(err.into())
            }
        }
    }

    /// Parse translator output and apply it.
    pub fn apply_text(&mut self, text: &str) -> EditorResult<CommandReport> {
        let script = CommandScript::parse(text)?;
        self.apply_script(&script)
    }
}

impl<S: DrawingSurface> Drop for Editor<S> {
    fn drop(&mut self) {
        self.surface.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::shapes::{Ellipse, Rectangle, ShapeKind};
    use crate::surface::{LoadCallback, SharedListener};
    use kurbo::Point;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn editor() -> Editor<Canvas> {
        Editor::new(Canvas::new(), &SketchConfig::default())
    }

    #[test]
    fn test_blank_startup() {
        let mut editor = editor();
        assert!(matches!(editor.initialize(None).unwrap(), StartupSource::Blank));
        assert_eq!(editor.history().len(), 1);
        assert!(editor.surface().is_empty());
    }

    #[test]
    fn test_shared_startup_is_sentinel() {
        let mut document = CanvasDocument::new();
        document.objects.push(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        let token = codec::encode(&document).unwrap();

        let mut editor = editor();
        let source = editor.initialize(Some(&format!("#{token}"))).unwrap();
        assert!(matches!(source, StartupSource::Shared));
        assert_eq!(editor.surface().document(), &document);
        assert_eq!(editor.history().len(), 1);
        assert!(matches!(editor.undo(), Err(EditorError::History(HistoryError::UndoUnderflow))));
    }

    #[test]
    fn test_bad_token_falls_back() {
        let mut editor = editor();
        match editor.initialize(Some("%%%")).unwrap() {
            StartupSource::Fallback(err) => {
                assert_eq!(err.user_message(), "Could not load shared drawing");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(editor.surface().is_empty());
        assert_eq!(editor.history().len(), 1);
    }

    #[test]
    fn test_user_edits_are_recorded() {
        let mut editor = editor();
        editor.initialize(None).unwrap();
        editor.surface_mut().add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        editor.surface_mut().add_shape(Ellipse::circle(Point::new(5.0, 5.0), 3.0).into());
        assert_eq!(editor.history().len(), 3);

        assert_eq!(editor.undo().unwrap(), ReplayStatus::Completed);
        assert_eq!(editor.surface().len(), 1);
        assert_eq!(editor.history().len(), 2);
        assert_eq!(editor.redo().unwrap(), ReplayStatus::Completed);
        assert_eq!(editor.surface().len(), 2);
    }

    #[test]
    fn test_script_is_one_step() {
        let mut editor = editor();
        editor.initialize(None).unwrap();
        let report = editor
            .apply_text(
                r#"// House
                [{"op": "add_shape", "shape": {"type": "rect", "left": 0, "top": 50, "width": 100, "height": 80}},
                 {"op": "add_shape", "shape": {"type": "polygon", "points": [[0,50],[50,0],[100,50]]}},
                 {"op": "set_label", "target": {"kind": "rect"}, "label": "walls"}]"#,
            )
            .unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(editor.surface().len(), 2);
        assert_eq!(editor.history().len(), 2);

        editor.undo().unwrap();
        assert!(editor.surface().is_empty());
    }

    #[test]
    fn test_failed_script_rolls_back() {
        let mut editor = editor();
        editor.initialize(None).unwrap();
        editor.surface_mut().add_shape(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
        let before = editor.surface().document().clone();

        let err = editor
            .apply_text(
                r#"[{"op": "add_shape", "shape": {"type": "circle", "cx": 1, "cy": 1, "r": 1}},
                    {"op": "remove_shape", "target": {"label": "missing"}}]"#,
            )
            .unwrap_err();
        assert!(matches!(err, EditorError::Command(CommandError::TargetNotFound(_))));
        assert_eq!(editor.surface().document(), &before);
        assert_eq!(editor.history().len(), 2);
        assert!(!editor.history().is_locked());
        assert_eq!(editor.surface().document().shapes_of_kind(ShapeKind::Ellipse).count(), 0);
    }

    #[test]
    fn test_share_url_round_trip() {
        let mut editor = editor();
        editor.initialize(None).unwrap();
        editor.surface_mut().add_shape(Rectangle::new(Point::new(3.0, 4.0), 5.0, 6.0).into());
        let url = editor.share_url("https://draw.example.com/").unwrap();

        let token = share::token_from_url(url.as_str()).unwrap();
        let mut other = self::editor();
        assert!(matches!(other.initialize(Some(&token)).unwrap(), StartupSource::Shared));
        assert_eq!(other.surface().document(), editor.surface().document());
    }

    struct SharedCanvas(Rc<RefCell<Canvas>>);

    impl DrawingSurface for SharedCanvas {
        fn to_document(&self) -> CanvasDocument {
            self.0.borrow().to_document()
        }

        fn load_document(&mut self, document: CanvasDocument, on_complete: LoadCallback) {
            self.0.borrow_mut().load_document(document, on_complete)
        }

        fn subscribe(&mut self, listener: SharedListener) -> SubscriptionId {
            self.0.borrow_mut().subscribe(listener)
        }

        fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
            self.0.borrow_mut().unsubscribe(id)
        }

        fn render(&mut self) {
            self.0.borrow_mut().render()
        }
    }

    #[test]
    fn test_drop_unsubscribes() {
        let canvas = Rc::new(RefCell::new(Canvas::new()));
        let mut editor = Editor::new(SharedCanvas(Rc::clone(&canvas)), &SketchConfig::default());
        editor.initialize(None).unwrap();
        assert_eq!(canvas.borrow().listener_count(), 1);
        drop(editor);
        assert_eq!(canvas.borrow().listener_count(), 0);
    }
}
