//! Application session shared by the native CLI and the browser entry point.

use sketchlink_core::canvas::{Canvas, CanvasDocument, DocumentError};
use sketchlink_core::codec::DecodeError;
use sketchlink_core::commands::{CommandReport, CommandScript};
use sketchlink_core::config::{ConfigError, SketchConfig};
use sketchlink_core::editor::{Editor, EditorError, StartupSource};
use sketchlink_core::share::{self, ShareError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Could not load shared drawing: {0}")]
    Decode(DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

/// One open drawing.
pub struct App {
    editor: Editor<Canvas>,
    base_url: Option<String>,
}

impl App {
    /// Start from a share link, a bare token, or nothing.
    ///
    /// Links without a drawing start blank; undecodable tokens fall back to
    /// blank and are reported through the returned [`StartupSource`].
    pub fn open(config: &SketchConfig, link: Option<&str>) -> AppResult<(Self, StartupSource)> {
        let token = match link.map(share::token_from_url).transpose() {
            Ok(token) => token,
            Err(ShareError::MissingFragment) => None,
            Err(e) => return Err(e.into()),
        };
        let mut editor = Editor::new(Canvas::new(), config);
        let source = editor.initialize(token.as_deref())?;
        Ok((
            Self {
                editor,
                base_url: None,
            },
            source,
        ))
    }

    /// Start from a document, for example one read from a JSON file.
    pub fn from_document(config: &SketchConfig, document: CanvasDocument) -> AppResult<Self> {
        let mut editor = Editor::new(Canvas::new(), config);
        editor.initialize_document(document)?;
        Ok(Self {
            editor,
            base_url: None,
        })
    }

    /// Base URL used by [`App::share_link`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn editor(&self) -> &Editor<Canvas> {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut Editor<Canvas> {
        &mut self.editor
    }

    pub fn document(&self) -> &CanvasDocument {
        self.editor.surface().document()
    }

    /// Full share URL when a base URL is set, otherwise the bare token.
    pub fn share_link(&self) -> AppResult<String> {
        match &self.base_url {
            Some(base) => Ok(self.editor.share_url(base)?.to_string()),
            None => Ok(self.editor.share()?),
        }
    }

    pub fn apply(&mut self, script: &str) -> AppResult<CommandReport> {
        let script = CommandScript::parse(script).map_err(EditorError::from)?;
        let report = self.editor.apply_script(&script)?;
        log::info!(
            "Applied {} commands ({} added, {} removed, {} modified)",
            report.applied,
            report.added.len(),
            report.removed.len(),
            report.modified.len()
        );
        Ok(report)
    }

    pub fn undo(&mut self) -> AppResult<()> {
        self.editor.undo()?;
        Ok(())
    }

    pub fn redo(&mut self) -> AppResult<()> {
        self.editor.redo()?;
        Ok(())
    }

    pub fn export_svg(&self) -> String {
        self.editor.export_svg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use sketchlink_core::shapes::Rectangle;

    fn document() -> CanvasDocument {
        let mut document = CanvasDocument::new();
        document.objects.push(Rectangle::new(Point::new(5.0, 5.0), 20.0, 10.0).into());
        document
    }

    #[test]
    fn test_open_without_link() {
        let (app, source) = App::open(&SketchConfig::default(), None).unwrap();
        assert!(matches!(source, StartupSource::Blank));
        assert!(app.document().is_empty());
    }

    #[test]
    fn test_link_without_fragment_is_blank() {
        let (_, source) = App::open(&SketchConfig::default(), Some("https://sketch.example.com/")).unwrap();
        assert!(matches!(source, StartupSource::Blank));
    }

    #[test]
    fn test_share_then_open() {
        let config = SketchConfig::default();
        let document = document();
        let app = App::from_document(&config, document.clone())
            .unwrap()
            .with_base_url("https://sketch.example.com/");
        let link = app.share_link().unwrap();
        assert!(link.starts_with("https://sketch.example.com/#"));

        let (opened, source) = App::open(&config, Some(&link)).unwrap();
        assert!(matches!(source, StartupSource::Shared));
        assert_eq!(opened.document(), &document);
    }

    #[test]
    fn test_apply_and_undo() {
        let document = document();
        let mut app = App::from_document(&SketchConfig::default(), document.clone()).unwrap();
        app.apply(r#"{"op": "set_attribute", "target": "topmost", "attribute": {"name": "fill", "value": "red"}}"#)
            .unwrap();
        assert!(app.export_svg().contains(r##"fill="#ff0000""##));
        app.undo().unwrap();
        assert_eq!(app.document(), &document);
        app.redo().unwrap();
        assert!(app.export_svg().contains(r##"fill="#ff0000""##));
    }

    #[test]
    fn test_invalid_document_rejected() {
        let mut document = document();
        document.version = 99;
        assert!(matches!(
            App::from_document(&SketchConfig::default(), document),
            Err(AppError::Editor(EditorError::Document(_)))
        ));
    }
}
