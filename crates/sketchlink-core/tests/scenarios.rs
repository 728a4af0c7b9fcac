//! End-to-end editor scenarios: startup from a link, edits, undo and sharing.

use kurbo::Point;
use sketchlink_core::codec;
use sketchlink_core::shapes::{Ellipse, Rectangle};
use sketchlink_core::{
    Canvas, CanvasDocument, DecodeStage, Editor, EditorError, HistoryError, ReplayStatus,
    SketchConfig, StartupSource, token_from_url,
};

fn blank_editor() -> Editor<Canvas> {
    let mut editor = Editor::new(Canvas::new(), &SketchConfig::default());
    editor.initialize(None).unwrap();
    editor
}

#[test]
fn undo_walks_back_to_blank_and_stops() {
    let mut editor = blank_editor();
    editor.surface_mut().add_shape(Rectangle::new(Point::new(10.0, 10.0), 50.0, 30.0).into());
    editor.surface_mut().add_shape(Ellipse::circle(Point::new(100.0, 100.0), 20.0).into());
    assert_eq!(editor.history().len(), 3);

    assert_eq!(editor.undo().unwrap(), ReplayStatus::Completed);
    assert_eq!(editor.surface().len(), 1);
    assert_eq!(editor.undo().unwrap(), ReplayStatus::Completed);
    assert!(editor.surface().is_empty());

    let err = editor.undo().unwrap_err();
    assert!(matches!(err, EditorError::History(HistoryError::UndoUnderflow)));
    assert_eq!(err.to_string(), "Can't undo further");
    assert!(editor.surface().is_empty());
    assert_eq!(editor.history().len(), 1);
    assert!(!editor.history().is_locked());
}

#[test]
fn undo_does_not_record_its_own_restore() {
    let mut editor = blank_editor();
    editor.surface_mut().add_shape(Rectangle::new(Point::ZERO, 5.0, 5.0).into());
    let frames = editor.surface().frames_rendered();

    editor.undo().unwrap();
    assert_eq!(editor.history().len(), 1);
    assert!(editor.surface().frames_rendered() > frames);

    // A fresh edit after undo starts recording again and drops the redo entry.
    editor.surface_mut().add_shape(Ellipse::circle(Point::ZERO, 2.0).into());
    assert_eq!(editor.history().len(), 2);
    assert!(!editor.history().can_redo());
}

#[test]
fn shared_link_opens_same_scene() {
    let mut author = blank_editor();
    author
        .surface_mut()
        .add_shape(Rectangle::new(Point::new(1.5, 2.25), 40.0, 20.0).into());
    author.surface_mut().add_shape(Ellipse::new(Point::new(80.0, 60.0), 12.5, 7.0).into());
    let url = author.share_url("https://sketch.example.com/board").unwrap();

    let mut viewer = Editor::new(Canvas::new(), &SketchConfig::default());
    let fragment = url.fragment().map(|f| format!("#{f}"));
    let source = viewer.initialize(fragment.as_deref()).unwrap();

    assert!(matches!(source, StartupSource::Shared));
    assert_eq!(viewer.surface().document(), author.surface().document());
    assert_eq!(viewer.share().unwrap(), author.share().unwrap());
    assert_eq!(token_from_url(url.as_str()).unwrap(), author.share().unwrap());
}

#[test]
fn corrupted_link_falls_back_to_blank() {
    let mut document = CanvasDocument::new();
    document.objects.push(Rectangle::new(Point::ZERO, 10.0, 10.0).into());
    let token = codec::encode(&document).unwrap();

    // Damage the zlib header byte; the token stays valid base64.
    let mut bytes = codec::binary_string_to_bytes(&codec::atob(&token).unwrap()).unwrap();
    bytes[0] ^= 0x01;
    let corrupted = codec::btoa(&codec::bytes_to_binary_string(&bytes)).unwrap();

    let mut editor = Editor::new(Canvas::new(), &SketchConfig::default());
    let StartupSource::Fallback(err) = editor.initialize(Some(&corrupted)).unwrap() else {
        panic!("a corrupted token must fall back to a blank scene");
    };
    assert_ne!(err.stage(), DecodeStage::Base64);
    assert_eq!(err.user_message(), "Could not load shared drawing");
    assert!(editor.surface().is_empty());
    assert_eq!(editor.history().len(), 1);
}

#[test]
fn command_batch_is_a_single_undo_step() {
    let mut editor = blank_editor();
    editor
        .apply_text(
            r##"```
// Drew a sun over a field
[
  {"op": "set_background", "color": "#87ceeb"},
  {"op": "add_shape", "shape": {"type": "rect", "left": 0, "top": 400, "width": 800, "height": 200, "fill": "green", "label": "field"}},
  {"op": "add_shape", "shape": {"type": "circle", "cx": 650, "cy": 120, "r": 60, "fill": "yellow", "label": "sun"}}
]
```"##,
        )
        .unwrap();
    assert_eq!(editor.surface().len(), 2);
    assert_eq!(editor.history().len(), 2);

    let svg = editor.export_svg();
    assert!(svg.contains("<title>sun</title>"));
    assert!(svg.contains(r##"fill="#87ceeb""##));

    editor.undo().unwrap();
    assert!(editor.surface().is_empty());
    assert_eq!(editor.surface().document().background, None);
}

#[test]
fn history_depth_is_bounded() {
    let mut config = SketchConfig::default();
    config.history.max_depth = Some(4);
    let mut editor = Editor::new(Canvas::new(), &config);
    editor.initialize(None).unwrap();
    let sentinel = editor.history().sentinel().unwrap();

    for i in 0..10 {
        editor
            .surface_mut()
            .add_shape(Rectangle::new(Point::new(f64::from(i), 0.0), 1.0, 1.0).into());
    }
    assert_eq!(editor.history().len(), 4);
    assert_eq!(editor.history().sentinel().unwrap().as_str(), sentinel.as_str());

    for _ in 0..3 {
        editor.undo().unwrap();
    }
    assert!(editor.surface().is_empty());
}
