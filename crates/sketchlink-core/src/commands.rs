//! Typed scene commands.
//!
//! External translators (for example a language model turning a prompt into
//! edits) produce a [`CommandScript`]: an optional `//` summary line followed
//! by a JSON array of [`Command`]s. Scripts are data; nothing is executed
//! beyond the fixed set of operations below.
//!
//! ```text
//! // Made the rectangle blue
//! [
//!   {"op": "set_attribute", "target": {"kind": "rect"},
//!    "attribute": {"name": "fill", "value": "blue"}},
//!   {"op": "set_label", "target": {"kind": "rect"}, "label": "blue rectangle"}
//! ]
//! ```

use crate::canvas::{Canvas, CanvasDocument, CanvasError};
use crate::shapes::{
    Ellipse, Line, Path, Rectangle, SerializableColor, Shape, ShapeId, ShapeKind, Text,
};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing or applying commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Script contains no commands")]
    Empty,
    #[error("Malformed command JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No object matches {0}")]
    TargetNotFound(String),
    #[error("Invalid color {0:?}")]
    InvalidColor(String),
    #[error("Attribute {attribute} does not apply to {kind}")]
    NotApplicable {
        attribute: &'static str,
        kind: ShapeKind,
    },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Result type for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Which object a command addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// Exact object id.
    Id { id: ShapeId },
    /// Topmost object carrying this label.
    Label { label: String },
    /// The `index`-th object of a kind, counted back to front.
    Kind {
        kind: ShapeKind,
        #[serde(default)]
        index: usize,
    },
    Position(TargetPosition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPosition {
    Topmost,
    Bottommost,
}

impl Target {
    /// Resolve to an object id in `document`.
    pub fn resolve(&self, document: &CanvasDocument) -> CommandResult<ShapeId> {
        let found = match self {
            Target::Id { id } => document.get_shape(*id).map(Shape::id),
            Target::Label { label } => document.find_by_label(label).last().map(Shape::id),
            Target::Kind { kind, index } => document.shapes_of_kind(*kind).nth(*index).map(Shape::id),
            Target::Position(TargetPosition::Topmost) => document.objects.last().map(Shape::id),
            Target::Position(TargetPosition::Bottommost) => document.objects.first().map(Shape::id),
        };
        found.ok_or_else(|| CommandError::TargetNotFound(self.describe()))
    }

    fn describe(&self) -> String {
        match self {
            Target::Id { id } => format!("id {id}"),
            Target::Label { label } => format!("label {label:?}"),
            Target::Kind { kind, index } => format!("{kind} #{index}"),
            Target::Position(TargetPosition::Topmost) => "topmost object".to_string(),
            Target::Position(TargetPosition::Bottommost) => "bottommost object".to_string(),
        }
    }
}

/// Geometry of a shape to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Rect {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        corner_radius: f64,
    },
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    Circle { cx: f64, cy: f64, r: f64 },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Polygon { points: Vec<[f64; 2]> },
    Polyline { points: Vec<[f64; 2]> },
    Text {
        left: f64,
        top: f64,
        text: String,
        font_size: Option<f64>,
    },
}

/// A shape to create: geometry plus optional style and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpec {
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ShapeSpec {
    /// Build the shape with a fresh id.
    pub fn build(&self) -> CommandResult<Shape> {
        let to_points = |points: &[[f64; 2]]| -> CommandResult<Vec<Point>> {
            if points.len() < 2 {
                return Err(CommandError::InvalidValue("a path needs at least two points".into()));
            }
            Ok(points.iter().map(|[x, y]| Point::new(*x, *y)).collect())
        };

        let mut shape: Shape = match &self.geometry {
            Geometry::Rect { left, top, width, height, corner_radius } => {
                non_negative("width", *width)?;
                non_negative("height", *height)?;
                non_negative("corner_radius", *corner_radius)?;
                let mut rect = Rectangle::new(Point::new(*left, *top), *width, *height);
                rect.corner_radius = *corner_radius;
                rect.into()
            }
            Geometry::Ellipse { cx, cy, rx, ry } => {
                non_negative("rx", *rx)?;
                non_negative("ry", *ry)?;
                Ellipse::new(Point::new(*cx, *cy), *rx, *ry).into()
            }
            Geometry::Circle { cx, cy, r } => {
                non_negative("r", *r)?;
                Ellipse::circle(Point::new(*cx, *cy), *r).into()
            }
            Geometry::Line { x1, y1, x2, y2 } => {
                Line::new(Point::new(*x1, *y1), Point::new(*x2, *y2)).into()
            }
            Geometry::Polygon { points } => Path::polygon(to_points(points)?).into(),
            Geometry::Polyline { points } => Path::from_points(to_points(points)?).into(),
            Geometry::Text { left, top, text, font_size } => {
                let mut shape = Text::new(Point::new(*left, *top), text.clone());
                if let Some(size) = font_size {
                    positive("font_size", *size)?;
                    shape.font_size = *size;
                }
                shape.into()
            }
        };

        let style = shape.style_mut();
        if let Some(fill) = &self.fill {
            style.fill_color = Some(parse_color(fill)?);
        }
        if let Some(stroke) = &self.stroke {
            style.stroke_color = parse_color(stroke)?;
        }
        if let Some(width) = self.stroke_width {
            non_negative("stroke_width", width)?;
            style.stroke_width = width;
        }
        if let Some(opacity) = self.opacity {
            style.opacity = unit_interval("opacity", opacity)?;
        }
        shape.set_label(self.label.clone());

        if !shape.is_finite() {
            return Err(CommandError::InvalidValue("coordinates must be finite".into()));
        }
        Ok(shape)
    }
}

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum Attribute {
    /// Fill color; `null` removes the fill.
    Fill(Option<String>),
    Stroke(String),
    StrokeWidth(f64),
    Opacity(f64),
    /// Move so the bounding box starts at this point.
    Position { x: f64, y: f64 },
    /// Resize rectangles (width × height) or ellipses (diameters).
    Size { width: f64, height: f64 },
    CornerRadius(f64),
    Text(String),
    FontSize(f64),
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Fill(_) => "fill",
            Attribute::Stroke(_) => "stroke",
            Attribute::StrokeWidth(_) => "stroke_width",
            Attribute::Opacity(_) => "opacity",
            Attribute::Position { .. } => "position",
            Attribute::Size { .. } => "size",
            Attribute::CornerRadius(_) => "corner_radius",
            Attribute::Text(_) => "text",
            Attribute::FontSize(_) => "font_size",
        }
    }

    /// Apply to a shape, checking that the attribute fits its kind.
    pub fn apply_to(&self, shape: &mut Shape) -> CommandResult<()> {
        let not_applicable = || CommandError::NotApplicable {
            attribute: self.name(),
            kind: shape.kind(),
        };
        match self {
            Attribute::Fill(fill) => {
                let color = fill.as_deref().map(parse_color).transpose()?;
                shape.style_mut().fill_color = color;
            }
            Attribute::Stroke(stroke) => shape.style_mut().stroke_color = parse_color(stroke)?,
            Attribute::StrokeWidth(width) => {
                non_negative("stroke_width", *width)?;
                shape.style_mut().stroke_width = *width;
            }
            Attribute::Opacity(opacity) => {
                shape.style_mut().opacity = unit_interval("opacity", *opacity)?;
            }
            Attribute::Position { x, y } => {
                finite("x", *x)?;
                finite("y", *y)?;
                shape.move_to(Point::new(*x, *y));
            }
            Attribute::Size { width, height } => {
                non_negative("width", *width)?;
                non_negative("height", *height)?;
                match shape {
                    Shape::Rect(rect) => {
                        rect.width = *width;
                        rect.height = *height;
                    }
                    Shape::Ellipse(ellipse) => {
                        ellipse.radius_x = width / 2.0;
                        ellipse.radius_y = height / 2.0;
                    }
                    _ => return Err(not_applicable()),
                }
            }
            Attribute::CornerRadius(radius) => {
                non_negative("corner_radius", *radius)?;
                match shape {
                    Shape::Rect(rect) => rect.corner_radius = *radius,
                    _ => return Err(not_applicable()),
                }
            }
            Attribute::Text(content) => match shape {
                Shape::Text(text) => text.content = content.clone(),
                _ => return Err(not_applicable()),
            },
            Attribute::FontSize(size) => {
                positive("font_size", *size)?;
                match shape {
                    Shape::Text(text) => text.font_size = *size,
                    _ => return Err(not_applicable()),
                }
            }
        }
        Ok(())
    }
}

/// One scene operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    AddShape { shape: ShapeSpec },
    RemoveShape { target: Target },
    SetAttribute { target: Target, attribute: Attribute },
    SetLabel { target: Target, label: Option<String> },
    SetBackground { color: Option<String> },
    BringToFront { target: Target },
    SendToBack { target: Target },
    Clear,
}

/// What applying commands changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandReport {
    pub applied: usize,
    pub added: Vec<ShapeId>,
    pub removed: Vec<ShapeId>,
    pub modified: Vec<ShapeId>,
}

impl Command {
    /// Apply to the canvas. The canvas publishes its usual mutation events.
    pub fn apply(&self, canvas: &mut Canvas, report: &mut CommandReport) -> CommandResult<()> {
        match self {
            Command::AddShape { shape } => {
                let id = canvas.add_shape(shape.build()?);
                report.added.push(id);
            }
            Command::RemoveShape { target } => {
                let id = target.resolve(canvas.document())?;
                canvas.remove_shape(id);
                report.removed.push(id);
            }
            Command::SetAttribute { target, attribute } => {
                let id = target.resolve(canvas.document())?;
                let mut edited = canvas.get_shape(id).cloned().ok_or(CanvasError::NotFound(id))?;
                attribute.apply_to(&mut edited)?;
                canvas.update_shape(id, move |shape| *shape = edited)?;
                report.modified.push(id);
            }
            Command::SetLabel { target, label } => {
                let id = target.resolve(canvas.document())?;
                let label = label.clone();
                canvas.update_shape(id, move |shape| shape.set_label(label))?;
                report.modified.push(id);
            }
            Command::SetBackground { color } => {
                let color = color.as_deref().map(parse_color).transpose()?;
                canvas.set_background(color);
            }
            Command::BringToFront { target } => {
                let id = target.resolve(canvas.document())?;
                canvas.bring_to_front(id)?;
                report.modified.push(id);
            }
            Command::SendToBack { target } => {
                let id = target.resolve(canvas.document())?;
                canvas.send_to_back(id)?;
                report.modified.push(id);
            }
            Command::Clear => {
                report.removed.extend(canvas.document().objects.iter().map(Shape::id));
                canvas.clear();
            }
        }
        report.applied += 1;
        Ok(())
    }
}

/// Translator output: an optional summary plus the commands to run.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandScript {
    pub summary: Option<String>,
    pub commands: Vec<Command>,
}

impl CommandScript {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            summary: None,
            commands,
        }
    }

    /// Parse translator output.
    ///
    /// Markdown code fences are ignored. If the first remaining line starts
    /// with `//` it becomes the summary. The rest must be a JSON array of
    /// commands or a single command object.
    pub fn parse(text: &str) -> CommandResult<Self> {
        let mut lines = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .skip_while(|line| line.trim().is_empty())
            .peekable();

        let summary = match lines.peek() {
            Some(line) if line.trim_start().starts_with("//") => {
                let summary = line.trim_start().trim_start_matches('/').trim().to_string();
                lines.next();
                Some(summary).filter(|s| !s.is_empty())
            }
            _ => None,
        };

        let body = lines.collect::<Vec<_>>().join("\n");
        let body = body.trim();
        if body.is_empty() {
            return Err(CommandError::Empty);
        }

        let commands = if body.starts_with('[') {
            serde_json::from_str::<Vec<Command>>(body)?
        } else {
            vec![serde_json::from_str::<Command>(body)?]
        };
        if commands.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(Self { summary, commands })
    }

    /// Apply every command in order, stopping at the first failure.
    ///
    /// Callers that need all-or-nothing semantics restore the prior document
    /// on error; see `Editor::apply_script`.
    pub fn apply(&self, canvas: &mut Canvas) -> CommandResult<CommandReport> {
        let mut report = CommandReport::default();
        for command in &self.commands {
            command.apply(canvas, &mut report)?;
        }
        Ok(report)
    }
}

fn parse_color(input: &str) -> CommandResult<SerializableColor> {
    SerializableColor::parse(input).ok_or_else(|| CommandError::InvalidColor(input.to_string()))
}

fn finite(name: &str, value: f64) -> CommandResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CommandError::InvalidValue(format!("{name} must be finite")))
    }
}

fn non_negative(name: &str, value: f64) -> CommandResult<f64> {
    if finite(name, value)? < 0.0 {
        return Err(CommandError::InvalidValue(format!("{name} must not be negative")));
    }
    Ok(value)
}

fn positive(name: &str, value: f64) -> CommandResult<f64> {
    if finite(name, value)? <= 0.0 {
        return Err(CommandError::InvalidValue(format!("{name} must be positive")));
    }
    Ok(value)
}

fn unit_interval(name: &str, value: f64) -> CommandResult<f64> {
    if !(0.0..=1.0).contains(&finite(name, value)?) {
        return Err(CommandError::InvalidValue(format!("{name} must be between 0 and 1")));
    }
    Ok(value)
}
