//! SVG export of a scene document.

use crate::canvas::CanvasDocument;
use crate::shapes::{SerializableColor, Shape, ShapeStyle};
use serde::{Deserialize, Serialize};

/// Default file name offered for downloads.
pub const DEFAULT_SVG_FILE_NAME: &str = "canvas.svg";

/// Output options for [`to_svg`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgOptions {
    pub width: f64,
    pub height: f64,
    /// Used when the document has no background of its own.
    pub background: SerializableColor,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            background: SerializableColor::white(),
        }
    }
}

/// Render the document as a standalone SVG string, objects in z-order.
pub fn to_svg(document: &CanvasDocument, options: &SvgOptions) -> String {
    let (w, h) = (options.width, options.height);
    let mut out = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
    );
    let background = document.background.unwrap_or(options.background);
    out.push_str(&format!(
        "  <rect x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\"{}/>\n",
        fill_attrs(Some(background))
    ));
    for shape in &document.objects {
        write_shape(&mut out, shape);
    }
    out.push_str("</svg>\n");
    out
}

fn write_shape(out: &mut String, shape: &Shape) {
    let title = shape
        .label()
        .map(|label| format!("<title>{}</title>", escape_xml(label)))
        .unwrap_or_default();

    let (element, attrs) = match shape {
        Shape::Rect(rect) => {
            let mut attrs = format!(
                r#"x="{}" y="{}" width="{}" height="{}""#,
                rect.position.x, rect.position.y, rect.width, rect.height
            );
            if rect.corner_radius > 0.0 {
                attrs.push_str(&format!(r#" rx="{0}" ry="{0}""#, rect.corner_radius));
            }
            ("rect", attrs)
        }
        Shape::Ellipse(ellipse) => (
            "ellipse",
            format!(
                r#"cx="{}" cy="{}" rx="{}" ry="{}""#,
                ellipse.center.x, ellipse.center.y, ellipse.radius_x, ellipse.radius_y
            ),
        ),
        Shape::Line(line) => (
            "line",
            format!(
                r#"x1="{}" y1="{}" x2="{}" y2="{}""#,
                line.start.x, line.start.y, line.end.x, line.end.y
            ),
        ),
        Shape::Path(path) => ("path", format!(r#"d="{}""#, path.to_bez_path().to_svg())),
        Shape::Text(text) => {
            out.push_str(&format!(
                "  <text x=\"{}\" y=\"{}\" font-size=\"{}\" dominant-baseline=\"hanging\"{}>{title}{}</text>\n",
                text.position.x,
                text.position.y,
                text.font_size,
                text_attrs(&text.style),
                escape_xml(&text.content)
            ));
            return;
        }
    };

    let style = style_attrs(shape.style());
    let line = if title.is_empty() {
        format!("  <{element} {attrs}{style}/>\n")
    } else {
        format!("  <{element} {attrs}{style}>{title}</{element}>\n")
    };
    out.push_str(&line);
}

fn fill_attrs(fill: Option<SerializableColor>) -> String {
    match fill {
        Some(color) if color.a == 255 => format!(r#" fill="{}""#, color.to_hex_rgb()),
        Some(color) => format!(
            r#" fill="{}" fill-opacity="{}""#,
            color.to_hex_rgb(),
            color.alpha_fraction()
        ),
        None => r#" fill="none""#.to_string(),
    }
}

fn style_attrs(style: &ShapeStyle) -> String {
    let mut attrs = fill_attrs(style.fill_color);
    let stroke = style.stroke_color;
    attrs.push_str(&format!(
        r#" stroke="{}" stroke-width="{}""#,
        stroke.to_hex_rgb(),
        style.stroke_width
    ));
    if stroke.a != 255 {
        attrs.push_str(&format!(r#" stroke-opacity="{}""#, stroke.alpha_fraction()));
    }
    if style.opacity < 1.0 {
        attrs.push_str(&format!(r#" opacity="{}""#, style.opacity));
    }
    attrs
}

/// Text is filled with its fill color, falling back to the stroke color.
fn text_attrs(style: &ShapeStyle) -> String {
    let mut attrs = fill_attrs(Some(style.fill_color.unwrap_or(style.stroke_color)));
    if style.opacity < 1.0 {
        attrs.push_str(&format!(r#" opacity="{}""#, style.opacity));
    }
    attrs
}

fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Ellipse, Path, Rectangle, Text};
    use kurbo::Point;

    #[test]
    fn test_empty_document() {
        let svg = to_svg(&CanvasDocument::new(), &SvgOptions::default());
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="600""#));
        assert!(svg.contains(r##"<rect x="0" y="0" width="800" height="600" fill="#ffffff"/>"##));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_objects_in_order() {
        let mut document = CanvasDocument::new();
        document.objects.push(Rectangle::new(Point::new(1.0, 2.0), 30.0, 40.0).into());
        document.objects.push(Ellipse::circle(Point::new(50.0, 50.0), 10.0).into());

        let svg = to_svg(&document, &SvgOptions::default());
        let rect = svg.find(r#"<rect x="1" y="2" width="30" height="40""#).unwrap();
        let ellipse = svg.find(r#"<ellipse cx="50" cy="50" rx="10" ry="10""#).unwrap();
        assert!(rect < ellipse);
    }

    #[test]
    fn test_label_becomes_title_and_is_escaped() {
        let mut document = CanvasDocument::new();
        let shape: Shape = Rectangle::new(Point::ZERO, 5.0, 5.0).into();
        document.objects.push(shape.with_label("<door> & \"frame\""));

        let svg = to_svg(&document, &SvgOptions::default());
        assert!(svg.contains("<title>&lt;door&gt; &amp; &quot;frame&quot;</title></rect>"));
    }

    #[test]
    fn test_text_content_escaped() {
        let mut document = CanvasDocument::new();
        document.objects.push(Text::new(Point::new(10.0, 10.0), "a < b").into());
        let svg = to_svg(&document, &SvgOptions::default());
        assert!(svg.contains(">a &lt; b</text>"));
    }

    #[test]
    fn test_document_background_and_path() {
        let mut document = CanvasDocument::new();
        document.background = SerializableColor::parse("#102030");
        document.objects.push(
            Path::polygon(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 8.0)]).into(),
        );
        let svg = to_svg(&document, &SvgOptions::default());
        assert!(svg.contains(r##"fill="#102030""##));
        assert!(svg.contains(r#"<path d="M"#));
    }

    #[test]
    fn test_one_element_per_line() {
        let mut document = CanvasDocument::new();
        let mut rect = Rectangle::new(Point::ZERO, 4.0, 4.0);
        rect.corner_radius = 2.0;
        rect.style.opacity = 0.5;
        document.objects.push(rect.into());
        document.objects.push(Text::new(Point::new(1.0, 1.0), "hi").into());

        let svg = to_svg(&document, &SvgOptions::default());
        let lines: Vec<&str> = svg.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with(r#"  <rect x="0" y="0" width="4" height="4" rx="2" ry="2""#));
        assert!(lines[2].ends_with(r#" opacity="0.5"/>"#));
        assert!(lines[3].starts_with("  <text "));
        assert_eq!(lines[4], "</svg>");
    }
}
