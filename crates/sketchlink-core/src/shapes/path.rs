//! Polygon/polyline path shape.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_is_finite};
use kurbo::{BezPath, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A path through a series of points, optionally closed into a polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub(crate) id: ShapeId,
    /// Points in the path.
    pub points: Vec<Point>,
    /// Whether the last point connects back to the first.
    #[serde(default)]
    pub closed: bool,
    /// Style properties.
    pub style: ShapeStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Path {
    /// Create an open path from existing points.
    pub fn from_points(points: Vec<Point>) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            closed: false,
            style: ShapeStyle::default(),
            label: None,
        }
    }

    /// Create a closed polygon.
    pub fn polygon(points: Vec<Point>) -> Self {
        Self {
            closed: true,
            ..Self::from_points(points)
        }
    }

    /// Add a point to the path.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Get the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Build the bezier path used for rendering.
    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();
        if let Some(first) = points.next() {
            path.move_to(*first);
            for point in points {
                path.line_to(*point);
            }
            if self.closed {
                path.close_path();
            }
        }
        path
    }
}

impl ShapeTrait for Path {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        let mut points = self.points.iter();
        let Some(first) = points.next() else {
            return Rect::ZERO;
        };
        points.fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p))
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn translate(&mut self, delta: Vec2) {
        for point in &mut self.points {
            *point += delta;
        }
    }

    fn is_finite(&self) -> bool {
        self.points.iter().copied().all(point_is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Path {
        Path::polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 8.0),
        ])
    }

    #[test]
    fn test_bounds() {
        let bounds = triangle().bounds();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 10.0, 8.0));
    }

    #[test]
    fn test_empty_path_bounds() {
        let path = Path::from_points(Vec::new());
        assert!(path.is_empty());
        assert_eq!(path.bounds(), Rect::ZERO);
    }

    #[test]
    fn test_closed_path_svg() {
        let svg = triangle().to_bez_path().to_svg();
        assert!(svg.starts_with('M'));
        assert!(svg.ends_with('Z'));
    }

    #[test]
    fn test_add_point() {
        let mut path = Path::from_points(vec![Point::ZERO]);
        path.add_point(Point::new(1.0, 1.0));
        assert_eq!(path.len(), 2);
        assert!(!path.closed);
    }
}
