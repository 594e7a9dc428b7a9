//! Minimal geometry carried by entity parameters, plus the validation that
//! runs before any document call.
//!
//! Only what the document would reject is checked here: degenerate loops,
//! non-horizontal profiles, self-intersections and sub-tolerance segments.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Model-space point, written `[x, y, z]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(self, other: Point) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Point {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Point::new(x, y, z)
    }
}

impl From<Point> for [f64; 3] {
    fn from(p: Point) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Document tolerances, in model units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Shortest segment the document accepts.
    pub short_curve: f64,
    /// Distance under which two vertices are the same.
    pub vertex: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            short_curve: 0.00256,
            vertex: 1e-6,
        }
    }
}

/// Defining geometry of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geometry {
    /// Closed horizontal loop. The closing segment is implicit.
    Profile(Vec<Point>),
    /// Open polyline.
    Curve(Vec<Point>),
    Elevation(f64),
}

impl Geometry {
    pub fn label(&self) -> &'static str {
        match self {
            Geometry::Profile(_) => "profile",
            Geometry::Curve(_) => "curve",
            Geometry::Elevation(_) => "elevation",
        }
    }

    /// Number of segments; 0 for elevations.
    pub fn segment_count(&self) -> usize {
        match self {
            Geometry::Profile(points) => loop_vertices(points, 0.0).len(),
            Geometry::Curve(points) => points.len().saturating_sub(1),
            Geometry::Elevation(_) => 0,
        }
    }

    /// Same variant and every coordinate within `tol`.
    pub fn approx_eq(&self, other: &Geometry, tol: f64) -> bool {
        match (self, other) {
            (Geometry::Profile(a), Geometry::Profile(b))
            | (Geometry::Curve(a), Geometry::Curve(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.distance(*q) <= tol)
            }
            (Geometry::Elevation(a), Geometry::Elevation(b)) => (a - b).abs() <= tol,
            _ => false,
        }
    }

    /// Lowest z of the geometry, used as the base elevation.
    pub fn min_z(&self) -> f64 {
        match self {
            Geometry::Profile(points) | Geometry::Curve(points) => {
                points.iter().map(|p| p.z).fold(f64::INFINITY, f64::min)
            }
            Geometry::Elevation(z) => *z,
        }
    }

    /// Plan area of a profile, 0 otherwise.
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Profile(points) => signed_area(loop_vertices(points, 0.0)).abs(),
            _ => 0.0,
        }
    }

    pub fn validate(&self, tol: &Tolerances) -> Result<(), ValidationError> {
        match self {
            Geometry::Profile(points) => validate_profile(points, tol),
            Geometry::Curve(points) => validate_curve(points, tol),
            Geometry::Elevation(z) => {
                if z.is_finite() {
                    Ok(())
                } else {
                    Err(ValidationError::new("elevation", "must be a finite number"))
                }
            }
        }
    }
}

/// Vertices of a closed loop without a repeated closing vertex.
fn loop_vertices(points: &[Point], tol: f64) -> &[Point] {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() > 1 && first.distance(*last) <= tol => {
            &points[..points.len() - 1]
        }
        _ => points,
    }
}

fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

fn validate_profile(points: &[Point], tol: &Tolerances) -> Result<(), ValidationError> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(ValidationError::new("boundary", "vertices must be finite"));
    }
    let vertices = loop_vertices(points, tol.vertex);
    if vertices.len() < 3 {
        return Err(ValidationError::new(
            "boundary",
            "a closed loop needs at least 3 distinct vertices",
        ));
    }

    let z0 = vertices[0].z;
    if vertices.iter().any(|p| (p.z - z0).abs() > tol.vertex) {
        return Err(ValidationError::new(
            "boundary",
            "loop must be planar and horizontal",
        ));
    }

    let n = vertices.len();
    for i in 0..n {
        let length = vertices[i].distance(vertices[(i + 1) % n]);
        if length < tol.short_curve {
            return Err(ValidationError::new(
                "boundary",
                format!("segment {i} is shorter than the short curve tolerance"),
            ));
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            // adjacent segments share a vertex
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            let (c, d) = (vertices[j], vertices[(j + 1) % n]);
            if segments_intersect(a, b, c, d, tol.vertex) {
                return Err(ValidationError::new(
                    "boundary",
                    format!("loop self-intersects between segments {i} and {j}"),
                ));
            }
        }
    }

    if signed_area(vertices).abs() <= tol.vertex {
        return Err(ValidationError::new("boundary", "loop encloses no area"));
    }

    Ok(())
}

fn validate_curve(points: &[Point], tol: &Tolerances) -> Result<(), ValidationError> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(ValidationError::new("curve", "vertices must be finite"));
    }
    if points.len() < 2 {
        return Err(ValidationError::new("curve", "needs at least 2 vertices"));
    }
    for (i, pair) in points.windows(2).enumerate() {
        if pair[0].distance(pair[1]) < tol.short_curve {
            return Err(ValidationError::new(
                "curve",
                format!("segment {i} is shorter than the short curve tolerance"),
            ));
        }
    }
    Ok(())
}

fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Point, b: Point, p: Point, tol: f64) -> bool {
    p.x >= a.x.min(b.x) - tol
        && p.x <= a.x.max(b.x) + tol
        && p.y >= a.y.min(b.y) - tol
        && p.y <= a.y.max(b.y) + tol
}

/// Plan-view (XY) segment intersection, touching included.
fn segments_intersect(a: Point, b: Point, c: Point, d: Point, tol: f64) -> bool {
    let d1 = orient(c, d, a);
    let d2 = orient(c, d, b);
    let d3 = orient(a, b, c);
    let d4 = orient(a, b, d);

    if ((d1 > tol && d2 < -tol) || (d1 < -tol && d2 > tol))
        && ((d3 > tol && d4 < -tol) || (d3 < -tol && d4 > tol))
    {
        return true;
    }

    (d1.abs() <= tol && on_segment(c, d, a, tol))
        || (d2.abs() <= tol && on_segment(c, d, b, tol))
        || (d3.abs() <= tol && on_segment(a, b, c, tol))
        || (d4.abs() <= tol && on_segment(a, b, d, tol))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(size, 0.0, 0.0),
            Point::new(size, size, 0.0),
            Point::new(0.0, size, 0.0),
        ]
    }

    #[test]
    fn test_valid_square() {
        let g = Geometry::Profile(square(10.0));
        assert!(g.validate(&Tolerances::default()).is_ok());
        assert!((g.area() - 100.0).abs() < 1e-9);
        assert_eq!(g.segment_count(), 4);
    }

    #[test]
    fn test_explicitly_closed_loop_is_accepted() {
        let mut pts = square(10.0);
        pts.push(pts[0]);
        let g = Geometry::Profile(pts);
        assert!(g.validate(&Tolerances::default()).is_ok());
        assert_eq!(g.segment_count(), 4);
    }

    #[test]
    fn test_bowtie_self_intersects() {
        let g = Geometry::Profile(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 10.0, 0.0),
            Point::new(10.0, 0.0, 0.0),
            Point::new(0.0, 10.0, 0.0),
        ]);
        let err = g.validate(&Tolerances::default()).unwrap_err();
        assert!(err.message.contains("self-intersects"), "{err}");
    }

    #[test]
    fn test_non_horizontal_rejected() {
        let mut pts = square(10.0);
        pts[2].z = 1.0;
        let err = Geometry::Profile(pts)
            .validate(&Tolerances::default())
            .unwrap_err();
        assert!(err.message.contains("horizontal"));
    }

    #[test]
    fn test_short_segment_rejected() {
        let g = Geometry::Curve(vec![Point::new(0.0, 0.0, 0.0), Point::new(0.001, 0.0, 0.0)]);
        assert!(g.validate(&Tolerances::default()).is_err());
    }

    #[test]
    fn test_too_few_vertices() {
        let g = Geometry::Profile(vec![Point::new(0.0, 0.0, 0.0), Point::new(1.0, 0.0, 0.0)]);
        assert!(g.validate(&Tolerances::default()).is_err());
    }

    #[test]
    fn test_non_finite_elevation() {
        assert!(Geometry::Elevation(f64::NAN)
            .validate(&Tolerances::default())
            .is_err());
    }

    #[test]
    fn test_approx_eq() {
        let a = Geometry::Profile(square(10.0));
        let mut pts = square(10.0);
        pts[1].x += 1e-9;
        let b = Geometry::Profile(pts);
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&Geometry::Curve(square(10.0)), 1e-6));
    }

    #[test]
    fn test_point_serde_as_array() {
        let json = serde_json::to_string(&Geometry::Elevation(3.0)).unwrap();
        assert_eq!(json, r#"{"elevation":3.0}"#);
        let g: Geometry = serde_json::from_str(r#"{"curve":[[0,0,0],[5,0,0]]}"#).unwrap();
        assert_eq!(g.segment_count(), 1);
    }
}
