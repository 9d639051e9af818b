//! Planar geometry primitives for profile derivation.

mod line;
pub use line::Line;

/// Representation of a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Representation of a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the horizontal position, dropping the elevation.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy)]
struct Projection {
    station: f64,
    point: Point,
    offset: f64,
}

/// Representation of a series of connected line segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub vertices: Vec<Point>,
}

impl Polyline {
    /// Creates a new polyline from a list of vertices.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Returns the total length of all segments in the polyline.
    pub fn length(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|pair| distance(pair[0], pair[1]))
            .sum()
    }

    fn project(&self, p: Point) -> Option<Projection> {
        if self.vertices.len() < 2 {
            return None;
        }
        let mut best: Option<Projection> = None;
        let mut travelled = 0.0;
        for pair in self.vertices.windows(2) {
            let seg = Line::new(pair[0], pair[1]);
            let len = seg.length();
            // Zero-length segments carry no stationing information.
            if len > f64::EPSILON {
                let near = seg.nearest_point(p);
                let offset = distance(p, near);
                let station = travelled + distance(pair[0], near);
                if best.map(|b| offset < b.offset).unwrap_or(true) {
                    best = Some(Projection {
                        station,
                        point: near,
                        offset,
                    });
                }
            }
            travelled += len;
        }
        best
    }

    /// Returns the linear-referenced distance along the polyline at which the
    /// perpendicular projection of `p` falls.
    ///
    /// Points beyond either end clamp to the nearest end station. Returns
    /// `None` when the polyline has fewer than two vertices.
    pub fn station_of(&self, p: Point) -> Option<f64> {
        self.project(p).map(|proj| proj.station)
    }

    /// Returns the point on the polyline closest to `p`.
    pub fn nearest_point(&self, p: Point) -> Option<Point> {
        self.project(p).map(|proj| proj.point)
    }

    /// Returns the perpendicular distance from `p` to the polyline.
    pub fn offset_to(&self, p: Point) -> Option<f64> {
        self.project(p).map(|proj| proj.offset)
    }

    /// Returns the position at the given station along the polyline.
    pub fn point_at(&self, station: f64) -> Option<Point> {
        if self.vertices.len() < 2 || station < 0.0 || station > self.length() {
            return None;
        }
        let mut remaining = station;
        for pair in self.vertices.windows(2) {
            let len = distance(pair[0], pair[1]);
            if remaining <= len {
                let t = if len < f64::EPSILON {
                    0.0
                } else {
                    remaining / len
                };
                return Some(Point::new(
                    pair[0].x + t * (pair[1].x - pair[0].x),
                    pair[0].y + t * (pair[1].y - pair[0].y),
                ));
            }
            remaining -= len;
        }
        self.vertices.last().copied()
    }
}
