//! Profile derivation: ordering survey points into a line and stationing
//! them along it.

use std::cmp::Ordering;

use crate::gis::{Feature, LineLayer, PointLayer};
use crate::geometry::{Point, Polyline};

/// Name under which a built line layer is registered.
pub const BUILT_LINE_LAYER: &str = "profile_line";

/// Sort direction for the line builder's order field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// User-input failures surfaced by a profile run.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("selected point list is empty")]
    EmptyPointSet,
    #[error("point layer coordinate system does not match line coordinate system")]
    CrsMismatch,
    #[error("expected exactly one line feature, found {count}")]
    LineSelection { count: usize },
    #[error("line geometry has fewer than two vertices")]
    DegenerateLine,
    #[error("feature is missing field '{field}'")]
    MissingField { field: String },
    #[error("field '{field}' has a non-numeric value")]
    NonNumericField { field: String },
    #[error("no data value must be numeric, got '{value}'")]
    NonNumericNoData { value: String },
}

/// Station/elevation/id triple produced by a run.
///
/// The three vectors always have equal length and index-aligned
/// correspondence; stations are non-decreasing. Rebuilt in full on every
/// run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProfileSeries {
    pub stations: Vec<f64>,
    pub elevations: Vec<f64>,
    pub point_ids: Vec<String>,
}

impl ProfileSeries {
    /// Number of profiled points.
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Returns `true` when the run produced no points.
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Iterator over `(station, elevation, id)` records.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, &str)> {
        self.stations
            .iter()
            .zip(&self.elevations)
            .zip(&self.point_ids)
            .map(|((&s, &z), id)| (s, z, id.as_str()))
    }

    fn push(&mut self, station: f64, elevation: f64, id: String) {
        self.stations.push(station);
        self.elevations.push(elevation);
        self.point_ids.push(id);
    }
}

/// Settings for the stationing engine.
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub z_field: String,
    pub id_field: String,
    /// Elevation sentinel meaning "no measurement"; matching records are
    /// dropped from the output.
    pub no_data: f64,
    /// Maximum perpendicular offset from the line; points beyond it are
    /// skipped. `None` keeps every point.
    pub buffer: Option<f64>,
    pub use_selected_points: bool,
    pub use_selected_line: bool,
}

fn numeric_attribute<T>(feature: &Feature<T>, field: &str) -> Result<f64, ProfileError> {
    let value = feature
        .attribute(field)
        .ok_or_else(|| ProfileError::MissingField {
            field: field.to_string(),
        })?;
    value.as_f64().ok_or_else(|| ProfileError::NonNumericField {
        field: field.to_string(),
    })
}

/// Builds a connected line by sorting the layer's points on `order_field`.
///
/// The sort is stable, so points with equal keys keep their layer order in
/// either direction. The result is a single-feature line layer in the point
/// layer's CRS, suitable for registration.
pub fn build_line(
    points: &PointLayer,
    order_field: &str,
    order: SortOrder,
    selected_only: bool,
) -> Result<LineLayer, ProfileError> {
    let active = points.active_features(selected_only);
    if active.is_empty() {
        return Err(ProfileError::EmptyPointSet);
    }
    let mut keyed: Vec<(f64, Point)> = Vec::with_capacity(active.len());
    for feature in active {
        let key = numeric_attribute(feature, order_field)?;
        keyed.push((key, feature.geometry.xy()));
    }
    keyed.sort_by(|a, b| match order {
        SortOrder::Ascending => a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal),
        SortOrder::Descending => b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal),
    });
    let vertices: Vec<Point> = keyed.into_iter().map(|(_, p)| p).collect();
    let mut layer = LineLayer::new(BUILT_LINE_LAYER, points.crs.clone());
    layer.add_feature(Feature::new(Polyline::new(vertices)));
    Ok(layer)
}

/// Stations every active point of `points` along the single active line of
/// `line` and assembles the sorted, no-data-filtered profile triple.
pub fn station_points(
    points: &PointLayer,
    line: &LineLayer,
    opts: &ProfileOptions,
) -> Result<ProfileSeries, ProfileError> {
    if points.crs != line.crs {
        return Err(ProfileError::CrsMismatch);
    }
    let line_features = line.active_features(opts.use_selected_line);
    if line_features.len() != 1 {
        return Err(ProfileError::LineSelection {
            count: line_features.len(),
        });
    }
    let polyline = &line_features[0].geometry;
    if polyline.vertices.len() < 2 {
        return Err(ProfileError::DegenerateLine);
    }

    let mut records: Vec<(f64, f64, String)> = Vec::new();
    for feature in points.active_features(opts.use_selected_points) {
        let pos = feature.geometry.xy();
        if let Some(buffer) = opts.buffer {
            let offset = polyline
                .offset_to(pos)
                .ok_or(ProfileError::DegenerateLine)?;
            if offset > buffer {
                continue;
            }
        }
        let station = polyline
            .station_of(pos)
            .ok_or(ProfileError::DegenerateLine)?;
        let elevation = numeric_attribute(feature, &opts.z_field)?;
        let id = feature
            .attribute(&opts.id_field)
            .ok_or_else(|| ProfileError::MissingField {
                field: opts.id_field.clone(),
            })?
            .to_string();
        records.push((station, elevation, id));
    }
    records.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut series = ProfileSeries::default();
    for (station, elevation, id) in records {
        if elevation != opts.no_data {
            series.push(station, elevation, id);
        }
    }
    Ok(series)
}

/// Where the reference line for a run comes from.
#[derive(Debug, Clone, Copy)]
pub enum LineSource<'a> {
    /// Build the line from the point layer itself.
    Build {
        order_field: &'a str,
        order: SortOrder,
    },
    /// Use an existing line layer.
    Layer(&'a LineLayer),
}

/// A run request as it arrives from a front end. The no-data sentinel is
/// kept as entered text and validated here.
#[derive(Debug, Clone)]
pub struct ProfileRequest {
    pub z_field: String,
    pub id_field: String,
    pub no_data: String,
    pub buffer: Option<f64>,
    pub use_selected_points: bool,
    pub use_selected_line: bool,
}

/// Outcome of a run: the profile triple, plus the built line layer when the
/// line was derived from the points (callers register it).
#[derive(Debug, Clone)]
pub struct ProfileRun {
    pub series: ProfileSeries,
    pub built_line: Option<LineLayer>,
}

/// Shared run entry point for the GUI and CLI front ends.
pub fn run_profile(
    points: &PointLayer,
    source: LineSource<'_>,
    request: &ProfileRequest,
) -> Result<ProfileRun, ProfileError> {
    let no_data: f64 =
        request
            .no_data
            .trim()
            .parse()
            .map_err(|_| ProfileError::NonNumericNoData {
                value: request.no_data.clone(),
            })?;
    let mut opts = ProfileOptions {
        z_field: request.z_field.clone(),
        id_field: request.id_field.clone(),
        no_data,
        buffer: request.buffer,
        use_selected_points: request.use_selected_points,
        use_selected_line: request.use_selected_line,
    };
    match source {
        LineSource::Build { order_field, order } => {
            let built = build_line(points, order_field, order, request.use_selected_points)?;
            // A freshly built layer carries no selection.
            opts.use_selected_line = false;
            let series = station_points(points, &built, &opts)?;
            Ok(ProfileRun {
                series,
                built_line: Some(built),
            })
        }
        LineSource::Layer(layer) => {
            let series = station_points(points, layer, &opts)?;
            Ok(ProfileRun {
                series,
                built_line: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geometry::Point3;
    use crate::gis::FieldValue;

    fn point_layer(data: &[(i64, f64, f64, f64, f64)]) -> PointLayer {
        let mut layer = PointLayer::new("survey", Crs::from_epsg(26914));
        for &(id, x, y, z, order) in data {
            let mut f = Feature::new(Point3::new(x, y, z));
            f.set_attribute("id", FieldValue::Integer(id));
            f.set_attribute("z", FieldValue::Real(z));
            f.set_attribute("order", FieldValue::Real(order));
            layer.add_feature(f);
        }
        layer
    }

    fn straight_line(crs: Crs) -> LineLayer {
        let mut layer = LineLayer::new("axis", crs);
        layer.add_feature(Feature::new(Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
        ])));
        layer
    }

    fn options() -> ProfileOptions {
        ProfileOptions {
            z_field: "z".to_string(),
            id_field: "id".to_string(),
            no_data: -99999.0,
            buffer: None,
            use_selected_points: false,
            use_selected_line: false,
        }
    }

    #[test]
    fn build_line_sorts_on_field() {
        let layer = point_layer(&[
            (1, 5.0, 0.0, 10.0, 2.0),
            (2, 0.0, 0.0, 11.0, 1.0),
            (3, 9.0, 0.0, 12.0, 3.0),
        ]);
        let built = build_line(&layer, "order", SortOrder::Ascending, false).unwrap();
        let vertices = &built.features().next().unwrap().geometry.vertices;
        let xs: Vec<f64> = vertices.iter().map(|v| v.x).collect();
        assert_eq!(xs, vec![0.0, 5.0, 9.0]);

        let built = build_line(&layer, "order", SortOrder::Descending, false).unwrap();
        let vertices = &built.features().next().unwrap().geometry.vertices;
        let xs: Vec<f64> = vertices.iter().map(|v| v.x).collect();
        assert_eq!(xs, vec![9.0, 5.0, 0.0]);
    }

    #[test]
    fn build_line_rejects_empty_input() {
        let layer = point_layer(&[]);
        assert!(matches!(
            build_line(&layer, "order", SortOrder::Ascending, false),
            Err(ProfileError::EmptyPointSet)
        ));

        let layer = point_layer(&[(1, 0.0, 0.0, 10.0, 1.0)]);
        // Selected-only with nothing selected is an empty input too.
        assert!(matches!(
            build_line(&layer, "order", SortOrder::Ascending, true),
            Err(ProfileError::EmptyPointSet)
        ));
    }

    #[test]
    fn build_line_reports_bad_fields() {
        let mut layer = point_layer(&[(1, 0.0, 0.0, 10.0, 1.0)]);
        assert!(matches!(
            build_line(&layer, "missing", SortOrder::Ascending, false),
            Err(ProfileError::MissingField { .. })
        ));
        let mut f = Feature::new(Point3::new(1.0, 0.0, 10.0));
        f.set_attribute("order", FieldValue::Text("west".into()));
        layer.add_feature(f);
        assert!(matches!(
            build_line(&layer, "order", SortOrder::Ascending, false),
            Err(ProfileError::NonNumericField { .. })
        ));
    }

    #[test]
    fn stations_sorted_and_aligned() {
        let layer = point_layer(&[
            (1, 80.0, 2.0, 12.0, 1.0),
            (2, 10.0, -3.0, 10.0, 2.0),
            (3, 40.0, 1.0, 11.0, 3.0),
        ]);
        let line = straight_line(Crs::from_epsg(26914));
        let series = station_points(&layer, &line, &options()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.stations.len(), series.elevations.len());
        assert_eq!(series.stations.len(), series.point_ids.len());
        assert!(series.stations.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(series.point_ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn no_data_points_are_dropped() {
        let layer = point_layer(&[
            (1, 10.0, 0.0, 10.0, 1.0),
            (2, 20.0, 0.0, -99999.0, 2.0),
            (3, 30.0, 0.0, 11.0, 3.0),
        ]);
        let line = straight_line(Crs::from_epsg(26914));
        let series = station_points(&layer, &line, &options()).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.elevations.iter().all(|&z| z != -99999.0));
        assert_eq!(series.point_ids, vec!["1", "3"]);
    }

    #[test]
    fn buffer_filters_far_points() {
        let layer = point_layer(&[
            (1, 10.0, 1.0, 10.0, 1.0),
            (2, 20.0, 50.0, 11.0, 2.0),
            (3, 30.0, -2.0, 12.0, 3.0),
        ]);
        let line = straight_line(Crs::from_epsg(26914));
        let unbuffered = station_points(&layer, &line, &options()).unwrap();
        let mut opts = options();
        opts.buffer = Some(5.0);
        let buffered = station_points(&layer, &line, &opts).unwrap();
        assert!(buffered.len() <= unbuffered.len());
        assert_eq!(buffered.point_ids, vec!["1", "3"]);
        for (station, _, _) in buffered.iter() {
            assert!(station >= 0.0);
        }
        // Every surviving point lies within the buffer of the line.
        let polyline = &line.features().next().unwrap().geometry;
        for feature in layer.features() {
            let off = polyline.offset_to(feature.geometry.xy()).unwrap();
            let id = feature.attribute("id").unwrap().to_string();
            assert_eq!(buffered.point_ids.contains(&id), off <= 5.0);
        }
    }

    #[test]
    fn line_cardinality_is_enforced() {
        let layer = point_layer(&[(1, 10.0, 0.0, 10.0, 1.0)]);
        let mut line = LineLayer::new("axis", Crs::from_epsg(26914));
        assert!(matches!(
            station_points(&layer, &line, &options()),
            Err(ProfileError::LineSelection { count: 0 })
        ));
        line.add_feature(Feature::new(Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
        ])));
        line.add_feature(Feature::new(Polyline::new(vec![
            Point::new(0.0, 10.0),
            Point::new(100.0, 10.0),
        ])));
        assert!(matches!(
            station_points(&layer, &line, &options()),
            Err(ProfileError::LineSelection { count: 2 })
        ));
        // Selecting one feature resolves the ambiguity.
        line.select(&[0]);
        let mut opts = options();
        opts.use_selected_line = true;
        assert!(station_points(&layer, &line, &opts).is_ok());
    }

    #[test]
    fn crs_mismatch_aborts() {
        let layer = point_layer(&[(1, 10.0, 0.0, 10.0, 1.0)]);
        let line = straight_line(Crs::from_epsg(4326));
        assert!(matches!(
            station_points(&layer, &line, &options()),
            Err(ProfileError::CrsMismatch)
        ));
    }

    #[test]
    fn degenerate_line_aborts() {
        let layer = point_layer(&[(1, 10.0, 0.0, 10.0, 1.0)]);
        let mut line = LineLayer::new("axis", Crs::from_epsg(26914));
        line.add_feature(Feature::new(Polyline::new(vec![Point::new(0.0, 0.0)])));
        assert!(matches!(
            station_points(&layer, &line, &options()),
            Err(ProfileError::DegenerateLine)
        ));
    }

    fn request() -> ProfileRequest {
        ProfileRequest {
            z_field: "z".to_string(),
            id_field: "id".to_string(),
            no_data: "-99999".to_string(),
            buffer: None,
            use_selected_points: false,
            use_selected_line: false,
        }
    }

    #[test]
    fn run_profile_builds_line_when_asked() {
        let layer = point_layer(&[
            (1, 0.0, 0.0, 10.0, 1.0),
            (2, 10.0, 0.0, 11.0, 2.0),
            (3, 20.0, 0.0, 12.0, 3.0),
        ]);
        let source = LineSource::Build {
            order_field: "order",
            order: SortOrder::Ascending,
        };
        let run = run_profile(&layer, source, &request()).unwrap();
        let built = run.built_line.unwrap();
        assert_eq!(built.name, BUILT_LINE_LAYER);
        assert_eq!(run.series.len(), 3);
        assert_eq!(run.series.stations, vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn run_profile_rejects_non_numeric_no_data() {
        let layer = point_layer(&[(1, 0.0, 0.0, 10.0, 1.0)]);
        let line = straight_line(Crs::from_epsg(26914));
        let mut req = request();
        req.no_data = "none".to_string();
        assert!(matches!(
            run_profile(&layer, LineSource::Layer(&line), &req),
            Err(ProfileError::NonNumericNoData { .. })
        ));
    }

    #[test]
    fn run_profile_respects_point_selection() {
        let mut layer = point_layer(&[
            (1, 10.0, 0.0, 10.0, 1.0),
            (2, 20.0, 0.0, 11.0, 2.0),
            (3, 30.0, 0.0, 12.0, 3.0),
        ]);
        layer.select(&[0, 2]);
        let line = straight_line(Crs::from_epsg(26914));
        let mut req = request();
        req.use_selected_points = true;
        let run = run_profile(&layer, LineSource::Layer(&line), &req).unwrap();
        assert_eq!(run.series.point_ids, vec!["1", "3"]);
    }
}
