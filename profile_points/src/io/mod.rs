//! File input and output for point and line layers.
//!
//! Readers accept CSV and GeoJSON. Malformed rows are reported as
//! `InvalidData` errors carrying a 1-based line number.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use geo_types::Geometry;
use geojson::GeoJson;

use crate::crs::Crs;
use crate::geometry::{Point, Point3, Polyline};
use crate::gis::{Feature, FieldValue, LineLayer, PointLayer};

/// Reads a file into a vector of lines.
pub fn read_lines(path: &str) -> io::Result<Vec<String>> {
    Ok(read_to_string(path)?.lines().map(|l| l.to_string()).collect())
}

/// Reads a file to string.
pub fn read_to_string(path: &str) -> io::Result<String> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Writes a string to a file, replacing any previous content.
pub fn write_string(path: &str, contents: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())
}

fn layer_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string()
}

fn layer_crs(epsg: Option<u32>) -> Crs {
    epsg.map(Crs::from_epsg).unwrap_or_default()
}

fn invalid(line: usize, msg: impl std::fmt::Display) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line {}: {}", line, msg),
    )
}

/// Reads a point layer from a CSV file of `id,x,y,z[,desc]` rows.
///
/// The id is stored as an integer attribute when it parses as one and as
/// text otherwise; `z` is duplicated into a numeric attribute so it can be
/// picked as an elevation field.
pub fn read_point_layer_csv(path: &str, epsg: Option<u32>) -> io::Result<PointLayer> {
    let lines = read_lines(path)?;
    let mut layer = PointLayer::new(layer_name(path), layer_crs(epsg));
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 4 {
            return Err(invalid(idx + 1, "expected id,x,y,z"));
        }
        let x: f64 = parts[1].trim().parse().map_err(|e| invalid(idx + 1, e))?;
        let y: f64 = parts[2].trim().parse().map_err(|e| invalid(idx + 1, e))?;
        let z: f64 = parts[3].trim().parse().map_err(|e| invalid(idx + 1, e))?;
        let mut feature = Feature::new(Point3::new(x, y, z));
        let id = parts[0].trim();
        match id.parse::<i64>() {
            Ok(n) => feature.set_attribute("id", FieldValue::Integer(n)),
            Err(_) => feature.set_attribute("id", FieldValue::Text(id.to_string())),
        }
        feature.set_attribute("z", FieldValue::Real(z));
        if parts.len() > 4 {
            feature.set_attribute("desc", FieldValue::Text(parts[4..].join(",")));
        }
        layer.add_feature(feature);
    }
    Ok(layer)
}

fn property_value(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(FieldValue::Integer(i))
            } else {
                n.as_f64().map(FieldValue::Real)
            }
        }
        serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn parse_geojson(path: &str) -> io::Result<geojson::FeatureCollection> {
    let text = read_to_string(path)?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}", e)))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "expected a FeatureCollection",
        )),
    }
}

/// Reads a point layer from a GeoJSON FeatureCollection.
///
/// Feature properties become attributes; a third coordinate, when present,
/// becomes the elevation and is also exposed as a `z` attribute unless the
/// properties already carry one. Non-point geometries are skipped.
pub fn read_point_layer_geojson(path: &str, epsg: Option<u32>) -> io::Result<PointLayer> {
    let fc = parse_geojson(path)?;
    let mut layer = PointLayer::new(layer_name(path), layer_crs(epsg));
    for gj_feature in fc.features {
        let Some(geometry) = &gj_feature.geometry else {
            continue;
        };
        let geojson::Value::Point(coords) = &geometry.value else {
            log::warn!("skipping non-point geometry in {}", path);
            continue;
        };
        if coords.len() < 2 {
            continue;
        }
        let z = coords.get(2).copied().unwrap_or(0.0);
        let mut feature = Feature::new(Point3::new(coords[0], coords[1], z));
        if let Some(props) = &gj_feature.properties {
            for (name, value) in props {
                if let Some(v) = property_value(value) {
                    feature.set_attribute(name, v);
                }
            }
        }
        if feature.attribute("z").is_none() {
            feature.set_attribute("z", FieldValue::Real(z));
        }
        layer.add_feature(feature);
    }
    Ok(layer)
}

/// Reads a line layer from a CSV file of `x,y` rows where a blank line
/// separates polylines.
pub fn read_line_layer_csv(path: &str, epsg: Option<u32>) -> io::Result<LineLayer> {
    let lines = read_lines(path)?;
    let mut layer = LineLayer::new(layer_name(path), layer_crs(epsg));
    let mut current: Vec<Point> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            if current.len() >= 2 {
                layer.add_feature(Feature::new(Polyline::new(std::mem::take(&mut current))));
            } else if !current.is_empty() {
                return Err(invalid(idx + 1, "polyline has less than 2 points"));
            }
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 2 {
            return Err(invalid(idx + 1, "expected x,y"));
        }
        let x: f64 = parts[0].trim().parse().map_err(|e| invalid(idx + 1, e))?;
        let y: f64 = parts[1].trim().parse().map_err(|e| invalid(idx + 1, e))?;
        current.push(Point::new(x, y));
    }
    if !current.is_empty() {
        if current.len() >= 2 {
            layer.add_feature(Feature::new(Polyline::new(current)));
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "final polyline has less than 2 points",
            ));
        }
    }
    Ok(layer)
}

/// Reads a line layer from a GeoJSON FeatureCollection.
///
/// `LineString` features map one-to-one; for a `MultiLineString` only the
/// first part is kept. Other geometries are skipped.
pub fn read_line_layer_geojson(path: &str, epsg: Option<u32>) -> io::Result<LineLayer> {
    let fc = parse_geojson(path)?;
    let mut layer = LineLayer::new(layer_name(path), layer_crs(epsg));
    for gj_feature in fc.features {
        let Some(geometry) = gj_feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}", e)))?;
        let line_string = match geometry {
            Geometry::LineString(ls) => Some(ls),
            Geometry::MultiLineString(mls) => mls.0.into_iter().next(),
            _ => None,
        };
        let Some(line_string) = line_string else {
            log::warn!("skipping non-line geometry in {}", path);
            continue;
        };
        let vertices: Vec<Point> = line_string
            .0
            .iter()
            .map(|c| Point::new(c.x, c.y))
            .collect();
        let mut feature = Feature::new(Polyline::new(vertices));
        if let Some(props) = &gj_feature.properties {
            for (name, value) in props {
                if let Some(v) = property_value(value) {
                    feature.set_attribute(name, v);
                }
            }
        }
        layer.add_feature(feature);
    }
    Ok(layer)
}

/// Writes a line layer as CSV, one `x,y` row per vertex with a blank line
/// between features.
pub fn write_line_csv(path: &str, layer: &LineLayer) -> io::Result<()> {
    let mut file = File::create(path)?;
    let count = layer.feature_count();
    for (i, feature) in layer.features().enumerate() {
        for v in &feature.geometry.vertices {
            writeln!(file, "{},{}", v.x, v.y)?;
        }
        if i + 1 < count {
            writeln!(file)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn point_csv_reads_fields() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("survey.csv");
        file.write_str("1,100.0,200.0,55.5,iron pin\n2,110.0,210.0,56.0\nBM1,120.0,220.0,57.2\n")
            .unwrap();
        let layer = read_point_layer_csv(file.path().to_str().unwrap(), Some(26914)).unwrap();
        assert_eq!(layer.name, "survey");
        assert_eq!(layer.crs, Crs::from_epsg(26914));
        assert_eq!(layer.feature_count(), 3);
        let first = layer.features().next().unwrap();
        assert_eq!(first.attribute("id"), Some(&FieldValue::Integer(1)));
        assert_eq!(first.attribute("z"), Some(&FieldValue::Real(55.5)));
        assert_eq!(
            first.attribute("desc"),
            Some(&FieldValue::Text("iron pin".to_string()))
        );
        let last = layer.features().last().unwrap();
        assert_eq!(
            last.attribute("id"),
            Some(&FieldValue::Text("BM1".to_string()))
        );
    }

    #[test]
    fn point_csv_reports_line_numbers() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("bad.csv");
        file.write_str("1,0.0,0.0,10.0\n2,oops,0.0,11.0\n").unwrap();
        let err = read_point_layer_csv(file.path().to_str().unwrap(), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(predicate::str::contains("line 2").eval(&err.to_string()));
    }

    #[test]
    fn point_geojson_reads_properties_and_z() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("points.geojson");
        file.write_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[100.0,200.0,55.5]},
                 "properties":{"id":1,"desc":"pin"}},
                {"type":"Feature","geometry":{"type":"Point","coordinates":[110.0,210.0]},
                 "properties":{"id":2,"z":56.0}}
            ]}"#,
        )
        .unwrap();
        let layer = read_point_layer_geojson(file.path().to_str().unwrap(), None).unwrap();
        assert_eq!(layer.feature_count(), 2);
        let mut features = layer.features();
        let first = features.next().unwrap();
        assert_eq!(first.geometry.z, 55.5);
        assert_eq!(first.attribute("z"), Some(&FieldValue::Real(55.5)));
        assert_eq!(first.attribute("id"), Some(&FieldValue::Integer(1)));
        let second = features.next().unwrap();
        assert_eq!(second.attribute("z"), Some(&FieldValue::Real(56.0)));
    }

    #[test]
    fn line_csv_round_trip() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("axis.csv");
        file.write_str("0.0,0.0\n100.0,0.0\n100.0,50.0\n\n0.0,10.0\n50.0,10.0\n")
            .unwrap();
        let layer = read_line_layer_csv(file.path().to_str().unwrap(), None).unwrap();
        assert_eq!(layer.feature_count(), 2);
        let out = dir.child("out.csv");
        write_line_csv(out.path().to_str().unwrap(), &layer).unwrap();
        let again = read_line_layer_csv(out.path().to_str().unwrap(), None).unwrap();
        assert_eq!(again.feature_count(), 2);
        assert_eq!(
            again.features().next().unwrap().geometry.vertices.len(),
            3
        );
    }

    #[test]
    fn line_csv_rejects_single_point_run() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("axis.csv");
        file.write_str("0.0,0.0\n").unwrap();
        let err = read_line_layer_csv(file.path().to_str().unwrap(), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn line_geojson_takes_first_multiline_part() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("axis.geojson");
        file.write_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"MultiLineString",
                 "coordinates":[[[0.0,0.0],[50.0,0.0]],[[0.0,9.0],[9.0,9.0]]]},
                 "properties":null}
            ]}"#,
        )
        .unwrap();
        let layer = read_line_layer_geojson(file.path().to_str().unwrap(), None).unwrap();
        assert_eq!(layer.feature_count(), 1);
        let pl = &layer.features().next().unwrap().geometry;
        assert_eq!(pl.vertices.len(), 2);
        assert!((pl.vertices[1].x - 50.0).abs() < 1e-9);
    }
}
