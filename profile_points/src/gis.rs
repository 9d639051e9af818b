//! In-memory vector layer and feature model.
//!
//! Stands in for a host GIS layer API: features carry arbitrary typed
//! attributes next to their geometry, layers carry a CRS and an optional
//! selection, and a registry tracks layers by name.

use std::collections::{BTreeMap, HashMap};

use crate::crs::Crs;
use crate::geometry::{Point3, Polyline};

/// Typed attribute value stored on a feature.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Attribute type used when enumerating fields for selector population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
}

impl FieldValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Real(_) => FieldKind::Real,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    /// Numeric coercion. Text values parse if they hold a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Wrapper linking geometry with GIS attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<T> {
    /// Arbitrary attribute key/value pairs.
    pub attributes: BTreeMap<String, FieldValue>,
    /// Underlying geometry.
    pub geometry: T,
}

impl<T> Feature<T> {
    /// Creates a new feature with empty attributes.
    pub fn new(geometry: T) -> Self {
        Self {
            attributes: BTreeMap::new(),
            geometry,
        }
    }

    /// Looks up an attribute by field name.
    pub fn attribute(&self, field: &str) -> Option<&FieldValue> {
        self.attributes.get(field)
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, field: &str, value: FieldValue) {
        self.attributes.insert(field.to_string(), value);
    }
}

/// A named collection of features sharing a CRS, with an optional selection.
#[derive(Debug, Clone)]
pub struct VectorLayer<T> {
    pub name: String,
    pub crs: Crs,
    features: Vec<Feature<T>>,
    selected: Vec<usize>,
}

/// Layer of 3D survey points.
pub type PointLayer = VectorLayer<Point3>;
/// Layer of polyline features.
pub type LineLayer = VectorLayer<Polyline>;

impl<T> VectorLayer<T> {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>, crs: Crs) -> Self {
        Self {
            name: name.into(),
            crs,
            features: Vec::new(),
            selected: Vec::new(),
        }
    }

    /// Adds a feature and returns its index.
    pub fn add_feature(&mut self, feature: Feature<T>) -> usize {
        self.features.push(feature);
        self.features.len() - 1
    }

    /// Number of features in the layer.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Number of selected features.
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Replaces the selection. Out-of-range indices are ignored and
    /// duplicates collapse to one entry.
    pub fn select(&mut self, indices: &[usize]) {
        let mut sel: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.features.len())
            .collect();
        sel.sort_unstable();
        sel.dedup();
        self.selected = sel;
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Iterator over all features.
    pub fn features(&self) -> impl Iterator<Item = &Feature<T>> {
        self.features.iter()
    }

    /// Features participating in a run: the selection when `selected_only`
    /// is set, otherwise every feature.
    pub fn active_features(&self, selected_only: bool) -> Vec<&Feature<T>> {
        if selected_only {
            self.selected
                .iter()
                .filter_map(|&i| self.features.get(i))
                .collect()
        } else {
            self.features.iter().collect()
        }
    }

    /// Returns the sorted field names whose values all match one of `kinds`.
    ///
    /// A field qualifies when it appears on at least one feature and every
    /// occurrence has an accepted kind.
    pub fn field_names(&self, kinds: &[FieldKind]) -> Vec<String> {
        let mut accepted: BTreeMap<&str, bool> = BTreeMap::new();
        for feature in &self.features {
            for (name, value) in &feature.attributes {
                let ok = kinds.contains(&value.kind());
                accepted
                    .entry(name.as_str())
                    .and_modify(|a| *a &= ok)
                    .or_insert(ok);
            }
        }
        accepted
            .into_iter()
            .filter_map(|(name, ok)| ok.then(|| name.to_string()))
            .collect()
    }
}

/// Named in-memory store for point and line layers.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    point_layers: HashMap<String, PointLayer>,
    line_layers: HashMap<String, LineLayer>,
}

impl LayerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a point layer under its own name.
    pub fn add_point_layer(&mut self, layer: PointLayer) {
        self.point_layers.insert(layer.name.clone(), layer);
    }

    /// Adds or replaces a line layer under its own name.
    pub fn add_line_layer(&mut self, layer: LineLayer) {
        self.line_layers.insert(layer.name.clone(), layer);
    }

    /// Retrieves a point layer by name.
    pub fn point_layer(&self, name: &str) -> Option<&PointLayer> {
        self.point_layers.get(name)
    }

    /// Retrieves a line layer by name.
    pub fn line_layer(&self, name: &str) -> Option<&LineLayer> {
        self.line_layers.get(name)
    }

    /// Sorted names of all point layers.
    pub fn point_layer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.point_layers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted names of all line layers.
    pub fn line_layer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.line_layers.keys().cloned().collect();
        names.sort();
        names
    }
}
