//! Coordinate reference system handling built on top of the `proj` crate.

use proj::Proj;

/// Representation of a coordinate reference system.
///
/// A CRS is stored as a definition string which can be an EPSG identifier
/// (`"EPSG:26914"`), a Proj4 definition or a WKT definition. Equality is
/// definition equality, which is how layer CRS mismatches are detected
/// before a profile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs {
    definition: String,
    epsg: Option<u32>,
}

impl Crs {
    /// Creates a new CRS from the given EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        Self {
            definition: format!("EPSG:{}", code),
            epsg: Some(code),
        }
    }

    /// Creates a CRS from a Proj4 definition string.
    pub fn from_proj4(definition: &str) -> Self {
        Self {
            definition: definition.to_string(),
            epsg: None,
        }
    }

    /// Creates a CRS from a WKT definition string.
    pub fn from_wkt(definition: &str) -> Self {
        Self {
            definition: definition.to_string(),
            epsg: None,
        }
    }

    /// Returns the EPSG code for this CRS, if available.
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Returns the underlying definition string.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Common global CRS definition: WGS84 (EPSG:4326).
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Transforms an `(x, y)` coordinate from this CRS to the target CRS.
    pub fn transform_point(&self, target: &Crs, x: f64, y: f64) -> Option<(f64, f64)> {
        let proj = Proj::new_known_crs(&self.definition, &target.definition, None).ok()?;
        proj.convert((x, y)).ok()
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_definition() {
        let crs = Crs::from_epsg(26914);
        assert_eq!(crs.definition(), "EPSG:26914");
        assert_eq!(crs.epsg(), Some(26914));
    }

    #[test]
    fn equality_is_definition_equality() {
        assert_eq!(Crs::from_epsg(4326), Crs::wgs84());
        assert_ne!(Crs::from_epsg(4326), Crs::from_epsg(3857));
    }

    #[test]
    fn wgs84_to_web_mercator() {
        let wgs84 = Crs::wgs84();
        let webm = Crs::from_epsg(3857);
        let (x, y) = wgs84.transform_point(&webm, 0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }
}
