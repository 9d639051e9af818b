//! Text export of profile results for the clipboard and for files.

use crate::profile::ProfileSeries;

/// Formats a profile as tab-separated text ready for the clipboard.
///
/// With a header the output carries all three columns; without one it
/// carries distance and elevation only.
pub fn profile_tsv(series: &ProfileSeries, with_header: bool) -> String {
    let mut out = String::new();
    if with_header {
        out.push_str("distance\televation\tpointID\n");
        for (station, elevation, id) in series.iter() {
            out.push_str(&format!("{}\t{}\t{}\n", station, elevation, id));
        }
    } else {
        for (station, elevation, _) in series.iter() {
            out.push_str(&format!("{}\t{}\n", station, elevation));
        }
    }
    out
}

/// Writes a profile as CSV with a header row.
pub fn write_profile_csv(path: &str, series: &ProfileSeries) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "distance,elevation,pointID")?;
    for (station, elevation, id) in series.iter() {
        writeln!(file, "{},{},{}", station, elevation, id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> ProfileSeries {
        ProfileSeries {
            stations: vec![0.0, 12.5, 30.0],
            elevations: vec![100.0, 101.25, 99.5],
            point_ids: vec!["1".to_string(), "2".to_string(), "7".to_string()],
        }
    }

    #[test]
    fn tsv_with_header_has_three_columns() {
        let text = profile_tsv(&series(), true);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("distance\televation\tpointID"));
        assert_eq!(lines.next(), Some("0\t100\t1"));
        assert_eq!(lines.next(), Some("12.5\t101.25\t2"));
        assert_eq!(lines.next(), Some("30\t99.5\t7"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn tsv_without_header_drops_ids() {
        let text = profile_tsv(&series(), false);
        assert_eq!(text, "0\t100\n12.5\t101.25\n30\t99.5\n");
    }

    #[test]
    fn empty_series_formats_to_header_or_nothing() {
        let empty = ProfileSeries::default();
        assert_eq!(profile_tsv(&empty, true), "distance\televation\tpointID\n");
        assert_eq!(profile_tsv(&empty, false), "");
    }

    #[test]
    fn csv_round_trips_through_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("profile.csv");
        write_profile_csv(path.to_str().unwrap(), &series()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("distance,elevation,pointID\n"));
        assert_eq!(text.lines().count(), 4);
    }
}
