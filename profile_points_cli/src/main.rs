use clap::{Parser, Subcommand};
use std::io;

use profile_points::export::{profile_tsv, write_profile_csv};
use profile_points::geometry::Point;
use profile_points::gis::{LineLayer, PointLayer};
use profile_points::io::{
    read_line_layer_csv, read_line_layer_geojson, read_point_layer_csv, read_point_layer_geojson,
    write_line_csv, write_string,
};
use profile_points::profile::{
    build_line, run_profile, LineSource, ProfileRequest, ProfileSeries, SortOrder,
};

fn is_geojson(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".geojson") || lower.ends_with(".json")
}

fn read_point_layer(path: &str, epsg: u32) -> io::Result<PointLayer> {
    if is_geojson(path) {
        read_point_layer_geojson(path, Some(epsg))
    } else {
        read_point_layer_csv(path, Some(epsg))
    }
}

fn read_line_layer(path: &str, epsg: u32) -> io::Result<LineLayer> {
    if is_geojson(path) {
        read_line_layer_geojson(path, Some(epsg))
    } else {
        read_line_layer_csv(path, Some(epsg))
    }
}

fn parse_selection(list: &str) -> Result<Vec<usize>, String> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid selection index '{}': {}", s.trim(), e))
        })
        .collect()
}

fn plot_ranges(series: &ProfileSeries) -> ((f64, f64), (f64, f64)) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (station, elevation, _) in series.iter() {
        x_min = x_min.min(station);
        x_max = x_max.max(station);
        y_min = y_min.min(elevation);
        y_max = y_max.max(elevation);
    }
    // Degenerate ranges render as a flat band.
    if x_max - x_min < 1e-9 {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if y_max - y_min < 1e-9 {
        y_min -= 1.0;
        y_max += 1.0;
    }
    ((x_min, x_max), (y_min, y_max))
}

fn draw_profile<DB: plotters::prelude::DrawingBackend>(
    root: plotters::drawing::DrawingArea<DB, plotters::coord::Shift>,
    series: &ProfileSeries,
    labels: bool,
) -> Result<(), String> {
    use plotters::prelude::*;

    root.fill(&WHITE).map_err(|e| e.to_string())?;
    if series.is_empty() {
        return root.present().map_err(|e| e.to_string());
    }
    let ((x_min, x_max), (y_min, y_max)) = plot_ranges(series);
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| e.to_string())?;
    chart
        .configure_mesh()
        .x_desc("Station, layer units")
        .y_desc("Elevation, z field units")
        .draw()
        .map_err(|e| e.to_string())?;
    chart
        .draw_series(LineSeries::new(
            series.iter().map(|(s, z, _)| (s, z)),
            &BLUE,
        ))
        .map_err(|e| e.to_string())?;
    chart
        .draw_series(
            series
                .iter()
                .map(|(s, z, _)| Circle::new((s, z), 3, BLUE.filled())),
        )
        .map_err(|e| e.to_string())?;
    if labels {
        chart
            .draw_series(series.iter().map(|(s, z, id)| {
                Text::new(id.to_string(), (s, z), ("sans-serif", 12))
            }))
            .map_err(|e| e.to_string())?;
    }
    root.present().map_err(|e| e.to_string())?;
    Ok(())
}

fn render_png(path: &str, series: &ProfileSeries, labels: bool) -> Result<(), String> {
    use plotters::prelude::*;
    draw_profile(
        BitMapBackend::new(path, (900, 600)).into_drawing_area(),
        series,
        labels,
    )
}

fn render_svg(path: &str, series: &ProfileSeries, labels: bool) -> Result<(), String> {
    use plotters::prelude::*;
    draw_profile(
        SVGBackend::new(path, (900, 600)).into_drawing_area(),
        series,
        labels,
    )
}

/// Command line interface for deriving elevation profiles from survey
/// points.
#[derive(Parser)]
#[command(name = "profile_points_cli", version)]
struct Cli {
    /// EPSG code for the working coordinate system
    #[arg(long, default_value_t = 4326, global = true)]
    epsg: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a station/elevation profile from a point file.
    Profile {
        /// Point layer file (CSV or GeoJSON).
        points: String,
        /// Line layer file; omit to build the line from the points.
        #[arg(long, conflicts_with = "order_field")]
        line: Option<String>,
        /// Order field used to build the line from the points.
        #[arg(long)]
        order_field: Option<String>,
        /// Sort the order field descending when building the line.
        #[arg(long)]
        descending: bool,
        /// Field holding elevations.
        #[arg(long, default_value = "z")]
        z_field: String,
        /// Field holding point identifiers.
        #[arg(long, default_value = "id")]
        id_field: String,
        /// Elevation value meaning "no measurement".
        #[arg(long, default_value = "-99999")]
        no_data: String,
        /// Keep only points within this perpendicular distance of the line.
        #[arg(long)]
        buffer: Option<f64>,
        /// Restrict the run to these feature indices (comma separated).
        #[arg(long)]
        selected: Option<String>,
        /// Output file; `-` prints tab-separated text to stdout, a `.csv`
        /// path writes CSV.
        #[arg(short, long, default_value = "-")]
        output: String,
        /// Omit the header row (tab-separated output then carries only
        /// distance and elevation).
        #[arg(long)]
        no_header: bool,
        /// Render the profile to a PNG file.
        #[arg(long)]
        png: Option<String>,
        /// Render the profile to an SVG file.
        #[arg(long)]
        svg: Option<String>,
        /// Annotate plot points with their identifiers.
        #[arg(long)]
        labels: bool,
    },
    /// Build a line by sorting a point file on a field and write its
    /// vertices as CSV.
    BuildLine {
        points: String,
        #[arg(long)]
        order_field: String,
        #[arg(long)]
        descending: bool,
        output: String,
    },
    /// Print the station and perpendicular offset of a single position
    /// along a line file.
    Station { line: String, x: f64, y: f64 },
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Profile {
            points,
            line,
            order_field,
            descending,
            z_field,
            id_field,
            no_data,
            buffer,
            selected,
            output,
            no_header,
            png,
            svg,
            labels,
        } => {
            let mut point_layer = match read_point_layer(&points, cli.epsg) {
                Ok(layer) => layer,
                Err(e) => fail(format!("reading {}: {}", points, e)),
            };
            let use_selected = selected.is_some();
            if let Some(list) = &selected {
                match parse_selection(list) {
                    Ok(indices) => point_layer.select(&indices),
                    Err(e) => fail(e),
                }
            }
            let line_layer = match &line {
                Some(path) => match read_line_layer(path, cli.epsg) {
                    Ok(layer) => Some(layer),
                    Err(e) => fail(format!("reading {}: {}", path, e)),
                },
                None => None,
            };
            let order = if descending {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            let source = match (&line_layer, &order_field) {
                (Some(layer), _) => LineSource::Layer(layer),
                (None, Some(field)) => LineSource::Build {
                    order_field: field.as_str(),
                    order,
                },
                (None, None) => fail("either --line or --order-field is required"),
            };
            let request = ProfileRequest {
                z_field,
                id_field,
                no_data,
                buffer,
                use_selected_points: use_selected,
                use_selected_line: false,
            };
            let run = match run_profile(&point_layer, source, &request) {
                Ok(run) => run,
                Err(e) => fail(e),
            };
            if output == "-" {
                print!("{}", profile_tsv(&run.series, !no_header));
            } else if output.to_ascii_lowercase().ends_with(".csv") {
                if let Err(e) = write_profile_csv(&output, &run.series) {
                    fail(format!("writing {}: {}", output, e));
                }
                println!("Wrote {}", output);
            } else {
                if let Err(e) = write_string(&output, &profile_tsv(&run.series, !no_header)) {
                    fail(format!("writing {}: {}", output, e));
                }
                println!("Wrote {}", output);
            }
            if let Some(path) = png {
                if let Err(e) = render_png(&path, &run.series, labels) {
                    fail(format!("rendering {}: {}", path, e));
                }
                println!("Wrote {}", path);
            }
            if let Some(path) = svg {
                if let Err(e) = render_svg(&path, &run.series, labels) {
                    fail(format!("rendering {}: {}", path, e));
                }
                println!("Wrote {}", path);
            }
        }
        Commands::BuildLine {
            points,
            order_field,
            descending,
            output,
        } => {
            let point_layer = match read_point_layer(&points, cli.epsg) {
                Ok(layer) => layer,
                Err(e) => fail(format!("reading {}: {}", points, e)),
            };
            let order = if descending {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            let built = match build_line(&point_layer, &order_field, order, false) {
                Ok(layer) => layer,
                Err(e) => fail(e),
            };
            if let Err(e) = write_line_csv(&output, &built) {
                fail(format!("writing {}: {}", output, e));
            }
            println!("Wrote {}", output);
        }
        Commands::Station { line, x, y } => {
            let line_layer = match read_line_layer(&line, cli.epsg) {
                Ok(layer) => layer,
                Err(e) => fail(format!("reading {}: {}", line, e)),
            };
            let mut features = line_layer.features();
            let polyline = match (features.next(), features.next()) {
                (Some(feature), None) => &feature.geometry,
                (None, _) => fail("line file has no features"),
                _ => fail("line file has more than one feature"),
            };
            let p = Point::new(x, y);
            match (polyline.station_of(p), polyline.offset_to(p)) {
                (Some(station), Some(offset)) => println!("{:.3},{:.3}", station, offset),
                _ => fail("line geometry has fewer than two vertices"),
            }
        }
    }
}
