#![allow(clippy::type_complexity, clippy::too_many_arguments)]
use bevy::log::warn;
use bevy::prelude::*;
use clap::{Parser, ValueEnum};
use std::fs::File;

use profile_points::crs::Crs;
use profile_points::export::profile_tsv;
use profile_points::gis::{FieldKind, LayerRegistry, LineLayer, PointLayer};
use profile_points::io::{
    read_line_layer_csv, read_line_layer_geojson, read_point_layer_csv, read_point_layer_geojson,
};
use profile_points::profile::{
    run_profile, LineSource, ProfileRequest, ProfileSeries, SortOrder,
};

#[derive(Copy, Clone, ValueEnum)]
enum Theme {
    Dark,
    Light,
}

#[derive(Parser)]
struct Args {
    /// EPSG code for the working coordinate system
    #[arg(long, default_value_t = 4326)]
    epsg: u32,
    /// UI theme (dark or light)
    #[arg(long, value_enum, default_value_t = Theme::Dark)]
    theme: Theme,
}

#[derive(Resource)]
struct WorkingCrs(Crs);

#[derive(Resource)]
struct ThemeColors {
    panel_bg: Color,
    button_bg: Color,
    text: Color,
    grid: Color,
    axis: Color,
    profile: Color,
    marker: Color,
}

impl ThemeColors {
    fn new(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                panel_bg: Color::srgb(0.15, 0.15, 0.15),
                button_bg: Color::srgb(0.3, 0.3, 0.3),
                text: Color::WHITE,
                grid: Color::srgb(0.25, 0.25, 0.25),
                axis: Color::srgb(0.7, 0.7, 0.7),
                profile: Color::srgb(0.3, 0.6, 1.0),
                marker: Color::srgb(1.0, 0.8, 0.2),
            },
            Theme::Light => Self {
                panel_bg: Color::srgb(0.9, 0.9, 0.9),
                button_bg: Color::srgb(0.8, 0.8, 0.8),
                text: Color::BLACK,
                grid: Color::srgb(0.85, 0.85, 0.85),
                axis: Color::srgb(0.3, 0.3, 0.3),
                profile: Color::srgb(0.0, 0.2, 0.8),
                marker: Color::srgb(0.8, 0.4, 0.0),
            },
        }
    }
}

#[derive(Resource, Default)]
struct Layers {
    points: Option<PointLayer>,
    line: Option<LineLayer>,
    registry: LayerRegistry,
}

#[derive(Resource, Default)]
struct FieldChoices {
    z: Vec<String>,
    id: Vec<String>,
    order: Vec<String>,
    z_idx: usize,
    id_idx: usize,
    order_idx: usize,
}

impl FieldChoices {
    fn reload(&mut self, layer: &PointLayer) {
        self.z = layer.field_names(&[FieldKind::Integer, FieldKind::Real]);
        self.order = self.z.clone();
        self.id = layer.field_names(&[FieldKind::Integer, FieldKind::Real, FieldKind::Text]);
        self.z_idx = 0;
        self.id_idx = 0;
        self.order_idx = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EntryFocus {
    #[default]
    None,
    NoData,
    Buffer,
}

#[derive(Resource)]
struct RunSettings {
    build_line: bool,
    order: SortOrder,
    use_selected_points: bool,
    use_selected_line: bool,
    id_labels: bool,
    header: bool,
    no_data: String,
    buffer: String,
    focus: EntryFocus,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            build_line: true,
            order: SortOrder::Ascending,
            use_selected_points: false,
            use_selected_line: false,
            id_labels: false,
            header: true,
            no_data: "-99999".to_string(),
            buffer: String::new(),
            focus: EntryFocus::None,
        }
    }
}

#[derive(Resource, Default)]
struct ProfileData(Option<ProfileSeries>);

#[derive(Resource, Default)]
struct PlotDirty(bool);

#[derive(Resource, Default)]
struct Status(String);

#[derive(Component, Clone, Copy, PartialEq, Eq)]
enum ControlLabel {
    PointLayer,
    LineLayer,
    ZField,
    IdField,
    OrderField,
    OrderDir,
    Source,
    SelPoints,
    SelLine,
    IdLabels,
    Header,
    NoData,
    Buffer,
    Status,
}

#[derive(Component)]
struct LoadPointsButton;
#[derive(Component)]
struct LoadLineButton;
#[derive(Component)]
struct ZFieldButton;
#[derive(Component)]
struct IdFieldButton;
#[derive(Component)]
struct OrderFieldButton;
#[derive(Component)]
struct OrderDirButton;
#[derive(Component)]
struct SourceButton;
#[derive(Component)]
struct SelPointsButton;
#[derive(Component)]
struct SelLineButton;
#[derive(Component)]
struct IdLabelsButton;
#[derive(Component)]
struct HeaderButton;
#[derive(Component)]
struct NoDataButton;
#[derive(Component)]
struct BufferButton;
#[derive(Component)]
struct RunButton;
#[derive(Component)]
struct CopyButton;

#[derive(Component)]
struct PlotEntity;

fn main() {
    if let Ok(path) = std::env::var("PROFILE_POINTS_LOG") {
        match File::create(&path) {
            Ok(file) => {
                env_logger::Builder::from_default_env()
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create log file {}: {}", path, e);
                env_logger::Builder::from_default_env().init();
            }
        }
    } else {
        env_logger::Builder::from_default_env().init();
    }

    let args = Args::parse();
    log::info!("Using EPSG {}", args.epsg);
    App::new()
        .insert_resource(WorkingCrs(Crs::from_epsg(args.epsg)))
        .insert_resource(ThemeColors::new(args.theme))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Profile From Points".into(),
                resolution: (1000.0, 700.0).into(),
                ..default()
            }),
            ..default()
        }))
        .insert_resource(Layers::default())
        .insert_resource(FieldChoices::default())
        .insert_resource(RunSettings::default())
        .insert_resource(ProfileData::default())
        .insert_resource(PlotDirty::default())
        .insert_resource(Status::default())
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (
                handle_load_points,
                handle_load_line,
                handle_z_field,
                handle_id_field,
                handle_order_field,
                handle_order_dir,
                handle_source_toggle,
                handle_selected_points_toggle,
                handle_selected_line_toggle,
            ),
        )
        .add_systems(
            Update,
            (
                handle_id_labels_toggle,
                handle_header_toggle,
                handle_entry_focus,
                edit_entry_value,
                handle_run,
                handle_copy,
                update_control_labels,
                refresh_plot,
            ),
        )
        .run();
}

fn setup(mut commands: Commands, theme: Res<ThemeColors>) {
    commands.spawn(Camera2d);
    commands
        .spawn((
            Node {
                width: Val::Px(250.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                padding: UiRect::all(Val::Px(6.0)),
                row_gap: Val::Px(3.0),
                ..default()
            },
            BackgroundColor(theme.panel_bg),
        ))
        .with_children(|parent| {
            spawn_control(parent, &theme, LoadPointsButton, ControlLabel::PointLayer);
            spawn_control(parent, &theme, LoadLineButton, ControlLabel::LineLayer);
            spawn_control(parent, &theme, SourceButton, ControlLabel::Source);
            spawn_control(parent, &theme, OrderFieldButton, ControlLabel::OrderField);
            spawn_control(parent, &theme, OrderDirButton, ControlLabel::OrderDir);
            spawn_control(parent, &theme, ZFieldButton, ControlLabel::ZField);
            spawn_control(parent, &theme, IdFieldButton, ControlLabel::IdField);
            spawn_control(parent, &theme, SelPointsButton, ControlLabel::SelPoints);
            spawn_control(parent, &theme, SelLineButton, ControlLabel::SelLine);
            spawn_control(parent, &theme, NoDataButton, ControlLabel::NoData);
            spawn_control(parent, &theme, BufferButton, ControlLabel::Buffer);
            spawn_control(parent, &theme, IdLabelsButton, ControlLabel::IdLabels);
            spawn_control(parent, &theme, HeaderButton, ControlLabel::Header);
            spawn_button(parent, &theme, RunButton, "Plot profile");
            spawn_button(parent, &theme, CopyButton, "Copy to clipboard");
            parent.spawn((
                TextLayout::default(),
                TextFont {
                    font_size: 12.0,
                    ..default()
                },
                TextColor(theme.text),
                Text::new(""),
                ControlLabel::Status,
            ));
        });
}

fn spawn_control(
    parent: &mut ChildBuilder,
    theme: &ThemeColors,
    marker: impl Bundle,
    label: ControlLabel,
) {
    parent
        .spawn((
            Button,
            Node {
                margin: UiRect::all(Val::Px(1.0)),
                padding: UiRect::new(Val::Px(8.0), Val::Px(8.0), Val::Px(4.0), Val::Px(4.0)),
                ..default()
            },
            BackgroundColor(theme.button_bg),
        ))
        .insert(marker)
        .with_children(|button| {
            button.spawn((
                TextLayout::default(),
                TextFont {
                    font_size: 13.0,
                    ..default()
                },
                TextColor(theme.text),
                Text::new(""),
                label,
            ));
        });
}

fn spawn_button(parent: &mut ChildBuilder, theme: &ThemeColors, marker: impl Bundle, text: &str) {
    parent
        .spawn((
            Button,
            Node {
                margin: UiRect::all(Val::Px(1.0)),
                padding: UiRect::new(Val::Px(8.0), Val::Px(8.0), Val::Px(4.0), Val::Px(4.0)),
                ..default()
            },
            BackgroundColor(theme.button_bg),
        ))
        .insert(marker)
        .with_children(|button| {
            button.spawn((
                TextLayout::default(),
                TextFont {
                    font_size: 13.0,
                    ..default()
                },
                TextColor(theme.text),
                Text::new(text),
            ));
        });
}

fn pick_layer_file() -> Option<String> {
    let path = rfd::FileDialog::new()
        .add_filter("CSV", &["csv"])
        .add_filter("GeoJSON", &["geojson", "json"])
        .pick_file()?;
    match path.to_str() {
        Some(s) => Some(s.to_string()),
        None => {
            warn!("Selected path could not be read as UTF-8");
            None
        }
    }
}

fn is_geojson(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".geojson") || lower.ends_with(".json")
}

fn handle_load_points(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<LoadPointsButton>)>,
    working: Res<WorkingCrs>,
    mut layers: ResMut<Layers>,
    mut choices: ResMut<FieldChoices>,
    mut settings: ResMut<RunSettings>,
    mut data: ResMut<ProfileData>,
    mut dirty: ResMut<PlotDirty>,
    mut status: ResMut<Status>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let Some(path) = pick_layer_file() else {
            return;
        };
        let epsg = working.0.epsg();
        let loaded = if is_geojson(&path) {
            read_point_layer_geojson(&path, epsg)
        } else {
            read_point_layer_csv(&path, epsg)
        };
        match loaded {
            Ok(layer) => {
                choices.reload(&layer);
                settings.use_selected_points = layer.selected_count() != 0;
                status.0 = format!("Loaded {} points from {}", layer.feature_count(), layer.name);
                layers.points = Some(layer);
                // New layer invalidates the previous plot.
                data.0 = None;
                dirty.0 = true;
            }
            Err(e) => {
                warn!("failed to read point layer: {}", e);
                status.0 = format!("Error reading {}: {}", path, e);
            }
        }
    }
}

fn handle_load_line(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<LoadLineButton>)>,
    working: Res<WorkingCrs>,
    mut layers: ResMut<Layers>,
    mut settings: ResMut<RunSettings>,
    mut status: ResMut<Status>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let Some(path) = pick_layer_file() else {
            return;
        };
        let epsg = working.0.epsg();
        let loaded = if is_geojson(&path) {
            read_line_layer_geojson(&path, epsg)
        } else {
            read_line_layer_csv(&path, epsg)
        };
        match loaded {
            Ok(layer) => {
                settings.use_selected_line = layer.selected_count() != 0;
                settings.build_line = false;
                status.0 = format!(
                    "Loaded {} line features from {}",
                    layer.feature_count(),
                    layer.name
                );
                layers.line = Some(layer);
            }
            Err(e) => {
                warn!("failed to read line layer: {}", e);
                status.0 = format!("Error reading {}: {}", path, e);
            }
        }
    }
}

fn cycle(idx: &mut usize, len: usize) {
    if len > 0 {
        *idx = (*idx + 1) % len;
    }
}

fn handle_z_field(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<ZFieldButton>)>,
    mut choices: ResMut<FieldChoices>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let len = choices.z.len();
        cycle(&mut choices.z_idx, len);
    }
}

fn handle_id_field(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<IdFieldButton>)>,
    mut choices: ResMut<FieldChoices>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let len = choices.id.len();
        cycle(&mut choices.id_idx, len);
    }
}

fn handle_order_field(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<OrderFieldButton>)>,
    mut choices: ResMut<FieldChoices>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let len = choices.order.len();
        cycle(&mut choices.order_idx, len);
    }
}

fn handle_order_dir(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<OrderDirButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.order = match settings.order {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        };
    }
}

fn handle_source_toggle(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<SourceButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.build_line = !settings.build_line;
    }
}

fn handle_selected_points_toggle(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<SelPointsButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.use_selected_points = !settings.use_selected_points;
    }
}

fn handle_selected_line_toggle(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<SelLineButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.use_selected_line = !settings.use_selected_line;
    }
}

fn handle_id_labels_toggle(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<IdLabelsButton>)>,
    mut settings: ResMut<RunSettings>,
    mut dirty: ResMut<PlotDirty>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.id_labels = !settings.id_labels;
        dirty.0 = true;
    }
}

fn handle_header_toggle(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<HeaderButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        settings.header = !settings.header;
    }
}

fn handle_entry_focus(
    no_data: Query<&Interaction, (Changed<Interaction>, With<Button>, With<NoDataButton>)>,
    buffer: Query<&Interaction, (Changed<Interaction>, With<Button>, With<BufferButton>)>,
    mut settings: ResMut<RunSettings>,
) {
    if let Ok(&Interaction::Pressed) = no_data.get_single() {
        settings.focus = EntryFocus::NoData;
    }
    if let Ok(&Interaction::Pressed) = buffer.get_single() {
        settings.focus = EntryFocus::Buffer;
    }
}

fn key_char(key: KeyCode) -> Option<char> {
    match key {
        KeyCode::Digit0 | KeyCode::Numpad0 => Some('0'),
        KeyCode::Digit1 | KeyCode::Numpad1 => Some('1'),
        KeyCode::Digit2 | KeyCode::Numpad2 => Some('2'),
        KeyCode::Digit3 | KeyCode::Numpad3 => Some('3'),
        KeyCode::Digit4 | KeyCode::Numpad4 => Some('4'),
        KeyCode::Digit5 | KeyCode::Numpad5 => Some('5'),
        KeyCode::Digit6 | KeyCode::Numpad6 => Some('6'),
        KeyCode::Digit7 | KeyCode::Numpad7 => Some('7'),
        KeyCode::Digit8 | KeyCode::Numpad8 => Some('8'),
        KeyCode::Digit9 | KeyCode::Numpad9 => Some('9'),
        KeyCode::Period | KeyCode::NumpadDecimal => Some('.'),
        KeyCode::Minus | KeyCode::NumpadSubtract => Some('-'),
        _ => None,
    }
}

fn edit_entry_value(keys: Res<ButtonInput<KeyCode>>, mut settings: ResMut<RunSettings>) {
    let focus = settings.focus;
    if focus == EntryFocus::None {
        return;
    }
    let mut done = false;
    let mut backspace = false;
    let mut typed = Vec::new();
    for key in keys.get_just_pressed() {
        match key {
            KeyCode::Enter | KeyCode::NumpadEnter | KeyCode::Escape => done = true,
            KeyCode::Backspace => backspace = true,
            k => {
                if let Some(c) = key_char(*k) {
                    typed.push(c);
                }
            }
        }
    }
    let value = match focus {
        EntryFocus::NoData => &mut settings.no_data,
        EntryFocus::Buffer => &mut settings.buffer,
        EntryFocus::None => return,
    };
    if backspace {
        value.pop();
    }
    for c in typed {
        value.push(c);
    }
    if done {
        settings.focus = EntryFocus::None;
    }
}

fn handle_run(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<RunButton>)>,
    mut layers: ResMut<Layers>,
    choices: Res<FieldChoices>,
    settings: Res<RunSettings>,
    mut data: ResMut<ProfileData>,
    mut dirty: ResMut<PlotDirty>,
    mut status: ResMut<Status>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let layers = &mut *layers;
        let Some(points) = layers.points.as_ref() else {
            status.0 = "Load a point layer first".to_string();
            return;
        };
        let (Some(z_field), Some(id_field)) = (
            choices.z.get(choices.z_idx),
            choices.id.get(choices.id_idx),
        ) else {
            status.0 = "Point layer has no usable fields".to_string();
            return;
        };
        let buffer = match settings.buffer.trim() {
            "" => None,
            text => match text.parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("buffer value is not numeric: {}", settings.buffer);
                    status.0 = "Buffer value must be numeric".to_string();
                    return;
                }
            },
        };
        let source = if settings.build_line {
            let Some(order_field) = choices.order.get(choices.order_idx) else {
                status.0 = "Point layer has no numeric order field".to_string();
                return;
            };
            LineSource::Build {
                order_field: order_field.as_str(),
                order: settings.order,
            }
        } else {
            let Some(line) = layers.line.as_ref() else {
                status.0 = "Load a line layer first".to_string();
                return;
            };
            LineSource::Layer(line)
        };
        let request = ProfileRequest {
            z_field: z_field.clone(),
            id_field: id_field.clone(),
            no_data: settings.no_data.clone(),
            buffer,
            use_selected_points: settings.use_selected_points,
            use_selected_line: settings.use_selected_line,
        };
        match run_profile(points, source, &request) {
            Ok(run) => {
                status.0 = format!("Profiled {} points", run.series.len());
                data.0 = Some(run.series);
                dirty.0 = true;
                if let Some(built) = run.built_line {
                    layers.registry.add_line_layer(built);
                }
            }
            Err(e) => {
                // A failed run keeps the previous plot on screen.
                warn!("profile run failed: {}", e);
                status.0 = format!("Error: {}", e);
            }
        }
    }
}

fn handle_copy(
    interaction: Query<&Interaction, (Changed<Interaction>, With<Button>, With<CopyButton>)>,
    data: Res<ProfileData>,
    settings: Res<RunSettings>,
    mut status: ResMut<Status>,
) {
    if let Ok(&Interaction::Pressed) = interaction.get_single() {
        let Some(series) = data.0.as_ref() else {
            status.0 = "Nothing to copy; plot a profile first".to_string();
            return;
        };
        let text = profile_tsv(series, settings.header);
        match arboard::Clipboard::new().and_then(|mut c| c.set_text(text)) {
            Ok(()) => status.0 = format!("Copied {} rows to clipboard", series.len()),
            Err(e) => {
                warn!("clipboard unavailable: {}", e);
                status.0 = format!("Clipboard error: {}", e);
            }
        }
    }
}

fn update_control_labels(
    layers: Res<Layers>,
    choices: Res<FieldChoices>,
    settings: Res<RunSettings>,
    status: Res<Status>,
    mut texts: Query<(&mut Text, &ControlLabel)>,
) {
    let field = |list: &Vec<String>, idx: usize| -> String {
        list.get(idx).cloned().unwrap_or_else(|| "-".to_string())
    };
    let mark = |on: bool| if on { "x" } else { " " };
    for (mut text, label) in &mut texts {
        let value = match label {
            ControlLabel::PointLayer => format!(
                "Points: {}",
                layers
                    .points
                    .as_ref()
                    .map(|l| l.name.as_str())
                    .unwrap_or("<none>")
            ),
            ControlLabel::LineLayer => format!(
                "Line: {}",
                layers
                    .line
                    .as_ref()
                    .map(|l| l.name.as_str())
                    .unwrap_or("<none>")
            ),
            ControlLabel::ZField => format!("Z field: {}", field(&choices.z, choices.z_idx)),
            ControlLabel::IdField => format!("ID field: {}", field(&choices.id, choices.id_idx)),
            ControlLabel::OrderField => format!(
                "Order field: {}",
                field(&choices.order, choices.order_idx)
            ),
            ControlLabel::OrderDir => format!(
                "Sort: {}",
                match settings.order {
                    SortOrder::Ascending => "ascending",
                    SortOrder::Descending => "descending",
                }
            ),
            ControlLabel::Source => if settings.build_line {
                "Source: build line from points".to_string()
            } else {
                "Source: use line layer".to_string()
            },
            ControlLabel::SelPoints => {
                format!("[{}] Selected points only", mark(settings.use_selected_points))
            }
            ControlLabel::SelLine => {
                format!("[{}] Selected line only", mark(settings.use_selected_line))
            }
            ControlLabel::IdLabels => format!("[{}] Label point IDs", mark(settings.id_labels)),
            ControlLabel::Header => format!("[{}] Copy with header", mark(settings.header)),
            ControlLabel::NoData => format!(
                "No data value: {}{}",
                settings.no_data,
                if settings.focus == EntryFocus::NoData {
                    "_"
                } else {
                    ""
                }
            ),
            ControlLabel::Buffer => format!(
                "Buffer: {}{}",
                if settings.buffer.is_empty() {
                    "(off)"
                } else {
                    settings.buffer.as_str()
                },
                if settings.focus == EntryFocus::Buffer {
                    "_"
                } else {
                    ""
                }
            ),
            ControlLabel::Status => status.0.clone(),
        };
        if text.0 != value {
            text.0 = value;
        }
    }
}

/// World-space rectangle the plot is drawn into, with the data ranges it
/// maps from.
struct PlotFrame {
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl PlotFrame {
    fn from_series(series: &ProfileSeries) -> Self {
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
        if x_max - x_min < 1e-9 {
            x_min -= 1.0;
            x_max += 1.0;
        }
        if y_max - y_min < 1e-9 {
            y_min -= 1.0;
            y_max += 1.0;
        }
        Self {
            x0: -150.0,
            y0: -200.0,
            width: 560.0,
            height: 420.0,
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    fn map(&self, station: f64, elevation: f64) -> Vec2 {
        let tx = (station - self.x_min) / (self.x_max - self.x_min);
        let ty = (elevation - self.y_min) / (self.y_max - self.y_min);
        Vec2::new(
            self.x0 + tx as f32 * self.width,
            self.y0 + ty as f32 * self.height,
        )
    }
}

fn tick_label(value: f64, step: f64) -> String {
    if step >= 1.0 {
        format!("{:.0}", value)
    } else if step >= 0.1 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Step between axis ticks: 1/2/5 times a power of ten.
fn tick_step(range: f64) -> f64 {
    let raw = range / 5.0;
    let mag = 10f64.powf(raw.log10().floor());
    let norm = raw / mag;
    let step = if norm < 1.5 {
        1.0
    } else if norm < 3.5 {
        2.0
    } else if norm < 7.5 {
        5.0
    } else {
        10.0
    };
    step * mag
}

fn spawn_segment(commands: &mut Commands, a: Vec2, b: Vec2, color: Color, width: f32) {
    commands.spawn((
        Sprite {
            color,
            custom_size: Some(Vec2::new(a.distance(b).max(1.0), width)),
            ..default()
        },
        Transform::from_translation(((a + b) / 2.0).extend(0.0))
            .with_rotation(Quat::from_rotation_z((b - a).y.atan2((b - a).x))),
        PlotEntity,
    ));
}

fn spawn_plot_label(commands: &mut Commands, text: String, pos: Vec2, color: Color) {
    commands.spawn((
        Text2d::new(text),
        TextFont {
            font_size: 11.0,
            ..default()
        },
        TextColor(color),
        Transform::from_translation(pos.extend(1.0)),
        PlotEntity,
    ));
}

fn refresh_plot(
    mut dirty: ResMut<PlotDirty>,
    data: Res<ProfileData>,
    settings: Res<RunSettings>,
    theme: Res<ThemeColors>,
    mut commands: Commands,
    existing: Query<Entity, With<PlotEntity>>,
) {
    if !dirty.0 {
        return;
    }
    dirty.0 = false;
    for e in &existing {
        commands.entity(e).despawn_recursive();
    }
    let Some(series) = data.0.as_ref() else {
        return;
    };
    if series.is_empty() {
        return;
    }
    let frame = PlotFrame::from_series(series);

    // Grid and ticks.
    let x_step = tick_step(frame.x_max - frame.x_min);
    let mut tick = (frame.x_min / x_step).ceil() * x_step;
    while tick <= frame.x_max + 1e-9 {
        let a = frame.map(tick, frame.y_min);
        let b = frame.map(tick, frame.y_max);
        spawn_segment(&mut commands, a, b, theme.grid, 1.0);
        spawn_plot_label(
            &mut commands,
            tick_label(tick, x_step),
            a - Vec2::new(0.0, 14.0),
            theme.axis,
        );
        tick += x_step;
    }
    let y_step = tick_step(frame.y_max - frame.y_min);
    let mut tick = (frame.y_min / y_step).ceil() * y_step;
    while tick <= frame.y_max + 1e-9 {
        let a = frame.map(frame.x_min, tick);
        let b = frame.map(frame.x_max, tick);
        spawn_segment(&mut commands, a, b, theme.grid, 1.0);
        spawn_plot_label(
            &mut commands,
            tick_label(tick, y_step),
            a - Vec2::new(28.0, 0.0),
            theme.axis,
        );
        tick += y_step;
    }

    // Axis box.
    let corners = [
        frame.map(frame.x_min, frame.y_min),
        frame.map(frame.x_max, frame.y_min),
        frame.map(frame.x_max, frame.y_max),
        frame.map(frame.x_min, frame.y_max),
    ];
    for i in 0..4 {
        spawn_segment(
            &mut commands,
            corners[i],
            corners[(i + 1) % 4],
            theme.axis,
            2.0,
        );
    }

    // Profile polyline with point markers.
    let positions: Vec<Vec2> = series
        .iter()
        .map(|(station, elevation, _)| frame.map(station, elevation))
        .collect();
    for pair in positions.windows(2) {
        spawn_segment(&mut commands, pair[0], pair[1], theme.profile, 2.0);
    }
    for p in &positions {
        commands.spawn((
            Sprite {
                color: theme.marker,
                custom_size: Some(Vec2::new(5.0, 5.0)),
                ..default()
            },
            Transform::from_translation(p.extend(0.5)),
            PlotEntity,
        ));
    }
    if settings.id_labels {
        for ((_, _, id), p) in series.iter().zip(&positions) {
            spawn_plot_label(
                &mut commands,
                id.to_string(),
                *p + Vec2::new(0.0, 12.0),
                theme.text,
            );
        }
    }

    // Axis captions.
    spawn_plot_label(
        &mut commands,
        "Station, layer units".to_string(),
        Vec2::new(frame.x0 + frame.width / 2.0, frame.y0 - 34.0),
        theme.text,
    );
    commands.spawn((
        Text2d::new("Elevation, z field units"),
        TextFont {
            font_size: 11.0,
            ..default()
        },
        TextColor(theme.text),
        Transform::from_translation(Vec3::new(frame.x0 - 52.0, frame.y0 + frame.height / 2.0, 1.0))
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
        PlotEntity,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_maps_corners() {
        let series = ProfileSeries {
            stations: vec![0.0, 50.0],
            elevations: vec![100.0, 110.0],
            point_ids: vec!["1".to_string(), "2".to_string()],
        };
        let frame = PlotFrame::from_series(&series);
        let low = frame.map(0.0, 100.0);
        let high = frame.map(50.0, 110.0);
        assert!((low.x - frame.x0).abs() < 1e-3);
        assert!((low.y - frame.y0).abs() < 1e-3);
        assert!((high.x - (frame.x0 + frame.width)).abs() < 1e-3);
        assert!((high.y - (frame.y0 + frame.height)).abs() < 1e-3);
    }

    #[test]
    fn frame_pads_degenerate_ranges() {
        let series = ProfileSeries {
            stations: vec![10.0],
            elevations: vec![100.0],
            point_ids: vec!["1".to_string()],
        };
        let frame = PlotFrame::from_series(&series);
        assert!(frame.x_max > frame.x_min);
        assert!(frame.y_max > frame.y_min);
    }

    #[test]
    fn tick_steps_are_round() {
        assert!((tick_step(10.0) - 2.0).abs() < 1e-9);
        assert!((tick_step(100.0) - 20.0).abs() < 1e-9);
        assert!((tick_step(7.0) - 1.0).abs() < 1e-9);
        assert!((tick_step(0.5) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn tick_labels_round_to_step() {
        assert_eq!(tick_label(20.000000000000004, 20.0), "20");
        assert_eq!(tick_label(0.30000000000000004, 0.1), "0.3");
        assert_eq!(tick_label(0.06, 0.02), "0.06");
    }

    #[test]
    fn key_chars_cover_numeric_entry() {
        assert_eq!(key_char(KeyCode::Digit7), Some('7'));
        assert_eq!(key_char(KeyCode::NumpadDecimal), Some('.'));
        assert_eq!(key_char(KeyCode::Minus), Some('-'));
        assert_eq!(key_char(KeyCode::KeyA), None);
    }
}
