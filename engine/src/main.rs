use clap::{Parser, Subcommand, ValueEnum};
use engine::elevation::ElevationStats;
use engine::geodesy::{format_area, format_distance, format_duration};
use engine::overlay::{FitOptions, Layer, LayerKey, MapSurface};
use engine::{EngineConfig, MapSession, Services};
use geo_types::{coord, Rect};
use shared::{Coordinate, MeasureMode, MeasureResult, PoiCategory, TravelProfile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Drive a map session against live geodata services")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route between two `lon,lat` points and list the alternatives
    Route {
        #[command(flatten)]
        endpoints: Endpoints,
        /// Print turn-by-turn steps of the primary route
        #[arg(long)]
        steps: bool,
    },
    /// Measure a path length or polygon area over `lon,lat` points
    Measure {
        #[arg(long, value_enum, default_value_t = Mode::Distance)]
        mode: Mode,
        #[arg(required = true, value_parser = parse_coordinate, allow_hyphen_values = true)]
        points: Vec<Coordinate>,
    },
    /// List points of interest inside `min_lon,min_lat,max_lon,max_lat`
    Pois {
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Rect<f64>,
        #[arg(long = "category", value_enum, required = true)]
        categories: Vec<Category>,
    },
    /// Elevation profile along a route
    Elevation {
        #[command(flatten)]
        endpoints: Endpoints,
    },
    /// Weather samples along a route
    Weather {
        #[command(flatten)]
        endpoints: Endpoints,
    },
    /// Free-text place search scoped to the configured country
    Search { query: String },
}

#[derive(Debug, clap::Args)]
struct Endpoints {
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    from: Coordinate,
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    to: Coordinate,
    #[arg(long, value_enum, default_value_t = Profile::Driving)]
    profile: Profile,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Profile {
    Driving,
    Cycling,
    Walking,
}

impl From<Profile> for TravelProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::Driving => TravelProfile::Driving,
            Profile::Cycling => TravelProfile::Cycling,
            Profile::Walking => TravelProfile::Walking,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Distance,
    Area,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Category {
    Hospital,
    School,
    Fuel,
    Restaurant,
}

impl From<Category> for PoiCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::Hospital => PoiCategory::Hospital,
            Category::School => PoiCategory::School,
            Category::Fuel => PoiCategory::FuelStation,
            Category::Restaurant => PoiCategory::Restaurant,
        }
    }
}

fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let (lon, lat) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `lon,lat`, got {raw:?}"))?;
    let lon: f64 = lon.trim().parse().map_err(|err| format!("longitude: {err}"))?;
    let lat: f64 = lat.trim().parse().map_err(|err| format!("latitude: {err}"))?;
    let coordinate = Coordinate::from_lon_lat(lon, lat);
    if !coordinate.is_valid() {
        return Err(format!("{raw:?} is outside valid bounds"));
    }
    Ok(coordinate)
}

fn parse_bbox(raw: &str) -> Result<Rect<f64>, String> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|err| err.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts[..] else {
        return Err(format!("expected four comma-separated numbers, got {raw:?}"));
    };
    Ok(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}

/// Map surface that only reports what would be drawn.
#[derive(Debug, Default)]
struct LogSurface;

impl MapSurface for LogSurface {
    fn upsert_layer(&mut self, key: &LayerKey, layer: &Layer) {
        let shape = match layer {
            Layer::Line { path, .. } => format!("line with {} point(s)", path.len()),
            Layer::Polygon { ring } => format!("polygon with {} vertices", ring.len()),
            Layer::Marker { at, .. } => format!("marker at ({:.5}, {:.5})", at.lon, at.lat),
        };
        tracing::debug!("map: draw {key} as {shape}");
    }

    fn remove_layer(&mut self, key: &LayerKey) {
        tracing::debug!("map: remove {key}");
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions) {
        tracing::debug!(
            "map: fit to {:?}..{:?} (padding {} px)",
            bounds.min(),
            bounds.max(),
            options.padding_px
        );
    }
}

async fn routed_session(
    config: EngineConfig,
    endpoints: &Endpoints,
) -> Result<MapSession<LogSurface>, Box<dyn std::error::Error>> {
    let services = Services::http(&config)?;
    let mut session = MapSession::new(LogSurface, config, services);
    session.set_profile(endpoints.profile.into()).await?;
    session.toggle_routing();
    session.pick_coordinate(endpoints.from).await?;
    session.pick_coordinate(endpoints.to).await?;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = EngineConfig::from_env()?;
    tracing::info!(
        "using routing={} geocoder={} timeout={:?}",
        config.routing_url,
        config.geocoder_url,
        config.request_timeout
    );

    match args.command {
        Command::Route { endpoints, steps } => {
            let session = routed_session(config, &endpoints).await?;
            for (idx, alternative) in session.routing().alternatives().iter().enumerate() {
                println!(
                    "{idx}: {:?} {} in {}",
                    alternative.rank,
                    format_distance(alternative.route.distance_m),
                    format_duration(alternative.route.duration_s)
                );
            }
            if steps {
                if let Some(info) = session.routing().route_info() {
                    for step in &info.steps {
                        println!("  {} ({})", step.instruction, format_distance(step.distance_m));
                    }
                }
            }
        }
        Command::Measure { mode, points } => {
            let services = Services::http(&config)?;
            let mut session = MapSession::new(LogSurface, config, services);
            session.set_measure_mode(Some(match mode {
                Mode::Distance => MeasureMode::Distance,
                Mode::Area => MeasureMode::Area,
            }));
            let result = points
                .into_iter()
                .filter_map(|point| session.add_measure_point(point))
                .last();
            match result {
                Some(MeasureResult::DistanceMeters(m)) => println!("{}", format_distance(m)),
                Some(MeasureResult::AreaSqMeters(m2)) => println!("{}", format_area(m2)),
                None => println!("not enough points"),
            }
        }
        Command::Pois { bbox, categories } => {
            let services = Services::http(&config)?;
            let mut session = MapSession::new(LogSurface, config, services);
            let categories: Vec<PoiCategory> = categories.into_iter().map(Into::into).collect();
            for (category, outcome) in session.toggle_pois(&categories, bbox).await {
                if let Err(err) = outcome {
                    tracing::error!("{} lookup failed: {err}", category.as_str());
                }
            }
            println!("{}", serde_json::to_string_pretty(session.pois().pois())?);
        }
        Command::Elevation { endpoints } => {
            let mut session = routed_session(config, &endpoints).await?;
            session.show_elevation().await?;
            let elevation = session.elevation();
            tracing::info!("elevation source: {:?}", elevation.source());
            for point in elevation.points() {
                println!("{:>8.2} km {:>7.0} m", point.distance_from_start_km, point.elevation_m);
            }
            if let Some(stats) = ElevationStats::from_points(elevation.points()) {
                println!(
                    "min {:.0} m, max {:.0} m, ascent {:.0} m, descent {:.0} m",
                    stats.min_m, stats.max_m, stats.total_ascent_m, stats.total_descent_m
                );
            }
        }
        Command::Weather { endpoints } => {
            let mut session = routed_session(config, &endpoints).await?;
            session.show_weather().await?;
            println!("{}", serde_json::to_string_pretty(session.weather().samples())?);
        }
        Command::Search { query } => {
            let services = Services::http(&config)?;
            let mut session = MapSession::new(LogSurface, config, services);
            session.search_places(&query).await?;
            println!("{}", serde_json::to_string_pretty(session.search().results())?);
        }
    }

    Ok(())
}
