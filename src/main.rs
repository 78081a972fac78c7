use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use smogmap::logging::init_tracing;
use smogmap::models::marker_color;
use smogmap::{
    AirQualityApi, BoundingBox, Clock, FjallBackend, FetchStatus, GiosClient, Pollutant, Session,
    SmogMapConfig, SnapshotCache, SystemClock,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless air quality map viewer for the GIOŚ API")]
struct Cli {
    /// Path to config file (TOML format)
    #[arg(short, long, env = "SMOGMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Viewport: minLat,maxLat,minLon,maxLon
    #[arg(long)]
    bbox: Option<BoundingBox>,

    /// Station id whose measurement details should be loaded
    #[arg(long)]
    station: Option<String>,

    /// Seconds to let index and detail fetches settle before printing
    #[arg(long, default_value_t = 5)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SmogMapConfig::load_from_path(cli.config.clone())
        .with_context(|| "Failed to load configuration")?;
    init_tracing(&config.logging)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = FjallBackend::open(&config.cache.location)
        .with_context(|| format!("Failed to open cache at {}", config.cache.location))?;
    let cache = SnapshotCache::new(Arc::new(backend), Arc::clone(&clock), config.cache.ttl());
    let api: Arc<dyn AirQualityApi> = Arc::new(GiosClient::new(&config.api)?);

    let session = Session::new(&config, api, cache, clock);
    session.spawn_viewport_sync();

    // No network and no cache: keep going with an empty map.
    if let Err(e) = session.bootstrap().await {
        eprintln!("{}", e.user_message());
    }

    if let Some(bbox) = cli.bbox {
        session.viewport_changed(bbox);
    }
    session.select_station(cli.station.as_deref());

    info!("Waiting {}s for fetches to settle", cli.wait_secs);
    tokio::time::sleep(Duration::from_secs(cli.wait_secs)).await;

    print_stations(&session, cli.bbox.is_some());
    if let Some(id) = cli.station.as_deref() {
        print_details(&session, id);
    }

    session.shutdown();
    Ok(())
}

fn print_stations(session: &Session, has_viewport: bool) {
    let store = session.store();
    println!("{} stations in directory", store.stations().len());

    if !has_viewport {
        println!("No viewport given (--bbox), nothing is in view.");
        return;
    }

    let in_view = session.stations_in_view();
    println!("{} stations in view:", in_view.len());
    for station in &in_view {
        let entry = store.index_entry(&station.id);
        let value = store.usable_index(&station.id);
        let shown = match (entry.status, value) {
            (_, Some(v)) => v.to_string(),
            (FetchStatus::Failed, None) => "no data".to_string(),
            (status, None) => status.to_string(),
        };
        println!(
            "  [{}] {:<8} {:<50} index: {:<9} {}",
            marker_color(value),
            station.id,
            station.name,
            shown,
            station.city.as_deref().unwrap_or("")
        );
    }
}

fn print_details(session: &Session, station_id: &str) {
    let store = session.store();
    let entry = store.details_entry(station_id);
    let name = store
        .station(station_id)
        .map_or_else(|| station_id.to_string(), |s| s.name);

    println!("Details for {name} ({})", entry.status);
    if let Some(error) = &entry.error {
        println!("  error: {error}");
    }

    let Some(data) = entry.data else {
        return;
    };
    for pollutant in Pollutant::ALL {
        match data.latest(pollutant) {
            Some(m) => println!(
                "  {:<5} {:>8.1}  at {}  ({} readings)",
                pollutant.key(),
                m.value,
                m.date_iso(),
                data.series(pollutant).len()
            ),
            None => println!("  {:<5} no recent readings", pollutant.key()),
        }
    }
}
