//! geolayers CLI
//!
//! Probes GeoServer endpoints and inspects project layer trees.
//!
//! Usage:
//!   cargo run --features cli --bin geolayers -- probe
//!   cargo run --features cli --bin geolayers -- layers --json
//!   cargo run --features cli --bin geolayers -- tile-url city:ortho --protocol wms
//!   cargo run --features cli --bin geolayers -- tileset city:parcels
//!   cargo run --features cli --bin geolayers -- source city:roads --protocol mvt
//!   cargo run --features cli --bin geolayers -- info city:roads --protocol wfs
//!   cargo run --features cli --bin geolayers -- tree --filter road
//!   cargo run --features cli --bin geolayers -- locate "Roads" 42
//!
//! Settings come from the environment (or `.env`):
//!   GEOSERVER_URL, GEOSERVER_WORKSPACE, GEOSERVER_USERNAME, GEOSERVER_PASSWORD,
//!   BACKEND_URL, BACKEND_TOKEN, GEOLAYERS_PROJECT, GEOLAYERS_ROLLBACK

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use geolayers::backend::HttpProjectBackend;
use geolayers::config::AppConfig;
use geolayers::sources::{
    LayerSourceManager, Protocol, RasterSourceOptions, SourceOptions, VectorSourceOptions,
};
use geolayers::sync::LayerTreeSync;
use geolayers::tree::TreeView;

#[derive(Parser, Debug)]
#[command(name = "geolayers")]
#[command(about = "Probe GeoServer services and inspect project layer trees")]
struct Args {
    /// Print JSON instead of a human-readable summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the WMS, WFS and MVT endpoints answer
    Probe,

    /// List layers advertised by each service
    Layers,

    /// Print the tile URL template for a layer (WMS or MVT)
    TileUrl {
        layer: String,
        #[arg(long, short = 'p', default_value = "mvt", value_parser = parse_protocol)]
        protocol: Protocol,
    },

    /// Print the vector tileset descriptor for a layer
    Tileset { layer: String },

    /// Print the renderer source configuration for a layer
    Source {
        layer: String,
        #[arg(long, short = 'p', default_value = "wms", value_parser = parse_protocol)]
        protocol: Protocol,
    },

    /// Print layer metadata from one service
    Info {
        layer: String,
        #[arg(long, short = 'p', default_value = "wms", value_parser = parse_protocol)]
        protocol: Protocol,
    },

    /// Fetch and print the project layer tree
    Tree {
        /// Case-insensitive name filter
        #[arg(long, short = 'f')]
        filter: Option<String>,
    },

    /// Compute the camera fit for one feature of a layer
    Locate { layer: String, feature_id: String },
}

fn parse_protocol(s: &str) -> Result<Protocol, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,geolayers=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    match args.command {
        Command::Probe => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            let report = manager.test_connections().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("WMS: {}", status(report.raster));
                println!("WFS: {}", status(report.feature));
                println!("MVT: {}", status(report.vector));
            }
            if !report.all_ok() {
                std::process::exit(1);
            }
        }
        Command::Layers => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            let layers = manager.get_available_layers().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&layers)?);
            } else {
                for protocol in Protocol::ALL {
                    let names = layers.for_protocol(protocol);
                    println!("{} ({} layers)", protocol, names.len());
                    for name in names {
                        println!("  {}", name);
                    }
                }
            }
        }
        Command::TileUrl { layer, protocol } => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            let url = match protocol {
                Protocol::TiledRaster => manager
                    .wms()
                    .generate_tile_url(&layer, &RasterSourceOptions::new()),
                Protocol::TiledVector => manager
                    .mvt()
                    .generate_tile_url(&layer, &VectorSourceOptions::new()),
                Protocol::FeatureQuery => {
                    anyhow::bail!("WFS sources are not tiled; use `source --protocol wfs`")
                }
            };
            println!("{}", url);
        }
        Command::Tileset { layer } => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            let tileset = manager.mvt().get_tileset_info(&layer).await?;
            println!("{}", serde_json::to_string_pretty(&tileset)?);
        }
        Command::Source { layer, protocol } => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            let source = manager
                .create_source_config(&layer, protocol, &SourceOptions::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        Command::Info { layer, protocol } => {
            let manager = LayerSourceManager::new(&config.geoserver)?;
            match manager.get_layer_info(&layer, protocol).await? {
                Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
                None => {
                    eprintln!("{} does not advertise layer '{}'", protocol, layer);
                    std::process::exit(1);
                }
            }
        }
        Command::Tree { filter } => {
            let sync = sync_engine(&config)?;
            sync.refresh().await?;
            let tree = sync.snapshot().await;
            let views = match filter.as_deref() {
                Some(term) => tree.filter_by_name(term),
                None => tree.to_nested(),
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                for view in &views {
                    print_view(view, 0);
                }
            }
        }
        Command::Locate { layer, feature_id } => {
            let sync = sync_engine(&config)?;
            sync.refresh().await?;
            match sync.feature_bounds(&layer, &feature_id).await? {
                Some(fit) => {
                    if args.json {
                        println!("{}", serde_json::to_string_pretty(&fit)?);
                    } else {
                        let [[west, south], [east, north]] = fit.corners();
                        println!(
                            "bounds: {:.6},{:.6} {:.6},{:.6} (padding {}, max zoom {})",
                            west, south, east, north, fit.padding, fit.max_zoom
                        );
                    }
                }
                None => {
                    eprintln!("No feature '{}' in layer '{}'", feature_id, layer);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn sync_engine(config: &AppConfig) -> Result<LayerTreeSync> {
    let backend = config
        .backend
        .as_ref()
        .context("BACKEND_URL must be set for project commands")?;
    let sync = config
        .sync
        .clone()
        .context("GEOLAYERS_PROJECT must be set for project commands")?;
    let backend = HttpProjectBackend::new(backend)?;
    Ok(LayerTreeSync::new(Arc::new(backend), sync))
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "unreachable"
    }
}

fn print_view(view: &TreeView, depth: usize) {
    let marker = if view.visible { "x" } else { " " };
    let suffix = match &view.geometry {
        Some(geometry) => format!(" ({})", geometry),
        None => String::new(),
    };
    println!("{}[{}] {}{}", "  ".repeat(depth), marker, view.name, suffix);
    for child in &view.children {
        print_view(child, depth + 1);
    }
}
