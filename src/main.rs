pub mod boundaries;
pub mod config;
pub mod crs;
pub mod fetch;
pub mod join;
pub mod render;
pub mod results;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate results, fetch boundaries, and render the maps
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the rendered tiles, viewer page, and district query API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

async fn load_districts(app_config: &config::AppConfig) -> anyhow::Result<Vec<types::District>> {
    // 1. Load and aggregate the election results
    let votes = results::load_results(&app_config.input)?;

    // 2. Fetch and parse the district boundaries
    let geometry_path = fetch::resolve_boundaries(&app_config.boundaries).await?;
    let (mut boundary_polys, source_crs) =
        boundaries::load_boundaries(&geometry_path, &app_config.boundaries)?;

    // 3. Reproject to lon/lat
    crs::reproject_to_wgs84(&mut boundary_polys, source_crs);

    // 4. Join aggregates to geometry
    Ok(join::join_districts(
        votes,
        boundary_polys,
        &app_config.input.state,
    ))
}

fn print_summary(districts: &[types::District]) {
    println!("district     total       dem       rep     other  rep_share  winner");
    for d in districts {
        let v = &d.votes;
        println!(
            "{:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9.3}  {}",
            v.district,
            v.total_votes,
            v.dem_votes,
            v.rep_votes,
            v.other_votes,
            v.rep_share,
            v.winner.label()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            println!("Generating maps with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let districts = load_districts(&app_config).await?;
            print_summary(&districts);

            render::render_static(&app_config.output, &districts)?;
            render::generate_tiles(&app_config.output, &districts)?;
            render::write_viewer(&app_config.output)?;

            println!("Generation complete!");
        }
        Commands::Serve { config } => {
            println!("Serving maps with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // The query API joins on the fly so it serves fresh aggregates
            // even if the tiles are stale.
            let districts = load_districts(&app_config).await?;

            server::start_server(app_config, districts).await?;
        }
    }

    Ok(())
}
