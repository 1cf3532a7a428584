use std::path::PathBuf;
use std::sync::Arc;

use catalog::{CommentRecord, CommentSeeds, CommentStore, builtin_seeds, parse_seeds};
use clap::{Parser, Subcommand};
use formats::{FloorConfig, ViewerConfig, parse_minimap};
use foundation::{FloorId, Step, SystemClock};
use navigation::{Navigator, RecordingObserver, Transition, ViewerEvent};
use runtime::TokioSpawner;
use serde::Serialize;
use streaming::{AssetFetcher, DefaultFetcher};
use tracing::info;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and check a 360° walkthrough")]
struct Args {
    /// Viewer config JSON (default: $WALKTHROUGH_CONFIG or built-in floors)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root for relative asset paths (default: $WALKTHROUGH_ASSET_ROOT or .)
    #[arg(long)]
    asset_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured floors
    Floors,

    /// Print a floor's minimap waypoints as JSON
    Waypoints {
        #[arg(long)]
        floor: String,
    },

    /// Print built-in comments as JSON
    Comments {
        #[arg(long)]
        floor: String,

        /// Only this step
        #[arg(long)]
        step: Option<Step>,

        /// Seed file `{floor: {step: [comment]}}` replacing the built-ins
        #[arg(long)]
        seeds: Option<PathBuf>,
    },

    /// Walk every step of a floor and report which images load
    Tour {
        #[arg(long)]
        floor: String,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::from_env()?,
    };
    let fetcher: Arc<dyn AssetFetcher> = Arc::new(match args.asset_root {
        Some(root) => DefaultFetcher::new(root),
        None => DefaultFetcher::from_env(),
    });

    match args.command {
        Command::Floors => print_floors(&config),
        Command::Waypoints { floor } => waypoints(&config, fetcher.as_ref(), &floor).await?,
        Command::Comments { floor, step, seeds } => {
            comments(&config, &floor, step, seeds.as_deref())?
        }
        Command::Tour { floor } => tour(config, fetcher, &floor).await?,
    }

    Ok(())
}

fn floor_config<'a>(config: &'a ViewerConfig, id: &str) -> CliResult<&'a FloorConfig> {
    config
        .floor(&FloorId::new(id))
        .ok_or_else(|| format!("unknown floor {id:?}").into())
}

fn print_floors(config: &ViewerConfig) {
    for floor in &config.floors {
        let marker = if floor.id == config.default_floor { "*" } else { " " };
        println!(
            "{marker} {:<8} {:<14} {:>3} steps  {}",
            floor.id.as_str(),
            floor.name,
            floor.total_steps,
            config.image_dir(floor)
        );
    }
}

async fn waypoints(config: &ViewerConfig, fetcher: &dyn AssetFetcher, id: &str) -> CliResult<()> {
    let floor = floor_config(config, id)?;
    let doc = fetcher.fetch_text(&floor.svg_path).await?;
    let minimap = parse_minimap(&doc, floor.total_steps)?;
    if minimap.waypoints.len() < floor.total_steps as usize {
        info!(
            floor = %floor.id,
            waypoints = minimap.waypoints.len(),
            steps = floor.total_steps,
            "path has fewer vertices than steps"
        );
    }
    println!("{}", serde_json::to_string_pretty(&minimap)?);
    Ok(())
}

#[derive(Serialize)]
struct StepComment<'a> {
    step: Step,
    #[serde(flatten)]
    comment: &'a CommentRecord,
}

fn comments(
    config: &ViewerConfig,
    id: &str,
    step: Option<Step>,
    seeds: Option<&std::path::Path>,
) -> CliResult<()> {
    let floor = floor_config(config, id)?;
    if let Some(step) = step {
        if !floor.contains_step(step) {
            return Err(format!("step {step} outside 1..={}", floor.total_steps).into());
        }
    }

    let seeds: CommentSeeds = match seeds {
        Some(path) => parse_seeds(&std::fs::read_to_string(path)?)?,
        None => builtin_seeds(),
    };
    let store = CommentStore::new(seeds, Arc::new(SystemClock));
    let listed: Vec<StepComment<'_>> = store
        .builtin_comments(&floor.id)
        .into_iter()
        .filter(|(s, _)| step.is_none_or(|wanted| wanted == *s))
        .map(|(step, comment)| StepComment { step, comment })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listed)?);
    Ok(())
}

#[derive(Serialize)]
struct TourReport {
    floor: FloorId,
    minimap_unavailable: Option<String>,
    loaded: Vec<Step>,
    failed: Vec<(Step, String)>,
    /// Step images actually requested from the asset source.
    fetches: u64,
    /// Transitions answered by a background preload.
    served_by_preload: u64,
}

/// Drives the state machine across a floor with background preloading
/// running on the tokio runtime, the way the viewer runs it.
async fn tour(config: ViewerConfig, fetcher: Arc<dyn AssetFetcher>, id: &str) -> CliResult<()> {
    let floor = floor_config(&config, id)?.clone();
    let observer = Arc::new(RecordingObserver::new());
    let nav =
        Navigator::new(config, fetcher, Arc::new(TokioSpawner))?.with_observer(observer.clone());

    let mut report = TourReport {
        floor: floor.id.clone(),
        minimap_unavailable: None,
        loaded: Vec::new(),
        failed: Vec::new(),
        fetches: 0,
        served_by_preload: 0,
    };
    let mut record = |step: Step, outcome: Transition| match outcome {
        Transition::Applied => report.loaded.push(step),
        Transition::ConnectionLost(err) => report.failed.push((step, err.to_string())),
        Transition::Rejected(rejection) => report.failed.push((step, rejection.to_string())),
    };

    let entered = if nav.state().current_floor == floor.id {
        nav.start().await
    } else {
        nav.switch_floor(&floor.id).await
    };
    record(1, entered);

    for step in 2..=floor.total_steps {
        let outcome = nav.go_to_step(step).await;
        record(step, outcome);
    }

    report.minimap_unavailable = observer.events().into_iter().find_map(|e| match e {
        ViewerEvent::MinimapUnavailable(reason) => Some(reason),
        _ => None,
    });
    let stats = nav.preloader().stats();
    report.fetches = stats.fetches;
    report.served_by_preload = stats.cache_hits + stats.joined;

    let failures = report.failed.len();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if failures > 0 {
        return Err(format!("{failures} of {} steps failed to load", floor.total_steps).into());
    }
    Ok(())
}
