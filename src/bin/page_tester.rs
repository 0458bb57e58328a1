//! Page manager tester: drives a `PageManager` over a synthetic database.
//!
//! Usage: cargo run --release --bin page_tester -- <random|fly> [OPTIONS]
//!
//! Options:
//!   --lods <N>        Number of levels in the database (default: 4)
//!   --grid <N>        Level 0 grid size in tiles (default: 16)
//!   --tile <METERS>   Level 0 tile size (default: 100)
//!   --scale <S>       Page distance scale (default: 1.2)
//!   --jumps <N>       Random mode: number of jumps (default: 100)
//!   --seed <SEED>     Random mode: seed (default: 12345)
//!   --step <METERS>   Fly mode: distance per step (default: 10)
//!   --verbose         Print the manager status after every step
//!
//! Every step processes all pending unloads and loads, then checks that no
//! tile is loaded without its parent.

use std::sync::Arc;
use std::time::Instant;

use glam::{DVec2, IVec2};
use serde_json::json;

use terrapager::core::Result;
use terrapager::streaming::{LoadOutcome, PageManager};
use terrapager::tile::{GridDatabaseConfig, GridTileSource, TileSource};

#[derive(Default)]
struct RunStats {
    steps: usize,
    loads: usize,
    unloads: usize,
    failed: usize,
    max_loaded: usize,
    orphans: usize,
}

fn main() {
    terrapager::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(mode) = args.get(1).filter(|a| !a.starts_with("--")).cloned() else {
        eprintln!("usage: page_tester <random|fly> [--lods N] [--grid N] [--tile M] [--scale S] [--jumps N] [--seed S] [--step M] [--verbose]");
        std::process::exit(2);
    };

    let lods = parse_arg::<u32>(&args, "--lods").unwrap_or(4);
    let grid = parse_arg::<i32>(&args, "--grid").unwrap_or(16);
    let tile = parse_arg::<f64>(&args, "--tile").unwrap_or(100.0);
    let scale = parse_arg::<f64>(&args, "--scale").unwrap_or(1.2);
    let verbose = args.iter().any(|a| a == "--verbose");

    let source = Arc::new(GridTileSource::new(GridDatabaseConfig {
        num_lods: lods,
        base_tile_size: tile,
        base_grid: IVec2::splat(grid),
        base_range: tile,
        ..Default::default()
    }));

    let path = match mode.as_str() {
        "random" => {
            let jumps = parse_arg::<usize>(&args, "--jumps").unwrap_or(100);
            let seed = parse_arg::<u64>(&args, "--seed").unwrap_or(12345);
            random_path(source.as_ref(), jumps, seed)
        }
        "fly" => {
            let step = parse_arg::<f64>(&args, "--step").unwrap_or(10.0);
            fly_path(source.as_ref(), step)
        }
        other => {
            eprintln!("unknown mode `{other}`, expected `random` or `fly`");
            std::process::exit(2);
        }
    };

    println!("=== Terrapager Page Tester ===");
    println!("Mode:  {mode}");
    println!("Lods:  {lods}, grid {grid}x{grid}, tile {tile}m");
    println!("Scale: {scale}");
    println!("Steps: {}", path.len());
    println!();

    let start = Instant::now();
    let stats = match run(source, scale, &path, verbose) {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("page tester failed: {err}");
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    let summary = json!({
        "mode": mode,
        "steps": stats.steps,
        "loads": stats.loads,
        "unloads": stats.unloads,
        "failed": stats.failed,
        "max_loaded": stats.max_loaded,
        "orphans": stats.orphans,
        "elapsed_ms": elapsed.as_secs_f64() * 1000.0,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(err) => log::error!("failed to serialize summary: {err}"),
    }

    if stats.orphans > 0 {
        std::process::exit(1);
    }
}

fn run(source: Arc<GridTileSource>, scale: f64, path: &[DVec2], verbose: bool) -> Result<RunStats> {
    let mut manager = PageManager::new(source.clone(), scale)?;
    let mut stats = RunStats::default();

    for &position in path {
        manager.set_location(position);
        stats.steps += 1;

        while manager.next_unload().is_some() {
            manager.ack_unload();
            stats.unloads += 1;
        }
        while let Some(request) = manager.next_load() {
            match source.load_tile(request.key) {
                Ok(content) => {
                    manager.ack_load(LoadOutcome::Loaded { children: content.children });
                    stats.loads += 1;
                }
                Err(err) => {
                    log::warn!("{err}");
                    manager.ack_load(LoadOutcome::Unavailable);
                    stats.failed += 1;
                }
            }
        }

        let loaded = manager.loaded_tiles();
        stats.max_loaded = stats.max_loaded.max(loaded.len());
        for key in &loaded {
            if let Some(parent) = key.quadtree_parent() {
                if !manager.is_loaded(parent) {
                    log::error!("tile {key} loaded without its parent {parent}");
                    stats.orphans += 1;
                }
            }
        }

        if verbose {
            println!("--- step {} at ({:.1}, {:.1})", stats.steps, position.x, position.y);
            println!("{}", manager.status());
        }
    }

    log::info!(
        "{} steps, {} loads, {} unloads, {} tiles still loaded",
        stats.steps,
        stats.loads,
        stats.unloads,
        manager.loaded_tiles().len()
    );
    Ok(stats)
}

/// Database extent, measured from its origin.
fn local_extent(source: &dyn TileSource) -> DVec2 {
    let header = source.header();
    header.extents_max() - header.origin
}

/// `jumps` uniformly random database-relative positions.
fn random_path(source: &dyn TileSource, jumps: usize, seed: u64) -> Vec<DVec2> {
    let extent = local_extent(source);
    let mut rng = XorShift::new(seed);
    (0..jumps)
        .map(|_| DVec2::new(rng.next_f64(), rng.next_f64()) * extent)
        .collect()
}

/// Straight flight from the south-west corner to the north-east corner,
/// in database-relative coordinates.
fn fly_path(source: &dyn TileSource, step: f64) -> Vec<DVec2> {
    let from = DVec2::ZERO;
    let to = local_extent(source);
    let steps = ((to - from).length() / step.max(f64::EPSILON)).ceil().max(1.0) as usize;
    (0..=steps)
        .map(|i| from.lerp(to, i as f64 / steps as f64))
        .collect()
}

struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        // zero is a fixed point
        Self(seed.max(1))
    }

    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
