use std::env;

use cluster::{ClusterConfig, GeoPos, PlacemarkSet, WebMercator};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "frontier" => cmd_frontier(args),
        _ => Err(usage()),
    }
}

fn cmd_frontier(args: Vec<String>) -> Result<(), String> {
    let mut markers = 200usize;
    let mut depth = 14usize;
    let mut distance_px = 40u32;
    let mut scale = 2f64.powi(-10);
    let mut seed = 1u64;
    let mut clustering = true;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--markers" => {
                i += 1;
                markers = parse_value(&args, i, "--markers")?;
            }
            "--depth" => {
                i += 1;
                depth = parse_value(&args, i, "--depth")?;
            }
            "--distance" => {
                i += 1;
                distance_px = parse_value(&args, i, "--distance")?;
            }
            "--scale" => {
                i += 1;
                scale = parse_value(&args, i, "--scale")?;
            }
            "--seed" => {
                i += 1;
                seed = parse_value(&args, i, "--seed")?;
            }
            "--no-clustering" => {
                clustering = false;
            }
            other => {
                return Err(format!("unknown arg: {other}\n\n{}", usage()));
            }
        }
        i += 1;
    }

    if scale <= 0.0 {
        return Err("--scale must be strictly positive".to_string());
    }

    let mut set = PlacemarkSet::new(ClusterConfig {
        clustering,
        tree_depth: depth,
        cluster_distance_px: distance_px,
        marker_image: None,
    });
    let projection = WebMercator::new(scale);

    // Deterministic scatter over a fixed box (western Europe, roughly).
    let mut state = seed;
    for _ in 0..markers {
        let lat = 40.0 + unit(&mut state) * 12.0;
        let lon = -5.0 + unit(&mut state) * 20.0;
        set.add(GeoPos::new(lat, lon), &projection);
    }

    let snapshot = set.frontier(scale);
    eprintln!(
        "seeded {} markers (depth={} distance={}px scale={scale})",
        set.len(),
        set.depth(),
        distance_px
    );

    let value = serde_json::json!({
        "markers": set.len(),
        "scale": scale,
        "clustering": clustering,
        "points": snapshot
            .points
            .iter()
            .map(|p| serde_json::json!([p.x, p.y]))
            .collect::<Vec<_>>(),
        "clusters": snapshot
            .clusters
            .iter()
            .map(|c| serde_json::json!({
                "x": c.proj.x,
                "y": c.proj.y,
                "count": c.count,
            }))
            .collect::<Vec<_>>(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&value).map_err(|e| format!("json: {e}"))?
    );

    Ok(())
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    let raw = args
        .get(i)
        .ok_or_else(|| format!("{flag} requires a value"))?;
    raw.parse()
        .map_err(|_| format!("{flag}: invalid value {raw:?}"))
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(state: &mut u64) -> f64 {
    (splitmix64(state) >> 11) as f64 / (1u64 << 53) as f64
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "geomark".to_string());
    format!(
        "Usage:\n  {exe} frontier [--markers N] [--depth D] [--distance PX] [--scale S] [--seed SEED] [--no-clustering]\n\nNotes:\n- Markers are seeded deterministically from SEED inside a fixed lat/lon box.\n- Output is the render frontier at the given camera scale, as JSON.\n"
    )
}
