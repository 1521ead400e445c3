//! Rawflow CLI - tile negotiation and resampling from the command line.
//!
//! Builds a filter chain from command-line options (in the order given),
//! then prints the forward plan, the per-tile requests, or the result of
//! resampling one synthetic tile, as JSON.

use anyhow::{bail, Context, Result};
use rawflow::prelude::*;
use serde_json::json;
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "forward" => parse_options(&args[2..]).and_then(|opts| forward(&opts)),
        "tiles" => parse_options(&args[2..]).and_then(|opts| tiles(&opts)),
        "resample" => parse_options(&args[2..]).and_then(|opts| resample(&opts)),
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(&args[0]);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("Rawflow v{}", rawflow::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  forward           Print the forward plan of the chain");
    println!("  tiles             Plan every output tile and summarize the requests");
    println!("  resample          Resample one synthetic tile through the geometric stages");
    println!("  help              Show this help message");
    println!();
    println!("Source options:");
    println!("  --size <WxH>            Source size in pixels (default: 4000x3000)");
    println!("  --pitch <p>             Tile pitch, 1 for export, >1 for preview (default: 1)");
    println!("  --tile <x,y,w,h>        Output tile for 'resample' (default: centre 256x256)");
    println!("  --threads <n>           Worker threads, 0 = all cores");
    println!("  --config <path>         Engine configuration file (TOML)");
    println!();
    println!("Stages, applied in the order given:");
    println!("  --rotate <deg>          Rotation about the frame centre");
    println!("  --shift <v,h>           Perspective correction angles in degrees");
    println!("  --scale <f>             Uniform scale about the frame centre");
    println!("  --distortion <k1[,k2]>  Radial lens distortion");
    println!("  --ca <red,blue>         Chromatic aberration channel scales");
    println!("  --crop <x1,y1,x2,y2>    Crop rectangle");
    println!("  --blur <r>              Blur radius in pixels");
    println!("  --sharpen <r>           Sharpen radius in pixels");
    println!("  --tone                  Per-pixel tone stage");
}

/// Parsed command-line options.
#[derive(Debug)]
struct Options {
    source: Dimensions,
    pitch: f64,
    tile: Option<Dimensions>,
    config: EngineConfig,
    stages: Vec<StageSpec>,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut size = (4000u32, 3000u32);
    let mut pitch = 1.0;
    let mut tile = None;
    let mut threads: Option<usize> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut stages = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--tone" {
            stages.push(StageSpec::Tone);
            i += 1;
            continue;
        }
        let value = args
            .get(i + 1)
            .with_context(|| format!("missing value for {}", flag))?;
        match flag {
            "--size" => size = parse_dimensions(value).context("expected --size <WxH>")?,
            "--pitch" => pitch = value.parse().context("invalid --pitch")?,
            "--tile" => {
                let [x, y, w, h] = parse_floats::<4>(value).context("expected --tile <x,y,w,h>")?;
                tile = Some(Dimensions::new(w as u32, h as u32).with_position(x, y));
            }
            "--threads" => threads = Some(value.parse().context("invalid --threads")?),
            "--config" => config_path = Some(PathBuf::from(value)),
            "--rotate" => stages.push(StageSpec::Rotate {
                angle: value.parse().context("invalid --rotate")?,
            }),
            "--shift" => {
                let [vertical, horizontal] = parse_floats::<2>(value).context("expected --shift <v,h>")?;
                stages.push(StageSpec::Shift {
                    vertical,
                    horizontal,
                    focal: None,
                });
            }
            "--scale" => stages.push(StageSpec::Scale {
                factor: value.parse().context("invalid --scale")?,
            }),
            "--distortion" => {
                let mut parts = value.split(',').map(str::parse::<f64>);
                let k1 = parts.next().context("expected --distortion <k1[,k2]>")??;
                let k2 = parts.next().transpose()?.unwrap_or(0.0);
                stages.push(StageSpec::Distortion { k1, k2 });
            }
            "--ca" => {
                let [red, blue] = parse_floats::<2>(value).context("expected --ca <red,blue>")?;
                stages.push(StageSpec::ChromaticAberration { red, blue });
            }
            "--crop" => {
                let [x1, y1, x2, y2] = parse_floats::<4>(value).context("expected --crop <x1,y1,x2,y2>")?;
                stages.push(StageSpec::Crop { x1, y1, x2, y2 });
            }
            "--blur" => stages.push(StageSpec::Blur {
                radius: value.parse().context("invalid --blur")?,
            }),
            "--sharpen" => stages.push(StageSpec::Sharpen {
                radius: value.parse().context("invalid --sharpen")?,
            }),
            _ => bail!("unknown option: {}", flag),
        }
        i += 2;
    }

    let mut config = match &config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(threads) = threads {
        config = config.with_threads(threads);
    }
    config.validate()?;

    Ok(Options {
        source: Dimensions::new(size.0, size.1),
        pitch,
        tile,
        config,
        stages,
    })
}

fn build_chain(opts: &Options) -> Result<FilterChain> {
    let chain = FilterChain::from_specs(
        &opts.stages,
        &opts.source,
        opts.config.backward_margin as f64,
    )
    .context("failed to build filter chain")?;
    Ok(chain)
}

fn forward(opts: &Options) -> Result<()> {
    let chain = build_chain(opts)?;
    let plan = chain.plan(&opts.source)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn tiles(opts: &Options) -> Result<()> {
    let chain = build_chain(opts)?;
    let plan = chain.plan(&opts.source)?;
    let grid = TileGrid::from_config(&plan.output, &opts.config, opts.pitch);
    let (cols, rows) = grid.shape();
    let planned = plan_tiles(&chain, &plan, grid)?;

    let empty = planned.iter().filter(|t| t.source.is_none()).count();
    let total: u64 = planned.iter().map(TilePlan::source_pixels).sum();
    let largest = planned
        .iter()
        .filter_map(|t| t.source)
        .max_by_key(|s| s.size.area());

    let summary = json!({
        "output": plan.output,
        "pitch": opts.pitch,
        "columns": cols,
        "rows": rows,
        "tiles": planned.len(),
        "empty_tiles": empty,
        "source_pixels": total,
        "source_overhead": total as f64 / plan.source.size.area() as f64,
        "largest_request": largest,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn resample(opts: &Options) -> Result<()> {
    let chain = build_chain(opts)?;
    let plan = chain.plan(&opts.source)?;

    let tile = match opts.tile {
        Some(tile) => tile,
        None => {
            let (cx, cy) = plan.output.rect().center();
            let side = 256.0 * opts.pitch;
            Dimensions::new(256, 256).with_position(cx - side * 0.5, cy - side * 0.5)
        }
    }
    .with_pitch(opts.pitch, opts.pitch);

    let tile_plan = chain.plan_tile(&plan, &tile)?;
    let request = tile_plan
        .source
        .context("tile lies outside the transformed frame")?;

    let mut mappings = MappingChain::new().with_margin(chain.margin());
    for segment in chain.segments() {
        if let rawflow::pipeline::Segment::Geometric { chain: segment_chain, .. } = segment {
            for mapping in segment_chain.mappings() {
                mappings.push(mapping.clone());
            }
        }
    }

    // synthetic checkerboard with a colour ramp
    let input = RgbPlane::from_fn(&request, |x, y| {
        let check = (((x / 64.0).floor() + (y / 64.0).floor()) as i64 & 1) as f32;
        [check, (x / 4000.0) as f32, (y / 3000.0) as f32]
    })?;
    let resampler = Resampler::from_config(mappings, &opts.config, opts.pitch > 1.0);
    let (output, stats) = resampler.resample(&input, &tile)?;

    let summary = json!({
        "tile": tile,
        "request": request,
        "episode": stats.episode.to_string(),
        "priority": stats.priority,
        "threads": stats.threads,
        "duration_ms": stats.duration.as_secs_f64() * 1000.0,
        "mean_rgb": output.mean(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn parse_dimensions(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_floats<const N: usize>(s: &str) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    let mut parts = s.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}
