//! Batch motion detection over directories of trail-camera frame triples.
//!
//! Walks an input tree, groups images into triples, runs the configured
//! detection strategy on every group and mirrors the composited artifacts
//! under the output root. One bad group never aborts the batch.

use anyhow::{Context, Result};
use camtrap::prelude::v1::*;
use clap::*;
use log::*;
use std::fs::File;
use std::path::PathBuf;

mod runner;

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("motion-batch")
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .required(true)
                .help("Root directory of input frames"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .required(true)
                .help("Root directory for output artifacts"),
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .short('s')
                .takes_value(true)
                .default_value("flow")
                .help("Detection strategy: flow | difference"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .short('t')
                .takes_value(true)
                .help("Magnitude (flow, pixels) or intensity (difference, 0-255) threshold"),
        )
        .arg(
            Arg::new("combine")
                .long("combine")
                .takes_value(true)
                .help("Pairwise signal combination: and | or"),
        )
        .arg(
            Arg::new("grouping")
                .long("grouping")
                .short('g')
                .takes_value(true)
                .default_value("positional")
                .help("Triple grouping: positional | pattern"),
        )
        .arg(
            Arg::new("style")
                .long("style")
                .takes_value(true)
                .default_value("blend")
                .help("Overlay style: replace | blend | boxes"),
        )
        .arg(
            Arg::new("color")
                .long("color")
                .takes_value(true)
                .default_value("red")
                .help("Highlight colour: red | green | blue | white | black"),
        )
        .arg(
            Arg::new("alpha")
                .long("alpha")
                .takes_value(true)
                .default_value("0.5")
                .help("Blend weight of the colour layer, 0-1"),
        )
        .arg(
            Arg::new("thickness")
                .long("thickness")
                .takes_value(true)
                .default_value("2")
                .help("Outline thickness for the boxes style"),
        )
        .arg(
            Arg::new("morphology")
                .long("morphology")
                .help("Erode/dilate cleanup of the difference mask"),
        )
        .arg(
            Arg::new("min-area")
                .long("min-area")
                .takes_value(true)
                .help("Minimum bounding-box area for extracted regions"),
        )
        .arg(
            Arg::new("save-mask")
                .long("save-mask")
                .help("Also write the raw 0/255 mask per group"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .short('j')
                .takes_value(true)
                .help("Worker pool size, defaults to available cores"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON detection config; overrides the detection flags"),
        )
        .arg(
            Arg::new("flow-window")
                .long("flow-window")
                .takes_value(true)
                .help("Flow estimation window side length"),
        )
        .arg(
            Arg::new("flow-levels")
                .long("flow-levels")
                .takes_value(true)
                .help("Flow pyramid levels"),
        )
        .arg(
            Arg::new("flow-iterations")
                .long("flow-iterations")
                .takes_value(true)
                .help("Flow refinement iterations per level"),
        )
        .get_matches();

    let mut detection = build_detection_config(&matches)?;
    let style = build_style(&matches, &mut detection)?;
    detection.validate()?;

    let threads = match matches.value_of("threads") {
        Some(threads) => {
            let threads = threads.parse().context("cannot parse --threads")?;
            if threads == 0 {
                return Err(Error::Config("worker pool size must be nonzero".into()).into());
            }
            threads
        }
        None => num_cpus::get(),
    };

    let cfg = runner::RunConfig {
        input: PathBuf::from(matches.value_of("input").unwrap()),
        output: PathBuf::from(matches.value_of("output").unwrap()),
        detection,
        grouping: matches.value_of("grouping").unwrap().parse()?,
        style,
        save_mask: matches.is_present("save-mask"),
        threads,
    };

    let summary = runner::run(&cfg)?;

    info!(
        "{} group(s) processed, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );

    Ok(())
}

fn build_detection_config(matches: &ArgMatches) -> Result<DetectionConfig> {
    if let Some(path) = matches.value_of("config") {
        let file = File::open(path).with_context(|| format!("cannot open config {path}"))?;
        let config = serde_json::from_reader(file)
            .with_context(|| format!("cannot parse config {path}"))?;
        return Ok(config);
    }

    let strategy: Strategy = matches.value_of("strategy").unwrap().parse()?;
    let mut config = DetectionConfig::new(strategy);

    if let Some(threshold) = matches.value_of("threshold") {
        config.threshold = threshold.parse().context("cannot parse --threshold")?;
    }
    if let Some(combine) = matches.value_of("combine") {
        config.combine = combine.parse()?;
    }
    if matches.is_present("morphology") {
        config.morphology = true;
    }
    if let Some(area) = matches.value_of("min-area") {
        config.min_region_area = Some(area.parse().context("cannot parse --min-area")?);
    }
    if let Some(window) = matches.value_of("flow-window") {
        config.flow.window = window.parse().context("cannot parse --flow-window")?;
    }
    if let Some(levels) = matches.value_of("flow-levels") {
        config.flow.levels = levels.parse().context("cannot parse --flow-levels")?;
    }
    if let Some(iterations) = matches.value_of("flow-iterations") {
        config.flow.iterations = iterations
            .parse()
            .context("cannot parse --flow-iterations")?;
    }

    Ok(config)
}

fn build_style(matches: &ArgMatches, detection: &mut DetectionConfig) -> Result<OverlayStyle> {
    let color = parse_color(matches.value_of("color").unwrap())?;

    let style = match matches.value_of("style").unwrap() {
        "replace" => OverlayStyle::Replace { color },
        "blend" => {
            let alpha: f32 = matches
                .value_of("alpha")
                .unwrap()
                .parse()
                .context("cannot parse --alpha")?;
            if !(0.0..=1.0).contains(&alpha) {
                return Err(Error::Config(format!("alpha must be within 0-1, got {alpha}")).into());
            }
            OverlayStyle::Blend { color, alpha }
        }
        "boxes" => {
            // Box annotation needs regions; switch extraction on if the
            // flags left it off.
            if detection.min_region_area.is_none() {
                detection.min_region_area = Some(DetectionConfig::DEFAULT_MIN_REGION_AREA);
            }
            let thickness = matches
                .value_of("thickness")
                .unwrap()
                .parse()
                .context("cannot parse --thickness")?;
            OverlayStyle::Boxes { color, thickness }
        }
        other => return Err(Error::Config(format!("unknown overlay style `{other}`")).into()),
    };

    Ok(style)
}

fn parse_color(name: &str) -> Result<Rgb> {
    match name {
        "red" => Ok(Rgb::RED),
        "green" => Ok(Rgb::GREEN),
        "blue" => Ok(Rgb::BLUE),
        "white" => Ok(Rgb::WHITE),
        "black" => Ok(Rgb::BLACK),
        other => Err(Error::Config(format!("unknown colour `{other}`")).into()),
    }
}
