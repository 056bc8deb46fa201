//! Per-group pipeline and batch orchestration.
//!
//! Groups are independent: every worker owns its frames, masks and output
//! file for the duration of one group, so the pool needs no locking. All
//! per-group errors are contained here; the batch always runs to the end.

use anyhow::{Context, Result};
use camtrap::grouper;
use camtrap::prelude::v1::*;
use diff_detector::DifferenceDetector;
use flow_detector::FlowDetector;
use log::*;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable batch configuration, shared read-only across workers.
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub detection: DetectionConfig,
    pub grouping: GroupingMode,
    pub style: OverlayStyle,
    pub save_mask: bool,
    pub threads: usize,
}

/// End-of-run counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Pipeline stage a group has reached, for log context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Pending,
    Loaded,
    Normalized,
    Detected,
    Composited,
    Written,
}

/// Terminal outcome of one group.
enum Outcome {
    Written(Vec<PathBuf>),
    Skipped,
    Failed,
}

/// Build the configured strategy.
pub fn create_detector(config: &DetectionConfig) -> Box<dyn Detector + Send + Sync> {
    match config.strategy {
        Strategy::Flow => Box::new(FlowDetector::from_config(config)),
        Strategy::Difference => Box::new(DifferenceDetector::from_config(config)),
    }
}

/// Run the whole batch and return the summary counts.
pub fn run(cfg: &RunConfig) -> Result<Summary> {
    let detector = create_detector(&cfg.detection);

    let mut groups = vec![];
    let mut summary = Summary::default();
    collect_groups(cfg, &cfg.input, &mut groups, &mut summary.skipped)?;

    info!(
        "{} group(s) queued from {}",
        groups.len(),
        cfg.input.display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.threads)
        .build()
        .context("cannot build worker pool")?;

    let outcomes: Vec<Outcome> = pool.install(|| {
        groups
            .par_iter()
            .map(|(rel, group)| process_group(cfg, detector.as_ref(), rel, group))
            .collect()
    });

    let mut artifacts = 0;
    for outcome in &outcomes {
        match outcome {
            Outcome::Written(paths) => {
                summary.processed += 1;
                artifacts += paths.len();
            }
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }
    debug!("{artifacts} artifact(s) written under {}", cfg.output.display());

    Ok(summary)
}

/// Recursively gather triples, keyed by their directory relative to the
/// input root. Pattern groups with missing ordinals are counted as skipped.
fn collect_groups(
    cfg: &RunConfig,
    dir: &Path,
    out: &mut Vec<(PathBuf, TripleGroup)>,
    skips: &mut usize,
) -> Result<()> {
    let mut names = vec![];
    let mut subdirs = vec![];

    for entry in fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if grouper::is_image_file(name) {
                names.push(name.to_string());
            }
        }
    }

    let rel = dir
        .strip_prefix(&cfg.input)
        .unwrap_or_else(|_| Path::new(""))
        .to_path_buf();

    let (groups, skipped) = grouper::group_files(dir, &names, cfg.grouping);
    for skip in skipped {
        warn!(
            "group {}: missing ordinal(s) {:?}, skipped",
            skip.key, skip.missing
        );
        *skips += 1;
    }
    out.extend(groups.into_iter().map(|group| (rel.clone(), group)));

    subdirs.sort();
    for sub in subdirs {
        collect_groups(cfg, &sub, out, skips)?;
    }

    Ok(())
}

fn advance(key: &str, from: Stage, to: Stage) -> Stage {
    trace!("group {key}: {from:?} -> {to:?}");
    to
}

/// Drive one group through the pipeline. Never panics the batch: decode and
/// shape errors skip the group, write errors fail it.
fn process_group(
    cfg: &RunConfig,
    detector: &(dyn Detector + Send + Sync),
    rel: &Path,
    group: &TripleGroup,
) -> Outcome {
    let key = group.key.as_str();
    let mut stage = Stage::Pending;

    let mut frames = Vec::with_capacity(group.paths.len());
    for path in &group.paths {
        match Frame::load(path) {
            Ok(frame) => frames.push(frame),
            Err(err) => {
                warn!("group {key}: {err}, skipped");
                return Outcome::Skipped;
            }
        }
    }
    let [first, second, third] =
        <[Frame; 3]>::try_from(frames).expect("three paths per group");
    stage = advance(key, stage, Stage::Loaded);

    let triple = FrameTriple::new(key, first, second, third).normalized();
    stage = advance(key, stage, Stage::Normalized);

    let result = match detector.detect(&triple) {
        Ok(result) => result,
        Err(err) => {
            warn!("group {key}: {err}, skipped");
            return Outcome::Skipped;
        }
    };
    stage = advance(key, stage, Stage::Detected);

    let overlay = match composite(triple.middle(), &result, &cfg.style) {
        Ok(overlay) => overlay,
        Err(err) => {
            warn!("group {key}: {err}, skipped");
            return Outcome::Skipped;
        }
    };
    stage = advance(key, stage, Stage::Composited);

    let out_dir = cfg.output.join(rel);
    if let Err(err) = fs::create_dir_all(&out_dir) {
        error!("group {key}: cannot create {}: {err}", out_dir.display());
        return Outcome::Failed;
    }

    let mut written = vec![];

    let overlay_path = out_dir.join(format!("motion_{key}.jpg"));
    if let Err(err) = overlay.save(&overlay_path) {
        error!("group {key}: {err}");
        return Outcome::Failed;
    }
    written.push(overlay_path);

    if cfg.save_mask {
        let mask_path = out_dir.join(format!("{key}_mask.jpg"));
        if let Err(err) = result.mask.to_frame().save(&mask_path) {
            error!("group {key}: {err}");
            return Outcome::Failed;
        }
        written.push(mask_path);
    }

    stage = advance(key, stage, Stage::Written);
    debug!("group {key}: reached {stage:?}, {} artifact(s)", written.len());

    Outcome::Written(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("motion-batch-{tag}-{}", std::process::id()));
        if root.exists() {
            fs::remove_dir_all(&root).unwrap();
        }
        fs::create_dir_all(&root).unwrap();
        root
    }

    fn run_config(root: &Path, grouping: GroupingMode) -> RunConfig {
        RunConfig {
            input: root.join("in"),
            output: root.join("out"),
            detection: DetectionConfig::new(Strategy::Difference),
            grouping,
            style: OverlayStyle::Blend {
                color: Rgb::RED,
                alpha: 0.5,
            },
            save_mask: false,
            threads: 2,
        }
    }

    fn write_frame(path: &Path, v: u8) {
        Frame::filled(16, 16, Rgb { r: v, g: v, b: v })
            .save(path)
            .unwrap();
    }

    #[test]
    fn one_bad_group_never_aborts_the_batch() {
        let root = temp_root("resilience");
        let input = root.join("in");
        fs::create_dir_all(&input).unwrap();

        // Ten positional groups of three frames each; the middle frame of
        // the fifth group is not decodable.
        for i in 0..30u32 {
            let path = input.join(format!("img{i:03}.jpg"));
            if i == 13 {
                fs::write(&path, b"definitely not a jpeg").unwrap();
            } else {
                write_frame(&path, (40 + i) as u8);
            }
        }

        let summary = run(&run_config(&root, GroupingMode::Positional)).unwrap();

        assert_eq!(
            summary,
            Summary {
                processed: 9,
                skipped: 1,
                failed: 0,
            }
        );

        let outputs: Vec<_> = fs::read_dir(root.join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(outputs.len(), 9);
        assert!(outputs.iter().all(|name| name.starts_with("motion_")));
        assert!(!outputs.contains(&"motion_img013.jpg".to_string()));

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn incomplete_pattern_groups_are_counted_as_skipped() {
        let root = temp_root("pattern");
        let input = root.join("in");
        fs::create_dir_all(&input).unwrap();

        for name in ["A_1.jpg", "A_2.jpg", "A_3.jpg", "B_1.jpg", "B_2.jpg"] {
            write_frame(&input.join(name), 90);
        }

        let summary = run(&run_config(&root, GroupingMode::Pattern)).unwrap();

        assert_eq!(
            summary,
            Summary {
                processed: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert!(root.join("out").join("motion_A.jpg").exists());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn outputs_mirror_the_input_tree() {
        let root = temp_root("mirror");
        let nested = root.join("in").join("site-07").join("2024-07-01");
        fs::create_dir_all(&nested).unwrap();

        for name in ["ECSP2963.jpg", "ECSP2964.jpg", "ECSP2965.jpg"] {
            write_frame(&nested.join(name), 120);
        }

        let mut cfg = run_config(&root, GroupingMode::Positional);
        cfg.save_mask = true;

        let summary = run(&cfg).unwrap();
        assert_eq!(summary.processed, 1);

        let out_dir = root.join("out").join("site-07").join("2024-07-01");
        assert!(out_dir.join("motion_ECSP2964.jpg").exists());
        assert!(out_dir.join("ECSP2964_mask.jpg").exists());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn boxes_style_writes_annotated_overlay() {
        let root = temp_root("boxes");
        let input = root.join("in");
        fs::create_dir_all(&input).unwrap();

        // A 20x20 moving patch, large enough to pass the area gate.
        let background = Frame::filled(64, 64, Rgb { r: 30, g: 30, b: 30 });
        background.save(&input.join("a.jpg")).unwrap();
        background.save(&input.join("c.jpg")).unwrap();

        let mut data = background.data().to_vec();
        for y in 20..40usize {
            for x in 20..40usize {
                data[(y * 64 + x) * 3..(y * 64 + x) * 3 + 3].copy_from_slice(&[220, 220, 220]);
            }
        }
        Frame::from_raw(64, 64, data)
            .save(&input.join("b.jpg"))
            .unwrap();

        let mut cfg = run_config(&root, GroupingMode::Positional);
        cfg.detection.min_region_area = Some(225);
        cfg.style = OverlayStyle::Boxes {
            color: Rgb::GREEN,
            thickness: 2,
        };

        let summary = run(&cfg).unwrap();
        assert_eq!(summary.processed, 1);
        assert!(root.join("out").join("motion_b.jpg").exists());

        fs::remove_dir_all(&root).unwrap();
    }
}
