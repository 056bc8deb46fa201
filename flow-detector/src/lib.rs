//! # Dense pyramidal optical flow detection
//!
//! Estimates a dense displacement field for each adjacent frame pair of a
//! triple with a coarse-to-fine iterative scheme. Grayscale pyramids are
//! built for both frames; at every level the field is refined by solving the
//! 2x2 normal equations of the brightness constancy constraint over a local
//! window, then carried up to the next finer level. Pixels whose
//! displacement magnitude exceeds the configured threshold in both legs
//! (AND) or either leg (OR) form the motion mask.

use camtrap::prelude::v1::*;
use nalgebra as na;

/// Pyramid levels stop once an image side would fall below this.
const MIN_LEVEL_DIM: u32 = 8;

/// Optical flow strategy over frame triples.
///
/// Stateless between calls; detection is deterministic for identical pixel
/// buffers and settings.
pub struct FlowDetector {
    /// Displacement magnitude threshold, in pixels.
    pub threshold: f32,
    /// Combination of the two adjacent-pair masks.
    pub combine: CombineMode,
    /// Estimator tuning profile.
    pub profile: FlowProfile,
}

impl Default for FlowDetector {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            combine: CombineMode::And,
            profile: FlowProfile::default(),
        }
    }
}

impl FlowDetector {
    /// Build the strategy from a detection configuration.
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.threshold,
            combine: config.combine,
            profile: config.flow,
        }
    }
}

impl Detector for FlowDetector {
    fn detect(&self, triple: &FrameTriple) -> Result<DetectionResult> {
        let gray1 = triple.earliest().to_luminance();
        let gray2 = triple.middle().to_luminance();
        let gray3 = triple.latest().to_luminance();

        let first = estimate(&gray1, &gray2, &self.profile)?;
        let second = estimate(&gray2, &gray3, &self.profile)?;

        let mask = first
            .to_mask(self.threshold)
            .combine(&second.to_mask(self.threshold), self.combine)?;

        Ok(DetectionResult {
            mask,
            regions: None,
        })
    }
}

/// Estimate dense flow from `prev` to `next`.
///
/// Fails with [`Error::ShapeMismatch`] when the two frames disagree in
/// dimensions.
///
/// # Arguments
///
/// * `prev` - earlier luminance frame.
/// * `next` - later luminance frame.
/// * `profile` - window, pyramid depth and iteration count to use.
pub fn estimate(
    prev: &LuminanceFrame,
    next: &LuminanceFrame,
    profile: &FlowProfile,
) -> Result<FlowField> {
    if prev.dim() != next.dim() {
        return Err(Error::shape(prev.dim(), next.dim()));
    }

    let mut prev_pyr = vec![Plane::from_luminance(prev)];
    let mut next_pyr = vec![Plane::from_luminance(next)];

    for level in 1..profile.levels as usize {
        let (width, height) = prev_pyr[level - 1].dim();
        if width / 2 < MIN_LEVEL_DIM as usize || height / 2 < MIN_LEVEL_DIM as usize {
            break;
        }
        let down_prev = prev_pyr[level - 1].downscale();
        let down_next = next_pyr[level - 1].downscale();
        prev_pyr.push(down_prev);
        next_pyr.push(down_next);
    }

    // Coarse-to-fine refinement, starting from a zero field at the top.
    let top = prev_pyr.len() - 1;
    let mut flow = vec![na::Vector2::zeros(); prev_pyr[top].size()];

    for level in (0..=top).rev() {
        if level != top {
            flow = upsample(&flow, &prev_pyr[level + 1], &prev_pyr[level]);
        }
        refine(&prev_pyr[level], &next_pyr[level], &mut flow, profile);
    }

    let (width, height) = prev_pyr[0].dim();
    let mut field = FlowField::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            field.set_motion(x as u32, y as u32, flow[y * width + x]);
        }
    }

    Ok(field)
}

/// Run one level of iterative window refinement.
fn refine(
    prev: &Plane,
    next: &Plane,
    flow: &mut Vec<na::Vector2<f32>>,
    profile: &FlowProfile,
) {
    let (width, height) = prev.dim();
    let radius = (profile.window / 2) as isize;
    let (grad_x, grad_y) = prev.gradients();

    for _ in 0..profile.iterations {
        let mut updated = flow.clone();

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let guess = flow[idx];

                // Accumulate the structure tensor and the mismatch against
                // the warped second image over the window.
                let mut a11 = 0f32;
                let mut a12 = 0f32;
                let mut a22 = 0f32;
                let mut b1 = 0f32;
                let mut b2 = 0f32;

                for oy in -radius..=radius {
                    for ox in -radius..=radius {
                        let sx = x as isize + ox;
                        let sy = y as isize + oy;

                        let ix = grad_x.get_clamped(sx, sy);
                        let iy = grad_y.get_clamped(sx, sy);
                        let it = next.sample(sx as f32 + guess.x, sy as f32 + guess.y)
                            - prev.get_clamped(sx, sy);

                        a11 += ix * ix;
                        a12 += ix * iy;
                        a22 += iy * iy;
                        b1 += ix * it;
                        b2 += iy * it;
                    }
                }

                // A flat window has a singular system; leave the guess as is.
                let det = a11 * a22 - a12 * a12;
                if det.abs() < 1e-4 {
                    continue;
                }

                let a = na::Matrix2::new(a11, a12, a12, a22);
                let b = na::Vector2::new(-b1, -b2);

                if let Some(step) = a.lu().solve(&b) {
                    updated[idx] = guess + step.cap_magnitude(radius as f32);
                }
            }
        }

        // Light spatial smoothing keeps the field coherent across regions
        // the window constraint cannot anchor.
        smooth(&mut updated, width, height);
        *flow = updated;
    }
}

/// 3x3 box smoothing of the displacement field.
fn smooth(flow: &mut Vec<na::Vector2<f32>>, width: usize, height: usize) {
    let src = flow.clone();

    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut acc = na::Vector2::zeros();
            let mut cnt = 0f32;

            for oy in -1..=1 {
                for ox in -1..=1 {
                    let (nx, ny) = (x + ox, y + oy);
                    if (0..width as isize).contains(&nx) && (0..height as isize).contains(&ny) {
                        acc += src[ny as usize * width + nx as usize];
                        cnt += 1.0;
                    }
                }
            }

            flow[y as usize * width + x as usize] = acc / cnt;
        }
    }
}

/// Carry a coarse field to the next finer level, rescaling displacements.
fn upsample(flow: &[na::Vector2<f32>], coarse: &Plane, fine: &Plane) -> Vec<na::Vector2<f32>> {
    let (cw, ch) = coarse.dim();
    let (fw, fh) = fine.dim();
    let scale_x = fw as f32 / cw as f32;
    let scale_y = fh as f32 / ch as f32;

    let mut out = Vec::with_capacity(fw * fh);

    for y in 0..fh {
        for x in 0..fw {
            let cx = (((x as f32 + 0.5) / scale_x) - 0.5)
                .clamp(0.0, (cw - 1) as f32)
                .round() as usize;
            let cy = (((y as f32 + 0.5) / scale_y) - 0.5)
                .clamp(0.0, (ch - 1) as f32)
                .round() as usize;

            let motion = flow[cy * cw + cx];
            out.push(na::Vector2::new(motion.x * scale_x, motion.y * scale_y));
        }
    }

    out
}

/// Floating point grayscale plane used within the pyramid.
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_luminance(frame: &LuminanceFrame) -> Self {
        Self {
            width: frame.width() as usize,
            height: frame.height() as usize,
            data: frame.data().iter().map(|&v| v as f32).collect(),
        }
    }

    fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    /// Intensity at integer coordinates, clamped to the border.
    fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample at float coordinates, with border replication.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.data[y0 * self.width + x0] * (1.0 - fx) + self.data[y0 * self.width + x1] * fx;
        let bottom =
            self.data[y1 * self.width + x0] * (1.0 - fx) + self.data[y1 * self.width + x1] * fx;

        top * (1.0 - fy) + bottom * fy
    }

    /// Central-difference gradient planes.
    fn gradients(&self) -> (Plane, Plane) {
        let mut gx = Vec::with_capacity(self.size());
        let mut gy = Vec::with_capacity(self.size());

        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                gx.push((self.get_clamped(x + 1, y) - self.get_clamped(x - 1, y)) * 0.5);
                gy.push((self.get_clamped(x, y + 1) - self.get_clamped(x, y - 1)) * 0.5);
            }
        }

        (
            Plane {
                width: self.width,
                height: self.height,
                data: gx,
            },
            Plane {
                width: self.width,
                height: self.height,
                data: gy,
            },
        )
    }

    /// Halve the plane by 2x2 averaging.
    fn downscale(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);

        for y in 0..height {
            for x in 0..width {
                let sum = self.get_clamped(2 * x as isize, 2 * y as isize)
                    + self.get_clamped(2 * x as isize + 1, 2 * y as isize)
                    + self.get_clamped(2 * x as isize, 2 * y as isize + 1)
                    + self.get_clamped(2 * x as isize + 1, 2 * y as isize + 1);
                data.push(sum * 0.25);
            }
        }

        Plane {
            width,
            height,
            data,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use camtrap::frame::Frame;

    /// Keep the test profile small; estimation cost grows with
    /// window area times iterations.
    fn test_profile() -> FlowProfile {
        FlowProfile {
            window: 9,
            levels: 2,
            iterations: 20,
        }
    }

    /// Frame with a deterministic mild texture so the estimator has
    /// gradients to anchor on.
    fn textured_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let v = (40 + (x * 7 + y * 13) % 47) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::from_raw(width, height, data)
    }

    /// Uniform background with a bright cone-shaped blob centred at
    /// `(cx, cy)`; the radial ramp gives gradients in every direction.
    fn blob_frame(width: u32, height: u32, cx: f32, cy: f32, radius: f32) -> Frame {
        let mut data = Vec::with_capacity((width * height) as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                let v = (20.0 + 220.0 * (1.0 - dist / radius).max(0.0)) as u8;
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::from_raw(width, height, data)
    }

    #[test]
    fn identical_frames_produce_empty_mask() {
        let frame = textured_frame(32, 32);
        let triple = FrameTriple::new("static", frame.clone(), frame.clone(), frame);

        let detector = FlowDetector {
            profile: test_profile(),
            ..Default::default()
        };

        let result = detector.detect(&triple).unwrap();
        assert_eq!(result.mask.count(), 0);
        assert!(result.regions.is_none());
    }

    #[test]
    fn translated_blob_is_detected_in_swept_region() {
        let (width, height) = (48, 48);
        let radius = 6.0;
        let triple = FrameTriple::new(
            "walk",
            blob_frame(width, height, 16.0, 24.0, radius),
            blob_frame(width, height, 19.0, 24.0, radius),
            blob_frame(width, height, 22.0, 24.0, radius),
        );

        let detector = FlowDetector {
            threshold: 1.0,
            combine: CombineMode::And,
            profile: test_profile(),
        };

        let mask = detector.detect(&triple).unwrap().mask;

        // Motion must show up around the blob's path.
        let mut inside = 0;
        for y in 16..33u32 {
            for x in 8..31u32 {
                if mask.get(x, y) {
                    inside += 1;
                }
            }
        }
        assert!(inside >= 20, "only {inside} moving pixels near the blob");

        // The static background away from the path stays predominantly
        // quiet.
        let mut outside_total = 0;
        let mut outside_moving = 0;
        for y in 0..height {
            for x in 0..width {
                let near_path = (4..35).contains(&x) && (12..37).contains(&y);
                if !near_path {
                    outside_total += 1;
                    if mask.get(x, y) {
                        outside_moving += 1;
                    }
                }
            }
        }
        assert!(
            (outside_moving as f32) < 0.1 * outside_total as f32,
            "{outside_moving} of {outside_total} background pixels flagged"
        );
    }

    #[test]
    fn or_mask_is_superset_of_and_mask() {
        let (width, height) = (40, 40);
        let triple = FrameTriple::new(
            "walk",
            blob_frame(width, height, 14.0, 20.0, 5.0),
            blob_frame(width, height, 18.0, 20.0, 5.0),
            blob_frame(width, height, 22.0, 20.0, 5.0),
        );

        let anded = FlowDetector {
            threshold: 1.0,
            combine: CombineMode::And,
            profile: test_profile(),
        }
        .detect(&triple)
        .unwrap()
        .mask;
        let ored = FlowDetector {
            threshold: 1.0,
            combine: CombineMode::Or,
            profile: test_profile(),
        }
        .detect(&triple)
        .unwrap()
        .mask;

        for (o, a) in ored.data().iter().zip(anded.data()) {
            assert!(*o || !*a);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let (width, height) = (32, 32);
        let triple = FrameTriple::new(
            "walk",
            blob_frame(width, height, 10.0, 16.0, 5.0),
            blob_frame(width, height, 13.0, 16.0, 5.0),
            blob_frame(width, height, 16.0, 16.0, 5.0),
        );

        let detector = FlowDetector {
            profile: test_profile(),
            ..Default::default()
        };

        let first = detector.detect(&triple).unwrap().mask;
        let second = detector.detect(&triple).unwrap().mask;
        assert_eq!(first, second);
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let a = textured_frame(32, 32).to_luminance();
        let b = textured_frame(32, 24).to_luminance();

        assert!(matches!(
            estimate(&a, &b, &test_profile()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
