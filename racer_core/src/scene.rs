//! Per-frame feature classification.
//!
//! Raw detections from the vision sensor are filtered for far-field line
//! noise, bucketed by feature, and reduced to one signed tracking error
//! against the image center. A snapshot lives for exactly one tick.

use std::time::Duration;

use racer_traits::{Detection, Feature, Vision};

use crate::config::{BrightnessCfg, SceneCfg};
use crate::error::{Result, map_vision_error};

#[derive(Debug)]
pub struct SceneSnapshot {
    buckets: [Vec<Detection>; Feature::COUNT],
    target: Option<Detection>,
    tracking_error: i32,
}

impl SceneSnapshot {
    /// Classify one frame's detections.
    ///
    /// Line-feature detections above the horizon row are dropped; they are
    /// fragments of track seen far ahead and steer the wrong way. Buckets
    /// keep arrival order. `lookahead` selects which center-line detection
    /// steers: index 0 is the first reported, 1 prefers the second when the
    /// frame has more than one (the nearest segment is often reported after
    /// the farther one), falling back to the last available.
    pub fn classify(detections: &[Detection], cfg: &SceneCfg, lookahead: usize) -> Self {
        let mut buckets: [Vec<Detection>; Feature::COUNT] = std::array::from_fn(|_| Vec::new());
        for det in detections {
            if det.feature.is_line() && det.y < cfg.horizon_y {
                continue;
            }
            buckets[det.feature.index()].push(*det);
        }

        let center = &buckets[Feature::CenterLine.index()];
        let target = match center.len() {
            0 => None,
            n => Some(center[lookahead.min(n - 1)]),
        };
        let tracking_error = target.map_or(0, |d| cfg.center_x - i32::from(d.x));

        Self {
            buckets,
            target,
            tracking_error,
        }
    }

    /// Signed pixel offset of the steering target from image center.
    /// Zero when no guide line is visible; callers must check
    /// `sees_guide_line` before treating it as a correction.
    #[inline]
    pub fn tracking_error(&self) -> i32 {
        self.tracking_error
    }

    #[inline]
    pub fn steering_target(&self) -> Option<&Detection> {
        self.target.as_ref()
    }

    pub fn sees_guide_line(&self) -> bool {
        !self.buckets[Feature::CenterLine.index()].is_empty()
    }

    /// Post on either side; a weaker confidence signal than the line itself.
    pub fn sees_side_markers(&self) -> bool {
        !self.buckets[Feature::LeftPost.index()].is_empty()
            || !self.buckets[Feature::RightPost.index()].is_empty()
    }

    pub fn count(&self, feature: Feature) -> usize {
        self.buckets[feature.index()].len()
    }

    pub fn detections(&self, feature: Feature) -> &[Detection] {
        &self.buckets[feature.index()]
    }

    pub fn first_obstacle(&self) -> Option<&Detection> {
        self.buckets[Feature::Obstacle.index()].first()
    }

    /// Whether this frame is usable for line following. The brightness
    /// probe reruns classification against this predicate.
    pub fn is_sufficient(&self) -> bool {
        self.sees_guide_line()
    }
}

/// Search for a brightness level at which classification becomes usable.
///
/// Probes upward from the current level first, then downward, one ladder of
/// fixed steps per direction. On success the sensor is left at the found
/// level, which is returned. On exhaustion the original level is restored
/// and `None` is returned; the caller decides whether to carry on without a
/// usable frame.
pub fn probe_brightness<V: Vision>(
    vision: &mut V,
    scene_cfg: &SceneCfg,
    cfg: &BrightnessCfg,
    lookahead: usize,
    frame_timeout: Duration,
) -> Result<Option<u8>> {
    let original = vision
        .brightness()
        .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))?;

    let up = ladder(original, cfg.probe_up, cfg.ceiling, true);
    let down = ladder(original, cfg.probe_down, cfg.floor, false);

    for level in up.into_iter().chain(down) {
        if probe_level(vision, scene_cfg, lookahead, frame_timeout, level)? {
            tracing::info!(level, original, "brightness probe succeeded");
            return Ok(Some(level));
        }
    }

    vision
        .set_brightness(original)
        .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))?;
    tracing::warn!(original, "brightness probe exhausted, level restored");
    Ok(None)
}

/// Set one level, grab one frame, classify, and test usability.
fn probe_level<V: Vision>(
    vision: &mut V,
    scene_cfg: &SceneCfg,
    lookahead: usize,
    frame_timeout: Duration,
    level: u8,
) -> Result<bool> {
    vision
        .set_brightness(level)
        .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))?;
    let fresh = vision
        .wait_frame(frame_timeout)
        .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))?;
    if !fresh {
        tracing::debug!(level, "no frame at probed brightness");
        return Ok(false);
    }
    let detections = vision
        .detections(scene_cfg.max_detections)
        .map_err(|e| crate::error::Report::new(map_vision_error(&*e)))?;
    let snapshot = SceneSnapshot::classify(&detections, scene_cfg, lookahead);
    Ok(snapshot.is_sufficient())
}

/// Levels visited from `from` toward `limit` in fixed steps, capping the
/// final rung at the limit. The starting level itself is not revisited.
fn ladder(from: u8, step: u8, limit: u8, up: bool) -> Vec<u8> {
    let mut levels = Vec::new();
    if step == 0 {
        return levels;
    }
    let mut current = from;
    loop {
        let next = if up {
            current.saturating_add(step).min(limit)
        } else {
            current.saturating_sub(step).max(limit)
        };
        if next == current {
            break;
        }
        levels.push(next);
        current = next;
    }
    levels
}
