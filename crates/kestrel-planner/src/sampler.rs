use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use kestrel_core::{perp, Vector2};
use serde::{Deserialize, Serialize};

/// One pre-sampled mid-point candidate, stored normalized: the mid speed
/// and angle are relative to the direction from start to target.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PrecomputedSample {
    pub time: f64,
    pub angle: f64,
    pub mid_speed_x: f64,
    pub mid_speed_y: f64,
}

/// Samples valid for plan distances in `[min_distance, max_distance]`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PrecomputationSegment {
    pub min_distance: f64,
    pub max_distance: f64,
    pub points: Vec<PrecomputedSample>,
}

/// Precomputed mid-point samples for the trajectory planner, grouped by
/// distance band.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SamplerPrecomputation {
    pub segments: Vec<PrecomputationSegment>,
}

impl SamplerPrecomputation {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening precomputation file {}", path.display()))?;
        let precomputation = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing precomputation file {}", path.display()))?;
        Ok(precomputation)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating precomputation file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("writing precomputation file {}", path.display()))?;
        Ok(())
    }

    /// The segment responsible for the given plan distance, if any.
    pub fn segment_for_distance(&self, distance: f64) -> Option<&PrecomputationSegment> {
        self.segments
            .iter()
            .find(|s| s.min_distance <= distance && s.max_distance >= distance)
    }
}

impl PrecomputedSample {
    /// Rotates the stored sample into the actual start-to-target direction
    /// and caps the mid speed to the allowed maximum.
    pub fn denormalize(&self, to_target: Vector2, max_speed: f64) -> (f64, f64, Vector2) {
        let to_target = to_target
            .try_normalize(f64::EPSILON)
            .unwrap_or(Vector2::new(1.0, 0.0));
        let sideways = perp(to_target);
        let mut mid_speed = to_target * self.mid_speed_x + sideways * self.mid_speed_y;
        if mid_speed.norm() >= max_speed {
            mid_speed = mid_speed.normalize() * max_speed;
        }
        let mut angle = self.angle + to_target.y.atan2(to_target.x);
        while angle > 2.0 * std::f64::consts::PI {
            angle -= 2.0 * std::f64::consts::PI;
        }
        while angle < 0.0 {
            angle += 2.0 * std::f64::consts::PI;
        }
        (self.time, angle, mid_speed)
    }
}
