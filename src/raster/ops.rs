use serde::{Deserialize, Serialize};

// Below this many valid pixels percentiles are unreliable
const MIN_PERCENTILE_SAMPLES: usize = 100;

/// Linear contrast stretch onto 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Stretch {
    /// Per-channel percentile clamp computed from the valid pixels.
    Percentile { low: f64, high: f64 },
    /// Fixed `[0, ceiling]` surface reflectance window.
    ReflectanceCeiling { ceiling: f64 },
}

impl Default for Stretch {
    fn default() -> Self {
        Stretch::Percentile {
            low: 2.0,
            high: 98.0,
        }
    }
}

impl Stretch {
    pub fn reflectance_ceiling() -> Self {
        Stretch::ReflectanceCeiling { ceiling: 0.3 }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Stretch::Percentile { low, high } => {
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
                    return Err(format!("percentiles {low}/{high} must satisfy 0 <= low < high <= 100"));
                }
            }
            Stretch::ReflectanceCeiling { ceiling } => {
                if !ceiling.is_finite() || ceiling <= 0.0 {
                    return Err(format!("reflectance ceiling {ceiling} must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Input range mapped to 0 and 255.
    pub fn range(&self, valid: &[f32]) -> (f32, f32) {
        match *self {
            Stretch::Percentile { low, high } => percentile_range(valid, low, high),
            Stretch::ReflectanceCeiling { ceiling } => (0.0, ceiling as f32),
        }
    }

    pub fn needs_reflectance(&self) -> bool {
        matches!(self, Stretch::ReflectanceCeiling { .. })
    }
}

/// Percentile range of `values`, falling back to min/max for small or flat inputs.
///
/// A range that is still degenerate is widened to `[min, min + 1]`.
pub fn percentile_range(values: &[f32], low: f64, high: f64) -> (f32, f32) {
    let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return (0.0, 1.0);
    }
    sorted.sort_by(f32::total_cmp);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    let (mut lo, mut hi) = if sorted.len() < MIN_PERCENTILE_SAMPLES {
        (min, max)
    } else {
        (percentile(&sorted, low), percentile(&sorted, high))
    };
    if hi <= lo {
        (lo, hi) = (min, max);
    }
    if hi <= lo {
        hi = lo + 1.0;
    }
    (lo, hi)
}

// Linear interpolation between closest ranks
fn percentile(sorted: &[f32], p: f64) -> f32 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let t = (rank - below as f64) as f32;
    sorted[below] + (sorted[above] - sorted[below]) * t
}

pub fn to_byte(value: f32, range: (f32, f32)) -> u8 {
    let (lo, hi) = range;
    let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

/// Piecewise linear colour ramp over sorted value stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<(f32, [u8; 3])>,
}

impl ColorRamp {
    pub fn new(mut stops: Vec<(f32, [u8; 3])>) -> Self {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    /// White to dark green.
    pub fn vegetation() -> Self {
        Self::new(vec![
            (-1.0, [247, 252, 245]),
            (0.0, [199, 233, 192]),
            (0.4, [116, 196, 118]),
            (0.7, [35, 139, 69]),
            (1.0, [0, 109, 44]),
        ])
    }

    /// Red through white to grey.
    pub fn burn() -> Self {
        Self::new(vec![
            (-1.0, [165, 0, 38]),
            (-0.4, [215, 48, 39]),
            (0.0, [247, 247, 247]),
            (0.6, [135, 135, 135]),
            (1.0, [77, 77, 77]),
        ])
    }

    pub fn stops(&self) -> &[(f32, [u8; 3])] {
        &self.stops
    }

    pub fn range(&self) -> (f32, f32) {
        match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => (0.0, 1.0),
        }
    }

    pub fn color_at(&self, value: f32) -> [u8; 3] {
        let Some(first) = self.stops.first() else {
            return [0, 0, 0];
        };
        if value.is_nan() || value <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (v0, c0) = pair[0];
            let (v1, c1) = pair[1];
            if value <= v1 {
                let t = if v1 > v0 { (value - v0) / (v1 - v0) } else { 1.0 };
                let mut color = [0; 3];
                for i in 0..3 {
                    color[i] = (c0[i] as f32 + (c1[i] as f32 - c0[i] as f32) * t).round() as u8;
                }
                return color;
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_inputs_use_min_max() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(percentile_range(&values, 2.0, 98.0), (1.0, 3.0));
    }

    #[test]
    fn percentiles_clip_outliers() {
        let mut values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        values.push(10_000.0);
        let (lo, hi) = percentile_range(&values, 2.0, 98.0);
        assert!(lo > 1.0 && lo < 3.0);
        assert!(hi < 100.0);
    }

    #[test]
    fn flat_input_is_widened() {
        let values = vec![5.0; 200];
        assert_eq!(percentile_range(&values, 2.0, 98.0), (5.0, 6.0));
        assert_eq!(percentile_range(&[], 2.0, 98.0), (0.0, 1.0));
    }

    #[test]
    fn byte_scaling_clamps() {
        assert_eq!(to_byte(-1.0, (0.0, 1.0)), 0);
        assert_eq!(to_byte(0.5, (0.0, 1.0)), 128);
        assert_eq!(to_byte(9.0, (0.0, 1.0)), 255);
    }

    #[test]
    fn ramp_interpolates_between_stops() {
        let ramp = ColorRamp::vegetation();
        assert_eq!(ramp.color_at(-5.0), [247, 252, 245]);
        assert_eq!(ramp.color_at(1.0), [0, 109, 44]);
        assert_eq!(ramp.color_at(0.2), [158, 215, 155]);
        assert_eq!(ramp.range(), (-1.0, 1.0));
    }

    #[test]
    fn reflectance_ceiling_ignores_values() {
        let stretch = Stretch::reflectance_ceiling();
        assert_eq!(stretch.range(&[100.0]), (0.0, 0.3));
        assert!(stretch.needs_reflectance());
        assert!(!Stretch::default().needs_reflectance());
    }
}
