use super::config::ConfigError;

/// Strictly decreasing, positive noise levels `sigma_0 > sigma_1 > ... > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    levels: Vec<f64>,
}

impl NoiseSchedule {
    pub fn new(levels: Vec<f64>) -> Result<Self, ConfigError> {
        if levels.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "noise_schedule",
                reason: "must contain at least one level".to_string(),
            });
        }
        if let Some((idx, level)) = levels
            .iter()
            .enumerate()
            .find(|(_, l)| !(l.is_finite() && **l > 0.0))
        {
            return Err(ConfigError::InvalidValue {
                parameter: "noise_schedule",
                reason: format!("level {idx} is {level}, expected a positive finite value"),
            });
        }
        if let Some(idx) = levels.windows(2).position(|w| w[1] >= w[0]) {
            return Err(ConfigError::InvalidValue {
                parameter: "noise_schedule",
                reason: format!(
                    "levels must be strictly decreasing, but level {} ({}) follows {}",
                    idx + 1,
                    levels[idx + 1],
                    levels[idx]
                ),
            });
        }
        Ok(Self { levels })
    }

    /// `steps` levels spaced evenly in log space from `sigma_max` to `sigma_min`.
    pub fn geometric(sigma_max: f64, sigma_min: f64, steps: usize) -> Result<Self, ConfigError> {
        Self::new(interpolate(sigma_max.ln(), sigma_min.ln(), steps, f64::exp))
    }

    /// `steps` levels spaced evenly from `sigma_max` to `sigma_min`.
    pub fn linear(sigma_max: f64, sigma_min: f64, steps: usize) -> Result<Self, ConfigError> {
        Self::new(interpolate(sigma_max, sigma_min, steps, |x| x))
    }

    /// Builds a schedule without checking any invariant.
    ///
    /// Sampling with a schedule that is not strictly decreasing produces
    /// non-finite positions, which the sampler reports as a divergence.
    pub fn from_levels_unchecked(levels: Vec<f64>) -> Self {
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn level(&self, step: usize) -> Option<f64> {
        self.levels.get(step).copied()
    }

    /// Level following `step`; zero after the last level.
    pub fn next_level(&self, step: usize) -> f64 {
        self.levels.get(step + 1).copied().unwrap_or(0.0)
    }

    pub fn max_level(&self) -> Option<f64> {
        self.levels.first().copied()
    }
}

fn interpolate(start: f64, end: f64, steps: usize, map: impl Fn(f64) -> f64) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![map(start)],
        n => (0..n)
            .map(|k| map(start + (end - start) * k as f64 / (n - 1) as f64))
            .collect(),
    }
}
