use super::config::SamplerConfig;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use crate::core::models::structure::Structure;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// Anything that estimates the noise present in a structure at a given level.
pub trait NoisePredictor: Sync {
    /// One noise vector per atom, in atom order.
    fn predict_noise(
        &self,
        structure: &Structure,
        noise_level: f64,
    ) -> Result<Vec<Vector3<f64>>, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub step: usize,
    pub noise_level: f64,
    pub mean_displacement: f64,
    pub max_noise_norm: f64,
}

#[derive(Debug, Clone)]
pub struct SamplingOutcome {
    pub structure: Structure,
    /// Seed that drove the stochastic term; replaying it reproduces the run.
    pub seed: u64,
    pub trajectory: Vec<StepSummary>,
}

/// Annealed reverse-diffusion sampler over a fixed noise schedule.
///
/// At step `k` with levels `sigma = sigma_k` and `next = sigma_{k+1}` (zero
/// after the last level) every atom moves by
///
/// `-(sigma^2 - next^2) / sigma * step_scale * eps + sqrt(next^2 (sigma^2 - next^2) / sigma^2) * z`
///
/// where `eps` is the predicted noise and `z` is standard normal.
#[derive(Debug, Clone)]
pub struct DenoisingSampler {
    config: SamplerConfig,
}

impl DenoisingSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn resolve_seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(|| {
            let seed = rand::random();
            info!(seed, "No seed configured, drew one at random.");
            seed
        })
    }

    /// Forward noising at the first schedule level: `x + sigma_0 * z`.
    pub fn perturb(
        &self,
        structure: &Structure,
        rng: &mut impl Rng,
    ) -> Result<Structure, EngineError> {
        let sigma = self.config.schedule.max_level().unwrap_or(0.0);
        let positions = structure
            .positions()
            .iter()
            .map(|p| p + gaussian(&mut *rng) * sigma)
            .collect();
        let noisy = structure.with_positions(positions)?;
        Ok(if self.config.wrap_positions {
            noisy.wrapped()
        } else {
            noisy
        })
    }

    #[instrument(
        skip_all,
        name = "denoising_sampler",
        fields(atoms = structure.len(), steps = self.config.num_sampling_steps)
    )]
    pub fn run(
        &self,
        structure: &Structure,
        predictor: &dyn NoisePredictor,
        reporter: &ProgressReporter,
        cancel: Option<&AtomicBool>,
    ) -> Result<SamplingOutcome, EngineError> {
        let seed = self.resolve_seed();
        let mut rng = StdRng::seed_from_u64(seed);
        let schedule = &self.config.schedule;
        let steps = self.config.num_sampling_steps.min(schedule.len());

        let mut current = structure.clone();
        let mut trajectory = Vec::with_capacity(steps);
        let mut last_good_step = None;

        reporter.report(Progress::TaskStart {
            total_steps: steps as u64,
        });

        for step in 0..steps {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(step, "Sampling cancelled.");
                return Err(EngineError::Cancelled { step });
            }
            let Some(sigma) = schedule.level(step) else {
                break;
            };
            let next = schedule.next_level(step);

            let noise = predictor.predict_noise(&current, sigma)?;
            if noise.len() != current.len() {
                return Err(EngineError::PredictionLength {
                    expected: current.len(),
                    found: noise.len(),
                });
            }

            let variance_drop = sigma * sigma - next * next;
            let drift = variance_drop / sigma * self.config.step_scale;
            let diffusion = (next * next * variance_drop / (sigma * sigma)).sqrt();

            let mut positions = current.positions().to_vec();
            let mut total_displacement = 0.0;
            let mut max_noise_norm = 0.0_f64;
            for (position, eps) in positions.iter_mut().zip(&noise) {
                let delta = gaussian(&mut rng) * diffusion - eps * drift;
                *position += delta;
                total_displacement += delta.norm();
                max_noise_norm = max_noise_norm.max(eps.norm());
            }

            if let Some((atom, axis)) = first_non_finite_component(&positions) {
                error!(
                    step,
                    noise_level = sigma,
                    atom,
                    axis,
                    last_good_step = ?last_good_step,
                    "Sampling diverged."
                );
                return Err(EngineError::DivergedSampling {
                    step,
                    noise_level: sigma,
                    last_good_step,
                    atom,
                    axis,
                });
            }

            current = current.with_positions(positions)?;
            if self.config.wrap_positions {
                current = current.wrapped();
            }

            let mean_displacement = if current.is_empty() {
                0.0
            } else {
                total_displacement / current.len() as f64
            };
            debug!(step, noise_level = sigma, mean_displacement, max_noise_norm, "Step finished.");
            reporter.report(Progress::StepFinished {
                step,
                noise_level: sigma,
                mean_displacement,
            });
            reporter.report(Progress::TaskIncrement);
            trajectory.push(StepSummary {
                step,
                noise_level: sigma,
                mean_displacement,
                max_noise_norm,
            });
            last_good_step = Some(step);
        }

        reporter.report(Progress::TaskFinish);
        info!(seed, steps = trajectory.len(), "Denoising finished.");
        Ok(SamplingOutcome {
            structure: current,
            seed,
            trajectory,
        })
    }
}

fn gaussian(rng: &mut impl Rng) -> Vector3<f64> {
    Vector3::from_fn(|_, _| StandardNormal.sample(&mut *rng))
}

fn first_non_finite_component(positions: &[Point3<f64>]) -> Option<(usize, usize)> {
    positions.iter().enumerate().find_map(|(atom, p)| {
        p.coords
            .iter()
            .position(|c| !c.is_finite())
            .map(|axis| (atom, axis))
    })
}
