use crate::core::models::structure::Structure;
use crate::engine::config::SamplerConfig;
use crate::engine::error::EngineError;
use crate::engine::model::Model;
use crate::engine::progress::ProgressReporter;
use crate::engine::sampler::{DenoisingSampler, SamplingOutcome};
use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use tracing::{info, instrument};

/// Seed offset for the starting-noise stream, kept apart from the sampler's.
const PERTURB_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone)]
pub struct DenoiseResult {
    /// Structure the sampler started from, after optional perturbation.
    pub initial: Structure,
    pub outcome: SamplingOutcome,
}

/// Refines `structure` with the model's noise prediction.
///
/// With `perturb` set the input is first noised at the schedule's first
/// level, so the run starts from a sample of the forward process.
#[instrument(
    skip_all,
    name = "denoise_workflow",
    fields(atoms = structure.len(), perturb = perturb)
)]
pub fn run(
    model: &Model,
    structure: &Structure,
    config: &SamplerConfig,
    perturb: bool,
    reporter: &ProgressReporter,
    cancel: Option<&AtomicBool>,
) -> Result<DenoiseResult, EngineError> {
    let seed = config.seed.unwrap_or_else(|| {
        let seed = rand::random();
        info!(seed, "No seed configured, drew one at random.");
        seed
    });
    let sampler = DenoisingSampler::new(SamplerConfig {
        seed: Some(seed),
        ..config.clone()
    });

    let initial = {
        let _phase = reporter.phase("Preparation");
        if perturb {
            let mut rng = StdRng::seed_from_u64(seed ^ PERTURB_STREAM);
            sampler.perturb(structure, &mut rng)?
        } else {
            structure.clone()
        }
    };

    let outcome = {
        let _phase = reporter.phase("Denoising");
        sampler.run(&initial, model, reporter, cancel)?
    };

    info!(
        seed,
        steps = outcome.trajectory.len(),
        "Denoising workflow complete."
    );
    Ok(DenoiseResult { initial, outcome })
}

/// Independent denoising runs, one per structure, in input order.
///
/// Run `i` uses seed `seed + i` when a seed is configured. A failed run does
/// not stop the others.
#[instrument(skip_all, name = "denoise_many_workflow", fields(structures = structures.len()))]
pub fn run_many(
    model: &Model,
    structures: &[Structure],
    config: &SamplerConfig,
    perturb: bool,
    cancel: Option<&AtomicBool>,
) -> Vec<Result<DenoiseResult, EngineError>> {
    let single = |(idx, structure): (usize, &Structure)| {
        let config = SamplerConfig {
            seed: config.seed.map(|s| s.wrapping_add(idx as u64)),
            ..config.clone()
        };
        run(model, structure, &config, perturb, &ProgressReporter::new(), cancel)
    };

    #[cfg(not(feature = "parallel"))]
    let iterator = structures.iter().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = structures.par_iter().enumerate();

    iterator.map(single).collect()
}
