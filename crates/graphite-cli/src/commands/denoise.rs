use crate::cli::DenoiseArgs;
use crate::commands::load_model;
use crate::config::PartialConfig;
use crate::error::{CliError, Result};
use crate::records::{self, StructureRecord};
use crate::utils::progress::CliProgressHandler;
use graphite::core::geometry::transform::{max_displacement, rmsd};
use graphite::core::models::structure::Structure;
use graphite::engine::error::EngineError;
use graphite::engine::progress::ProgressReporter;
use graphite::engine::store::WeightStore;
use graphite::workflows::denoise::{self, DenoiseResult};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Serialize)]
struct TrajectoryRow<'a> {
    structure: &'a str,
    seed: u64,
    step: usize,
    noise_level: f64,
    mean_displacement: f64,
    max_noise_norm: f64,
}

pub async fn run(args: DenoiseArgs) -> Result<()> {
    let config = PartialConfig::load(&args.config)?;
    let sampler_config = config.sampler_config(args.steps, args.seed)?;
    let store = WeightStore::new();
    let model = load_model(&config, args.model.as_deref(), &store)?;

    info!("Loading input structures from {:?}", &args.input);
    let (ids, structures): (Vec<Option<String>>, Vec<Structure>) =
        records::read_structures(&args.input)?.into_iter().unzip();
    let labels: Vec<String> = ids
        .into_iter()
        .enumerate()
        .map(|(idx, id)| id.unwrap_or_else(|| idx.to_string()))
        .collect();

    let cancel = Arc::new(AtomicBool::new(false));
    let signal = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping before the next sampling step.");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    println!(
        "Denoising {} structure(s) over {} noise level(s)...",
        structures.len(),
        sampler_config
            .num_sampling_steps
            .min(sampler_config.schedule.len())
    );
    let perturb = args.perturb;
    let flag = Arc::clone(&cancel);
    let results = tokio::task::spawn_blocking(move || {
        if let [structure] = structures.as_slice() {
            let progress_handler = CliProgressHandler::new();
            let reporter = ProgressReporter::with_callback(progress_handler.callback());
            vec![denoise::run(
                &model,
                structure,
                &sampler_config,
                perturb,
                &reporter,
                Some(flag.as_ref()),
            )]
        } else {
            denoise::run_many(&model, &structures, &sampler_config, perturb, Some(flag.as_ref()))
        }
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Denoising task failed: {}", e)))?;
    signal.abort();

    let results = collect_results(results)?;

    let refined: Vec<StructureRecord> = labels
        .iter()
        .zip(&results)
        .map(|(label, result)| {
            StructureRecord::from_structure(&result.outcome.structure, Some(label.clone()))
        })
        .collect();
    records::write_records(&args.output, &refined)?;

    if let Some(path) = &args.trajectory {
        write_trajectory(path, &labels, &results)?;
        println!("✓ Trajectory summary written to: {}", path.display());
    }

    for (label, result) in labels.iter().zip(&results) {
        info!(structure = %label, seed = result.outcome.seed, "Denoised structure.");
        println!("{}", summary_line(label, result));
    }
    println!(
        "✓ {} refined structure(s) written to: {}",
        refined.len(),
        args.output.display()
    );
    Ok(())
}

fn summary_line(label: &str, result: &DenoiseResult) -> String {
    let start = result.initial.positions();
    let end = result.outcome.structure.positions();
    let mut line = format!("  {label}: seed {}", result.outcome.seed);
    if let Some(value) = rmsd(start, end) {
        line.push_str(&format!(", RMSD {value:.4}"));
    }
    if let Some((distance, atom)) = max_displacement(start, end) {
        line.push_str(&format!(", max displacement {distance:.4} (atom {atom})"));
    }
    line
}

/// Fails on the first error, reporting a cancellation as an interruption.
fn collect_results(
    results: Vec<std::result::Result<DenoiseResult, EngineError>>,
) -> Result<Vec<DenoiseResult>> {
    results
        .into_iter()
        .map(|result| match result {
            Err(EngineError::Cancelled { step }) => {
                warn!(step, "Denoising cancelled.");
                Err(CliError::Interrupted)
            }
            other => other.map_err(CliError::from),
        })
        .collect()
}

fn write_trajectory(path: &Path, labels: &[String], results: &[DenoiseResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (label, result) in labels.iter().zip(results) {
        for step in &result.outcome.trajectory {
            writer.serialize(TrajectoryRow {
                structure: label,
                seed: result.outcome.seed,
                step: step.step,
                noise_level: step.noise_level,
                mean_displacement: step.mean_displacement,
                max_noise_norm: step.max_noise_norm,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphite::core::models::species::Species;
    use graphite::engine::sampler::{SamplingOutcome, StepSummary};
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn result(seed: u64) -> DenoiseResult {
        let structure = Structure::new(vec![Species(1)], vec![Point3::origin()]).unwrap();
        DenoiseResult {
            initial: structure.clone(),
            outcome: SamplingOutcome {
                structure,
                seed,
                trajectory: vec![
                    StepSummary {
                        step: 0,
                        noise_level: 0.5,
                        mean_displacement: 0.1,
                        max_noise_norm: 1.0,
                    },
                    StepSummary {
                        step: 1,
                        noise_level: 0.1,
                        mean_displacement: 0.01,
                        max_noise_norm: 0.5,
                    },
                ],
            },
        }
    }

    #[test]
    fn cancellation_becomes_an_interruption() {
        let outcome = collect_results(vec![Ok(result(1)), Err(EngineError::Cancelled { step: 3 })]);
        assert!(matches!(outcome, Err(CliError::Interrupted)));
    }

    #[test]
    fn divergence_is_passed_through() {
        let outcome = collect_results(vec![Err(EngineError::DivergedSampling {
            step: 0,
            noise_level: 0.1,
            last_good_step: None,
            atom: 0,
            axis: 0,
        })]);
        assert!(matches!(
            outcome,
            Err(CliError::Graphite(EngineError::DivergedSampling { .. }))
        ));
    }

    #[test]
    fn summary_reports_seed_and_displacement() {
        let mut denoised = result(42);
        denoised.outcome.structure = denoised
            .initial
            .with_positions(vec![Point3::new(0.0, 0.3, 0.4)])
            .unwrap();
        assert_eq!(
            summary_line("x", &denoised),
            "  x: seed 42, RMSD 0.5000, max displacement 0.5000 (atom 0)"
        );
    }

    #[test]
    fn trajectory_has_one_row_per_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.csv");
        write_trajectory(
            &path,
            &["a".to_string(), "b".to_string()],
            &[result(7), result(8)],
        )
        .unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[2][0], "b");
        assert_eq!(&rows[2][1], "8");
    }
}
