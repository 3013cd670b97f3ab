//! Execution engine driver - applies a plan level by level

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{ConfirmCallback, Engine, ProgressCallback};
use crate::deferred::{Outputs, ResolvedOutputs};
use crate::diff::compute_diffs;
use crate::error::{Error, Result, TransformError};
use crate::graph::DeclarationGraph;
use crate::planner::ExecutionPlan;
use crate::resource::ResourceRequest;
use crate::types::{ApplyResult, Applied, ExecuteOptions, ExecuteSummary};

/// Outcome of a run
#[derive(Debug, Default)]
pub struct Execution {
    pub summary: ExecuteSummary,
    /// Outputs of every declaration applied in this run
    pub outputs: ResolvedOutputs,
    /// Resolved graph exports; empty on dry runs and declined runs
    pub exports: BTreeMap<String, String>,
}

/// Execute a plan with the given options and callbacks
///
/// Levels run in order; declarations inside a level run on a pool of
/// `opts.jobs` threads. The first failure stops the run: declarations not
/// yet started are skipped and later levels never start. Nothing already
/// applied is undone.
///
/// # Type Parameters
/// * `E` - Engine that provisions resolved declarations
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
pub fn execute<E, P, C>(
    graph: &DeclarationGraph,
    plan: &ExecutionPlan,
    engine: &E,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Execution>
where
    E: Engine + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let diffs = compute_diffs(graph, plan, engine)?;

    if opts.dry_run {
        return Ok(Execution::default());
    }

    // Nothing to confirm when converged, but the walk still runs so exports resolve
    if !diffs.is_empty() {
        let prompt = format!("Apply {} changes?", diffs.len());
        if !confirm
            .confirm(&prompt)
            .map_err(|e| Error::Interaction(e.to_string()))?
        {
            return Ok(Execution {
                summary: ExecuteSummary {
                    skipped: diffs.len(),
                    ..Default::default()
                },
                ..Default::default()
            });
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let mut execution = Execution::default();

    for (level, ids) in plan.levels().iter().enumerate() {
        log::info!("applying level {} ({} declarations)", level, ids.len());
        progress.on_level_start(level, ids.len());

        let requests = ids
            .iter()
            .map(|id| {
                let decl = graph
                    .get(id)
                    .ok_or_else(|| Error::UnknownDeclaration(id.clone()))?;
                decl.resolve(&execution.outputs)
                    .map_err(|source| Error::Resolution {
                        id: id.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let results = apply_level(&pool, engine, &requests, opts.jobs, progress);
        progress.on_level_complete(level);

        let mut first_error = None;
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(applied) => {
                    log::debug!("{} `{}`: {:?}", request.kind, request.id, applied.result);
                    execution.summary.add_result(&applied.result);
                    if !matches!(applied.result, ApplyResult::Skipped { .. }) {
                        execution
                            .outputs
                            .insert(request.id.clone(), applied.outputs);
                    }
                }
                Err(error) => {
                    execution.summary.failed += 1;
                    let error = classify(request, &error);
                    log::error!("{error}");
                    first_error.get_or_insert(error);
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
    }

    for (key, value) in graph.exports() {
        // Targeted runs may leave an export's sources unplanned
        if !value.sources().iter().all(|id| plan.contains(id)) {
            log::debug!("export `{key}` is outside the planned target, skipping");
            continue;
        }
        let resolved = value
            .resolve(&execution.outputs)
            .map_err(|source| Error::Resolution {
                id: key.clone(),
                source,
            })?;
        execution.exports.insert(key.clone(), resolved);
    }

    Ok(execution)
}

/// Apply one level, returning results in request order
///
/// Once a declaration fails, declarations of the level that have not
/// started yet are reported as skipped instead of applied. Those already
/// running on other threads finish.
fn apply_level<E, P>(
    pool: &rayon::ThreadPool,
    engine: &E,
    requests: &[ResourceRequest],
    jobs: usize,
    progress: &mut P,
) -> Vec<anyhow::Result<Applied>>
where
    E: Engine + ?Sized,
    P: ProgressCallback,
{
    if jobs <= 1 || requests.len() <= 1 {
        // Sequential execution
        let mut results = Vec::with_capacity(requests.len());
        let mut halted = false;
        for request in requests {
            let result = if halted {
                Ok(halted_result())
            } else {
                progress.on_resource_start(request.id.as_str(), request.kind.as_str());
                engine.apply(request)
            };
            halted |= result.is_err();
            progress.on_resource_complete(request.id.as_str(), &as_apply_result(&result));
            results.push(result);
        }
        return results;
    }

    // The progress callback is not thread-safe: starts are announced up front
    // and completions reported once the level is done
    for request in requests {
        progress.on_resource_start(request.id.as_str(), request.kind.as_str());
    }

    let halted = AtomicBool::new(false);
    let results: Vec<anyhow::Result<Applied>> = pool.install(|| {
        requests
            .par_iter()
            .map(|request| {
                if halted.load(Ordering::SeqCst) {
                    return Ok(halted_result());
                }
                let result = engine.apply(request);
                if result.is_err() {
                    halted.store(true, Ordering::SeqCst);
                }
                result
            })
            .collect()
    });

    for (request, result) in requests.iter().zip(&results) {
        progress.on_resource_complete(request.id.as_str(), &as_apply_result(result));
    }

    results
}

fn halted_result() -> Applied {
    Applied::new(
        ApplyResult::Skipped {
            reason: "halted after an earlier failure".to_string(),
        },
        Outputs::new(),
    )
}

fn as_apply_result(result: &anyhow::Result<Applied>) -> ApplyResult {
    match result {
        Ok(applied) => applied.result.clone(),
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

/// Map an engine failure onto the run's error taxonomy
fn classify(request: &ResourceRequest, error: &anyhow::Error) -> Error {
    if error.downcast_ref::<TransformError>().is_some() {
        Error::Transformation {
            id: request.id.clone(),
            message: format!("{error:#}"),
        }
    } else {
        Error::Provisioning {
            id: request.id.clone(),
            kind: request.kind,
            message: format!("{error:#}"),
        }
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<E: Engine + ?Sized>(
    graph: &DeclarationGraph,
    engine: &E,
    opts: &ExecuteOptions,
) -> Result<Execution> {
    use crate::context::{AutoConfirm, NoProgress};

    let plan = ExecutionPlan::from_graph(graph)?;
    execute(graph, &plan, engine, opts, &mut NoProgress, &mut AutoConfirm)
}
