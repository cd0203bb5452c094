use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::{EngineStep, ExtractionJob, MediaEngine};
use crate::error::{EngineError, Result, TrimmerError};
use crate::pipeline::cancel::CancellationToken;

/// Extraction steps for one kept segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedExtraction {
    pub job: ExtractionJob,
    pub steps: Vec<EngineStep>,
}

/// Everything a run will do, in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunPlan {
    pub extractions: Vec<PlannedExtraction>,
    /// Empty when each segment is its own output
    pub concat: Vec<EngineStep>,
}

impl RunPlan {
    /// All steps flattened in execution order: extractions by output
    /// position, then concatenation
    pub fn steps(&self) -> Vec<EngineStep> {
        self.extractions
            .iter()
            .flat_map(|e| e.steps.iter().cloned())
            .chain(self.concat.iter().cloned())
            .collect()
    }

    /// Extraction outputs in output order
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.extractions.iter().map(|e| e.job.destination.clone()).collect()
    }
}

/// Drives a [`MediaEngine`] through the extraction and concatenation steps
pub struct Orchestrator<E: MediaEngine> {
    engine: Arc<E>,
    workers: usize,
    cancel: CancellationToken,
}

impl<E: MediaEngine> Orchestrator<E> {
    pub fn new(engine: Arc<E>, workers: usize, cancel: CancellationToken) -> Self {
        Self {
            engine,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Turn jobs into engine steps. `concat_output` joins every artifact into
    /// one file; `None` leaves each artifact as a final output.
    pub fn plan(&self, jobs: Vec<ExtractionJob>, concat_output: Option<&Path>, scratch_dir: &Path) -> RunPlan {
        let extractions: Vec<PlannedExtraction> = jobs
            .into_iter()
            .map(|job| PlannedExtraction {
                steps: self.engine.extraction_steps(&job),
                job,
            })
            .collect();

        let concat = match concat_output {
            Some(output) => {
                let artifacts: Vec<PathBuf> = extractions.iter().map(|e| e.job.destination.clone()).collect();
                self.engine.concat_steps(&artifacts, output, scratch_dir)
            }
            None => Vec::new(),
        };

        RunPlan { extractions, concat }
    }

    /// Run a plan. Returns the artifacts in output order.
    ///
    /// Up to `workers` segments are extracted at once. The first failure
    /// aborts every outstanding extraction and concatenation never starts.
    pub async fn execute(&self, plan: &RunPlan) -> Result<Vec<PathBuf>> {
        let total = plan.extractions.len();
        info!("✂️  Extracting {} segments ({} at a time)", total, self.workers.min(total.max(1)));

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (position, extraction) in plan.extractions.iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let segment = extraction.job.directive.segment_index;
            let steps = extraction.steps.clone();
            let destination = extraction.job.destination.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| TrimmerError::Cancelled)?;
                if cancel.is_cancelled() {
                    return Err(TrimmerError::Cancelled);
                }
                debug!("Segment {} started", segment);
                for step in &steps {
                    tokio::select! {
                        result = engine.execute(step) => result.map_err(|e| EngineError::Extraction {
                            segment,
                            reason: e.to_string(),
                        })?,
                        _ = cancel.cancelled() => return Err(TrimmerError::Cancelled),
                    }
                }
                debug!("Segment {} done", segment);
                Ok::<_, TrimmerError>((position, destination))
            });
        }

        let mut artifacts: Vec<Option<PathBuf>> = vec![None; total];
        let mut first_error: Option<TrimmerError> = None;
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((position, path))) => {
                    completed += 1;
                    info!("   {}/{} segments extracted", completed, total);
                    artifacts[position] = Some(path);
                }
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        warn!("Aborting remaining extractions: {}", err);
                        tasks.abort_all();
                        first_error = Some(err);
                    }
                }
                Err(join_error) if join_error.is_cancelled() => {}
                Err(join_error) => {
                    if first_error.is_none() {
                        tasks.abort_all();
                        first_error = Some(TrimmerError::Engine(EngineError::CommandFailed {
                            command: "extraction worker".to_string(),
                            reason: join_error.to_string(),
                        }));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(TrimmerError::Cancelled);
        }

        let artifacts: Vec<PathBuf> = artifacts.into_iter().flatten().collect();

        if !plan.concat.is_empty() {
            info!("🔗 Joining {} segments", artifacts.len());
            for step in &plan.concat {
                tokio::select! {
                    result = self.engine.execute(step) => result.map_err(|e| EngineError::Concat {
                        reason: e.to_string(),
                    })?,
                    _ = self.cancel.cancelled() => return Err(TrimmerError::Cancelled),
                }
            }
        }

        Ok(artifacts)
    }
}
