//! The `setup -> execute_stage -> cleanup` template used by every pipeline
//! stage, with a sealed three-way result.

use tracing::warn;

/// The outcome of running a single stage through [`execute`].
pub enum StageResult<T> {
    Success(T),
    Skipped { reason: String },
    /// `message` is always non-empty; `cause` preserves the original typed
    /// error (when the failure came from `setup`/`execute_stage`) so callers
    /// can walk the source chain instead of only seeing its `Display` text.
    Failure { message: String, cause: Option<Box<dyn std::error::Error + Send + Sync>> },
}

/// The outcome of [`PipelineStage::execute_stage`] alone, before `cleanup`
/// has had a chance to run. Distinct from [`StageResult`] because a stage
/// cannot fail in `execute_stage` and still report `Skipped`-vs-`Failure`
/// ambiguity to its caller; `cleanup` errors are logged, never surfaced.
pub enum StageOutcome<T> {
    Success(T),
    Skipped { reason: String },
}

/// A single step of [`crate::pipeline::FileProcessingPipeline`].
///
/// Implementations provide `execute_stage`; `setup`/`cleanup` default to
/// no-ops so simple stages need not override them.
pub trait PipelineStage: Send + Sync {
    type Input: Send;
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    fn stage_name(&self) -> &'static str;

    fn setup(&self, _input: &Self::Input) -> Result<(), Self::Error> {
        Ok(())
    }

    fn execute_stage(&self, input: Self::Input) -> Result<StageOutcome<Self::Output>, Self::Error>;

    fn cleanup(&self, _output: Option<&Self::Output>) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Drives a [`PipelineStage`] through its full template, logging (and
/// swallowing) any `cleanup` error so it never masks the stage's real
/// result.
pub fn execute<S: PipelineStage>(stage: &S, input: S::Input) -> StageResult<S::Output> {
    if let Err(e) = stage.setup(&input) {
        let message = e.to_string();
        return StageResult::Failure { message, cause: Some(Box::new(e)) };
    }

    let outcome = match stage.execute_stage(input) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Err(cleanup_err) = stage.cleanup(None) {
                warn!(stage = stage.stage_name(), error = %cleanup_err, "cleanup failed after stage error");
            }
            let message = e.to_string();
            return StageResult::Failure { message, cause: Some(Box::new(e)) };
        }
    };

    match outcome {
        StageOutcome::Success(output) => {
            if let Err(cleanup_err) = stage.cleanup(Some(&output)) {
                warn!(stage = stage.stage_name(), error = %cleanup_err, "cleanup failed after successful stage");
            }
            StageResult::Success(output)
        }
        StageOutcome::Skipped { reason } => {
            if let Err(cleanup_err) = stage.cleanup(None) {
                warn!(stage = stage.stage_name(), error = %cleanup_err, "cleanup failed after skipped stage");
            }
            StageResult::Skipped { reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("boom")]
    struct BoomError;

    struct DoublingStage {
        cleanup_calls: AtomicUsize,
    }

    impl PipelineStage for DoublingStage {
        type Input = i32;
        type Output = i32;
        type Error = BoomError;

        fn stage_name(&self) -> &'static str {
            "doubling"
        }

        fn execute_stage(&self, input: i32) -> Result<StageOutcome<i32>, BoomError> {
            if input < 0 {
                return Err(BoomError);
            }
            if input == 0 {
                return Ok(StageOutcome::Skipped { reason: "zero input".to_string() });
            }
            Ok(StageOutcome::Success(input * 2))
        }

        fn cleanup(&self, _output: Option<&i32>) -> Result<(), BoomError> {
            self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn success_runs_cleanup_and_returns_output() {
        let stage = DoublingStage { cleanup_calls: AtomicUsize::new(0) };
        match execute(&stage, 21) {
            StageResult::Success(output) => assert_eq!(output, 42),
            _ => panic!("expected success"),
        }
        assert_eq!(stage.cleanup_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn skipped_runs_cleanup_and_reports_reason() {
        let stage = DoublingStage { cleanup_calls: AtomicUsize::new(0) };
        match execute(&stage, 0) {
            StageResult::Skipped { reason } => assert_eq!(reason, "zero input"),
            _ => panic!("expected skipped"),
        }
        assert_eq!(stage.cleanup_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_runs_cleanup_and_reports_error() {
        let stage = DoublingStage { cleanup_calls: AtomicUsize::new(0) };
        match execute(&stage, -1) {
            StageResult::Failure { message, cause } => {
                assert_eq!(message, "boom");
                assert!(cause.is_some());
            }
            _ => panic!("expected failure"),
        }
        assert_eq!(stage.cleanup_calls.load(Ordering::SeqCst), 1);
    }
}
