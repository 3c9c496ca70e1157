// Checkout
// Local stand-in for source checkout: the sources are already on disk

use crate::execution::context::JobContext;
use crate::runners::{Action, ActionOutput, FailureDetail, OutputSink};
use crate::workflow::config::StepInputs;

/// Succeeds when the job's source directory exists
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutAction;

#[async_trait::async_trait]
impl Action for CheckoutAction {
    async fn invoke(
        &self,
        _action_id: &str,
        _inputs: &StepInputs,
        ctx: &JobContext,
        _output: Option<OutputSink>,
    ) -> Result<ActionOutput, FailureDetail> {
        match &ctx.source_dir {
            Some(dir) if dir.is_dir() => Ok(ActionOutput::message(format!(
                "Checkout: using existing sources at {}",
                dir.display()
            ))),
            Some(dir) => Err(FailureDetail::new(format!(
                "Checkout: source directory {} does not exist",
                dir.display()
            ))),
            None => Ok(ActionOutput::message(format!(
                "Checkout: no source directory, using workspace {}",
                ctx.workspace.display()
            ))),
        }
    }
}
