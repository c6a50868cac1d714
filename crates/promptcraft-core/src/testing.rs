use anyhow::Result;

use crate::runner::EvaluationOutcome;

/// Fails with the formatted report unless every provider passed.
///
/// Use this in your `#[tokio::test]` functions when you want to inspect the
/// outcome afterwards; otherwise `EvaluationRequest::assert_passes` does the
/// run and the check in one call.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn greets_by_name() -> Result<()> {
///     let suite = Suite::builder("greeting").provider("openai:gpt-4o-mini").build();
///
///     let mut expect = Expectations::new();
///     expect.includes("Hello Alice");
///
///     let outcome = suite.prompt("Say hello to {{name}}").var("name", "Alice").run(&expect).await?;
///
///     assert_prompt_passed(&outcome)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_prompt_passed(outcome: &EvaluationOutcome) -> Result<()> {
    if let Some(report) = outcome.failure_message() {
        anyhow::bail!("{}", report);
    }
    Ok(())
}

/// Helper to assert a single provider passed, regardless of the others.
pub fn assert_provider_passed(outcome: &EvaluationOutcome, provider_id: &str) -> Result<()> {
    if outcome.partition.passing.iter().any(|id| id == provider_id) {
        return Ok(());
    }
    if outcome.partition.failing.iter().any(|f| f.id == provider_id) {
        anyhow::bail!(
            "Provider {} failed\n{}",
            provider_id,
            outcome.failure_message().unwrap_or_default()
        );
    }
    anyhow::bail!("Provider {} has no result in the engine output", provider_id);
}

/// Helper to assert the evaluation failed, for checking that expectations bite.
pub fn assert_prompt_failed(outcome: &EvaluationOutcome) -> Result<()> {
    if outcome.passed() {
        anyhow::bail!(
            "Expected the evaluation to fail but all {} provider(s) passed",
            outcome.partition.total()
        );
    }
    Ok(())
}
