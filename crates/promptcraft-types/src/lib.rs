//! Shared data model: assertions, the engine configuration document and the
//! engine's output artifact.

use tabled::Tabled;

mod assertion;
mod config;
mod output;

pub use assertion::{Assertion, AssertionKind, DEFAULT_RUBRIC_THRESHOLD};
pub use config::{EvaluationConfig, ProviderSpec, TestCaseConfig, Vars};
pub use output::{
	ComponentResult, GradingResult, OutputDocument, ProviderRef, ProviderResult, ResponsePayload,
};

#[derive(Debug, Clone, Tabled)]
struct ProviderRow {
	provider: String,
	passed: String,
	score: String,
	failed_assertions: usize,
	output: String,
}

impl OutputDocument {
	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<ProviderRow> = self.results.iter().map(|r| {
			let failed = r.component_results().iter().filter(|c| !c.pass).count();
			ProviderRow {
				provider: r.provider_id(),
				passed: if r.success { "✓" } else { "✗" }.to_string(),
				score: r.score().map(|s| format!("{:.3}", s)).unwrap_or_else(|| "-".to_string()),
				failed_assertions: failed,
				output: truncate(r.output_text().unwrap_or_default(), 64),
			}
		}).collect();

		let table = Table::new(rows);
		let passed = self.results.iter().filter(|r| r.success).count();
		let summary_text = format!("Providers: {}  Passed: {}", self.results.len(), passed);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

/// Cuts `s` to at most `max_len` characters, marking the cut with `…`.
pub fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
