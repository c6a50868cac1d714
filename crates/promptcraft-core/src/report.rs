//! Human-readable failure reports built from decoded engine results.

use promptcraft_types::{AssertionKind, ProviderResult};
use serde_json::Value;

use crate::decoder::{component_failures, ComponentFailure, FailingProvider, ResultPartition};
use crate::script::JsonKeyPredicate;

const PASS_MARK: &str = "✓";
const FAIL_MARK: &str = "✗";
const SNIPPET_LEN: usize = 100;

/// Checklist of providers, then one detail block per failing provider.
pub fn format_results(partition: &ResultPartition, verbose: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Prompt evaluation failed for {} of {} provider(s)\n\n",
        partition.failing.len(),
        partition.total()
    ));

    for id in &partition.passing {
        out.push_str(&format!("  {} {}\n", PASS_MARK, id));
    }
    for failing in &partition.failing {
        out.push_str(&format!("  {} {}\n", FAIL_MARK, failing.id));
    }
    out.push('\n');

    for failing in &partition.failing {
        for line in provider_details(failing, verbose) {
            push_line(&mut out, 0, &line);
        }
        out.push('\n');
    }

    if !verbose {
        out.push_str("Enable verbose output to see rubric criteria, judge reasoning and the raw engine result.\n");
    }
    out
}

fn provider_details(failing: &FailingProvider, verbose: bool) -> Vec<String> {
    let result = &failing.result;
    let mut lines = vec![format!("{} {}", FAIL_MARK, failing.id)];

    let error = result.error_text();
    if let Some(error) = &error {
        lines.push(indent(1, "API error:"));
        lines.extend(block(2, error));
    }

    match result.output_value().filter(|v| !is_blank(v)) {
        Some(output) => {
            lines.push(indent(1, "Response:"));
            let text = match output {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            lines.extend(block(2, &text));
        }
        None if error.is_none() => lines.push(indent(1, "No response received from the provider.")),
        None => {}
    }

    let failures = relevant_failures(component_failures(result));
    if !failures.is_empty() {
        lines.push(indent(1, "Failed assertions:"));
        for failure in &failures {
            for line in describe_failure(failure, result, verbose) {
                lines.push(indent(2, &line));
            }
        }
    }

    if verbose {
        lines.push(indent(1, "Raw result:"));
        let raw = if result.raw.is_null() {
            serde_json::to_string_pretty(result).unwrap_or_default()
        } else {
            serde_json::to_string_pretty(&result.raw).unwrap_or_default()
        };
        lines.extend(block(2, &raw));
    }
    lines
}

/// Invalid JSON makes every other failure of the provider a consequence of
/// it, so only the JSON-validity failure is kept.
fn relevant_failures(failures: Vec<ComponentFailure>) -> Vec<ComponentFailure> {
    let has_json_failure = failures.iter().any(|f| f.assertion.kind == AssertionKind::IsJson);
    if failures.len() > 1 && has_json_failure {
        failures
            .into_iter()
            .filter(|f| f.assertion.kind == AssertionKind::IsJson)
            .collect()
    } else {
        failures
    }
}

/// Lines for one failed assertion, relative to the assertion list indent.
pub fn describe_failure(failure: &ComponentFailure, result: &ProviderResult, verbose: bool) -> Vec<String> {
    let assertion = &failure.assertion;
    let value = assertion.value.clone().unwrap_or(Value::Null);

    let mut lines = match &assertion.kind {
        AssertionKind::Contains => vec![format!(
            "{} includes({}): the response does not contain this text",
            FAIL_MARK, value
        )],
        AssertionKind::Regex => vec![format!(
            "{} matches(/{}/): the response does not match this pattern",
            FAIL_MARK,
            assertion.value_text().unwrap_or_default()
        )],
        AssertionKind::Equals => vec![format!(
            "{} equals({}): the response is not equal to the expected value",
            FAIL_MARK, value
        )],
        AssertionKind::IsJson => {
            let mut line = format!("{} The response is not valid JSON", FAIL_MARK);
            if let Some(output) = result.output_text().filter(|t| !t.trim().is_empty()) {
                line.push_str(&format!(": {}", snippet(&output)));
            }
            vec![line]
        }
        AssertionKind::ScriptPredicate => {
            let script = assertion.value_text().unwrap_or_default();
            match JsonKeyPredicate::parse(&script) {
                Some(predicate) => {
                    let actual = predicate
                        .actual(result.output_value())
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "(absent)".to_string());
                    vec![
                        format!("{} {}", FAIL_MARK, predicate),
                        indent(1, &format!("Expected: {}", predicate.expected)),
                        indent(1, &format!("Actual: {}", actual)),
                    ]
                }
                None => {
                    let mut lines = vec![
                        format!("{} javascript assertion failed", FAIL_MARK),
                        indent(1, &format!("Script: {}", snippet(&script))),
                    ];
                    if let Some(reason) = &failure.reason {
                        lines.push(indent(1, &format!("Reason: {}", reason)));
                    }
                    lines
                }
            }
        }
        AssertionKind::Rubric => describe_rubric(failure, verbose),
        AssertionKind::Other(kind) => {
            let mut lines = vec![format!("{} {} assertion failed", FAIL_MARK, kind)];
            if let Some(reason) = &failure.reason {
                lines.push(indent(1, &format!("Reason: {}", reason)));
            }
            lines
        }
    };

    if verbose && !failure.named_scores.is_empty() {
        let scores = failure
            .named_scores
            .iter()
            .map(|(name, score)| format!("{}={}", name, score))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(indent(1, &format!("Named scores: {}", scores)));
    }
    lines
}

fn describe_rubric(failure: &ComponentFailure, verbose: bool) -> Vec<String> {
    let assertion = &failure.assertion;
    let threshold = assertion
        .threshold
        .unwrap_or(promptcraft_types::DEFAULT_RUBRIC_THRESHOLD);
    let score = failure
        .score
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "n/a".to_string());

    let mut lines = vec![format!(
        "{} rubric: score {} (threshold {:.2})",
        FAIL_MARK, score, threshold
    )];
    if failure.score.is_some_and(|s| s >= threshold) {
        lines.push(indent(
            1,
            "Score meets threshold but one or more rubric criteria failed; every criterion must hold.",
        ));
    }

    if verbose {
        if let Some(criteria) = assertion.value_text() {
            lines.push(indent(1, "Criteria:"));
            lines.extend(block(2, &criteria));
        }
        if let Some(reason) = &failure.reason {
            lines.push(indent(1, "Judge reasoning:"));
            lines.extend(block(2, reason));
        }
    }
    lines
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_LEN {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(SNIPPET_LEN).collect();
    cut.push_str("...");
    cut
}

fn indent(level: usize, text: &str) -> String {
    format!("{}{}", "  ".repeat(level), text)
}

fn block(level: usize, text: &str) -> Vec<String> {
    text.lines().map(|line| indent(level, line)).collect()
}

fn push_line(out: &mut String, level: usize, line: &str) {
    out.push_str(&indent(level, line));
    out.push('\n');
}
