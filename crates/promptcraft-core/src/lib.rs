//! promptcraft-core: unit-test style expectations for LLM prompts.
//! Declare what a prompt's response must satisfy, and the suite compiles it
//! into a promptfoo config, runs the engine, and reports which providers
//! failed and why. See `examples/simple.rs` for a quickstart.

pub mod compiler;
pub mod config;
pub mod decoder;
pub mod error;
pub mod expectations;
pub mod process;
pub mod prompt;
pub mod report;
pub mod runner;
pub mod script;
pub mod testing;

pub use config::{configure, settings, Settings};
pub use decoder::{ComponentFailure, FailingProvider, ResultPartition};
pub use error::{PromptcraftError, Result};
pub use expectations::{Expectations, PatternSource};
pub use process::{EngineRunner, ExecuteOptions, ProcessOutput, ProcessRunner};
pub use prompt::{DirectoryLocator, PlaceholderRenderer, PromptLocator, PromptRenderer, TestId};
pub use runner::{EvaluationOutcome, EvaluationRequest, Suite, SuiteBuilder};
pub use testing::{assert_prompt_passed, assert_provider_passed};
pub use promptcraft_types::{Assertion, AssertionKind, EvaluationConfig, OutputDocument, ProviderSpec};
