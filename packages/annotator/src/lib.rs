//! Policy Annotator - Extract criteria trees from harvested policy records.
//!
//! Reads the record files written by `policy-harvester`, sends each policy
//! body to an LLM and appends the resulting ALL/ANY criteria trees to the
//! record's annotation history.
//!
//! - [`config`]: Model allow-list and extractor configuration
//! - [`client`]: LLM client trait and the chat completions client
//! - [`prompt`]: Prompt construction
//! - [`extractor`]: Criteria extraction, parsing and validation
//! - [`annotator`]: Annotation over record files and directories
//! - [`error`]: Error types and Result alias
//! - [`cli`]: Command-line interface

pub mod annotator;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod prompt;

pub use annotator::{AnnotationSummary, Annotator};
#[cfg(any(test, feature = "test-utils"))]
pub use client::test_support::MockLlmClient;
pub use client::{LlmClient, LlmRequest, LlmResponse, Message, OpenAiClient, Role};
pub use config::{validate_model_tag, ExtractorConfig, ALLOWED_MODELS, DEFAULT_MODEL};
pub use error::{AnnotatorError, Result};
pub use extractor::{
    extract_json_from_response, parse_criteria, CriteriaExtractor, LlmCriteriaExtractor,
};
