//! Error types for the annotator.

use std::path::PathBuf;

use policy_harvester::criteria::CriteriaError;
use policy_harvester::HarvesterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotatorError {
    #[error("invalid model '{name}'. Expected one of: {}", .allowed.join(", "))]
    InvalidModel { name: String, allowed: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data path is neither a file nor a directory: {}", .0.display())]
    InvalidDataPath(PathBuf),

    #[error("LLM API request failed: {0}")]
    LlmApiRequest(#[from] reqwest::Error),

    #[error("LLM API error (status {status}): {message}")]
    LlmApiError { status: u16, message: String },

    #[error("LLM rate limited, retry after {retry_after_secs}s")]
    LlmRateLimited { retry_after_secs: u64 },

    #[error("failed to parse LLM response: {0}")]
    LlmResponseParse(String),

    #[error("LLM returned empty response")]
    LlmEmptyResponse,

    #[error("criteria extraction failed after {attempts} attempts: {message}")]
    Extraction { attempts: u32, message: String },

    #[error("invalid criteria: {0}")]
    InvalidCriteria(#[from] CriteriaError),

    #[error(transparent)]
    Records(#[from] HarvesterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
