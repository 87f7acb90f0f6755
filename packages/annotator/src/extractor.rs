use async_trait::async_trait;
use policy_harvester::criteria::PolicyCriteria;
use tracing::{debug, warn};

use crate::client::{LlmClient, LlmRequest, Message, Role};
use crate::config::ExtractorConfig;
use crate::error::{AnnotatorError, Result};
use crate::prompt;

/// Turns a policy statement into criteria trees.
#[async_trait]
pub trait CriteriaExtractor: Send + Sync {
    async fn extract(&self, body_text: &str, model_tag: &str) -> Result<Vec<PolicyCriteria>>;
}

/// Criteria extraction backed by an LLM.
///
/// Output that does not parse or validate is sent back to the model with the
/// error, up to `max_attempts` requests per statement.
pub struct LlmCriteriaExtractor<'a, C: LlmClient> {
    client: &'a C,
    config: &'a ExtractorConfig,
}

impl<'a, C: LlmClient> LlmCriteriaExtractor<'a, C> {
    pub fn new(client: &'a C, config: &'a ExtractorConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl<'a, C: LlmClient> CriteriaExtractor for LlmCriteriaExtractor<'a, C> {
    async fn extract(&self, body_text: &str, model_tag: &str) -> Result<Vec<PolicyCriteria>> {
        let system = prompt::build_system_prompt().to_string();
        let mut messages = vec![Message {
            role: Role::User,
            content: body_text.to_string(),
        }];
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let request = LlmRequest {
                model: model_tag.to_string(),
                system: system.clone(),
                messages: messages.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let response = self.client.complete(&request).await?;

            match parse_criteria(&response.content) {
                Ok(criteria) => {
                    debug!(attempt, entries = criteria.len(), "criteria extracted");
                    return Ok(criteria);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "criteria output rejected");
                    last_error = e.to_string();
                    messages.push(Message {
                        role: Role::Assistant,
                        content: response.content,
                    });
                    messages.push(Message {
                        role: Role::User,
                        content: prompt::build_fix_prompt(&last_error),
                    });
                }
            }
        }

        Err(AnnotatorError::Extraction {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

/// Parse and validate criteria from an LLM response.
///
/// Accepts a JSON array of entries or a single entry object.
pub fn parse_criteria(response: &str) -> Result<Vec<PolicyCriteria>> {
    let json = extract_json_from_response(response);
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| AnnotatorError::LlmResponseParse(e.to_string()))?;

    let criteria: Vec<PolicyCriteria> = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|single| vec![single])
    }
    .map_err(|e| AnnotatorError::LlmResponseParse(e.to_string()))?;

    for entry in &criteria {
        entry.validate()?;
    }
    Ok(criteria)
}

/// Extract JSON content from an LLM response, stripping markdown fences if present.
///
/// When multiple fenced blocks exist, prefers the first one that looks like
/// JSON. Without fences the trimmed response is returned as-is.
pub fn extract_json_from_response(response: &str) -> String {
    let trimmed = response.trim();
    let blocks = extract_fenced_blocks(trimmed);

    if let Some(block) = blocks.iter().find(|b| {
        let b = b.trim_start();
        b.starts_with('[') || b.starts_with('{')
    }) {
        return block.trim().to_string();
    }
    if let Some(block) = blocks.last() {
        return block.trim().to_string();
    }

    trimmed.to_string()
}

/// Extract all fenced code blocks from text.
fn extract_fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut remaining = text;

    while let Some(start) = remaining.find("```") {
        let after_fence = &remaining[start + 3..];
        let Some(close) = after_fence.find("```") else {
            break;
        };
        // Skip the language identifier line, unless the block closes on the
        // same line it opens.
        let content_start = after_fence
            .find('\n')
            .filter(|&newline| newline < close)
            .map_or(0, |newline| newline + 1);
        blocks.push(after_fence[content_start..close].to_string());
        remaining = &after_fence[close + 3..];
    }

    blocks
}
