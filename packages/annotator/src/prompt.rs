const SYSTEM_CRITERIA: &str = include_str!("../prompts/system_criteria.txt");

/// Build the system prompt for criteria extraction.
pub fn build_system_prompt() -> &'static str {
    SYSTEM_CRITERIA
}

/// Frame a record's body as a policy statement, headed by its subject.
pub fn build_policy_statement(body_text: &str, subject: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(subject) = subject {
        prompt.push_str(&format!("--{subject}--\n"));
    }
    prompt.push_str(body_text.trim());
    prompt.push('\n');
    prompt
}

/// Build a follow-up prompt asking the model to repair its previous answer.
pub fn build_fix_prompt(error: &str) -> String {
    format!(
        "Your previous answer could not be used: {error}\n\n\
         Return the corrected JSON array only, following the same rules. \
         Every group needs at least one child and every criterion has \"conditions\": null."
    )
}
