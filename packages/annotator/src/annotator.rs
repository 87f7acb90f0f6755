//! Annotation stage over persisted records.
//!
//! Each record's body is sent to a [`CriteriaExtractor`] and the result is
//! appended to the record's annotation history. A failed extraction leaves
//! that record untouched and the stage moves on; in a directory run, a file
//! that cannot be read is counted and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use policy_harvester::criteria::CriteriaAnnotation;
use policy_harvester::sink::{load_records, save_records};
use policy_harvester::Record;
use tracing::{info, warn};

use crate::error::{AnnotatorError, Result};
use crate::extractor::CriteriaExtractor;
use crate::prompt;

/// Outcome counts of an annotation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub files: usize,
    pub total: usize,
    pub annotated: usize,
    pub failed: usize,
    /// Records without body text, not sent to the extractor.
    pub skipped: usize,
    /// Files in a directory run that could not be loaded or written.
    pub failed_files: usize,
}

impl AnnotationSummary {
    fn add(&mut self, other: &AnnotationSummary) {
        self.files += other.files;
        self.total += other.total;
        self.annotated += other.annotated;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.failed_files += other.failed_files;
    }
}

/// Appends criteria annotations to records using one extractor and model.
pub struct Annotator<'a, E: CriteriaExtractor> {
    extractor: &'a E,
    model: String,
}

impl<'a, E: CriteriaExtractor> Annotator<'a, E> {
    pub fn new(extractor: &'a E, model: impl Into<String>) -> Self {
        Self {
            extractor,
            model: model.into(),
        }
    }

    /// Annotate records in place, sequentially.
    pub async fn annotate_records(&self, records: &mut [Record]) -> AnnotationSummary {
        let mut summary = AnnotationSummary {
            total: records.len(),
            ..AnnotationSummary::default()
        };

        for record in records.iter_mut() {
            if record.body_text.trim().is_empty() {
                warn!(url = %record.identifier, "record has no body text, skipping");
                summary.skipped += 1;
                continue;
            }

            info!(subject = record.label(), model = %self.model, "extracting criteria");
            let statement =
                prompt::build_policy_statement(&record.body_text, record.subject.as_deref());

            match self.extractor.extract(&statement, &self.model).await {
                Ok(criteria) => {
                    record
                        .annotations
                        .push(CriteriaAnnotation::new(self.model.clone(), criteria));
                    summary.annotated += 1;
                }
                Err(e) => {
                    warn!(url = %record.identifier, error = %e, "criteria extraction failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Annotate every record of one JSON file and write the file back.
    pub async fn annotate_file(&self, path: &Path) -> Result<AnnotationSummary> {
        let mut records = load_records(path)?;
        info!(path = %path.display(), records = records.len(), "annotating file");

        let mut summary = self.annotate_records(&mut records).await;
        summary.files = 1;

        if summary.annotated > 0 {
            save_records(path, &records)?;
        }
        Ok(summary)
    }

    /// Annotate a single file, or every `*.json` file directly inside a directory.
    ///
    /// A single file that fails is an error; in a directory the file is
    /// counted in [`AnnotationSummary::failed_files`] and the rest continue.
    pub async fn annotate_path(&self, path: &Path) -> Result<AnnotationSummary> {
        if path.is_file() {
            return self.annotate_file(path).await;
        }
        if !path.is_dir() {
            return Err(AnnotatorError::InvalidDataPath(path.to_path_buf()));
        }

        let mut summary = AnnotationSummary::default();
        for file in json_files(path)? {
            match self.annotate_file(&file).await {
                Ok(file_summary) => summary.add(&file_summary),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping unreadable records file");
                    summary.files += 1;
                    summary.failed_files += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// JSON files directly inside a directory, sorted by name.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policy_harvester::criteria::{ConditionNode, PolicyCriteria};
    use policy_harvester::ItemIdentifier;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Extractor failing for statements containing "FAIL".
    #[derive(Default)]
    struct StubExtractor {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CriteriaExtractor for StubExtractor {
        async fn extract(&self, body_text: &str, model_tag: &str) -> Result<Vec<PolicyCriteria>> {
            self.seen
                .lock()
                .unwrap()
                .push((body_text.to_string(), model_tag.to_string()));
            if body_text.contains("FAIL") {
                return Err(AnnotatorError::LlmEmptyResponse);
            }
            Ok(vec![PolicyCriteria {
                medical_act: "Procedure".to_string(),
                sub_medical_act: None,
                necessity_type: "Medically Necessary".to_string(),
                description: String::new(),
                conditions: Some(ConditionNode::all(vec![
                    ConditionNode::leaf("Condition A"),
                    ConditionNode::leaf("Condition B"),
                ])),
            }])
        }
    }

    fn record(name: &str, body: &str) -> Record {
        let mut record = Record::new(ItemIdentifier::new(format!(
            "https://example.org/{name}.html"
        )));
        record.subject = Some(name.to_string());
        record.body_text = body.to_string();
        record
    }

    fn three_records() -> Vec<Record> {
        vec![
            record("first", "<ol><li>A</li></ol>"),
            record("second", "<ol><li>FAIL</li></ol>"),
            record("third", "<ol><li>C</li></ol>"),
        ]
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_others() {
        let extractor = StubExtractor::default();
        let annotator = Annotator::new(&extractor, "gpt-4o");
        let mut records = three_records();

        let summary = annotator.annotate_records(&mut records).await;

        assert_eq!(summary.annotated, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(records[0].annotations.len(), 1);
        assert!(records[1].annotations.is_empty());
        assert_eq!(records[2].annotations.len(), 1);
        assert_eq!(records[0].annotations[0].extractor_model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_statement_is_headed_by_subject() {
        let extractor = StubExtractor::default();
        let annotator = Annotator::new(&extractor, "gpt-4.1");
        let mut records = vec![record("Acupuncture", "<ol><li>A</li></ol>")];

        annotator.annotate_records(&mut records).await;

        let seen = extractor.seen.lock().unwrap();
        assert_eq!(seen[0].0, "--Acupuncture--\n<ol><li>A</li></ol>\n");
        assert_eq!(seen[0].1, "gpt-4.1");
    }

    #[tokio::test]
    async fn test_empty_body_skipped() {
        let extractor = StubExtractor::default();
        let annotator = Annotator::new(&extractor, "gpt-4o");
        let mut records = vec![record("empty", "  ")];

        let summary = annotator.annotate_records(&mut records).await;
        assert_eq!(summary.skipped, 1);
        assert!(extractor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_appends_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("surgery_policies.json");
        save_records(&path, &three_records()).unwrap();

        let extractor = StubExtractor::default();
        Annotator::new(&extractor, "gpt-4o").annotate_file(&path).await.unwrap();
        Annotator::new(&extractor, "gpt-4o-mini").annotate_file(&path).await.unwrap();

        let records = load_records(&path).unwrap();
        let models: Vec<_> = records[0]
            .annotations
            .iter()
            .map(|a| a.extractor_model.as_str())
            .collect();
        assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]);
        assert!(records[1].annotations.is_empty());
    }

    #[tokio::test]
    async fn test_annotate_directory() {
        let dir = tempdir().unwrap();
        save_records(&dir.path().join("a_policies.json"), &three_records()).unwrap();
        save_records(&dir.path().join("b_policies.json"), &[record("x", "<p>X</p>")]).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a record file").unwrap();

        let extractor = StubExtractor::default();
        let summary = Annotator::new(&extractor, "gpt-4o")
            .annotate_path(dir.path())
            .await
            .unwrap();

        assert_eq!(
            summary,
            AnnotationSummary {
                files: 2,
                total: 4,
                annotated: 3,
                failed: 1,
                skipped: 0,
                failed_files: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_stop_directory() {
        let dir = tempdir().unwrap();
        save_records(&dir.path().join("a_policies.json"), &[record("a", "<p>A</p>")]).unwrap();
        fs::write(dir.path().join("b_policies.json"), "{ not records").unwrap();
        save_records(&dir.path().join("c_policies.json"), &[record("c", "<p>C</p>")]).unwrap();

        let extractor = StubExtractor::default();
        let summary = Annotator::new(&extractor, "gpt-4o")
            .annotate_path(dir.path())
            .await
            .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.failed_files, 1);
        assert_eq!(summary.annotated, 2);
        let last = load_records(&dir.path().join("c_policies.json")).unwrap();
        assert_eq!(last[0].annotations.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_single_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a_policies.json");
        fs::write(&path, "{ not records").unwrap();

        let extractor = StubExtractor::default();
        let result = Annotator::new(&extractor, "gpt-4o").annotate_path(&path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_path_is_error() {
        let dir = tempdir().unwrap();
        let extractor = StubExtractor::default();
        let result = Annotator::new(&extractor, "gpt-4o")
            .annotate_path(&dir.path().join("missing"))
            .await;
        assert!(matches!(result, Err(AnnotatorError::InvalidDataPath(_))));
    }
}
