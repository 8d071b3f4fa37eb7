//! AI analysis of uploaded case files.

use std::sync::Arc;

use crate::ai::{GenerativeAi, InlineImage};
use crate::error::{Error, Result};
use crate::models::{CaseFile, FileAnalysis};
use crate::store::CaseRepository;

/// Prompt sent with every analysed image.
pub const IMAGE_PROMPT: &str = "Analyse cette image dans le contexte d'une enquête de sécurité. \
    Décris les objets, personnes, lieux et identifie les points de vigilance potentiels. \
    Formatte la réponse en JSON avec les clés 'summary', 'entities', et 'risks'.";

/// Summary stored when the provider call fails.
pub const ANALYSIS_ERROR_TEXT: &str = "Une erreur est survenue lors de l'analyse de l'image.";

/// Result of [`FileAnalyzer::analyze_file`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A new analysis was attached.
    Analyzed(CaseFile),
    /// The file already carried an analysis and was left untouched.
    AlreadyAnalyzed(CaseFile),
}

impl AnalysisOutcome {
    pub fn file(&self) -> &CaseFile {
        match self {
            AnalysisOutcome::Analyzed(file) | AnalysisOutcome::AlreadyAnalyzed(file) => file,
        }
    }
}

/// Parse a model reply into the analysis shape.
///
/// A fenced ```json block is accepted. Anything that does not parse becomes
/// the summary with placeholder entities and risks.
pub fn parse_analysis(raw: &str) -> FileAnalysis {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map_or(trimmed, |rest| rest.trim_end().trim_end_matches("```"))
        .trim();

    serde_json::from_str::<FileAnalysis>(body).unwrap_or_else(|_| fallback(raw))
}

fn fallback(summary: &str) -> FileAnalysis {
    FileAnalysis {
        summary: summary.to_string(),
        entities: vec!["N/A".to_string()],
        risks: vec!["N/A".to_string()],
    }
}

/// Runs image analysis and attaches the result to the file record.
pub struct FileAnalyzer {
    repo: Arc<dyn CaseRepository>,
    ai: Arc<dyn GenerativeAi>,
}

impl FileAnalyzer {
    pub fn new(repo: Arc<dyn CaseRepository>, ai: Arc<dyn GenerativeAi>) -> Self {
        Self { repo, ai }
    }

    pub async fn analyze_file(&self, case_id: &str, file_id: &str) -> Result<AnalysisOutcome> {
        let file = self
            .repo
            .get_file(case_id, file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id} in case {case_id}")))?;

        if file.analysis.is_some() {
            return Ok(AnalysisOutcome::AlreadyAnalyzed(file));
        }
        if !file.is_image() {
            return Err(Error::InvalidInput(format!(
                "only images can be analysed, {} is {}",
                file.name, file.mime_type
            )));
        }
        let Some(data) = file.content_base64.clone() else {
            return Err(Error::InvalidInput(format!(
                "{} has no inline content to analyse",
                file.name
            )));
        };

        let image = InlineImage {
            data_base64: data,
            mime_type: file.mime_type.clone(),
        };
        let analysis = match self.ai.analyze_image(&image, IMAGE_PROMPT).await {
            Ok(raw) => parse_analysis(&raw),
            Err(e) => {
                tracing::error!(case_id, file_id, error = %e, "Image analysis failed");
                fallback(ANALYSIS_ERROR_TEXT)
            }
        };

        let file = self
            .repo
            .set_file_analysis(case_id, file_id, analysis)
            .await?;
        tracing::info!(case_id, file_id, "File analysis attached");
        Ok(AnalysisOutcome::Analyzed(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let analysis = parse_analysis(r#"{"summary":"Affiche","entities":["Parti X"],"risks":[]}"#);
        assert_eq!(analysis.summary, "Affiche");
        assert_eq!(analysis.entities, vec!["Parti X"]);
        assert!(analysis.risks.is_empty());
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"summary\":\"Foule\",\"entities\":[],\"risks\":[\"Rassemblement\"]}\n```";
        let analysis = parse_analysis(raw);
        assert_eq!(analysis.summary, "Foule");
        assert_eq!(analysis.risks, vec!["Rassemblement"]);
    }

    #[test]
    fn test_free_text_falls_back() {
        let analysis = parse_analysis("Une image floue.");
        assert_eq!(analysis.summary, "Une image floue.");
        assert_eq!(analysis.entities, vec!["N/A"]);
        assert_eq!(analysis.risks, vec!["N/A"]);
    }
}
