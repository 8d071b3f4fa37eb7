//! Deterministic provider for setups without an API key.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use super::{ChatTurn, GenerativeAi, InlineImage, TextStream, WebSearchResult};
use crate::error::Result;
use crate::models::FileAnalysis;

/// Answers every request locally with fixed French text.
#[derive(Debug, Clone, Default)]
pub struct OfflineAi;

impl OfflineAi {
    pub fn new() -> Self {
        Self
    }

    fn reply_to(message: &str) -> String {
        format!(
            "Mode hors ligne : le message « {} » a été enregistré. Aucun modèle n'est configuré, \
             renseignez une clé API pour obtenir une analyse.",
            message.trim()
        )
    }
}

#[async_trait]
impl GenerativeAi for OfflineAi {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete_text(&self, prompt: &str) -> Result<String> {
        let excerpt: String = prompt.trim().chars().take(280).collect();
        Ok(format!(
            "## Synthèse (mode hors ligne)\n\nAucun modèle n'est configuré. Extrait de la demande :\n\n> {excerpt}"
        ))
    }

    async fn stream_chat(
        &self,
        _history: &[ChatTurn],
        message: &str,
        _system_instruction: &str,
    ) -> Result<TextStream> {
        let words: Vec<Result<String>> = Self::reply_to(message)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(stream::iter(words).boxed())
    }

    async fn analyze_image(&self, image: &InlineImage, _prompt: &str) -> Result<String> {
        let analysis = FileAnalysis {
            summary: format!(
                "Analyse hors ligne d'une image {} : aucun modèle n'est configuré.",
                image.mime_type
            ),
            entities: Vec::new(),
            risks: Vec::new(),
        };
        Ok(serde_json::to_string(&analysis)?)
    }

    async fn web_search(&self, query: &str) -> Result<WebSearchResult> {
        Ok(WebSearchResult {
            text: format!(
                "Recherche hors ligne pour « {} » : aucune source web n'est disponible.",
                query.trim()
            ),
            sources: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn test_stream_reassembles_reply() {
        let ai = OfflineAi::new();
        let chunks: Vec<String> = ai
            .stream_chat(&[], "Bonjour", "")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), OfflineAi::reply_to("Bonjour"));
    }

    #[tokio::test]
    async fn test_image_analysis_is_valid_json() {
        let ai = OfflineAi::new();
        let image = InlineImage {
            data_base64: String::new(),
            mime_type: "image/png".to_string(),
        };
        let raw = ai.analyze_image(&image, "décris").await.unwrap();
        let parsed: FileAnalysis = serde_json::from_str(&raw).unwrap();
        assert!(parsed.summary.contains("image/png"));
    }
}
