//! File analysis and web research with a canned provider.

use std::sync::Arc;

use async_trait::async_trait;
use cacrs_core::ai::{ChatTurn, GenerativeAi, InlineImage, TextStream, WebSearchResult};
use cacrs_core::analysis::{ANALYSIS_ERROR_TEXT, AnalysisOutcome, FileAnalyzer};
use cacrs_core::models::{CaseEventKind, GroundingSource, NewCaseFile};
use cacrs_core::research::{Research, SEARCH_ERROR_TEXT};
use cacrs_core::store::MemoryStore;
use cacrs_core::{CaseRepository, Error, Result};

/// Provider returning a fixed image reply and search result, or failing.
struct CannedAi {
    image_reply: Option<String>,
    search: Option<WebSearchResult>,
}

#[async_trait]
impl GenerativeAi for CannedAi {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete_text(&self, _prompt: &str) -> Result<String> {
        Err(Error::Ai("unused".to_string()))
    }

    async fn stream_chat(
        &self,
        _history: &[ChatTurn],
        _message: &str,
        _system_instruction: &str,
    ) -> Result<TextStream> {
        Err(Error::Ai("unused".to_string()))
    }

    async fn analyze_image(&self, _image: &InlineImage, _prompt: &str) -> Result<String> {
        self.image_reply
            .clone()
            .ok_or_else(|| Error::Ai("model overloaded".to_string()))
    }

    async fn web_search(&self, _query: &str) -> Result<WebSearchResult> {
        self.search
            .clone()
            .ok_or_else(|| Error::Ai("search unavailable".to_string()))
    }
}

fn canned(image_reply: Option<&str>, search: Option<WebSearchResult>) -> Arc<CannedAi> {
    Arc::new(CannedAi {
        image_reply: image_reply.map(ToString::to_string),
        search,
    })
}

async fn upload(store: &MemoryStore, mime_type: &str, content: Option<&str>) -> String {
    store
        .add_file(
            "1",
            NewCaseFile {
                name: "capture.png".to_string(),
                mime_type: mime_type.to_string(),
                size: 10,
                content_base64: content.map(ToString::to_string),
            },
            "Analyste Alpha",
        )
        .await
        .expect("upload")
        .id
}

#[tokio::test]
async fn image_analysis_is_attached_once() {
    let store = Arc::new(MemoryStore::seeded());
    let file_id = upload(&store, "image/png", Some("iVBORw0KGgo=")).await;
    let analyzer = FileAnalyzer::new(
        store.clone(),
        canned(
            Some("```json\n{\"summary\":\"Tract\",\"entities\":[\"Candidat A\"],\"risks\":[\"Usurpation\"]}\n```"),
            None,
        ),
    );

    let outcome = analyzer.analyze_file("1", &file_id).await.expect("analyze");
    let AnalysisOutcome::Analyzed(file) = outcome else {
        panic!("expected a new analysis");
    };
    let analysis = file.analysis.expect("analysis");
    assert_eq!(analysis.summary, "Tract");
    assert_eq!(analysis.entities, vec!["Candidat A"]);

    let again = analyzer.analyze_file("1", &file_id).await.expect("analyze");
    assert!(matches!(again, AnalysisOutcome::AlreadyAnalyzed(_)));
    assert_eq!(again.file().analysis.as_ref().map(|a| a.summary.as_str()), Some("Tract"));

    let analyses = store
        .list_events("1")
        .await
        .expect("events")
        .into_iter()
        .filter(|e| matches!(e.kind, CaseEventKind::AiAnalysis { .. }))
        .count();
    assert_eq!(analyses, 1);
}

#[tokio::test]
async fn provider_failure_is_wrapped_in_fallback_shape() {
    let store = Arc::new(MemoryStore::seeded());
    let file_id = upload(&store, "image/png", Some("iVBORw0KGgo=")).await;
    let analyzer = FileAnalyzer::new(store, canned(None, None));

    let outcome = analyzer.analyze_file("1", &file_id).await.expect("analyze");
    let analysis = outcome.file().analysis.clone().expect("analysis");
    assert_eq!(analysis.summary, ANALYSIS_ERROR_TEXT);
    assert_eq!(analysis.entities, vec!["N/A"]);
    assert_eq!(analysis.risks, vec!["N/A"]);
}

#[tokio::test]
async fn non_images_and_missing_content_are_rejected() {
    let store = Arc::new(MemoryStore::seeded());
    let analyzer = FileAnalyzer::new(store.clone(), canned(Some("{}"), None));

    // Seeded PDF.
    assert!(matches!(
        analyzer.analyze_file("1", "f1-1").await,
        Err(Error::InvalidInput(_))
    ));
    // Seeded image without inline content.
    assert!(matches!(
        analyzer.analyze_file("1", "f1-2").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        analyzer.analyze_file("1", "missing").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn search_results_can_be_saved_and_deleted() {
    let store = Arc::new(MemoryStore::seeded());
    let result = WebSearchResult {
        text: "Campagne détectée".to_string(),
        sources: vec![
            GroundingSource {
                uri: "https://a.example".to_string(),
                title: "A".to_string(),
            },
            GroundingSource {
                uri: "https://b.example".to_string(),
                title: "B".to_string(),
            },
        ],
    };
    let research = Research::new(store, canned(None, Some(result.clone())));

    let found = research.web_search("  bots  ").await.expect("search");
    assert_eq!(found, result);

    let finding = research
        .save_finding("bots", found)
        .await
        .expect("save");
    let findings = research.findings().await.expect("findings");
    assert_eq!(findings[0].id, finding.id);
    assert_eq!(findings[0].sources[1].uri, "https://b.example");

    let removed = research
        .delete_findings(&[finding.id.clone()])
        .await
        .expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(research.delete_findings(&[]).await.expect("delete"), 0);
}

#[tokio::test]
async fn search_failure_degrades_and_blank_query_is_rejected() {
    let research = Research::new(Arc::new(MemoryStore::seeded()), canned(None, None));

    let result = research.web_search("ingérence").await.expect("search");
    assert_eq!(result.text, SEARCH_ERROR_TEXT);
    assert!(result.sources.is_empty());

    assert!(matches!(
        research.web_search("   ").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn watchlists_validate_input() {
    let research = Research::new(Arc::new(MemoryStore::seeded()), canned(None, None));

    let watchlist = research
        .create_watchlist("Veille bots", "bots électoraux", 20)
        .await
        .expect("create");
    assert_eq!(watchlist.refresh_interval_minutes, 20);
    assert_eq!(research.watchlists().await.expect("list")[0].id, watchlist.id);

    assert!(research.create_watchlist("", "q", 5).await.is_err());
    assert!(research.create_watchlist("n", "q", 0).await.is_err());
}
