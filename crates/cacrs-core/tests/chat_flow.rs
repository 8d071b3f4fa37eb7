//! Chat and report flow against the in-memory store with a scripted provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cacrs_core::ai::{ChatTurn, GenerativeAi, InlineImage, TextStream, TurnRole, WebSearchResult};
use cacrs_core::chat::{
    CHAT_ERROR_REPLY, ChatFlow, ChatUpdate, REPORT_ERROR_TEXT, Rejection, ReportOutcome,
    SendOutcome,
};
use cacrs_core::models::MessageRole;
use cacrs_core::store::{Dataset, MemoryStore};
use cacrs_core::{CaseRepository, Error, Result};
use futures::StreamExt;
use futures::stream;
use tokio::sync::oneshot;

#[derive(Default)]
struct Calls {
    streams: usize,
    completions: usize,
    history: Vec<ChatTurn>,
    system: String,
    prompt: String,
}

/// Provider that replays fixed chunks or fails on demand.
#[derive(Default)]
struct ScriptedAi {
    chunks: Vec<String>,
    fail_stream: bool,
    fail_mid_stream: bool,
    fail_completion: bool,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    calls: Mutex<Calls>,
}

impl ScriptedAi {
    fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl GenerativeAi for ScriptedAi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete_text(&self, prompt: &str) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.completions += 1;
        calls.prompt = prompt.to_string();
        if self.fail_completion {
            return Err(Error::Ai("quota exceeded".to_string()));
        }
        Ok("## Rapport\n\n- Point clé".to_string())
    }

    async fn stream_chat(
        &self,
        history: &[ChatTurn],
        _message: &str,
        system_instruction: &str,
    ) -> Result<TextStream> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.streams += 1;
            calls.history = history.to_vec();
            calls.system = system_instruction.to_string();
        }
        if self.fail_stream {
            return Err(Error::Ai("connection reset".to_string()));
        }
        let mut items: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(Error::Ai("stream interrupted".to_string())));
        }
        let gate = self.gate.lock().unwrap().take();
        let waiting = stream::once(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        })
        .filter_map(|()| async { None::<Result<String>> });
        Ok(waiting.chain(stream::iter(items)).boxed())
    }

    async fn analyze_image(&self, _image: &InlineImage, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn web_search(&self, _query: &str) -> Result<WebSearchResult> {
        Ok(WebSearchResult::default())
    }
}

fn store_without_messages() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_dataset(Dataset {
        messages: Vec::new(),
        ..Dataset::demo()
    }))
}

#[tokio::test]
async fn bonjour_on_empty_case_yields_user_then_assistant() {
    let store = store_without_messages();
    let ai = Arc::new(ScriptedAi::replying(&["Bonjour", ", comment ", "puis-je aider ?"]));
    let flow = ChatFlow::new(store.clone(), ai.clone());

    let outcome = flow.send_message("1", "Bonjour", None).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Completed(_)));

    let log = store.list_messages("1").await.expect("messages");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, MessageRole::User);
    assert_eq!(log[0].content, "Bonjour");
    assert_eq!(log[1].role, MessageRole::Assistant);
    assert_eq!(log[1].content, "Bonjour, comment puis-je aider ?");

    let calls = ai.calls.lock().unwrap();
    assert!(calls.history.is_empty());
    assert!(calls.system.contains("Directive 03-B"));
}

#[tokio::test]
async fn history_uses_provider_roles_and_excludes_new_message() {
    let store = Arc::new(MemoryStore::seeded());
    let ai = Arc::new(ScriptedAi::replying(&["ok"]));
    let flow = ChatFlow::new(store.clone(), ai.clone());

    flow.send_message("1", "Première question", None)
        .await
        .expect("first send");
    flow.send_message("1", "Deuxième question", None)
        .await
        .expect("second send");

    let calls = ai.calls.lock().unwrap();
    let roles: Vec<TurnRole> = calls.history.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![TurnRole::Model, TurnRole::User, TurnRole::Model]
    );
    assert_eq!(calls.history[1].text, "Première question");
    assert_eq!(calls.streams, 2);
}

#[tokio::test]
async fn blank_input_is_a_no_op() {
    let store = Arc::new(MemoryStore::seeded());
    let ai = Arc::new(ScriptedAi::replying(&["ignored"]));
    let flow = ChatFlow::new(store.clone(), ai.clone());
    let before = store.list_messages("1").await.expect("before");

    for text in ["", "   ", "\n\t"] {
        let outcome = flow.send_message("1", text, None).await.expect("send");
        assert_eq!(outcome, SendOutcome::Rejected(Rejection::EmptyInput));
    }

    assert_eq!(store.list_messages("1").await.expect("after"), before);
    assert_eq!(ai.calls.lock().unwrap().streams, 0);
}

#[tokio::test]
async fn unknown_case_is_an_error() {
    let flow = ChatFlow::new(
        Arc::new(MemoryStore::seeded()),
        Arc::new(ScriptedAi::replying(&["x"])),
    );
    let err = flow.send_message("404", "Bonjour", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn stream_open_failure_degrades_to_apology() {
    let store = store_without_messages();
    let ai = Arc::new(ScriptedAi {
        fail_stream: true,
        ..ScriptedAi::default()
    });
    let flow = ChatFlow::new(store.clone(), ai);

    let outcome = flow.send_message("1", "Bonjour", None).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Degraded(_)));

    let log = store.list_messages("1").await.expect("messages");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].content, "Bonjour");
    assert_eq!(log[1].content, CHAT_ERROR_REPLY);
}

#[tokio::test]
async fn mid_stream_failure_replaces_partial_reply() {
    let store = store_without_messages();
    let ai = Arc::new(ScriptedAi {
        chunks: vec!["Réponse part".to_string()],
        fail_mid_stream: true,
        ..ScriptedAi::default()
    });
    let flow = ChatFlow::new(store.clone(), ai);

    flow.send_message("1", "Bonjour", None).await.expect("send");

    let log = store.list_messages("1").await.expect("messages");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].content, CHAT_ERROR_REPLY);
}

#[tokio::test]
async fn updates_arrive_in_order() {
    let store = store_without_messages();
    let ai = Arc::new(ScriptedAi::replying(&["a", "b"]));
    let flow = ChatFlow::new(store, ai);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    flow.send_message("1", "Bonjour", Some(&tx)).await.expect("send");
    drop(tx);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), 5);
    assert!(matches!(updates[0], ChatUpdate::UserMessage { .. }));
    assert!(matches!(updates[1], ChatUpdate::AssistantStarted { .. }));
    assert!(matches!(&updates[2], ChatUpdate::Chunk { content, .. } if content == "a"));
    assert!(matches!(&updates[3], ChatUpdate::Chunk { content, .. } if content == "ab"));
    assert!(matches!(&updates[4], ChatUpdate::Finished { message } if message.content == "ab"));
}

#[tokio::test]
async fn second_send_is_rejected_while_first_is_streaming() {
    let store = store_without_messages();
    let (release, gate) = oneshot::channel();
    let ai = Arc::new(ScriptedAi {
        chunks: vec!["fini".to_string()],
        gate: Mutex::new(Some(gate)),
        ..ScriptedAi::default()
    });
    let flow = Arc::new(ChatFlow::new(store.clone(), ai));

    let first = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.send_message("1", "Bonjour", None).await })
    };
    while !flow.is_busy("1") {
        tokio::task::yield_now().await;
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let second = flow
        .send_message("1", "Encore", Some(&tx))
        .await
        .expect("second");
    assert_eq!(second, SendOutcome::Rejected(Rejection::Busy));
    drop(tx);
    assert_eq!(
        rx.recv().await,
        Some(ChatUpdate::Rejected {
            reason: Rejection::Busy
        })
    );
    assert_eq!(rx.recv().await, None);
    let report = flow.generate_report_from_selection("1").await.expect("report");
    assert!(matches!(report, ReportOutcome::Rejected(_)));

    release.send(()).expect("release");
    let first = first.await.expect("join").expect("first");
    assert!(matches!(first, SendOutcome::Completed(_)));
    assert!(!flow.is_busy("1"));

    let log = store.list_messages("1").await.expect("messages");
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn report_from_two_selected_messages() {
    let store = Arc::new(MemoryStore::seeded());
    let ai = Arc::new(ScriptedAi::replying(&["Réponse détaillée"]));
    let flow = ChatFlow::new(store.clone(), ai.clone());
    flow.send_message("1", "Quels comptes diffusent ?", None)
        .await
        .expect("send");

    let log = store.list_messages("1").await.expect("messages");
    let before = log.len();
    for message in &log[1..3] {
        store
            .set_message_selected("1", &message.id, true)
            .await
            .expect("select");
    }

    let outcome = flow
        .generate_report_from_selection("1")
        .await
        .expect("report");
    let ReportOutcome::Generated { report, messages } = outcome else {
        panic!("report was rejected");
    };

    assert!(report.is_report);
    assert_eq!(report.role, MessageRole::Assistant);
    assert_eq!(report.content, "## Rapport\n\n- Point clé");
    assert_eq!(messages.len(), before + 1);
    assert_eq!(messages.iter().filter(|m| m.is_report).count(), 1);
    assert!(messages.iter().all(|m| !m.is_selected));

    let prompt = ai.calls.lock().unwrap().prompt.clone();
    assert!(prompt.contains("\"Opération Corbeau Numérique\""));
    assert!(prompt.contains("**Analyste:** Quels comptes diffusent ?"));
    assert!(prompt.contains("**Assistant:** Réponse détaillée"));
    assert!(!prompt.contains("Comment puis-je vous aider"));
}

#[tokio::test]
async fn empty_selection_changes_nothing() {
    let store = Arc::new(MemoryStore::seeded());
    let ai = Arc::new(ScriptedAi::replying(&[]));
    let flow = ChatFlow::new(store.clone(), ai.clone());
    let before = store.list_messages("1").await.expect("before");

    let outcome = flow.generate_report("1", "Dossier", &[]).await.expect("report");
    assert_eq!(outcome, ReportOutcome::Rejected(Rejection::EmptySelection));
    assert_eq!(store.list_messages("1").await.expect("after"), before);
    assert_eq!(ai.calls.lock().unwrap().completions, 0);
}

#[tokio::test]
async fn failed_report_stores_fallback_and_clears_selection() {
    let store = Arc::new(MemoryStore::seeded());
    let ai = Arc::new(ScriptedAi {
        fail_completion: true,
        ..ScriptedAi::default()
    });
    let flow = ChatFlow::new(store.clone(), ai);
    let greeting = store.list_messages("1").await.expect("messages")[0].clone();
    let selected = store
        .set_message_selected("1", &greeting.id, true)
        .await
        .expect("select");

    let outcome = flow
        .generate_report("1", "Opération Corbeau Numérique", &[selected])
        .await
        .expect("report");
    let ReportOutcome::Generated { report, messages } = outcome else {
        panic!("report was rejected");
    };
    assert_eq!(report.content, REPORT_ERROR_TEXT);
    assert!(messages.iter().all(|m| !m.is_selected));
}

#[tokio::test]
async fn report_messages_cannot_be_selected() {
    let store = Arc::new(MemoryStore::seeded());
    let flow = ChatFlow::new(store.clone(), Arc::new(ScriptedAi::default()));
    let greeting = store.list_messages("1").await.expect("messages")[0].clone();
    let ReportOutcome::Generated { report, .. } = flow
        .generate_report("1", "Dossier", &[greeting])
        .await
        .expect("report")
    else {
        panic!("report was rejected");
    };

    let err = store
        .set_message_selected("1", &report.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
