//! Chat and report flow for a case.
//!
//! A send persists the user message, fetches retrieval context, then streams
//! the assistant answer into a pending message chunk by chunk. A report
//! condenses selected messages into one flagged assistant message. Only one
//! request per case may be outstanding at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::ai::{ChatTurn, GenerativeAi};
use crate::error::{Error, Result};
use crate::models::{Message, MessageRole, NewMessage};
use crate::store::CaseRepository;

/// Reply stored when context retrieval or streaming fails.
pub const CHAT_ERROR_REPLY: &str = "Désolé, une erreur est survenue.";

/// Report body stored when the completion fails.
pub const REPORT_ERROR_TEXT: &str =
    "## Erreur de Génération\n\nUne erreur est survenue lors de la création du rapport.";

/// System instruction for case chat, with the retrieval context appended.
pub fn system_instruction(context: &str) -> String {
    format!(
        "Tu es un assistant d'analyse pour le Centre d'Analyse du Contre-Renseignement et de la \
         Sécurité (CACRS). Ta mission est d'aider les analystes dans leurs enquêtes liées à \
         l'élection 2026. Sois précis, factuel et neutre. Utilise le contexte fourni pour enrichir \
         tes réponses. Contexte pertinent (RAG): {context}"
    )
}

/// Prompt asking for a Markdown synthesis of the given messages.
pub fn report_prompt(case_title: &str, messages: &[Message]) -> String {
    let transcript = messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "Analyste",
                MessageRole::Assistant => "Assistant",
            };
            format!("**{speaker}:** {}", message.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Tu es un assistant d'analyse pour le CACRS.\n\
         Génère un rapport de synthèse concis et structuré basé sur la conversation suivante pour le dossier: \"{case_title}\".\n\
         Le rapport doit être au format Markdown.\n\
         Incluis les points clés, les actions suggérées et les entités mentionnées.\n\
         Ne mentionne que les informations pertinentes issues des messages fournis.\n\n\
         Conversation à analyser :\n{transcript}"
    )
}

/// Progress of a send, emitted in order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    /// The user message was persisted.
    UserMessage { message: Message },
    /// The empty assistant message was created and the stream is opening.
    AssistantStarted { message: Message },
    /// A chunk arrived. `content` is the full text so far.
    Chunk {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
        content: String,
    },
    /// The stream ended.
    Finished { message: Message },
    /// The request failed and the apology was stored.
    Failed { message: Message },
    /// The send was ignored; nothing was stored.
    Rejected { reason: Rejection },
}

impl ChatUpdate {
    /// Event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatUpdate::UserMessage { .. } => "user_message",
            ChatUpdate::AssistantStarted { .. } => "assistant_started",
            ChatUpdate::Chunk { .. } => "chunk",
            ChatUpdate::Finished { .. } => "finished",
            ChatUpdate::Failed { .. } => "failed",
            ChatUpdate::Rejected { .. } => "rejected",
        }
    }
}

/// Why a request was ignored.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    EmptyInput,
    EmptySelection,
    Busy,
}

/// Result of [`ChatFlow::send_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Rejected(Rejection),
    Completed(Message),
    /// The provider failed; the message holds the apology text.
    Degraded(Message),
}

/// Result of [`ChatFlow::generate_report`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Rejected(Rejection),
    /// The report message and the reloaded log.
    Generated {
        report: Message,
        messages: Vec<Message>,
    },
}

/// Marks a case busy until dropped.
struct InFlight<'a> {
    cases: &'a Mutex<HashSet<String>>,
    case_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(cases: &'a Mutex<HashSet<String>>, case_id: &str) -> Option<Self> {
        let mut busy = cases.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(case_id.to_string()) {
            return None;
        }
        Some(Self {
            cases,
            case_id: case_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.case_id);
    }
}

/// Chat orchestration over a repository and an AI provider.
pub struct ChatFlow {
    repo: Arc<dyn CaseRepository>,
    ai: Arc<dyn GenerativeAi>,
    in_flight: Mutex<HashSet<String>>,
}

impl ChatFlow {
    pub fn new(repo: Arc<dyn CaseRepository>, ai: Arc<dyn GenerativeAi>) -> Self {
        Self {
            repo,
            ai,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a send or report is outstanding for the case.
    pub fn is_busy(&self, case_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(case_id)
    }

    /// Send a user message and stream the assistant reply.
    ///
    /// Blank input and a busy case are rejected without touching the log;
    /// the rejection is still reported on `updates`.
    /// Provider failures never surface as `Err`; repository failures before
    /// the user message is stored do.
    pub async fn send_message(
        &self,
        case_id: &str,
        text: &str,
        updates: Option<&UnboundedSender<ChatUpdate>>,
    ) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            emit(
                updates,
                ChatUpdate::Rejected {
                    reason: Rejection::EmptyInput,
                },
            );
            return Ok(SendOutcome::Rejected(Rejection::EmptyInput));
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight, case_id) else {
            tracing::debug!(case_id, "Chat send rejected, request in flight");
            emit(
                updates,
                ChatUpdate::Rejected {
                    reason: Rejection::Busy,
                },
            );
            return Ok(SendOutcome::Rejected(Rejection::Busy));
        };
        if self.repo.get_case(case_id).await?.is_none() {
            return Err(Error::NotFound(format!("case {case_id}")));
        }

        let history: Vec<ChatTurn> = self
            .repo
            .list_messages(case_id)
            .await?
            .iter()
            .map(ChatTurn::from)
            .collect();
        let user_message = self
            .repo
            .append_message(case_id, NewMessage::user(text))
            .await?;
        emit(
            updates,
            ChatUpdate::UserMessage {
                message: user_message,
            },
        );

        let mut pending: Option<Message> = None;
        match self
            .stream_reply(case_id, text, &history, &mut pending, updates)
            .await
        {
            Ok(message) => {
                tracing::info!(
                    case_id,
                    provider = self.ai.name(),
                    chars = message.content.chars().count(),
                    "Chat reply completed"
                );
                emit(
                    updates,
                    ChatUpdate::Finished {
                        message: message.clone(),
                    },
                );
                Ok(SendOutcome::Completed(message))
            }
            Err(e) => {
                tracing::error!(
                    case_id,
                    provider = self.ai.name(),
                    error = %e,
                    "Chat reply failed"
                );
                let message = match pending {
                    Some(message) => {
                        self.repo
                            .update_message_content(case_id, &message.id, CHAT_ERROR_REPLY)
                            .await?
                    }
                    None => {
                        self.repo
                            .append_message(case_id, NewMessage::assistant(CHAT_ERROR_REPLY))
                            .await?
                    }
                };
                emit(
                    updates,
                    ChatUpdate::Failed {
                        message: message.clone(),
                    },
                );
                Ok(SendOutcome::Degraded(message))
            }
        }
    }

    async fn stream_reply(
        &self,
        case_id: &str,
        text: &str,
        history: &[ChatTurn],
        pending: &mut Option<Message>,
        updates: Option<&UnboundedSender<ChatUpdate>>,
    ) -> Result<Message> {
        let context = self.repo.retrieve_context(text).await?;
        let mut message = self
            .repo
            .append_message(case_id, NewMessage::assistant(""))
            .await?;
        *pending = Some(message.clone());
        emit(
            updates,
            ChatUpdate::AssistantStarted {
                message: message.clone(),
            },
        );

        let mut stream = self
            .ai
            .stream_chat(history, text, &system_instruction(&context))
            .await?;
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            content.push_str(&chunk);
            message = self
                .repo
                .update_message_content(case_id, &message.id, &content)
                .await?;
            emit(
                updates,
                ChatUpdate::Chunk {
                    message_id: message.id.clone(),
                    delta: chunk,
                    content: content.clone(),
                },
            );
        }
        Ok(message)
    }

    /// Condense `selected` into a report appended to the case log, then
    /// clear every selection.
    ///
    /// An empty selection is rejected without appending or clearing.
    pub async fn generate_report(
        &self,
        case_id: &str,
        case_title: &str,
        selected: &[Message],
    ) -> Result<ReportOutcome> {
        if selected.is_empty() {
            return Ok(ReportOutcome::Rejected(Rejection::EmptySelection));
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight, case_id) else {
            return Ok(ReportOutcome::Rejected(Rejection::Busy));
        };

        let prompt = report_prompt(case_title, selected);
        let body = match self.ai.complete_text(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    case_id,
                    provider = self.ai.name(),
                    error = %e,
                    "Report generation failed"
                );
                REPORT_ERROR_TEXT.to_string()
            }
        };

        let report = self
            .repo
            .append_message(case_id, NewMessage::report(body))
            .await?;
        self.repo.clear_selection(case_id).await?;
        let messages = self.repo.list_messages(case_id).await?;
        tracing::info!(
            case_id,
            selected = selected.len(),
            report_id = %report.id,
            "Report generated"
        );
        Ok(ReportOutcome::Generated { report, messages })
    }

    /// Generate a report from the messages currently flagged as selected.
    pub async fn generate_report_from_selection(&self, case_id: &str) -> Result<ReportOutcome> {
        let case = self
            .repo
            .get_case(case_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("case {case_id}")))?;
        let selected: Vec<Message> = self
            .repo
            .list_messages(case_id)
            .await?
            .into_iter()
            .filter(|message| message.is_selected && message.is_selectable())
            .collect();
        self.generate_report(case_id, &case.title, &selected).await
    }
}

fn emit(updates: Option<&UnboundedSender<ChatUpdate>>, update: ChatUpdate) {
    if let Some(tx) = updates {
        // A closed receiver does not cancel the request.
        let _ = tx.send(update);
    }
}
