//! Gemini client for the Generative Language REST API.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{AiTuning, ChatTurn, GenerativeAi, InlineImage, TextStream, WebSearchResult};
use crate::config::AiConfig;
use crate::error::{Error, Result};
use crate::models::GroundingSource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    title: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Web sources of the first candidate, in the order the API listed them.
    fn sources(&self) -> Vec<GroundingSource> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.grounding_metadata.as_ref())
            .map(|metadata| {
                metadata
                    .grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| GroundingSource {
                        uri: web.uri.clone(),
                        title: web.title.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Gemini API client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    fast_model: String,
    request_timeout: Duration,
    tuning: watch::Receiver<AiTuning>,
}

impl GeminiClient {
    /// Streamed replies are bounded per read, not as a whole; unary calls
    /// get the full request timeout.
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            fast_model: config.fast_model.clone(),
            request_timeout,
            tuning: watch::channel(AiTuning::default()).1,
        })
    }

    /// Read sampling parameters for chat and report requests from `tuning`
    /// on every request.
    #[must_use]
    pub fn with_tuning(mut self, tuning: watch::Receiver<AiTuning>) -> Self {
        self.tuning = tuning;
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    fn generation_config(&self) -> Option<GenerationConfig> {
        let tuning = *self.tuning.borrow();
        if tuning == AiTuning::default() {
            return None;
        }
        Some(GenerationConfig {
            temperature: tuning.temperature,
            max_output_tokens: tuning.max_output_tokens,
            top_p: tuning.top_p,
        })
    }

    async fn post(
        &self,
        url: &str,
        body: &GenerateRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        tracing::debug!(url, "Sending Gemini request");
        let mut request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("Gemini returned {status}: {detail}")));
        }
        Ok(response)
    }

    async fn generate(&self, model: &str, body: &GenerateRequest) -> Result<GenerateResponse> {
        let url = self.endpoint(model, "generateContent");
        let response = self.post(&url, body, Some(self.request_timeout)).await?;
        Ok(response.json::<GenerateResponse>().await?)
    }
}

#[async_trait]
impl GenerativeAi for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete_text(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            system_instruction: None,
            generation_config: self.generation_config(),
            tools: Vec::new(),
        };
        Ok(self.generate(&self.chat_model, &body).await?.text())
    }

    async fn stream_chat(
        &self,
        history: &[ChatTurn],
        message: &str,
        system_instruction: &str,
    ) -> Result<TextStream> {
        let mut contents: Vec<Content> = history
            .iter()
            .filter(|turn| !turn.text.is_empty())
            .map(|turn| Content {
                role: Some(turn.role.as_str().to_string()),
                parts: vec![Part::text(turn.text.clone())],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(message)],
        });

        let body = GenerateRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(system_instruction)],
            }),
            generation_config: self.generation_config(),
            tools: Vec::new(),
        };
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&self.chat_model, "streamGenerateContent")
        );
        let response = self.post(&url, &body, None).await?;
        let bytes = response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(Error::from)
            .boxed();
        Ok(sse_text_stream(bytes))
    }

    async fn analyze_image(&self, image: &InlineImage, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.data_base64.clone(),
                        }),
                    },
                    Part::text(prompt),
                ],
            }],
            system_instruction: None,
            generation_config: None,
            tools: Vec::new(),
        };
        Ok(self.generate(&self.fast_model, &body).await?.text())
    }

    async fn web_search(&self, query: &str) -> Result<WebSearchResult> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(query)],
            }],
            system_instruction: None,
            generation_config: None,
            tools: vec![Tool {
                google_search: serde_json::Map::new(),
            }],
        };
        let response = self.generate(&self.fast_model, &body).await?;
        Ok(WebSearchResult {
            text: response.text(),
            sources: response.sources(),
        })
    }
}

/// Line splitter for a server-sent event body.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks are decoded intact.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8], out: &mut VecDeque<Result<String>>) {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            Self::decode_line(&line, out);
        }
    }

    fn finish(&mut self, out: &mut VecDeque<Result<String>>) {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest, out);
    }

    fn decode_line(line: &[u8], out: &mut VecDeque<Result<String>>) {
        let line = String::from_utf8_lossy(line);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        match serde_json::from_str::<GenerateResponse>(data.trim()) {
            Ok(response) => {
                let text = response.text();
                if !text.is_empty() {
                    out.push_back(Ok(text));
                }
            }
            Err(e) => out.push_back(Err(Error::Ai(format!("malformed stream event: {e}")))),
        }
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<String>>,
    done: bool,
}

fn sse_text_stream(bytes: BoxStream<'static, Result<Vec<u8>>>) -> TextStream {
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        ready: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.decoder.push(&chunk, &mut state.ready),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    state.decoder.finish(&mut state.ready);
                }
            }
        }
    })
    .boxed()
}
