//! Third-party services registry and connectivity checks.
//!
//! The catalogue is seeded once per process. Admins toggle services, edit
//! their settings and run a connectivity test. The test is a policy check:
//! an enabled service with a secret name passes, anything else fails, and a
//! failing service is disabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};

use crate::ai::AiTuning;
use crate::error::{Error, Result};

/// Kind of integration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Gemini,
    Openai,
    Anthropic,
    Deepseek,
    Reka,
    VertexAi,
    Firebase,
    GcpStorage,
    GcpBigquery,
    GcpPubsub,
    TwitterApi,
    AbstractApi,
    IpIntelligence,
    EmailProvider,
    EnrichmentApi,
    Custom,
}

/// Outcome of the last connectivity check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Error,
    Disabled,
    Untested,
}

/// Model settings of an AI service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_profile: Option<String>,
}

impl From<&AiModelConfig> for AiTuning {
    fn from(config: &AiModelConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            top_p: config.top_p,
        }
    }
}

/// One integration descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub service_id: String,
    pub display_name: String,
    pub service_type: ServiceType,
    pub description: String,
    pub secret_name: String,
    pub enabled: bool,
    pub last_check_status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config: Option<AiModelConfig>,
}

/// Result of [`ServicesRegistry::test`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTestResult {
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Partial update of the AI settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModelPatch {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub system_prompt_profile: Option<String>,
}

/// Partial update of a service. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    pub enabled: Option<bool>,
    pub secret_name: Option<String>,
    pub base_url: Option<String>,
    pub region: Option<String>,
    pub timeout_ms: Option<u64>,
    pub rate_limit: Option<u32>,
    pub ai_config: Option<AiModelPatch>,
}

impl ServicePatch {
    fn apply(self, service: &mut ServiceConfig) {
        if let Some(enabled) = self.enabled {
            service.enabled = enabled;
        }
        if let Some(secret_name) = self.secret_name {
            service.secret_name = secret_name.trim().to_string();
        }
        if self.base_url.is_some() {
            service.base_url = self.base_url;
        }
        if self.region.is_some() {
            service.region = self.region;
        }
        if self.timeout_ms.is_some() {
            service.timeout_ms = self.timeout_ms;
        }
        if self.rate_limit.is_some() {
            service.rate_limit = self.rate_limit;
        }
        if let (Some(patch), Some(ai)) = (self.ai_config, service.ai_config.as_mut()) {
            if let Some(model) = patch.model {
                ai.model = model;
            }
            if patch.temperature.is_some() {
                ai.temperature = patch.temperature;
            }
            if patch.max_output_tokens.is_some() {
                ai.max_output_tokens = patch.max_output_tokens;
            }
            if patch.top_p.is_some() {
                ai.top_p = patch.top_p;
            }
            if patch.system_prompt_profile.is_some() {
                ai.system_prompt_profile = patch.system_prompt_profile;
            }
        }
    }
}

/// What a caller needs to reach a usable service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClientConfig {
    pub config: ServiceConfig,
    pub secret_path: String,
}

fn descriptor(
    service_id: &str,
    display_name: &str,
    service_type: ServiceType,
    description: &str,
    secret_name: &str,
    enabled: bool,
) -> ServiceConfig {
    ServiceConfig {
        service_id: service_id.to_string(),
        display_name: display_name.to_string(),
        service_type,
        description: description.to_string(),
        secret_name: secret_name.to_string(),
        enabled,
        last_check_status: ServiceStatus::Untested,
        last_check_at: None,
        last_error: None,
        base_url: None,
        region: None,
        timeout_ms: None,
        rate_limit: None,
        ai_config: None,
    }
}

fn with_ai(
    mut service: ServiceConfig,
    base_url: &str,
    provider: &str,
    model: &str,
    max_output_tokens: u32,
    top_p: Option<f32>,
) -> ServiceConfig {
    service.base_url = Some(base_url.to_string());
    service.ai_config = Some(AiModelConfig {
        provider: provider.to_string(),
        model: model.to_string(),
        temperature: Some(0.7),
        max_output_tokens: Some(max_output_tokens),
        top_p,
        system_prompt_profile: None,
    });
    service
}

/// The built-in catalogue.
pub fn default_catalogue() -> Vec<ServiceConfig> {
    use ServiceType as T;

    let mut vertex = descriptor(
        "vertex-ai",
        "Vertex AI",
        T::VertexAi,
        "ML orchestration and model serving",
        "VERTEX_AI_CREDENTIALS",
        false,
    );
    vertex.region = Some("us-central1".to_string());

    let mut twitter = descriptor(
        "twitter-api",
        "Twitter/X API",
        T::TwitterApi,
        "Social media intelligence",
        "TWITTER_BEARER_TOKEN",
        false,
    );
    twitter.base_url = Some("https://api.twitter.com/2".to_string());
    twitter.rate_limit = Some(500);

    let mut abstract_api = descriptor(
        "abstract-api",
        "Abstract API",
        T::AbstractApi,
        "Email validation and enrichment",
        "ABSTRACT_API_KEY",
        false,
    );
    abstract_api.base_url = Some("https://emailvalidation.abstractapi.com/v1".to_string());

    vec![
        with_ai(
            descriptor(
                "gemini",
                "Google Gemini",
                T::Gemini,
                "Primary AI model for chat, analysis, and report generation",
                "GEMINI_API_KEY",
                true,
            ),
            "https://generativelanguage.googleapis.com",
            "Google",
            "gemini-2.5-pro",
            8192,
            Some(0.95),
        ),
        with_ai(
            descriptor(
                "anthropic",
                "Anthropic Claude",
                T::Anthropic,
                "Alternative AI model for advanced analysis",
                "ANTHROPIC_API_KEY",
                false,
            ),
            "https://api.anthropic.com",
            "Anthropic",
            "claude-3-5-sonnet-20241022",
            4096,
            None,
        ),
        with_ai(
            descriptor(
                "openai",
                "OpenAI GPT",
                T::Openai,
                "OpenAI models for specialized tasks",
                "OPENAI_API_KEY",
                false,
            ),
            "https://api.openai.com/v1",
            "OpenAI",
            "gpt-4-turbo-preview",
            4096,
            None,
        ),
        with_ai(
            descriptor(
                "deepseek",
                "DeepSeek",
                T::Deepseek,
                "DeepSeek AI for code analysis",
                "DEEPSEEK_API_KEY",
                false,
            ),
            "https://api.deepseek.com",
            "DeepSeek",
            "deepseek-chat",
            4096,
            None,
        ),
        with_ai(
            descriptor(
                "reka",
                "Reka AI",
                T::Reka,
                "Reka multimodal analysis",
                "REKA_API_KEY",
                false,
            ),
            "https://api.reka.ai",
            "Reka",
            "reka-core",
            4096,
            None,
        ),
        vertex,
        descriptor(
            "firebase",
            "Firebase",
            T::Firebase,
            "Authentication and real-time data",
            "FIREBASE_CONFIG",
            true,
        ),
        descriptor(
            "gcp-storage",
            "Cloud Storage",
            T::GcpStorage,
            "File storage and backups",
            "GCP_STORAGE_KEY",
            false,
        ),
        descriptor(
            "bigquery",
            "BigQuery",
            T::GcpBigquery,
            "Analytics data warehouse",
            "BIGQUERY_CREDENTIALS",
            false,
        ),
        descriptor(
            "pubsub",
            "Cloud Pub/Sub",
            T::GcpPubsub,
            "Messaging and events",
            "PUBSUB_CREDENTIALS",
            false,
        ),
        twitter,
        abstract_api,
        descriptor(
            "ip-intelligence",
            "IP Intelligence",
            T::IpIntelligence,
            "IP geolocation and threat intel",
            "IP_INTELLIGENCE_KEY",
            false,
        ),
        descriptor(
            "email-provider",
            "Email Provider",
            T::EmailProvider,
            "Transactional emails",
            "EMAIL_PROVIDER_KEY",
            false,
        ),
        descriptor(
            "enrichment-api",
            "Data Enrichment",
            T::EnrichmentApi,
            "Person/company data enrichment",
            "ENRICHMENT_API_KEY",
            false,
        ),
    ]
}

const GEMINI_SERVICE_ID: &str = "gemini";

fn tuning_of(services: &[ServiceConfig]) -> AiTuning {
    services
        .iter()
        .find(|s| s.service_id == GEMINI_SERVICE_ID)
        .and_then(|s| s.ai_config.as_ref().map(AiTuning::from))
        .unwrap_or_default()
}

/// Mutable registry state shared by the process.
pub struct ServicesRegistry {
    services: RwLock<Vec<ServiceConfig>>,
    secret_base_path: String,
    gemini_tuning: watch::Sender<AiTuning>,
}

impl ServicesRegistry {
    pub fn new(services: Vec<ServiceConfig>, secret_base_path: impl Into<String>) -> Self {
        let (gemini_tuning, _) = watch::channel(tuning_of(&services));
        Self {
            services: RwLock::new(services),
            secret_base_path: secret_base_path.into().trim_end_matches('/').to_string(),
            gemini_tuning,
        }
    }

    /// Registry seeded with the built-in catalogue.
    pub fn with_defaults(secret_base_path: impl Into<String>) -> Self {
        Self::new(default_catalogue(), secret_base_path)
    }

    pub async fn list(&self) -> Vec<ServiceConfig> {
        self.services.read().await.clone()
    }

    pub async fn get(&self, service_id: &str) -> Option<ServiceConfig> {
        self.services
            .read()
            .await
            .iter()
            .find(|s| s.service_id == service_id)
            .cloned()
    }

    pub async fn enabled(&self) -> Vec<ServiceConfig> {
        self.services
            .read()
            .await
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    pub async fn by_type(&self, service_type: ServiceType) -> Vec<ServiceConfig> {
        self.services
            .read()
            .await
            .iter()
            .filter(|s| s.service_type == service_type)
            .cloned()
            .collect()
    }

    /// Secret manager path of a secret name.
    pub fn full_secret_path(&self, secret_name: &str) -> String {
        format!("{}/{secret_name}", self.secret_base_path)
    }

    /// Merge a partial update into a service.
    pub async fn update(&self, service_id: &str, patch: ServicePatch) -> Result<ServiceConfig> {
        let mut services = self.services.write().await;
        let service = services
            .iter_mut()
            .find(|s| s.service_id == service_id)
            .ok_or_else(|| Error::NotFound(format!("service {service_id}")))?;
        patch.apply(service);
        tracing::info!(service_id, enabled = service.enabled, "Service updated");
        let updated = service.clone();
        if service_id == GEMINI_SERVICE_ID {
            self.gemini_tuning.send_replace(tuning_of(&services));
        }
        Ok(updated)
    }

    /// Run the connectivity check and record its outcome on the service.
    pub async fn test(&self, service_id: &str) -> ServiceTestResult {
        let checked_at = Utc::now();
        let mut services = self.services.write().await;
        let Some(service) = services.iter_mut().find(|s| s.service_id == service_id) else {
            return ServiceTestResult {
                status: ServiceStatus::Error,
                error_code: Some("SERVICE_NOT_FOUND".to_string()),
                message: "Service not found".to_string(),
                checked_at,
            };
        };

        let result = if !service.enabled {
            ServiceTestResult {
                status: ServiceStatus::Disabled,
                error_code: None,
                message: "Service is disabled".to_string(),
                checked_at,
            }
        } else if service.secret_name.trim().is_empty() {
            ServiceTestResult {
                status: ServiceStatus::Error,
                error_code: Some("INVALID_KEY".to_string()),
                message: "Invalid or missing API key".to_string(),
                checked_at,
            }
        } else {
            ServiceTestResult {
                status: ServiceStatus::Ok,
                error_code: None,
                message: format!("Service {} is operational", service.display_name),
                checked_at,
            }
        };

        service.last_check_status = result.status;
        service.last_check_at = Some(checked_at);
        service.last_error.clone_from(&result.error_code);
        if result.status == ServiceStatus::Error {
            service.enabled = false;
            tracing::warn!(
                service_id,
                error_code = ?result.error_code,
                "Service test failed, service disabled"
            );
        } else {
            tracing::info!(service_id, status = ?result.status, "Service tested");
        }
        result
    }

    /// Configuration and secret path of a usable service.
    pub async fn client_config(&self, service_id: &str) -> Result<ServiceClientConfig> {
        let service = self
            .get(service_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("service {service_id}")))?;
        if !service.enabled {
            return Err(Error::InvalidInput(format!(
                "service {service_id} is disabled"
            )));
        }
        if service.last_check_status == ServiceStatus::Error {
            return Err(Error::InvalidInput(format!(
                "service {service_id} has errors: {}",
                service.last_error.as_deref().unwrap_or("unknown")
            )));
        }
        let secret_path = self.full_secret_path(&service.secret_name);
        Ok(ServiceClientConfig {
            config: service,
            secret_path,
        })
    }

    /// Sampling parameters of the Gemini entry. The receiver sees every
    /// later update to the entry.
    pub fn gemini_tuning(&self) -> watch::Receiver<AiTuning> {
        self.gemini_tuning.subscribe()
    }
}

#[cfg(test)]
#[path = "services_tests.rs"]
mod tests;
