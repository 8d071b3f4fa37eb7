use super::*;

fn registry() -> ServicesRegistry {
    ServicesRegistry::with_defaults("projects/cacrs/secrets/")
}

#[test]
fn test_catalogue_seed() {
    let catalogue = default_catalogue();
    assert_eq!(catalogue.len(), 15);
    let enabled: Vec<_> = catalogue
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.service_id.as_str())
        .collect();
    assert_eq!(enabled, vec!["gemini", "firebase"]);
    assert!(
        catalogue
            .iter()
            .all(|s| s.last_check_status == ServiceStatus::Untested)
    );
}

#[tokio::test]
async fn test_unknown_service_reports_not_found() {
    let result = registry().test("nope").await;
    assert_eq!(result.status, ServiceStatus::Error);
    assert_eq!(result.error_code.as_deref(), Some("SERVICE_NOT_FOUND"));
}

#[tokio::test]
async fn test_disabled_service_stays_disabled() {
    let registry = registry();
    let result = registry.test("openai").await;
    assert_eq!(result.status, ServiceStatus::Disabled);
    assert!(result.error_code.is_none());

    let service = registry.get("openai").await.unwrap();
    assert!(!service.enabled);
    assert_eq!(service.last_check_status, ServiceStatus::Disabled);
    assert!(service.last_check_at.is_some());
}

#[tokio::test]
async fn test_empty_secret_fails_and_disables() {
    let registry = registry();
    registry
        .update(
            "firebase",
            ServicePatch {
                secret_name: Some("  ".to_string()),
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();

    let result = registry.test("firebase").await;
    assert_eq!(result.status, ServiceStatus::Error);
    assert_eq!(result.error_code.as_deref(), Some("INVALID_KEY"));

    let service = registry.get("firebase").await.unwrap();
    assert!(!service.enabled);
    assert_eq!(service.last_error.as_deref(), Some("INVALID_KEY"));
    assert!(registry.client_config("firebase").await.is_err());
}

#[tokio::test]
async fn test_whitespace_secret_from_catalogue_is_invalid() {
    let mut catalogue = default_catalogue();
    for service in &mut catalogue {
        if service.service_id == "gemini" {
            service.secret_name = " \t".to_string();
        }
    }
    let registry = ServicesRegistry::new(catalogue, "projects/cacrs/secrets");
    let result = registry.test("gemini").await;
    assert_eq!(result.status, ServiceStatus::Error);
    assert_eq!(result.error_code.as_deref(), Some("INVALID_KEY"));
}

#[tokio::test]
async fn test_gemini_tuning_follows_updates() {
    let registry = registry();
    let tuning = registry.gemini_tuning();
    let before = *tuning.borrow();

    registry
        .update(
            "gemini",
            ServicePatch {
                ai_config: Some(AiModelPatch {
                    temperature: Some(0.9),
                    ..AiModelPatch::default()
                }),
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(tuning.borrow().temperature, Some(0.9));
    assert_eq!(tuning.borrow().top_p, before.top_p);

    registry
        .update(
            "openai",
            ServicePatch {
                enabled: Some(true),
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(tuning.borrow().temperature, Some(0.9));
}

#[tokio::test]
async fn test_enabled_service_with_secret_passes() {
    let registry = registry();
    let result = registry.test("gemini").await;
    assert_eq!(result.status, ServiceStatus::Ok);
    assert_eq!(result.message, "Service Google Gemini is operational");

    let client = registry.client_config("gemini").await.unwrap();
    assert_eq!(client.secret_path, "projects/cacrs/secrets/GEMINI_API_KEY");
}

#[tokio::test]
async fn test_patch_merges_only_given_fields() {
    let registry = registry();
    let updated = registry
        .update(
            "gemini",
            ServicePatch {
                timeout_ms: Some(5_000),
                ai_config: Some(AiModelPatch {
                    temperature: Some(0.2),
                    ..AiModelPatch::default()
                }),
                ..ServicePatch::default()
            },
        )
        .await
        .unwrap();

    assert!(updated.enabled);
    assert_eq!(updated.secret_name, "GEMINI_API_KEY");
    assert_eq!(updated.timeout_ms, Some(5_000));
    let ai = updated.ai_config.unwrap();
    assert_eq!(ai.model, "gemini-2.5-pro");
    assert_eq!(ai.temperature, Some(0.2));
    assert_eq!(ai.max_output_tokens, Some(8192));

    let tuning = *registry.gemini_tuning().borrow();
    assert_eq!(tuning.temperature, Some(0.2));
    assert_eq!(tuning.top_p, Some(0.95));
}

#[tokio::test]
async fn test_update_unknown_service() {
    let err = registry()
        .update("nope", ServicePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_filters() {
    let registry = registry();
    assert_eq!(registry.enabled().await.len(), 2);
    let vertex = registry.by_type(ServiceType::VertexAi).await;
    assert_eq!(vertex.len(), 1);
    assert_eq!(vertex[0].region.as_deref(), Some("us-central1"));
}

#[test]
fn test_status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_value(ServiceStatus::Disabled).unwrap(),
        serde_json::json!("disabled")
    );
    assert_eq!(
        serde_json::to_value(ServiceType::VertexAi).unwrap(),
        serde_json::json!("VERTEX_AI")
    );
}
