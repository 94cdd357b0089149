//! Tests for the generation engine.

use super::*;
use crate::clock::ManualClock;
use crate::store::MemoryStore;
use crate::testing::{Reply, ScriptedApi, free_vision, model_json};
use chrono::TimeDelta;

const A: &str = "google/gemini-2.0-flash-exp:free";
const B: &str = "meta-llama/llama-3.2-11b-vision-instruct:free";

struct Fixture {
    api: Arc<ScriptedApi>,
    catalog: Arc<ModelCatalog>,
    generator: Generator,
}

fn fixture(api: ScriptedApi) -> Fixture {
    let clock = Arc::new(ManualClock::starting_now());
    fixture_with_clock(api, clock)
}

fn fixture_with_clock(api: ScriptedApi, clock: Arc<ManualClock>) -> Fixture {
    let state = Arc::new(MemoryStore::new(clock.clone()));
    let api = Arc::new(api);
    let catalog = Arc::new(ModelCatalog::new(api.clone(), state, clock.clone()));
    let generator = Generator::new(api.clone(), catalog.clone(), clock);
    Fixture {
        api,
        catalog,
        generator,
    }
}

fn two_models() -> Vec<serde_json::Value> {
    vec![free_vision(A), free_vision(B)]
}

fn request() -> GenerationRequest {
    GenerationRequest {
        image_url: "https://example.com/harbor.jpg".into(),
        context: ImageContext {
            title: "Harbor".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_quota_falls_back_to_next_candidate() {
    let f = fixture(
        ScriptedApi::new(two_models())
            .reply(A, Reply::Quota)
            .reply(B, Reply::text("Fishing boats moored in a calm harbor")),
    );

    let result = f.generator.generate(&request()).await.unwrap();
    assert_eq!(result.model, B);
    assert_eq!(result.alt_text, "Fishing boats moored in a calm harbor");
    assert_eq!(f.api.attempted(), vec![A, B]);

    assert!(f.catalog.exhaustion().is_exhausted(A).unwrap());
    let remaining = f.catalog.vision_models(true, false).await.unwrap();
    assert!(remaining.iter().all(|m| m.id != A));
}

#[tokio::test]
async fn test_exhausted_model_is_skipped_next_time() {
    let f = fixture(ScriptedApi::new(two_models()).reply(A, Reply::Quota));
    f.generator.generate(&request()).await.unwrap();
    f.generator.generate(&request()).await.unwrap();
    assert_eq!(f.api.attempted(), vec![A, B, B]);
}

#[tokio::test]
async fn test_all_candidates_fail_returns_last_error() {
    let f = fixture(
        ScriptedApi::new(two_models())
            .reply(A, Reply::status(500, "Internal error"))
            .reply(B, Reply::malformed()),
    );
    let err = f.generator.generate(&request()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
    assert_eq!(f.api.attempted(), vec![A, B]);
}

#[tokio::test]
async fn test_transport_failure_is_absorbed() {
    let f = fixture(ScriptedApi::new(two_models()).reply(A, Reply::Transport));
    let result = f.generator.generate(&request()).await.unwrap();
    assert_eq!(result.model, B);
    assert!(!f.catalog.exhaustion().is_exhausted(A).unwrap());
}

#[tokio::test]
async fn test_no_candidates() {
    let f = fixture(ScriptedApi::new(vec![model_json(
        "openai/gpt-4o",
        128_000,
        "vision",
    )]));
    assert!(matches!(
        f.generator.generate(&request()).await,
        Err(Error::NoSuitableModels)
    ));
    assert!(f.api.attempted().is_empty());
}

#[tokio::test]
async fn test_all_exhausted_is_no_suitable_models() {
    let f = fixture(ScriptedApi::new(two_models()));
    f.catalog.exhaustion().mark_exhausted(A).unwrap();
    f.catalog.exhaustion().mark_exhausted(B).unwrap();
    assert!(matches!(
        f.generator.generate(&request()).await,
        Err(Error::NoSuitableModels)
    ));
}

#[tokio::test]
async fn test_missing_credential() {
    let f = fixture(ScriptedApi::new(two_models()).without_credential());
    assert!(matches!(
        f.generator.generate(&request()).await,
        Err(Error::NoCredential)
    ));
    assert_eq!(f.api.list_calls(), 0);
}

#[tokio::test]
async fn test_long_completion_is_truncated() {
    let long = format!("\"{}\"", "A very detailed description ".repeat(10));
    let f = fixture(ScriptedApi::new(two_models()).reply(A, Reply::Text(long)));
    let result = f.generator.generate(&request()).await.unwrap();
    assert_eq!(result.alt_text.chars().count(), MAX_ALT_TEXT_CHARS);
    assert!(result.alt_text.starts_with("A very detailed"));
    assert!(result.alt_text.ends_with("..."));
}

#[tokio::test]
async fn test_empty_completion_is_malformed() {
    let f = fixture(
        ScriptedApi::new(vec![free_vision(A)]).reply(A, Reply::text("  \"\"  ")),
    );
    assert!(matches!(
        f.generator.generate(&request()).await,
        Err(Error::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_pinned_model_goes_first() {
    let pinned = "anthropic/claude-3-haiku";
    let mut models = two_models();
    models.push(model_json(pinned, 200_000, "Claude 3 with vision"));
    let f = fixture(ScriptedApi::new(models));

    let candidates = f.generator.candidates(Some(pinned)).await.unwrap();
    assert_eq!(candidates, vec![pinned, A, B]);

    let result = f
        .generator
        .generate(&GenerationRequest {
            model_override: Some(pinned.into()),
            ..request()
        })
        .await
        .unwrap();
    assert_eq!(result.model, pinned);
}

#[tokio::test]
async fn test_pinned_free_model_is_not_duplicated() {
    let f = fixture(ScriptedApi::new(two_models()));
    let candidates = f.generator.candidates(Some(B)).await.unwrap();
    assert_eq!(candidates, vec![B, A]);
}

#[tokio::test]
async fn test_unusable_override_falls_back_to_free() {
    let mut models = two_models();
    models.push(model_json("openai/gpt-3.5-turbo", 16_000, "Text only"));
    let f = fixture(ScriptedApi::new(models));

    for selection in [None, Some(""), Some("free"), Some("missing/model"), Some("openai/gpt-3.5-turbo")] {
        let candidates = f.generator.candidates(selection).await.unwrap();
        assert_eq!(candidates, vec![A, B], "selection {selection:?}");
    }
}

#[tokio::test]
async fn test_result_records_request_and_duration() {
    let clock = Arc::new(ManualClock::starting_now());
    let f = fixture_with_clock(
        ScriptedApi::new(two_models()).with_latency(clock.clone(), TimeDelta::seconds(3)),
        clock,
    );
    let result = f.generator.generate(&request()).await.unwrap();
    assert_eq!(result.duration, Duration::from_secs(3));

    let payload: serde_json::Value = serde_json::from_str(&result.request_payload).unwrap();
    assert_eq!(payload["model"], A);
    assert_eq!(payload["max_tokens"], 300);
    assert_eq!(payload["messages"][1]["content"][1]["image_url"]["url"], "https://example.com/harbor.jpg");
    assert!(result.response_body.contains("choices"));

    let sent = f.api.requests();
    assert_eq!(sent.len(), 1);
}
