//! End to end: artifacts on disk, loaded through configuration, served over HTTP.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use maestro::model::{Activation, Attention, Checkpoint, Composer, Dense};
use maestro::{router, Predictor, WebState};
use maestroconf::MaestroConfig;
use midi_features::{monophonic_midi, ProgramFrequencies, StandardScaler, FEATURE_COUNT};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tower::ServiceExt;

const CHUNK_SIZE: usize = 16;

fn write_artifacts(dir: &Path) {
    // Encoder copies the Pitch column; the head maps it onto Mozart.
    let mut kernel = vec![vec![0.0f32; 1]; FEATURE_COUNT];
    kernel[0][0] = 1.0;
    let checkpoint = Checkpoint {
        classes: Composer::labels().into_iter().map(String::from).collect(),
        encoder: Dense {
            kernel,
            bias: vec![0.0],
            activation: Activation::Tanh,
        },
        attention: Attention {
            weight: vec![0.5],
            bias: vec![0.0; CHUNK_SIZE],
        },
        head: vec![Dense {
            kernel: vec![vec![0.0, 0.0, 0.0, 4.0]],
            bias: vec![0.0; 4],
            activation: Activation::Softmax,
        }],
    };
    std::fs::write(
        dir.join("classifier.json"),
        serde_json::to_string_pretty(&checkpoint).unwrap(),
    )
    .unwrap();

    let mut mean = vec![0.0; FEATURE_COUNT];
    let mut scale = vec![1.0; FEATURE_COUNT];
    mean[0] = 60.0;
    scale[0] = 12.0;
    StandardScaler::new(mean, scale)
        .unwrap()
        .save(&dir.join("scaler.json"))
        .unwrap();

    ProgramFrequencies::fit([0, 0, 0, 40])
        .save(&dir.join("program_freq.json"))
        .unwrap();
}

fn config_for(dir: &Path) -> MaestroConfig {
    let toml = format!(
        r#"
[paths]
checkpoint = "{dir}/classifier.json"
scaler = "{dir}/scaler.json"
program_freq = "{dir}/program_freq.json"
samples_dir = "{dir}/samples"

[features]
chunk_size = {CHUNK_SIZE}
"#,
        dir = dir.display()
    );
    MaestroConfig::from_toml_str(&toml).unwrap()
}

fn upload(midi: &[u8]) -> Request<Body> {
    let boundary = "integration";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"piece.mid\"\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(midi);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn loads_artifacts_and_predicts() {
    let dir = TempDir::new().unwrap();
    write_artifacts(dir.path());
    let config = config_for(dir.path());

    let predictor = Predictor::load(&config).unwrap();
    assert_eq!(predictor.chunk_size(), CHUNK_SIZE);

    let app = router(WebState {
        predictor: Arc::new(predictor),
        previewer: None,
        samples_dir: config.paths.samples_dir.clone(),
        scratch_dir: dir.path().to_path_buf(),
        default_top_k: config.predict.default_top_k,
        max_upload_bytes: config.predict.max_upload_bytes,
        start_time: Instant::now(),
    });

    // High pitches push the pooled unit positive, which favours Mozart
    let midi = monophonic_midi(40, &[84, 86, 88], 0);
    let response = app.oneshot(upload(&midi)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["chunks"], 2);
    assert_eq!(json["top"].as_array().unwrap().len(), 3);
    assert_eq!(json["top"][0]["label"], "Mozart");
    // Remaining classes tie and keep index order
    assert_eq!(json["top"][1]["label"], "Bach");
    assert_eq!(json["top"][2]["label"], "Beethoven");
}

#[test]
fn mismatched_chunk_size_fails_at_load() {
    let dir = TempDir::new().unwrap();
    write_artifacts(dir.path());
    let mut config = config_for(dir.path());
    config.features.chunk_size = CHUNK_SIZE * 2;

    assert!(Predictor::load(&config).is_err());
}

#[test]
fn missing_artifacts_fail_at_load() {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path());
    assert!(Predictor::load(&config).is_err());
}
