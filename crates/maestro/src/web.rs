//! HTTP endpoints for the prediction service.
//!
//! `POST /predict` takes a multipart upload and answers with ranked composer
//! probabilities; the remaining routes serve the upload page, sample files
//! and a health check.

use crate::model::Composer;
use crate::predict::{resolve_top_k, Prediction, Predictor};
use crate::preview::Previewer;
use crate::upload::ScratchUpload;
use crate::PredictError;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub predictor: Arc<Predictor>,
    /// Audio previews are skipped when no SoundFont is loaded.
    pub previewer: Option<Previewer>,
    pub samples_dir: PathBuf,
    /// Each upload gets its own `maestro-*` directory here for the length of the request.
    pub scratch_dir: PathBuf,
    pub default_top_k: usize,
    pub max_upload_bytes: usize,
    pub start_time: Instant,
}

pub fn router(state: WebState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(serve_index))
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/samples", get(list_samples_handler))
        .route("/samples/{name}", get(download_sample))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        if e.is_client_error() {
            Self::bad_request(e.to_string())
        } else {
            tracing::error!("prediction failed: {}", e);
            Self::internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

#[tracing::instrument(skip_all)]
async fn predict(
    State(state): State<WebState>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut top_k_raw: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError {
        status: e.status(),
        message: e.body_text(),
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                upload = Some((filename, bytes.to_vec()));
            }
            Some("top_k") => {
                top_k_raw = field.text().await.ok();
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::bad_request("Upload a MIDI file with form field 'file'"))?;
    if filename.is_empty() {
        return Err(ApiError::bad_request("Empty filename"));
    }

    let top_k = resolve_top_k(
        top_k_raw.as_deref(),
        state.default_top_k,
        Composer::ALL.len(),
    );
    info!(filename = %filename, bytes = bytes.len(), top_k, "prediction requested");

    let predictor = Arc::clone(&state.predictor);
    let previewer = state.previewer.clone();
    let scratch_dir = state.scratch_dir.clone();
    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, PredictError> {
        // Removed on every return path when `scratch` drops
        let scratch = ScratchUpload::write(&scratch_dir, &filename, &bytes)?;
        drop(bytes);

        let mut prediction = predictor.predict_file(scratch.path(), top_k)?;
        prediction.audio_data_url = previewer.as_ref().and_then(|p| p.data_url(scratch.path()));
        Ok(prediction)
    })
    .await
    .map_err(|e| ApiError::internal(format!("prediction task failed: {}", e)))??;

    if let Some(best) = prediction.top.first() {
        info!(
            label = best.label,
            prob = best.prob,
            chunks = prediction.chunks,
            "prediction complete"
        );
    }
    Ok(Json(prediction))
}

async fn health(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "chunk_size": state.predictor.chunk_size(),
        "classes": Composer::labels(),
        "audio_preview": state.previewer.is_some(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub url: String,
}

fn is_midi_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".mid") || lower.ends_with(".midi")
}

/// MIDI files directly inside `dir`, sorted by name. A missing directory
/// lists nothing.
pub fn list_samples(dir: &std::path::Path) -> Vec<Sample> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| is_midi_name(name))
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|name| Sample {
            url: format!("/samples/{}", name),
            name,
        })
        .collect()
}

async fn list_samples_handler(State(state): State<WebState>) -> Json<Vec<Sample>> {
    Json(list_samples(&state.samples_dir))
}

async fn download_sample(
    State(state): State<WebState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(ApiError::bad_request("invalid sample name"));
    }
    if !is_midi_name(&name) {
        return Err(ApiError::not_found("not found"));
    }

    match tokio::fs::read(state.samples_dir.join(&name)).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "audio/midi")], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::not_found("not found")),
        Err(e) => {
            warn!("failed to read sample {}: {}", name, e);
            Err(ApiError::internal(e.to_string()))
        }
    }
}

async fn serve_index(State(state): State<WebState>) -> Html<String> {
    let classes: String = Composer::ALL
        .iter()
        .map(|c| format!("<li>{}</li>", c))
        .collect();
    let samples: String = list_samples(&state.samples_dir)
        .iter()
        .map(|s| {
            format!(
                "<li><a href=\"{}\">{}</a></li>",
                escape_html(&s.url),
                escape_html(&s.name)
            )
        })
        .collect();

    Html(
        INDEX_HTML
            .replace("{{classes}}", &classes)
            .replace("{{samples}}", &samples)
            .replace("{{default_top_k}}", &state.default_top_k.to_string()),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Upload page
const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Composer Classifier</title>
  <style>
    :root { --bg: #1a1a2e; --card: #16213e; --accent: #e94560; --text: #eee; --muted: #888; }
    * { box-sizing: border-box; }
    body { font-family: system-ui, -apple-system, sans-serif; background: var(--bg); color: var(--text); padding: 1rem; max-width: 48rem; margin: auto; }
    section { background: var(--card); border-radius: 6px; padding: 1rem; margin-bottom: 1rem; }
    button { background: var(--accent); border: none; color: white; padding: 0.5rem 1rem; border-radius: 4px; cursor: pointer; }
    a { color: var(--accent); }
    .muted { color: var(--muted); }
    .bar { height: 0.6rem; background: var(--accent); border-radius: 3px; }
  </style>
</head>
<body>
  <h1>Composer Classifier</h1>

  <section>
    <form id="form">
      <input type="file" name="file" accept=".mid,.midi" required>
      <label>Top <input type="number" name="top_k" min="1" value="{{default_top_k}}" style="width:3rem"></label>
      <button type="submit">Predict</button>
    </form>
    <p class="muted">Classes:</p>
    <ul>{{classes}}</ul>
  </section>

  <section id="result" hidden></section>

  <section>
    <p class="muted">Samples</p>
    <ul>{{samples}}</ul>
  </section>

  <script>
    const form = document.getElementById('form');
    const result = document.getElementById('result');
    form.addEventListener('submit', async (ev) => {
      ev.preventDefault();
      result.hidden = false;
      result.textContent = 'Predicting...';
      const res = await fetch('/predict', { method: 'POST', body: new FormData(form) });
      const body = await res.json();
      if (!res.ok) {
        result.textContent = body.error || 'Prediction failed';
        return;
      }
      result.innerHTML = body.top.map(t => `
        <div>${t.label} ${(t.prob * 100).toFixed(1)}%</div>
        <div class="bar" style="width:${(t.prob * 100).toFixed(1)}%"></div>
      `).join('') + `<p class="muted">${body.chunks} chunk(s), ${body.aggregation}</p>`;
      if (body.audio_data_url) {
        const audio = document.createElement('audio');
        audio.controls = true;
        audio.src = body.audio_data_url;
        result.appendChild(audio);
      }
    });
  </script>
</body>
</html>
"##;
