//! Browser front end.
//!
//! - `GET /` renders the submission form (essay upload, grade, feedback).
//! - `POST /analyze` accepts the multipart form, runs one analysis through the
//!   pipeline worker and renders the result under the form.
//! - `GET /healthz` is a liveness probe.
//!
//! Only the submitted field values are echoed back into the form; nothing is kept
//! between submissions.

use crate::worker::PipelineHandle;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use lammy_core::{AnalysisError, AnalysisResult, EssayDocument, EssayRequest, InputField};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub fn create_router(pipeline: PipelineHandle, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(show_form))
        .route("/analyze", post(analyze))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(pipeline)
}

pub async fn serve(
    bind: SocketAddr,
    pipeline: PipelineHandle,
    max_upload_bytes: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "listening");
    axum::serve(listener, create_router(pipeline, max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FormValues {
    grade: String,
    feedback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
struct Notice {
    kind: NoticeKind,
    message: String,
}

async fn show_form() -> Html<String> {
    Html(render_page(&FormValues::default(), None, None))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn analyze(State(pipeline): State<PipelineHandle>, multipart: Multipart) -> Response {
    let (essay, form) = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(error) => {
            warn!(error = %error, "rejected malformed submission");
            let notice = Notice {
                kind: NoticeKind::Error,
                message: format!("The upload could not be read: {}", error.body_text()),
            };
            return page(error.status(), &FormValues::default(), Some(notice), None);
        }
    };

    // Nothing reaches the pipeline without an essay.
    let Some(essay) = essay else {
        let notice = Notice {
            kind: NoticeKind::Warning,
            message: AnalysisError::MissingInput(InputField::Essay).user_message(),
        };
        return page(StatusCode::OK, &form, Some(notice), None);
    };

    let request = EssayRequest::new(Some(essay), &form.grade, &form.feedback);
    match pipeline.submit(request).await {
        Ok(result) => page(StatusCode::OK, &form, None, Some(&result)),
        Err(error) => {
            let kind = match error {
                AnalysisError::MissingInput(_) => NoticeKind::Warning,
                _ => NoticeKind::Error,
            };
            let notice = Notice {
                kind,
                message: error.user_message(),
            };
            page(status_for(&error), &form, Some(notice), None)
        }
    }
}

async fn read_submission(
    mut multipart: Multipart,
) -> Result<(Option<EssayDocument>, FormValues), MultipartError> {
    let mut essay = None;
    let mut form = FormValues::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("essay") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.is_empty());
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    essay = Some(EssayDocument::new(file_name, bytes.to_vec()));
                }
            }
            Some("grade") => form.grade = field.text().await?.trim().to_string(),
            Some("feedback") => form.feedback = field.text().await?.trim().to_string(),
            _ => {}
        }
    }

    Ok((essay, form))
}

fn status_for(error: &AnalysisError) -> StatusCode {
    match error {
        AnalysisError::MissingInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::DocumentParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::InvalidChunkConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AnalysisError::Embedding(_) | AnalysisError::LanguageModel(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::Worker(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn page(
    status: StatusCode,
    form: &FormValues,
    notice: Option<Notice>,
    result: Option<&AnalysisResult>,
) -> Response {
    (status, Html(render_page(form, notice.as_ref(), result))).into_response()
}

fn render_page(form: &FormValues, notice: Option<&Notice>, result: Option<&AnalysisResult>) -> String {
    let notice_html = notice
        .map(|notice| {
            let class = match notice.kind {
                NoticeKind::Warning => "warning",
                NoticeKind::Error => "error",
            };
            format!(
                r#"<div class="notice {class}" role="alert">{}</div>"#,
                escape_html(&notice.message)
            )
        })
        .unwrap_or_default();

    let result_html = result
        .map(|result| {
            format!(
                r#"<section class="analysis"><h4>Analysis:</h4><div class="analysis-body">{}</div><p class="meta">Based on {} of {} essay passages.</p></section>"#,
                escape_html(&result.analysis),
                result.context_chunks,
                result.chunk_count
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Lammy</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 56rem; margin: 2rem auto; padding: 0 1rem; }}
.columns {{ display: flex; gap: 1rem; }}
.columns > div {{ flex: 1; }}
textarea {{ width: 100%; min-height: 8rem; }}
.notice {{ padding: .75rem; border-radius: .25rem; margin: 1rem 0; }}
.warning {{ background: #fff4d6; }}
.error {{ background: #fde2e1; }}
.analysis-body {{ white-space: pre-wrap; }}
.meta {{ color: #666; font-size: .85rem; }}
</style>
</head>
<body>
<h2>Lammy</h2>
<p>Feedback, Upgraded: Get Actionable Insights with Lammy &#128394;</p>
<form method="post" action="/analyze" enctype="multipart/form-data"
      onsubmit="document.getElementById('processing').hidden = false; this.querySelector('button').disabled = true;">
<h4>Essay</h4>
<label>Upload your essay (PDF) <input type="file" name="essay" accept="application/pdf,.pdf"></label>
<div class="columns">
<div>
<h4>Grade</h4>
<label for="grade">Enter your grade out of 100, e.g. 68/100</label>
<textarea id="grade" name="grade">{grade}</textarea>
</div>
<div>
<h4>Feedback</h4>
<label for="feedback">Copy and paste your feedback</label>
<textarea id="feedback" name="feedback">{feedback}</textarea>
</div>
</div>
<p><button type="submit">Submit</button> <span id="processing" hidden>Processing&hellip;</span></p>
</form>
{notice_html}
{result_html}
</body>
</html>
"#,
        grade = escape_html(&form.grade),
        feedback = escape_html(&form.feedback),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
