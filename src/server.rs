//! HTTP control surface.

use crate::error::Error;
use crate::orchestrator::{JobStatus, Orchestrator};
use crate::publisher::{SolveResult, to_csv, write_atomically};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Error reply naming its taxonomy kind.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = self.0.kind(), "request failed: {}", self.0);
        }
        error_body(status, self.0.kind(), &self.0.to_string())
    }
}

fn error_body(status: StatusCode, kind: &str, reason: &str) -> Response {
    (
        status,
        Json(json!({"status": "error", "kind": kind, "reason": reason})),
    )
        .into_response()
}

fn success() -> Json<Value> {
    Json(json!({"status": "success"}))
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/jobs", post(submit))
        .route("/jobs/current", get(current))
        .route("/jobs/cancel", post(cancel))
        .route("/jobs/status", get(status))
        .route("/result", get(get_result).post(put_result))
        .route("/result.csv", get(result_csv))
        .route("/files/students", post(upload_students))
        .route("/files/projects", post(upload_projects))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

pub async fn serve(orchestrator: Arc<Orchestrator>, listen: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, "control surface listening");
    axum::serve(listener, router(orchestrator)).await
}

async fn submit(State(o): State<Arc<Orchestrator>>) -> Result<Json<Value>, ApiError> {
    o.submit().await?;
    Ok(Json(json!({"status": "accepted"})))
}

/// Newline-delimited JSON records, one per published improvement.
async fn current(State(o): State<Arc<Orchestrator>>) -> Result<Response, ApiError> {
    let subscription = o.attach_stream().await?;
    let lines = futures_util::stream::unfold(subscription, |mut s| async move {
        let record = s.next().await?;
        let line = serde_json::to_vec(&*record).map(|mut line| {
            line.push(b'\n');
            line
        });
        Some((line, s))
    });
    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

async fn cancel(State(o): State<Arc<Orchestrator>>) -> Json<Value> {
    o.cancel().await;
    success()
}

async fn status(State(o): State<Arc<Orchestrator>>) -> Json<JobStatus> {
    Json(o.status())
}

async fn get_result(State(o): State<Arc<Orchestrator>>) -> Result<Json<SolveResult>, ApiError> {
    Ok(Json(o.get_result().await?))
}

async fn put_result(
    State(o): State<Arc<Orchestrator>>,
    Json(record): Json<SolveResult>,
) -> Result<Json<Value>, ApiError> {
    o.put_result(&record).await?;
    Ok(success())
}

async fn result_csv(State(o): State<Arc<Orchestrator>>) -> Result<Response, ApiError> {
    let result = o.get_result().await?;
    Ok(match to_csv(&result)? {
        Some(csv) => ([(header::CONTENT_TYPE, "text/csv")], csv).into_response(),
        None => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "not_found",
            "no result is available",
        ),
    })
}

async fn upload_students(
    State(o): State<Arc<Orchestrator>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store_upload(o.loader().students.clone(), body).await
}

async fn upload_projects(
    State(o): State<Arc<Orchestrator>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store_upload(o.loader().projects.clone(), body).await
}

async fn store_upload(path: PathBuf, body: Bytes) -> Result<Json<Value>, ApiError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomically(&target, &body))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(|source| Error::Persistence {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), "input table replaced");
    Ok(success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{PROJECTS_TWO, STUDENTS_SIX, Scripted, orchestrator};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn wait_for_job(o: &Orchestrator) {
        let job = o.current().unwrap();
        tokio::time::timeout(Duration::from_secs(30), job.finished())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let o = Arc::new(orchestrator(dir.path(), STUDENTS_SIX, PROJECTS_TWO));
        let app = router(Arc::clone(&o));

        let (status, body) = call(&app, "GET", "/jobs/status", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["state"], "idle");

        let (status, body) = call(&app, "GET", "/result.csv", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&body)["status"], "error");

        let (status, body) = call(&app, "GET", "/jobs/current", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_of(&body),
            json!({"students": [], "projects": [], "skills": {}, "matching": {}})
        );

        let (status, body) = call(&app, "POST", "/jobs", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"status": "accepted"}));
        wait_for_job(&o).await;

        let (_, body) = call(&app, "GET", "/result", Body::empty()).await;
        let result = json_of(&body);
        assert_eq!(result["matching"].as_object().unwrap().len(), 2);
        let (status, body) = call(&app, "GET", "/result.csv", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(body).unwrap();
        assert!(csv.starts_with("Team,Meet time,Student Names\n"));
        assert_eq!(csv.lines().count(), 3);

        let (_, body) = call(&app, "GET", "/jobs/status", Body::empty()).await;
        let status = json_of(&body);
        assert_eq!(status["state"], "completed");
        assert_eq!(status["objective"], result["objective"]);
    }

    #[tokio::test]
    async fn test_conflict_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let solver = Scripted {
            placements: vec![(vec![0, 1, 0, 1, 0, 1], i64::MIN)],
            until_cancelled: true,
        };
        let o = Arc::new(
            orchestrator(dir.path(), STUDENTS_SIX, PROJECTS_TWO).with_solver(Arc::new(solver)),
        );
        let app = router(Arc::clone(&o));
        assert_eq!(call(&app, "POST", "/jobs", Body::empty()).await.0, StatusCode::OK);
        let mut stream = o.attach_stream().await.unwrap();
        tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .unwrap()
            .unwrap();

        let (status, body) = call(&app, "POST", "/jobs", Body::empty()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            json_of(&body),
            json!({"status": "error", "kind": "conflict", "reason": "job already running"})
        );

        let (status, body) = call(&app, "POST", "/jobs/cancel", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"status": "success"}));
        wait_for_job(&o).await;

        // The stream of a cancelled job is the last persisted record.
        let (_, body) = call(&app, "GET", "/jobs/current", Body::empty()).await;
        let record = json_of(&body);
        assert_eq!(record["sequence"], 1);
        assert_eq!(record["matching"]["0"], json!([0, 2, 4]));
    }

    #[tokio::test]
    async fn test_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let o = Arc::new(orchestrator(dir.path(), STUDENTS_SIX, PROJECTS_TWO));
        let app = router(Arc::clone(&o));

        let bad = STUDENTS_SIX.replace("s1,Ada,1,1,5,1", "s1,Ada,0,0,5,1");
        let (status, _) = call(&app, "POST", "/files/students", Body::from(bad)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, "POST", "/jobs", Body::empty()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_of(&body);
        assert_eq!(body["kind"], "validation");
        assert_eq!(
            body["reason"],
            "Error: Student - EID s1 has no available time slots"
        );

        std::fs::remove_file(dir.path().join("Company.csv")).unwrap();
        let (status, body) = call(&app, "POST", "/jobs", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_of(&body)["kind"], "not_found");

        let (status, _) = call(&app, "POST", "/files/projects", Body::from(PROJECTS_TWO)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Company.csv")).unwrap(),
            PROJECTS_TWO
        );
    }

    #[tokio::test]
    async fn test_manual_result_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let o = Arc::new(orchestrator(dir.path(), STUDENTS_SIX, PROJECTS_TWO));
        let app = router(o);
        let record = json!({
            "students": [{"name": "Ada", "eid": "s1", "skill_set": {"0": 5}}],
            "projects": [{"name": "p1", "skill_req": {"0": 2.0}}],
            "skills": {"0": "Python"},
            "matching": {"0": [0]},
            "time_slot": {"0": "Mon"}
        });
        let (status, _) = call(&app, "POST", "/result", Body::from(record.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "GET", "/result.csv", Body::empty()).await;
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "Team,Meet time,Student Names\np1,Mon,Ada\n"
        );
    }
}
