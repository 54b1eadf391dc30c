//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and storage I/O

use crate::services::MediaService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Performs a best-effort upload/download/remove round trip through the
///    object store under a probe-only prefix.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(service): State<MediaService>) -> impl IntoResponse {
    // 1) SQLite check
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(v) if v == 1 => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    // 2) Storage round-trip check under a probe prefix.
    let probe_path = format!("probes/.readyz-{}", Uuid::new_v4());
    let storage_check = match service
        .store
        .upload(&probe_path, Bytes::from_static(b"readyz"), None, true)
        .await
    {
        Ok(()) => match service.store.download(&probe_path).await {
            Ok(Some(bytes)) if bytes.as_ref() == b"readyz" => {
                match service.store.remove(&[probe_path.clone()]).await {
                    Ok(()) => (true, None::<String>),
                    Err(e) => (true, Some(format!("could not remove probe object: {}", e))),
                }
            }
            Ok(Some(_)) => {
                let _ = service.store.remove(&[probe_path.clone()]).await;
                (false, Some("probe content mismatch".to_string()))
            }
            Ok(None) => (false, Some("probe object vanished".to_string())),
            Err(e) => {
                let _ = service.store.remove(&[probe_path.clone()]).await;
                (false, Some(format!("could not read probe object: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write probe object: {}", e))),
    };

    let sqlite_ok = sqlite_check.0;
    let storage_ok = storage_check.0;
    let overall_ok = sqlite_ok && storage_ok;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_ok,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "storage",
        CheckStatus {
            ok: storage_ok,
            error: storage_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
