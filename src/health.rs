use std::path::Path;

use axum::http::StatusCode;
use serde::Serialize;

use crate::storage::ObjectStore;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub site_dir: CheckResult,
    pub object_store: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn healthy_with(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_site_dir(path: &Path) -> CheckResult {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => CheckResult::healthy(),
        Ok(_) => CheckResult::unhealthy(format!("{} is not a directory", path.display())),
        Err(e) => CheckResult::unhealthy(format!("cannot stat {}: {e}", path.display())),
    }
}

async fn check_object_store(store: Option<&dyn ObjectStore>) -> CheckResult {
    let Some(store) = store else {
        return CheckResult::healthy_with("sync disabled");
    };
    match store.list().await {
        Ok(bundles) => CheckResult::healthy_with(format!("{} objects listed", bundles.len())),
        Err(e) => CheckResult::unhealthy(format!("listing failed: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if !checks.site_dir.ok {
        // Without the mirror nothing can be served.
        HealthStatus::Unhealthy
    } else if !checks.object_store.ok {
        // Serving still works from the last synced state.
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

/// HTTP status for a health report: 200 on Ok/Degraded, 503 on Unhealthy.
pub fn http_status(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Run every check and aggregate the result.
pub async fn run_checks(site_dir: &Path, store: Option<&dyn ObjectStore>) -> HealthResponse {
    let (site_dir, object_store) =
        tokio::join!(check_site_dir(site_dir), check_object_store(store));

    let checks = HealthChecks {
        site_dir,
        object_store,
    };
    let status = aggregate_status(&checks);
    HealthResponse { status, checks }
}
