//! AWS Lambda handler for retention reports
//!
//! Accepts membership records as JSON and returns the full retention report.
//!
//! Supports Lambda Function URLs for direct HTTP access, including
//! base64-encoded request bodies and CORS preflight.

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Request, Response};
use lambda_runtime::Error;
use serde::{Deserialize, Serialize};

use retention_analytics::calendar::checked_instant;
use retention_analytics::{
    AnalyticsConfig, AnalyticsResult, MemberPayment, MembershipRecord, MembershipSnapshot, RetentionEngine,
    RetentionReport,
};

/// Input for one report
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub records: Vec<MembershipRecord>,

    /// Monthly payments with tenure; when omitted, `monthly_payment` is applied to current members
    #[serde(default)]
    pub payments: Option<Vec<MemberPayment>>,

    /// Flat monthly payment for current members when `payments` is omitted
    #[serde(default)]
    pub monthly_payment: Option<f64>,

    /// Reference instant, epoch seconds (default: now)
    #[serde(default)]
    pub reference_instant: Option<i64>,

    #[serde(default)]
    pub months_back: Option<u32>,

    #[serde(default)]
    pub utc_offset_seconds: Option<i32>,

    /// IANA zone name; overrides `utc_offset_seconds`
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RetentionReport>,
    pub record_count: usize,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportResponse {
    fn failed(message: String) -> Self {
        Self {
            report: None,
            record_count: 0,
            execution_time_ms: 0,
            error: Some(message),
        }
    }
}

fn build_report(request: ReportRequest) -> AnalyticsResult<ReportResponse> {
    let start = std::time::Instant::now();

    let mut config = AnalyticsConfig::default_dashboard();
    if let Some(months_back) = request.months_back {
        config.cohort.months_back = months_back;
    }
    if let Some(offset) = request.utc_offset_seconds {
        config.cohort.utc_offset_seconds = offset;
    }
    if request.timezone.is_some() {
        config.cohort.timezone = request.timezone.clone();
    }
    let engine = RetentionEngine::new(config)?;

    let now = match request.reference_instant {
        Some(instant) => checked_instant(instant)?,
        None => Utc::now().timestamp(),
    };
    let payments = match request.payments {
        Some(payments) => payments,
        None => request
            .records
            .iter()
            .filter(|r| r.is_current(now))
            .map(|r| MemberPayment::from_record(r, request.monthly_payment, now))
            .collect(),
    };

    let record_count = request.records.len();
    let snapshot = MembershipSnapshot::new(now, request.records, payments);
    let report = engine.run(&snapshot);

    Ok(ReportResponse {
        report: Some(report),
        record_count,
        execution_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        error: None,
    })
}

/// Decode the request body; Function URLs deliver base64 payloads as binary bodies
fn parse_request(body: &Body) -> Result<ReportRequest, serde_json::Error> {
    match body {
        Body::Text(text) => serde_json::from_str(text),
        Body::Binary(bytes) => serde_json::from_slice(bytes),
        Body::Empty => serde_json::from_str("{}"),
    }
}

fn json_response(status: u16, body: &ReportResponse) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Body::Text(serde_json::to_string(body)?))?)
}

/// Lambda handler function
async fn handler(event: Request) -> Result<Response<Body>, Error> {
    // Handle CORS preflight
    if event.method().as_str() == "OPTIONS" {
        return Ok(Response::builder()
            .status(200)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Body::Empty)?);
    }

    let request = match parse_request(event.body()) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Rejected report request: invalid JSON: {}", e);
            return json_response(400, &ReportResponse::failed(format!("Invalid JSON: {}", e)));
        }
    };

    match build_report(request) {
        Ok(response) => json_response(200, &response),
        Err(e) => {
            log::warn!("Rejected report request: {}", e);
            json_response(400, &ReportResponse::failed(e.to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    run(service_fn(handler)).await
}
