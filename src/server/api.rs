//! Weather API handlers

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Method, Request, StatusCode};
use serde::Serialize;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use super::{respond, HttpResponse};
use crate::error::{Error, ProviderError};
use crate::provider::{DataProvider, WeatherReport};
use crate::service::WeatherService;

const JSON: &str = "application/json";

/// Client-facing view of a [`WeatherReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub location: Location,
    pub current: Current,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Current {
    pub condition: String,
    /// Two decimal places, as text
    pub temperature: String,
    pub humidity: i64,
    pub pressure: i64,
    pub wind_speed: f64,
    pub wind_direction: i64,
}

impl From<&WeatherReport> for WeatherSummary {
    fn from(report: &WeatherReport) -> Self {
        Self {
            location: Location {
                name: report.name.clone(),
                latitude: report.coord.lat,
                longitude: report.coord.lon,
            },
            current: Current {
                condition: report.condition().unwrap_or_default().to_string(),
                temperature: format!("{:.2}", report.main.temp),
                humidity: report.main.humidity,
                pressure: report.main.pressure,
                wind_speed: report.wind.speed,
                wind_direction: report.wind.deg,
            },
        }
    }
}

/// hyper entry point: tags the request with an id and dispatches it
pub async fn handle<D>(
    service: Arc<WeatherService<D>>,
    req: Request<Incoming>,
) -> std::result::Result<HttpResponse, Infallible>
where
    D: DataProvider<Payload = WeatherReport>,
{
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let span = info_span!("request", id = %request_id, method = %method, path = uri.path());

    let mut response = route(&service, &method, uri.path(), uri.query())
        .instrument(span)
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}

/// Dispatch one request
pub async fn route<D>(
    service: &WeatherService<D>,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> HttpResponse
where
    D: DataProvider<Payload = WeatherReport>,
{
    match (method, path) {
        (&Method::GET, "/weather") => get_weather(service, query).await,
        (&Method::GET, "/cache") => get_cache(service),
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "text/plain", "ok"),
        (_, "/weather" | "/cache" | "/healthz") => error_body(
            StatusCode::METHOD_NOT_ALLOWED,
            &format!("method {} not allowed", method),
        ),
        _ => error_body(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn get_weather<D>(service: &WeatherService<D>, query: Option<&str>) -> HttpResponse
where
    D: DataProvider<Payload = WeatherReport>,
{
    let params = parse_query(query.unwrap_or_default());
    let (Some(lat), Some(lon)) = (params.get("lat"), params.get("lon")) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Please provide latitude and longitude parameters",
        );
    };

    match service.resolve_text(lat, lon).await {
        Ok(report) => json_body(StatusCode::OK, &WeatherSummary::from(&report)),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(error = %e, "Weather lookup failed");
            }
            error_body(status, &e.to_string())
        }
    }
}

fn get_cache<D: DataProvider>(service: &WeatherService<D>) -> HttpResponse
where
    D::Payload: Serialize,
{
    json_body(StatusCode::OK, &service.snapshot())
}

/// HTTP status for a failed lookup
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
        Error::Provider(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Decode a query string into its parameter map.
///
/// The first occurrence of a repeated name wins. `+` is a space and the rest
/// is percent-decoded; undecodable pairs are skipped.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decoded = (decode_component(name), decode_component(value));
        if let (Some(name), Some(value)) = decoded {
            params.entry(name).or_insert(value);
        }
    }
    params
}

fn decode_component(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn json_body<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, JSON, body),
        Err(e) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("failed to encode response: {}", e),
        ),
    }
}

fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    respond(status, JSON, body)
}
