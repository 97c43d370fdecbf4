//! Prometheus exporter for the cache counters

use hyper::StatusCode;
use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

use super::{respond, HttpResponse};
use crate::cache::MetricsSnapshot;
use crate::error::{Error, Result};

const NAMESPACE: &str = "weather_cache";

/// Registry of gauges refreshed from a [`MetricsSnapshot`] on every scrape
pub struct MetricsExporter {
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    fetches: IntGauge,
    fetch_failures: IntGauge,
    retries: IntGauge,
    coalesced_waits: IntGauge,
    evictions: IntGauge,
    sweeps: IntGauge,
    entries: IntGauge,
    hit_ratio: Gauge,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))
        .map_err(|e| Error::Internal(format!("Failed to create metric {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(gauge)
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let hit_ratio = Gauge::with_opts(
            Opts::new("hit_ratio", "Fraction of lookups served from the cache")
                .namespace(NAMESPACE),
        )
        .map_err(|e| Error::Internal(format!("Failed to create metric hit_ratio: {}", e)))?;
        registry
            .register(Box::new(hit_ratio.clone()))
            .map_err(|e| Error::Internal(format!("Failed to register metric hit_ratio: {}", e)))?;

        Ok(Self {
            hits: int_gauge(&registry, "hits", "Lookups answered from a fresh entry")?,
            misses: int_gauge(&registry, "misses", "Lookups with no fresh entry")?,
            fetches: int_gauge(&registry, "provider_fetches", "Provider calls, retries included")?,
            fetch_failures: int_gauge(
                &registry,
                "provider_failures",
                "Misses that ended in a provider error",
            )?,
            retries: int_gauge(&registry, "provider_retries", "Provider calls that were retries")?,
            coalesced_waits: int_gauge(
                &registry,
                "coalesced_waits",
                "Misses that joined an in-flight fetch",
            )?,
            evictions: int_gauge(&registry, "evictions", "Entries removed by the sweeper")?,
            sweeps: int_gauge(&registry, "sweeps", "Completed eviction passes")?,
            entries: int_gauge(&registry, "entries", "Entries currently stored")?,
            hit_ratio,
            registry,
        })
    }

    /// Copy the snapshot into the registry
    pub fn update(&self, snapshot: &MetricsSnapshot, entries: usize) {
        let set = |gauge: &IntGauge, value: u64| gauge.set(i64::try_from(value).unwrap_or(i64::MAX));

        set(&self.hits, snapshot.hits);
        set(&self.misses, snapshot.misses);
        set(&self.fetches, snapshot.fetches);
        set(&self.fetch_failures, snapshot.fetch_failures);
        set(&self.retries, snapshot.retries);
        set(&self.coalesced_waits, snapshot.coalesced_waits);
        set(&self.evictions, snapshot.evictions);
        set(&self.sweeps, snapshot.sweeps);
        set(&self.entries, entries as u64);
        self.hit_ratio.set(snapshot.hit_ratio());
    }

    /// Text exposition of the current values
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }

    /// Refresh and render a `/metrics` response
    pub fn scrape(&self, snapshot: &MetricsSnapshot, entries: usize) -> HttpResponse {
        self.update(snapshot, entries);
        match self.encode() {
            Ok(body) => respond(StatusCode::OK, "text/plain; version=0.0.4", body),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_renders_snapshot() {
        let exporter = MetricsExporter::new().unwrap();
        let snapshot = MetricsSnapshot {
            hits: 3,
            misses: 1,
            fetches: 2,
            retries: 1,
            ..Default::default()
        };

        exporter.update(&snapshot, 5);
        let text = String::from_utf8(exporter.encode().unwrap()).unwrap();

        assert!(text.contains("weather_cache_hits 3"));
        assert!(text.contains("weather_cache_misses 1"));
        assert!(text.contains("weather_cache_provider_retries 1"));
        assert!(text.contains("weather_cache_entries 5"));
        assert!(text.contains("weather_cache_hit_ratio 0.75"));
    }

    #[test]
    fn test_exporters_are_independent() {
        let a = MetricsExporter::new().unwrap();
        let b = MetricsExporter::new().unwrap();

        a.update(&MetricsSnapshot { hits: 9, ..Default::default() }, 0);
        let text = String::from_utf8(b.encode().unwrap()).unwrap();
        assert!(text.contains("weather_cache_hits 0"));
    }

    #[test]
    fn test_scrape_response() {
        let exporter = MetricsExporter::new().unwrap();
        let response = exporter.scrape(&MetricsSnapshot::default(), 0);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; version=0.0.4"
        );
    }
}
