use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Registry, opts,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry,
};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

/// Accepted connections by detected transport (tls, plaintext, unidentified)
pub static CONNECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "tlsgate_connections_total",
            "Total accepted connections by detected transport"
        ),
        &["transport"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static ACCEPT_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "tlsgate_accept_errors_total",
            "Total errors returned by the underlying listener"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static SNIFF_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram_with_registry!(
        HistogramOpts::new(
            "tlsgate_sniff_duration_seconds",
            "Time spent waiting for the first byte of a connection"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static TLS_HANDSHAKE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "tlsgate_tls_handshake_errors_total",
            "Total failed TLS handshakes on sniffed connections"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static IDENTITY_EXPIRY_DAYS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        opts!(
            "tlsgate_identity_expiry_days",
            "Days until the node certificate expires (negative if expired)"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERTIFICATES_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        opts!(
            "tlsgate_certificates_issued_total",
            "Total self-signed certificates issued by this process"
        ),
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Encode all registered metrics in the Prometheus text format
///
/// # Errors
///
/// Returns an error if the registry cannot be encoded
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("could not encode custom metrics: {e}"))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_transport_labels() {
        for transport in ["tls", "plaintext", "unidentified"] {
            let before = CONNECTIONS.with_label_values(&[transport]).get();
            CONNECTIONS.with_label_values(&[transport]).inc();
            assert!(CONNECTIONS.with_label_values(&[transport]).get() > before);
        }
    }

    #[test]
    fn test_gauge_operations() {
        IDENTITY_EXPIRY_DAYS.set(-1);
        assert_eq!(IDENTITY_EXPIRY_DAYS.get(), -1);
        IDENTITY_EXPIRY_DAYS.set(30);
        assert_eq!(IDENTITY_EXPIRY_DAYS.get(), 30);
    }

    #[test]
    fn test_histogram_metrics() {
        SNIFF_DURATION.observe(0.002);
        SNIFF_DURATION.start_timer().observe_duration();
        assert!(SNIFF_DURATION.get_sample_count() >= 2);
    }

    #[test]
    fn test_encode_metrics() {
        CONNECTIONS.with_label_values(&["tls"]).inc();
        ACCEPT_ERRORS.inc();
        TLS_HANDSHAKE_ERRORS.inc();
        CERTIFICATES_ISSUED.inc();
        SNIFF_DURATION.observe(0.01);

        let buffer = encode_metrics().unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("tlsgate_connections_total{transport=\"tls\"}"));
        assert!(output.contains("tlsgate_accept_errors_total"));
        assert!(output.contains("tlsgate_tls_handshake_errors_total"));
        assert!(output.contains("tlsgate_certificates_issued_total"));
        assert!(output.contains("tlsgate_sniff_duration_seconds_bucket"));
    }
}
