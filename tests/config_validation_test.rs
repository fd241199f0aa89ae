use annbench::config::{AppConfig, HttpStoreSection, StoreBackendKind, StoreSection};
use annbench::store::StoreConfig;

#[test]
fn http_backend_requires_endpoint() {
    let config = AppConfig {
        store: StoreSection {
            backend: StoreBackendKind::Http,
            http: None,
        },
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = AppConfig {
        store: StoreSection {
            backend: StoreBackendKind::Http,
            http: Some(HttpStoreSection {
                endpoint: "   ".into(),
                ..Default::default()
            }),
        },
        ..Default::default()
    };
    assert!(
        config.store_runtime().is_err(),
        "Expected a blank endpoint to fail validation"
    );
}

#[test]
fn http_backend_binds_benchmark_namespace() {
    let mut config = AppConfig {
        store: StoreSection {
            backend: StoreBackendKind::Http,
            http: Some(HttpStoreSection {
                endpoint: " http://vectors:3000 ".into(),
                request_timeout_ms: 2500,
            }),
        },
        ..Default::default()
    };
    config.benchmark.namespace = "nightly".into();
    config.validate().expect("HTTP configuration should be valid");

    match config.store_runtime().unwrap() {
        StoreConfig::Http {
            endpoint,
            namespace,
            request_timeout,
        } => {
            assert_eq!(endpoint, "http://vectors:3000");
            assert_eq!(namespace, "nightly");
            assert_eq!(request_timeout.as_millis(), 2500);
        }
        other => panic!("Unexpected store config: {other:?}"),
    }
    assert_eq!(config.collection_spec(96).name, "nightly");
}

#[test]
fn out_of_range_settings_are_rejected() {
    let mut config = AppConfig::default();
    config.dispatch.max_in_flight = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.benchmark.top_k = 0;
    assert!(config.validate().is_err());

    for min_recall in [-0.1, 1.5, f64::NAN] {
        let mut config = AppConfig::default();
        config.benchmark.min_recall = min_recall;
        assert!(config.validate().is_err(), "min_recall {min_recall} accepted");
    }
}
