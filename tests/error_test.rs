use std::path::PathBuf;
use std::time::Duration;

use pricegate::{PriceGateError, Result};

#[test]
fn test_error_display_carries_context() {
    let err = PriceGateError::NotAvailable("history not cached for bitcoin:365:daily".into());
    assert!(err.to_string().contains("bitcoin:365:daily"));

    let err = PriceGateError::Persistence {
        path: PathBuf::from("/data/cmc_mapping.json"),
        message: "permission denied".into(),
    };
    let text = err.to_string();
    assert!(text.contains("/data/cmc_mapping.json"));
    assert!(text.contains("permission denied"));

    let err = PriceGateError::PartialFailure {
        failed: vec!["a:365d".into(), "b:365d".into()],
    };
    assert!(err.to_string().contains("2 failures"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(PriceGateError::AuthenticationFailed)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(PriceGateError::RateLimited { retry_after: None }.is_transient());
    assert!(PriceGateError::Http("connection reset".into()).is_transient());
    for status in [408, 429, 500, 502, 503] {
        assert!(
            PriceGateError::Api {
                status,
                message: "upstream".into()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!PriceGateError::AuthenticationFailed.is_transient());
    assert!(!PriceGateError::Configuration("no key".into()).is_transient());
    assert!(!PriceGateError::Decode("bad json".into()).is_transient());
    assert!(!PriceGateError::NotAvailable("cold".into()).is_transient());
    assert!(!PriceGateError::InvalidInput("days=14".into()).is_transient());
    assert!(
        !PriceGateError::Api {
            status: 404,
            message: "not found".into()
        }
        .is_transient()
    );
}

#[test]
fn retry_after_only_on_rate_limit() {
    let limited = PriceGateError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    };
    assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
    assert_eq!(PriceGateError::Http("timeout".into()).retry_after(), None);
}

#[test]
fn errors_are_cloneable_for_shared_outcomes() {
    let err = PriceGateError::Abandoned("history:bitcoin:365:daily".into());
    let copy = err.clone();
    assert_eq!(err.to_string(), copy.to_string());
}

#[test]
fn json_errors_convert() {
    let parse: std::result::Result<u32, _> = serde_json::from_str("nope");
    let err: PriceGateError = parse.unwrap_err().into();
    assert!(matches!(err, PriceGateError::Json(_)));
}
