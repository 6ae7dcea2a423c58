//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(CmqError::transport("connection reset").is_transient());

    assert!(CmqError::Transport {
        message: "bad gateway".to_string(),
        status: Some(502),
    }
    .is_transient());

    assert!(!CmqError::Transport {
        message: "forbidden".to_string(),
        status: Some(403),
    }
    .is_transient());

    assert!(!CmqError::Timeout {
        duration: Duration::from_secs(5)
    }
    .is_transient());

    assert!(!CmqError::decode("not json").is_transient());

    assert!(!CmqError::InvalidArgument(ValidationError::Required {
        field: "body".to_string()
    })
    .is_transient());
}

#[test]
fn test_service_code_transience() {
    let busy = CmqError::Service {
        code: 6000,
        message: "server busy".to_string(),
        request_id: None,
    };
    assert!(busy.is_transient());
    assert_eq!(busy.code(), Some(6000));

    let bad_handle = CmqError::Service {
        code: 4470,
        message: "receipt handle invalid".to_string(),
        request_id: Some("req-1".to_string()),
    };
    assert!(!bad_handle.is_transient());
    assert_eq!(bad_handle.code(), Some(4470));
}

#[test]
fn test_retry_suggestions() {
    assert_eq!(
        CmqError::transport("reset").retry_after(),
        Some(Duration::from_secs(1))
    );

    let not_found = CmqError::Service {
        code: 4440,
        message: "queue does not exist".to_string(),
        request_id: None,
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_transport_display_includes_status() {
    let err = CmqError::Transport {
        message: "upstream failed".to_string(),
        status: Some(500),
    };
    assert_eq!(err.to_string(), "Transport failure (HTTP 500): upstream failed");

    let err = CmqError::transport("connection refused");
    assert_eq!(err.to_string(), "Transport failure: connection refused");
}
