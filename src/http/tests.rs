use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[test]
fn retryable_statuses() {
    assert!(is_retryable_status(500));
    assert!(is_retryable_status(502));
    assert!(is_retryable_status(503));
    assert!(is_retryable_status(429));

    assert!(!is_retryable_status(400));
    assert!(!is_retryable_status(401));
    assert!(!is_retryable_status(404));
}

#[test]
fn returns_first_success() {
    let calls = AtomicU32::new(0);
    let result = request_with_retry("test", 3, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("ok".to_string())
    });

    assert_eq!(result.expect("request succeeds"), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn retries_server_errors_until_success() {
    let calls = AtomicU32::new(0);
    let result = request_with_retry("test", 3, || {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ureq::Error::StatusCode(503))
        } else {
            Ok("recovered".to_string())
        }
    });

    assert_eq!(result.expect("request recovers"), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn client_errors_fail_immediately() {
    let calls = AtomicU32::new(0);
    let result = request_with_retry("test", 3, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ureq::Error::StatusCode(404))
    });

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_requests_carry_a_typed_status() {
    let error = request_with_retry("test", 3, || Err(ureq::Error::StatusCode(404)))
        .expect_err("client error fails");

    assert_eq!(error_status(&error), Some(404));
}

#[test]
fn status_survives_added_context() {
    use anyhow::Context;

    // Callers wrap request errors in their own context; the status must stay
    // reachable through the chain.
    let error = request_with_retry("test", 1, || Err(ureq::Error::StatusCode(404)))
        .context("outer layer")
        .expect_err("client error fails");

    assert_eq!(error_status(&error), Some(404));
}

#[test]
fn transport_errors_have_no_status() {
    let error = request_with_retry("test", 1, || Err(ureq::Error::HostNotFound))
        .expect_err("transport error fails");

    assert_eq!(error_status(&error), None);
}

#[test]
fn exhausted_retries_return_last_error() {
    let calls = AtomicU32::new(0);
    let result = request_with_retry("test", 2, || {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ureq::Error::StatusCode(500))
    });

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
