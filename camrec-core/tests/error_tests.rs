//! Integration tests for error handling

use camrec_core::error::{CamrecError, ResultExt};

#[test]
fn test_error_context_chaining() {
    let base_error = CamrecError::encoder("Codec not found");
    let with_context = base_error.with_context("Failed to start recording");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Failed to start recording"));
    assert!(msg.contains("Codec not found"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = CamrecError::NoSurface;
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Opening camera");
    let hint_after = with_context.user_hint();

    assert!(hint_before.is_some());
    assert_eq!(hint_before, hint_after);
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), CamrecError> = Err(CamrecError::session_create("rejected"));
    let err = result.context("Starting preview").unwrap_err();

    assert!(format!("{}", err).contains("Starting preview"));
    assert!(matches!(err.root(), CamrecError::SessionCreate(_)));
}

#[test]
fn test_user_hints() {
    let err = CamrecError::NoDevice;
    assert!(err.user_hint().unwrap().contains("camera is connected"));

    let err = CamrecError::InvalidDescriptor("fd 3".to_string());
    assert!(err.user_hint().unwrap().contains("writing"));

    let err = CamrecError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    let err = CamrecError::SessionAlreadyRunning;
    assert!(err.user_hint().unwrap().contains("Stop"));

    assert!(CamrecError::muxer("test").user_hint().is_none());
}

#[test]
fn test_user_recoverable() {
    assert!(CamrecError::NoDevice.is_user_recoverable());
    assert!(CamrecError::device_open("busy").is_user_recoverable());
    assert!(CamrecError::NoSurface.is_user_recoverable());
    assert!(CamrecError::SessionAlreadyRunning.is_user_recoverable());
    assert!(CamrecError::config("test").is_user_recoverable());

    assert!(!CamrecError::encoder("test").is_user_recoverable());
    assert!(!CamrecError::TrackAlreadyAdded.is_user_recoverable());
    assert!(!CamrecError::PoolExhausted { capacity: 5 }.is_user_recoverable());
}

#[test]
fn test_error_display_format() {
    let err = CamrecError::muxer("write failed");
    assert_eq!(format!("{}", err), "Muxer error: write failed");

    let err = CamrecError::PoolExhausted { capacity: 5 };
    assert_eq!(format!("{}", err), "Frame pool exhausted (5 slots in use)");

    let err = CamrecError::SessionAlreadyRunning;
    assert_eq!(format!("{}", err), "Capture session already running");

    let err = CamrecError::invalid_sequence("start muxer", "Created");
    assert!(format!("{}", err).starts_with("Cannot start muxer while"));
}

#[test]
fn test_nested_context() {
    let err = CamrecError::device_open("in use")
        .with_context("Opening camera")
        .with_context("Starting recording");

    let msg = format!("{}", err);
    assert!(msg.starts_with("Starting recording"));
    assert!(matches!(err.root(), CamrecError::DeviceOpen(_)));
    assert!(err.is_user_recoverable());
}

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: CamrecError = io_err.into();

    let msg = format!("{}", err);
    assert!(msg.contains("I/O error"));
    assert!(msg.contains("pipe closed"));
}
