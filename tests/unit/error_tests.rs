//! Unit tests for `AppError` display format, exit codes, and wire mapping.

use acp_engine::rpc::error::{
    INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, REQUEST_CANCELLED,
};
use acp_engine::rpc::RpcError;
use acp_engine::AppError;

#[test]
fn display_uses_category_prefix() {
    assert_eq!(AppError::Codec("bad".into()).to_string(), "codec: bad");
    assert_eq!(AppError::NotConnected.to_string(), "transport: not connected");
    assert_eq!(
        AppError::PathViolation("../x".into()).to_string(),
        "path violation: ../x"
    );
}

#[test]
fn rpc_display_includes_code() {
    let err = AppError::Rpc(RpcError::invalid_params("cwd missing"));
    assert_eq!(err.to_string(), "rpc: cwd missing (-32602)");
}

#[test]
fn messages_have_no_trailing_period() {
    for err in [
        AppError::Timeout("request 1 not answered".into()),
        AppError::Cancelled("request 1 cancelled".into()),
        AppError::Unsupported("terminals are not available".into()),
    ] {
        assert!(!err.to_string().ends_with('.'));
    }
}

#[test]
fn exit_codes_separate_categories() {
    assert_eq!(AppError::Config(String::new()).exit_code(), 2);
    assert_eq!(AppError::Timeout(String::new()).exit_code(), 3);
    assert_eq!(AppError::Rpc(RpcError::internal("x")).exit_code(), 4);
    assert_eq!(AppError::NotConnected.exit_code(), 5);
    assert_eq!(AppError::Cancelled(String::new()).exit_code(), 6);
    assert_eq!(AppError::NotFound(String::new()).exit_code(), 1);
}

#[test]
fn not_found_maps_to_invalid_params() {
    let rpc = RpcError::from(AppError::NotFound("unknown session s".into()));
    assert_eq!(rpc.code, INVALID_PARAMS);
    assert_eq!(rpc.message, "unknown session s");
}

#[test]
fn unsupported_maps_to_method_not_found() {
    let rpc = RpcError::from(AppError::Unsupported("logout is not supported".into()));
    assert_eq!(rpc.code, METHOD_NOT_FOUND);
}

#[test]
fn cancelled_maps_to_request_cancelled() {
    let rpc = RpcError::from(AppError::Cancelled("gone".into()));
    assert_eq!(rpc.code, REQUEST_CANCELLED);
    assert!(rpc.is_cancelled());
}

#[test]
fn wire_errors_pass_through_unchanged() {
    let original = RpcError::new(-32042, "custom");
    assert_eq!(RpcError::from(AppError::Rpc(original.clone())), original);
}

#[test]
fn everything_else_is_internal() {
    let rpc = RpcError::from(AppError::Io("disk full".into()));
    assert_eq!(rpc.code, INTERNAL_ERROR);
    assert_eq!(rpc.message, "io: disk full");
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::other("boom").into();
    assert!(matches!(err, AppError::Io(_)));
}
