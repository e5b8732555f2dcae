//! Unit tests for the JSON-RPC envelope codec and the NDJSON line framer.

use acp_engine::rpc::codec::{from_value, rejection, to_value};
use acp_engine::rpc::error::{INVALID_PARAMS, INVALID_REQUEST, PARSE_ERROR, REQUEST_CANCELLED};
use acp_engine::rpc::{
    decode, encode, LineCodec, Message, RequestId, ResponsePayload, RpcError,
};
use acp_engine::AppError;
use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn request_round_trips_through_text() {
    let original = Message::request(
        42_i64,
        "session/prompt",
        Some(json!({"sessionId": "sess_1", "prompt": []})),
    );
    let text = encode(&original).expect("encode");
    assert!(!text.contains('\n'));
    assert_eq!(decode(&text).expect("decode"), original);
}

#[test]
fn encoded_envelope_carries_jsonrpc_version() {
    let value = to_value(&Message::notification("session/cancel", None));
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["method"], "session/cancel");
    assert!(value.get("id").is_none());
}

#[test]
fn numeric_and_string_ids_are_distinct() {
    let numeric = decode(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).expect("numeric");
    let string = decode(r#"{"jsonrpc":"2.0","id":"1","result":null}"#).expect("string");
    assert_eq!(numeric.id(), Some(&RequestId::Number(1)));
    assert_eq!(string.id(), Some(&RequestId::Str("1".into())));
    assert_ne!(numeric.id(), string.id());
}

#[test]
fn wrong_jsonrpc_version_is_rejected() {
    let err = decode(r#"{"jsonrpc":"1.0","id":1,"method":"initialize"}"#).unwrap_err();
    assert!(matches!(err, AppError::Codec(_)));
}

#[test]
fn response_with_result_and_error_is_rejected() {
    let err = from_value(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "result": {},
        "error": {"code": -32603, "message": "boom"}
    }))
    .unwrap_err();
    assert!(err.to_string().contains("both result and error"));
}

#[test]
fn response_without_payload_is_rejected() {
    let err = from_value(json!({"jsonrpc": "2.0", "id": 3})).unwrap_err();
    assert!(matches!(err, AppError::Codec(_)));
}

#[test]
fn fractional_id_is_rejected() {
    let err = decode(r#"{"id":1.5,"method":"initialize"}"#).unwrap_err();
    assert!(err.to_string().contains("integer or a string"));
}

#[test]
fn non_object_envelope_is_rejected() {
    assert!(matches!(decode("[1,2]"), Err(AppError::Codec(_))));
    assert!(matches!(decode("{not json"), Err(AppError::Codec(_))));
}

#[test]
fn error_response_keeps_code_and_data() {
    let msg = decode(
        r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32602,"message":"bad","data":{"field":"cwd"}}}"#,
    )
    .expect("decode");
    let Message::Response(resp) = msg else {
        panic!("expected response");
    };
    let ResponsePayload::Error(err) = resp.payload else {
        panic!("expected error payload");
    };
    assert_eq!(err.code, INVALID_PARAMS);
    assert_eq!(err.data, Some(json!({"field": "cwd"})));
}

#[test]
fn cancelled_error_response_converts_to_rpc_error() {
    let msg = Message::error(RequestId::Number(5), RpcError::request_cancelled());
    let Message::Response(resp) = decode(&encode(&msg).expect("encode")).expect("decode") else {
        panic!("expected response");
    };
    let err = resp.into_result().unwrap_err();
    let AppError::Rpc(rpc) = err else {
        panic!("expected rpc error");
    };
    assert_eq!(rpc.code, REQUEST_CANCELLED);
    assert!(rpc.is_cancelled());
}

#[test]
fn line_codec_skips_blank_lines() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(
        "\n   \n{\"jsonrpc\":\"2.0\",\"method\":\"session/cancel\",\"params\":{\"sessionId\":\"s\"}}\n",
    );
    let msg = codec.decode(&mut buf).expect("decode").expect("message");
    assert_eq!(msg.method(), Some("session/cancel"));
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn line_codec_waits_for_complete_line() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"id\":1,\"method\":\"initia");
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    buf.extend_from_slice(b"lize\"}\n");
    let msg = codec.decode(&mut buf).expect("decode").expect("message");
    assert_eq!(msg.method(), Some("initialize"));
}

#[test]
fn line_codec_decodes_trailing_line_at_eof() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"a\",\"result\":{}}");
    let msg = codec.decode_eof(&mut buf).expect("decode").expect("message");
    assert_eq!(msg.id(), Some(&RequestId::Str("a".into())));
}

#[test]
fn line_codec_rejects_oversized_lines() {
    let mut codec = LineCodec::with_max_length(16);
    let mut buf = BytesMut::from("{\"id\":1,\"method\":\"session/list\"}\n");
    let err = codec.decode(&mut buf).unwrap_err();
    assert!(err.to_string().contains("line too long"));
}

#[test]
fn line_codec_encodes_one_line_per_message() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode(Message::ok(RequestId::Number(1), json!({})), &mut buf)
        .expect("encode");
    codec
        .encode(Message::notification("session/update", None), &mut buf)
        .expect("encode");
    let text = String::from_utf8(buf.to_vec()).expect("utf8");
    assert_eq!(text.matches('\n').count(), 2);
    assert!(text.ends_with('\n'));
}

#[test]
fn rejection_separates_parse_errors_from_bad_envelopes() {
    let garbage = "{not json";
    let err = decode(garbage).expect_err("malformed");
    let reply: serde_json::Value =
        serde_json::from_str(&rejection(garbage, &err).expect("rejection")).expect("json");
    assert_eq!(reply["jsonrpc"], "2.0");
    assert!(reply["id"].is_null());
    assert_eq!(reply["error"]["code"], PARSE_ERROR);
    assert!(reply["error"]["data"].as_str().expect("detail").contains("malformed json"));

    let wrong_version = r#"{"jsonrpc":"1.0","id":1,"method":"initialize"}"#;
    let err = decode(wrong_version).expect_err("bad envelope");
    let reply: serde_json::Value =
        serde_json::from_str(&rejection(wrong_version, &err).expect("rejection")).expect("json");
    assert_eq!(reply["error"]["code"], INVALID_REQUEST);
    assert!(reply["id"].is_null());
}
