//! Policy socket inbound vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use proxvoice_core::protocol::socket::{decode_inbound, InboundFrame, PolicyInbound};

use vector_loader::{RawFrame, TestVector};

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn inbound_vectors() {
    let files = [
        "snapshot_request.json",
        "snapshot_request_resume.json",
        "snapshot_request_binary.json",
        "bad_json.json",
        "unknown_type.json",
        "negative_revision.json",
        "binary_not_utf8.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = match &raw {
            RawFrame::Text(s) => decode_inbound(InboundFrame::Text(s)),
            RawFrame::Binary(b) => decode_inbound(InboundFrame::Binary(b)),
        };

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code.as_str(), err.code, "vector={}", v.description);
            if let Some(close) = err.close {
                assert_eq!(e.code.close_code().as_u16(), close, "vector={}", v.description);
            }
            assert!(!e.code.recoverable(), "vector={}", v.description);
            continue;
        }

        let msg = res.unwrap_or_else(|e| panic!("vector={} failed: {e:?}", v.description));
        let expect = v.expect.expect("vector must carry expect or expect_error");
        let expected: PolicyInbound = serde_json::from_value(expect).unwrap();
        assert_eq!(msg, expected, "vector={}", v.description);
    }
}
