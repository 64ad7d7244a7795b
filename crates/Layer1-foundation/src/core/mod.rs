//! Core Module - 플러그인 작업 계약
//!
//! - `envelope.rs`: 요청/응답 래퍼 (OperationRequest, Envelope, ErrorBody)

mod envelope;

pub use envelope::{Envelope, ErrorBody, OperationRequest};
