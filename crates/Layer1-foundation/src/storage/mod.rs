//! Storage module for Ignite
//!
//! - `json`: JSON 설정 파일 로드 (글로벌 + 프로젝트 병합)

mod json;

pub use json::JsonStore;
