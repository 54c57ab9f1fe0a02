//! Location Insight
//!
//! 衛星解析（変化検出 + NDVI植生解析）の並列実行とマージ、立地評価PDFレポートの生成

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;

pub use error::{LocationInsightError, Result};
