//! 解析: バックエンド呼び出し、並列実行とマージ、キャッシュ、場所の解決

pub mod cache;
pub mod client;
pub mod geocode;
pub mod merger;

pub use cache::{request_key, CacheFile};
pub use client::{retry_budget, AnalysisBackend, AnalysisClient};
pub use geocode::{parse_coordinates, Geocoder};
pub use merger::{AnalysisMerger, QueryTicket, QueryTracker, RequestSettings};
