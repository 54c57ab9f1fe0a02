//! キャッシュ機能テスト
//!
//! 解析結果キャッシュの動作を検証

use location_insight::analyzer::{request_key, AnalysisMerger, CacheFile, RequestSettings};
use location_insight::analyzer::AnalysisClient;
use location_insight::config::Config;
use location_insight_common::{
    AnalysisFocus, AnalysisKind, AnalysisOutcome, AnalysisPayload, ChangeDetectionPayload,
    ResolvedLocation, VegetationPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn change_ok() -> AnalysisOutcome {
    AnalysisOutcome::success(AnalysisPayload::ChangeDetection(ChangeDetectionPayload {
        change_percentage: 8.0,
        ..Default::default()
    }))
}

fn vegetation_ok() -> AnalysisOutcome {
    AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload {
        ndvi_before_mean: 0.5,
        ndvi_after_mean: 0.45,
        ..Default::default()
    }))
}

fn merger() -> AnalysisMerger {
    let client = AnalysisClient::new(&Config::default()).expect("client");
    AnalysisMerger::new(Arc::new(client), RequestSettings::default(), Duration::from_secs(1))
}

/// 空のキャッシュファイル
#[test]
fn test_cache_file_empty() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = CacheFile::load(dir.path());

    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
}

/// キャッシュの保存と読み込み
#[test]
fn test_cache_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");

    let mut cache = CacheFile::load(dir.path());
    assert!(cache.insert("abc123".into(), "Austin, TX".into(), change_ok(), vegetation_ok()));
    cache.save(dir.path()).expect("キャッシュ保存失敗");

    let loaded = CacheFile::load(dir.path());
    assert_eq!(loaded.len(), 1);
    let entry = loaded.get("abc123").expect("エントリがない");
    assert_eq!(entry.location, "Austin, TX");
    assert_eq!(entry.change_detection, change_ok());
    assert_eq!(entry.vegetation, vegetation_ok());
    assert!(loaded.get("unknown").is_none());
}

/// 失敗を含む結果は保存しない
#[test]
fn test_cache_skips_failed_outcomes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut cache = CacheFile::load(dir.path());

    let failed = AnalysisOutcome::failure(AnalysisKind::Vegetation, "timeout");
    assert!(!cache.insert("k".into(), "x".into(), change_ok(), failed));
    assert!(cache.is_empty());
}

/// 壊れたキャッシュは空で始める
#[test]
fn test_cache_corrupted_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(CacheFile::cache_path(dir.path()), "{ broken").unwrap();

    assert!(CacheFile::load(dir.path()).is_empty());
}

/// キャッシュ削除
#[test]
fn test_cache_clear() {
    let dir = tempdir().expect("Failed to create temp dir");
    assert!(!CacheFile::clear(dir.path()).unwrap());

    let mut cache = CacheFile::load(dir.path());
    cache.insert("k".into(), "x".into(), change_ok(), vegetation_ok());
    cache.save(dir.path()).unwrap();

    assert!(CacheFile::clear(dir.path()).unwrap());
    assert!(!CacheFile::cache_path(dir.path()).exists());
}

/// キーはリクエスト内容で決まる
#[test]
fn test_request_key_stability() {
    let merger = merger();
    let austin = ResolvedLocation::new(30.2672, -97.7431, "Austin, TX");
    let denver = ResolvedLocation::new(39.7392, -104.9903, "Denver, CO");

    let (c1, v1) = merger.build_requests(&austin, None);
    let (c2, v2) = merger.build_requests(&austin, None);
    assert_eq!(request_key(&c1, &v1).unwrap(), request_key(&c2, &v2).unwrap());

    let (c3, v3) = merger.build_requests(&denver, None);
    assert_ne!(request_key(&c1, &v1).unwrap(), request_key(&c3, &v3).unwrap());

    let (c4, v4) = merger.build_requests(&austin, Some(AnalysisFocus::Water));
    assert_ne!(request_key(&c1, &v1).unwrap(), request_key(&c4, &v4).unwrap());

    let key = request_key(&c1, &v1).unwrap();
    assert_eq!(key.len(), 64);
}
