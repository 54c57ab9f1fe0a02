//! CLIから使う処理の流れ（解析 → レポート）

use crate::analyzer::client::{retry_budget, BACKOFF_BASE_MS};
use crate::analyzer::{
    request_key, AnalysisBackend, AnalysisMerger, CacheFile, Geocoder, QueryTracker,
    RequestSettings,
};
use crate::cli::ReportArgs;
use crate::config::Config;
use crate::error::Result;
use crate::export::{
    build_report_spec, generate_report, write_overlay_snapshot, GeneratedReport, ReportOptions,
    SnapshotDirectory, ThumbnailLoader,
};
use location_insight_common::{
    combine, AnalysisFocus, AnalysisOutcome, AnalysisPayload, BusinessListing,
    MergedAnalysisResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AnalyzeParams<'a> {
    pub location: &'a str,
    pub business_type: Option<&'a str>,
    pub focus: Option<AnalysisFocus>,
    /// キャッシュを置くフォルダ（None ならキャッシュを使わない）
    pub cache_dir: Option<&'a Path>,
}

/// 場所を解決して両解析を実行する
///
/// Ctrl-C で中断された場合は Ok(None)。
pub async fn analyze_location(
    config: &Config,
    backend: Arc<dyn AnalysisBackend>,
    geocoder: &Geocoder,
    params: AnalyzeParams<'_>,
) -> Result<Option<MergedAnalysisResult>> {
    let query = geocoder.resolve(params.location, params.business_type).await?;
    // ブランチ全体の上限は再試行を含めた時間にする
    let branch_timeout = retry_budget(config.timeout(), config.retry_count, BACKOFF_BASE_MS);
    let merger = AnalysisMerger::new(backend, RequestSettings::from_config(config), branch_timeout);

    let cache_key = match params.cache_dir {
        Some(_) => {
            let (change, vegetation) = merger.build_requests(query.validated_location()?, params.focus);
            Some(request_key(&change, &vegetation)?)
        }
        None => None,
    };

    if let (Some(dir), Some(key)) = (params.cache_dir, cache_key.as_deref()) {
        let cache = CacheFile::load(dir);
        if let Some(entry) = cache.get(key) {
            info!(location = %entry.location, stored_at = %entry.stored_at, "using cached analysis");
            return Ok(Some(combine(&query, &entry.change_detection, &entry.vegetation)));
        }
    }

    let tracker = QueryTracker::new();
    let ticket = tracker.begin();
    let interrupt = {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupted, superseding current query");
                tracker.begin();
            }
        })
    };
    let merged = merger.run_tracked(ticket, &query, params.focus).await;
    interrupt.abort();
    let merged = merged?;

    if let (Some(merged), Some(dir), Some(key)) = (&merged, params.cache_dir, cache_key) {
        if let (Some(change), Some(vegetation)) = (&merged.change_detection, &merged.vegetation) {
            let mut cache = CacheFile::load(dir);
            cache.insert(
                key,
                query.display_name().to_string(),
                AnalysisOutcome::success(AnalysisPayload::ChangeDetection(change.clone())),
                AnalysisOutcome::success(AnalysisPayload::Vegetation(vegetation.clone())),
            );
            if let Err(e) = cache.save(dir) {
                warn!(error = %e, "failed to save analysis cache");
            }
        }
    }

    Ok(merged)
}

/// 周辺ビジネス一覧JSONを読む
pub fn load_listings(path: Option<&Path>) -> Result<Vec<BusinessListing>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(Vec::new()),
    }
}

/// 解析結果からPDFレポートを作る
pub async fn report_from_result(
    config: &Config,
    merged: &MergedAnalysisResult,
    args: &ReportArgs,
) -> Result<GeneratedReport> {
    let listings = load_listings(args.listings.as_deref())?;
    let snapshot_dir = args
        .snapshots
        .clone()
        .unwrap_or_else(|| args.output.join("snapshots"));

    let mut charts = args.charts.clone();
    if let Some(change) = &merged.change_detection {
        match write_overlay_snapshot(&change.images, &snapshot_dir) {
            Ok(Some(id)) if !charts.contains(&id) => charts.push(id),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "change overlay could not be saved"),
        }
    }

    let surface = SnapshotDirectory::new(&snapshot_dir, args.pdf_quality);
    let thumbnail_base = args
        .listings
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let thumbnails = ThumbnailLoader::new(thumbnail_base, config.timeout(), args.pdf_quality)?;

    let spec = build_report_spec(merged, listings, charts, args.map.clone());
    let options = ReportOptions::new(&args.output);
    generate_report(&spec, &surface, &thumbnails, &options).await
}
