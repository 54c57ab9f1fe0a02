//! レポート生成テスト
//!
//! 一時ディレクトリにPDFを書き出し、ページ構成とファイル出力を検証

use async_trait::async_trait;
use location_insight::error::{LocationInsightError, Result};
use location_insight::export::{
    build_report_spec, generate_report, InMemorySurface, ReportOptions, SnapshotDirectory,
    ThumbnailSource,
};
use location_insight::cli::PdfQuality;
use location_insight_common::export::{palette, Bitmap, PageKind};
use location_insight_common::{
    combine, AnalysisKind, AnalysisOutcome, AnalysisPayload, BusinessListing,
    ChangeDetectionPayload, LocationQuery, MergedAnalysisResult, ReportSnapshot, ReportSpec,
    ResolvedLocation, VegetationPayload,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

/// "ok" で始まる参照だけ成功するサムネイル取得
#[derive(Default)]
struct FakeThumbnails {
    calls: AtomicUsize,
}

#[async_trait]
impl ThumbnailSource for FakeThumbnails {
    async fn fetch(&self, reference: &str) -> Result<Bitmap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if reference.starts_with("ok") {
            Ok(Bitmap::solid(40, 30, palette::BRAND))
        } else {
            Err(LocationInsightError::Capture(format!("not found: {}", reference)))
        }
    }
}

fn merged() -> MergedAnalysisResult {
    let query = LocationQuery::new("Austin, TX")
        .with_resolved(ResolvedLocation::new(30.2672, -97.7431, "Austin, TX"))
        .with_business_type("Cafe");
    combine(
        &query,
        &AnalysisOutcome::success(AnalysisPayload::ChangeDetection(ChangeDetectionPayload {
            change_percentage: 12.5,
            changed_pixels: 100,
            total_pixels: 800,
            ..Default::default()
        })),
        &AnalysisOutcome::success(AnalysisPayload::Vegetation(VegetationPayload {
            ndvi_before_mean: 0.45,
            ndvi_after_mean: 0.41,
            total_change_percentage: 12.5,
            urban_change_net: 3.0,
            vegetation_change_net: -2.5,
            recommendations: vec!["Consider shaded outdoor seating".into()],
            ..Default::default()
        })),
    )
}

fn listings(count: usize) -> Vec<BusinessListing> {
    (0..count)
        .map(|i| BusinessListing {
            name: format!("Competitor {}", i),
            category: "Coffee shop".into(),
            address: format!("{} Congress Ave, Austin, TX", 100 + i),
            rating: Some(4.2),
            distance_km: Some(0.2 * (i + 1) as f64),
            thumbnail: Some(if i % 2 == 0 { format!("ok-{}.png", i) } else { format!("missing-{}.png", i) }),
        })
        .collect()
}

fn options(dir: &std::path::Path) -> ReportOptions {
    let mut options = ReportOptions::new(dir);
    options.generated_at = Some("2026-10-19 09:00".into());
    options
}

fn listing_pages(pages: &[PageKind]) -> Vec<(usize, usize)> {
    pages
        .iter()
        .filter_map(|p| match p {
            PageKind::Listings { first_index, count } => Some((*first_index, *count)),
            _ => None,
        })
        .collect()
}

/// 12件の一覧: 4件ずつ3ページ、入力順
#[tokio::test]
async fn test_twelve_listings_three_pages() {
    let dir = tempdir().expect("Failed to create temp dir");
    let spec = build_report_spec(&merged(), listings(12), Vec::new(), None);

    let report = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(dir.path()))
        .await
        .expect("レポート生成失敗");

    assert_eq!(listing_pages(&report.pages), vec![(0, 4), (4, 4), (8, 4)]);
    assert_eq!(report.pages.first(), Some(&PageKind::Title));
    assert_eq!(report.pages.last(), Some(&PageKind::Summary));
    assert!(report.path.exists());
}

/// 13件: 上限12件
#[tokio::test]
async fn test_listings_capped_at_twelve() {
    let dir = tempdir().expect("Failed to create temp dir");
    let spec = build_report_spec(&merged(), listings(13), Vec::new(), None);
    let thumbs = FakeThumbnails::default();

    let report = generate_report(&spec, &InMemorySurface::new(), &thumbs, &options(dir.path()))
        .await
        .unwrap();

    let pages = listing_pages(&report.pages);
    assert_eq!(pages.len(), 3);
    assert_eq!(pages.iter().map(|(_, c)| c).sum::<usize>(), 12);
    // 描画しない13件目のサムネイルは取得しない
    assert_eq!(thumbs.calls.load(Ordering::SeqCst), 12);
}

/// 一覧0件: 一覧ページなし、ページ番号は連続
#[tokio::test]
async fn test_zero_listings_skips_section() {
    let dir = tempdir().expect("Failed to create temp dir");
    let spec = build_report_spec(&merged(), Vec::new(), Vec::new(), None);

    let report = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();

    assert_eq!(
        report.pages,
        vec![PageKind::Title, PageKind::Kpi, PageKind::Profile, PageKind::Summary]
    );
}

/// キャプチャできないチャートはページごと省く
#[tokio::test]
async fn test_failed_chart_capture_is_omitted() {
    let dir = tempdir().expect("Failed to create temp dir");
    let surface = InMemorySurface::new()
        .with_element("foot-traffic-chart", Bitmap::solid(80, 60, palette::BRAND))
        .with_element("site-map", Bitmap::solid(80, 60, palette::WHITE));
    let spec = build_report_spec(
        &merged(),
        listings(2),
        vec!["foot-traffic-chart".into(), "rent-chart".into()],
        Some("site-map".into()),
    );

    let report = generate_report(&spec, &surface, &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();

    assert_eq!(
        report.pages,
        vec![
            PageKind::Title,
            PageKind::Kpi,
            PageKind::Profile,
            PageKind::Chart { element_id: "foot-traffic-chart".into() },
            PageKind::Map,
            PageKind::Listings { first_index: 0, count: 2 },
            PageKind::Summary,
        ]
    );
}

/// スナップショットフォルダからのキャプチャ
#[tokio::test]
async fn test_snapshot_directory_charts() {
    let dir = tempdir().expect("Failed to create temp dir");
    let snapshots = dir.path().join("snapshots");
    std::fs::create_dir_all(&snapshots).unwrap();
    image::RgbImage::from_pixel(64, 48, image::Rgb([200, 100, 50]))
        .save(snapshots.join("rent-chart.png"))
        .unwrap();

    let spec = build_report_spec(&merged(), Vec::new(), vec!["rent-chart".into()], Some("missing-map".into()));
    let surface = SnapshotDirectory::new(&snapshots, PdfQuality::Low);

    let report = generate_report(&spec, &surface, &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();

    assert!(report.pages.contains(&PageKind::Chart { element_id: "rent-chart".into() }));
    assert!(!report.pages.contains(&PageKind::Map));
}

/// 解析データなしでもN/A表示でレポートは出る
#[tokio::test]
async fn test_report_without_analysis_data() {
    let dir = tempdir().expect("Failed to create temp dir");
    let failed = combine(
        &LocationQuery::new("Nowhere"),
        &AnalysisOutcome::failure(AnalysisKind::ChangeDetection, "down"),
        &AnalysisOutcome::failure(AnalysisKind::Vegetation, "down"),
    );
    let spec = build_report_spec(&failed, Vec::new(), Vec::new(), None);
    assert_eq!(spec.analysis_snapshot.overall_score, None);

    let report = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();
    assert_eq!(report.pages.len(), 4);
}

/// 出力ファイル名と重複回避
#[tokio::test]
async fn test_output_file_naming() {
    let dir = tempdir().expect("Failed to create temp dir");
    let spec = ReportSpec {
        location: "Austin, TX".into(),
        business_type: "Cafe".into(),
        analysis_snapshot: ReportSnapshot::default(),
        business_listings: Vec::new(),
        captured_visual_element_ids: Vec::new(),
        map_element_id: None,
    };

    let first = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();
    let second = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(dir.path()))
        .await
        .unwrap();

    let name = first.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("location-analysis-austin-tx-"));
    assert!(name.ends_with(".pdf"));
    assert_ne!(first.path, second.path);

    let bytes = std::fs::read(&first.path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

/// 保存先に書けない場合は ReportGeneration エラー
#[tokio::test]
async fn test_unwritable_output_is_report_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let spec = build_report_spec(&merged(), Vec::new(), Vec::new(), None);
    let err = generate_report(&spec, &InMemorySurface::new(), &FakeThumbnails::default(), &options(&blocker))
        .await
        .unwrap_err();

    assert!(matches!(err, LocationInsightError::ReportGeneration(_)));
    assert!(err.to_string().contains("failed to generate report, please retry"));
}
