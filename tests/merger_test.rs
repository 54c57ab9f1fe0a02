//! マージ処理の結合テスト
//!
//! 差し替え可能なバックエンドで、部分失敗・タイムアウト・中断を検証

use async_trait::async_trait;
use location_insight::analyzer::{AnalysisBackend, AnalysisMerger, QueryTracker, RequestSettings};
use location_insight::error::{LocationInsightError, Result, TransportErrorKind};
use location_insight_common::{
    AnalysisFocus, ChangeDetectionPayload, ChangeDetectionRequest, DataQuality, LocationQuery,
    ResolvedLocation, VegetationPayload, VegetationRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Reply<T> {
    Ok(T),
    Fail(TransportErrorKind),
    Hang,
}

struct FakeBackend {
    change: Reply<ChangeDetectionPayload>,
    vegetation: Reply<VegetationPayload>,
    delay: Duration,
    calls: AtomicUsize,
    last_focus: Mutex<Option<AnalysisFocus>>,
}

impl FakeBackend {
    fn new(change: Reply<ChangeDetectionPayload>, vegetation: Reply<VegetationPayload>) -> Self {
        Self {
            change,
            vegetation,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_focus: Mutex::new(None),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn reply<T: Clone>(&self, reply: &Reply<T>) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match reply {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Fail(kind) => Err(LocationInsightError::transport(*kind, "fake failure")),
            Reply::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn detect_change(&self, _request: &ChangeDetectionRequest) -> Result<ChangeDetectionPayload> {
        self.reply(&self.change).await
    }

    async fn analyze_vegetation(&self, request: &VegetationRequest) -> Result<VegetationPayload> {
        *self.last_focus.lock().unwrap() = Some(request.analysis_focus);
        self.reply(&self.vegetation).await
    }
}

fn austin() -> LocationQuery {
    LocationQuery::new("Austin, TX")
        .with_resolved(ResolvedLocation::new(30.2672, -97.7431, "Austin, TX"))
        .with_business_type("Cafe")
}

fn change_payload() -> ChangeDetectionPayload {
    ChangeDetectionPayload {
        before_date: "2023-01-01".into(),
        after_date: "2024-01-01".into(),
        changed_pixels: 32_768,
        total_pixels: 262_144,
        change_percentage: 12.5,
        ..Default::default()
    }
}

fn vegetation_payload() -> VegetationPayload {
    VegetationPayload {
        location: "Austin, TX".into(),
        ndvi_before_mean: 0.452,
        ndvi_after_mean: 0.418,
        total_change_percentage: 12.5,
        dominant_change: "urban_expansion".into(),
        vegetation_change_net: -2.5,
        urban_change_net: 3.0,
        change_intensity: "moderate".into(),
        recommendations: vec![
            "Monitor green space loss".into(),
            "Consider shaded outdoor seating".into(),
            "Target new residential developments".into(),
            "Fourth recommendation".into(),
        ],
        ..Default::default()
    }
}

fn merger(backend: FakeBackend, timeout: Duration) -> (AnalysisMerger, Arc<FakeBackend>) {
    let backend = Arc::new(backend);
    let merger = AnalysisMerger::new(backend.clone(), RequestSettings::default(), timeout);
    (merger, backend)
}

/// 両方成功: 推奨3件 + 合成インサイト
#[tokio::test]
async fn test_both_succeed() {
    let (merger, _) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload())),
        Duration::from_secs(5),
    );
    let merged = merger.run_parallel_analysis(&austin(), None).await.unwrap();

    assert_eq!(merged.data_quality, DataQuality::Both);
    assert!(merged.combined_insights.len() <= 5);
    assert_eq!(&merged.combined_insights[..3], &vegetation_payload().recommendations[..3]);
    assert!(merged.narrative_summary.contains("12.5%"));
    assert!(merged.narrative_summary.contains("0.452"));
}

/// 植生のみ失敗: 変化検出のみの結果になる
#[tokio::test]
async fn test_vegetation_fails() {
    let (merger, _) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Fail(TransportErrorKind::Generic)),
        Duration::from_secs(5),
    );
    let merged = merger.run_parallel_analysis(&austin(), None).await.unwrap();

    assert_eq!(merged.data_quality, DataQuality::ChangeOnly);
    assert!(merged.vegetation.is_none());
    assert!(!merged.combined_insights.is_empty());
    let lower = merged.narrative_summary.to_lowercase();
    assert!(!lower.contains("vegetation"));
    assert!(!lower.contains("ndvi"));
}

/// 両方失敗: エラーではなく NONE の結果
#[tokio::test]
async fn test_both_fail_is_not_an_error() {
    let (merger, _) = merger(
        FakeBackend::new(
            Reply::Fail(TransportErrorKind::ConnectionFailed),
            Reply::Fail(TransportErrorKind::RateLimited),
        ),
        Duration::from_secs(5),
    );
    let merged = merger.run_parallel_analysis(&austin(), None).await.unwrap();

    assert_eq!(merged.data_quality, DataQuality::None);
    assert_eq!(merged.combined_insights.len(), 1);
    assert!(merged.change_detection.is_none());
    assert!(merged.vegetation.is_none());
}

/// タイムアウトしたブランチは失敗扱い、もう片方は使われる
#[tokio::test]
async fn test_branch_timeout() {
    let (merger, _) = merger(
        FakeBackend::new(Reply::Hang, Reply::Ok(vegetation_payload())),
        Duration::from_millis(100),
    );
    let merged = tokio::time::timeout(Duration::from_secs(5), merger.run_parallel_analysis(&austin(), None))
        .await
        .expect("merger must finish after branch timeout")
        .unwrap();

    assert_eq!(merged.data_quality, DataQuality::VegetationOnly);
}

/// 2つの呼び出しは並列に走る
#[tokio::test]
async fn test_branches_run_concurrently() {
    let (merger, backend) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload()))
            .with_delay(Duration::from_millis(300)),
        Duration::from_secs(5),
    );
    let started = std::time::Instant::now();
    merger.run_parallel_analysis(&austin(), None).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

/// 着目点は植生リクエストにのみ渡る
#[tokio::test]
async fn test_focus_hint_reaches_vegetation_request() {
    let (merger, backend) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload())),
        Duration::from_secs(5),
    );
    merger
        .run_parallel_analysis(&austin(), Some(AnalysisFocus::Water))
        .await
        .unwrap();
    assert_eq!(*backend.last_focus.lock().unwrap(), Some(AnalysisFocus::Water));
}

/// 不正な位置はネットワーク呼び出し前に拒否
#[tokio::test]
async fn test_invalid_location_makes_no_calls() {
    let (merger, backend) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload())),
        Duration::from_secs(5),
    );

    let out_of_range = LocationQuery::new("bad").with_resolved(ResolvedLocation::new(91.0, 0.0, "bad"));
    let err = merger.run_parallel_analysis(&out_of_range, None).await.unwrap_err();
    assert!(matches!(err, LocationInsightError::InvalidLocation(_)));

    let nan = LocationQuery::new("nan").with_resolved(ResolvedLocation::new(f64::NAN, 0.0, "nan"));
    assert!(merger.run_parallel_analysis(&nan, None).await.is_err());

    let unresolved = LocationQuery::new("Somewhere");
    assert!(merger.run_parallel_analysis(&unresolved, None).await.is_err());

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

/// 新しい問い合わせが始まると古い結果は捨てられる
#[tokio::test]
async fn test_superseded_query_is_dropped() {
    let (merger, _) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload()))
            .with_delay(Duration::from_millis(500)),
        Duration::from_secs(5),
    );
    let tracker = QueryTracker::new();
    let first = tracker.begin();
    let query = austin();

    let superseder = {
        let tracker = tracker.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tracker.begin()
        }
    };

    let started = std::time::Instant::now();
    let (result, second) = tokio::join!(merger.run_tracked(first, &query, None), superseder);
    assert!(result.unwrap().is_none());
    // 実行中のブランチを待たずに戻る
    assert!(started.elapsed() < Duration::from_millis(400));

    let merged = merger.run_tracked(second, &query, None).await.unwrap();
    assert!(merged.is_some());
}

/// 既に古いチケットでは何もしない
#[tokio::test]
async fn test_stale_ticket_returns_none_without_calls() {
    let (merger, backend) = merger(
        FakeBackend::new(Reply::Ok(change_payload()), Reply::Ok(vegetation_payload())),
        Duration::from_secs(5),
    );
    let tracker = QueryTracker::new();
    let stale = tracker.begin();
    let _current = tracker.begin();

    assert!(merger.run_tracked(stale, &austin(), None).await.unwrap().is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}
