//! 2つの解析の並列実行とマージ
//!
//! 変化検出と植生解析を同じタスク上で join し、各ブランチにタイムアウトを付ける。
//! 片方/両方の失敗はエラーではなく結果の状態（DataQuality）として返す。
//! エラーになるのは入力不正のみ。

use super::client::AnalysisBackend;
use crate::config::Config;
use crate::error::Result;
use location_insight_common::{
    combine, failed_kinds, AnalysisFocus, AnalysisKind, AnalysisOutcome, AnalysisPayload,
    ChangeDetectionRequest, LocationQuery, MergedAnalysisResult, ResolvedLocation,
    VegetationRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// リクエストの固定パラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub zoom_level: u8,
    pub resolution: u32,
    pub model_type: String,
    pub alpha_blend: f32,
    pub use_pytorch: bool,
    pub default_focus: AnalysisFocus,
}

impl RequestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zoom_level: config.zoom_level,
            resolution: config.resolution,
            model_type: config.model.clone(),
            alpha_blend: config.alpha,
            use_pytorch: config.use_pytorch,
            default_focus: config.analysis_focus,
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct AnalysisMerger {
    backend: Arc<dyn AnalysisBackend>,
    settings: RequestSettings,
    branch_timeout: Duration,
}

impl AnalysisMerger {
    pub fn new(backend: Arc<dyn AnalysisBackend>, settings: RequestSettings, branch_timeout: Duration) -> Self {
        Self {
            backend,
            settings,
            branch_timeout,
        }
    }

    /// 両解析のリクエストを組み立てる（focus は植生側にのみ効く）
    pub fn build_requests(
        &self,
        location: &ResolvedLocation,
        focus_hint: Option<AnalysisFocus>,
    ) -> (ChangeDetectionRequest, VegetationRequest) {
        let location = location.to_query_string();
        let change = ChangeDetectionRequest {
            location: location.clone(),
            zoom_level: self.settings.zoom_level,
            resolution: self.settings.resolution,
            model_type: self.settings.model_type.clone(),
            alpha_blend: self.settings.alpha_blend,
            use_pytorch: self.settings.use_pytorch,
        };
        let vegetation = VegetationRequest {
            location,
            zoom_level: self.settings.zoom_level,
            resolution: self.settings.resolution,
            analysis_focus: focus_hint.unwrap_or(self.settings.default_focus),
            want_recommendations: true,
            want_visualizations: true,
        };
        (change, vegetation)
    }

    /// 両解析の生の結果（変化検出, 植生）
    pub async fn run_outcomes(
        &self,
        query: &LocationQuery,
        focus_hint: Option<AnalysisFocus>,
    ) -> Result<(AnalysisOutcome, AnalysisOutcome)> {
        let location = query.validated_location()?;
        let (change_request, vegetation_request) = self.build_requests(location, focus_hint);
        debug!(location = %change_request.location, focus = %vegetation_request.analysis_focus, "starting analyses");

        let (change, vegetation) = tokio::join!(
            self.run_branch(AnalysisKind::ChangeDetection, async {
                self.backend
                    .detect_change(&change_request)
                    .await
                    .map(AnalysisPayload::ChangeDetection)
            }),
            self.run_branch(AnalysisKind::Vegetation, async {
                self.backend
                    .analyze_vegetation(&vegetation_request)
                    .await
                    .map(AnalysisPayload::Vegetation)
            }),
        );

        Ok((change, vegetation))
    }

    /// 両解析を並列に実行してマージする
    pub async fn run_parallel_analysis(
        &self,
        query: &LocationQuery,
        focus_hint: Option<AnalysisFocus>,
    ) -> Result<MergedAnalysisResult> {
        let (change, vegetation) = self.run_outcomes(query, focus_hint).await?;
        let failed = failed_kinds([&change, &vegetation]);
        if !failed.is_empty() {
            let failed: Vec<&str> = failed.iter().map(|k| k.label()).collect();
            warn!(location = %query.display_name(), failed = ?failed, "continuing with partial analysis data");
        }
        Ok(combine(query, &change, &vegetation))
    }

    /// 新しい問い合わせに置き換えられたら結果を捨てる（Ok(None)）
    pub async fn run_tracked(
        &self,
        mut ticket: QueryTicket,
        query: &LocationQuery,
        focus_hint: Option<AnalysisFocus>,
    ) -> Result<Option<MergedAnalysisResult>> {
        if !ticket.is_current() {
            return Ok(None);
        }

        let generation = ticket.generation();
        let merged = tokio::select! {
            result = self.run_parallel_analysis(query, focus_hint) => result?,
            _ = ticket.superseded() => {
                debug!(generation, "query superseded, in-flight analyses dropped");
                return Ok(None);
            }
        };

        if !ticket.is_current() {
            warn!(generation, "stale analysis result dropped");
            return Ok(None);
        }
        Ok(Some(merged))
    }

    async fn run_branch<F>(&self, kind: AnalysisKind, call: F) -> AnalysisOutcome
    where
        F: std::future::Future<Output = Result<AnalysisPayload>>,
    {
        match tokio::time::timeout(self.branch_timeout, call).await {
            Ok(Ok(payload)) => {
                debug!(%kind, "analysis succeeded");
                AnalysisOutcome::success(payload)
            }
            Ok(Err(err)) => {
                warn!(%kind, error = %err, "analysis failed");
                AnalysisOutcome::failure(kind, err.to_string())
            }
            Err(_) => {
                warn!(%kind, timeout = ?self.branch_timeout, "analysis timed out");
                AnalysisOutcome::failure(
                    kind,
                    format!("{} timed out after {}s", kind.label(), self.branch_timeout.as_secs_f32()),
                )
            }
        }
    }
}

// ============================================
// 問い合わせの世代管理
// ============================================

/// 問い合わせごとに単調増加のチケットを発行する
#[derive(Debug, Clone)]
pub struct QueryTracker {
    generation: Arc<watch::Sender<u64>>,
}

impl Default for QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            generation: Arc::new(tx),
        }
    }

    /// 新しい問い合わせを開始（それ以前のチケットは無効になる）
    pub fn begin(&self) -> QueryTicket {
        let mut issued = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            issued = *g;
        });
        QueryTicket {
            generation: issued,
            rx: self.generation.subscribe(),
        }
    }

    pub fn current(&self) -> u64 {
        *self.generation.borrow()
    }
}

#[derive(Debug)]
pub struct QueryTicket {
    generation: u64,
    rx: watch::Receiver<u64>,
}

impl QueryTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.generation
    }

    /// 置き換えられるまで待つ
    async fn superseded(&mut self) {
        loop {
            if !self.is_current() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // トラッカーが破棄された場合は置き換えも起きない
                std::future::pending::<()>().await;
            }
        }
    }
}
