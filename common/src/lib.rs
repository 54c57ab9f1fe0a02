//! Location Insight Common Library
//!
//! CLIとレポート生成で共有される型・マージ規則・レイアウト（IOなし）

pub mod analyzer;
pub mod error;
pub mod export;
pub mod format;
pub mod layout;
pub mod parser;
pub mod snapshot;
pub mod types;

pub use analyzer::{combine, combine_outcomes, failed_kinds};
pub use error::{Error, Result};
pub use export::{compose_report, report_file_name, CapturedAssets, ReportDocument};
pub use parser::{parse_change_detection, parse_vegetation};
pub use snapshot::{Kpi, KpiIcon, KpiUnit, PercentBar, ProfileMetric, ReportSnapshot};
pub use types::{
    AnalysisFocus, AnalysisKind, AnalysisOutcome, AnalysisPayload,
    BusinessListing, ChangeDetectionPayload, ChangeDetectionRequest, DataQuality,
    LocationQuery, MergedAnalysisResult, ReportSpec, ResolvedLocation, VegetationPayload,
    VegetationRequest,
};
