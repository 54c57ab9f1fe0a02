//! レポート出力: キャプチャ、PDF書き出し、生成フロー

pub mod capture;
pub mod pdf;
pub mod report;

pub use capture::{
    decode_bitmap, write_overlay_snapshot, InMemorySurface, SnapshotDirectory, ThumbnailLoader,
    ThumbnailSource, VisualSurface, OVERLAY_ELEMENT_ID,
};
pub use pdf::render_pdf;
pub use report::{build_report_spec, generate_report, GeneratedReport, ReportOptions};
