//! レポート出力のコア（IOなし）
//!
//! - document: ページ/配置要素のモデル
//! - report_core: ページ構成

pub mod document;
pub mod report_core;

pub use document::{
    palette, Bitmap, ElementContent, FontFace, Page, PageKind, PlacedElement, RectElement,
    RectShape, ReportDocument, Rgb8, TextElement,
};
pub use report_core::{compose_report, rendered_listings, score_color, CapturedAssets};

const SLUG_MAX_CHARS: usize = 40;

/// ファイル名用のスラッグ（英数字以外は '-' にまとめる）
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= SLUG_MAX_CHARS {
            break;
        }
    }
    if slug.is_empty() {
        "location".to_string()
    } else {
        slug
    }
}

/// "location-analysis-<slug>-<unix-ms>.pdf"
pub fn report_file_name(location: &str, unix_ms: u128) -> String {
    format!("location-analysis-{}-{}.pdf", slugify(location), unix_ms)
}
