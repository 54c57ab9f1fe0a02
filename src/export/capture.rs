//! ビジュアル要素のキャプチャ
//!
//! 要素IDごとに1枚のビットマップを返す面（VisualSurface）と、
//! 一覧のサムネイル取得（ThumbnailSource）。
//! 画像は RGB8 にデコードし、PDF品質の最大幅まで縮小する。

use crate::cli::PdfQuality;
use crate::error::{LocationInsightError, Result};
use async_trait::async_trait;
use base64::Engine;
use location_insight_common::export::Bitmap;
use location_insight_common::types::ChangeImages;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const SNAPSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const OVERLAY_ELEMENT_ID: &str = "change-overlay";

/// 要素IDでビットマップを取り出せる面
#[async_trait]
pub trait VisualSurface: Send + Sync {
    async fn capture(&self, element_id: &str) -> Result<Bitmap>;
}

/// サムネイル参照（URLまたはパス）から画像を取得
#[async_trait]
pub trait ThumbnailSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Bitmap>;
}

/// 画像バイト列をデコードして最大幅まで縮小
pub fn decode_bitmap(bytes: &[u8], max_width: u32) -> Result<Bitmap> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| LocationInsightError::Capture(format!("画像デコード失敗: {}", e)))?;

    let image = if image.width() > max_width {
        image.thumbnail(max_width, u32::MAX)
    } else {
        image
    };

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Bitmap::from_rgb8(width, height, rgb.into_raw())
        .ok_or_else(|| LocationInsightError::Capture("空の画像です".into()))
}

// ============================================
// スナップショットディレクトリ
// ============================================

/// `<dir>/<element-id>.png|jpg|jpeg` を要素として扱う
#[derive(Debug, Clone)]
pub struct SnapshotDirectory {
    dir: PathBuf,
    max_width: u32,
}

impl SnapshotDirectory {
    pub fn new(dir: impl Into<PathBuf>, quality: PdfQuality) -> Self {
        Self {
            dir: dir.into(),
            max_width: quality.max_width(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn find(&self, element_id: &str) -> Option<PathBuf> {
        // ディレクトリ外を指すIDは扱わない
        if element_id.is_empty() || element_id.contains(['/', '\\']) || element_id.contains("..") {
            return None;
        }
        SNAPSHOT_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", element_id, ext)))
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl VisualSurface for SnapshotDirectory {
    async fn capture(&self, element_id: &str) -> Result<Bitmap> {
        let path = self.find(element_id).ok_or_else(|| {
            LocationInsightError::Capture(format!("要素が見つかりません: {}", element_id))
        })?;
        debug!(element_id, path = %path.display(), "capturing snapshot");
        let bytes = tokio::fs::read(&path).await?;
        decode_bitmap(&bytes, self.max_width)
    }
}

/// メモリ上の要素（テストやプレビュー用）
#[derive(Debug, Clone, Default)]
pub struct InMemorySurface {
    elements: HashMap<String, Bitmap>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, element_id: impl Into<String>, bitmap: Bitmap) -> Self {
        self.elements.insert(element_id.into(), bitmap);
        self
    }
}

#[async_trait]
impl VisualSurface for InMemorySurface {
    async fn capture(&self, element_id: &str) -> Result<Bitmap> {
        self.elements
            .get(element_id)
            .cloned()
            .ok_or_else(|| LocationInsightError::Capture(format!("要素が見つかりません: {}", element_id)))
    }
}

// ============================================
// サムネイル
// ============================================

/// http(s) はGET、それ以外は base_dir 基準のファイルパス
#[derive(Debug, Clone)]
pub struct ThumbnailLoader {
    http: reqwest::Client,
    base_dir: PathBuf,
    timeout: Duration,
    max_width: u32,
}

impl ThumbnailLoader {
    pub fn new(base_dir: impl Into<PathBuf>, timeout: Duration, quality: PdfQuality) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("location-insight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LocationInsightError::Config(format!("HTTPクライアント初期化失敗: {}", e)))?;
        Ok(Self {
            http,
            base_dir: base_dir.into(),
            timeout,
            // サムネイルは小さく描くので幅を抑える
            max_width: quality.max_width() / 2,
        })
    }
}

#[async_trait]
impl ThumbnailSource for ThumbnailLoader {
    async fn fetch(&self, reference: &str) -> Result<Bitmap> {
        let reference = reference.trim();
        let bytes = if reference.starts_with("http://") || reference.starts_with("https://") {
            let resp = self
                .http
                .get(reference)
                .timeout(self.timeout)
                .send()
                .await?
                .error_for_status()?;
            resp.bytes().await?.to_vec()
        } else {
            let path = Path::new(reference);
            let path = if path.is_relative() {
                self.base_dir.join(path)
            } else {
                path.to_path_buf()
            };
            tokio::fs::read(&path).await?
        };
        decode_bitmap(&bytes, self.max_width)
    }
}

// ============================================
// 変化検出のオーバーレイ
// ============================================

/// base64のオーバーレイ画像をスナップショットとして書き出す
///
/// 書き出した場合は要素IDを返す。
pub fn write_overlay_snapshot(images: &ChangeImages, dir: &Path) -> Result<Option<String>> {
    let Some(encoded) = images.overlay.as_deref().filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    // "data:image/png;base64," 付きでも受け付ける
    let payload = encoded
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded)
        .trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| LocationInsightError::Capture(format!("base64デコード失敗: {}", e)))?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.png", OVERLAY_ELEMENT_ID));
    std::fs::write(&path, bytes)?;
    debug!(path = %path.display(), "overlay snapshot written");
    Ok(Some(OVERLAY_ELEMENT_ID.to_string()))
}
