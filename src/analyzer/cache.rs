//! 解析結果キャッシュモジュール
//!
//! リクエストパラメータのSHA-256をキーにして2つの解析結果を保存し、
//! 同じ問い合わせの再解析をスキップする。成功した結果のみ保存する。

use crate::error::Result;
use location_insight_common::{AnalysisOutcome, ChangeDetectionRequest, VegetationRequest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

const CACHE_FILE_NAME: &str = ".analysis-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// リクエストハッシュ → 解析結果のマップ
    entries: HashMap<String, CacheEntry>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 問い合わせ文字列（表示用）
    pub location: String,
    /// 保存時刻 (RFC3339)
    pub stored_at: String,
    pub change_detection: AnalysisOutcome,
    pub vegetation: AnalysisOutcome,
}

impl CacheFile {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（壊れていれば空で始める）
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, CacheFile>(reader) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                warn!(path = %cache_path.display(), "キャッシュバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                warn!(path = %cache_path.display(), error = %e, "キャッシュを読み込めません");
                Self::default()
            }
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, folder: &Path) -> Result<()> {
        std::fs::create_dir_all(folder)?;
        let file = File::create(Self::cache_path(folder))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュを削除（存在しなければ false）
    pub fn clear(folder: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(cache_path)?;
        Ok(true)
    }

    /// キャッシュをルックアップ
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// キャッシュに追加（どちらかが失敗なら保存しない）
    pub fn insert(
        &mut self,
        key: String,
        location: String,
        change_detection: AnalysisOutcome,
        vegetation: AnalysisOutcome,
    ) -> bool {
        if !(change_detection.is_success() && vegetation.is_success()) {
            return false;
        }
        self.entries.insert(
            key,
            CacheEntry {
                location,
                stored_at: chrono::Utc::now().to_rfc3339(),
                change_detection,
                vegetation,
            },
        );
        true
    }

    /// キャッシュ件数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// リクエストパラメータのハッシュ（SHA-256, hex）
pub fn request_key(change: &ChangeDetectionRequest, vegetation: &VegetationRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(change)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(vegetation)?);
    Ok(hex::encode(hasher.finalize()))
}
