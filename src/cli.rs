use crate::error::{LocationInsightError, Result};
use clap::{Parser, Subcommand};
use dialoguer::Input;
use location_insight_common::AnalysisFocus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "location-insight")]
#[command(about = "衛星解析による立地評価・PDFレポート生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 場所を解析してJSONを出力
    Analyze {
        /// 住所・地名、または "lat,lng"（省略時は対話入力）
        location: Option<String>,

        /// 業種
        #[arg(short, long)]
        business_type: Option<String>,

        /// 植生解析の着目点 (vegetation/urban/water/general)
        #[arg(short, long)]
        focus: Option<AnalysisFocus>,

        /// 出力JSONファイル
        #[arg(short, long, default_value = "analysis-result.json")]
        output: PathBuf,

        /// キャッシュを使用（同じ条件の再解析をスキップ）
        #[arg(long)]
        use_cache: bool,
    },

    /// 解析結果JSONからPDFレポートを生成
    Report {
        /// 解析結果JSONファイル
        #[arg(required = true)]
        input: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// 解析からPDF出力まで一括実行
    Run {
        /// 住所・地名、または "lat,lng"（省略時は対話入力）
        location: Option<String>,

        /// 業種
        #[arg(short, long)]
        business_type: Option<String>,

        /// 植生解析の着目点
        #[arg(short, long)]
        focus: Option<AnalysisFocus>,

        /// キャッシュを使用
        #[arg(long)]
        use_cache: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// バックエンドの死活確認
    Health,

    /// 設定を表示
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// 現在の設定を設定ファイルに保存
        #[arg(long)]
        save: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

/// レポート出力の共通オプション
#[derive(clap::Args, Clone, Debug)]
pub struct ReportArgs {
    /// 周辺ビジネス一覧JSONファイル
    #[arg(short, long)]
    pub listings: Option<PathBuf>,

    /// チャート/地図のスナップショット画像フォルダ（<id>.png）
    #[arg(short, long)]
    pub snapshots: Option<PathBuf>,

    /// チャートの要素ID（複数指定可、指定順にページ化）
    #[arg(short, long = "chart")]
    pub charts: Vec<String>,

    /// 地図の要素ID
    #[arg(short, long)]
    pub map: Option<String>,

    /// 出力ディレクトリ
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// PDF画像品質 (high/medium/low)
    #[arg(long, default_value = "medium")]
    pub pdf_quality: PdfQuality,
}

/// 場所を対話入力
pub fn prompt_location() -> Result<String> {
    let input: String = Input::new()
        .with_prompt("場所 (住所 または lat,lng)")
        .interact_text()
        .map_err(|e| LocationInsightError::InvalidLocation(e.to_string()))?;
    Ok(input.trim().to_string())
}

/// PDF画像品質設定
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PdfQuality {
    /// 高品質: 1400px
    High,
    /// 中品質: 800px（デフォルト）
    #[default]
    Medium,
    /// 低品質: 500px
    Low,
}

impl PdfQuality {
    /// 最大ピクセル幅
    pub fn max_width(&self) -> u32 {
        match self {
            PdfQuality::High => 1400,
            PdfQuality::Medium => 800,
            PdfQuality::Low => 500,
        }
    }
}

impl std::str::FromStr for PdfQuality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "h" => Ok(PdfQuality::High),
            "medium" | "med" | "m" => Ok(PdfQuality::Medium),
            "low" | "l" => Ok(PdfQuality::Low),
            _ => Err(format!("Unknown quality: {}. Use high, medium, or low", s)),
        }
    }
}

impl std::fmt::Display for PdfQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdfQuality::High => write!(f, "high"),
            PdfQuality::Medium => write!(f, "medium"),
            PdfQuality::Low => write!(f, "low"),
        }
    }
}
