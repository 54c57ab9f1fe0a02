use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use location_insight::analyzer::{AnalysisClient, CacheFile, Geocoder};
use location_insight::{cli, config, pipeline};
use location_insight_common::{AnalysisFocus, DataQuality, MergedAnalysisResult};
use cli::{Cli, Commands};
use config::Config;
use pipeline::AnalyzeParams;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "location_insight=debug,location_insight_common=debug"
    } else {
        "location_insight=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(merged: &MergedAnalysisResult) {
    println!("  データ品質: {}", merged.data_quality.label());
    println!("  概要: {}", merged.narrative_summary);
    for insight in &merged.combined_insights {
        println!("   - {}", insight);
    }
}

/// 解析を実行（中断時は None）
async fn run_analysis(
    config: &Config,
    location: Option<String>,
    business_type: Option<String>,
    focus: Option<AnalysisFocus>,
    cache_dir: Option<&Path>,
) -> anyhow::Result<Option<MergedAnalysisResult>> {
    let location = match location {
        Some(location) => location,
        None => cli::prompt_location()?,
    };

    let backend = Arc::new(AnalysisClient::new(config)?);
    let geocoder = Geocoder::new(&config.geocoder_url, config.timeout())?;

    let pb = spinner("変化検出・植生解析を実行中...");
    let result = pipeline::analyze_location(
        config,
        backend,
        &geocoder,
        AnalyzeParams {
            location: &location,
            business_type: business_type.as_deref(),
            focus,
            cache_dir,
        },
    )
    .await;
    pb.finish_and_clear();

    match result {
        Ok(merged) => Ok(merged),
        Err(e) if e.is_input_error() => {
            anyhow::bail!("{}\n  例: \"Austin, TX\" / \"30.2672,-97.7431\"", e)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load().context("設定の読み込みに失敗しました")?;

    match cli.command {
        Commands::Analyze { location, business_type, focus, output, use_cache } => {
            println!("🛰  location-insight - 立地解析\n");

            let cache_dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            println!("[1/2] 解析中...{}", if use_cache { " (キャッシュ有効)" } else { "" });
            let Some(merged) = run_analysis(&config, location, business_type, focus, use_cache.then_some(cache_dir)).await? else {
                println!("⚠ 中断しました");
                return Ok(());
            };
            println!("✔ 解析完了\n");
            print_summary(&merged);

            println!("\n[2/2] 結果を保存中...");
            let json = serde_json::to_string_pretty(&merged)?;
            std::fs::write(&output, json).with_context(|| format!("書き込み失敗: {}", output.display()))?;
            println!("✔ 結果を保存: {}", output.display());
        }

        Commands::Report { input, report } => {
            println!("📄 location-insight - レポート生成\n");

            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("読み込み失敗: {}", input.display()))?;
            let merged: MergedAnalysisResult = serde_json::from_str(&content)
                .with_context(|| format!("解析結果JSONとして読めません: {}", input.display()))?;

            println!("- PDFを生成中... (品質: {})", report.pdf_quality);
            let generated = pipeline::report_from_result(&config, &merged, &report).await?;
            println!("✔ PDF出力: {} ({}ページ)", generated.path.display(), generated.pages.len());
        }

        Commands::Run { location, business_type, focus, use_cache, report } => {
            println!("🚀 location-insight - 一括処理\n");

            println!("[1/2] 解析中...{}", if use_cache { " (キャッシュ有効)" } else { "" });
            let cache_dir = report.output.clone();
            let Some(merged) = run_analysis(&config, location, business_type, focus, use_cache.then_some(cache_dir.as_path())).await? else {
                println!("⚠ 中断しました");
                return Ok(());
            };
            println!("✔ 解析完了\n");
            print_summary(&merged);
            if merged.data_quality == DataQuality::None {
                println!("\n⚠ 解析データがありません。レポートは N/A 表示になります");
            }

            println!("\n[2/2] PDFを生成中... (品質: {})", report.pdf_quality);
            let generated = pipeline::report_from_result(&config, &merged, &report).await?;
            println!("✔ PDF出力: {} ({}ページ)", generated.path.display(), generated.pages.len());

            println!("\n✅ 完了");
        }

        Commands::Health => {
            let client = AnalysisClient::new(&config)?;
            match client.health().await {
                Ok(body) => {
                    println!("✔ バックエンド稼働中: {}", client.base_url());
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(e) => {
                    println!("✗ バックエンドに接続できません: {}", client.base_url());
                    return Err(e.into());
                }
            }
        }

        Commands::Config { show, save } => {
            if save {
                config.save()?;
                println!("✔ 設定を保存しました: {}", Config::config_path()?.display());
            }

            if show || !save {
                println!("設定:");
                println!("  APIベースURL: {}", config.api_base_url);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  リトライ回数: {}", config.retry_count);
                println!("  モデル: {}", config.model);
                println!("  ズーム: {} / 解像度: {}px / alpha: {}", config.zoom_level, config.resolution, config.alpha);
                println!("  PyTorch: {}", if config.use_pytorch { "有効" } else { "無効" });
                println!("  解析の着目点: {}", config.analysis_focus);
                println!("  ジオコーダー: {}", config.geocoder_url);
                println!("  地図APIキー: {}", if config.maps_api_key.is_some() { "設定済み" } else { "未設定" });
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| std::path::PathBuf::from("."));
            let cache_path = CacheFile::cache_path(&target);

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = CacheFile::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match CacheFile::clear(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}
