//! APIレスポンスパーサー
//!
//! バックエンドの生JSONを検証し、解析種別ごとの正規化済みペイロードに変換する。
//! 必須の統計値が欠けている、または非有限値の場合はエラー（=その解析は失敗扱い）。

use crate::error::{Error, Result};
use crate::types::{AnalysisFocus, ChangeDetectionPayload, ChangeImages, Coordinates, VegetationPayload};
use serde_json::Value;

/// `success: false` を検出してメッセージ付きエラーにする
fn ensure_success(body: &Value, label: &str) -> Result<()> {
    if !body.is_object() {
        return Err(Error::Parse(format!("{}: レスポンスがオブジェクトではありません", label)));
    }
    match body.get("success").and_then(Value::as_bool) {
        Some(false) => {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(Error::Parse(format!("{}: バックエンドが失敗を返しました: {}", label, message)))
        }
        _ => Ok(()),
    }
}

/// 数値フィールド（文字列表記も許容）
fn number(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn required_number(parent: &Value, key: &str, label: &str) -> Result<f64> {
    number(parent.get(key))
        .ok_or_else(|| Error::Parse(format!("{}: {} がありません", label, key)))
}

fn text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn coordinates(value: Option<&Value>) -> Option<Coordinates> {
    let value = value?;
    let (lat, lng) = match value {
        Value::Array(items) if items.len() >= 2 => (number(items.first()), number(items.get(1))),
        Value::Object(_) => (
            number(value.get("lat").or_else(|| value.get("latitude"))),
            number(
                value
                    .get("lng")
                    .or_else(|| value.get("lon"))
                    .or_else(|| value.get("longitude")),
            ),
        ),
        _ => (None, None),
    };
    Some(Coordinates { lat: lat?, lng: lng? })
}

fn image(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// POST /detect-change のレスポンスを正規化
pub fn parse_change_detection(body: &Value) -> Result<ChangeDetectionPayload> {
    const LABEL: &str = "detect-change";
    ensure_success(body, LABEL)?;

    let stats = body
        .get("statistics")
        .filter(|v| v.is_object())
        .ok_or_else(|| Error::Parse(format!("{}: statistics がありません", LABEL)))?;

    let change_percentage = required_number(stats, "change_percentage", LABEL)?;
    let changed_pixels = required_number(stats, "changed_pixels", LABEL)?;
    let total_pixels = required_number(stats, "total_pixels", LABEL)?;
    if changed_pixels < 0.0 || total_pixels < 0.0 {
        return Err(Error::Parse(format!("{}: ピクセル数が負です", LABEL)));
    }

    let dates = body.get("dates");
    let images = body.get("images");

    let model_info = match body.get("model_info") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(ChangeDetectionPayload {
        coordinates: coordinates(body.get("coordinates")),
        before_date: text(dates.and_then(|d| d.get("before"))),
        after_date: text(dates.and_then(|d| d.get("after"))),
        changed_pixels: changed_pixels.round() as u64,
        total_pixels: total_pixels.round() as u64,
        change_percentage,
        images: ChangeImages {
            before: image(images.and_then(|i| i.get("before"))),
            after: image(images.and_then(|i| i.get("after"))),
            mask: image(images.and_then(|i| i.get("mask"))),
            overlay: image(images.and_then(|i| i.get("overlay"))),
        },
        model_info,
    })
}

/// NDVI平均値（キー名の揺れを吸収）
fn ndvi_mean(stats: &Value, phase: &str) -> Option<f64> {
    number(stats.get(format!("{}_mean", phase).as_str()))
        .or_else(|| number(stats.get(format!("mean_{}", phase).as_str())))
        .or_else(|| number(stats.get(phase).and_then(|p| p.get("mean"))))
}

fn recommendations(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) => ["text", "recommendation", "description", "title"]
                .iter()
                .find_map(|key| item.get(*key).and_then(Value::as_str))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// POST /analyze/ndvi のレスポンスを正規化
pub fn parse_vegetation(body: &Value) -> Result<VegetationPayload> {
    const LABEL: &str = "analyze/ndvi";
    ensure_success(body, LABEL)?;

    let change = body
        .get("change_analysis")
        .filter(|v| v.is_object())
        .ok_or_else(|| Error::Parse(format!("{}: change_analysis がありません", LABEL)))?;

    let ndvi = body.get("ndvi_analysis");
    let stats = ndvi
        .and_then(|n| n.get("ndvi_statistics"))
        .filter(|v| v.is_object())
        .ok_or_else(|| Error::Parse(format!("{}: ndvi_statistics がありません", LABEL)))?;

    let ndvi_before_mean = ndvi_mean(stats, "before")
        .ok_or_else(|| Error::Parse(format!("{}: NDVI before mean がありません", LABEL)))?;
    let ndvi_after_mean = ndvi_mean(stats, "after")
        .ok_or_else(|| Error::Parse(format!("{}: NDVI after mean がありません", LABEL)))?;

    let analysis_focus = ndvi
        .and_then(|n| n.get("analysis_focus"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<AnalysisFocus>().ok())
        .unwrap_or_default();

    Ok(VegetationPayload {
        location: text(body.get("location")),
        coordinates: coordinates(body.get("coordinates")),
        timeline_start: text(body.get("timeline_start")),
        timeline_end: text(body.get("timeline_end")),
        ndvi_before_mean,
        ndvi_after_mean,
        total_change_percentage: required_number(change, "total_change_percentage", LABEL)?,
        dominant_change: text(change.get("dominant_change")),
        vegetation_change_net: required_number(change, "vegetation_change_net", LABEL)?,
        urban_change_net: required_number(change, "urban_change_net", LABEL)?,
        water_change_net: number(change.get("water_change_net")).unwrap_or(0.0),
        change_intensity: text(change.get("change_intensity")),
        recommendations: recommendations(body.get("recommendations")),
        analysis_focus,
    })
}
