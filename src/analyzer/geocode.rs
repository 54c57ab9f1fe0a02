//! 場所テキストの解決
//!
//! "lat,lng" 形式はそのまま解釈し、それ以外はNominatimの自由形式検索で
//! 最初の候補を使う。

use crate::error::{LocationInsightError, Result, TransportErrorKind};
use location_insight_common::{LocationQuery, ResolvedLocation};
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// "lat,lng" を解釈（範囲チェック込み）
pub fn parse_coordinates(text: &str) -> Option<ResolvedLocation> {
    lazy_static::lazy_static! {
        static ref COORD_RE: Regex =
            Regex::new(r"^\s*\(?\s*([+-]?\d{1,3}(?:\.\d+)?)\s*[,\s]\s*([+-]?\d{1,3}(?:\.\d+)?)\s*\)?\s*$").unwrap();
    }

    let cap = COORD_RE.captures(text)?;
    let lat: f64 = cap[1].parse().ok()?;
    let lng: f64 = cap[2].parse().ok()?;
    let location = ResolvedLocation::new(lat, lng, format!("{:.4}, {:.4}", lat, lng));
    location.validate().ok()?;
    Some(location)
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Geocoder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("location-insight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LocationInsightError::Config(format!("HTTPクライアント初期化失敗: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            timeout,
        })
    }

    /// 問い合わせの場所を解決した LocationQuery を返す
    pub async fn resolve(&self, raw_text: &str, business_type: Option<&str>) -> Result<LocationQuery> {
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            return Err(LocationInsightError::InvalidLocation("場所が入力されていません".into()));
        }

        let location = match parse_coordinates(trimmed) {
            Some(location) => location,
            None => self
                .geocode_freeform(trimmed)
                .await?
                .ok_or_else(|| LocationInsightError::Geocode(format!("場所が見つかりません: {}", trimmed)))?,
        };

        let mut query = LocationQuery::new(trimmed).with_resolved(location);
        if let Some(business_type) = business_type.map(str::trim).filter(|b| !b.is_empty()) {
            query = query.with_business_type(business_type);
        }
        Ok(query)
    }

    async fn geocode_freeform(&self, query: &str) -> Result<Option<ResolvedLocation>> {
        debug!(query, "geocoding");
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .timeout(self.timeout)
            .send()
            .await?;

        // 通信障害・レート制限は入力エラーではなく通信エラーとして返す
        let status = resp.status();
        if !status.is_success() {
            return Err(LocationInsightError::transport(
                TransportErrorKind::from_status(status.as_u16()),
                format!("geocoder HTTP {}", status.as_u16()),
            ));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| LocationInsightError::Geocode(format!("応答を読めません: {}", e)))?;
        parse_nominatim(&body)
    }
}

/// Nominatimの応答（配列）から先頭候補を取り出す
pub fn parse_nominatim(body: &Value) -> Result<Option<ResolvedLocation>> {
    let results = body
        .as_array()
        .ok_or_else(|| LocationInsightError::Geocode("応答が配列ではありません".into()))?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let coord = |key: &str| {
        first[key]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| first[key].as_f64())
            .ok_or_else(|| LocationInsightError::Geocode(format!("{} がありません", key)))
    };
    let lat = coord("lat")?;
    let lng = coord("lon")?;
    let display_name = first["display_name"].as_str().unwrap_or_default().to_string();

    let location = ResolvedLocation::new(lat, lng, display_name);
    location.validate()?;
    Ok(Some(location))
}
