//! 数値フォーマット
//!
//! パーセントは小数1桁、NDVIは小数3桁。
//! 差分値は正のとき必ず "+" を付ける。丸めた結果が0なら符号なし。

/// 丸め後に -0 を 0 に寄せる
fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// "12.5%"（絶対量。負値は "-" のみ）
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", round_to(value, 1))
}

/// "+3.0%" / "-2.5%" / "0.0%"
pub fn format_signed_percent(value: f64) -> String {
    let rounded = round_to(value, 1);
    if rounded > 0.0 {
        format!("+{:.1}%", rounded)
    } else {
        format!("{:.1}%", rounded)
    }
}

/// "0.412"
pub fn format_ndvi(value: f64) -> String {
    format!("{:.3}", round_to(value, 3))
}

/// "+0.012" / "-0.030"
pub fn format_signed_ndvi(value: f64) -> String {
    let rounded = round_to(value, 3);
    if rounded > 0.0 {
        format!("+{:.3}", rounded)
    } else {
        format!("{:.3}", rounded)
    }
}

/// 3桁区切り "1,234,567"
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
