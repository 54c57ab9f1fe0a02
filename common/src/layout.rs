//! レイアウト設定モジュール
//!
//! mm基準のレイアウト定義（Source of Truth）
//! 座標系は左上原点（x: 右向き, y: 下向き）。PDF座標への変換は描画側で行う。

// ============================================
// mm基準レイアウト（Source of Truth）
// ============================================

/// A4サイズ（mm）
pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

/// 余白設定（mm）
pub const MARGIN_MM: f32 = 20.0;

/// 利用可能幅（mm）
pub const CONTENT_WIDTH_MM: f32 = A4_WIDTH_MM - MARGIN_MM * 2.0; // 170mm

/// ヘッダー（2ページ目以降）
pub const HEADER_TEXT_Y_MM: f32 = 10.0;
pub const HEADER_RULE_Y_MM: f32 = 16.0;
pub const CONTENT_TOP_MM: f32 = 26.0;

/// セクション見出しの下端
pub const SECTION_BODY_TOP_MM: f32 = 42.0;

/// KPI行
pub const KPI_COUNT: usize = 5;
pub const KPI_TOP_MM: f32 = SECTION_BODY_TOP_MM;
pub const KPI_ROW_HEIGHT_MM: f32 = 30.0;
pub const KPI_ROW_SPACING_MM: f32 = 6.0;

/// 属性バー
pub const BAR_TOP_MM: f32 = SECTION_BODY_TOP_MM;
pub const BAR_BLOCK_HEIGHT_MM: f32 = 24.0;
pub const BAR_HEIGHT_MM: f32 = 8.0;
pub const PROFILE_LIST_TOP_MM: f32 = 108.0;
pub const PROFILE_LINE_HEIGHT_MM: f32 = 9.0;

/// チャート/地図の縦横比（高さ/幅）
pub const CHART_ASPECT: f32 = 0.75;
pub const MAP_ASPECT: f32 = 0.75;
pub const FIGURE_TOP_MM: f32 = 40.0;

/// ビジネス一覧カード
pub const LISTINGS_PER_PAGE: usize = 4;
pub const MAX_LISTINGS: usize = 12;
pub const ADDRESS_MAX_CHARS: usize = 60;
pub const CARD_TOP_MM: f32 = 40.0;
pub const CARD_HEIGHT_MM: f32 = 54.0;
pub const CARD_GAP_MM: f32 = 6.0;
pub const CARD_PADDING_MM: f32 = 4.0;
pub const THUMBNAIL_SIZE_MM: f32 = CARD_HEIGHT_MM - CARD_PADDING_MM * 2.0; // 46mm

/// 本文
pub const BODY_FONT_PT: f32 = 11.0;
pub const BODY_LINE_HEIGHT_MM: f32 = 6.0;
pub const FOOTER_TOP_MM: f32 = 262.0;

/// スコア閾値
pub const SCORE_POSITIVE_MIN: f64 = 70.0;
pub const SCORE_WARNING_MIN: f64 = 50.0;

// ============================================
// 変換係数
// ============================================

/// mm → pt変換 (1mm = 72/25.4 pt ≈ 2.835pt)
pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Helveticaの平均文字幅（em比）
pub const AVG_CHAR_WIDTH_EM: f32 = 0.5;

/// mm → pt 変換
#[inline]
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * MM_TO_PT
}

/// pt → mm 変換
#[inline]
pub fn pt_to_mm(pt: f32) -> f32 {
    pt / MM_TO_PT
}

// ============================================
// ボックス
// ============================================

/// 配置ボックス（mm、左上原点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxModel {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoxModel {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }
}

/// KPI行のボックス（indexだけで決まる）
pub fn kpi_row_box(index: usize) -> BoxModel {
    BoxModel::new(
        MARGIN_MM,
        KPI_TOP_MM + index as f32 * (KPI_ROW_HEIGHT_MM + KPI_ROW_SPACING_MM),
        CONTENT_WIDTH_MM,
        KPI_ROW_HEIGHT_MM,
    )
}

/// 属性バーの背景ボックス
pub fn bar_track_box(index: usize) -> BoxModel {
    BoxModel::new(
        MARGIN_MM,
        BAR_TOP_MM + index as f32 * BAR_BLOCK_HEIGHT_MM + 8.0,
        CONTENT_WIDTH_MM,
        BAR_HEIGHT_MM,
    )
}

/// 塗り幅 = 割合 × 利用可能幅（0..=100にクランプ）
pub fn bar_fill_width(percentage: f64) -> f32 {
    let pct = if percentage.is_finite() {
        percentage.clamp(0.0, 100.0)
    } else {
        0.0
    };
    (pct / 100.0) as f32 * CONTENT_WIDTH_MM
}

/// 全幅・固定縦横比の図ボックス
pub fn figure_box(aspect: f32) -> BoxModel {
    BoxModel::new(MARGIN_MM, FIGURE_TOP_MM, CONTENT_WIDTH_MM, CONTENT_WIDTH_MM * aspect)
}

/// ページ内スロットのカードボックス
pub fn listing_card_box(slot: usize) -> BoxModel {
    BoxModel::new(
        MARGIN_MM,
        CARD_TOP_MM + slot as f32 * (CARD_HEIGHT_MM + CARD_GAP_MM),
        CONTENT_WIDTH_MM,
        CARD_HEIGHT_MM,
    )
}

/// カード内サムネイル枠
pub fn thumbnail_frame(card: &BoxModel) -> BoxModel {
    BoxModel::new(
        card.x + CARD_PADDING_MM,
        card.y + CARD_PADDING_MM,
        THUMBNAIL_SIZE_MM,
        THUMBNAIL_SIZE_MM,
    )
}

/// 縦横比を保って枠内に収め、中央寄せ
pub fn fit_within(frame: &BoxModel, width_px: u32, height_px: u32) -> BoxModel {
    if width_px == 0 || height_px == 0 {
        return *frame;
    }
    let scale = (frame.w / width_px as f32).min(frame.h / height_px as f32);
    let w = width_px as f32 * scale;
    let h = height_px as f32 * scale;
    BoxModel::new(frame.x + (frame.w - w) / 2.0, frame.y + (frame.h - h) / 2.0, w, h)
}

// ============================================
// テキスト
// ============================================

/// 指定幅に収まるおおよその文字数
pub fn chars_per_line(width_mm: f32, font_size_pt: f32) -> usize {
    let char_width_mm = pt_to_mm(font_size_pt * AVG_CHAR_WIDTH_EM);
    ((width_mm / char_width_mm).floor() as usize).max(1)
}

/// 単語単位で折り返し（単語が長すぎる場合は強制分割）
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// 先頭 max 文字に切り詰め（切った場合は "..." を付ける）
pub fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// 要素IDからページタイトルを生成: "foot-traffic-chart" → "Foot Traffic"
pub fn humanize_element_id(id: &str) -> String {
    const SUFFIXES: &[&str] = &["-chart", "_chart", "-graph", "_graph"];

    let mut base = id.trim();
    for suffix in SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
            break;
        }
    }

    let title = base
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Chart".to_string()
    } else {
        title
    }
}
