//! レポートのページ構成（副作用なし）
//!
//! キャプチャ済みのビットマップとスナップショットからページを組み立てる。
//! 順序: 表紙 → KPI → 属性/プロファイル → チャート → 地図 → 一覧 → まとめ
//! 入力が無いセクションはページ自体を出さない（ページ番号も消費しない）。

use super::document::{
    palette, Bitmap, FontFace, Page, PageKind, PlacedElement, ReportDocument, Rgb8,
};
use crate::layout::{
    bar_fill_width, bar_track_box, chars_per_line, figure_box, fit_within, humanize_element_id,
    kpi_row_box, listing_card_box, pt_to_mm, thumbnail_frame, truncate_chars, wrap_text, BoxModel,
    A4_HEIGHT_MM, A4_WIDTH_MM, ADDRESS_MAX_CHARS, AVG_CHAR_WIDTH_EM, BAR_BLOCK_HEIGHT_MM,
    BAR_TOP_MM, BODY_FONT_PT, BODY_LINE_HEIGHT_MM, CARD_PADDING_MM, CHART_ASPECT,
    CONTENT_TOP_MM, CONTENT_WIDTH_MM, FOOTER_TOP_MM, HEADER_RULE_Y_MM, HEADER_TEXT_Y_MM,
    KPI_COUNT, LISTINGS_PER_PAGE, MAP_ASPECT, MARGIN_MM, MAX_LISTINGS, PROFILE_LINE_HEIGHT_MM,
    PROFILE_LIST_TOP_MM, SCORE_POSITIVE_MIN, SCORE_WARNING_MIN, SECTION_BODY_TOP_MM,
    THUMBNAIL_SIZE_MM,
};
use crate::snapshot::{Kpi, KpiIcon, KpiUnit};
use crate::types::{BusinessListing, ReportSpec};

pub const REPORT_TITLE: &str = "Location Intelligence Report";
pub const BRANDING_LINES: [&str; 2] = [
    "Location Insight | Location intelligence for smarter site selection",
    "Satellite data: change detection and NDVI analysis via the unified analysis API",
];
const MAX_PROFILE_METRICS: usize = 15;

/// キャプチャ結果（失敗したものは含めない）
#[derive(Debug, Clone, Default)]
pub struct CapturedAssets {
    /// 要求順に並んだ成功済みチャート
    pub charts: Vec<(String, Bitmap)>,
    pub map: Option<Bitmap>,
    /// 描画対象の一覧と同じ並び（失敗は None）
    pub thumbnails: Vec<Option<Bitmap>>,
}

/// 描画対象の一覧（上限12件、入力順）
pub fn rendered_listings(listings: &[BusinessListing]) -> &[BusinessListing] {
    &listings[..listings.len().min(MAX_LISTINGS)]
}

/// 一覧ページ数
pub fn listing_page_count(listing_count: usize) -> usize {
    listing_count.min(MAX_LISTINGS).div_ceil(LISTINGS_PER_PAGE)
}

/// スコアの3段階色（スコア無しはグレー）
pub fn score_color(score: Option<f64>) -> Rgb8 {
    match score.filter(|s| s.is_finite()) {
        Some(s) if s >= SCORE_POSITIVE_MIN => palette::POSITIVE,
        Some(s) if s >= SCORE_WARNING_MIN => palette::WARNING,
        Some(_) => palette::NEGATIVE,
        None => palette::NO_DATA,
    }
}

/// 文字列幅の概算（mm）
fn text_width_mm(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * pt_to_mm(font_size * AVG_CHAR_WIDTH_EM)
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder
    } else {
        trimmed
    }
}

/// ページ番号を振りながらページを積む
struct Composer {
    location: String,
    pages: Vec<Page>,
}

impl Composer {
    fn push(&mut self, kind: PageKind, mut body: Vec<PlacedElement>) {
        let number = self.pages.len() + 1;
        let mut elements = Vec::with_capacity(body.len() + 3);
        if number > 1 {
            elements.extend(header(&self.location, number));
        }
        elements.append(&mut body);
        self.pages.push(Page {
            number,
            kind,
            elements,
        });
    }
}

fn header(location: &str, number: usize) -> Vec<PlacedElement> {
    let label = format!("Page {}", number);
    vec![
        PlacedElement::text(
            MARGIN_MM,
            HEADER_TEXT_Y_MM,
            CONTENT_WIDTH_MM - 30.0,
            format!("{} | {}", REPORT_TITLE, truncate_chars(location, 50)),
            9.0,
            FontFace::Regular,
            palette::MUTED,
        ),
        PlacedElement::text(
            A4_WIDTH_MM - MARGIN_MM - text_width_mm(&label, 9.0),
            HEADER_TEXT_Y_MM,
            30.0,
            label,
            9.0,
            FontFace::Regular,
            palette::MUTED,
        ),
        PlacedElement::rect(
            BoxModel::new(MARGIN_MM, HEADER_RULE_Y_MM, CONTENT_WIDTH_MM, 0.3),
            Some(palette::BORDER),
            None,
        ),
    ]
}

fn section_title(title: &str) -> PlacedElement {
    PlacedElement::text(
        MARGIN_MM,
        CONTENT_TOP_MM,
        CONTENT_WIDTH_MM,
        title,
        18.0,
        FontFace::Bold,
        palette::BRAND,
    )
}

/// レポート全体を組み立てる
pub fn compose_report(spec: &ReportSpec, assets: CapturedAssets, generated_at: &str) -> ReportDocument {
    let location = or_placeholder(&spec.location, "the selected location").to_string();
    let mut composer = Composer {
        location: location.clone(),
        pages: Vec::new(),
    };

    composer.push(PageKind::Title, title_page(spec, generated_at));
    composer.push(PageKind::Kpi, kpi_page(&spec.analysis_snapshot.kpis));
    composer.push(PageKind::Profile, profile_page(spec));

    for (element_id, bitmap) in assets.charts {
        let body = chart_page(&element_id, bitmap);
        composer.push(PageKind::Chart { element_id }, body);
    }

    if let Some(map) = assets.map {
        composer.push(PageKind::Map, map_page(&location, map));
    }

    let listings = rendered_listings(&spec.business_listings);
    let mut thumbnails = assets.thumbnails.into_iter();
    let total_pages = listing_page_count(listings.len());
    for (page_index, chunk) in listings.chunks(LISTINGS_PER_PAGE).enumerate() {
        let chunk_thumbs: Vec<Option<Bitmap>> =
            (0..chunk.len()).map(|_| thumbnails.next().flatten()).collect();
        let body = listing_page(chunk, chunk_thumbs, page_index, total_pages);
        composer.push(
            PageKind::Listings {
                first_index: page_index * LISTINGS_PER_PAGE,
                count: chunk.len(),
            },
            body,
        );
    }

    composer.push(PageKind::Summary, summary_page(spec, &location));

    ReportDocument {
        title: format!("{} - {}", REPORT_TITLE, location),
        page_width_mm: A4_WIDTH_MM,
        page_height_mm: A4_HEIGHT_MM,
        pages: composer.pages,
    }
}

// ============================================
// 各ページ
// ============================================

fn title_page(spec: &ReportSpec, generated_at: &str) -> Vec<PlacedElement> {
    let snapshot = &spec.analysis_snapshot;
    let business_type = or_placeholder(&spec.business_type, "Not specified");
    let location = or_placeholder(&spec.location, "Not specified");

    let mut elements = vec![
        PlacedElement::rect(BoxModel::new(0.0, 0.0, A4_WIDTH_MM, 70.0), Some(palette::BRAND), None),
        PlacedElement::text(MARGIN_MM, 24.0, CONTENT_WIDTH_MM, REPORT_TITLE, 26.0, FontFace::Bold, palette::WHITE),
        PlacedElement::text(
            MARGIN_MM,
            42.0,
            CONTENT_WIDTH_MM,
            format!("Site analysis for {}", truncate_chars(business_type, 40)),
            13.0,
            FontFace::Regular,
            palette::WHITE,
        ),
        // 場所/業種の枠
        PlacedElement::rect(
            BoxModel::new(MARGIN_MM, 85.0, CONTENT_WIDTH_MM, 36.0),
            Some(palette::PANEL),
            Some(palette::BORDER),
        ),
        PlacedElement::text(MARGIN_MM + 6.0, 92.0, 80.0, "Location", 9.0, FontFace::Regular, palette::MUTED),
        PlacedElement::text(
            MARGIN_MM + 6.0,
            99.0,
            80.0,
            truncate_chars(location, 32),
            13.0,
            FontFace::Bold,
            palette::TEXT,
        ),
        PlacedElement::text(MARGIN_MM + 92.0, 92.0, 72.0, "Business type", 9.0, FontFace::Regular, palette::MUTED),
        PlacedElement::text(
            MARGIN_MM + 92.0,
            99.0,
            72.0,
            truncate_chars(business_type, 28),
            13.0,
            FontFace::Bold,
            palette::TEXT,
        ),
    ];

    // スコア円
    let circle = BoxModel::new(A4_WIDTH_MM / 2.0 - 25.0, 140.0, 50.0, 50.0);
    let score_text = match snapshot.overall_score.filter(|s| s.is_finite()) {
        Some(score) => format!("{:.0}", score),
        None => "N/A".to_string(),
    };
    let caption = "Opportunity score";
    elements.push(PlacedElement::ellipse(circle, score_color(snapshot.overall_score)));
    elements.push(PlacedElement::text(
        A4_WIDTH_MM / 2.0 - text_width_mm(&score_text, 24.0) / 2.0,
        circle.y + 19.0,
        circle.w,
        score_text,
        24.0,
        FontFace::Bold,
        palette::WHITE,
    ));
    elements.push(PlacedElement::text(
        A4_WIDTH_MM / 2.0 - text_width_mm(caption, 11.0) / 2.0,
        circle.bottom() + 5.0,
        60.0,
        caption,
        11.0,
        FontFace::Regular,
        palette::MUTED,
    ));

    if let Some(merged) = &snapshot.merged {
        elements.push(PlacedElement::text(
            MARGIN_MM,
            215.0,
            CONTENT_WIDTH_MM,
            format!("Data quality: {}", merged.data_quality.label()),
            10.0,
            FontFace::Regular,
            palette::TEXT,
        ));
    }

    elements.push(PlacedElement::text(
        MARGIN_MM,
        280.0,
        CONTENT_WIDTH_MM,
        format!("Generated on {}", generated_at),
        9.0,
        FontFace::Regular,
        palette::MUTED,
    ));

    elements
}

fn kpi_page(kpis: &[Kpi]) -> Vec<PlacedElement> {
    let mut elements = vec![section_title("Key Performance Indicators")];

    for index in 0..KPI_COUNT {
        let placeholder;
        let kpi = match kpis.get(index) {
            Some(kpi) => kpi,
            None => {
                placeholder = Kpi::new(KpiIcon::Score, "Not available", None, KpiUnit::Score);
                &placeholder
            }
        };
        let row = kpi_row_box(index);
        elements.push(PlacedElement::rect(row, Some(palette::PANEL), Some(palette::BORDER)));
        elements.push(PlacedElement::text(
            row.x + 6.0,
            row.y + 9.0,
            12.0,
            kpi.icon.glyph().to_string(),
            16.0,
            FontFace::Symbol,
            palette::BRAND,
        ));
        elements.push(PlacedElement::text(
            row.x + 22.0,
            row.y + 6.0,
            row.w - 28.0,
            truncate_chars(&kpi.label, 60),
            10.0,
            FontFace::Regular,
            palette::MUTED,
        ));
        elements.push(PlacedElement::text(
            row.x + 22.0,
            row.y + 14.0,
            row.w - 28.0,
            kpi.formatted_value(),
            16.0,
            FontFace::Bold,
            palette::TEXT,
        ));
    }

    elements
}

fn profile_page(spec: &ReportSpec) -> Vec<PlacedElement> {
    let snapshot = &spec.analysis_snapshot;
    let mut elements = vec![section_title("Demographics & Profile")];

    for (index, bar) in snapshot.demographics.iter().take(2).enumerate() {
        let label_y = BAR_TOP_MM + index as f32 * BAR_BLOCK_HEIGHT_MM;
        let value = match bar.percentage.filter(|p| p.is_finite()) {
            Some(p) => crate::format::format_percent(p),
            None => "N/A".to_string(),
        };
        elements.push(PlacedElement::text(
            MARGIN_MM,
            label_y,
            CONTENT_WIDTH_MM - 30.0,
            truncate_chars(&bar.label, 70),
            11.0,
            FontFace::Regular,
            palette::TEXT,
        ));
        elements.push(PlacedElement::text(
            MARGIN_MM + CONTENT_WIDTH_MM - text_width_mm(&value, 11.0),
            label_y,
            30.0,
            value,
            11.0,
            FontFace::Bold,
            palette::TEXT,
        ));

        let track = bar_track_box(index);
        elements.push(PlacedElement::rect(track, Some(palette::TRACK), None));
        let fill_width = bar.percentage.map(bar_fill_width).unwrap_or(0.0);
        if fill_width > 0.0 {
            elements.push(PlacedElement::rect(
                BoxModel::new(track.x, track.y, fill_width, track.h),
                Some(palette::BRAND),
                None,
            ));
        }
    }

    elements.push(PlacedElement::text(
        MARGIN_MM,
        PROFILE_LIST_TOP_MM,
        CONTENT_WIDTH_MM,
        "Profile metrics",
        13.0,
        FontFace::Bold,
        palette::BRAND,
    ));
    for (index, metric) in snapshot.profile_metrics.iter().take(MAX_PROFILE_METRICS).enumerate() {
        elements.push(PlacedElement::text(
            MARGIN_MM + 4.0,
            PROFILE_LIST_TOP_MM + 10.0 + index as f32 * PROFILE_LINE_HEIGHT_MM,
            CONTENT_WIDTH_MM - 4.0,
            metric.render(),
            11.0,
            FontFace::Regular,
            palette::TEXT,
        ));
    }

    elements
}

fn chart_page(element_id: &str, bitmap: Bitmap) -> Vec<PlacedElement> {
    vec![
        section_title(&humanize_element_id(element_id)),
        PlacedElement::image(figure_box(CHART_ASPECT), bitmap),
    ]
}

fn map_page(location: &str, bitmap: Bitmap) -> Vec<PlacedElement> {
    let figure = figure_box(MAP_ASPECT);
    vec![
        section_title("Location Map"),
        PlacedElement::image(figure, bitmap),
        PlacedElement::text(
            MARGIN_MM,
            figure.bottom() + 4.0,
            CONTENT_WIDTH_MM,
            format!("Map snapshot of {}", truncate_chars(location, 80)),
            9.0,
            FontFace::Regular,
            palette::MUTED,
        ),
    ]
}

fn listing_page(
    listings: &[BusinessListing],
    thumbnails: Vec<Option<Bitmap>>,
    page_index: usize,
    total_pages: usize,
) -> Vec<PlacedElement> {
    let title = if total_pages > 1 {
        format!("Nearby Businesses ({}/{})", page_index + 1, total_pages)
    } else {
        "Nearby Businesses".to_string()
    };
    let mut elements = vec![section_title(&title)];

    for (slot, (listing, thumbnail)) in listings.iter().zip(thumbnails).enumerate() {
        elements.extend(listing_card(slot, listing, thumbnail));
    }

    elements
}

/// 一覧カード1枚
pub fn listing_card(slot: usize, listing: &BusinessListing, thumbnail: Option<Bitmap>) -> Vec<PlacedElement> {
    let card = listing_card_box(slot);
    let mut elements = vec![PlacedElement::rect(card, None, Some(palette::BORDER))];

    if let Some(bitmap) = thumbnail {
        let frame = thumbnail_frame(&card);
        let placed = fit_within(&frame, bitmap.width, bitmap.height);
        elements.push(PlacedElement::image(placed, bitmap));
    }

    let text_x = card.x + CARD_PADDING_MM + THUMBNAIL_SIZE_MM + 6.0;
    let text_w = card.right() - CARD_PADDING_MM - text_x;
    let max_chars = chars_per_line(text_w, 10.0);

    let rating = match listing.rating.filter(|r| r.is_finite()) {
        Some(r) => format!("Rating: {:.1} / 5", r),
        None => "Rating: N/A".to_string(),
    };
    let distance = match listing.distance_km.filter(|d| d.is_finite()) {
        Some(d) => format!("Distance: {:.1} km", d),
        None => "Distance: N/A".to_string(),
    };

    let lines: [(String, f32, FontFace, Rgb8); 5] = [
        (
            truncate_chars(or_placeholder(&listing.name, "Unnamed business"), chars_per_line(text_w, 12.0)),
            12.0,
            FontFace::Bold,
            palette::TEXT,
        ),
        (
            truncate_chars(or_placeholder(&listing.category, "Uncategorised"), max_chars),
            10.0,
            FontFace::Regular,
            palette::MUTED,
        ),
        (
            truncate_chars(or_placeholder(&listing.address, "Address unavailable"), ADDRESS_MAX_CHARS),
            10.0,
            FontFace::Regular,
            palette::TEXT,
        ),
        (rating, 10.0, FontFace::Regular, palette::TEXT),
        (distance, 10.0, FontFace::Regular, palette::TEXT),
    ];

    for (index, (text, size, face, color)) in lines.into_iter().enumerate() {
        elements.push(PlacedElement::text(
            text_x,
            card.y + 5.0 + index as f32 * 8.5,
            text_w,
            text,
            size,
            face,
            color,
        ));
    }

    elements
}

/// まとめ本文（固定テンプレート）
pub fn summary_paragraph(business_type: &str, location: &str) -> String {
    format!(
        "This report evaluates {} as a potential site for a {}. It combines satellite change detection, NDVI vegetation analysis, nearby competition and local market indicators to give a balanced view of the opportunity. Review the key performance indicators and competitor listings alongside an on-site visit before making a final decision.",
        location,
        or_placeholder(business_type, "business").to_lowercase()
    )
}

fn summary_page(spec: &ReportSpec, location: &str) -> Vec<PlacedElement> {
    let mut elements = vec![section_title("Summary")];
    let max_chars = chars_per_line(CONTENT_WIDTH_MM, BODY_FONT_PT);
    let limit_y = FOOTER_TOP_MM - BODY_LINE_HEIGHT_MM;
    let mut y = SECTION_BODY_TOP_MM;

    for line in wrap_text(&summary_paragraph(&spec.business_type, location), max_chars) {
        elements.push(PlacedElement::text(
            MARGIN_MM,
            y,
            CONTENT_WIDTH_MM,
            line,
            BODY_FONT_PT,
            FontFace::Regular,
            palette::TEXT,
        ));
        y += BODY_LINE_HEIGHT_MM;
    }

    let insights = spec
        .analysis_snapshot
        .merged
        .as_ref()
        .map(|m| m.combined_insights.as_slice())
        .unwrap_or_default();
    if !insights.is_empty() && y + BODY_LINE_HEIGHT_MM * 3.0 < limit_y {
        y += BODY_LINE_HEIGHT_MM;
        elements.push(PlacedElement::text(
            MARGIN_MM,
            y,
            CONTENT_WIDTH_MM,
            "Key insights",
            13.0,
            FontFace::Bold,
            palette::BRAND,
        ));
        y += BODY_LINE_HEIGHT_MM * 1.5;

        'insights: for insight in insights {
            for (i, line) in wrap_text(insight, max_chars.saturating_sub(2)).into_iter().enumerate() {
                if y > limit_y {
                    break 'insights;
                }
                let text = if i == 0 { format!("- {}", line) } else { format!("  {}", line) };
                elements.push(PlacedElement::text(
                    MARGIN_MM,
                    y,
                    CONTENT_WIDTH_MM,
                    text,
                    BODY_FONT_PT,
                    FontFace::Regular,
                    palette::TEXT,
                ));
                y += BODY_LINE_HEIGHT_MM;
            }
        }
    }

    for (i, line) in BRANDING_LINES.iter().enumerate() {
        elements.push(PlacedElement::text(
            MARGIN_MM,
            FOOTER_TOP_MM + i as f32 * BODY_LINE_HEIGHT_MM,
            CONTENT_WIDTH_MM,
            *line,
            9.0,
            FontFace::Regular,
            palette::MUTED,
        ));
    }

    elements
}
