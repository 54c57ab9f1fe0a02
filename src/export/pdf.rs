//! ReportDocument を printpdf で書き出す
//!
//! ドキュメントモデルは左上原点(mm)、PDFは左下原点なので y を反転する。

use crate::error::{LocationInsightError, Result};
use location_insight_common::export::{
    Bitmap, ElementContent, FontFace, PlacedElement, RectElement, RectShape, ReportDocument, Rgb8,
    TextElement,
};
use location_insight_common::layout::{pt_to_mm, BoxModel};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;

/// 画像配置の基準DPI（自然サイズ = px * 25.4 / dpi mm）
const IMAGE_DPI: f32 = 300.0;
const STROKE_WIDTH_PT: f32 = 0.6;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    symbol: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: FontFace) -> &IndirectFontRef {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
            FontFace::Symbol => &self.symbol,
        }
    }
}

fn pdf_error(context: &str, err: impl std::fmt::Debug) -> LocationInsightError {
    LocationInsightError::PdfGeneration(format!("{}: {:?}", context, err))
}

fn to_color(color: Rgb8) -> Color {
    let (r, g, b) = color.to_unit();
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// 組み込みフォント(WinAnsi)で出せない文字は '?' に置き換える
fn winansi_safe(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) < 0x100 && !c.is_control() { c } else { '?' })
        .collect()
}

/// PDFのバイト列を生成
pub fn render_pdf(document: &ReportDocument) -> Result<Vec<u8>> {
    let doc = build_document(document)?;
    doc.save_to_bytes().map_err(|e| pdf_error("PDF保存エラー", e))
}

fn build_document(document: &ReportDocument) -> Result<PdfDocumentReference> {
    let page_w = Mm(document.page_width_mm);
    let page_h = Mm(document.page_height_mm);

    let (doc, page1, layer1) = PdfDocument::new(winansi_safe(&document.title), page_w, page_h, "Layer 1");

    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| pdf_error("フォント追加エラー", e))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| pdf_error("フォント追加エラー", e))?,
        symbol: doc
            .add_builtin_font(BuiltinFont::ZapfDingbats)
            .map_err(|e| pdf_error("フォント追加エラー", e))?,
    };

    for (index, page) in document.pages.iter().enumerate() {
        let (page_idx, layer_idx) = if index == 0 {
            (page1, layer1)
        } else {
            doc.add_page(page_w, page_h, "Layer 1")
        };
        let layer = doc.get_page(page_idx).get_layer(layer_idx);

        for element in &page.elements {
            draw_element(&layer, &fonts, element, document.page_height_mm);
        }
    }

    Ok(doc)
}

fn draw_element(layer: &PdfLayerReference, fonts: &Fonts, element: &PlacedElement, page_h: f32) {
    let b = &element.box_model;
    match &element.content {
        ElementContent::Text(text) => draw_text(layer, fonts, b, text, page_h),
        ElementContent::Rect(rect) => draw_rect(layer, b, rect, page_h),
        ElementContent::Image(bitmap) => draw_image(layer, b, bitmap, page_h),
    }
}

fn draw_text(layer: &PdfLayerReference, fonts: &Fonts, b: &BoxModel, text: &TextElement, page_h: f32) {
    // ベースライン = ボックス上端 + フォントサイズ
    let baseline = page_h - b.y - pt_to_mm(text.font_size);
    let content = match text.face {
        FontFace::Symbol => text.text.clone(),
        _ => winansi_safe(&text.text),
    };
    layer.set_fill_color(to_color(text.color));
    layer.use_text(content, text.font_size, Mm(b.x), Mm(baseline), fonts.get(text.face));
}

fn draw_rect(layer: &PdfLayerReference, b: &BoxModel, rect: &RectElement, page_h: f32) {
    let mode = match (rect.fill, rect.stroke) {
        (Some(_), Some(_)) => PaintMode::FillStroke,
        (Some(_), None) => PaintMode::Fill,
        (None, Some(_)) => PaintMode::Stroke,
        (None, None) => return,
    };
    if let Some(fill) = rect.fill {
        layer.set_fill_color(to_color(fill));
    }
    if let Some(stroke) = rect.stroke {
        layer.set_outline_color(to_color(stroke));
        layer.set_outline_thickness(STROKE_WIDTH_PT);
    }

    let bottom = page_h - b.y - b.h;
    match rect.shape {
        RectShape::Box => {
            layer.add_rect(Rect::new(Mm(b.x), Mm(bottom), Mm(b.x + b.w), Mm(bottom + b.h)).with_mode(mode));
        }
        RectShape::Ellipse => {
            // 円（幅と高さの小さい方を直径にする）
            let radius = b.w.min(b.h) / 2.0;
            let points = calculate_points_for_circle(
                Mm(radius),
                Mm(b.x + b.w / 2.0),
                Mm(bottom + b.h / 2.0),
            );
            layer.add_polygon(Polygon {
                rings: vec![points],
                mode,
                winding_order: WindingOrder::NonZero,
            });
        }
    }
}

fn draw_image(layer: &PdfLayerReference, b: &BoxModel, bitmap: &Bitmap, page_h: f32) {
    let natural_w = bitmap.width as f32 * 25.4 / IMAGE_DPI;
    let natural_h = bitmap.height as f32 * 25.4 / IMAGE_DPI;
    if natural_w <= 0.0 || natural_h <= 0.0 {
        return;
    }

    let image = Image::from(ImageXObject {
        width: Px(bitmap.width as usize),
        height: Px(bitmap.height as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: bitmap.pixels.clone(),
        image_filter: None,
        smask: None,
        clipping_bbox: None,
    });

    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(b.x)),
            translate_y: Some(Mm(page_h - b.y - b.h)),
            scale_x: Some(b.w / natural_w),
            scale_y: Some(b.h / natural_h),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );
}
