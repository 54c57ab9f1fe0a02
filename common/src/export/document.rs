//! ページ・配置要素のドキュメントモデル
//!
//! レポートはページの列、ページは配置要素の列。
//! PDFへの書き出しはこのモデルだけを見て行う。

use crate::layout::BoxModel;

/// 8bit RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 0.0..=1.0 の成分
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

pub mod palette {
    use super::Rgb8;

    pub const BRAND: Rgb8 = Rgb8::new(30, 64, 124);
    pub const TEXT: Rgb8 = Rgb8::new(33, 37, 41);
    pub const MUTED: Rgb8 = Rgb8::new(108, 117, 125);
    pub const WHITE: Rgb8 = Rgb8::new(255, 255, 255);
    pub const BORDER: Rgb8 = Rgb8::new(206, 212, 218);
    pub const TRACK: Rgb8 = Rgb8::new(233, 236, 239);
    pub const PANEL: Rgb8 = Rgb8::new(248, 249, 250);
    pub const POSITIVE: Rgb8 = Rgb8::new(40, 167, 69);
    pub const WARNING: Rgb8 = Rgb8::new(255, 193, 7);
    pub const NEGATIVE: Rgb8 = Rgb8::new(220, 53, 69);
    pub const NO_DATA: Rgb8 = Rgb8::new(173, 181, 189);
}

/// キャプチャ済みビットマップ（RGB8、行優先）
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// 画素数と長さが合わない場合は None
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 3;
        (width > 0 && height > 0 && pixels.len() == expected).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// 単色ビットマップ
    pub fn solid(width: u32, height: u32, color: Rgb8) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&[color.r, color.g, color.b]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
    /// ZapfDingbats（アイコン用）
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub text: String,
    pub font_size: f32,
    pub face: FontFace,
    pub color: Rgb8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectShape {
    Box,
    Ellipse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectElement {
    pub fill: Option<Rgb8>,
    pub stroke: Option<Rgb8>,
    pub shape: RectShape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementContent {
    Text(TextElement),
    Rect(RectElement),
    Image(Bitmap),
}

/// 配置済み要素（テキストはボックス上端 + フォントサイズの位置がベースライン）
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedElement {
    pub box_model: BoxModel,
    pub content: ElementContent,
}

impl PlacedElement {
    pub fn text(x: f32, y: f32, w: f32, text: impl Into<String>, font_size: f32, face: FontFace, color: Rgb8) -> Self {
        Self {
            box_model: BoxModel::new(x, y, w, crate::layout::pt_to_mm(font_size) * 1.2),
            content: ElementContent::Text(TextElement {
                text: text.into(),
                font_size,
                face,
                color,
            }),
        }
    }

    pub fn rect(box_model: BoxModel, fill: Option<Rgb8>, stroke: Option<Rgb8>) -> Self {
        Self {
            box_model,
            content: ElementContent::Rect(RectElement {
                fill,
                stroke,
                shape: RectShape::Box,
            }),
        }
    }

    pub fn ellipse(box_model: BoxModel, fill: Rgb8) -> Self {
        Self {
            box_model,
            content: ElementContent::Rect(RectElement {
                fill: Some(fill),
                stroke: None,
                shape: RectShape::Ellipse,
            }),
        }
    }

    pub fn image(box_model: BoxModel, bitmap: Bitmap) -> Self {
        Self {
            box_model,
            content: ElementContent::Image(bitmap),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ElementContent::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.content, ElementContent::Image(_))
    }
}

/// ページ種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    Title,
    Kpi,
    Profile,
    Chart { element_id: String },
    Map,
    Listings { first_index: usize, count: usize },
    Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1始まりの通し番号
    pub number: usize,
    pub kind: PageKind,
    pub elements: Vec<PlacedElement>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| e.as_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub title: String,
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub pages: Vec<Page>,
}

impl ReportDocument {
    pub fn page_kinds(&self) -> Vec<PageKind> {
        self.pages.iter().map(|p| p.kind.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_from_rgb8_checks_length() {
        assert!(Bitmap::from_rgb8(2, 2, vec![0; 12]).is_some());
        assert!(Bitmap::from_rgb8(2, 2, vec![0; 11]).is_none());
        assert!(Bitmap::from_rgb8(0, 2, vec![]).is_none());
    }

    #[test]
    fn test_solid_bitmap() {
        let bmp = Bitmap::solid(3, 2, palette::BRAND);
        assert_eq!(bmp.pixels.len(), 18);
        assert_eq!(&bmp.pixels[..3], &[30, 64, 124]);
    }

    #[test]
    fn test_rgb_unit() {
        let (r, g, b) = palette::WHITE.to_unit();
        assert_eq!((r, g, b), (1.0, 1.0, 1.0));
    }
}
