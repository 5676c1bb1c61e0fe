mod normalize;
mod parse;

use serde::Serialize;

pub use normalize::{normalize_regions, DEFAULT_FONT_SIZE};
pub use parse::{parse_region_response, RegionPayload};

/// Untrusted region record as returned by a model or OCR pass.
pub type RawRegion = serde_json::Value;

/// A validated text occurrence. Only the normalizer builds these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub font_size: f64,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub alignment: Alignment,
    pub font_family: String,
    pub text_type: TextType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FontWeight {
    Normal,
    Bold,
    Lighter,
    Bolder,
    Numeric(u16),
}

impl FontWeight {
    pub(crate) fn parse(value: &str) -> Self {
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            "bold" | "semibold" | "semi-bold" | "extrabold" | "extra-bold" | "black" | "heavy" => {
                FontWeight::Bold
            }
            "lighter" | "light" | "thin" => FontWeight::Lighter,
            "bolder" => FontWeight::Bolder,
            _ => match lower.parse::<u16>() {
                Ok(weight) if (100..=900).contains(&weight) && weight % 100 == 0 => {
                    FontWeight::Numeric(weight)
                }
                _ => FontWeight::Normal,
            },
        }
    }

    pub fn as_svg(&self) -> String {
        match self {
            FontWeight::Normal => "normal".to_string(),
            FontWeight::Bold => "bold".to_string(),
            FontWeight::Lighter => "lighter".to_string(),
            FontWeight::Bolder => "bolder".to_string(),
            FontWeight::Numeric(weight) => weight.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FontStyle {
    Normal,
    Italic,
}

impl FontStyle {
    pub(crate) fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "italic" | "oblique" => FontStyle::Italic,
            _ => FontStyle::Normal,
        }
    }

    pub fn as_svg(&self) -> &'static str {
        match self {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub(crate) fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "center" | "centre" | "middle" => Alignment::Center,
            "right" | "end" => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    /// SVG `text-anchor` keyword for this alignment.
    pub fn text_anchor(&self) -> &'static str {
        match self {
            Alignment::Left => "start",
            Alignment::Center => "middle",
            Alignment::Right => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextType {
    Title,
    Subtitle,
    Heading,
    Body,
    Name,
    JobTitle,
    Quote,
    Button,
    Label,
}

impl TextType {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace([' ', '-'], "_");
        let kind = match normalized.as_str() {
            "title" => TextType::Title,
            "subtitle" => TextType::Subtitle,
            "heading" | "header" | "headline" => TextType::Heading,
            "body" | "paragraph" | "text" => TextType::Body,
            "name" => TextType::Name,
            "job_title" | "jobtitle" | "role" => TextType::JobTitle,
            "quote" | "testimonial" => TextType::Quote,
            "button" | "cta" => TextType::Button,
            "label" | "caption" => TextType::Label,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextType::Title => "title",
            TextType::Subtitle => "subtitle",
            TextType::Heading => "heading",
            TextType::Body => "body",
            TextType::Name => "name",
            TextType::JobTitle => "job_title",
            TextType::Quote => "quote",
            TextType::Button => "button",
            TextType::Label => "label",
        }
    }

    /// Font stack used when a region does not name its own family.
    pub fn default_font_family(&self) -> &'static str {
        match self {
            TextType::Title | TextType::Subtitle | TextType::Heading | TextType::Name => {
                DISPLAY_FAMILY
            }
            TextType::Body | TextType::JobTitle | TextType::Button | TextType::Label => {
                HUMANIST_FAMILY
            }
            TextType::Quote => SERIF_FAMILY,
        }
    }
}

pub const DISPLAY_FAMILY: &str = "Montserrat, sans-serif";
pub const HUMANIST_FAMILY: &str = "Open Sans, sans-serif";
pub const SERIF_FAMILY: &str = "Georgia, serif";

impl TextRegion {
    /// Box grown by `padding` on every side and clamped to the image.
    /// Returns `(x0, y0, x1, y1)` with exclusive upper bounds.
    pub fn padded_bounds(
        &self,
        padding: u32,
        width: u32,
        height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let pad = padding as f64;
        let x0 = (self.x - pad).max(0.0).floor();
        let y0 = (self.y - pad).max(0.0).floor();
        let x1 = (self.x + self.width + pad).min(width as f64).ceil();
        let y1 = (self.y + self.height + pad).min(height as f64).ceil();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f64, y: f64, width: f64, height: f64) -> TextRegion {
        TextRegion {
            text: "HELLO".to_string(),
            x,
            y,
            width,
            height,
            color: "#000000".to_string(),
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            alignment: Alignment::Left,
            font_family: HUMANIST_FAMILY.to_string(),
            text_type: TextType::Body,
        }
    }

    #[test]
    fn padded_bounds_clamp_at_image_edges() {
        let bounds = region(1.0, 0.0, 10.0, 5.0).padded_bounds(2, 10, 10);
        assert_eq!(bounds, Some((0, 0, 10, 7)));
    }

    #[test]
    fn padded_bounds_outside_image_is_none() {
        assert_eq!(region(50.0, 50.0, 10.0, 5.0).padded_bounds(2, 20, 20), None);
    }

    #[test]
    fn alignment_maps_to_anchor() {
        assert_eq!(Alignment::parse("Center").text_anchor(), "middle");
        assert_eq!(Alignment::parse("right").text_anchor(), "end");
        assert_eq!(Alignment::parse("justify").text_anchor(), "start");
    }

    #[test]
    fn font_weight_accepts_numeric_steps() {
        assert_eq!(FontWeight::parse("700"), FontWeight::Numeric(700));
        assert_eq!(FontWeight::parse("750"), FontWeight::Normal);
        assert_eq!(FontWeight::parse("Bold"), FontWeight::Bold);
    }

    #[test]
    fn text_type_families() {
        assert_eq!(TextType::Quote.default_font_family(), SERIF_FAMILY);
        assert_eq!(TextType::Name.default_font_family(), DISPLAY_FAMILY);
        assert_eq!(TextType::Button.default_font_family(), HUMANIST_FAMILY);
    }
}
