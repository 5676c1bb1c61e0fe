use tracing::info;

use super::{escape_xml, format_number};
use crate::region::{Alignment, TextRegion};

const BASELINE_RATIO: f64 = 0.8;

/// Baseline for a region whose box top is `y`.
pub fn baseline_y(region: &TextRegion) -> f64 {
    region.y + BASELINE_RATIO * region.font_size
}

pub fn anchor_x(region: &TextRegion) -> f64 {
    match region.alignment {
        Alignment::Left => region.x,
        Alignment::Center => region.x + region.width / 2.0,
        Alignment::Right => region.x + region.width,
    }
}

/// One `<text>` element for `region`, or `None` when its text is empty.
pub fn text_element(region: &TextRegion) -> Option<String> {
    let text = region.text.trim();
    if text.is_empty() {
        return None;
    }
    Some(format!(
        r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" font-weight="{weight}" font-style="{style}" fill="{fill}" text-anchor="{anchor}" dominant-baseline="auto" data-original-x="{ox}" data-original-y="{oy}" data-original-width="{ow}" data-original-height="{oh}" data-text-type="{kind}">{text}</text>"#,
        x = format_number(anchor_x(region)),
        y = format_number(baseline_y(region)),
        family = escape_xml(&region.font_family),
        size = format_number(region.font_size),
        weight = region.font_weight.as_svg(),
        style = region.font_style.as_svg(),
        fill = escape_xml(&region.color),
        anchor = region.alignment.text_anchor(),
        ox = format_number(region.x),
        oy = format_number(region.y),
        ow = format_number(region.width),
        oh = format_number(region.height),
        kind = region.text_type.as_str(),
        text = escape_xml(text),
    ))
}

/// Text layer markup, one element per line. Empty input yields `""`.
pub fn synthesize_text_layer(regions: &[TextRegion]) -> String {
    let elements = regions
        .iter()
        .filter_map(|region| {
            let element = text_element(region)?;
            info!(
                "text element '{}' at ({}, {})",
                preview(&region.text),
                format_number(anchor_x(region)),
                format_number(baseline_y(region))
            );
            Some(element)
        })
        .collect::<Vec<_>>();
    elements.join("\n")
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head = chars.by_ref().take(20).collect::<String>();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::normalize_regions;
    use serde_json::json;

    fn region(alignment: &str) -> TextRegion {
        normalize_regions(&[json!({
            "text": "SALE",
            "x": 50,
            "y": 50,
            "width": 120,
            "height": 40,
            "color": "#ff0000",
            "font_size": 32,
            "alignment": alignment,
        })])
        .remove(0)
    }

    #[test]
    fn anchors_follow_alignment() {
        let cases = [
            ("center", 110.0, "middle"),
            ("right", 170.0, "end"),
            ("left", 50.0, "start"),
            ("justify", 50.0, "start"),
        ];
        for (alignment, x, anchor) in cases {
            let region = region(alignment);
            assert_eq!(anchor_x(&region), x, "{}", alignment);
            assert_eq!(region.alignment.text_anchor(), anchor);
        }
    }

    #[test]
    fn baseline_tracks_font_size() {
        for size in [1.0, 12.0, 32.0, 250.5] {
            let mut region = region("left");
            region.font_size = size;
            assert_eq!(baseline_y(&region), 50.0 + 0.8 * size);
        }
    }

    #[test]
    fn renders_centered_element() {
        let element = text_element(&region("center")).unwrap();
        insta::assert_snapshot!(element, @r##"<text x="110" y="75.6" font-family="Montserrat, sans-serif" font-size="32" font-weight="normal" font-style="normal" fill="#ff0000" text-anchor="middle" dominant-baseline="auto" data-original-x="50" data-original-y="50" data-original-width="120" data-original-height="40" data-text-type="title">SALE</text>"##);
    }

    #[test]
    fn escapes_content_and_skips_blank_text() {
        let mut quoted = region("left");
        quoted.text = "Fish & <Chips>".to_string();
        let mut blank = region("left");
        blank.text = "  ".to_string();
        let layer = synthesize_text_layer(&[quoted, blank]);
        assert_eq!(layer.matches("<text").count(), 1);
        assert!(layer.contains(">Fish &amp; &lt;Chips&gt;</text>"));
    }

    #[test]
    fn empty_region_list_is_empty_markup() {
        assert_eq!(synthesize_text_layer(&[]), "");
    }
}
