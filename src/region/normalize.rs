use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Alignment, FontStyle, FontWeight, RawRegion, TextRegion, TextType};

pub const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_COLOR: &str = "#000000";

/// Validates untrusted region records into typed regions.
///
/// Entries that are not objects, or whose `text` is missing or blank, are
/// dropped. Every other field is coerced or defaulted so that nothing
/// downstream has to re-check it.
pub fn normalize_regions(raw: &[RawRegion]) -> Vec<TextRegion> {
    let mut regions: Vec<TextRegion> = Vec::with_capacity(raw.len());
    for (idx, entry) in raw.iter().enumerate() {
        let Some(record) = entry.as_object() else {
            debug!("dropping region #{}: not an object", idx);
            continue;
        };
        let Some(text) = text_field(record) else {
            debug!("dropping region #{}: empty text", idx);
            continue;
        };

        let x = number_field(record, "x").unwrap_or(0.0).max(0.0);
        let y = number_field(record, "y").unwrap_or(0.0).max(0.0);
        let width = number_field(record, "width").unwrap_or(0.0).max(0.0);
        let height = number_field(record, "height").unwrap_or(0.0).max(0.0);
        let font_size = positive_field(record, "font_size").unwrap_or(DEFAULT_FONT_SIZE);
        let color = record
            .get("color")
            .and_then(Value::as_str)
            .and_then(normalize_hex_color)
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        let font_weight = match record.get("font_weight") {
            Some(Value::String(value)) => FontWeight::parse(value),
            Some(Value::Number(value)) => value
                .as_u64()
                .map(|weight| FontWeight::parse(&weight.to_string()))
                .unwrap_or(FontWeight::Normal),
            _ => FontWeight::Normal,
        };
        let font_style = string_field(record, "font_style")
            .map(FontStyle::parse)
            .unwrap_or(FontStyle::Normal);
        let alignment = string_field(record, "alignment")
            .map(Alignment::parse)
            .unwrap_or(Alignment::Left);
        let text_type = match string_field(record, "text_type") {
            Some(value) => TextType::parse(value).unwrap_or(TextType::Body),
            None => infer_text_type(regions.len(), &text),
        };
        let font_family = string_field(record, "font_family")
            .map(|value| value.to_string())
            .unwrap_or_else(|| text_type.default_font_family().to_string());

        regions.push(TextRegion {
            text,
            x,
            y,
            width,
            height,
            color,
            font_size,
            font_weight,
            font_style,
            alignment,
            font_family,
            text_type,
        });
    }

    info!("found {} valid text regions", regions.len());
    for (idx, region) in regions.iter().enumerate() {
        info!(
            "text region {}: '{}' at ({}, {}) size {}x{}, color {}",
            idx + 1,
            region.text,
            region.x,
            region.y,
            region.width,
            region.height,
            region.color
        );
    }
    regions
}

fn text_field(record: &Map<String, Value>) -> Option<String> {
    let text = match record.get("text")? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn string_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn number_field(record: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match record.get(key)? {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => {
            let trimmed = raw.trim();
            let trimmed = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn positive_field(record: &Map<String, Value>, key: &str) -> Option<f64> {
    number_field(record, key).filter(|value| *value > 0.0)
}

/// Accepts `#rrggbb`, `#rgb` and `#rrggbbaa`; returns `#rrggbb`.
pub(crate) fn normalize_hex_color(value: &str) -> Option<String> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(format!("#{}", hex)),
        8 => Some(format!("#{}", &hex[..6])),
        3 => {
            let mut expanded = String::from("#");
            for ch in hex.chars() {
                expanded.push(ch);
                expanded.push(ch);
            }
            Some(expanded)
        }
        _ => None,
    }
}

fn infer_text_type(index: usize, text: &str) -> TextType {
    let short = text.chars().count() < 50;
    if index == 0 && short {
        if is_all_caps(text) {
            TextType::Title
        } else {
            TextType::Name
        }
    } else if index == 1 && short {
        if text.chars().count() > 20 {
            TextType::Subtitle
        } else {
            TextType::JobTitle
        }
    } else if text.contains(['"', '\u{201c}', '\u{201d}']) {
        TextType::Quote
    } else {
        TextType::Body
    }
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_hex6(value: &str) -> bool {
        regex::Regex::new("^#[0-9A-Fa-f]{6}$")
            .unwrap()
            .is_match(value)
    }

    #[test]
    fn drops_non_objects_and_blank_text() {
        let raw = vec![
            json!("just a string"),
            json!(42),
            json!({"text": ""}),
            json!({"text": "   "}),
            json!({"x": 10}),
            json!({"text": "kept"}),
        ];
        let regions = normalize_regions(&raw);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "kept");
    }

    #[test]
    fn coerces_numbers_and_applies_defaults() {
        let raw = vec![json!({
            "text": "Price",
            "x": "12.5",
            "y": "30px",
            "width": "wide",
            "height": null,
            "font_size": "huge",
        })];
        let region = &normalize_regions(&raw)[0];
        assert_eq!(region.x, 12.5);
        assert_eq!(region.y, 30.0);
        assert_eq!((region.width, region.height), (0.0, 0.0));
        assert_eq!(region.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(region.color, "#000000");
        assert_eq!(region.font_weight, FontWeight::Normal);
        assert_eq!(region.font_style, FontStyle::Normal);
        assert_eq!(region.alignment, Alignment::Left);
    }

    #[test]
    fn negative_positions_clamp_to_origin() {
        let raw = vec![json!({"text": "edge", "x": -4, "y": -0.5})];
        let region = &normalize_regions(&raw)[0];
        assert_eq!((region.x, region.y), (0.0, 0.0));
    }

    #[test]
    fn colors_always_match_six_digit_hex() {
        let inputs = [
            json!("#ff0000"),
            json!("#F0A"),
            json!("#11223344"),
            json!("#zzzzzz"),
            json!("#12345"),
            json!("red"),
            json!("#"),
            json!(255),
            json!(null),
        ];
        for color in inputs {
            let raw = vec![json!({"text": "c", "color": color.clone()})];
            let region = &normalize_regions(&raw)[0];
            assert!(is_hex6(&region.color), "{:?} -> {}", color, region.color);
        }
        assert_eq!(normalize_hex_color("#F0A").as_deref(), Some("#FF00AA"));
        assert_eq!(normalize_hex_color("#11223344").as_deref(), Some("#112233"));
    }

    #[test]
    fn numeric_fields_are_always_finite() {
        let garbage = [
            json!("NaN"),
            json!("inf"),
            json!([1, 2]),
            json!({"v": 1}),
            json!(true),
            json!("-12"),
            json!(1e308),
        ];
        for value in garbage {
            let raw = vec![json!({
                "text": "n",
                "x": value.clone(),
                "y": value.clone(),
                "width": value.clone(),
                "height": value.clone(),
                "font_size": value.clone(),
            })];
            let region = &normalize_regions(&raw)[0];
            for field in [region.x, region.y, region.width, region.height, region.font_size] {
                assert!(field.is_finite(), "{:?}", value);
            }
            assert!(region.width >= 0.0 && region.height >= 0.0);
            assert!(region.font_size > 0.0);
            assert!(region.x >= 0.0 && region.y >= 0.0);
        }
    }

    #[test]
    fn negative_sizes_clamp_to_zero() {
        let raw = vec![json!({"text": "shrunk", "width": -12, "height": "-3px", "font_size": -8})];
        let region = &normalize_regions(&raw)[0];
        assert_eq!((region.width, region.height), (0.0, 0.0));
        assert_eq!(region.font_size, DEFAULT_FONT_SIZE);
    }

    #[test]
    fn infers_text_type_from_position_and_content() {
        let raw = vec![
            json!({"text": "GRAND OPENING"}),
            json!({"text": "Downtown store"}),
            json!({"text": "\u{201c}Best coffee in town\u{201d} - a customer"}),
            json!({"text": "Open daily from nine to five, every day of the week."}),
        ];
        let regions = normalize_regions(&raw);
        let kinds = regions.iter().map(|r| r.text_type).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![TextType::Title, TextType::JobTitle, TextType::Quote, TextType::Body]
        );
        assert_eq!(regions[0].font_family, "Montserrat, sans-serif");
        assert_eq!(regions[2].font_family, "Georgia, serif");
    }

    #[test]
    fn explicit_style_fields_are_kept() {
        let raw = vec![json!({
            "text": "Jane Doe",
            "font_weight": 700,
            "font_style": "Italic",
            "alignment": "right",
            "font_family": "Arial",
            "text_type": "heading",
        })];
        let region = &normalize_regions(&raw)[0];
        assert_eq!(region.font_weight, FontWeight::Numeric(700));
        assert_eq!(region.font_style, FontStyle::Italic);
        assert_eq!(region.alignment, Alignment::Right);
        assert_eq!(region.font_family, "Arial");
        assert_eq!(region.text_type, TextType::Heading);
    }
}
