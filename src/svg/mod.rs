mod compose;
mod text;

use quick_xml::events::Event;
use quick_xml::Reader;

pub use compose::{compose_layers, validate_merged, Composer, Compositor, ModelCompositor};
pub use text::{anchor_x, baseline_y, synthesize_text_layer, text_element};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const DEFAULT_VIEW_BOX: &str = "0 0 1080 1080";
pub const DEFAULT_SIZE: &str = "1080";

/// Root `<svg>` element of a document: its viewport attributes and the raw
/// markup between the root tags.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgRoot {
    pub view_box: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub inner: String,
    attr_offset: usize,
}

impl SvgRoot {
    pub fn view_box_or_default(&self) -> &str {
        self.view_box.as_deref().unwrap_or(DEFAULT_VIEW_BOX)
    }

    pub fn width_or_default(&self) -> &str {
        self.width.as_deref().unwrap_or(DEFAULT_SIZE)
    }

    pub fn height_or_default(&self) -> &str {
        self.height.as_deref().unwrap_or(DEFAULT_SIZE)
    }
}

/// Locates the root `<svg>` element. Returns `None` when the document does
/// not start (after prolog, comments and whitespace) with an svg root.
pub fn parse_svg_root(svg: &str) -> Option<SvgRoot> {
    let mut reader = Reader::from_str(svg);
    reader.trim_text(false);
    loop {
        let tag_start = reader.buffer_position();
        let (start, self_closing) = match reader.read_event() {
            Ok(Event::Start(start)) => (start, false),
            Ok(Event::Empty(start)) => (start, true),
            Ok(Event::Decl(_) | Event::Comment(_) | Event::DocType(_) | Event::PI(_)) => continue,
            Ok(Event::Text(text)) if text.iter().all(u8::is_ascii_whitespace) => continue,
            _ => return None,
        };
        if start.local_name().as_ref() != b"svg" {
            return None;
        }

        let mut root = SvgRoot {
            view_box: None,
            width: None,
            height: None,
            inner: String::new(),
            attr_offset: tag_start + 1 + start.name().as_ref().len(),
        };
        for attr in start.attributes().flatten() {
            let Ok(value) = attr.unescape_value() else {
                continue;
            };
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match attr.key.as_ref() {
                b"viewBox" => root.view_box = Some(value),
                b"width" => root.width = Some(value),
                b"height" => root.height = Some(value),
                _ => {}
            }
        }
        if !self_closing {
            let inner_start = reader.buffer_position();
            let inner_end = svg.rfind("</svg>")?;
            if inner_end < inner_start {
                return None;
            }
            root.inner = svg[inner_start..inner_end].to_string();
        }
        return Some(root);
    }
}

/// Adds `viewBox="0 0 {width} {height}"` to a root that lacks one.
pub fn ensure_view_box(svg: &str, width: u32, height: u32) -> String {
    match parse_svg_root(svg) {
        Some(root) if root.view_box.is_none() => {
            let mut patched = String::with_capacity(svg.len() + 32);
            patched.push_str(&svg[..root.attr_offset]);
            patched.push_str(&format!(r#" viewBox="0 0 {} {}""#, width, height));
            patched.push_str(&svg[root.attr_offset..]);
            patched
        }
        _ => svg.to_string(),
    }
}

/// Shortest decimal form with at most three fractional digits.
pub fn format_number(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

pub fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
