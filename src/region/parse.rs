use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::RawRegion;
use crate::providers::strip_markdown_fence;

static EMBEDDED_ARRAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").ok());

static DESCRIBED_REGION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)Text: "(.*?)"\s*Position: \((\d+),\s*(\d+)\)\s*Dimensions: (\d+)x(\d+)\s*Color: (#[0-9A-Fa-f]{6})"#,
    )
    .ok()
});

const WRAPPER_FIELDS: &[&str] = &[
    "regions",
    "text_regions",
    "results",
    "text_elements",
    "elements",
    "texts",
];

/// Shape of a region-extraction reply, decided by the first strategy that
/// succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionPayload {
    /// A `[{...}]` array found somewhere inside the reply.
    EmbeddedArray(Vec<Value>),
    /// The whole reply is a JSON array.
    Array(Vec<Value>),
    /// The whole reply is an object carrying the regions in `field`.
    Wrapped { field: String, items: Vec<Value> },
    /// The whole reply is an object taken as one region.
    Single(Map<String, Value>),
    /// `Text: "..." Position: (x,y) Dimensions: WxH Color: #hex` prose.
    Described(Vec<Value>),
    Empty,
}

impl RegionPayload {
    pub fn classify(response: &str) -> Self {
        if let Some(items) = embedded_array(response) {
            return RegionPayload::EmbeddedArray(items);
        }

        let body = strip_markdown_fence(response);
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(items)) => return RegionPayload::Array(items),
            Ok(Value::Object(object)) => return classify_object(object),
            Ok(_) => {}
            Err(_) => debug!("region reply is not JSON; trying described form"),
        }

        let described = described_regions(response);
        if !described.is_empty() {
            return RegionPayload::Described(described);
        }
        RegionPayload::Empty
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            RegionPayload::EmbeddedArray(_) => "embedded-array",
            RegionPayload::Array(_) => "array",
            RegionPayload::Wrapped { .. } => "wrapped-object",
            RegionPayload::Single(_) => "single-object",
            RegionPayload::Described(_) => "described",
            RegionPayload::Empty => "empty",
        }
    }

    pub fn into_regions(self) -> Vec<RawRegion> {
        match self {
            RegionPayload::EmbeddedArray(items)
            | RegionPayload::Array(items)
            | RegionPayload::Described(items) => items,
            RegionPayload::Wrapped { items, .. } => items,
            RegionPayload::Single(object) => vec![Value::Object(object)],
            RegionPayload::Empty => Vec::new(),
        }
    }
}

/// Turns a free-text extraction reply into raw region records. Never fails;
/// an unusable reply yields an empty list.
pub fn parse_region_response(response: &str) -> Vec<RawRegion> {
    let payload = RegionPayload::classify(response);
    if matches!(payload, RegionPayload::Empty) {
        warn!(
            "could not extract structured text data from reply ({} bytes)",
            response.len()
        );
    } else {
        debug!("region reply parsed with {} strategy", payload.strategy());
    }
    payload.into_regions()
}

fn embedded_array(response: &str) -> Option<Vec<Value>> {
    let pattern = EMBEDDED_ARRAY.as_ref()?;
    let found = pattern.find(response)?;
    serde_json::from_str::<Vec<Value>>(found.as_str()).ok()
}

fn classify_object(object: Map<String, Value>) -> RegionPayload {
    let field = WRAPPER_FIELDS
        .iter()
        .map(|name| name.to_string())
        .find(|name| matches!(object.get(name), Some(Value::Array(_))))
        .or_else(|| {
            object
                .iter()
                .find(|(key, value)| key.to_lowercase().contains("region") && value.is_array())
                .map(|(key, _)| key.clone())
        });

    match field {
        Some(field) => {
            let items = match object.get(&field) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            RegionPayload::Wrapped { field, items }
        }
        None => RegionPayload::Single(object),
    }
}

fn described_regions(response: &str) -> Vec<Value> {
    let Some(pattern) = DESCRIBED_REGION.as_ref() else {
        return Vec::new();
    };
    pattern
        .captures_iter(response)
        .filter_map(|caps| {
            let number = |idx: usize| caps.get(idx)?.as_str().parse::<u32>().ok();
            Some(json!({
                "text": caps.get(1)?.as_str(),
                "x": number(2)?,
                "y": number(3)?,
                "width": number(4)?,
                "height": number(5)?,
                "color": caps.get(6)?.as_str(),
                "font_size": 16,
                "font_weight": "normal",
                "font_style": "normal",
                "alignment": "left",
                "font_family": "Arial",
                "text_type": "body",
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_array_inside_prose() {
        let reply = r#"Here you go: [{"text": "SALE", "x": 1}] hope it helps"#;
        let payload = RegionPayload::classify(reply);
        assert_eq!(payload.strategy(), "embedded-array");
        assert_eq!(payload.into_regions().len(), 1);
    }

    #[test]
    fn unwraps_known_wrapper_fields() {
        let payload = RegionPayload::classify(r#"{"text_regions": []}"#);
        assert_eq!(
            payload,
            RegionPayload::Wrapped {
                field: "text_regions".to_string(),
                items: Vec::new()
            }
        );

        let payload = RegionPayload::classify(r#"{"detected_regions": [{"text": "A"}, 3]}"#);
        assert_eq!(payload.strategy(), "wrapped-object");
        assert_eq!(payload.into_regions().len(), 2);
    }

    #[test]
    fn single_object_becomes_one_region() {
        let regions = parse_region_response(r#"{"text": "Hello", "x": 4, "y": 5}"#);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0]["text"], "Hello");
    }

    #[test]
    fn fenced_object_is_parsed() {
        let reply = "```json\n{\"results\": [{\"text\": \"Hi\"}]}\n```";
        let payload = RegionPayload::classify(reply);
        assert_eq!(payload.strategy(), "embedded-array");
        let payload = RegionPayload::classify("```json\n{\"results\": []}\n```");
        assert_eq!(payload.strategy(), "wrapped-object");
    }

    #[test]
    fn falls_back_to_described_regions() {
        let reply = "I found:\nText: \"OPEN\" Position: (10, 20) Dimensions: 80x24 Color: #112233\n\
                     Text: \"Daily\" Position: (10,60) Dimensions: 50x12 Color: #AABBCC";
        let regions = parse_region_response(reply);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0]["text"], "OPEN");
        assert_eq!(regions[0]["width"], 80);
        assert_eq!(regions[1]["y"], 60);
        assert_eq!(regions[1]["color"], "#AABBCC");
    }

    #[test]
    fn prose_without_structure_is_empty() {
        let reply = "I could not find any legible text in this picture, sorry.";
        assert_eq!(RegionPayload::classify(reply), RegionPayload::Empty);
        assert!(parse_region_response(reply).is_empty());
    }

    #[test]
    fn broken_embedded_array_falls_through() {
        let reply = r#"{"regions": [{"text": "A"}], "note": "[{broken}]"}"#;
        let payload = RegionPayload::classify(reply);
        assert_eq!(payload.strategy(), "wrapped-object");
        assert_eq!(payload.into_regions().len(), 1);
    }
}
