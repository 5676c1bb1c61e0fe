use std::time::Instant;
use tracing::{info, warn};

use super::{escape_xml, parse_svg_root, SVG_NS, XLINK_NS};
use crate::pipeline::StageFuture;
use crate::providers::{strip_markdown_fence, ChatOptions, OpenAI};

const FONT_IMPORTS: &[&str] = &[
    "https://fonts.googleapis.com/css2?family=Montserrat:wght@400;700&display=swap",
    "https://fonts.googleapis.com/css2?family=Open+Sans:wght@400;600&display=swap",
    "https://fonts.googleapis.com/css2?family=Roboto:wght@300;400;500;700&display=swap",
    "https://fonts.googleapis.com/css2?family=Lato:wght@400;700&display=swap",
];

const MERGE_SYSTEM_PROMPT: &str = "You combine two SVG documents into one. The first holds text \
elements, the second holds traced paths. Keep every path and every text element, use the larger \
viewBox and dimensions of the two, declare the SVG namespace, and draw all paths before any text. \
Reply with the combined SVG only.";

/// Merges a traced path document and a text layer into one document.
/// Composition never fails; a degraded result is returned instead.
pub trait Compositor: Send + Sync {
    fn name(&self) -> &'static str;
    fn compose<'a>(&'a self, paths_svg: &'a str, text_layer: &'a str) -> StageFuture<'a, String>;
}

#[derive(Debug, Clone)]
pub enum Composer {
    Structural,
    Model(ModelCompositor),
}

impl Compositor for Composer {
    fn name(&self) -> &'static str {
        match self {
            Composer::Structural => "structural",
            Composer::Model(inner) => inner.name(),
        }
    }

    fn compose<'a>(&'a self, paths_svg: &'a str, text_layer: &'a str) -> StageFuture<'a, String> {
        match self {
            Composer::Structural => {
                let merged = compose_layers(paths_svg, text_layer);
                Box::pin(async move { merged })
            }
            Composer::Model(inner) => inner.compose(paths_svg, text_layer),
        }
    }
}

/// Deterministic composition: the traced root's viewport, a font `<defs>`
/// block, the path group, then the text group.
///
/// When `paths_svg` has no parsable `<svg>` root it is returned unchanged and
/// the text layer is lost.
pub fn compose_layers(paths_svg: &str, text_layer: &str) -> String {
    let Some(root) = parse_svg_root(paths_svg) else {
        warn!("could not extract SVG content; returning traced document unchanged");
        return paths_svg.to_string();
    };

    let view_box = escape_xml(root.view_box_or_default());
    let width = escape_xml(root.width_or_default());
    let height = escape_xml(root.height_or_default());

    let mut svg = String::with_capacity(paths_svg.len() + text_layer.len() + 1024);
    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
    svg.push_str(&format!(
        r#"<svg xmlns="{ns}" xmlns:xlink="{xlink}" viewBox="{view_box}" width="{width}" height="{height}">"#,
        ns = SVG_NS,
        xlink = XLINK_NS,
    ));
    svg.push('\n');
    svg.push_str("  <defs>\n    <style type=\"text/css\">\n");
    for url in FONT_IMPORTS {
        svg.push_str(&format!("      @import url(\"{}\");\n", escape_xml(url)));
    }
    svg.push_str("      .text-content { font-family: inherit; }\n");
    svg.push_str("    </style>\n  </defs>\n");
    svg.push_str("  <g id=\"vectorized-content\">\n");
    svg.push_str(root.inner.trim());
    svg.push_str("\n  </g>\n");
    svg.push_str("  <g id=\"text-content\" class=\"text-content\">\n");
    svg.push_str(text_layer.trim());
    svg.push_str("\n  </g>\n</svg>\n");

    let has_vector = !root.inner.trim().is_empty();
    let has_text = text_layer.contains("<text");
    match (has_vector, has_text) {
        (true, true) => info!("combined SVG carries vectorized content and text elements"),
        (true, false) => info!("combined SVG carries vectorized content but no text elements"),
        (false, true) => info!("combined SVG carries text elements but no vectorized content"),
        (false, false) => warn!("combined SVG is missing both vectorized content and text"),
    }
    svg
}

/// Accepts a model-merged document only if it is an SVG that kept whatever
/// paths and text the inputs had, with every path drawn before the first
/// text element.
pub fn validate_merged(merged: &str, paths_svg: &str, text_layer: &str) -> Result<(), String> {
    if !(merged.starts_with("<?xml") || merged.starts_with("<svg")) {
        return Err("reply does not start with an XML or SVG header".to_string());
    }
    if parse_svg_root(merged).is_none() {
        return Err("reply has no parsable <svg> root".to_string());
    }
    if paths_svg.contains("<path") && !merged.contains("<path") {
        return Err("traced paths were dropped".to_string());
    }
    if text_layer.contains("<text") && !merged.contains("<text") {
        return Err("text elements were dropped".to_string());
    }
    if let (Some(last_path), Some(first_text)) = (merged.rfind("<path"), merged.find("<text"))
        && last_path > first_text
    {
        return Err("text is drawn before paths".to_string());
    }
    Ok(())
}

/// Model-assisted composition; falls back to [`compose_layers`] whenever
/// the call fails or the reply does not validate.
#[derive(Debug, Clone)]
pub struct ModelCompositor {
    client: OpenAI,
    max_tokens: u32,
}

impl ModelCompositor {
    pub fn new(client: OpenAI) -> Self {
        Self {
            client,
            max_tokens: 23_000,
        }
    }

    async fn merge(&self, paths_svg: &str, text_layer: &str) -> String {
        let text_svg = match parse_svg_root(paths_svg) {
            Some(root) => format!(
                r#"<svg xmlns="{}" viewBox="{}">{}</svg>"#,
                SVG_NS,
                escape_xml(root.view_box_or_default()),
                text_layer
            ),
            None => format!(r#"<svg xmlns="{}">{}</svg>"#, SVG_NS, text_layer),
        };
        let input = format!(
            "Text SVG:\n{}\n\nTraced SVG:\n{}\n\nCombine these SVGs into one, keeping all visual elements from both.",
            text_svg, paths_svg
        );
        info!(
            "compose: input sizes text {} bytes, traced {} bytes",
            text_svg.len(),
            paths_svg.len()
        );

        let started = Instant::now();
        let reply = self
            .client
            .clone()
            .append_system_input(MERGE_SYSTEM_PROMPT)
            .append_user_input(input)
            .complete(
                "compose",
                ChatOptions {
                    temperature: Some(1.0),
                    max_tokens: Some(self.max_tokens),
                    json_object: false,
                },
            )
            .await;

        let merged = match reply {
            Ok(completion) => strip_markdown_fence(&completion.content).to_string(),
            Err(err) => {
                warn!(
                    "compose: model merge failed after {:.2}s, using structural merge: {}",
                    started.elapsed().as_secs_f32(),
                    err
                );
                return compose_layers(paths_svg, text_layer);
            }
        };
        if merged.len() < (text_svg.len() + paths_svg.len()) / 2 {
            warn!(
                "compose: merged SVG ({} bytes) is unusually small compared to inputs",
                merged.len()
            );
        }
        match validate_merged(&merged, paths_svg, text_layer) {
            Ok(()) => {
                info!(
                    "compose: model merge accepted ({} bytes, {:.2}s)",
                    merged.len(),
                    started.elapsed().as_secs_f32()
                );
                merged
            }
            Err(reason) => {
                warn!("compose: rejecting model merge ({}); using structural merge", reason);
                compose_layers(paths_svg, text_layer)
            }
        }
    }
}

impl Compositor for ModelCompositor {
    fn name(&self) -> &'static str {
        "model"
    }

    fn compose<'a>(&'a self, paths_svg: &'a str, text_layer: &'a str) -> StageFuture<'a, String> {
        Box::pin(self.merge(paths_svg, text_layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACED: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<svg version="1.1" xmlns="http://www.w3.org/2000/svg" width="400" height="200" viewBox="0 0 400 200"><path id="p1" d="M0 0 L10 0 Z" fill="#112233"/></svg>"##;
    const TEXT: &str = r#"<text x="10" y="20">Hi</text>"#;

    #[test]
    fn path_group_precedes_text_group() {
        let merged = compose_layers(TRACED, TEXT);
        let vector = merged.find(r#"<g id="vectorized-content">"#).unwrap();
        let text = merged.find(r#"<g id="text-content""#).unwrap();
        assert!(vector < text);
        assert!(merged.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(merged.contains(r#"viewBox="0 0 400 200""#));
    }

    #[test]
    fn keeps_path_ids_and_places_text_after_closed_group() {
        let merged = compose_layers(TRACED, TEXT);
        assert!(merged.contains(r#"id="p1""#));
        assert!(merged.contains(r##"<path id="p1" d="M0 0 L10 0 Z" fill="#112233"/>"##));
        let group_close = merged.find("</g>").unwrap();
        let path = merged.find(r#"<path id="p1""#).unwrap();
        let text = merged.find("<text").unwrap();
        assert!(path < group_close && group_close < text);
        assert!(parse_svg_root(&merged).is_some());
    }

    #[test]
    fn defaults_missing_viewport() {
        let merged = compose_layers(r#"<svg xmlns="http://www.w3.org/2000/svg"><path/></svg>"#, "");
        assert!(merged.contains(r#"viewBox="0 0 1080 1080" width="1080" height="1080""#));
    }

    #[test]
    fn empty_text_layer_keeps_empty_group() {
        let merged = compose_layers(TRACED, "");
        assert!(merged.contains("<g id=\"text-content\" class=\"text-content\">\n\n  </g>"));
        assert!(!merged.contains("<text"));
    }

    #[test]
    fn unparsable_paths_are_returned_unchanged() {
        let broken = "tracer said no";
        assert_eq!(compose_layers(broken, TEXT), broken);
    }

    #[test]
    fn validation_rejects_bad_merges() {
        let good = compose_layers(TRACED, TEXT);
        assert_eq!(validate_merged(&good, TRACED, TEXT), Ok(()));
        assert!(validate_merged("Sure! Here it is", TRACED, TEXT).is_err());
        let no_text = compose_layers(TRACED, "");
        assert!(validate_merged(&no_text, TRACED, TEXT).is_err());
        let reversed = r#"<svg xmlns="http://www.w3.org/2000/svg"><text>Hi</text><path d="M0 0"/></svg>"#;
        assert_eq!(
            validate_merged(reversed, TRACED, TEXT),
            Err("text is drawn before paths".to_string())
        );
    }

    #[tokio::test]
    async fn structural_composer_matches_compose_layers() {
        let composer = Composer::Structural;
        assert_eq!(composer.name(), "structural");
        assert_eq!(composer.compose(TRACED, TEXT).await, compose_layers(TRACED, TEXT));
    }
}
