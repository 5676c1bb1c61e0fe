use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::providers::{ChatOptions, OpenAI};

const SUITABILITY_PROMPT: &str = "You are a vector graphics expert. Decide whether the design \
request suits SVG vector graphics. Logos, icons, flat illustrations, typography and geometric \
designs suit it; photorealism, complex textures, dense detail and 3D renderings do not. If the \
request is not suitable, say \"not suitable\" and give guidance.";

const PLANNER_PROMPT: &str = "You are a design planner. Write a structured, practical plan for \
the request: goals and audience, layout and key components, typography, color scheme, visual \
hierarchy, and SVG-specific technical considerations.";

const KNOWLEDGE_PROMPT: &str = "You are a design knowledge expert. From the plan and request, \
give actionable best practices for typography, color and contrast, layout and white space, and \
SVG element organization.";

const PRE_ENHANCER_PROMPT: &str = "You are a design prompt enhancer. Turn the design context \
into a detailed specification of layout, typography, colors and visual elements for a flat, \
vector-friendly image, keeping the original intent.";

const ENHANCER_PROMPT: &str = "You optimize a design specification into a single image \
generation prompt for a clean, flat, vector-friendly graphic with crisp shapes and legible text. \
Reply with the prompt only.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suitability {
    pub suitable: bool,
    pub guidance: Option<String>,
}

/// Outcome of the prompt stages ahead of image generation.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPrompt {
    pub original: String,
    pub plan: String,
    pub knowledge: String,
    pub pre_enhanced: String,
    pub enhanced: String,
    pub skipped_enhancement: bool,
}

impl PreparedPrompt {
    /// Prompt handed to the image generator.
    pub fn generation_prompt(&self) -> &str {
        &self.enhanced
    }
}

/// Chat-model stages that turn a free-text request into a generation prompt.
#[derive(Debug, Clone)]
pub struct DesignStages {
    client: OpenAI,
}

impl DesignStages {
    pub fn new(client: OpenAI) -> Self {
        Self { client }
    }

    async fn ask(&self, stage: &str, system: &str, user: String, max_tokens: u32) -> Result<String> {
        info!("{}: using model {}", stage, self.client.model());
        let completion = self
            .client
            .clone()
            .append_system_input(system)
            .append_user_input(user)
            .complete(
                stage,
                ChatOptions {
                    temperature: Some(0.7),
                    max_tokens: Some(max_tokens),
                    json_object: false,
                },
            )
            .await?;
        log_head(stage, &completion.content);
        Ok(completion.content)
    }

    /// A failed check counts as suitable.
    pub async fn check_vector_suitability(&self, prompt: &str) -> Suitability {
        match self
            .ask("vector_suitability", SUITABILITY_PROMPT, prompt.to_string(), 500)
            .await
        {
            Ok(reply) => classify_suitability(&reply),
            Err(err) => {
                warn!("vector suitability check failed; allowing request: {}", err);
                Suitability {
                    suitable: true,
                    guidance: None,
                }
            }
        }
    }

    pub async fn plan_design(&self, prompt: &str) -> String {
        self.ask("design_plan", PLANNER_PROMPT, prompt.to_string(), 1000)
            .await
            .unwrap_or_else(|err| {
                warn!("design planning failed: {}", err);
                "Error in design planning".to_string()
            })
    }

    pub async fn generate_design_knowledge(&self, plan: &str, prompt: &str) -> String {
        let user = format!("Design Plan:\n{}\n\nUser Request:\n{}", plan, prompt);
        self.ask("design_knowledge", KNOWLEDGE_PROMPT, user, 1500)
            .await
            .unwrap_or_else(|err| {
                warn!("design knowledge generation failed: {}", err);
                "Error in generating design knowledge".to_string()
            })
    }

    pub async fn pre_enhance_prompt(&self, context: &str) -> Result<String> {
        self.ask("pre_enhancement", PRE_ENHANCER_PROMPT, context.to_string(), 1500)
            .await
    }

    pub async fn enhance_prompt(&self, pre_enhanced: &str) -> Result<String> {
        self.ask("prompt_enhancement", ENHANCER_PROMPT, pre_enhanced.to_string(), 2000)
            .await
    }

    /// Plan and knowledge always run; the two enhancement passes are
    /// replaced by the original prompt when `skip_enhancement` is set.
    pub async fn prepare_prompt(&self, prompt: &str, skip_enhancement: bool) -> Result<PreparedPrompt> {
        let plan = self.plan_design(prompt).await;
        let knowledge = self.generate_design_knowledge(&plan, prompt).await;
        let context = design_context(&plan, &knowledge, prompt);

        let (pre_enhanced, enhanced) = if skip_enhancement {
            info!("enhancement skipped; using the original prompt");
            (prompt.to_string(), prompt.to_string())
        } else {
            let pre = self.pre_enhance_prompt(&context).await?;
            let enhanced = self.enhance_prompt(&pre).await?;
            (pre, enhanced)
        };
        Ok(PreparedPrompt {
            original: prompt.to_string(),
            plan,
            knowledge,
            pre_enhanced,
            enhanced,
            skipped_enhancement: skip_enhancement,
        })
    }
}

pub fn design_context(plan: &str, knowledge: &str, prompt: &str) -> String {
    format!(
        "Design Plan:\n{}\n\nDesign Knowledge and Best Practices:\n{}\n\nOriginal Request:\n{}",
        plan, knowledge, prompt
    )
}

pub fn classify_suitability(reply: &str) -> Suitability {
    let lower = reply.to_lowercase();
    if lower.contains("not suitable") || lower.contains("unsuitable") {
        Suitability {
            suitable: false,
            guidance: Some(reply.trim().to_string()),
        }
    } else {
        Suitability {
            suitable: true,
            guidance: None,
        }
    }
}

fn log_head(stage: &str, content: &str) {
    for line in content.lines().take(10) {
        info!("{}:   {}", stage, line);
    }
}
