use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use llm_svg_rust::settings::{CompositorKind, EraserKind, ExtractorKind};

#[derive(Parser, Debug)]
#[command(
    name = "llm-svg-rust",
    version,
    about = "Generate editable SVG graphics with real text from prompts or images"
)]
struct Cli {
    /// Design request (read from stdin when omitted)
    prompt: Option<String>,

    /// Vectorize an existing image instead of generating one
    #[arg(long = "image")]
    image: Option<PathBuf>,

    /// Write the SVG to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Also write a rendered PNG preview
    #[arg(long = "png")]
    png: Option<PathBuf>,

    /// Use the prompt as-is for image generation
    #[arg(long = "skip-enhancement")]
    skip_enhancement: bool,

    /// Text region extraction strategy
    #[arg(long = "extractor", value_enum)]
    extractor: Option<ExtractorKind>,

    /// Text removal strategy
    #[arg(long = "eraser", value_enum)]
    eraser: Option<EraserKind>,

    /// Layer merge strategy
    #[arg(long = "compositor", value_enum)]
    compositor: Option<CompositorKind>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Run the HTTP API on this address (e.g. 127.0.0.1:5000)
    #[arg(long = "server")]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    llm_svg_rust::logging::init(cli.verbose)?;

    let config = llm_svg_rust::Config {
        key: cli.key.clone(),
        settings_path: cli.read_settings.clone(),
        skip_enhancement: cli.skip_enhancement,
        extractor: cli.extractor,
        eraser: cli.eraser,
        compositor: cli.compositor,
        image: cli.image.clone(),
    };

    if let Some(addr) = cli.server.as_deref() {
        return run_server(&config, addr).await;
    }

    let input = match cli.prompt.clone() {
        Some(prompt) => Some(prompt),
        None if cli.image.is_some() && io::stdin().is_terminal() => None,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .with_context(|| "stdin must be UTF-8 text")?;
            Some(buffer)
        }
    };

    let output = llm_svg_rust::run(config, input).await?;
    if let Some(path) = cli.png.as_deref() {
        write_preview(&output.svg_code, path)?;
    }
    match cli.output.as_deref() {
        Some(path) => {
            std::fs::write(path, &output.svg_code)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.svg_code.as_bytes())?;
            if !output.svg_code.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

async fn run_server(config: &llm_svg_rust::Config, addr: &str) -> Result<()> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = llm_svg_rust::settings::load_settings(settings_path)?;
    llm_svg_rust::apply_overrides(&mut settings, config);
    let key = llm_svg_rust::providers::resolve_key(config.key.as_deref())?;
    eprintln!("listening on http://{}", addr);
    llm_svg_rust::server::run_server(settings, key, addr.to_string()).await
}

fn write_preview(svg: &str, path: &Path) -> Result<()> {
    let png = llm_svg_rust::render::render_svg_png(svg)?;
    std::fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))
}
