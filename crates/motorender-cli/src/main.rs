use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use motorender_contracts::render::{RenderConfiguration, RenderSize, Variant, View};
use motorender_engine::{EngineSettings, RenderPipeline, RenderResponse, RenderUpload};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "motorender",
    version,
    about = "Render a motorcycle photo with a list of catalog accessories"
)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compose the prompt, normalize the photo and call the image backend.
    Render(RenderArgs),
    /// Search the accessory catalog.
    Search(SearchArgs),
    /// Resolve a comma-separated id list against the catalog.
    Resolve(ResolveArgs),
    /// List the known backend models.
    Models,
}

/// Overrides for values otherwise taken from the environment.
#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[arg(long, global = true)]
    quality: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    heic_command: Option<String>,
    #[arg(long, global = true)]
    include_non_mountable: bool,
}

impl EngineArgs {
    fn apply(self, settings: &mut EngineSettings) {
        if let Some(model) = self.model {
            settings.model = Some(model);
        }
        if let Some(catalog) = self.catalog {
            settings.catalog_path = Some(catalog);
        }
        if let Some(policy) = self.policy {
            settings.policy_path = Some(policy);
        }
        if let Some(api_base) = self.api_base {
            settings.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(quality) = self.quality {
            settings.quality = Some(quality);
        }
        if let Some(secs) = self.timeout_secs {
            settings.request_timeout = Duration::from_secs(secs.clamp(5, 900));
        }
        if let Some(command) = self.heic_command {
            settings.heic_command = command;
        }
        if self.include_non_mountable {
            settings.mountable_only = false;
        }
    }
}

#[derive(Debug, Parser)]
struct RenderArgs {
    #[arg(long)]
    image: PathBuf,
    /// Declared MIME type; guessed from the extension when absent.
    #[arg(long)]
    mime: Option<String>,
    #[arg(long, default_value = "")]
    accessories: String,
    #[arg(long, default_value = "base")]
    variant: Variant,
    #[arg(long, default_value = "left")]
    view: View,
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    realism: Option<String>,
    #[arg(long, default_value = "1024x1024")]
    size: RenderSize,
    #[arg(long)]
    debug: bool,
    #[arg(long)]
    out: Option<PathBuf>,
}

impl RenderArgs {
    fn configuration(&self) -> RenderConfiguration {
        let mut config = RenderConfiguration::new(self.variant)
            .with_view(self.view)
            .with_size(self.size)
            .with_debug(self.debug);
        if let Some(background) = self.background.as_deref() {
            config = config.with_background(background);
        }
        if let Some(realism) = self.realism.as_deref() {
            config = config.with_realism(realism);
        }
        config
    }
}

#[derive(Debug, Parser)]
struct SearchArgs {
    #[arg(long, default_value = "")]
    query: String,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Parser)]
struct ResolveArgs {
    #[arg(long)]
    ids: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("motorender error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing();

    let mut settings = EngineSettings::from_env();
    cli.engine.apply(&mut settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let pipeline = RenderPipeline::from_settings(settings)?;
    runtime.block_on(async move {
        match cli.command {
            Command::Render(args) => run_render(&pipeline, args).await,
            Command::Search(args) => run_search(&pipeline, args),
            Command::Resolve(args) => run_resolve(&pipeline, args),
            Command::Models => run_models(&pipeline),
        }
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run_render(pipeline: &RenderPipeline, args: RenderArgs) -> Result<i32> {
    if !args.debug && args.out.is_none() {
        bail!("--out is required unless --debug is set");
    }
    let bytes = fs::read(&args.image)
        .with_context(|| format!("failed reading {}", args.image.display()))?;
    let upload = RenderUpload {
        bytes,
        mime_type: args
            .mime
            .clone()
            .unwrap_or_else(|| guess_image_mime(&args.image).to_string()),
        file_name: args
            .image
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string(),
    };
    let config = args.configuration();

    let outcome = tokio::select! {
        outcome = pipeline.render(upload, &config, &args.accessories) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; render abandoned");
            return Ok(130);
        }
    };

    match outcome {
        Ok(RenderResponse::Debug(plan)) => {
            print_json(&plan.debug_json())?;
            Ok(0)
        }
        Ok(RenderResponse::Rendered { plan, image }) => {
            let Some(out) = args.out.as_deref() else {
                bail!("--out is required unless --debug is set");
            };
            write_png(out, &image.png)?;
            let headers: serde_json::Map<String, Value> = plan
                .diagnostic_headers()
                .into_iter()
                .map(|(name, value)| (name.to_string(), Value::String(value)))
                .collect();
            print_json(&json!({
                "out": out.display().to_string(),
                "bytes": image.png.len(),
                "attempts": image.attempts,
                "dropped_params": image.dropped_params,
                "headers": headers,
                "plan": plan.debug_json(),
            }))?;
            Ok(0)
        }
        Err(err) => {
            print_json(&err.diagnostic())?;
            Ok(if err.status_code() < 500 { 2 } else { 1 })
        }
    }
}

fn run_search(pipeline: &RenderPipeline, args: SearchArgs) -> Result<i32> {
    let catalog = pipeline.catalog().snapshot();
    let result = catalog.search(&args.query, args.limit, pipeline.settings().mountable_only);
    print_json(&serde_json::to_value(result)?)?;
    Ok(0)
}

fn run_resolve(pipeline: &RenderPipeline, args: ResolveArgs) -> Result<i32> {
    let catalog = pipeline.catalog().snapshot();
    let result = catalog.resolve_from_csv(
        &args.ids,
        motorender_contracts::catalog::ResolveOptions {
            mountable_only: pipeline.settings().mountable_only,
        },
    );
    print_json(&serde_json::to_value(result)?)?;
    Ok(0)
}

fn run_models(pipeline: &RenderPipeline) -> Result<i32> {
    let registry = &pipeline.models().registry;
    let default = registry.default_model().map(|model| model.name.clone());
    let models: Vec<_> = registry.list().collect();
    print_json(&json!({
        "default": default,
        "models": serde_json::to_value(models)?,
    }))?;
    Ok(0)
}

fn write_png(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(path, png).with_context(|| format!("failed writing {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
