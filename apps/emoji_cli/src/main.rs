use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use client_core::{
    load_settings, DeleteConfirmation, Intent, ParameterField, PhotoCandidate, SessionController,
    SessionEvent, TemplateImage,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Turn a portrait photo into a styled emoji")]
struct Cli {
    /// TOML settings file; APP__* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a photo and save the generated emoji.
    Generate(GenerateArgs),
    /// Manage custom style templates.
    #[command(subcommand)]
    Templates(TemplateCommand),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    photo: PathBuf,
    #[arg(long)]
    style: Option<String>,
    /// Processing parameter as `name=value`, e.g. `brighten=70`. Repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(ParameterField, i64)>,
    /// Output file; defaults to a timestamped name in the working directory.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: PathBuf,
    },
    Update {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    Delete {
        #[arg(long)]
        name: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn parse_param(raw: &str) -> Result<(ParameterField, i64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let field = name.parse::<ParameterField>()?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid value for {field}: {err}"))?;
    Ok((field, value))
}

struct PromptConfirmation {
    assume_yes: bool,
}

#[async_trait]
impl DeleteConfirmation for PromptConfirmation {
    async fn confirm_delete(&self, style_name: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let mut stdout = tokio::io::stdout();
        let prompt = format!("Delete template '{style_name}'? [y/N] ");
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }
        let mut answer = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut answer).await {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(err) => {
                warn!("failed to read confirmation: {err}");
                false
            }
        }
    }
}

async fn read_candidate(path: &Path) -> Result<(String, String, Vec<u8>)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok((filename, mime, bytes))
}

async fn generate(mut controller: SessionController, args: GenerateArgs) -> Result<()> {
    if args.style.is_some() {
        // Builtin styles still work without the catalogue.
        if let Err(err) = controller.dispatch(Intent::LoadTemplates).await {
            warn!("{err}");
        }
    }
    let mut events = controller.subscribe_events();
    let (intents, rx) = mpsc::channel(16);
    let session = tokio::spawn(controller.run(rx));

    let (filename, mime, bytes) = read_candidate(&args.photo).await?;
    intents
        .send(Intent::StagePhoto(PhotoCandidate::new(filename, mime, bytes)))
        .await?;
    for (field, value) in args.params {
        intents.send(Intent::SetParameter { field, value }).await?;
    }
    if let Some(style) = args.style {
        intents.send(Intent::SelectStyle(style)).await?;
    }
    intents.send(Intent::Generate).await?;

    let outcome = loop {
        match events.recv().await {
            Ok(SessionEvent::Progress(update)) => {
                eprintln!("{:>3}% {}", update.percent, update.phase.label());
            }
            Ok(SessionEvent::GenerationFinished {
                style_name,
                width,
                height,
                elapsed,
            }) => {
                info!(%style_name, width, height, elapsed_ms = elapsed.as_millis() as u64, "emoji ready");
                break Ok(());
            }
            Ok(SessionEvent::GenerationFailed { message, .. }) => break Err(anyhow!(message)),
            Ok(SessionEvent::Error(message)) => break Err(anyhow!(message)),
            Ok(_) => {}
            Err(err) => break Err(anyhow!("session ended unexpectedly: {err}")),
        }
    };

    drop(intents);
    let controller = session.await.context("session task failed")?;
    outcome?;

    let result = controller
        .current_result()
        .ok_or_else(|| anyhow!("no result was produced"))?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(result.suggested_filename()));
    tokio::fs::write(&output, &result.image)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Saved {}x{} {} emoji to {} ({} bytes, {:.1}s)",
        result.width,
        result.height,
        result.style_name,
        output.display(),
        result.encoded_size,
        result.elapsed.as_secs_f32()
    );
    Ok(())
}

async fn template_image(path: &Path) -> Result<TemplateImage> {
    let (filename, mime, bytes) = read_candidate(path).await?;
    Ok(TemplateImage::new(filename, mime, bytes))
}

async fn templates(mut controller: SessionController, command: TemplateCommand) -> Result<()> {
    controller.dispatch(Intent::LoadTemplates).await?;
    match command {
        TemplateCommand::List => {
            println!("builtin: {}", controller.builtin_styles().join(", "));
            let custom = controller.templates();
            if custom.is_empty() {
                println!("no custom templates");
            }
            for template in custom {
                match template.description {
                    Some(description) if !description.is_empty() => {
                        println!("{}  {}  ({})", template.name, template.image_ref, description)
                    }
                    _ => println!("{}  {}", template.name, template.image_ref),
                }
            }
        }
        TemplateCommand::Create {
            name,
            description,
            image,
        } => {
            let image = template_image(&image).await?;
            controller
                .dispatch(Intent::CreateTemplate {
                    name: name.clone(),
                    description,
                    image,
                })
                .await?;
            println!("created template '{}'", name.trim());
        }
        TemplateCommand::Update {
            name,
            description,
            image,
        } => {
            if description.is_none() && image.is_none() {
                bail!("nothing to update; pass --description and/or --image");
            }
            let image = match image {
                Some(path) => Some(template_image(&path).await?),
                None => None,
            };
            controller
                .dispatch(Intent::UpdateTemplate {
                    name: name.clone(),
                    description,
                    image,
                })
                .await?;
            println!("updated template '{}'", name.trim());
        }
        TemplateCommand::Delete { name, .. } => {
            let before = controller.templates().len();
            controller
                .dispatch(Intent::DeleteTemplate { name: name.clone() })
                .await?;
            if controller.templates().len() < before {
                println!("deleted template '{}'", name.trim());
            } else {
                println!("kept template '{}'", name.trim());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref());
    let assume_yes = matches!(cli.command, Command::Templates(TemplateCommand::Delete { yes: true, .. }));
    let controller =
        SessionController::connect(&settings, Arc::new(PromptConfirmation { assume_yes }))?;
    info!(session_id = %controller.id(), service = %settings.service_url, "session started");

    match cli.command {
        Command::Generate(args) => generate(controller, args).await,
        Command::Templates(command) => templates(controller, command).await,
    }
}
