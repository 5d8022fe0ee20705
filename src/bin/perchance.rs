//! CLI for Perchance - image and text generation.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use perchance::credential::{default_extractor, CredentialManager};
use perchance::image::{ImageGenerator, ImageProvider, ImageRequest, Shape};
use perchance::text::{TextGenerator, TextProvider, TextRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "perchance")]
#[command(about = "Generate images and text with the Perchance generators")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a text prompt
    Image(ImageArgs),

    /// Stream generated text to stdout
    Text(TextArgs),

    /// Extract and verify a session key, then print it
    Key(KeyArgs),
}

#[derive(Args)]
struct ImageArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Things the image should avoid
    #[arg(short, long)]
    negative: Option<String>,

    /// Seed for deterministic generation (-1 for random)
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    seed: i64,

    /// Image shape
    #[arg(long, value_enum, default_value = "square")]
    shape: ShapeArg,

    /// Prompt adherence
    #[arg(long, default_value_t = 7.0)]
    guidance: f32,

    /// Output file path (defaults to `<id>.<ext>`)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct TextArgs {
    /// Instruction describing the text to write
    prompt: String,

    /// Text the output should begin with
    #[arg(long)]
    start_with: Option<String>,
}

#[derive(Args)]
struct KeyArgs {
    /// Service the key is verified against
    #[arg(long, value_enum, default_value = "image")]
    modality: Modality,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShapeArg {
    Portrait,
    Square,
    Landscape,
}

impl From<ShapeArg> for Shape {
    fn from(arg: ShapeArg) -> Self {
        match arg {
            ShapeArg::Portrait => Shape::Portrait,
            ShapeArg::Square => Shape::Square,
            ShapeArg::Landscape => Shape::Landscape,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Modality {
    Image,
    Text,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Image(args) => generate_image(args, cli.json).await?,
        Commands::Text(args) => generate_text(args, cli.json).await?,
        Commands::Key(args) => print_key(args, cli.json).await?,
    }

    Ok(())
}

async fn generate_image(args: ImageArgs, json_output: bool) -> anyhow::Result<()> {
    let mut request = ImageRequest::new(&args.prompt)
        .with_seed(args.seed)
        .with_shape(args.shape.into())
        .with_guidance_scale(args.guidance);
    if let Some(negative) = args.negative {
        request = request.with_negative_prompt(negative);
    }

    let generator = ImageGenerator::builder().build()?;
    let image = generator.generate(&request).await?;

    let path = match args.output {
        Some(output) => image.save(output).await?,
        None => image.save_default().await?,
    };
    let (width, height) = image.size();

    if json_output {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "id": image.id(),
            "output": path.display().to_string(),
            "width": width,
            "height": height,
            "file_extension": image.file_extension(),
            "maybe_nsfw": image.maybe_nsfw(),
            "seed": image.params().seed,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Generated image: {} ({width}x{height})", path.display());
        if image.maybe_nsfw() {
            println!("Flagged as possibly NSFW");
        }
    }

    Ok(())
}

async fn generate_text(args: TextArgs, json_output: bool) -> anyhow::Result<()> {
    let mut request = TextRequest::new(&args.prompt);
    if let Some(start) = args.start_with {
        request = request.with_start(start);
    }

    let generator = TextGenerator::builder().build()?;
    let stream = generator.generate(&request).await?;

    if json_output {
        let text = stream.collect_text().await?;
        let result = serde_json::json!({
            "type": "text",
            "success": true,
            "text": text,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let mut stream = stream;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}

async fn print_key(args: KeyArgs, json_output: bool) -> anyhow::Result<()> {
    let base_url = match args.modality {
        Modality::Image => std::env::var(perchance::image::BASE_URL_ENV)
            .unwrap_or_else(|_| perchance::image::DEFAULT_BASE_URL.to_string()),
        Modality::Text => std::env::var(perchance::text::BASE_URL_ENV)
            .unwrap_or_else(|_| perchance::text::DEFAULT_BASE_URL.to_string()),
    };

    let manager =
        CredentialManager::for_endpoint(reqwest::Client::new(), base_url, default_extractor()?);
    let key = manager.ensure_valid().await?;

    if json_output {
        let result = serde_json::json!({
            "type": "key",
            "success": true,
            "user_key": key.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", key.as_str());
    }

    Ok(())
}
