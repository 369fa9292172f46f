//! PDF Watermark CLI tool
//!
//! A command-line tool for stamping watermarks onto PDF files or whole
//! directory trees of PDFs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use pdf_watermark::batch::watermark_tree;
use pdf_watermark::config::{CenteredLayout, Layout, Rgba, TiledLayout, WatermarkConfig};
use pdf_watermark::font::StandardFont;
use pdf_watermark::pdf::{extract_metadata, watermark_document};

/// PDF Watermark - Stamp tiled or clickable watermarks onto PDFs
#[derive(Parser)]
#[command(name = "pdf-watermark")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Diagonal tiled text on every page of one file
    pdf-watermark apply input.pdf -o output.pdf --text \"CONFIDENTIAL\"

    # Mirror a directory tree, centered caption linking to a site
    pdf-watermark apply originals/ -o watermarked/ --mode centered-link \\
        --text \"site.example\" --url https://site.example --subtitle \"Licensed copy\"

    # Use a YAML config file, overriding the rotation
    pdf-watermark apply originals/ -o watermarked/ --config watermark.yaml --rotation 30")]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Tiled,
    CenteredLink,
}

#[derive(Clone, Copy, ValueEnum)]
enum FontArg {
    Helvetica,
    Courier,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark a PDF file, or every PDF under a directory
    Apply {
        /// Input PDF file or directory
        input: PathBuf,

        /// Output PDF file (or directory when the input is a directory)
        #[arg(short, long)]
        output: PathBuf,

        /// YAML watermark configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Layout mode
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Watermark text
        #[arg(long)]
        text: Option<String>,

        /// Secondary caption (centered-link) or link label text (tiled)
        #[arg(long)]
        subtitle: Option<String>,

        /// Link target for clickable regions
        #[arg(long)]
        url: Option<String>,

        /// Standard font family
        #[arg(long, value_enum)]
        font: Option<FontArg>,

        /// Primary text size in points
        #[arg(long)]
        font_size: Option<f32>,

        /// Secondary text size in points
        #[arg(long)]
        subtitle_size: Option<f32>,

        /// Primary text color as #rrggbb
        #[arg(long)]
        color: Option<String>,

        /// Primary text opacity in [0, 1]
        #[arg(long)]
        opacity: Option<f32>,

        /// Rotation in degrees (counter-clockwise)
        #[arg(long, allow_hyphen_values = true)]
        rotation: Option<f32>,

        /// Horizontal tile step (tiled mode)
        #[arg(long)]
        step_x: Option<f32>,

        /// Vertical tile step (tiled mode)
        #[arg(long)]
        step_y: Option<f32>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Apply {
            input, output, config, mode, text, subtitle, url, font, font_size,
            subtitle_size, color, opacity, rotation, step_x, step_y, open,
        } => {
            let overrides = Overrides {
                mode, text, subtitle, url, font, font_size, subtitle_size,
                color, opacity, rotation, step_x, step_y,
            };
            build_config(config.as_deref(), overrides)
                .and_then(|config| cmd_apply(input, output, &config, open))
        }
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pdf_watermark={}", level.as_str().to_lowercase())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Command-line values that override the config file
struct Overrides {
    mode: Option<Mode>,
    text: Option<String>,
    subtitle: Option<String>,
    url: Option<String>,
    font: Option<FontArg>,
    font_size: Option<f32>,
    subtitle_size: Option<f32>,
    color: Option<String>,
    opacity: Option<f32>,
    rotation: Option<f32>,
    step_x: Option<f32>,
    step_y: Option<f32>,
}

/// Merge the config file (if any) with command-line overrides
fn build_config(path: Option<&Path>, overrides: Overrides) -> Result<WatermarkConfig> {
    let mut config = match path {
        Some(path) => WatermarkConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => match overrides.mode {
            // Centered-link has its own size and color defaults
            Some(Mode::CenteredLink) => WatermarkConfig::centered_link("", ""),
            _ => WatermarkConfig::default(),
        },
    };

    match (overrides.mode, config.layout) {
        (Some(Mode::Tiled), Layout::CenteredLink(_)) => {
            config.layout = Layout::Tiled(TiledLayout::default());
        }
        (Some(Mode::CenteredLink), Layout::Tiled(_)) => {
            config.layout = Layout::CenteredLink(CenteredLayout::default());
        }
        _ => {}
    }

    if let Some(text) = overrides.text {
        config.primary_text = text;
    }
    if let Some(subtitle) = overrides.subtitle {
        config.secondary_text = Some(subtitle);
    }
    if let Some(url) = overrides.url {
        config.link_url = Some(url);
    }
    if let Some(font) = overrides.font {
        config.font = match font {
            FontArg::Helvetica => StandardFont::Helvetica,
            FontArg::Courier => StandardFont::Courier,
        };
    }
    if let Some(size) = overrides.font_size {
        config.font_size_primary = size;
    }
    if let Some(size) = overrides.subtitle_size {
        config.font_size_secondary = size;
    }
    if let Some(hex) = overrides.color {
        config.color_primary = Rgba::from_hex(&hex, config.color_primary.alpha)?;
    }
    if let Some(opacity) = overrides.opacity {
        config.color_primary = config.color_primary.with_alpha(opacity);
    }
    if let Some(rotation) = overrides.rotation {
        config.rotation_degrees = rotation;
    }
    if let Layout::Tiled(ref mut tiled) = config.layout {
        if let Some(step) = overrides.step_x {
            tiled.step_x = step;
        }
        if let Some(step) = overrides.step_y {
            tiled.step_y = step;
        }
    }

    // An empty URL from the centered-link defaults means none was given
    if config.link_url.as_deref() == Some("") {
        config.link_url = None;
    }

    config.validate()?;
    Ok(config)
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Watermark one file or a directory tree
fn cmd_apply(input: PathBuf, output: PathBuf, config: &WatermarkConfig, open: bool) -> Result<()> {
    if input.is_dir() {
        let report = watermark_tree(&input, &output, config)?;
        for failure in &report.failed {
            eprintln!("Failed: {}", failure);
        }
        eprintln!(
            "Processed {} of {} files into {}",
            report.succeeded.len(),
            report.total(),
            output.display()
        );
        if !report.is_success() {
            bail!("{} file(s) could not be watermarked", report.failed.len());
        }
        return Ok(());
    }

    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    if config.uses_default_text() {
        eprintln!("Warning: using the default watermark text; pass --text to change it");
    }

    let report = watermark_document(&input, &output, config)
        .with_context(|| format!("watermarking {}", input.display()))?;
    info!(pages = report.pages, links = report.links_added, "done");

    eprintln!("Output: {}", output.display());

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }

    let metadata = extract_metadata(&input)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    if let Some(producer) = metadata.producer {
        println!("Producer: {}", producer);
    }

    for (i, page) in metadata.pages.iter().enumerate() {
        println!(
            "  Page {}: {} x {} pt, rotate {}, {} annotation(s), {} link(s)",
            i + 1,
            page.width,
            page.height,
            page.rotation,
            page.annotation_count,
            page.link_uris.len()
        );
    }

    Ok(())
}
