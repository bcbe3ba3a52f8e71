use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};

use graphnotes::generate::{DEFAULT_MAX_NODES, GraphGenerator, MAX_PROMPT_CHARS};
use graphnotes::graph::{SceneDefaults, normalize_json};
use graphnotes::serve::{ServeArgs, run_serve};

#[derive(Debug, Parser)]
#[command(
    name = "graphnotes",
    about = "Normalize a persisted graph document to its canonical form."
)]
struct NormalizeArgs {
    /// Path to the input document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Document kind used when the input does not carry one.
    #[arg(long, default_value = "note")]
    kind: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "graphnotes generate",
    about = "Generate a graph document from a natural-language prompt."
)]
struct GenerateArgs {
    /// Description of the graph to build.
    prompt: String,

    /// Upper bound on the generated node count.
    #[arg(long = "max-nodes", default_value_t = DEFAULT_MAX_NODES)]
    max_nodes: usize,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[tokio::main]
async fn main() {
    if let Err(err) = dispatch().await {
        eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
        std::process::exit(1);
    }
}

async fn dispatch() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let serve_args = ServeArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_serve(serve_args).await
        }
        Some("generate") => {
            let generate_args = GenerateArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_generate(generate_args).await
        }
        Some("normalize") => {
            let normalize_args = NormalizeArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_normalize(normalize_args)
        }
        _ => {
            let normalize_args = NormalizeArgs::parse_from(args);
            run_normalize(normalize_args)
        }
    }
}

fn run_normalize(cli: NormalizeArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref())?;

    let text = load_document(&input_source)?;
    let graph = normalize_json(&text, &cli.kind, &SceneDefaults::default());

    let mut rendered = serde_json::to_string_pretty(&graph)?;
    rendered.push('\n');
    write_output(output_dest, rendered.as_bytes(), "Normalized graph", cli.quiet)
}

async fn run_generate(cli: GenerateArgs) -> Result<()> {
    let prompt = cli.prompt.trim();
    if prompt.is_empty() {
        bail!("prompt is required");
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        bail!("prompt is too long (max {MAX_PROMPT_CHARS} characters)");
    }

    let generator = GraphGenerator::from_env()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set; graph generation is disabled"))?;

    let output_dest = parse_output(cli.output.as_deref())?;
    let graph = generator
        .generate(prompt, cli.max_nodes)
        .await
        .context("failed to generate graph")?;

    let mut rendered = serde_json::to_string_pretty(&graph)?;
    rendered.push('\n');
    write_output(output_dest, rendered.as_bytes(), "Generated graph", cli.quiet)
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>) -> Result<OutputDestination> {
    match output {
        Some("-") | None => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
    }
}

fn load_document(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no document supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], action: &str, quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)?;
            if !quiet {
                println!("{action} -> {}", path.display());
            }
        }
    }
    Ok(())
}
