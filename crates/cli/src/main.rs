use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiat_core::{Director, Outline, Project, Stage};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "fiat")]
#[command(about = "Configuration-driven workflow engine", long_about = None)]
struct Args {
    /// Path to the outline file
    #[arg(short, long, default_value = "fiat.toml", env = "FIAT_OUTLINE")]
    outline: PathBuf,

    /// Project name (overrides the [project] section)
    #[arg(short, long)]
    name: Option<String>,

    /// Run manager branches concurrently
    #[arg(short, long)]
    parallelize: bool,

    /// JSON file handed to every path as its input
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Print every path of the resolved workflow
    Paths,
    /// Execute the project and print its summary
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "fiat=debug" } else { "fiat=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut project = build_project(&args)?;
    tracing::info!("Starting project {}", project.identification);

    let token = project.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining work");
            token.cancel();
        }
    });

    let output = run(&mut project, args.command).await?;
    println!("{}", output);
    Ok(())
}

/// Load the outline and data payload and apply command line overrides.
fn build_project(args: &Args) -> Result<Project> {
    let outline = Outline::load(&args.outline)
        .with_context(|| format!("Failed to load outline {}", args.outline.display()))?;
    let mut project = Project::from_outline(outline).context("Invalid [project] section")?;

    if let Some(name) = &args.name {
        project.rename(name.clone());
    }
    if args.parallelize {
        project = project.with_parallelize(true);
    }
    if let Some(path) = &args.data {
        project = project.with_data(load_data(path)?);
    }
    Ok(project)
}

fn load_data(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse data file as JSON")
}

/// Drive the project for `command` and render the result as JSON.
async fn run(project: &mut Project, command: Command) -> Result<String> {
    match command {
        Command::Paths => {
            let mut director = Director::new(vec![Stage::Settings, Stage::Workflow]);
            director
                .complete(project)
                .await
                .context("Failed to build workflow")?;
            let paths = project
                .workflow
                .as_ref()
                .map(|workflow| workflow.paths())
                .unwrap_or_default();
            Ok(serde_json::to_string_pretty(&paths)?)
        }
        Command::Run => {
            project.execute().await.context("Project execution failed")?;
            match &project.summary {
                Some(summary) => Ok(serde_json::to_string_pretty(summary)?),
                None => Ok("null".to_string()),
            }
        }
    }
}
