//! @ai:module:intent CLI for the VisionTags client
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use visiontags::{
    config::ClientConfig,
    render::{render_analysis, render_confusion, render_counts, render_points},
    AbortController, AnalyzeOptions, ApiClient, ApiResolver, EnvOverrides, HealthOptions,
    ResolveOptions,
};

#[derive(Parser)]
#[command(name = "visiontags")]
#[command(about = "Classify images remotely and inspect their explanations")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use this API base directly instead of probing candidates
    #[arg(long, global = true)]
    base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the reachable API base
    Resolve {
        /// Candidate bases to probe, in order (comma-separated)
        #[arg(long)]
        candidates: Option<String>,

        /// Per-candidate probe timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Ping the backend health endpoint
    Health {
        /// Timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Upload an image and print its classification
    Analyze {
        /// Image path, file:// URI, data: URI or http(s) URL
        image: String,

        /// Model to request from the backend
        #[arg(short, long)]
        model: Option<String>,

        /// Requester identity sent as X-User
        #[arg(short, long)]
        user: Option<String>,

        /// Analyze timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Fetch the image bytes locally before upload instead of streaming the file
        #[arg(long)]
        fetch: bool,

        /// Write the decoded heatmap PNG to this path
        #[arg(long)]
        heatmap_out: Option<PathBuf>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Send the true label for a prediction
    Feedback {
        prediction_id: String,
        true_label: String,

        /// Timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Show prediction counts and the confusion matrix
    Metrics {
        #[arg(long)]
        json: bool,
    },

    /// List stored embedding points
    Embeddings {
        /// Maximum number of points to fetch
        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Initialize default configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "visiontags.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("visiontags=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Init { output } = &cli.command {
        return init_config(output);
    }

    let config = load_or_default_config(cli.config)?;
    let env = EnvOverrides::from_env();
    let resolver = Arc::new(ApiResolver::from_config(&config, &env));

    if let Some(base) = cli.base {
        resolver.set_api_url(base);
    }

    let client = ApiClient::from_config(&config, resolver)?;

    let controller = abort_on_ctrl_c();
    let interrupted = controller.signal();

    // Installing the Ctrl-C listener disables the default SIGINT exit, so the
    // command is raced against it here.
    tokio::select! {
        result = run_command(cli.command, client, &config, &controller) => result,
        _ = interrupted.aborted() => std::process::exit(EXIT_INTERRUPTED),
    }
}

/// Conventional exit status for a process stopped by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

/// @ai:intent Dispatch one subcommand with a shared Ctrl-C controller
/// @ai:effects network, fs:read, fs:write
async fn run_command(
    command: Commands,
    client: ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
) -> Result<()> {
    match command {
        Commands::Resolve {
            candidates,
            timeout_ms,
        } => resolve(&client, config, controller, candidates, timeout_ms).await,
        Commands::Health { timeout_ms } => health(&client, config, controller, timeout_ms).await,
        Commands::Analyze {
            image,
            model,
            user,
            timeout_ms,
            fetch,
            heatmap_out,
            json,
        } => {
            let client = if fetch {
                client.with_fetched_images()
            } else {
                client
            };
            analyze(
                &client,
                config,
                controller,
                AnalyzeArgs {
                    image,
                    model,
                    user,
                    timeout_ms,
                    heatmap_out,
                    json,
                },
            )
            .await
        }
        Commands::Feedback {
            prediction_id,
            true_label,
            timeout_ms,
        } => {
            feedback(
                &client,
                config,
                controller,
                &prediction_id,
                &true_label,
                timeout_ms,
            )
            .await
        }
        Commands::Metrics { json } => metrics(&client, config, controller, json).await,
        Commands::Embeddings { limit, json } => {
            embeddings(&client, config, controller, limit, json).await
        }
        Commands::Init { output } => init_config(&output),
    }
}

struct AnalyzeArgs {
    image: String,
    model: Option<String>,
    user: Option<String>,
    timeout_ms: Option<u64>,
    heatmap_out: Option<PathBuf>,
    json: bool,
}

/// @ai:intent Controller aborted when the user presses Ctrl-C
/// @ai:effects signal
fn abort_on_ctrl_c() -> AbortController {
    let controller = AbortController::new();
    let trigger = controller.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, canceling in-flight request");
            trigger.abort();
        }
    });

    controller
}

/// @ai:intent Resolve a base, logging instead of failing when none answers
/// @ai:effects network
async fn resolve_quietly(client: &ApiClient, config: &ClientConfig, controller: &AbortController) {
    let opts = ResolveOptions {
        signal: Some(controller.signal()),
        timeout: Some(config.timeouts.probe()),
        ..Default::default()
    };

    if let Err(e) = client.resolve_api_base(opts).await {
        tracing::warn!("{}; continuing with {}", e, client.api_url());
    }
}

/// @ai:intent Resolve and print the base
/// @ai:effects network
async fn resolve(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    candidates: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let candidates = candidates.map(|list| {
        list.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    });

    let opts = ResolveOptions {
        candidates,
        signal: Some(controller.signal()),
        timeout: Some(
            timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.timeouts.probe()),
        ),
    };

    let base = client.resolve_api_base(opts).await?;
    println!("{}", base);
    Ok(())
}

/// @ai:intent Ping health at the resolved base
/// @ai:effects network
async fn health(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    timeout_ms: Option<u64>,
) -> Result<()> {
    resolve_quietly(client, config, controller).await;

    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.health());

    client
        .ping_health(HealthOptions {
            signal: Some(controller.signal()),
            timeout: Some(timeout),
            base: None,
        })
        .await?;

    println!("{} is healthy", client.api_url());
    Ok(())
}

/// @ai:intent Resolve, warm up the backend, then analyze one image
/// @ai:effects network, fs:read, fs:write
async fn analyze(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    args: AnalyzeArgs,
) -> Result<()> {
    resolve_quietly(client, config, controller).await;

    // Cold backends can take a while to answer the first request.
    let warm_up = HealthOptions {
        signal: Some(controller.signal()),
        timeout: Some(config.timeouts.health()),
        base: None,
    };
    if let Err(e) = client.ping_health(warm_up).await {
        tracing::warn!("Backend warm-up failed, analyzing anyway: {}", e);
    }

    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.analyze());

    tracing::info!("Analyzing {} via {}", args.image, client.api_url());

    let result = client
        .analyze_image(
            &args.image,
            AnalyzeOptions {
                user: args.user,
                model: args.model,
                signal: Some(controller.signal()),
                timeout: Some(timeout),
            },
        )
        .await
        .context("Failed to analyze image")?;

    if let Some(path) = args.heatmap_out {
        std::fs::write(&path, result.heatmap_png()?)
            .with_context(|| format!("Failed to write heatmap to {}", path.display()))?;
        tracing::info!("Heatmap saved to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_analysis(&result));
    }

    Ok(())
}

/// @ai:intent Send a label correction
/// @ai:effects network
async fn feedback(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    prediction_id: &str,
    true_label: &str,
    timeout_ms: Option<u64>,
) -> Result<()> {
    resolve_quietly(client, config, controller).await;

    let ack = client
        .send_feedback(
            prediction_id,
            true_label,
            timeout_ms.map(Duration::from_millis),
        )
        .await?;

    if ack.ok {
        println!("Feedback recorded for {}", prediction_id);
    } else {
        tracing::warn!("Backend did not acknowledge feedback for {}", prediction_id);
    }
    Ok(())
}

/// @ai:intent Print counts and confusion matrix
/// @ai:effects network
async fn metrics(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    json: bool,
) -> Result<()> {
    resolve_quietly(client, config, controller).await;

    let summary = client
        .metrics_summary_with(Some(controller.signal()))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Prediction counts");
    println!("{}", "-".repeat(30));
    print!("{}", render_counts(&summary));
    println!();

    println!("Confusion matrix");
    println!("{}", "-".repeat(30));
    match summary.validate() {
        Ok(()) => print!("{}", render_confusion(&summary)),
        Err(problem) => println!("(not shown: {})", problem),
    }

    Ok(())
}

/// @ai:intent Print stored embedding points
/// @ai:effects network
async fn embeddings(
    client: &ApiClient,
    config: &ClientConfig,
    controller: &AbortController,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    resolve_quietly(client, config, controller).await;

    let points = client
        .embedding_points_with(limit, Some(controller.signal()))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else if points.is_empty() {
        println!("No embedding points stored yet");
    } else {
        print!("{}", render_points(&points));
    }

    Ok(())
}

/// @ai:intent Write default configuration file
/// @ai:effects fs:write
fn init_config(output: &std::path::Path) -> Result<()> {
    let config = ClientConfig::default();
    config.save(output)?;
    println!("Configuration saved to {}", output.display());
    Ok(())
}

/// @ai:intent Load configuration or use defaults
/// @ai:effects fs:read
fn load_or_default_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(p) => ClientConfig::load(&p),
        None => {
            let default_path = PathBuf::from("visiontags.toml");

            if default_path.exists() {
                ClientConfig::load(&default_path)
            } else {
                Ok(ClientConfig::default())
            }
        }
    }
}
