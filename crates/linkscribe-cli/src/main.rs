use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use linkscribe_client::{
    Backend, BackendConfig, ExtractionConfig, GenerationConfig, JinaExtractor, Provider,
};
use linkscribe_core::pool::PoolConfig;
use linkscribe_core::{Annotator, AnnotatorConfig, ResolverConfig, RetryPolicy, TitleResolver};

#[derive(Parser, Debug)]
#[command(
    name = "linkscribe",
    version,
    about = "Turn bare URLs in a markdown file into titled links"
)]
struct Cli {
    /// Markdown file to annotate
    input: PathBuf,

    /// Where to write the annotated document
    #[arg(short, long, default_value = "output.md")]
    output: PathBuf,

    /// Model provider (gpt3, gpt4, claude, deepseek, qwen, ernie, glm,
    /// hunyuan, spark, gemini, ollama)
    #[arg(short, long, env = "LINKSCRIBE_PROVIDER")]
    provider: Provider,

    /// Provider API key (not needed for ollama)
    #[arg(long, env = "LINKSCRIBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, env = "LINKSCRIBE_BASE_URL")]
    base_url: Option<String>,

    /// Override the provider's default model
    #[arg(short, long, env = "LINKSCRIBE_MODEL")]
    model: Option<String>,

    #[arg(long, env = "LINKSCRIBE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    #[arg(long, env = "LINKSCRIBE_MAX_OUTPUT_TOKENS", default_value_t = 64)]
    max_output_tokens: u32,

    /// Cap on simultaneous model calls (unbounded when unset)
    #[arg(long, env = "LINKSCRIBE_TITLE_CONCURRENCY")]
    title_concurrency: Option<usize>,

    /// Jina Reader API key
    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    jina_api_key: Option<String>,

    #[arg(long, env = "LINKSCRIBE_EXTRACT_ENDPOINT", default_value = "https://r.jina.ai")]
    extract_endpoint: String,

    /// Simultaneous extraction requests
    #[arg(long, env = "LINKSCRIBE_EXTRACT_CONCURRENCY", default_value_t = 3)]
    extract_concurrency: usize,

    /// Per-request extraction timeout, in seconds
    #[arg(long, env = "LINKSCRIBE_EXTRACT_TIMEOUT", default_value_t = 10)]
    extract_timeout: u64,

    /// Seconds an extraction slot stays busy after a success
    #[arg(long, env = "LINKSCRIBE_EXTRACT_COOLDOWN", default_value_t = 2)]
    extract_cooldown: u64,

    /// URLs resolved at once
    #[arg(long, env = "LINKSCRIBE_MAX_IN_FLIGHT", default_value_t = 16)]
    max_in_flight: usize,

    /// Characters of page text sent to the model
    #[arg(long, env = "LINKSCRIBE_EXCERPT_CHARS", default_value_t = 1000)]
    excerpt_chars: usize,
}

impl Cli {
    fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            provider: self.provider,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            generation: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
            timeout: None,
        }
    }

    fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            endpoint: self.extract_endpoint.clone(),
            api_key: self.jina_api_key.clone(),
            timeout: Duration::from_secs(self.extract_timeout),
            pool: PoolConfig::new(self.extract_concurrency)
                .with_hold(Duration::from_secs(self.extract_cooldown)),
            retry: RetryPolicy::default(),
        }
    }

    fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            excerpt_chars: self.excerpt_chars,
            title_concurrency: self.title_concurrency,
        }
    }

    fn annotator_config(&self) -> AnnotatorConfig {
        AnnotatorConfig {
            max_in_flight: self.max_in_flight,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("linkscribe=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn(interrupt_signal(cancel.clone()));

    run(&cli, &cancel).await
}

/// Cancel outstanding work on Ctrl-C; unresolved URLs keep their text.
async fn interrupt_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Interrupt received, writing output with remaining URLs unchanged");
            cancel.cancel();
        }
        Err(e) => tracing::warn!(error = %e, "Failed to install Ctrl-C handler"),
    }
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    // 1. Configure backends; config errors stop here, before any I/O
    let backend = Backend::from_config(&cli.backend_config())
        .with_context(|| format!("Invalid configuration for provider '{}'", cli.provider))?;
    let extractor = JinaExtractor::with_config(cli.extraction_config())
        .context("Failed to create extraction client")?
        .with_cancellation(cancel.clone());

    let resolver = TitleResolver::with_config(extractor, backend, cli.resolver_config());
    let annotator = Annotator::with_config(resolver, cli.annotator_config());

    // 2. Read
    let input = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read input file: {}", cli.input.display()))?;

    tracing::info!(
        input = %cli.input.display(),
        provider = %cli.provider,
        bytes = input.len(),
        "Annotating document"
    );

    // 3. Annotate
    let output = annotator.annotate_text(&input, cancel).await;

    // 4. Write
    tokio::fs::write(&cli.output, &output)
        .await
        .with_context(|| format!("Failed to write output file: {}", cli.output.display()))?;

    tracing::info!(output = %cli.output.display(), "Wrote annotated document");
    Ok(())
}
