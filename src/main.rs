use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crucible::api::{self, AppState};
use crucible::engine::{CycleDriver, RandomSource, SeededRandom, SessionRegistry, SessionServices};
use crucible::events::BroadcastBus;
use crucible::providers::{
    AnthropicGenerationService, EmbeddingProvider, GenerationService, HashedEmbeddingProvider,
    MockGenerationService, OpenAIEmbeddingProvider,
};
use crucible::storage::{InMemoryStore, Persistence, PostgresStore};
use crucible::validation::ValidatorRegistry;
use crucible::Config;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(about = "Iterative multi-agent claim refinement", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one session to completion and print the outcome
    Run {
        #[arg(help = "Claim to refine")]
        claim: String,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        max_cycles: Option<u64>,
        #[arg(long)]
        cost_limit: Option<f64>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?.merge_env()?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Run {
            claim,
            seed,
            max_cycles,
            cost_limit,
        } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(cycles) = max_cycles {
                config.session.max_cycles = cycles;
            }
            if let Some(limit) = cost_limit {
                config.session.cost_limit = Some(limit);
            }
            run_claim(&claim, config).await?
        }
        Commands::Serve { port } => serve(config, port).await?,
    }

    Ok(())
}

async fn build_services(config: &Config, bus: Arc<BroadcastBus>) -> Result<SessionServices> {
    let generation: Arc<dyn GenerationService> = match &config.anthropic_api_key {
        Some(key) => Arc::new(AnthropicGenerationService::new(key.clone())),
        None => {
            log::warn!("ANTHROPIC_API_KEY not set; using the offline mock generator");
            Arc::new(MockGenerationService::new())
        }
    };

    let embeddings: Arc<dyn EmbeddingProvider> = match &config.openai_api_key {
        Some(key) => Arc::new(OpenAIEmbeddingProvider::new(key.clone())),
        None => Arc::new(HashedEmbeddingProvider::default()),
    };

    let persistence: Arc<dyn Persistence> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::new(url).await?;
            store.run_migrations().await?;
            Arc::new(store)
        }
        None => Arc::new(InMemoryStore::new()),
    };

    Ok(SessionServices {
        generation,
        embeddings,
        persistence,
        bus,
        validators: ValidatorRegistry::with_verdicts()?,
    })
}

async fn run_claim(claim: &str, config: Config) -> Result<()> {
    let services = build_services(&config, Arc::new(BroadcastBus::default())).await?;
    let rng: Arc<dyn RandomSource> = match config.seed {
        Some(seed) => Arc::new(SeededRandom::from_seed(seed)),
        None => Arc::new(SeededRandom::from_entropy()),
    };

    let driver = CycleDriver::start(claim, config.session, &services, rng).await?;
    let handle = driver.handle();

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.stop("interrupted");
        }
    });

    let outcome = driver.run().await;
    let snapshot = handle.snapshot().await;

    println!("Session {}", snapshot.session_id);
    println!("Claim: {}", snapshot.claim);
    println!("Outcome: {}", outcome);
    println!("Cycles completed: {}", snapshot.cycle_count);
    println!("Final support: {:.3}", snapshot.support);
    println!("Cost: ${:.4}", snapshot.cost_total);

    Ok(())
}

async fn serve(config: Config, port: u16) -> Result<()> {
    let bus = Arc::new(BroadcastBus::default());
    let services = build_services(&config, bus.clone()).await?;
    let registry = SessionRegistry::new(services, config.session, config.seed);

    api::serve(
        AppState {
            registry: Arc::new(registry),
            bus,
        },
        port,
    )
    .await
}
