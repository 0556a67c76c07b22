use clap::Parser;
use glitchygopher::agent::{build_agent, AgentExit};
use glitchygopher::cli::{self, Cli, Commands};
use glitchygopher::clock::SystemClock;
use glitchygopher::config::{AppConfig, Credentials};
use glitchygopher::coordination::{install_signal_handlers, ShutdownController, ShutdownListener};
use glitchygopher::error::{GopherError, Result};
use glitchygopher::logging::{init_logging, init_logging_simple};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;
    if cli.live {
        config.dry_run.enabled = false;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_logging(&config.logging);
            run_agent(config, None).await?;
        }
        Commands::Once => {
            init_logging(&config.logging);
            run_agent(config, Some(1)).await?;
        }
        Commands::State => {
            init_logging_simple();
            cli::show_state(&config).await?;
        }
        Commands::Posts { limit } => {
            init_logging_simple();
            cli::show_posts(&config, limit).await?;
        }
        Commands::Preview {
            kind,
            yield_10y,
            usd_jpy,
            headline,
        } => {
            init_logging_simple();
            cli::preview_post(&config, kind, yield_10y, usd_jpy, headline).await?;
        }
    }

    Ok(())
}

async fn run_agent(config: AppConfig, max_cycles: Option<u64>) -> Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        return Err(GopherError::Internal(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    // Absent credentials are fatal before the first cycle
    let credentials = Credentials::from_env(config.dry_run.enabled)?;
    let mut agent = build_agent(&config, &credentials, Arc::new(SystemClock)).await?;

    let listener = if max_cycles.is_some() {
        ShutdownListener::never()
    } else {
        let shutdown = Arc::new(ShutdownController::new());
        tokio::spawn(install_signal_handlers(shutdown.clone()));
        shutdown.listener()
    };

    match agent.run(listener, max_cycles).await {
        Ok(AgentExit::Shutdown) => info!("GlitchyGopher stopped after {} cycle(s)", agent.cycles()),
        Ok(AgentExit::CycleLimit) => info!("Cycle limit reached"),
        Err(e) => {
            error!(phase = %agent.phase(), "GlitchyGopher halted: {}", e);
            return Err(e);
        }
    }
    Ok(())
}
