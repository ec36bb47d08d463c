// ABOUTME: Main application orchestration for docpipe CLI
// ABOUTME: Coordinates between CLI arguments, configuration, and command execution

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::commands;
use super::commands::RunRequest;
use super::{Args, Commands, Config};
use crate::engine::{DocumentIdentity, PipelineParameters};

pub struct App {
    config: Config,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let installed = match self.config.logging.format.as_str() {
            "json" => tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .with_target(false)
                .try_init(),
            "compact" => tracing_subscriber::fmt()
                .compact()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .try_init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .try_init(),
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the application with parsed arguments
    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting docpipe v{}", env!("CARGO_PKG_VERSION"));
        debug!("Configuration loaded from: {:?}", args.config);

        match args.command {
            Commands::Run {
                pipeline,
                app_id,
                tenant_id,
                patient_id,
                document_id,
                priority,
                mode,
                run_id,
                vars,
                output,
            } => {
                let (scope, key) = Args::parse_pipeline_ref(&pipeline)?;
                let mut seed = PipelineParameters::new(
                    DocumentIdentity::new(&app_id, &tenant_id, &patient_id, &document_id),
                    &scope,
                    &key,
                )
                .with_priority(priority);
                if let Some(run_id) = run_id {
                    seed = seed.with_run_id(&run_id);
                }

                let request = RunRequest {
                    seed,
                    context: Args::parse_variables(&vars)?,
                    mode: mode.unwrap_or(self.config.execution.mode),
                    output,
                };
                commands::run_pipeline(request, &self.config).await
            }

            Commands::Publish {
                pipeline,
                app_id,
                dry_run,
            } => commands::publish_pipeline(pipeline, &app_id, dry_run, &self.config).await,

            Commands::Queues { pipeline, app_id } => {
                commands::list_queues(pipeline, &app_id, &self.config).await
            }

            Commands::Validate { pipeline, strict } => {
                commands::validate_pipeline(pipeline, strict).await
            }
        }
    }

    /// Create application from command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}
