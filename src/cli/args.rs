// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for docpipe

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::engine::{ExecutionMode, Priority};

#[derive(Parser)]
#[command(name = "docpipe")]
#[command(about = "Runs, publishes, and validates declarative document-processing pipelines")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a pipeline run for one document
    Run {
        #[arg(help = "Pipeline reference as scope/key")]
        pipeline: String,

        #[arg(long, help = "Application id")]
        app_id: String,

        #[arg(long, help = "Tenant id")]
        tenant_id: String,

        #[arg(long, help = "Patient id")]
        patient_id: String,

        #[arg(long, help = "Document id")]
        document_id: String,

        #[arg(long, help = "Priority: high, default or quarantine", default_value = "default")]
        priority: Priority,

        #[arg(long, help = "Override the configured execution mode (local or queued)")]
        mode: Option<ExecutionMode>,

        #[arg(long, help = "Reuse an existing run id instead of generating one")]
        run_id: Option<String>,

        #[arg(
            short = 'V',
            long = "var",
            help = "Seed context values (key=value, value parsed as JSON when possible)"
        )]
        vars: Vec<String>,

        #[arg(short, long, help = "Write the task results as JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Validate, store, and provision queues for a pipeline definition
    Publish {
        #[arg(help = "Path to pipeline YAML or JSON file")]
        pipeline: PathBuf,

        #[arg(long, help = "Application id used to expand queue templates")]
        app_id: String,

        #[arg(long, help = "Validate and expand queues without saving or provisioning")]
        dry_run: bool,
    },

    /// Print the physical queues a pipeline can dispatch to
    Queues {
        #[arg(help = "Path to pipeline YAML or JSON file")]
        pipeline: PathBuf,

        #[arg(long, help = "Application id used to expand queue templates")]
        app_id: String,
    },

    /// Validate a pipeline file without publishing it
    Validate {
        #[arg(help = "Path to pipeline YAML or JSON file")]
        pipeline: PathBuf,

        #[arg(long, help = "Treat warnings as errors")]
        strict: bool,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse `scope/key`
    pub fn parse_pipeline_ref(reference: &str) -> anyhow::Result<(String, String)> {
        match reference.split_once('/') {
            Some((scope, key)) if !scope.is_empty() && !key.is_empty() => {
                Ok((scope.to_string(), key.to_string()))
            }
            _ => Err(anyhow::anyhow!(
                "Invalid pipeline reference '{}'. Expected 'scope/key'",
                reference
            )),
        }
    }

    /// Parse context seed values from key=value format
    pub fn parse_variables(vars: &[String]) -> anyhow::Result<Map<String, Value>> {
        let mut variables = Map::new();

        for var in vars {
            if let Some((key, value)) = var.split_once('=') {
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                variables.insert(key.to_string(), value);
            } else {
                return Err(anyhow::anyhow!(
                    "Invalid variable format '{}'. Expected 'key=value'",
                    var
                ));
            }
        }

        Ok(variables)
    }
}
