//! Command-line front end for crest-smt
//!
//! Usage: crest-smt order|translate <model.json|dir>... [options]

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crest_smt::model::{EntityId, Model};
use crest_smt::smt::{Rational, Script, Term};
use crest_smt::{order, translate_step, BodyCache, MissingElse, ModelDefinition, TranslatorOptions};

mod cli;

use cli::{
    discover_models, filter_by_name, format_order, format_translation, ModifierReport, NameFilter, OrderReport,
    OutputFormat, TranslationReport,
};

#[derive(Parser)]
#[command(name = "crest-smt")]
#[command(about = "Translate CREST update functions into SMT constraints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the modifier execution order of an entity
    Order {
        /// Model files or directories of `*.json` models
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Dotted path of the entity to order (default: the model's root)
        #[arg(long)]
        entity: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Translate one simulation step into SMT constraints
    Translate {
        /// Model files or directories of `*.json` models
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Dotted path of the entity to translate (default: the model's root)
        #[arg(long)]
        entity: Option<String>,

        /// Only list modifiers whose name matches (supports `*`)
        #[arg(long)]
        only: Option<String>,

        /// Fix the step size, e.g. `0.5`
        #[arg(long)]
        dt: Option<String>,

        /// Treat a missing `else` as an empty block instead of failing
        #[arg(long)]
        allow_missing_else: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

fn main() {
    initialize_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Order { inputs, entity, format } => handle_order(&inputs, entity.as_deref(), format),
        Commands::Translate {
            inputs,
            entity,
            only,
            dt,
            allow_missing_else,
            format,
        } => {
            let options = TranslatorOptions {
                missing_else: if allow_missing_else {
                    MissingElse::Empty
                } else {
                    MissingElse::Reject
                },
                ..TranslatorOptions::default()
            };
            handle_translate(&inputs, entity.as_deref(), only.as_deref(), dt.as_deref(), &options, format)
        }
    };

    match result {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn initialize_logging() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_default();
    let filter = EnvFilter::from_str(&env_filter).unwrap_or_else(|_| EnvFilter::new(""));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .init();
}

fn handle_order(inputs: &[PathBuf], entity: Option<&str>, format: OutputFormat) -> Result<String> {
    let mut cache = BodyCache::new();
    let mut reports = Vec::new();
    for file in discover_models(inputs)? {
        let (model, entity) = load(&file, entity)?;
        let modifiers = order(&model, entity, &mut cache)
            .with_context(|| format!("failed to order `{}`", model.entity_path(entity)))?;
        reports.push(OrderReport {
            file: file.display().to_string(),
            entity: model.entity_path(entity),
            order: modifiers.into_iter().map(|m| model.modifier_name(m)).collect(),
        });
    }
    Ok(format_order(&reports, format))
}

fn handle_translate(
    inputs: &[PathBuf],
    entity: Option<&str>,
    only: Option<&str>,
    dt: Option<&str>,
    options: &TranslatorOptions,
    format: OutputFormat,
) -> Result<String> {
    let filter = only.map(NameFilter::new).transpose()?;
    let dt = dt
        .map(|text| Rational::parse_decimal(text).ok_or_else(|| anyhow!("invalid step size `{}`", text)))
        .transpose()?;

    let mut cache = BodyCache::new();
    let mut reports = Vec::new();
    for file in discover_models(inputs)? {
        let (model, entity) = load(&file, entity)?;
        let step = translate_step(&model, entity, options, &mut cache, dt.clone())
            .with_context(|| format!("failed to translate `{}`", model.entity_path(entity)))?;

        let modifiers = filter_by_name(step.modifiers, filter.as_ref(), |m| m.name.as_str());
        let smtlib = if format == OutputFormat::Smtlib {
            let mut script = Script::new();
            script.extend(step.step_size.clone());
            for modifier in &modifiers {
                script.extend(modifier.constraints.iter().cloned());
                for text in &modifier.passthrough {
                    script.pass_through(format!("{}: {}", modifier.name, text));
                }
            }
            script
                .assemble()
                .with_context(|| format!("cannot emit SMT-LIB for `{}`", model.entity_path(entity)))?
        } else {
            String::new()
        };

        reports.push(TranslationReport {
            file: file.display().to_string(),
            entity: model.entity_path(entity),
            step_size: step.step_size.as_ref().map(Term::sexpr),
            modifiers: modifiers
                .into_iter()
                .map(|m| ModifierReport {
                    name: m.name,
                    constraints: m.constraints.iter().map(Term::sexpr).collect(),
                    passthrough: m.passthrough,
                })
                .collect(),
            smtlib,
        });
    }
    let (hits, misses) = cache.stats();
    debug!(hits, misses, "body cache");
    Ok(format_translation(&reports, format))
}

/// Build the model in `file` and pick the entity to work on
fn load(file: &Path, entity: Option<&str>) -> Result<(Model, EntityId)> {
    let definition =
        ModelDefinition::from_path(file).with_context(|| format!("failed to load {}", file.display()))?;
    let (model, root) = definition
        .build()
        .with_context(|| format!("invalid model in {}", file.display()))?;
    let entity = match entity {
        Some(path) => model
            .resolve_entity_path(path)
            .ok_or_else(|| anyhow!("no entity `{}` in {}", path, file.display()))?,
        None => root,
    };
    Ok((model, entity))
}
