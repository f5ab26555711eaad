//! stackform command line interface
//!
//! # Usage
//!
//! ```bash
//! # Synthesize every stack of ./stackform.yaml to stdout
//! stackform synth
//!
//! # Write one template per stack
//! stackform synth --file app.yaml --out cdk.out
//!
//! # Check an app without emitting anything
//! stackform validate --file app.yaml
//!
//! # Inspect ARNs
//! stackform arn parse arn:aws:events:us-east-1:123456789012:event-bus/bus --format slash
//! stackform arn format --service events --resource event-bus --resource-name bus
//! ```

mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::ConfigLoader;
use stackform_core::{
    format_arn, parse_arn, render, ArnComponents, ArnFormat, Assembly, Expr, Stack, StackEnv,
};

#[derive(Parser)]
#[command(name = "stackform")]
#[command(version)]
#[command(about = "Synthesize deployment templates from stackform.yaml and inspect ARNs")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or pretty (default)
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    output: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize templates
    Synth {
        /// App file (default: $STACKFORM_APP, then ./stackform.yaml)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Directory to write `<stack>.template.json` files into
        #[arg(long)]
        out: Option<PathBuf>,

        /// Only emit this stack
        #[arg(long)]
        stack: Option<String>,

        /// Emit intrinsics as written instead of folding literal sub-trees
        #[arg(long)]
        no_fold: bool,
    },

    /// Compile and synthesize without writing anything
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// ARN helpers
    Arn {
        #[command(subcommand)]
        command: ArnCommands,
    },
}

#[derive(Subcommand)]
enum ArnCommands {
    /// Split a literal ARN into its components
    Parse {
        arn: String,

        /// Resource name layout: none, slash or colon
        #[arg(long, default_value = "none")]
        format: ArnFormat,
    },

    /// Build an ARN in an environment-agnostic stack
    Format {
        #[arg(long)]
        service: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        resource_name: Option<String>,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        account: Option<String>,
        /// Separator before the resource name: slash (default) or colon
        #[arg(long)]
        format: Option<ArnFormat>,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Synth {
            file,
            out,
            stack,
            no_fold,
        } => cmd_synth(file, out, stack, no_fold, cli.output),
        Commands::Validate { file } => cmd_validate(file, cli.output),
        Commands::Arn { command } => match command {
            ArnCommands::Parse { arn, format } => cmd_arn_parse(&arn, format, cli.output),
            ArnCommands::Format {
                service,
                resource,
                resource_name,
                partition,
                region,
                account,
                format,
            } => {
                let mut components = ArnComponents::new(service, resource);
                if let Some(name) = resource_name {
                    components = components.resource_name(name);
                }
                if let Some(f) = format {
                    components = components.format(f);
                }
                if let Some(p) = partition {
                    components = components.partition(p);
                }
                if let Some(r) = region {
                    components = components.region(r);
                }
                if let Some(a) = account {
                    components = components.account(a);
                }
                cmd_arn_format(&components, cli.output)
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.output == OutputFormat::Json {
                println!("{}", json!({ "error": format!("{:#}", e) }));
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackform=info,stackform_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_synth(
    file: Option<PathBuf>,
    out: Option<PathBuf>,
    stack: Option<String>,
    no_fold: bool,
    format: OutputFormat,
) -> Result<()> {
    let loader = ConfigLoader::from_env(file, no_fold)?;
    let assembly = loader.load()?.synth()?;
    let selected = select_templates(&assembly, stack.as_deref())?;

    if let Some(dir) = out {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let mut written = Vec::new();
        for (name, template) in &selected {
            let path = dir.join(format!("{}.template.json", name));
            std::fs::write(&path, to_json(template, OutputFormat::Pretty)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        match format {
            OutputFormat::Json => println!(
                "{}",
                json!({ "written": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>() })
            ),
            OutputFormat::Pretty => {
                for path in &written {
                    println!("{} {}", "wrote".green(), path.display());
                }
            }
        }
        return Ok(());
    }

    match (format, selected.as_slice()) {
        (_, [(_, template)]) if stack.is_some() => println!("{}", to_json(template, format)?),
        (OutputFormat::Json, _) => {
            let all: Map<String, Value> = selected
                .iter()
                .map(|(name, t)| (name.to_string(), (*t).clone()))
                .collect();
            println!("{}", to_json(&Value::Object(all), format)?);
        }
        (OutputFormat::Pretty, _) => {
            for (name, template) in &selected {
                println!("{}", format!("── {} ──", name).cyan().bold());
                println!("{}", to_json(template, format)?);
            }
        }
    }
    Ok(())
}

fn cmd_validate(file: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let loader = ConfigLoader::from_env(file, false)?;
    let assembly = loader.load()?.synth()?;
    let order = assembly.order();

    match format {
        OutputFormat::Json => println!("{}", json!({ "valid": true, "stacks": order })),
        OutputFormat::Pretty => println!(
            "{} {} is valid ({} stack(s): {})",
            "OK".green().bold(),
            loader.app_file().display(),
            order.len(),
            order.join(", ")
        ),
    }
    Ok(())
}

fn cmd_arn_parse(arn: &str, arn_format: ArnFormat, format: OutputFormat) -> Result<()> {
    let components = parse_arn(&Expr::string(arn), arn_format)?;
    let parts = arn_parts(&components);

    match format {
        OutputFormat::Json => println!("{}", Value::Object(parts)),
        OutputFormat::Pretty => {
            for (key, value) in &parts {
                let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                println!("{:>14}  {}", key.bold(), shown);
            }
        }
    }
    Ok(())
}

fn cmd_arn_format(components: &ArnComponents, format: OutputFormat) -> Result<()> {
    let stack = Stack::new("cli");
    let arn = stack.resolve(&format_arn(components, &StackEnv::agnostic()))?;
    let rendered = render(&arn);

    match (format, rendered.as_str()) {
        (OutputFormat::Pretty, Some(text)) => println!("{}", text),
        _ => println!("{}", to_json(&rendered, format)?),
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn select_templates<'a>(
    assembly: &'a Assembly,
    stack: Option<&str>,
) -> Result<Vec<(&'a str, &'a Value)>> {
    let all: Vec<(&str, &Value)> = assembly
        .templates()
        .map(|(name, t)| (name, t.as_value()))
        .collect();
    match stack {
        None => Ok(all),
        Some(wanted) => {
            let found: Vec<_> = all.into_iter().filter(|(name, _)| *name == wanted).collect();
            if found.is_empty() {
                return Err(anyhow!(
                    "stack '{}' not found (available: {})",
                    wanted,
                    assembly.order().join(", ")
                ));
            }
            Ok(found)
        }
    }
}

/// Components present in the ARN, rendered
fn arn_parts(components: &ArnComponents) -> Map<String, Value> {
    ["partition", "service", "region", "account", "resource", "resourceName"]
        .into_iter()
        .filter_map(|key| components.part(key).map(|e| (key.to_string(), render(e))))
        .collect()
}

fn to_json(value: &Value, format: OutputFormat) -> Result<String> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Pretty => serde_json::to_string_pretty(value),
    };
    text.context("JSON serialization failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arn_parts_slash() {
        let components = parse_arn(
            &Expr::string("arn:aws:events:us-east-1:123456789012:event-bus/my-bus"),
            ArnFormat::SlashResourceName,
        )
        .unwrap();
        assert_eq!(
            Value::Object(arn_parts(&components)),
            json!({
                "partition": "aws",
                "service": "events",
                "region": "us-east-1",
                "account": "123456789012",
                "resource": "event-bus",
                "resourceName": "my-bus"
            })
        );
    }

    #[test]
    fn test_arn_parts_without_name() {
        let components = parse_arn(
            &Expr::string("arn:aws:sqs:us-east-1:123456789012:queue"),
            ArnFormat::NoResourceName,
        )
        .unwrap();
        let parts = arn_parts(&components);
        assert!(!parts.contains_key("resourceName"));
        assert_eq!(parts["resource"], "queue");
    }

    #[test]
    fn test_select_unknown_stack_lists_available() {
        let mut app = stackform_core::App::new();
        app.add_stack(Stack::new("Only")).unwrap();
        let assembly = app.synth().unwrap();

        assert_eq!(select_templates(&assembly, None).unwrap().len(), 1);
        let err = select_templates(&assembly, Some("Other")).unwrap_err();
        assert_eq!(err.to_string(), "stack 'Other' not found (available: Only)");
    }

    #[test]
    fn test_cli_parses_arn_format() {
        let cli = Cli::try_parse_from([
            "stackform", "arn", "parse", "arn:aws:sqs:us-east-1:1:q", "--format", "colon", "-o", "json",
        ])
        .unwrap();
        assert!(cli.output == OutputFormat::Json);
        match cli.command {
            Commands::Arn {
                command: ArnCommands::Parse { format, .. },
            } => assert_eq!(format, ArnFormat::ColonResourceName),
            _ => panic!("expected arn parse"),
        }
    }
}
