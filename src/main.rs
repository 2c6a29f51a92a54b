use anyhow::{Context, Result};
use hookflow::builtin::{Operation, PipelineDefinition};
use hookflow::cli::commands::{CatalogCommand, RunCommand, ValidateCommand};
use hookflow::cli::output::*;
use hookflow::cli::{Cli, Command};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Catalog(cmd) => show_catalog(cmd)?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let definition = PipelineDefinition::from_file(&cmd.file)
        .context("Failed to load pipeline definition")?;

    if !cmd.json {
        println!(
            "{} Loaded pipeline: {} ({}, {} middleware)",
            INFO,
            style(&definition.name).bold(),
            definition.kind,
            style(definition.middleware.len()).cyan()
        );
    }

    let pipeline = definition.build().context("Failed to build pipeline")?;
    let initial = cmd.initial.clone().unwrap_or_else(|| definition.initial.clone());
    let context = cmd.context.clone().unwrap_or_else(|| definition.context.clone());

    let reports = pipeline
        .run_repeated(&definition.name, &initial, &context, cmd.repeat)
        .await;

    if cmd.json {
        let json = if reports.len() == 1 {
            serde_json::to_string_pretty(&reports[0])?
        } else {
            serde_json::to_string_pretty(&reports)?
        };
        println!("{}", json);
    } else {
        for report in &reports {
            println!("\n{}", format_report(report));
        }
    }

    if let Some(failed) = reports.iter().find(|r| !r.succeeded()) {
        if let Some(message) = &failed.error {
            error!("{}", message);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{} Validating pipeline...", INFO);
    }

    match PipelineDefinition::from_file(&cmd.file) {
        Ok(definition) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&definition)?);
                return Ok(());
            }

            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&definition.name).bold());
            println!("  Kind: {}", style(definition.kind).cyan());
            println!("  Middleware: {}", style(definition.middleware.len()).cyan());
            if let Some(limit) = definition.settings.executions_count_limit {
                println!("  Executions limit: {}", style(limit).cyan());
            }
            if definition.settings.return_on_first {
                println!("  {} Returns on first result", WARN);
            }
            for decl in &definition.middleware {
                println!("    {} {}", style(&decl.name).bold(), style(&decl.kind).dim());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn show_catalog(cmd: &CatalogCommand) -> Result<()> {
    if cmd.json {
        let entries: Vec<_> = Operation::ALL
            .iter()
            .map(|op| {
                serde_json::json!({
                    "kind": op.as_str(),
                    "description": describe_operation(*op),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{} Builtin middleware operations:", ROCKET);
    for op in Operation::ALL {
        println!("  {:<10} {}", style(op.as_str()).bold(), describe_operation(op));
    }
    Ok(())
}
