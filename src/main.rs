//! script-kit-bridge - run a single prompt against the app over stdio
//!
//! ```bash
//! script-kit-bridge arg --placeholder "Pick a fruit" --choice apple --choice pear
//! script-kit-bridge div "<h1>Hello</h1>"
//! script-kit-bridge info ~/.kit/scripts/daily-report.ts
//! ```
//!
//! While a prompt runs stdout carries the protocol, so its result goes to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use script_kit_bridge::choices::Choice;
use script_kit_bridge::collab::{MetadataScriptResolver, ScriptResolver};
use script_kit_bridge::error_prompt::report_error;
use script_kit_bridge::{config, logging, Kit, PromptConfig, Result};

/// Script side of the Script Kit prompt protocol
#[derive(Parser, Debug)]
#[command(name = "script-kit-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Script path reported to the app
    #[arg(long, default_value = "script-kit-bridge")]
    script: String,

    /// Override the config file (also: KIT_BRIDGE_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask for text or one of the given choices
    Arg(ArgCommand),
    /// Show HTML until the user continues
    Div(DivCommand),
    /// Print a script's metadata
    Info { path: PathBuf },
}

#[derive(clap::Args, Debug)]
struct ArgCommand {
    #[arg(long, default_value = "")]
    placeholder: String,

    #[arg(long = "choice")]
    choices: Vec<String>,

    #[arg(long)]
    ignore_blur: bool,

    /// Pre-supplied answers, consumed before prompting
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct DivCommand {
    html: String,

    #[arg(long, default_value = "")]
    container_class: String,
}

enum Prompt {
    Arg(ArgCommand),
    Div(DivCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let _guard = logging::init(Some(&settings.log_dir()));

    let prompt = match args.command {
        Command::Info { path } => return print_info(&path),
        Command::Arg(command) => Prompt::Arg(command),
        Command::Div(command) => Prompt::Div(command),
    };

    let pre_supplied = match &prompt {
        Prompt::Arg(command) => command.args.clone(),
        Prompt::Div(_) => Vec::new(),
    };
    let kit = Kit::stdio(settings, args.script, pre_supplied);

    match run(&kit, prompt).await {
        Ok(value) => {
            info!("Prompt resolved");
            eprintln!("{}", value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_error(kit.bus(), kit.script_path(), &e);
            if e.is_control_flow() {
                ExitCode::SUCCESS
            } else {
                error!(error = %e, "Prompt failed");
                ExitCode::FAILURE
            }
        }
    }
}

fn print_info(path: &Path) -> ExitCode {
    let info = match MetadataScriptResolver::new().resolve(path) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&info) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Could not serialize script info");
            ExitCode::FAILURE
        }
    }
}

async fn run(kit: &Kit, prompt: Prompt) -> Result<Value> {
    let value = match prompt {
        Prompt::Arg(command) => {
            let mut config = PromptConfig::new()
                .placeholder(command.placeholder)
                .ignore_blur(command.ignore_blur);
            if !command.choices.is_empty() {
                let choices: Vec<Choice> = command
                    .choices
                    .into_iter()
                    .map(|c| Choice::new(c.clone(), c))
                    .collect();
                config = config.choices(choices);
            }
            kit.arg(config).await?
        }
        Prompt::Div(command) => kit.div(&command.html, &command.container_class).await?,
    };
    Ok(value.into_value())
}
