use anyhow::anyhow;
use clap::{Parser, Subcommand};
use colored::*;
use std::time::Duration;
use wenai::actions::{configure, Assistant};
use wenai::config::{Config, ConfigUpdate};
use wenai::error_handling::{display_tip, enhance_error};
use wenai::execution::ScriptExecutor;
use wenai::interactive::Prompter;
use wenai::logging::{init_logger, with_logger};
use wenai::provider::OpenAiProvider;
use wenai::system_info::SystemInfo;

#[derive(Parser)]
#[command(name = "wen")]
#[command(version)]
#[command(about = "wen: ask for a shell script, read it as it streams, run it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// The question to ask
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    question: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Multi-round conversation; q quits, f runs the last answer's script
    Chat {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        question: Vec<String>,
    },
    /// Explain a command the way a manual page would
    Manual {
        /// Name of the command to explain
        #[arg(long = "cmd")]
        command: String,
        /// What you want to know about it
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Show or change the configuration
    Config {
        /// Answer language, e.g. en or zh
        #[arg(long)]
        lang: Option<String>,
        /// API key of the OpenAI-compatible endpoint
        #[arg(long)]
        api_key: Option<String>,
        /// Base URL of the endpoint, e.g. https://api.openai.com/v1
        #[arg(long)]
        base_url: Option<String>,
        /// Model name
        #[arg(long)]
        model: Option<String>,
        /// Print the current configuration
        #[arg(long)]
        show: bool,
    },
}

fn joined(words: &[String]) -> Option<String> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn assistant(config: &Config, info: SystemInfo) -> anyhow::Result<Assistant<OpenAiProvider>> {
    config.ensure_ready()?;
    let provider = OpenAiProvider::new(&config.openai, Duration::from_millis(config.ai_timeout));
    Assistant::new(provider, config, info)
}

async fn run(cli: Cli, config: &mut Config) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();

    match cli.command {
        Some(Commands::Config {
            lang,
            api_key,
            base_url,
            model,
            show,
        }) => {
            let update = ConfigUpdate {
                lang,
                api_key,
                base_url,
                model,
            };
            if show && update.is_empty() {
                config.display();
                return Ok(());
            }
            let path = Config::get_config_path()
                .ok_or_else(|| anyhow!("Could not determine the configuration directory"))?;
            configure(config, update, &path)
        }
        Some(Commands::Chat { question }) => {
            let info = SystemInfo::detect();
            let executor = ScriptExecutor::new(&config.execution, info.shell.clone());
            let mut prompter = Prompter::stdio();
            assistant(config, info)?
                .chat(joined(&question), &mut prompter, &executor, &mut stdout)
                .await
        }
        Some(Commands::Manual { command, question }) => {
            let question = joined(&question);
            assistant(config, SystemInfo::detect())?
                .manual(&command, question.as_deref(), &mut stdout)
                .await
        }
        None => {
            let Some(question) = joined(&cli.question) else {
                println!("{}", "wen".bold().cyan());
                println!(
                    "Ask anything. Try: {} {}",
                    "wen".green(),
                    "find files larger than 100MB".dimmed()
                );
                display_tip("Run 'wen config --api-key <key>' first if you have not yet");
                return Ok(());
            };

            let info = SystemInfo::detect();
            let executor = ScriptExecutor::new(&config.execution, info.shell.clone());
            let mut prompter = Prompter::stdio();
            assistant(config, info)?
                .once(&question, &mut prompter, &executor, &mut stdout)
                .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = Config::load();

    if let Err(e) = init_logger(config.debug_log) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }
    with_logger(|logger| {
        let platform = format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);
        logger.log_startup(env!("CARGO_PKG_VERSION"), &platform)
    });

    if let Err(e) = run(cli, &mut config).await {
        enhance_error(&e).display();
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_question_is_once_mode() {
        let cli = Cli::parse_from(["wen", "list", "-la", "files"]);
        assert!(cli.command.is_none());
        assert_eq!(joined(&cli.question).as_deref(), Some("list -la files"));
    }

    #[test]
    fn test_manual_arguments() {
        let cli = Cli::parse_from(["wen", "manual", "--cmd", "tar", "how", "to", "extract"]);
        match cli.command {
            Some(Commands::Manual { command, question }) => {
                assert_eq!(command, "tar");
                assert_eq!(joined(&question).as_deref(), Some("how to extract"));
            }
            _ => panic!("expected manual command"),
        }
    }

    #[test]
    fn test_config_flags() {
        let cli = Cli::parse_from(["wen", "config", "--model", "gpt-4o", "--show"]);
        match cli.command {
            Some(Commands::Config { model, show, lang, .. }) => {
                assert_eq!(model.as_deref(), Some("gpt-4o"));
                assert!(show);
                assert!(lang.is_none());
            }
            _ => panic!("expected config command"),
        }
    }

    #[test]
    fn test_empty_question_is_none() {
        assert_eq!(joined(&[]), None);
        assert_eq!(joined(&["  ".to_string()]), None);
    }
}
