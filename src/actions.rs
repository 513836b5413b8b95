use crate::config::{Config, ConfigUpdate};
use crate::error_handling::{
    display_config_change, display_info, display_success, display_warning, enhance_error,
};
use crate::execution::ScriptExecutor;
use crate::extractor::{HiddenParams, ParamKind};
use crate::interactive::{resolve_script, Prompter};
use crate::logging::{self, LogCategory};
use crate::prompt::{chat_messages, manual_messages, once_messages, PromptOptions};
use crate::provider::{ChatMessage, ChatModel};
use crate::renderer::{TerminalRenderer, Theme};
use crate::report::{report_stream, report_stream_until, StreamOutcome, StreamReport};
use crate::stream::from_fragments;
use crate::system_info::SystemInfo;
use crate::validation::{validate_param, SeverityLevel};
use crate::{log_debug, log_info};
use anyhow::Result;
use colored::*;
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Earlier messages kept as chat context, counted without the system prompt
pub const CHAT_HISTORY_LIMIT: usize = 10;

/// Produces the future that cancels a running answer
pub type InterruptSource = fn() -> BoxFuture<'static, ()>;

fn ctrl_c() -> BoxFuture<'static, ()> {
    Box::pin(async {
        if tokio::signal::ctrl_c().await.is_err() {
            // Without a signal handler the answer simply cannot be interrupted
            std::future::pending::<()>().await
        }
    })
}

fn thinking_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message("Thinking...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Ties a model to the prompts, renderer theme and machine description
pub struct Assistant<M: ChatModel> {
    model: M,
    theme: Theme,
    options: PromptOptions,
    info: SystemInfo,
    interrupt: InterruptSource,
}

impl<M: ChatModel> Assistant<M> {
    pub fn new(model: M, config: &Config, info: SystemInfo) -> Result<Self> {
        Ok(Self {
            model,
            theme: config.render.theme()?,
            options: PromptOptions::from_config(config),
            info,
            interrupt: ctrl_c,
        })
    }

    /// Replace Ctrl-C as the way to stop an answer mid-stream
    pub fn with_interrupt(mut self, interrupt: InterruptSource) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Stream one answer to `out`. Failures to open the stream are returned;
    /// failures mid-stream are left in the report.
    pub async fn stream_answer<W: Write>(
        &self,
        messages: &[ChatMessage],
        out: W,
    ) -> Result<StreamReport> {
        let spinner = thinking_spinner();
        let opened = self.model.stream_chat(messages).await;
        spinner.finish_and_clear();
        let stream = opened?;

        let start = Instant::now();
        let mut renderer = TerminalRenderer::new(out, self.theme.clone());
        let report = report_stream_until(stream, &mut renderer, (self.interrupt)()).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        logging::with_logger(|logger| {
            logger.log_stream_summary(
                report.outcome.label(),
                report.full_text.chars().count(),
                report.hidden_params.placeholders.len(),
                duration_ms,
            )
        });
        Ok(report)
    }

    /// Render a short text in its own frame, outside of any model answer
    async fn render_panel<W: Write>(&self, header: &str, text: &str, out: W) -> Result<()> {
        let theme = self.theme.clone().with_captions(header, &self.theme.frame.footer_text);
        let mut renderer = TerminalRenderer::new(out, theme);
        let report = report_stream(from_fragments([text.to_string()]), &mut renderer).await;
        match report.render_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// `wen <question>`: answer once, then offer to run the script
    pub async fn once<R, W, O>(
        &self,
        question: &str,
        prompter: &mut Prompter<R, W>,
        executor: &ScriptExecutor,
        out: &mut O,
    ) -> Result<()>
    where
        R: BufRead,
        W: Write,
        O: Write,
    {
        let messages = once_messages(question, &self.options, &self.info);
        let report = self.stream_answer(&messages, &mut *out).await?;
        if matches!(report.outcome, StreamOutcome::Cancelled) {
            display_warning("Answer cancelled");
            return Ok(());
        }

        let mut report = report.into_result()?;
        offer_script(&mut report.hidden_params, prompter, executor).await
    }

    /// `wen chat`: multi-round conversation that ends with `q` or `f`
    pub async fn chat<R, W, O>(
        &self,
        first_question: Option<String>,
        prompter: &mut Prompter<R, W>,
        executor: &ScriptExecutor,
        out: &mut O,
    ) -> Result<()>
    where
        R: BufRead,
        W: Write,
        O: Write,
    {
        let mut question = match first_question {
            Some(q) if !q.trim().is_empty() => q,
            _ => ask_question(prompter)?,
        };
        let mut history: Vec<ChatMessage> = Vec::new();
        let mut round = 0;

        loop {
            round += 1;
            self.render_panel(
                "You",
                &format!("## Round {}\n{}\n", round, question),
                &mut *out,
            )
            .await?;

            let messages = chat_messages(&question, &history, &self.options, &self.info);
            let report = self.stream_answer(&messages, &mut *out).await?;
            match &report.outcome {
                StreamOutcome::Cancelled => {
                    display_warning("Answer cancelled, leaving chat");
                    return Ok(());
                }
                StreamOutcome::Failed(e) => enhance_error(e).display(),
                StreamOutcome::Completed => {}
            }

            self.render_panel(
                "Chat help",
                "1. q/quit -> leave the chat\n2. f/finish -> use the last answer\n3. anything else -> ask a follow-up\n",
                &mut *out,
            )
            .await?;

            let input = ask_question(prompter)?;
            match input.trim() {
                "q" | "Q" | "quit" => {
                    log_debug!(LogCategory::System, "Chat left by user");
                    return Ok(());
                }
                "f" | "F" | "finish" => {
                    let mut params = report.hidden_params;
                    return offer_script(&mut params, prompter, executor).await;
                }
                _ => {}
            }

            push_history(&mut history, &question, report.full_text);
            question = input;
        }
    }

    /// `wen manual --cmd <command>`: explain a command, nothing to run
    pub async fn manual<O: Write>(
        &self,
        command: &str,
        question: Option<&str>,
        out: &mut O,
    ) -> Result<()> {
        let messages = manual_messages(command, question, &self.options, &self.info);
        let report = self.stream_answer(&messages, &mut *out).await?;
        if matches!(report.outcome, StreamOutcome::Cancelled) {
            display_warning("Answer cancelled");
            return Ok(());
        }
        report.into_result()?;
        Ok(())
    }
}

fn ask_question<R: BufRead, W: Write>(prompter: &mut Prompter<R, W>) -> Result<String> {
    prompter.input("Your question", |input| validate_param(input, ParamKind::String))
}

/// Remember a finished round, keeping only the most recent messages
fn push_history(history: &mut Vec<ChatMessage>, question: &str, answer: String) {
    history.push(ChatMessage::user(question));
    history.push(ChatMessage::assistant(answer));
    if history.len() > CHAT_HISTORY_LIMIT {
        let excess = history.len() - CHAT_HISTORY_LIMIT;
        history.drain(..excess);
    }
}

/// Menu after an answer: fill, adjust or run the script, or leave
pub async fn offer_script<R, W>(
    params: &mut HiddenParams,
    prompter: &mut Prompter<R, W>,
    executor: &ScriptExecutor,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    if !params.has_script() {
        display_warning("No runnable script was found in the answer");
    }

    match resolve_script(prompter, params)? {
        Some(script) => run_script(&script, prompter, executor).await,
        None => {
            log_debug!(LogCategory::Execution, "Script not run");
            display_info("Script not run");
            Ok(())
        }
    }
}

/// Show safety warnings, confirm dangerous scripts, then execute
pub async fn run_script<R, W>(
    script: &str,
    prompter: &mut Prompter<R, W>,
    executor: &ScriptExecutor,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let warnings = executor.review(script);
    for warning in &warnings {
        let marker = match warning.severity {
            SeverityLevel::Blocked => "BLOCKED".red().bold(),
            SeverityLevel::Dangerous => "DANGER".red(),
            SeverityLevel::Warning => "WARNING".yellow(),
        };
        eprintln!("{} {}", marker, warning.description);
    }

    let dangerous = warnings
        .iter()
        .any(|w| w.severity == SeverityLevel::Dangerous);
    if dangerous && !executor.is_dry_run() && !prompter.confirm("This script is dangerous. Run it anyway?")? {
        log_info!(LogCategory::Execution, "Dangerous script declined");
        return Ok(());
    }

    let result = executor.run(script).await?;
    if result.dry_run {
        display_info("Dry-run mode is on, the script was not executed");
    } else if result.timed_out {
        display_warning("Script stopped after reaching its timeout");
    } else if !result.success() {
        match result.exit_code {
            Some(code) => display_warning(&format!("Script exited with code {}", code)),
            None => display_warning("Script was terminated by a signal"),
        }
    }
    Ok(())
}

/// `wen config`: show the configuration, or apply and save changes
pub fn configure(config: &mut Config, update: ConfigUpdate, path: &Path) -> Result<()> {
    if update.is_empty() {
        config.display();
        return Ok(());
    }

    let changes = config.apply_update(update)?;
    config.save_to(path)?;
    for (setting, old, new) in &changes {
        display_config_change(setting, old, new);
    }
    display_success("Configuration saved");
    Ok(())
}
