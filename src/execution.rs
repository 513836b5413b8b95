use crate::config::ExecutionConfig;
use crate::logging::{self, LogCategory};
use crate::system_info::Shell;
use crate::validation::{SafetyChecker, SafetyWarning, SeverityLevel};
use crate::{log_debug, log_warning};
use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How a script run ended
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// `None` when the process was killed or ended by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub dry_run: bool,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.dry_run || self.exit_code == Some(0)
    }
}

/// Runs accepted scripts through the user's shell with inherited stdio
pub struct ScriptExecutor {
    shell: Shell,
    dry_run: bool,
    timeout: Option<Duration>,
    checker: SafetyChecker,
}

impl ScriptExecutor {
    pub fn new(config: &ExecutionConfig, shell: Shell) -> Self {
        let timeout = if config.timeout_secs > 0 {
            Some(Duration::from_secs(config.timeout_secs))
        } else {
            None
        };

        Self {
            shell,
            dry_run: config.dry_run,
            timeout,
            checker: SafetyChecker::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Safety warnings for `script`, most severe first
    pub fn review(&self, script: &str) -> Vec<SafetyWarning> {
        self.checker.check_script(script)
    }

    /// Program and arguments that run `script` in the configured shell
    pub fn command_line(&self, script: &str) -> (String, Vec<String>) {
        let script = script.to_string();
        match &self.shell {
            Shell::PowerShell => (
                "powershell".to_string(),
                vec!["-NoProfile".to_string(), "-Command".to_string(), script],
            ),
            Shell::Cmd => ("cmd".to_string(), vec!["/C".to_string(), script]),
            Shell::Bash | Shell::Zsh => (self.shell.name().to_string(), vec!["-c".to_string(), script]),
            // fish and unknown shells get POSIX sh, which every generated script targets
            Shell::Fish | Shell::Sh | Shell::Other(_) => {
                ("sh".to_string(), vec!["-c".to_string(), script])
            }
        }
    }

    /// Run the script to completion. Blocked scripts are refused here
    /// regardless of what the caller confirmed.
    pub async fn run(&self, script: &str) -> Result<ExecutionResult> {
        if script.trim().is_empty() {
            bail!("Script is empty, nothing to execute");
        }

        if let Some(blocked) = self
            .review(script)
            .into_iter()
            .find(|w| w.severity == SeverityLevel::Blocked)
        {
            log_warning!(
                LogCategory::Execution,
                format!("Refused blocked script: {}", blocked.description)
            );
            bail!("Script execution blocked: {}", blocked.description);
        }

        if self.dry_run {
            println!("{} {}", "DRY RUN:".yellow().bold(), script);
            return Ok(ExecutionResult {
                exit_code: None,
                duration: Duration::ZERO,
                dry_run: true,
                timed_out: false,
            });
        }

        let (program, args) = self.command_line(script);
        log_debug!(
            LogCategory::Execution,
            format!("Spawning {} with a {} byte script", program, script.len())
        );

        let start = Instant::now();
        let mut child = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let (status, timed_out) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => (Some(waited?), false),
                Err(_) => {
                    child
                        .kill()
                        .await
                        .map_err(|e| anyhow!("Failed to stop script after timeout: {}", e))?;
                    (None, true)
                }
            },
            None => (Some(child.wait().await?), false),
        };

        let duration = start.elapsed();
        let exit_code = status.and_then(|s| s.code());
        logging::with_logger(|logger| {
            logger.log_execution(exit_code, duration.as_millis() as u64)
        });

        Ok(ExecutionResult {
            exit_code,
            duration,
            dry_run: false,
            timed_out,
        })
    }
}
