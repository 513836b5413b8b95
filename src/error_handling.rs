use crate::log_error;
use crate::logging::{LogCategory, LogContext};
use colored::*;
use std::fmt;

/// Error with actionable suggestions, printed by the binary in place of a raw chain
#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub error_type: ErrorType,
    pub message: String,
    pub suggestions: Vec<String>,
    pub technical_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorType {
    Connection,
    Configuration,
    Authentication,
    RateLimit,
    Timeout,
    Stream,
    Validation,
    Execution,
    General,
}

impl ErrorType {
    fn title(&self) -> &'static str {
        match self {
            ErrorType::Connection => "Connection Error",
            ErrorType::Configuration => "Configuration Error",
            ErrorType::Authentication => "Authentication Error",
            ErrorType::RateLimit => "Rate Limit",
            ErrorType::Timeout => "Timeout Error",
            ErrorType::Stream => "Stream Error",
            ErrorType::Validation => "Invalid Input",
            ErrorType::Execution => "Execution Error",
            ErrorType::General => "Error",
        }
    }
}

impl UserFriendlyError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            suggestions: Vec::new(),
            technical_details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions
            .extend(suggestions.into_iter().map(Into::into));
        self
    }

    pub fn with_technical_details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = Some(details.into());
        self
    }

    /// Print the error with its suggestions to stderr
    pub fn display(&self) {
        let context = LogContext::new()
            .with_component("error_handling")
            .with_operation("display_error")
            .with_error_code(format!("{:?}", self.error_type))
            .with_success(false);
        log_error!(
            LogCategory::System,
            format!("{:?}: {}", self.error_type, self.message),
            context
        );

        eprintln!(
            "{} {}: {}",
            "✗".red(),
            self.error_type.title().bold().red(),
            self.message
        );

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggested solutions:".bold().yellow());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", (i + 1).to_string().green(), suggestion);
            }
        }

        if let Some(details) = &self.technical_details {
            eprintln!();
            eprintln!("{}", "Technical details:".dimmed());
            eprintln!("   {}", details.dimmed());
        }
    }
}

impl fmt::Display for UserFriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UserFriendlyError {}

/// Classify an error into a user-friendly one with suggestions
pub fn enhance_error(error: &anyhow::Error) -> UserFriendlyError {
    let details = format!("{:#}", error);
    let error_msg = details.to_lowercase();

    if error_msg.contains("api key is not configured")
        || error_msg.contains("base url is not configured")
        || error_msg.contains("model is not configured")
    {
        return UserFriendlyError::new(
            ErrorType::Configuration,
            "The model connection is not configured yet",
        )
        .with_suggestions([
            "Set your key: wen config --api-key <KEY>",
            "Point at an OpenAI-compatible endpoint: wen config --base-url <URL>",
            "Choose a model: wen config --model <MODEL>",
        ])
        .with_technical_details(details);
    }

    if error_msg.contains("401") || error_msg.contains("unauthorized") || error_msg.contains("invalid api key") {
        return UserFriendlyError::new(ErrorType::Authentication, "The model endpoint rejected the API key")
            .with_suggestions([
                "Check the key with: wen config --show",
                "Replace it with: wen config --api-key <KEY>",
            ])
            .with_technical_details(details);
    }

    if error_msg.contains("429") || error_msg.contains("rate limit") || error_msg.contains("too many requests") {
        return UserFriendlyError::new(ErrorType::RateLimit, "Rate limit exceeded for the model endpoint")
            .with_suggestions(["Wait a moment and try again", "Check the usage limits of your account"])
            .with_technical_details(details);
    }

    if error_msg.contains("timed out") || error_msg.contains("timeout") {
        return UserFriendlyError::new(ErrorType::Timeout, "Timed out waiting for the model")
            .with_suggestions([
                "Try again, the endpoint may be busy",
                "Raise ai_timeout in the configuration file",
            ])
            .with_technical_details(details);
    }

    if error_msg.contains("failed to connect")
        || error_msg.contains("connection refused")
        || error_msg.contains("dns")
        || error_msg.contains("error sending request")
    {
        return UserFriendlyError::new(ErrorType::Connection, "Unable to reach the model endpoint")
            .with_suggestions([
                "Check your network connection",
                "Verify the base URL: wen config --show",
            ])
            .with_technical_details(details);
    }

    if error_msg.contains("stream") {
        return UserFriendlyError::new(ErrorType::Stream, "The answer stream ended unexpectedly")
            .with_suggestion("Ask again; the partial answer above is incomplete")
            .with_technical_details(details);
    }

    if error_msg.contains("config") {
        return UserFriendlyError::new(ErrorType::Configuration, "Configuration issue detected")
            .with_suggestions([
                "Inspect the configuration: wen config --show",
                "Reset to defaults by deleting the wenai/config.json file in your config directory",
            ])
            .with_technical_details(details);
    }

    if error_msg.contains("script") || error_msg.contains("exit code") || error_msg.contains("spawn") {
        return UserFriendlyError::new(ErrorType::Execution, "The script could not be run")
            .with_suggestions([
                "Review the script and run it manually",
                "Enable dry-run mode in the configuration to preview scripts",
            ])
            .with_technical_details(details);
    }

    if error_msg.contains("parameter") || error_msg.contains("invalid") {
        return UserFriendlyError::new(ErrorType::Validation, "Invalid input")
            .with_technical_details(details);
    }

    UserFriendlyError::new(ErrorType::General, "An unexpected error occurred")
        .with_suggestions(["Try the command again", "Report this issue if it persists"])
        .with_technical_details(details)
}

pub fn display_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn display_warning(message: &str) {
    println!("{} {}", "!".yellow(), message.yellow());
}

pub fn display_info(message: &str) {
    println!("{} {}", "i".cyan(), message.dimmed());
}

/// Display configuration change confirmations
pub fn display_config_change(setting: &str, old_value: &str, new_value: &str) {
    println!(
        "{} {}: {} → {}",
        "✓".green(),
        setting.bold(),
        old_value.dimmed(),
        new_value.green().bold()
    );
}

pub fn display_tip(message: &str) {
    println!("{}: {}", "Tip".bold().cyan(), message.dimmed());
}
