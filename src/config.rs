use crate::error_handling::display_success;
use crate::logging::LogCategory;
use crate::renderer::{Frame, Palette, TextStyle, Theme};
use crate::{log_info, logging};
use anyhow::{anyhow, bail, Result};
use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_lang")]
    pub lang: String,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Milliseconds to wait for the model stream to open
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout: u64,

    #[serde(default)]
    pub debug_log: bool,
}

/// Connection to an OpenAI-compatible endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,
}

/// Which optional sections the model is asked to include
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default = "default_true")]
    pub explain: bool,

    #[serde(default)]
    pub extend_params: bool,

    #[serde(default = "default_true")]
    pub platform_perception: bool,

    #[serde(default)]
    pub user_and_dir: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_true")]
    pub colors: bool,

    #[serde(default = "default_header_text")]
    pub header_text: String,

    #[serde(default = "default_footer_text")]
    pub footer_text: String,

    #[serde(default = "default_heading_color")]
    pub heading_color: String,

    #[serde(default = "default_list_color")]
    pub list_color: String,

    #[serde(default = "default_code_color")]
    pub code_color: String,

    #[serde(default = "default_border_color")]
    pub border_color: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Print scripts instead of running them
    #[serde(default)]
    pub dry_run: bool,

    /// Kill the script after this many seconds; 0 waits forever
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_ai_timeout() -> u64 {
    120000
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_true() -> bool {
    true
}

fn default_header_text() -> String {
    "WenAI CLI".to_string()
}

fn default_footer_text() -> String {
    "END".to_string()
}

fn default_heading_color() -> String {
    "red".to_string()
}

fn default_list_color() -> String {
    "blue".to_string()
}

fn default_code_color() -> String {
    "bright black".to_string()
}

fn default_border_color() -> String {
    "cyan".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            explain: true,
            extend_params: false,
            platform_perception: true,
            user_and_dir: false,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            colors: true,
            header_text: default_header_text(),
            footer_text: default_footer_text(),
            heading_color: default_heading_color(),
            list_color: default_list_color(),
            code_color: default_code_color(),
            border_color: default_border_color(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            openai: OpenAiConfig::default(),
            answer: AnswerConfig::default(),
            render: RenderConfig::default(),
            execution: ExecutionConfig::default(),
            ai_timeout: default_ai_timeout(),
            debug_log: false,
        }
    }
}

fn parse_color(name: &str) -> Result<Color> {
    name.parse::<Color>()
        .map_err(|_| anyhow!("unknown color '{}' in render configuration", name))
}

impl RenderConfig {
    /// Build the renderer theme described by this section
    pub fn theme(&self) -> Result<Theme> {
        let heading = TextStyle::color(parse_color(&self.heading_color)?).bold();
        let list = TextStyle::color(parse_color(&self.list_color)?);
        let code = TextStyle::color(parse_color(&self.code_color)?);
        let border = TextStyle::color(parse_color(&self.border_color)?);

        let palette = Palette {
            heading,
            ordered_marker: list,
            unordered_marker: list,
            code,
            plain: TextStyle::default(),
        };
        let frame = Frame {
            border,
            ..Frame::default()
        }
        .with_captions(self.header_text.clone(), self.footer_text.clone());

        Ok(Theme {
            palette,
            frame,
            colors: self.colors,
            ..Theme::default()
        })
    }
}

/// Fields `wen config` can change
#[derive(Debug, Default, Clone)]
pub struct ConfigUpdate {
    pub lang: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.lang.is_none() && self.api_key.is_none() && self.base_url.is_none() && self.model.is_none()
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when the file is
    /// missing or unusable. A missing file is created with defaults.
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match serde_json::from_str::<Config>(&content) {
                    Ok(config) => {
                        if let Err(e) = Self::validate_config(&config) {
                            eprintln!(
                                "Warning: Invalid configuration detected: {}. Using defaults.",
                                e
                            );
                            return Self::default();
                        }
                        return config;
                    }
                    Err(e) => {
                        eprintln!(
                            "Warning: Failed to parse configuration: {}. Using defaults.",
                            e
                        );
                        return Self::default();
                    }
                }
            }
        }

        Self::create_default_config(Some(path.to_path_buf()))
    }

    fn create_default_config(config_path: Option<PathBuf>) -> Self {
        let default_config = Self::default();

        if let Some(path) = config_path {
            if !path.exists() {
                if let Some(parent) = path.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                let _ = fs::write(
                    path,
                    serde_json::to_string_pretty(&default_config).unwrap_or_default(),
                );
            }
        }

        default_config
    }

    pub fn validate_config(config: &Config) -> Result<()> {
        if config.ai_timeout == 0 {
            bail!("ai_timeout must be greater than 0");
        }

        if config.ai_timeout > 600000 {
            bail!("ai_timeout cannot exceed 10 minutes (600000ms)");
        }

        let base_url = &config.openai.base_url;
        if !base_url.is_empty() && !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("base_url must be a valid HTTP/HTTPS URL");
        }

        if config.execution.timeout_secs > 86400 {
            bail!("execution timeout cannot exceed one day (86400s)");
        }

        config.render.theme()?;

        Ok(())
    }

    /// Check that everything needed to talk to the model is present
    pub fn ensure_ready(&self) -> Result<()> {
        if self.openai.api_key.trim().is_empty() {
            bail!("API key is not configured");
        }
        if self.openai.base_url.trim().is_empty() {
            bail!("Base URL is not configured");
        }
        if self.openai.model.trim().is_empty() {
            bail!("Model is not configured");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path =
            Self::get_config_path().ok_or_else(|| anyhow!("Could not find config directory"))?;
        self.save_to(&config_path)?;
        display_success("Configuration saved successfully");
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        Self::validate_config(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        log_info!(LogCategory::Configuration, "Configuration saved successfully");
        Ok(())
    }

    /// Apply the given changes and return `(setting, old, new)` for each one
    pub fn apply_update(&mut self, update: ConfigUpdate) -> Result<Vec<(String, String, String)>> {
        let mut changes = Vec::new();

        if let Some(lang) = update.lang {
            changes.push(("lang".to_string(), std::mem::replace(&mut self.lang, lang.clone()), lang));
        }
        if let Some(api_key) = update.api_key {
            let old = mask_secret(&self.openai.api_key);
            self.openai.api_key = api_key.trim().to_string();
            changes.push(("api_key".to_string(), old, mask_secret(&self.openai.api_key)));
        }
        if let Some(base_url) = update.base_url {
            let base_url = base_url.trim().trim_end_matches('/').to_string();
            changes.push((
                "base_url".to_string(),
                std::mem::replace(&mut self.openai.base_url, base_url.clone()),
                base_url,
            ));
        }
        if let Some(model) = update.model {
            changes.push((
                "model".to_string(),
                std::mem::replace(&mut self.openai.model, model.clone()),
                model,
            ));
        }

        Self::validate_config(self)?;

        for (setting, old, new) in &changes {
            logging::with_logger(|logger| logger.log_config_change(setting, old, new));
        }

        Ok(changes)
    }

    /// Display current configuration with the key masked
    pub fn display(&self) {
        println!("{}", "wen configuration:".bold());
        println!("Language: {}", self.lang);
        println!("Base URL: {}", self.openai.base_url);
        println!("Model: {}", self.openai.model);
        println!("API key: {}", mask_secret(&self.openai.api_key));
        println!("AI timeout: {}ms", self.ai_timeout);
        println!();
        println!("{}", "Answer options:".bold());
        println!("Explanation: {}", on_off(self.answer.explain));
        println!("Common parameters: {}", on_off(self.answer.extend_params));
        println!("Platform perception: {}", on_off(self.answer.platform_perception));
        println!("User and directory: {}", on_off(self.answer.user_and_dir));
        println!();
        println!("{}", "Execution:".bold());
        println!("Dry-run mode: {}", on_off(self.execution.dry_run));
        match self.execution.timeout_secs {
            0 => println!("Script timeout: none"),
            secs => println!("Script timeout: {}s", secs),
        }
        if let Some(path) = Self::get_config_path() {
            println!();
            println!("File: {}", path.display());
        }
    }

    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("wenai");
            path.push("config.json");
            path
        })
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// Keep the first and last few characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "none".to_string(),
        n if n <= 8 => "********".to_string(),
        n => {
            let head: String = chars[..3].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}****{}", head, tail)
        }
    }
}
