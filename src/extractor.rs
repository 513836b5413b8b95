use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Opening ```` ```code ```` fence, lazily matched up to the next closing fence.
/// Fences are not paired, so a closing fence directly followed by `code` opens a block.
const SCRIPT_FENCE_PATTERN: &str = r"(?s)```code\b(.*?)```";

/// `<label,kind>` where label is any run of word characters, non-Latin included
const PLACEHOLDER_PATTERN: &str = r"<(\w+),(string|url|number)>";

fn script_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SCRIPT_FENCE_PATTERN).expect("script fence pattern is valid"))
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern is valid"))
}

/// Type of value a placeholder expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Url,
    Number,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Url => "url",
            ParamKind::Number => "number",
        }
    }

    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "string" => Some(ParamKind::String),
            "url" => Some(ParamKind::Url),
            "number" => Some(ParamKind::Number),
            _ => None,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value the user must supply before the script can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamPlaceholder {
    pub label: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub value: Option<String>,
}

impl ParamPlaceholder {
    pub fn new(label: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            label: label.into(),
            kind,
            value: None,
        }
    }

    /// The literal token as it appears in the script
    pub fn token(&self) -> String {
        format!("<{},{}>", self.label, self.kind)
    }
}

/// The executable answer recovered from a complete response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenParams {
    pub script: String,
    pub placeholders: Vec<ParamPlaceholder>,
}

impl HiddenParams {
    pub fn has_parameters(&self) -> bool {
        !self.placeholders.is_empty()
    }

    pub fn has_script(&self) -> bool {
        !self.script.is_empty()
    }

    /// Substitute filled values into the script.
    ///
    /// Every occurrence of a token is replaced, so a token repeated in the
    /// script gets the value of its first filled entry.
    pub fn render_script(&self) -> Result<String> {
        let mut script = self.script.clone();
        for placeholder in &self.placeholders {
            let value = placeholder
                .value
                .as_deref()
                .ok_or_else(|| anyhow!("Parameter '{}' has no value", placeholder.label))?;
            script = script.replace(&placeholder.token(), value);
        }
        Ok(script)
    }
}

/// Recover the authoritative script and its placeholders from a full response.
///
/// Only the last ```` ```code ```` block counts; a response without one yields
/// an empty script and no placeholders.
pub fn extract(full_text: &str) -> HiddenParams {
    let script = last_script_block(full_text).unwrap_or_default();
    let placeholders = parse_placeholders(&script);
    HiddenParams {
        script,
        placeholders,
    }
}

fn last_script_block(text: &str) -> Option<String> {
    script_fence_regex()
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

/// Placeholders in order of appearance; each occurrence is its own entry
pub fn parse_placeholders(script: &str) -> Vec<ParamPlaceholder> {
    placeholder_regex()
        .captures_iter(script)
        .filter_map(|caps| {
            let kind = ParamKind::parse(caps.get(2)?.as_str())?;
            Some(ParamPlaceholder::new(caps.get(1)?.as_str(), kind))
        })
        .collect()
}
