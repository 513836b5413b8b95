use crate::config::{AnswerConfig, Config};
use crate::provider::ChatMessage;
use crate::system_info::SystemInfo;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn slot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("slot pattern is valid"))
}

/// Immutable prompt text with `{name}` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    text: &'static str,
}

impl PromptTemplate {
    pub const fn new(text: &'static str) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Fill every slot found in `values` in a single pass. Slots without a
    /// value stay verbatim and substituted text is never rescanned.
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        slot_regex()
            .replace_all(self.text, |caps: &Captures| match values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

const SYSTEM: PromptTemplate = PromptTemplate::new(
    "{role}\n\n{user_and_dir}\n\n{platform}\n\n{work_flow}\n\n{answer_rules}\n\n{answer_format}\n\n{language}",
);

const SCRIPT_ROLE: &str = "\
- Role: command-line expert who writes shell scripts for the user's system.
- Skills: operating systems (Linux, macOS, Windows) and shells (bash, zsh, fish, PowerShell), their differences and their flags.
- Goal: produce the single best script for the user's request on the target system, plus a clear explanation.
- Constraints: the script must be correct for the target system and shell. Explanations must be plain and short.";

const MANUAL_ROLE: &str = "\
- Role: cross-platform command expert who writes manual pages.
- Goal: explain a command the way a man page does, for the user's system: name, purpose, synopsis, options, examples and caveats.
- Constraints: stay accurate to the command's real behavior on the target system. Keep the language concise.";

const PLATFORM: PromptTemplate =
    PromptTemplate::new("-> Target system: the operating system is \"{platform}\" and the shell is \"{shell}\".");

const USER_AND_DIR: PromptTemplate =
    PromptTemplate::new("-> Target user: \"{user}\", working directory: \"{work_dir}\".");

const SCRIPT_STEPS: &[&str] = &[
    "Decide from the target user and working directory whether sudo is needed (never for root) and whether paths must be absolute.",
    "Write the single best script for the target system and shell.",
    "When several commands are needed, join them with the shell's command separator, for example: opkg update && opkg install <package_name,string>",
    "Answer in the reference format below.",
];

const MANUAL_STEPS: &[&str] = &[
    "Identify the command and the target operating system.",
    "Recall the command's official manual for that system and extract the essentials.",
    "Answer in the reference format below, covering any extra question the user asks.",
];

const SCRIPT_RULES: &str = "\
- Answer rules:
  1. The best script must be wrapped in a fence opened with ```code and closed with ```.
  2. Inside that fence every value the user must supply is written as <label,type>, where label is one word of letters, digits or underscores and type is one of url, string, number.
  3. Example of the fence content: curl -o <local_file,string> <download_url,url>
  4. Text inside <placeholder></placeholder> describes what to write there. Replace it and drop the tags.
  5. In a multi-turn conversation earlier answers may be wrong or badly formatted. Always answer the latest request completely in the reference format.";

const MANUAL_RULES: &str = "\
- Answer rules:
  1. Text inside <placeholder></placeholder> describes what to write there. Replace it and drop the tags.
  2. If the user adds a question about the command, answer it in the relevant section.";

const SCRIPT_FORMAT: PromptTemplate = PromptTemplate::new(
    "-> Reference answer format:
## Overview
<placeholder>what the script does, or why the request needs it</placeholder>

## Script to run:
```code
<placeholder>your best script</placeholder>
```
{script_explain}
{extend_params}",
);

const SCRIPT_EXPLAIN: &str = "
## Script analysis:
<placeholder>tool name: what it does
1. -a: <what the first flag does>
2. -b: <what the second flag does>
3. <and so on></placeholder>";

const EXTEND_PARAMS: &str = "
## Common parameters:
<placeholder>
1. -x: <a useful flag>
2. -y: <another useful flag>
3. <and so on, at most 5>
</placeholder>";

const MANUAL_FORMAT: &str = "-> Reference answer format:
## <command name>
<placeholder>one-line purpose</placeholder>

## Synopsis
<placeholder>syntax of the command</placeholder>

## Description
<placeholder>detailed description</placeholder>

## Options
<placeholder>the options and what they do</placeholder>

## Examples
<placeholder>usage examples</placeholder>

## Notes
<placeholder>caveats</placeholder>";

const MANUAL_QUESTION: PromptTemplate =
    PromptTemplate::new("Command to look up: {command}\nAdditional question: {question}");

/// Answer options plus the language the model should reply in
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOptions {
    pub answer: AnswerConfig,
    pub lang: String,
}

impl PromptOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            answer: config.answer.clone(),
            lang: config.lang.clone(),
        }
    }
}

fn language_line(lang: &str) -> String {
    let language = match lang {
        "zh" | "zh-CN" | "zh_CN" => "Simplified Chinese",
        "en" | "" => "English",
        other => other,
    };
    format!("-> Write every explanation in {}.", language)
}

fn numbered(steps: &[&str]) -> String {
    let mut text = String::from("- Workflow:");
    for (i, step) in steps.iter().enumerate() {
        text.push_str(&format!("\n  {}. {}", i + 1, step));
    }
    text
}

fn shared_values(options: &PromptOptions, info: &SystemInfo) -> HashMap<&'static str, String> {
    let mut values = HashMap::new();

    let platform = if options.answer.platform_perception {
        PLATFORM.render(&HashMap::from([
            ("platform", info.platform.clone()),
            ("shell", info.shell.name().to_string()),
        ]))
    } else {
        String::new()
    };
    let user_and_dir = if options.answer.user_and_dir {
        USER_AND_DIR.render(&HashMap::from([
            ("user", info.user.clone()),
            ("work_dir", info.work_dir.clone()),
        ]))
    } else {
        String::new()
    };

    values.insert("platform", platform);
    values.insert("user_and_dir", user_and_dir);
    values.insert("language", language_line(&options.lang));
    values
}

/// System prompt for once and chat mode
pub fn script_system_prompt(options: &PromptOptions, info: &SystemInfo) -> String {
    let answer_format = SCRIPT_FORMAT.render(&HashMap::from([
        (
            "script_explain",
            (if options.answer.explain { SCRIPT_EXPLAIN } else { "" }).to_string(),
        ),
        (
            "extend_params",
            (if options.answer.extend_params { EXTEND_PARAMS } else { "" }).to_string(),
        ),
    ]));

    let mut values = shared_values(options, info);
    values.insert("role", SCRIPT_ROLE.to_string());
    values.insert("work_flow", numbered(SCRIPT_STEPS));
    values.insert("answer_rules", SCRIPT_RULES.to_string());
    values.insert("answer_format", answer_format);
    collapse_blank_lines(&SYSTEM.render(&values))
}

pub fn manual_system_prompt(options: &PromptOptions, info: &SystemInfo) -> String {
    let mut values = shared_values(options, info);
    values.insert("role", MANUAL_ROLE.to_string());
    values.insert("work_flow", numbered(MANUAL_STEPS));
    values.insert("answer_rules", MANUAL_RULES.to_string());
    values.insert("answer_format", MANUAL_FORMAT.to_string());
    collapse_blank_lines(&SYSTEM.render(&values))
}

/// Drop the empty paragraphs left by disabled sections
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn once_messages(question: &str, options: &PromptOptions, info: &SystemInfo) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(script_system_prompt(options, info)),
        ChatMessage::user(question),
    ]
}

/// Messages for the next chat turn; `history` holds earlier user and assistant turns
pub fn chat_messages(
    question: &str,
    history: &[ChatMessage],
    options: &PromptOptions,
    info: &SystemInfo,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(script_system_prompt(options, info)));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(question));
    messages
}

pub fn manual_messages(
    command: &str,
    question: Option<&str>,
    options: &PromptOptions,
    info: &SystemInfo,
) -> Vec<ChatMessage> {
    let user = MANUAL_QUESTION.render(&HashMap::from([
        ("command", command.to_string()),
        ("question", question.unwrap_or("none").to_string()),
    ]));
    vec![
        ChatMessage::system(manual_system_prompt(options, info)),
        ChatMessage::user(user),
    ]
}
