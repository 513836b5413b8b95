use crate::extractor::ParamKind;
use anyhow::{anyhow, bail, Result};
use regex::Regex;

/// Check a value typed for a placeholder against its kind
pub fn validate_param(input: &str, kind: ParamKind) -> Result<()> {
    if input.is_empty() {
        bail!("Parameter value cannot be empty");
    }

    match kind {
        ParamKind::String => {
            if input.trim().is_empty() {
                bail!("Parameter value cannot be empty");
            }
        }
        ParamKind::Url => {
            let parsed = reqwest::Url::parse(input.trim())
                .map_err(|e| anyhow!("Invalid URL '{}': {}", input, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("Invalid URL '{}': must start with http:// or https://", input);
            }
        }
        ParamKind::Number => {
            input
                .trim()
                .parse::<f64>()
                .map_err(|_| anyhow!("Invalid number '{}'", input))?;
        }
    }

    Ok(())
}

/// Severity levels for safety warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeverityLevel {
    /// Show warning but allow execution
    Warning,
    /// Require explicit confirmation
    Dangerous,
    /// Never allow execution
    Blocked,
}

struct SensitivePattern {
    pattern: Regex,
    severity: SeverityLevel,
    description: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyWarning {
    pub severity: SeverityLevel,
    pub description: String,
}

/// Flags scripts that destroy data or run remote code
pub struct SafetyChecker {
    patterns: Vec<SensitivePattern>,
}

impl SafetyChecker {
    pub fn new() -> Self {
        let rules: [(&str, SeverityLevel, &str); 9] = [
            (
                r":\(\)\s*\{.*:\s*\|.*:\s*&.*\}",
                SeverityLevel::Blocked,
                "Fork bomb detected: this will consume all system resources",
            ),
            (
                r"rm\s+(-[a-zA-Z]*\s+)*(/|/\*)\s*($|[;&|])",
                SeverityLevel::Blocked,
                "Deleting the root directory will destroy your system",
            ),
            (
                r"rm\s+(-[a-zA-Z]*\s+)*(\*|~|\$HOME)",
                SeverityLevel::Dangerous,
                "Recursive deletion of home or wildcard paths",
            ),
            (
                r"(curl|wget)\s+[^|]*\|\s*(sudo\s+)?(sh|bash|zsh|fish)\b",
                SeverityLevel::Dangerous,
                "Downloads a script and runs it without inspection",
            ),
            (
                r"chmod\s+(-R\s+)?777",
                SeverityLevel::Warning,
                "chmod 777 makes files world-writable",
            ),
            (
                r"dd\s+.*of=/dev/",
                SeverityLevel::Dangerous,
                "dd writes directly to a device and can destroy data",
            ),
            (
                r"mkfs(\.|\s)",
                SeverityLevel::Dangerous,
                "mkfs creates a new filesystem, destroying existing data",
            ),
            (
                r">\s*/dev/(sd[a-z]|nvme[0-9]|disk[0-9])",
                SeverityLevel::Dangerous,
                "Writes directly to a disk device",
            ),
            (
                r"(?i)Remove-Item\s+.*-Recurse.*\s(C:\\|~|\$HOME)",
                SeverityLevel::Dangerous,
                "Recursive deletion of a drive root or home directory",
            ),
        ];

        let patterns = rules
            .into_iter()
            .filter_map(|(pattern, severity, description)| {
                Regex::new(pattern).ok().map(|pattern| SensitivePattern {
                    pattern,
                    severity,
                    description,
                })
            })
            .collect();

        Self { patterns }
    }

    /// All warnings that apply to the script, most severe first
    pub fn check_script(&self, script: &str) -> Vec<SafetyWarning> {
        let mut warnings: Vec<SafetyWarning> = self
            .patterns
            .iter()
            .filter(|p| p.pattern.is_match(script))
            .map(|p| SafetyWarning {
                severity: p.severity,
                description: p.description.to_string(),
            })
            .collect();
        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        warnings
    }

    pub fn is_blocked(&self, script: &str) -> bool {
        self.check_script(script)
            .iter()
            .any(|w| w.severity == SeverityLevel::Blocked)
    }
}

impl Default for SafetyChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_rejected_for_every_kind() {
        for kind in [ParamKind::String, ParamKind::Url, ParamKind::Number] {
            assert!(validate_param("", kind).is_err());
        }
    }

    #[test]
    fn test_string_must_not_be_blank() {
        assert!(validate_param("   ", ParamKind::String).is_err());
        assert!(validate_param("out.txt", ParamKind::String).is_ok());
        assert!(validate_param(" spaced name ", ParamKind::String).is_ok());
    }

    #[test]
    fn test_url_requires_http_scheme() {
        assert!(validate_param("https://example.com/file.tar.gz", ParamKind::Url).is_ok());
        assert!(validate_param("http://127.0.0.1:8080", ParamKind::Url).is_ok());
        assert!(validate_param("ftp://example.com", ParamKind::Url).is_err());
        assert!(validate_param("example.com", ParamKind::Url).is_err());
        let err = validate_param("not a url", ParamKind::Url).unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_number_must_parse() {
        assert!(validate_param("42", ParamKind::Number).is_ok());
        assert!(validate_param("-3.5", ParamKind::Number).is_ok());
        assert!(validate_param("ten", ParamKind::Number).is_err());
    }

    #[test]
    fn test_safe_script_has_no_warnings() {
        let checker = SafetyChecker::new();
        assert!(checker.check_script("ls -la && du -sh *").is_empty());
        assert!(!checker.is_blocked("rm -rf ./build"));
    }

    #[test]
    fn test_blocked_scripts() {
        let checker = SafetyChecker::new();
        assert!(checker.is_blocked(":(){ :|:& };:"));
        assert!(checker.is_blocked("sudo rm -rf /"));
        assert!(checker.is_blocked("rm -rf /* && echo done"));
    }

    #[test]
    fn test_dangerous_scripts() {
        let checker = SafetyChecker::new();

        let warnings = checker.check_script("curl -fsSL https://x.sh | sudo bash");
        assert_eq!(warnings[0].severity, SeverityLevel::Dangerous);

        let warnings = checker.check_script("dd if=image.iso of=/dev/sdb bs=4M");
        assert_eq!(warnings[0].severity, SeverityLevel::Dangerous);
    }

    #[test]
    fn test_warnings_sorted_by_severity() {
        let checker = SafetyChecker::new();
        let warnings = checker.check_script("chmod 777 x; rm -rf ~");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].severity, SeverityLevel::Dangerous);
        assert_eq!(warnings[1].severity, SeverityLevel::Warning);
    }
}
