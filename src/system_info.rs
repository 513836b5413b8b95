use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Shell families the executor knows how to drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Sh,
    PowerShell,
    Cmd,
    Other(String),
}

impl Shell {
    /// Classify a shell from its executable path or name
    pub fn from_path(path: &str) -> Self {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_lowercase();
        let name = name.trim_end_matches(".exe");

        match name {
            "bash" => Shell::Bash,
            "zsh" => Shell::Zsh,
            "fish" => Shell::Fish,
            "sh" | "dash" | "ash" => Shell::Sh,
            "powershell" | "pwsh" => Shell::PowerShell,
            "cmd" => Shell::Cmd,
            other => Shell::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
            Shell::Sh => "sh",
            Shell::PowerShell => "powershell",
            Shell::Cmd => "cmd",
            Shell::Other(name) => name,
        }
    }
}

/// What the model is told about the machine it writes scripts for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// e.g. "Ubuntu 22.04.3 LTS (x86_64)"
    pub platform: String,
    pub shell: Shell,
    pub user: String,
    pub work_dir: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            platform: detect_platform(),
            shell: detect_shell(),
            user: detect_user(),
            work_dir: std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self.shell, Shell::PowerShell | Shell::Cmd)
    }
}

fn detect_platform() -> String {
    let arch = std::env::consts::ARCH;
    let name = match std::env::consts::OS {
        "linux" => fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| pretty_name(&content))
            .unwrap_or_else(|| "Linux".to_string()),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    };
    format!("{} ({})", name, arch)
}

/// `PRETTY_NAME` from an os-release file
fn pretty_name(os_release: &str) -> Option<String> {
    os_release
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

fn detect_shell() -> Shell {
    if let Ok(shell_path) = std::env::var("SHELL") {
        if !shell_path.is_empty() {
            return Shell::from_path(&shell_path);
        }
    }

    if cfg!(windows) {
        if std::env::var("PSModulePath").is_ok() {
            return Shell::PowerShell;
        }
        if std::env::var("ComSpec").is_ok() {
            return Shell::Cmd;
        }
    }

    if cfg!(unix) {
        Shell::Sh
    } else {
        Shell::Other("unknown".to_string())
    }
}

fn detect_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_does_not_panic() {
        let info = SystemInfo::detect();
        assert!(!info.platform.is_empty());
        assert!(info.platform.contains(std::env::consts::ARCH));
        assert!(!info.user.is_empty());
        assert!(!info.work_dir.is_empty());
    }

    #[test]
    fn test_shell_from_path() {
        assert_eq!(Shell::from_path("/bin/bash"), Shell::Bash);
        assert_eq!(Shell::from_path("/usr/bin/zsh"), Shell::Zsh);
        assert_eq!(Shell::from_path("/bin/dash"), Shell::Sh);
        assert_eq!(Shell::from_path("pwsh.exe"), Shell::PowerShell);
        assert_eq!(Shell::from_path("CMD.EXE"), Shell::Cmd);
        assert_eq!(Shell::from_path("/opt/nu"), Shell::Other("nu".to_string()));
    }

    #[test]
    fn test_shell_names() {
        assert_eq!(Shell::PowerShell.name(), "powershell");
        assert_eq!(Shell::Other("nu".to_string()).name(), "nu");
    }

    #[test]
    fn test_pretty_name() {
        let os_release = "NAME=\"Ubuntu\"\nPRETTY_NAME=\"Ubuntu 22.04.3 LTS\"\nID=ubuntu\n";
        assert_eq!(pretty_name(os_release), Some("Ubuntu 22.04.3 LTS".to_string()));
        assert_eq!(pretty_name("ID=arch\n"), None);
        assert_eq!(pretty_name("PRETTY_NAME=\"\"\n"), None);
    }

    #[test]
    fn test_is_windows() {
        let mut info = SystemInfo::detect();
        info.shell = Shell::PowerShell;
        assert!(info.is_windows());
        info.shell = Shell::Bash;
        assert!(!info.is_windows());
    }
}
