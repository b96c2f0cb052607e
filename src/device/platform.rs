//! Built-in platform profiles for Netgate.
//!
//! A platform names a network OS CLI dialect (`cisco_iosxe`, `juniper_junos`, ...).
//! Its profile supplies everything the SSH session needs to drive that CLI:
//! the prompt pattern, session-setup commands, how to enter and leave
//! configuration mode, and the output markers that mean a command was rejected.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::GatewayError;

/// Supported device platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    CiscoIosxe,
    CiscoIosxr,
    CiscoNxos,
    AristaEos,
    JuniperJunos,
}

/// CLI behaviour for one platform.
pub struct PlatformProfile {
    pub name: &'static str,
    prompt_pattern: &'static str,
    /// Sent once after login, typically to disable paging.
    pub on_open: &'static [&'static str],
    pub config_enter: &'static str,
    /// Sent in order to leave configuration mode. Candidate-config platforms
    /// commit here.
    pub config_exit: &'static [&'static str],
    /// Sent instead of `config_exit` after a rejected statement.
    pub config_abort: &'static [&'static str],
    pub failure_markers: &'static [&'static str],
}

static CISCO_IOSXE: PlatformProfile = PlatformProfile {
    name: "cisco_iosxe",
    prompt_pattern: r"(?m)^[\w.\-@/:]{1,63}(\(config[\w.\-@/:+]{0,32}\))?[>#]\s*$",
    on_open: &["terminal length 0", "terminal width 512"],
    config_enter: "configure terminal",
    config_exit: &["end"],
    config_abort: &["end"],
    failure_markers: &[
        "% Ambiguous command",
        "% Incomplete command",
        "% Invalid input detected",
        "% Unknown command",
    ],
};

static CISCO_IOSXR: PlatformProfile = PlatformProfile {
    name: "cisco_iosxr",
    prompt_pattern: r"(?m)^[\w.\-@/:]{1,63}(\(config[\w.\-@/:+]{0,32}\))?#\s*$",
    on_open: &["terminal length 0", "terminal width 512"],
    config_enter: "configure terminal",
    config_exit: &["commit", "end"],
    config_abort: &["abort"],
    failure_markers: &[
        "% Ambiguous command",
        "% Incomplete command",
        "% Invalid input detected",
        "% Failed to commit",
    ],
};

static CISCO_NXOS: PlatformProfile = PlatformProfile {
    name: "cisco_nxos",
    prompt_pattern: r"(?m)^[\w.\-@/:]{1,63}(\(config[\w.\-@/:+]{0,32}\))?#\s*$",
    on_open: &["terminal length 0", "terminal width 511"],
    config_enter: "configure terminal",
    config_exit: &["end"],
    config_abort: &["end"],
    failure_markers: &[
        "% Ambiguous command",
        "% Incomplete command",
        "% Invalid command",
        "% Invalid input detected",
        "% Invalid number",
    ],
};

static ARISTA_EOS: PlatformProfile = PlatformProfile {
    name: "arista_eos",
    prompt_pattern: r"(?m)^[\w.\-@()/: ]{1,63}(\(config[\w.\-@/:+]{0,32}\))?[>#]\s*$",
    on_open: &["terminal length 0", "terminal width 32767"],
    config_enter: "configure terminal",
    config_exit: &["end"],
    config_abort: &["end"],
    failure_markers: &[
        "% Ambiguous command",
        "% Incomplete command",
        "% Invalid input",
        "% Cannot commit",
    ],
};

static JUNIPER_JUNOS: PlatformProfile = PlatformProfile {
    name: "juniper_junos",
    prompt_pattern: r"(?m)^[\w\-@()/:.]{1,63}[>#%]\s*$",
    on_open: &[
        "set cli screen-length 0",
        "set cli screen-width 511",
        "set cli complete-on-space off",
    ],
    config_enter: "configure",
    config_exit: &["commit and-quit"],
    config_abort: &["rollback 0", "exit configuration-mode"],
    failure_markers: &[
        "is ambiguous",
        "No valid completions",
        "unknown command",
        "syntax error",
        "error: commit failed",
    ],
};

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::CiscoIosxe,
        Platform::CiscoIosxr,
        Platform::CiscoNxos,
        Platform::AristaEos,
        Platform::JuniperJunos,
    ];

    pub fn profile(self) -> &'static PlatformProfile {
        match self {
            Platform::CiscoIosxe => &CISCO_IOSXE,
            Platform::CiscoIosxr => &CISCO_IOSXR,
            Platform::CiscoNxos => &CISCO_NXOS,
            Platform::AristaEos => &ARISTA_EOS,
            Platform::JuniperJunos => &JUNIPER_JUNOS,
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    /// Compiled prompt pattern, built once per platform.
    pub fn prompt(self) -> &'static Regex {
        static PROMPTS: OnceLock<Vec<Regex>> = OnceLock::new();
        let prompts = PROMPTS.get_or_init(|| {
            Platform::ALL
                .iter()
                .map(|p| Regex::new(p.profile().prompt_pattern).expect("valid regex"))
                .collect()
        });
        &prompts[self as usize]
    }

    /// First failure marker present in `output`, if any.
    pub fn failure_in(self, output: &str) -> Option<&'static str> {
        self.profile()
            .failure_markers
            .iter()
            .copied()
            .find(|marker| output.contains(marker))
    }
}

impl FromStr for Platform {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let supported: Vec<&str> = Platform::ALL.iter().map(|p| p.name()).collect();
                GatewayError::InvalidTarget(format!(
                    "unsupported platform '{}' (supported: {})",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
