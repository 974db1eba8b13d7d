use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Role of a command within the component lifecycle.
///
/// - `Build`: one-shot preparation (dependency install, compile).
/// - `Run`: the long-running application process.
/// - `Debug`: like `Run`, but started with a debugger attached.
/// - `Deploy`: outer-loop deployment (apply manifests, build images).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Build,
    Run,
    Debug,
    Deploy,
}

impl GroupKind {
    /// Commands of these groups are expected to keep running after launch.
    pub fn is_non_terminating(self) -> bool {
        matches!(self, GroupKind::Run | GroupKind::Debug)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupKind::Build => "build",
            GroupKind::Run => "run",
            GroupKind::Debug => "debug",
            GroupKind::Deploy => "deploy",
        };
        f.write_str(s)
    }
}

impl FromStr for GroupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(GroupKind::Build),
            "run" => Ok(GroupKind::Run),
            "debug" => Ok(GroupKind::Debug),
            "deploy" => Ok(GroupKind::Deploy),
            other => Err(format!(
                "invalid command group: {other} (expected build, run, debug or deploy)"
            )),
        }
    }
}

/// Which group drives the inner loop's long-running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Run,
    Debug,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Run
    }
}

impl RunMode {
    pub fn group(self) -> GroupKind {
        match self {
            RunMode::Run => GroupKind::Run,
            RunMode::Debug => GroupKind::Debug,
        }
    }
}

/// Pod Security Admission level enforced on the target namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodSecurityLevel {
    Privileged,
    Baseline,
    Restricted,
}

impl Default for PodSecurityLevel {
    fn default() -> Self {
        PodSecurityLevel::Privileged
    }
}

impl FromStr for PodSecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "privileged" => Ok(PodSecurityLevel::Privileged),
            "baseline" => Ok(PodSecurityLevel::Baseline),
            "restricted" => Ok(PodSecurityLevel::Restricted),
            other => Err(format!("unknown pod security level: {other}")),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    use std::time::Duration;

    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        unit => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration(" 1m "), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn rejects_missing_or_unknown_unit() {
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn run_and_debug_are_non_terminating() {
        assert!(GroupKind::Run.is_non_terminating());
        assert!(GroupKind::Debug.is_non_terminating());
        assert!(!GroupKind::Build.is_non_terminating());
        assert!(!GroupKind::Deploy.is_non_terminating());
        assert_eq!("Debug".parse::<GroupKind>(), Ok(GroupKind::Debug));
    }
}
