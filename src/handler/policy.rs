// src/handler/policy.rs

/// What to do with a run command's remote process on a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartAction {
    /// First run: start it.
    Start,
    /// Stop the previous instance, then start.
    Restart,
    /// Hot-reload capable and already running: leave it alone.
    Keep,
}

pub fn restart_action(component_exists: bool, hot_reload_capable: bool) -> RestartAction {
    match (component_exists, hot_reload_capable) {
        (false, _) => RestartAction::Start,
        (true, false) => RestartAction::Restart,
        (true, true) => RestartAction::Keep,
    }
}
