use std::env;

/// Host facts injected into the system prompt so the model picks commands
/// that fit the machine it is driving.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub os: &'static str,
    pub cwd: String,
    pub username: String,
}

impl HostContext {
    pub fn capture() -> Self {
        let os = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        };

        let cwd = env::current_dir()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| String::from("."));

        let username = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| String::from("unknown"));

        Self { os, cwd, username }
    }

    pub fn render(&self) -> String {
        format!(
            "Host environment: os={}, cwd={}, user={}.",
            self.os, self.cwd, self.username
        )
    }
}
