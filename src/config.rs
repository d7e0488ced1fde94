use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "FEEDBACKD_WORKSPACE";
pub const ENV_SEED: &str = "FEEDBACKD_SEED";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Workspace opened at startup; otherwise the client sends `workspace.select`.
    pub workspace: Option<PathBuf>,
    /// Seed document used when a workspace has no record yet.
    pub seed_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            workspace: path(ENV_WORKSPACE),
            seed_path: path(ENV_SEED),
        }
    }
}
