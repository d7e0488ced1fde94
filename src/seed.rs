use crate::model::FeedbackData;
use anyhow::Context;
use std::path::Path;

const BUNDLED_SEED: &str = include_str!("../fixtures/feedback-data.json");

pub fn parse(text: &str) -> anyhow::Result<FeedbackData> {
    let data: FeedbackData = serde_json::from_str(text).context("malformed seed document")?;
    Ok(data)
}

/// The seed document compiled into the binary.
pub fn bundled() -> FeedbackData {
    match parse(BUNDLED_SEED) {
        Ok(v) => v,
        Err(e) => {
            log::error!("bundled seed is unusable, starting empty: {e:#}");
            FeedbackData::default()
        }
    }
}

pub fn load_file(path: &Path) -> anyhow::Result<FeedbackData> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed {}", path.to_string_lossy()))?;
    parse(&text)
}

/// Seed from `path` when given and readable, otherwise the bundled document.
pub fn load(path: Option<&Path>) -> FeedbackData {
    let Some(path) = path else {
        return bundled();
    };
    match load_file(path) {
        Ok(v) => {
            log::info!("seeding from {}", path.to_string_lossy());
            v
        }
        Err(e) => {
            log::warn!("{e:#}; falling back to bundled seed");
            bundled()
        }
    }
}
