use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Marker for [`SplitConfig::name_prefix`] meaning "use the source playlist's name"
pub const SOURCE_NAME_PREFIX: &str = "{source}";

const DEFAULT_STYLE: &str = "Group the songs by musical style and content. Give each playlist a \
short, unique name and a one-sentence description.";

/// What the classifier is asked to produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDirective {
    pub group_count: usize,
    pub style: String,
}

/// Settings for a split run, loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub group_count: usize, // Number of sub-playlists to ask for
    pub style: String,      // Free-text instructions passed to the classifier
    pub public: bool,       // Visibility of the created playlists
    /// Prefix for created playlist names; `"{source}"` uses the source playlist name
    pub name_prefix: Option<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            group_count: 5,
            style: DEFAULT_STYLE.to_string(),
            public: true,
            name_prefix: None,
        }
    }
}

impl SplitConfig {
    /// Load split settings from a JSON file
    pub fn load_from_file(path: &str) -> Result<SplitConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read split configuration '{path}'"))?;
        let config: SplitConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse split configuration '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_count == 0 {
            anyhow::bail!("group_count must be at least 1");
        }
        Ok(())
    }

    pub fn directive(&self) -> ClassificationDirective {
        ClassificationDirective {
            group_count: self.group_count,
            style: self.style.clone(),
        }
    }
}
