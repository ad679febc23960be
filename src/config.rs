//! TOML-backed configuration (§6 "Config file"): `[Fonts]`/`[Screen]`
//! groups for font metrics and terminal geometry.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

const MIN_FONT_SIZE: u32 = 8;
const MAX_FONT_SIZE: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Fonts {
    pub size: u32,
    #[serde(rename = "normal-roman")]
    pub normal_roman: String,
    #[serde(rename = "normal-bold")]
    pub normal_bold: String,
    #[serde(rename = "normal-italic")]
    pub normal_italic: String,
    #[serde(rename = "fpitch-roman")]
    pub fpitch_roman: String,
    #[serde(rename = "fpitch-bold")]
    pub fpitch_bold: String,
    #[serde(rename = "fpitch-italic")]
    pub fpitch_italic: String,
}

impl Default for Fonts {
    fn default() -> Self {
        Fonts {
            size: 12,
            normal_roman: "sans".to_string(),
            normal_bold: "sans:style=bold".to_string(),
            normal_italic: "sans:style=oblique".to_string(),
            fpitch_roman: "mono".to_string(),
            fpitch_bold: "mono:style=bold".to_string(),
            fpitch_italic: "mono:style=oblique".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Screen {
    pub lines: u16,
    pub columns: u16,
    pub fullscreen: bool,
}

impl Default for Screen {
    fn default() -> Self {
        Screen {
            lines: 24,
            columns: 80,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "Fonts")]
    pub fonts: Fonts,
    #[serde(rename = "Screen")]
    pub screen: Screen,
}

impl Config {
    /// Built-in defaults, used when no `-c`/`--conf` path is given.
    pub fn default_config() -> Self {
        Config::default()
    }

    /// Parse a config file, clamping `Fonts.size` to the valid range rather
    /// than rejecting it (matches the source's "set and move on" style).
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        let mut config: Config =
            toml::from_str(&text).map_err(|e| Error::Format(format!("config file: {e}")))?;
        config.fonts.size = config.fonts.size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_built_in_values() {
        let config = Config::default_config();
        assert_eq!(config.fonts.size, 12);
        assert_eq!(config.screen.columns, 80);
        assert!(!config.screen.fullscreen);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join("gruesome-config-test-partial.toml");
        std::fs::write(&path, "[Screen]\nlines = 40\n").unwrap();
        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.screen.lines, 40);
        assert_eq!(config.screen.columns, 80);
        assert_eq!(config.fonts.size, 12);
    }

    #[test]
    fn font_size_out_of_range_is_clamped() {
        let dir = std::env::temp_dir();
        let path = dir.join("gruesome-config-test-clamp.toml");
        std::fs::write(&path, "[Fonts]\nsize = 400\n").unwrap();
        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.fonts.size, MAX_FONT_SIZE);
    }
}
