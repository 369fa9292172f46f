//! Watermark configuration
//!
//! Everything the overlay builder needs is carried explicitly in
//! [`WatermarkConfig`]. Configs can be written by hand or loaded from YAML:
//!
//! ```yaml
//! layout:
//!   mode: centered-link
//!   primary_offset: 10
//! primary_text: site.example
//! secondary_text: Licensed copy
//! link_url: https://site.example
//! rotation_degrees: 30
//! ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::font::StandardFont;

/// Placeholder caption; a batch run that still uses it gets a warning
pub const DEFAULT_TEXT: &str = "watermark text";

/// Fill color with an explicit alpha channel, all components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(alias = "a")]
    pub alpha: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, alpha: f32) -> Self {
        Self { r, g, b, alpha }
    }

    /// Parse `#rrggbb` (leading `#` optional) with a separate alpha
    pub fn from_hex(hex: &str, alpha: f32) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidConfig(format!("expected #rrggbb color, got {:?}", hex)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|e| Error::InvalidConfig(format!("bad color {:?}: {}", hex, e)))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if [self.r, self.g, self.b, self.alpha].into_iter().all(in_range) {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "{} components must lie in [0, 1]: {:?}",
                name, self
            )))
        }
    }
}

/// Repeated diagonal text across the whole page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiledLayout {
    /// Horizontal distance between instances
    pub step_x: f32,
    /// Vertical distance between instances
    pub step_y: f32,
    /// How far the grid extends past each page edge
    pub margin: f32,
}

impl Default for TiledLayout {
    fn default() -> Self {
        Self {
            step_x: 130.0,
            step_y: 400.0,
            margin: 200.0,
        }
    }
}

/// One large rotated caption at the page center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteredLayout {
    /// Baseline of the primary text, relative to the rotated center
    pub primary_offset: f32,
    /// Baseline of the secondary text, relative to the rotated center
    pub secondary_offset: f32,
}

impl Default for CenteredLayout {
    fn default() -> Self {
        Self {
            primary_offset: 10.0,
            secondary_offset: -30.0,
        }
    }
}

/// Overlay layout algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Layout {
    Tiled(TiledLayout),
    CenteredLink(CenteredLayout),
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Tiled(TiledLayout::default())
    }
}

/// Full configuration consumed by the overlay builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub layout: Layout,
    pub primary_text: String,
    pub secondary_text: Option<String>,
    pub link_url: Option<String>,
    pub font: StandardFont,
    pub font_size_primary: f32,
    pub font_size_secondary: f32,
    pub color_primary: Rgba,
    pub color_secondary: Rgba,
    pub rotation_degrees: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            primary_text: DEFAULT_TEXT.to_string(),
            secondary_text: None,
            link_url: None,
            font: StandardFont::Helvetica,
            font_size_primary: 18.0,
            font_size_secondary: 10.0,
            color_primary: Rgba::new(0.09, 0.94, 0.92, 0.5),
            color_secondary: Rgba::new(0.2, 0.2, 0.2, 0.8),
            rotation_degrees: 45.0,
        }
    }
}

impl WatermarkConfig {
    /// Tiled diagonal text with the default grid
    pub fn tiled(text: impl Into<String>) -> Self {
        Self {
            primary_text: text.into(),
            ..Default::default()
        }
    }

    /// Centered rotated caption whose characters link to `url`
    pub fn centered_link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            layout: Layout::CenteredLink(CenteredLayout::default()),
            primary_text: text.into(),
            link_url: Some(url.into()),
            font_size_primary: 60.0,
            font_size_secondary: 20.0,
            color_primary: Rgba::new(0.5, 0.5, 0.5, 0.45),
            color_secondary: Rgba::new(0.5, 0.5, 0.5, 0.4),
            ..Default::default()
        }
    }

    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WatermarkConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check values that would make layout impossible
    ///
    /// Font sizes are checked when drawing, since an unrenderable size is a
    /// render failure rather than a config mistake.
    pub fn validate(&self) -> Result<()> {
        self.color_primary.validate("color_primary")?;
        self.color_secondary.validate("color_secondary")?;

        if !self.rotation_degrees.is_finite() {
            return Err(Error::InvalidConfig("rotation_degrees must be finite".to_string()));
        }

        match self.layout {
            Layout::Tiled(tiled) => {
                let positive = |v: f32| v.is_finite() && v > 0.0;
                if !positive(tiled.step_x) || !positive(tiled.step_y) {
                    return Err(Error::InvalidConfig(format!(
                        "tile steps must be positive, got {} x {}",
                        tiled.step_x, tiled.step_y
                    )));
                }
                if !tiled.margin.is_finite() || tiled.margin < 0.0 {
                    return Err(Error::InvalidConfig(format!(
                        "tile margin must be non-negative, got {}",
                        tiled.margin
                    )));
                }
            }
            Layout::CenteredLink(centered) => {
                if !centered.primary_offset.is_finite() || !centered.secondary_offset.is_finite() {
                    return Err(Error::InvalidConfig("text offsets must be finite".to_string()));
                }
                if self.link_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(Error::InvalidConfig(
                        "centered-link layout requires link_url".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Whether the caption is still the placeholder
    pub fn uses_default_text(&self) -> bool {
        self.primary_text.trim() == DEFAULT_TEXT
    }
}
