//! Overlay construction
//!
//! An [`OverlayArtifact`] is a page-sized layer of watermark text plus the
//! clickable regions that go with it. It is pure geometry: nothing here touches
//! a PDF document, so layouts can be checked without rendering. The page
//! compositor turns an artifact into a Form XObject and link annotations.

use tracing::debug;
use crate::config::{CenteredLayout, Layout, Rgba, TiledLayout, WatermarkConfig};
use crate::error::{Error, Result};
use crate::font::{check_font_size, StandardFont};
use crate::layout::{PageSize, Point, Rect, Transform};

/// Distance of the tiled-mode link label from the bottom-right corner
const LABEL_MARGIN: f32 = 20.0;

/// Most text copies a tiled overlay may hold
const MAX_TILE_RUNS: usize = 10_000;

/// One piece of drawn text
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// WinAnsi bytes of `text`, as written to the content stream
    pub encoded: Vec<u8>,
    pub font: StandardFont,
    pub font_size: f32,
    pub color: Rgba,
    /// Origin of the run's rotated frame, in canvas coordinates
    pub position: Point,
    /// Rotation of the frame about `position`
    pub rotation_degrees: f32,
    /// Baseline start inside the rotated frame
    pub offset: Point,
}

impl TextRun {
    /// Matrix taking run-local text space to canvas space
    pub fn transform(&self) -> Transform {
        Transform::translate(self.offset.x, self.offset.y)
            .then(&Transform::rotate(self.rotation_degrees))
            .then(&Transform::translate(self.position.x, self.position.y))
    }
}

/// Which frame a clickable region's rectangle is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Canvas coordinates, usable as-is
    Page,
    /// The artifact's translated and rotated local frame
    Local,
}

/// A rectangle that becomes a link annotation
#[derive(Debug, Clone, PartialEq)]
pub struct ClickableRegion {
    pub rect: Rect,
    pub url: String,
    pub space: CoordinateSpace,
}

/// A rendered, page-sized watermark layer
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayArtifact {
    pub width: f32,
    pub height: f32,
    pub runs: Vec<TextRun>,
    pub regions: Vec<ClickableRegion>,
    /// Maps [`CoordinateSpace::Local`] rectangles into canvas coordinates
    pub local_frame: Transform,
}

impl OverlayArtifact {
    fn empty(size: PageSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            runs: Vec::new(),
            regions: Vec::new(),
            local_frame: Transform::identity(),
        }
    }

    pub fn size(&self) -> PageSize {
        PageSize::new(self.width, self.height)
    }

    /// Region rectangle expressed in canvas coordinates
    pub fn region_in_page_space(&self, region: &ClickableRegion) -> Rect {
        match region.space {
            CoordinateSpace::Page => region.rect,
            CoordinateSpace::Local => self.local_frame.map_rect(&region.rect),
        }
    }
}

/// Build the main overlay for a page of the given size
///
/// In tiled mode the result never carries clickable regions; use
/// [`build_overlays`] to also get the separate link label. A config that
/// fails [`WatermarkConfig::validate`] is rejected before any layout.
pub fn build_overlay(page_width: f32, page_height: f32, config: &WatermarkConfig) -> Result<OverlayArtifact> {
    let size = PageSize::new(page_width, page_height);
    if !size.is_valid() {
        return Err(Error::InvalidGeometry {
            width: page_width,
            height: page_height,
        });
    }
    config.validate()?;

    match config.layout {
        Layout::Tiled(tiled) => build_tiled(size, &tiled, config),
        Layout::CenteredLink(centered) => build_centered(size, &centered, config),
    }
}

/// Build every overlay a page needs, in drawing order
///
/// This is the main overlay, followed in tiled mode by a small link label when
/// `link_url` is configured.
pub fn build_overlays(page_width: f32, page_height: f32, config: &WatermarkConfig) -> Result<Vec<OverlayArtifact>> {
    let mut overlays = vec![build_overlay(page_width, page_height, config)?];

    if let (Layout::Tiled(_), Some(url)) = (&config.layout, &config.link_url) {
        overlays.push(build_link_label(PageSize::new(page_width, page_height), url, config)?);
    }

    Ok(overlays)
}

fn build_tiled(size: PageSize, tiled: &TiledLayout, config: &WatermarkConfig) -> Result<OverlayArtifact> {
    check_font_size(config.font_size_primary)?;
    let encoded = config.font.encode(&config.primary_text)?;
    let (columns, rows) = tile_counts(size, tiled)?;

    let mut artifact = OverlayArtifact::empty(size);
    if encoded.is_empty() {
        return Ok(artifact);
    }

    for row in 0..rows {
        let y = -tiled.margin + row as f32 * tiled.step_y;
        for column in 0..columns {
            let x = -tiled.margin + column as f32 * tiled.step_x;
            artifact.runs.push(TextRun {
                text: config.primary_text.clone(),
                encoded: encoded.clone(),
                font: config.font,
                font_size: config.font_size_primary,
                color: config.color_primary,
                position: Point::new(x, y),
                rotation_degrees: config.rotation_degrees,
                offset: Point::new(0.0, 0.0),
            });
        }
    }

    debug!(
        width = size.width,
        height = size.height,
        runs = artifact.runs.len(),
        "built tiled overlay"
    );
    Ok(artifact)
}

/// Grid columns and rows covering the page plus margin on every side
fn tile_counts(size: PageSize, tiled: &TiledLayout) -> Result<(usize, usize)> {
    let span = |extent: f32, step: f32| ((f64::from(extent) + 2.0 * f64::from(tiled.margin)) / f64::from(step)).ceil();
    let columns = span(size.width, tiled.step_x);
    let rows = span(size.height, tiled.step_y);

    if columns * rows > MAX_TILE_RUNS as f64 {
        return Err(Error::InvalidConfig(format!(
            "tile steps {} x {} need {} x {} copies on a {} x {} page (limit {})",
            tiled.step_x, tiled.step_y, columns, rows, size.width, size.height, MAX_TILE_RUNS
        )));
    }
    Ok((columns as usize, rows as usize))
}

fn build_centered(size: PageSize, centered: &CenteredLayout, config: &WatermarkConfig) -> Result<OverlayArtifact> {
    let font = config.font;
    check_font_size(config.font_size_primary)?;
    let primary = font.encode(&config.primary_text)?;

    let center = Point::new(size.width / 2.0, size.height / 2.0);
    let mut artifact = OverlayArtifact::empty(size);
    artifact.local_frame = Transform::rotate(config.rotation_degrees)
        .then(&Transform::translate(center.x, center.y));

    let primary_width = font.text_width(&primary, config.font_size_primary);
    let primary_start = -primary_width / 2.0;

    if !primary.is_empty() {
        artifact.runs.push(TextRun {
            text: config.primary_text.clone(),
            encoded: primary.clone(),
            font,
            font_size: config.font_size_primary,
            color: config.color_primary,
            position: center,
            rotation_degrees: config.rotation_degrees,
            offset: Point::new(primary_start, centered.primary_offset),
        });
    }

    if let Some(secondary_text) = config.secondary_text.as_deref().filter(|t| !t.is_empty()) {
        check_font_size(config.font_size_secondary)?;
        let secondary = font.encode(secondary_text)?;
        let secondary_width = font.text_width(&secondary, config.font_size_secondary);
        artifact.runs.push(TextRun {
            text: secondary_text.to_string(),
            encoded: secondary,
            font,
            font_size: config.font_size_secondary,
            color: config.color_secondary,
            position: center,
            rotation_degrees: config.rotation_degrees,
            offset: Point::new(-secondary_width / 2.0, centered.secondary_offset),
        });
    }

    if let Some(url) = config.link_url.as_deref() {
        artifact.regions = glyph_regions(
            font,
            config.font_size_primary,
            &primary,
            Point::new(primary_start, centered.primary_offset),
            url,
        );
    }

    debug!(
        width = size.width,
        height = size.height,
        regions = artifact.regions.len(),
        "built centered-link overlay"
    );
    Ok(artifact)
}

/// One local-frame rectangle per glyph, left to right from `origin`
///
/// Each box spans the glyph's advance horizontally and the font's
/// descent-to-ascent band vertically, computed at the drawing size.
fn glyph_regions(font: StandardFont, font_size: f32, encoded: &[u8], origin: Point, url: &str) -> Vec<ClickableRegion> {
    let scale = font_size / 1000.0;
    let bottom = origin.y + font.descent() * scale;
    let top = origin.y + font.ascent() * scale;

    let mut x = origin.x;
    encoded
        .iter()
        .map(|&code| {
            let advance = font.glyph_width(code) * scale;
            let rect = Rect::new(x, bottom, x + advance, top);
            x += advance;
            ClickableRegion {
                rect,
                url: url.to_string(),
                space: CoordinateSpace::Local,
            }
        })
        .collect()
}

/// Small upright link label anchored to the bottom-right corner
fn build_link_label(size: PageSize, url: &str, config: &WatermarkConfig) -> Result<OverlayArtifact> {
    let font = config.font;
    let font_size = config.font_size_secondary;
    check_font_size(font_size)?;

    let text = config
        .secondary_text
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(url);
    let encoded = font.encode(text)?;
    let width = font.text_width(&encoded, font_size);
    let scale = font_size / 1000.0;

    let baseline = Point::new(size.width - LABEL_MARGIN - width, LABEL_MARGIN);

    let mut artifact = OverlayArtifact::empty(size);
    artifact.regions.push(ClickableRegion {
        rect: Rect::new(
            baseline.x,
            baseline.y + font.descent() * scale,
            baseline.x + width,
            baseline.y + font.ascent() * scale,
        ),
        url: url.to_string(),
        space: CoordinateSpace::Page,
    });
    artifact.runs.push(TextRun {
        text: text.to_string(),
        encoded,
        font,
        font_size,
        color: config.color_secondary,
        position: baseline,
        rotation_degrees: 0.0,
        offset: Point::new(0.0, 0.0),
    });

    Ok(artifact)
}
