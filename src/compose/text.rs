use std::{fmt::Write as _, path::Path, sync::Arc};

use anyhow::Context as _;

use crate::{
    compose::surface::{Rgba8, Surface},
    foundation::error::AnimatorResult,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_svg(self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::Middle => "middle",
            Anchor::End => "end",
        }
    }
}

/// One line of text, positioned by its anchor point and vertical center.
#[derive(Clone, Debug)]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub weight: u16,
    pub anchor: Anchor,
    pub color: Rgba8,
    pub shadow: bool,
}

impl TextRun {
    pub fn centered(text: impl Into<String>, x: f64, y: f64, size: f64, weight: u16) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size,
            weight,
            anchor: Anchor::Middle,
            color: [255, 255, 255, 255],
            shadow: false,
        }
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn with_color(mut self, color: Rgba8) -> Self {
        self.color = color;
        self
    }
}

/// Rasterizes text runs through `usvg`/`resvg` against a shared font database.
#[derive(Clone)]
pub struct TextPainter {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl TextPainter {
    /// System fonts plus any `.ttf`/`.otf`/`.ttc` files in `fonts_dir`.
    pub fn new(fonts_dir: Option<&Path>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        let extra = fonts_dir.map_or(0, |dir| load_fonts_from_dir(&mut db, dir));
        tracing::debug!(faces = db.len(), extra, "font database ready");
        Self {
            fontdb: Arc::new(db),
        }
    }

    /// Draw `runs` over the current surface contents. Text is silently skipped when no font
    /// face can be resolved.
    pub fn draw(&self, surface: &mut Surface, runs: &[TextRun]) -> AnimatorResult<()> {
        if runs.is_empty() {
            return Ok(());
        }
        let svg = runs_to_svg(surface.width(), surface.height(), runs);
        let opts = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&svg, &opts).context("parse text overlay svg")?;
        surface.draw_svg(&tree);
        Ok(())
    }
}

fn runs_to_svg(width: u32, height: u32, runs: &[TextRun]) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    if runs.iter().any(|r| r.shadow) {
        svg.push_str(
            r#"<defs><filter id="shadow" x="-20%" y="-50%" width="140%" height="200%"><feDropShadow dx="0" dy="0" stdDeviation="6" flood-color="black" flood-opacity="0.4"/></filter></defs>"#,
        );
    }
    for run in runs {
        let [r, g, b, a] = run.color;
        let _ = write!(
            svg,
            r#"<text x="{x:.2}" y="{y:.2}" font-family="system-ui, sans-serif" font-size="{size:.2}" font-weight="{weight}" text-anchor="{anchor}" dominant-baseline="central" fill="rgb({r},{g},{b})" fill-opacity="{alpha:.3}"{filter}>{text}</text>"#,
            x = run.x,
            y = run.y,
            size = run.size,
            weight = run.weight,
            anchor = run.anchor.as_svg(),
            alpha = f64::from(a) / 255.0,
            filter = if run.shadow { r#" filter="url(#shadow)""# } else { "" },
            text = escape_xml(&run.text),
        );
    }
    svg.push_str("</svg>");
    svg
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Returns the number of faces added from `dir`.
fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) -> usize {
    let before = db.len();
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "fonts directory not readable");
        return 0;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        if let Err(err) = db.load_font_file(&path) {
            tracing::warn!(path = %path.display(), error = %err, "font file not loaded");
        }
    }
    db.len() - before
}
