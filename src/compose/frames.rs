//! Card and frame layouts painted onto the shared [`Surface`].
//!
//! The canvas is split into a content region on top and a footer strip at the bottom. All sizes
//! below are authored for a 1080px-high canvas and scaled linearly for other heights.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use kurbo::Rect;
use tracing::warn;

use crate::{
    compose::{
        legend::LegendRegistry,
        surface::{DecodedImage, Rgba8, Surface},
        text::{Anchor, TextPainter, TextRun},
    },
    fetch::Frame,
    foundation::{
        core::Canvas,
        error::{AnimatorError, AnimatorResult},
    },
    layers::{LayerCatalog, LayerGroup},
};

const CARD_BG: Rgba8 = [17, 17, 17, 255];
const DIVIDER: Rgba8 = [42, 42, 42, 255];
const CONTENT_BG: Rgba8 = [10, 10, 12, 255];
const FOOTER_BG: Rgba8 = [0, 0, 0, 166];
const PANEL_HEADER_BG: Rgba8 = [0, 0, 0, 140];
const TEXT_MUTED: Rgba8 = [200, 200, 200, 255];

const LEGEND_MAX_WIDTH_FRAC: f64 = 0.6;
const LEGEND_MAX_HEIGHT: f64 = 72.0;

pub struct Compositor {
    canvas: Canvas,
    footer_height: u32,
    catalog: LayerCatalog,
    legends: LegendRegistry,
    text: TextPainter,
}

impl Compositor {
    pub fn new(
        canvas: Canvas,
        footer_height: u32,
        catalog: LayerCatalog,
        legends: LegendRegistry,
        text: TextPainter,
    ) -> AnimatorResult<Self> {
        if canvas.width == 0 || canvas.height == 0 {
            return Err(AnimatorError::validation("canvas width/height must be non-zero"));
        }
        if footer_height >= canvas.height {
            return Err(AnimatorError::validation(format!(
                "footer height {footer_height} must be smaller than canvas height {}",
                canvas.height
            )));
        }
        catalog.validate()?;
        Ok(Self {
            canvas,
            footer_height,
            catalog,
            legends,
            text,
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// A fresh surface matching the configured canvas.
    pub fn surface(&self) -> AnimatorResult<Surface> {
        Surface::new(self.canvas)
    }

    fn scale(&self) -> f64 {
        f64::from(self.canvas.height) / 1080.0
    }

    fn w(&self) -> f64 {
        f64::from(self.canvas.width)
    }

    fn h(&self) -> f64 {
        f64::from(self.canvas.height)
    }

    pub fn content_region(&self) -> Rect {
        Rect::new(0.0, 0.0, self.w(), self.h() - f64::from(self.footer_height))
    }

    pub fn footer_region(&self) -> Rect {
        Rect::new(
            0.0,
            self.h() - f64::from(self.footer_height),
            self.w(),
            self.h(),
        )
    }

    /// Solid background with a centered title and subtitle.
    pub fn draw_intro(&self, surface: &mut Surface, title: &str, subtitle: &str) -> AnimatorResult<()> {
        let (w, h, s) = (self.w(), self.h(), self.scale());
        surface.clear(CARD_BG);
        self.text.draw(
            surface,
            &[
                TextRun::centered(title, w / 2.0, h * 0.42, 120.0 * s, 900).with_shadow(),
                TextRun::centered(subtitle, w / 2.0, h * 0.55, 48.0 * s, 500).with_shadow(),
            ],
        )
    }

    /// Solid background, a thin divider, a small heading and the group name.
    pub fn draw_title_card(&self, surface: &mut Surface, heading: &str, name: &str) -> AnimatorResult<()> {
        let (w, h, s) = (self.w(), self.h(), self.scale());
        surface.clear(CARD_BG);
        surface.fill_rect(Rect::new(0.0, h * 0.5, w, h * 0.5 + (4.0 * s).max(1.0)), DIVIDER);
        self.text.draw(
            surface,
            &[
                TextRun::centered(heading, w / 2.0, h * 0.36, 60.0 * s, 700).with_shadow(),
                TextRun::centered(name, w / 2.0, h * 0.6, 72.0 * s, 800).with_shadow(),
            ],
        )
    }

    /// Solid background with a single centered title above the divider.
    pub fn draw_heading_card(&self, surface: &mut Surface, title: &str) -> AnimatorResult<()> {
        let (w, h, s) = (self.w(), self.h(), self.scale());
        surface.clear(CARD_BG);
        surface.fill_rect(Rect::new(0.0, h * 0.5, w, h * 0.5 + (4.0 * s).max(1.0)), DIVIDER);
        self.text.draw(
            surface,
            &[TextRun::centered(title, w / 2.0, h * 0.42, 84.0 * s, 800).with_shadow()],
        )
    }

    /// Title card for a layer group, named from the catalog.
    pub fn draw_group_title(&self, surface: &mut Surface, heading: &str, group: LayerGroup) -> AnimatorResult<()> {
        let label = self.catalog.spec(group)?.label.clone();
        self.draw_title_card(surface, heading, &label)
    }

    /// One tile image contain-fit into the content region, with the labeled footer below.
    ///
    /// Returns where the image landed. The decoded bitmap is released before returning.
    pub fn draw_content_frame(&self, surface: &mut Surface, frame: &Frame) -> AnimatorResult<Rect> {
        let spec = self.catalog.spec(frame.group)?;
        let (w, s) = (self.w(), self.scale());

        surface.clear(CONTENT_BG);
        let placed = {
            let img = DecodedImage::decode(&frame.image)?;
            surface.draw_image_contain(&img, self.content_region())
        };

        let footer = self.footer_region();
        surface.fill_rect(footer, FOOTER_BG);

        let pad = 40.0 * s;
        let date = frame.date_string();
        self.text.draw(
            surface,
            &[
                TextRun::centered(&spec.label, pad, footer.y0 + footer.height() * 0.36, 30.0 * s, 700)
                    .anchored(Anchor::Start),
                TextRun::centered(date, pad, footer.y0 + footer.height() * 0.68, 26.0 * s, 500)
                    .anchored(Anchor::Start)
                    .with_color(TEXT_MUTED),
                TextRun::centered(&spec.product_tag, w - pad, footer.center().y, 28.0 * s, 600)
                    .anchored(Anchor::End)
                    .with_color(TEXT_MUTED),
            ],
        )?;

        self.draw_legend(surface, frame.group, footer);
        Ok(placed)
    }

    /// Two equal panels side by side, each with its own header and legend, and a shared footer
    /// showing the date both frames were taken on.
    pub fn draw_comparison_frame(
        &self,
        surface: &mut Surface,
        left: &Frame,
        right: &Frame,
    ) -> AnimatorResult<[Rect; 2]> {
        if left.date != right.date {
            return Err(AnimatorError::compose(format!(
                "comparison panels must share a date, got {} and {}",
                left.date, right.date
            )));
        }
        let (w, s) = (self.w(), self.scale());
        let content = self.content_region();
        let footer = self.footer_region();
        let header_h = 80.0 * s;
        let inset = 16.0 * s;

        surface.clear(CONTENT_BG);

        let panels = [
            Rect::new(0.0, content.y0, w / 2.0, content.y1),
            Rect::new(w / 2.0, content.y0, w, content.y1),
        ];
        let mut placed = [Rect::ZERO; 2];
        let mut runs = Vec::with_capacity(3);

        for (i, (panel, frame)) in panels.iter().zip([left, right]).enumerate() {
            let header = Rect::new(panel.x0, panel.y0, panel.x1, panel.y0 + header_h);
            surface.fill_rect(header, PANEL_HEADER_BG);
            runs.push(TextRun::centered(
                &self.catalog.spec(frame.group)?.label,
                header.center().x,
                header.center().y,
                34.0 * s,
                700,
            ));

            let image_area = Rect::new(
                panel.x0 + inset,
                header.y1 + inset,
                panel.x1 - inset,
                panel.y1 - inset,
            );
            let img = DecodedImage::decode(&frame.image)?;
            placed[i] = surface.draw_image_contain(&img, image_area);
        }

        surface.fill_rect(
            Rect::new(w / 2.0 - s.max(1.0), content.y0, w / 2.0 + s.max(1.0), content.y1),
            DIVIDER,
        );
        surface.fill_rect(footer, FOOTER_BG);

        let date_y = footer.y0 + 32.0 * s;
        runs.push(TextRun::centered(left.date_string(), w / 2.0, date_y, 30.0 * s, 700));
        self.text.draw(surface, &runs)?;

        for (panel, frame) in panels.iter().zip([left, right]) {
            let area = Rect::new(panel.x0, date_y + 24.0 * s, panel.x1, footer.y1 - 8.0 * s);
            self.draw_legend(surface, frame.group, area);
        }

        Ok(placed)
    }

    /// Bounding box a legend may occupy inside `area`: at most 60% of its width and 72px
    /// (scaled) tall, centered.
    pub fn legend_box(&self, area: Rect) -> Rect {
        let max_w = area.width() * LEGEND_MAX_WIDTH_FRAC;
        let max_h = (LEGEND_MAX_HEIGHT * self.scale()).min(area.height());
        let c = area.center();
        Rect::new(
            c.x - max_w / 2.0,
            c.y - max_h / 2.0,
            c.x + max_w / 2.0,
            c.y + max_h / 2.0,
        )
    }

    fn draw_legend(&self, surface: &mut Surface, group: LayerGroup, area: Rect) -> Option<Rect> {
        let legend = self.legends.get(group)?;
        Some(surface.draw_image_contain(legend, self.legend_box(area)))
    }
}

/// Inner join of two groups' frames on date, ascending. Dates present in only one group are
/// dropped.
pub fn pair_by_date(
    frames: &[Frame],
    left: LayerGroup,
    right: LayerGroup,
) -> Vec<(&Frame, &Frame)> {
    let mut lefts = BTreeMap::<NaiveDate, &Frame>::new();
    let mut rights = BTreeMap::<NaiveDate, &Frame>::new();
    for f in frames {
        if f.group == left {
            lefts.entry(f.date).or_insert(f);
        } else if f.group == right {
            rights.entry(f.date).or_insert(f);
        }
    }

    let pairs: Vec<_> = lefts
        .iter()
        .filter_map(|(date, l)| rights.get(date).map(|r| (*l, *r)))
        .collect();

    let dropped = lefts.len() + rights.len() - 2 * pairs.len();
    if dropped > 0 {
        warn!(%left, %right, dropped, "dates without a partner frame dropped from comparison");
    }
    pairs
}
