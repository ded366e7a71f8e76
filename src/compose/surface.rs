use anyhow::Context as _;
use kurbo::Rect;
use resvg::tiny_skia::{self, FilterQuality, IntSize, Paint, Pixmap, PixmapPaint, Transform};

use crate::foundation::{
    core::Canvas,
    error::{AnimatorError, AnimatorResult},
};

/// Straight-alpha RGBA8 color.
pub type Rgba8 = [u8; 4];

/// A captured canvas: tightly packed, row-major RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

/// A decoded raster ready to be drawn (premultiplied RGBA8).
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pixmap: Pixmap,
}

impl DecodedImage {
    pub fn decode(bytes: &[u8]) -> AnimatorResult<Self> {
        let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut data = rgba.into_raw();
        premultiply_rgba8_in_place(&mut data);

        let size = IntSize::from_wh(width, height)
            .ok_or_else(|| AnimatorError::compose("decoded image has zero width or height"))?;
        let pixmap = Pixmap::from_vec(data, size)
            .ok_or_else(|| AnimatorError::compose("decoded image buffer has unexpected size"))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

/// Scale `(iw, ih)` to fit inside `target` without cropping, preserving aspect ratio, and center
/// it. Degenerate sources collapse to the target's center.
pub fn contain_fit(iw: f64, ih: f64, target: Rect) -> Rect {
    if iw <= 0.0 || ih <= 0.0 || target.width() <= 0.0 || target.height() <= 0.0 {
        let c = target.center();
        return Rect::new(c.x, c.y, c.x, c.y);
    }
    let s = (target.width() / iw).min(target.height() / ih);
    let (dw, dh) = (iw * s, ih * s);
    let x0 = target.x0 + (target.width() - dw) / 2.0;
    let y0 = target.y0 + (target.height() - dh) / 2.0;
    Rect::new(x0, y0, x0 + dw, y0 + dh)
}

/// The single drawing surface every frame is painted on. Each card/frame draw fully repaints it
/// before it is captured.
pub struct Surface {
    pixmap: Pixmap,
}

impl Surface {
    pub fn new(canvas: Canvas) -> AnimatorResult<Self> {
        let pixmap = Pixmap::new(canvas.width, canvas.height).ok_or_else(|| {
            AnimatorError::compose(format!(
                "failed to allocate {}x{} surface",
                canvas.width, canvas.height
            ))
        })?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width()), f64::from(self.height()))
    }

    pub fn clear(&mut self, color: Rgba8) {
        self.pixmap.fill(tiny_skia::Color::from_rgba8(
            color[0], color[1], color[2], color[3],
        ));
    }

    /// Source-over fill; rects outside the surface are ignored.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba8) {
        let Some(r) = tiny_skia::Rect::from_xywh(
            rect.x0 as f32,
            rect.y0 as f32,
            rect.width() as f32,
            rect.height() as f32,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
        paint.anti_alias = false;
        self.pixmap.fill_rect(r, &paint, Transform::identity(), None);
    }

    /// Draw `img` scaled into exactly `dest`.
    pub fn draw_image(&mut self, img: &DecodedImage, dest: Rect) {
        if dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        let sx = dest.width() / f64::from(img.width());
        let sy = dest.height() / f64::from(img.height());
        let xform = Transform::from_row(
            sx as f32,
            0.0,
            0.0,
            sy as f32,
            dest.x0 as f32,
            dest.y0 as f32,
        );
        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        self.pixmap
            .draw_pixmap(0, 0, img.pixmap.as_ref(), &paint, xform, None);
    }

    /// Contain-fit `img` into `target` and return the rect it was drawn at.
    pub fn draw_image_contain(&mut self, img: &DecodedImage, target: Rect) -> Rect {
        let dest = contain_fit(f64::from(img.width()), f64::from(img.height()), target);
        self.draw_image(img, dest);
        dest
    }

    /// Render a parsed SVG overlay 1:1 on top of the current contents.
    pub fn draw_svg(&mut self, tree: &usvg::Tree) {
        resvg::render(tree, Transform::identity(), &mut self.pixmap.as_mut());
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        let px = self.pixmap.pixel(x, y)?.demultiply();
        Some([px.red(), px.green(), px.blue(), px.alpha()])
    }

    /// Capture the current contents.
    pub fn snapshot(&self) -> FrameRGBA {
        FrameRGBA {
            width: self.width(),
            height: self.height(),
            data: self.pixmap.data().to_vec(),
            premultiplied: true,
        }
    }
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::test_support::{assert_rgb_near, png};

    #[test]
    fn contain_fit_wide_image_into_square() {
        let r = contain_fit(200.0, 100.0, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(r, Rect::new(0.0, 25.0, 100.0, 75.0));
    }

    #[test]
    fn contain_fit_tall_image_is_centered_horizontally() {
        let r = contain_fit(100.0, 400.0, Rect::new(10.0, 10.0, 210.0, 110.0));
        assert_eq!(r, Rect::new(97.5, 10.0, 122.5, 110.0));
    }

    #[test]
    fn contain_fit_upscales_small_images() {
        let r = contain_fit(10.0, 10.0, Rect::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(r, Rect::new(100.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn contain_fit_degenerate_source_is_empty() {
        let r = contain_fit(0.0, 10.0, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(r.area(), 0.0);
    }

    #[test]
    fn decode_png_dimensions_and_premul() {
        let img = image::RgbaImage::from_raw(1, 1, vec![100, 50, 200, 128]).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let decoded = DecodedImage::decode(&buf).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1, 1));
        assert_eq!(
            decoded.pixmap.data(),
            &[
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(DecodedImage::decode(b"not a png").is_err());
    }

    #[test]
    fn draw_contain_leaves_letterbox_untouched() {
        let mut surface = Surface::new(Canvas {
            width: 100,
            height: 100,
        })
        .unwrap();
        surface.clear([0, 0, 0, 255]);
        let img = DecodedImage::decode(&png(200, 100, [255, 0, 0, 255])).unwrap();
        let dest = surface.draw_image_contain(&img, surface.bounds());
        assert_eq!(dest, Rect::new(0.0, 25.0, 100.0, 75.0));

        assert_eq!(surface.pixel(50, 10), Some([0, 0, 0, 255]));
        assert_rgb_near(surface.pixel(50, 50).unwrap(), [255, 0, 0]);
        assert_eq!(surface.pixel(50, 90), Some([0, 0, 0, 255]));
    }

    #[test]
    fn fill_rect_and_snapshot() {
        let mut surface = Surface::new(Canvas {
            width: 4,
            height: 2,
        })
        .unwrap();
        surface.clear([17, 17, 17, 255]);
        surface.fill_rect(Rect::new(0.0, 1.0, 4.0, 2.0), [255, 255, 255, 255]);
        let frame = surface.snapshot();
        assert_eq!(frame.data.len(), 4 * 2 * 4);
        assert_eq!(&frame.data[0..4], &[17, 17, 17, 255]);
        assert_eq!(&frame.data[16..20], &[255, 255, 255, 255]);
    }
}
