/// Figure export: PNG raster, SVG and a minimal single-page PDF
///
/// A figure is first laid out as a [`Scene`] of pixel-space primitives;
/// each writer then renders the same scene, so every format shows the
/// same picture.

use std::fmt::Write as _;
use std::path::Path;

use image::RgbImage;
use thiserror::Error;

use super::colors::Rgb;
use super::font;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported output format '{0}' (use .png, .svg or .pdf)")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

/// Drawing primitive in pixel coordinates, origin top-left, y down.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Polyline {
        points: Vec<(f64, f64)>,
        color: Rgb,
        /// Stroke width in pixels
        width: f64,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        stroke: Rgb,
        fill: Option<Rgb>,
    },
    /// `(x, y)` is the anchor point on the text's vertical center line.
    Text {
        x: f64,
        y: f64,
        text: String,
        size: f64,
        anchor: Anchor,
        vertical: bool,
        color: Rgb,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    /// Pixels per typographic point; sets the PDF page size
    pub px_per_pt: f64,
    pub primitives: Vec<Primitive>,
}

// ---------------------------------------------------------------------------
// Raster
// ---------------------------------------------------------------------------

/// Bresenham line with a square brush of half-width `radius`.
fn draw_line(img: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: image::Rgb<u8>, radius: i64) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut cx, mut cy) = (x0, y0);
    loop {
        for by in cy - radius..=cy + radius {
            for bx in cx - radius..=cx + radius {
                if bx >= 0 && bx < w && by >= 0 && by < h {
                    img.put_pixel(bx as u32, by as u32, color);
                }
            }
        }
        if cx == x1 && cy == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            cx += sx;
        }
        if e2 <= dx {
            err += dx;
            cy += sy;
        }
    }
}

fn text_scale(size: f64) -> u32 {
    (size / 6.0).round().max(1.0) as u32
}

/// Render a scene to an RGB image on a white background.
pub fn rasterize(scene: &Scene) -> RgbImage {
    let mut img = RgbImage::from_pixel(scene.width, scene.height, Rgb::WHITE.into());
    let px = |v: f64| v.round() as i64;

    for prim in &scene.primitives {
        match prim {
            Primitive::Polyline {
                points,
                color,
                width,
            } => {
                let radius = ((width - 1.0) / 2.0).round().max(0.0) as i64;
                for pair in points.windows(2) {
                    draw_line(
                        &mut img,
                        (px(pair[0].0), px(pair[0].1)),
                        (px(pair[1].0), px(pair[1].1)),
                        (*color).into(),
                        radius,
                    );
                }
            }
            Primitive::Rect {
                x,
                y,
                w,
                h,
                stroke,
                fill,
            } => {
                let (x0, y0, x1, y1) = (px(*x), px(*y), px(x + w), px(y + h));
                if let Some(fill) = fill {
                    for yy in y0.max(0)..y1.min(scene.height as i64) {
                        for xx in x0.max(0)..x1.min(scene.width as i64) {
                            img.put_pixel(xx as u32, yy as u32, (*fill).into());
                        }
                    }
                }
                let c = (*stroke).into();
                draw_line(&mut img, (x0, y0), (x1, y0), c, 0);
                draw_line(&mut img, (x1, y0), (x1, y1), c, 0);
                draw_line(&mut img, (x1, y1), (x0, y1), c, 0);
                draw_line(&mut img, (x0, y1), (x0, y0), c, 0);
            }
            Primitive::Text {
                x,
                y,
                text,
                size,
                anchor,
                vertical,
                color,
            } => {
                let scale = text_scale(*size);
                let length = font::text_width(text, scale) as f64;
                let thickness = (font::GLYPH_H * scale) as f64;
                let shift = match anchor {
                    Anchor::Start => 0.0,
                    Anchor::Middle => length / 2.0,
                    Anchor::End => length,
                };
                if *vertical {
                    font::draw_text_vertical(
                        &mut img,
                        text,
                        px(x - thickness / 2.0),
                        px(y - length + shift),
                        (*color).into(),
                        scale,
                    );
                } else {
                    font::draw_text(
                        &mut img,
                        text,
                        px(x - shift),
                        px(y - thickness / 2.0),
                        (*color).into(),
                        scale,
                    );
                }
            }
        }
    }
    img
}

pub fn write_png(scene: &Scene, path: &Path) -> Result<(), ExportError> {
    rasterize(scene).save(path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SVG
// ---------------------------------------------------------------------------

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

pub fn render_svg(scene: &Scene) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' width='{}' height='{}' viewBox='0 0 {} {}'>",
        scene.width, scene.height, scene.width, scene.height
    );
    svg.push_str("<rect width='100%' height='100%' fill='white'/>\n");

    for prim in &scene.primitives {
        match prim {
            Primitive::Polyline {
                points,
                color,
                width,
            } => {
                if points.len() < 2 {
                    continue;
                }
                let _ = write!(
                    svg,
                    "<polyline fill='none' stroke='{}' stroke-width='{:.2}' stroke-linejoin='round' points='",
                    color, width
                );
                for (x, y) in points {
                    let _ = write!(svg, "{:.2},{:.2} ", x, y);
                }
                svg.push_str("'/>\n");
            }
            Primitive::Rect {
                x,
                y,
                w,
                h,
                stroke,
                fill,
            } => {
                let fill = fill.map(|c| c.to_hex()).unwrap_or_else(|| "none".to_string());
                let _ = writeln!(
                    svg,
                    "<rect x='{:.1}' y='{:.1}' width='{:.1}' height='{:.1}' fill='{}' stroke='{}' stroke-width='1'/>",
                    x, y, w, h, fill, stroke
                );
            }
            Primitive::Text {
                x,
                y,
                text,
                size,
                anchor,
                vertical,
                color,
            } => {
                let anchor = match anchor {
                    Anchor::Start => "start",
                    Anchor::Middle => "middle",
                    Anchor::End => "end",
                };
                let rotate = if *vertical {
                    format!(" transform='rotate(-90 {:.1} {:.1})'", x, y)
                } else {
                    String::new()
                };
                let _ = writeln!(
                    svg,
                    "<text x='{:.1}' y='{:.1}' font-family='sans-serif' font-size='{:.1}' fill='{}' text-anchor='{}' dominant-baseline='central'{}>{}</text>",
                    x, y, size, color, anchor, rotate, escape_xml(text)
                );
            }
        }
    }
    svg.push_str("</svg>\n");
    svg
}

pub fn write_svg(scene: &Scene, path: &Path) -> Result<(), ExportError> {
    std::fs::write(path, render_svg(scene)).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

fn escape_pdf(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\\' | '(' | ')' => format!("\\{}", c),
            '−' | '–' => "-".to_string(),
            c if c.is_ascii() && !c.is_ascii_control() => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

/// Page content stream in PDF user space (points, origin bottom-left).
fn pdf_content(scene: &Scene) -> String {
    let k = scene.px_per_pt;
    let page_h = scene.height as f64 / k;
    let pt = |x: f64, y: f64| (x / k, page_h - y / k);
    let mut s = String::new();
    s.push_str("1 J 1 j\n");

    for prim in &scene.primitives {
        match prim {
            Primitive::Polyline {
                points,
                color,
                width,
            } => {
                let Some(((x0, y0), rest)) = points.split_first() else {
                    continue;
                };
                let (r, g, b) = color.to_unit();
                let _ = writeln!(s, "{:.3} {:.3} {:.3} RG {:.3} w", r, g, b, width / k);
                let (px, py) = pt(*x0, *y0);
                let _ = writeln!(s, "{:.2} {:.2} m", px, py);
                for (x, y) in rest {
                    let (px, py) = pt(*x, *y);
                    let _ = writeln!(s, "{:.2} {:.2} l", px, py);
                }
                s.push_str("S\n");
            }
            Primitive::Rect {
                x,
                y,
                w,
                h,
                stroke,
                fill,
            } => {
                let (px, py) = pt(*x, y + h);
                let (pw, ph) = (w / k, h / k);
                if let Some(fill) = fill {
                    let (r, g, b) = fill.to_unit();
                    let _ = writeln!(s, "{:.3} {:.3} {:.3} rg {:.2} {:.2} {:.2} {:.2} re f", r, g, b, px, py, pw, ph);
                }
                let (r, g, b) = stroke.to_unit();
                let _ = writeln!(
                    s,
                    "{:.3} {:.3} {:.3} RG {:.3} w {:.2} {:.2} {:.2} {:.2} re S",
                    r,
                    g,
                    b,
                    1.0 / k,
                    px,
                    py,
                    pw,
                    ph
                );
            }
            Primitive::Text {
                x,
                y,
                text,
                size,
                anchor,
                vertical,
                color,
            } => {
                let size_pt = size / k;
                // Helvetica averages a little over half an em per glyph
                let length = 0.55 * size_pt * text.chars().count() as f64;
                let shift = match anchor {
                    Anchor::Start => 0.0,
                    Anchor::Middle => length / 2.0,
                    Anchor::End => length,
                };
                let (ax, ay) = pt(*x, *y);
                let baseline = 0.35 * size_pt;
                let (r, g, b) = color.to_unit();
                let matrix = if *vertical {
                    format!("0 1 -1 0 {:.2} {:.2}", ax + baseline, ay - shift)
                } else {
                    format!("1 0 0 1 {:.2} {:.2}", ax - shift, ay - baseline)
                };
                let _ = writeln!(
                    s,
                    "BT /F1 {:.2} Tf {:.3} {:.3} {:.3} rg {} Tm ({}) Tj ET",
                    size_pt,
                    r,
                    g,
                    b,
                    matrix,
                    escape_pdf(text)
                );
            }
        }
    }
    s
}

/// Serialize the scene as a one-page PDF document.
pub fn render_pdf(scene: &Scene) -> Vec<u8> {
    let page_w = scene.width as f64 / scene.px_per_pt;
    let page_h = scene.height as f64 / scene.px_per_pt;
    let content = pdf_content(scene);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>",
            page_w, page_h
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for off in &offsets {
        let _ = writeln!(xref, "{:010} 00000 n ", off);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

pub fn write_pdf(scene: &Scene, path: &Path) -> Result<(), ExportError> {
    std::fs::write(path, render_pdf(scene)).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })
}
