use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::{Frame, TrackedObject};

const LINE_COLOR: Rgb<u8> = Rgb([255, 60, 60]);
const BOX_COLOR: Rgb<u8> = Rgb([60, 220, 60]);
const BANNER_BG: Rgb<u8> = Rgb([0, 0, 0]);
const BANNER_FG: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws the counting line, track boxes and the running count onto a frame
/// before it goes to the video sink.
#[derive(Debug, Clone)]
pub struct Annotator {
    /// Glyph scale factor from the configuration's text size.
    pub text_size: u32,
    /// Boundary position as a fraction of frame width.
    pub line_frac: f32,
}

impl Annotator {
    pub fn new(text_size: u32, line_frac: f32) -> Self {
        Self { text_size: text_size.max(1), line_frac }
    }

    pub fn annotate(&self, frame: &mut Frame, tracks: &[TrackedObject], count_text: &str) {
        let (w, h) = (frame.w, frame.h);
        let buf = std::mem::take(&mut frame.rgb);
        if buf.len() != (w as usize) * (h as usize) * 3 {
            frame.rgb = buf;
            return;
        }
        let Some(mut img) = RgbImage::from_raw(w, h, buf) else {
            return;
        };

        // counting line, full height
        let x = (w as f32 * self.line_frac).round();
        for dx in 0..self.text_size.min(4) {
            draw_line_segment_mut(&mut img, (x + dx as f32, 0.0), (x + dx as f32, h as f32), LINE_COLOR);
        }

        for t in tracks {
            let bw = (t.w * w as f32).max(2.0) as u32;
            let bh = (t.h * h as f32).max(2.0) as u32;
            let bx = ((t.cx * w as f32) - bw as f32 / 2.0).max(0.0) as i32;
            let by = ((t.cy * h as f32) - bh as f32 / 2.0).max(0.0) as i32;
            draw_hollow_rect_mut(&mut img, Rect::at(bx, by).of_size(bw.min(w), bh.min(h)), BOX_COLOR);
        }

        self.draw_banner(&mut img, count_text);
        frame.rgb = img.into_raw();
    }

    fn draw_banner(&self, img: &mut RgbImage, text: &str) {
        let scale = self.text_size;
        let glyph_w = 8 * scale;
        let glyph_h = 12 * scale;
        let pad = 2 * scale;
        let banner_w = (text.chars().count() as u32) * glyph_w + 2 * pad;
        let banner_h = glyph_h + 2 * pad;
        draw_filled_rect_mut(
            img,
            Rect::at(0, 0).of_size(banner_w.min(img.width()), banner_h.min(img.height())),
            BANNER_BG,
        );

        let mut x = pad;
        for ch in text.chars() {
            if let Some(pattern) = glyph(ch) {
                draw_glyph(img, &pattern, x, pad, scale, BANNER_FG);
            }
            x += glyph_w;
            if x >= img.width() {
                break;
            }
        }
    }
}

fn draw_glyph(img: &mut RgbImage, pattern: &[u8; 12], x0: u32, y0: u32, scale: u32, color: Rgb<u8>) {
    for (row, bits) in pattern.iter().enumerate() {
        for col in 0..8u32 {
            if (bits >> (7 - col)) & 1 == 1 {
                let px = x0 + col * scale;
                let py = y0 + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        let (qx, qy) = (px + dx, py + dy);
                        if qx < img.width() && qy < img.height() {
                            img.put_pixel(qx, qy, color);
                        }
                    }
                }
            }
        }
    }
}

// 8x12 bitmap glyphs, enough for counts and the "None" sentinel.
fn glyph(ch: char) -> Option<[u8; 12]> {
    let p = match ch {
        '0' => [0x00, 0x3C, 0x42, 0x46, 0x4A, 0x52, 0x62, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '1' => [0x00, 0x08, 0x18, 0x28, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3E, 0x00, 0x00],
        '2' => [0x00, 0x3C, 0x42, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x7E, 0x00, 0x00],
        '3' => [0x00, 0x3C, 0x42, 0x02, 0x1C, 0x02, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        '4' => [0x00, 0x04, 0x0C, 0x14, 0x24, 0x44, 0x7E, 0x04, 0x04, 0x04, 0x00, 0x00],
        '5' => [0x00, 0x7E, 0x40, 0x40, 0x7C, 0x02, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        '6' => [0x00, 0x3C, 0x42, 0x40, 0x7C, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '7' => [0x00, 0x7E, 0x02, 0x04, 0x08, 0x10, 0x10, 0x10, 0x10, 0x10, 0x00, 0x00],
        '8' => [0x00, 0x3C, 0x42, 0x42, 0x3C, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        '9' => [0x00, 0x3C, 0x42, 0x42, 0x42, 0x3E, 0x02, 0x02, 0x42, 0x3C, 0x00, 0x00],
        'N' => [0x00, 0x42, 0x62, 0x52, 0x4A, 0x46, 0x42, 0x42, 0x42, 0x42, 0x00, 0x00],
        'o' => [0x00, 0x00, 0x00, 0x3C, 0x42, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00, 0x00],
        'n' => [0x00, 0x00, 0x00, 0x5C, 0x62, 0x42, 0x42, 0x42, 0x42, 0x42, 0x00, 0x00],
        'e' => [0x00, 0x00, 0x00, 0x3C, 0x42, 0x7E, 0x40, 0x40, 0x42, 0x3C, 0x00, 0x00],
        _ => return None,
    };
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_paints_the_counting_line() {
        let mut frame = Frame::blank(crate::PROC_W, crate::PROC_H);
        let ann = Annotator::new(2, 0.85);
        ann.annotate(&mut frame, &[], "0");

        let x = (crate::PROC_W as f32 * 0.85).round() as usize;
        let y = (crate::PROC_H / 2) as usize;
        let idx = (y * crate::PROC_W as usize + x) * 3;
        assert_eq!(&frame.rgb[idx..idx + 3], &[255, 60, 60]);
    }

    #[test]
    fn annotation_keeps_buffer_size() {
        let mut frame = Frame::blank(crate::PROC_W, crate::PROC_H);
        let before = frame.rgb.len();
        let tracks = vec![TrackedObject {
            track_id: 1,
            class_id: 0,
            conf: 0.9,
            cx: 0.5, cy: 0.5, w: 0.2, h: 0.3,
        }];
        Annotator::new(1, 0.85).annotate(&mut frame, &tracks, "None");
        assert_eq!(frame.rgb.len(), before);
    }
}
