use anyhow::{Context, Result};
use minifb::{Key, Window, WindowOptions};
use opencv::core::{AlgorithmHint, Mat, Size};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use std::path::Path;
use std::time::Instant;

use super::sprite::{SpriteStage, SpriteTiming};

/// ARGB ピクセルのテクスチャ
pub struct Texture {
    pub width: usize,
    pub height: usize,
    /// 0xAARRGGBB
    pub pixels: Vec<u32>,
}

impl Texture {
    /// 画像ファイルを読み込む。アルファチャンネルがあれば保持する
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mat = imgcodecs::imread(
            path.to_str().unwrap_or_default(),
            imgcodecs::IMREAD_UNCHANGED,
        )
        .with_context(|| format!("failed to read texture {}", path.display()))?;
        if mat.empty() {
            anyhow::bail!("texture {} is empty or unreadable", path.display());
        }

        let width = mat.cols() as usize;
        let height = mat.rows() as usize;
        let channels = mat.channels();
        let mut pixels = vec![0u32; width * height];

        for y in 0..mat.rows() {
            for x in 0..mat.cols() {
                let argb = match channels {
                    4 => {
                        let p = mat.at_2d::<opencv::core::Vec4b>(y, x)?;
                        ((p[3] as u32) << 24)
                            | ((p[2] as u32) << 16)
                            | ((p[1] as u32) << 8)
                            | p[0] as u32
                    }
                    _ => {
                        let p = mat.at_2d::<opencv::core::Vec3b>(y, x)?;
                        0xFF00_0000 | ((p[2] as u32) << 16) | ((p[1] as u32) << 8) | p[0] as u32
                    }
                };
                pixels[y as usize * width + x as usize] = argb;
            }
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

/// 背景画像をウィンドウサイズの RGB バッファに読み込む
pub fn load_background<P: AsRef<Path>>(path: P, width: usize, height: usize) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mat = imgcodecs::imread(
        path.to_str().unwrap_or_default(),
        imgcodecs::IMREAD_COLOR,
    )
    .with_context(|| format!("failed to read background {}", path.display()))?;
    if mat.empty() {
        anyhow::bail!("background {} is empty or unreadable", path.display());
    }

    let mut resized = Mat::default();
    imgproc::resize(
        &mat,
        &mut resized,
        Size::new(width as i32, height as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    let mut rgb = Mat::default();
    imgproc::cvt_color(
        &resized,
        &mut rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let mut buffer = vec![0u32; width * height];
    for y in 0..height {
        for x in 0..width {
            let p = rgb.at_2d::<opencv::core::Vec3b>(y as i32, x as i32)?;
            buffer[y * width + x] = ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32;
        }
    }
    Ok(buffer)
}

/// minifb によるインスタレーションの合成ウィンドウ
///
/// 背景 → スプライト → オーバーレイの順に重ね、セット切り替えの
/// 不透明度で全体を変調する。
pub struct InstallationWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    /// スケール 1.0 のスプライトの辺長（ピクセル）
    sprite_size: f32,
}

impl InstallationWindow {
    pub fn new(title: &str, width: usize, height: usize, sprite_size: f32) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
            sprite_size,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// 背景で塗り直す。opacity はセット切り替えのフェード
    pub fn begin_frame(&mut self, background: Option<&[u32]>, opacity: f32) {
        match background {
            Some(bg) if bg.len() == self.buffer.len() => {
                for (dst, src) in self.buffer.iter_mut().zip(bg.iter()) {
                    *dst = scale_rgb(*src, opacity);
                }
            }
            _ => self.buffer.fill(0),
        }
    }

    /// ステージ上の全スプライトを合成する
    pub fn draw_stage(
        &mut self,
        stage: &SpriteStage,
        textures: &[Texture],
        now: Instant,
        scene_opacity: f32,
    ) {
        if textures.is_empty() {
            return;
        }
        let timing: SpriteTiming = *stage.timing();
        for sprite in stage.sprites() {
            let texture = &textures[sprite.texture % textures.len()];
            let scale = sprite.scale(now, &timing);
            if scale <= 0.0 {
                continue;
            }
            let alpha = sprite.alpha(now, &timing) * scene_opacity;
            if alpha <= 0.0 {
                continue;
            }
            self.draw_sprite(texture, sprite.x, sprite.y, scale, alpha);
        }
    }

    /// 最近傍スケーリングでテクスチャを中心合わせで合成する
    fn draw_sprite(&mut self, texture: &Texture, cx: f32, cy: f32, scale: f32, alpha: f32) {
        let size = (self.sprite_size * scale).max(1.0);
        let half = size * 0.5;
        let x0 = (cx - half).floor() as i32;
        let y0 = (cy - half).floor() as i32;
        let extent = size.ceil() as i32;

        for dy in 0..extent {
            for dx in 0..extent {
                let tx = (dx as f32 / size * texture.width as f32) as usize;
                let ty = (dy as f32 / size * texture.height as f32) as usize;
                if tx >= texture.width || ty >= texture.height {
                    continue;
                }
                let texel = texture.pixels[ty * texture.width + tx];
                let texel_alpha = (texel >> 24) as f32 / 255.0;
                self.blend_pixel(x0 + dx, y0 + dy, texel, texel_alpha * alpha);
            }
        }
    }

    /// 画面全体を暗転させる待機オーバーレイ
    pub fn draw_overlay(&mut self, opacity: f32) {
        if opacity <= 0.0 {
            return;
        }
        let keep = 1.0 - opacity.clamp(0.0, 1.0) * 0.85;
        for pixel in self.buffer.iter_mut() {
            *pixel = scale_rgb(*pixel, keep);
        }
    }

    pub fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// 境界チェック付きのアルファブレンド
    fn blend_pixel(&mut self, x: i32, y: i32, color: u32, alpha: f32) {
        if x < 0 || x >= self.width as i32 || y < 0 || y >= self.height as i32 || alpha <= 0.0 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        let dst = self.buffer[idx];
        let a = alpha.clamp(0.0, 1.0);

        let blend = |s: u32, d: u32| -> u32 {
            (s as f32 * a + d as f32 * (1.0 - a)) as u32
        };
        let r = blend((color >> 16) & 0xFF, (dst >> 16) & 0xFF);
        let g = blend((color >> 8) & 0xFF, (dst >> 8) & 0xFF);
        let b = blend(color & 0xFF, dst & 0xFF);
        self.buffer[idx] = (r << 16) | (g << 8) | b;
    }
}

fn scale_rgb(color: u32, factor: f32) -> u32 {
    let f = factor.clamp(0.0, 1.0);
    let r = (((color >> 16) & 0xFF) as f32 * f) as u32;
    let g = (((color >> 8) & 0xFF) as f32 * f) as u32;
    let b = ((color & 0xFF) as f32 * f) as u32;
    (r << 16) | (g << 8) | b
}
