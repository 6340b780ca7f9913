//! CPU reference backend
//!
//! Executes every pass immediately on RGBA8 buffers with the same sampling rules as
//! the wgpu programs: bilinear filtering, clamp-to-edge addressing, texel-center
//! sample positions and 8-bit storage between passes. Used for headless rendering
//! and for the pipeline tests, where it also simulates the GL texture origin and
//! allocation failures.

use frost_core::{linear_to_srgb, srgb_to_linear, Color, IntSize};
use slotmap::SlotMap;

use crate::backend::{
    texture_bytes, BlurAxis, DrawPass, GpuBackend, GpuStats, Program, SubTexture,
    SubmissionIndex, TextureId, TextureOrigin,
};
use crate::error::{GpuError, Result};
use crate::kernel::{gaussian_kernel, noise_value};

/// Same default limit as `wgpu::Limits::default().max_texture_dimension_2d`
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

struct CpuTexture {
    label: String,
    size: IntSize,
    /// RGBA8 rows in memory order
    data: Vec<u8>,
}

impl CpuTexture {
    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = ((y * self.size.width + x) * 4) as usize;
        [
            self.data[i] as f32 / 255.0,
            self.data[i + 1] as f32 / 255.0,
            self.data[i + 2] as f32 / 255.0,
            self.data[i + 3] as f32 / 255.0,
        ]
    }

    /// Bilinear sample with clamp-to-edge addressing at memory-space UV
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let w = self.size.width as i64;
        let h = self.size.height as i64;
        let x = u * w as f32 - 0.5;
        let y = v * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let clamp_x = |v: i64| v.clamp(0, w - 1) as u32;
        let clamp_y = |v: i64| v.clamp(0, h - 1) as u32;
        let (xa, xb) = (clamp_x(x0 as i64), clamp_x(x0 as i64 + 1));
        let (ya, yb) = (clamp_y(y0 as i64), clamp_y(y0 as i64 + 1));

        let c00 = self.texel(xa, ya);
        let c10 = self.texel(xb, ya);
        let c01 = self.texel(xa, yb);
        let c11 = self.texel(xb, yb);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = c00[i] + (c10[i] - c00[i]) * fx;
            let bottom = c01[i] + (c11[i] - c01[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }
}

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// CPU rasterizer implementing [`GpuBackend`]
pub struct SoftwareBackend {
    textures: SlotMap<TextureId, CpuTexture>,
    origin: TextureOrigin,
    memory_budget: Option<u64>,
    max_texture_dimension: u32,
    submission: u64,
    stats: GpuStats,
}

impl SoftwareBackend {
    /// Backend with top-left origin and no memory budget
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            origin: TextureOrigin::TopLeft,
            memory_budget: None,
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            submission: 0,
            stats: GpuStats::default(),
        }
    }

    /// Store rows according to `origin`
    pub fn with_origin(mut self, origin: TextureOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Fail allocations that would push live texture memory past `bytes`
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    fn texture(&self, id: TextureId) -> Result<&CpuTexture> {
        self.textures.get(id).ok_or(GpuError::UnknownTexture)
    }

    /// Evaluate `shade` at every target texel and store the result
    ///
    /// `shade` receives the normalized texel-center position in target memory space
    /// and the target's memory coordinates.
    fn run<F>(&mut self, target: TextureId, mut shade: F) -> Result<()>
    where
        F: FnMut(&SlotMap<TextureId, CpuTexture>, f32, f32, u32, u32, [f32; 4]) -> [f32; 4],
    {
        let size = self.texture(target)?.size;
        let mut out = vec![0u8; (size.area() * 4) as usize];
        {
            let textures = &self.textures;
            let dst = &textures[target];
            for y in 0..size.height {
                let t = (y as f32 + 0.5) / size.height as f32;
                for x in 0..size.width {
                    let s = (x as f32 + 0.5) / size.width as f32;
                    let color = shade(textures, s, t, x, y, dst.texel(x, y));
                    let i = ((y * size.width + x) * 4) as usize;
                    for c in 0..4 {
                        out[i + c] = unorm8(color[c]);
                    }
                }
            }
        }
        self.textures[target].data = out;
        Ok(())
    }

    fn draw_copy(&mut self, source: SubTexture, target: TextureId) -> Result<()> {
        self.texture(source.texture)?;
        self.run(target, |textures, s, t, _, _, _| {
            let (u, v) = source.uv.lerp(s, t);
            textures[source.texture].sample(u, v)
        })
    }

    fn draw_blur(
        &mut self,
        source: SubTexture,
        target: TextureId,
        axis: BlurAxis,
        sigma: f32,
        support: u32,
    ) -> Result<()> {
        let src_size = self.texture(source.texture)?.size;
        let kernel = gaussian_kernel(sigma, support);
        let (du, dv) = match axis {
            BlurAxis::Horizontal => (1.0 / src_size.width as f32, 0.0),
            BlurAxis::Vertical => (0.0, 1.0 / src_size.height as f32),
        };
        let support = support as i32;

        self.run(target, |textures, s, t, _, _, _| {
            let src = &textures[source.texture];
            let (u, v) = source.uv.lerp(s, t);
            let mut sum = [0.0f32; 4];
            for k in -support..=support {
                let w = kernel[k.unsigned_abs() as usize];
                let tap = src.sample(u + du * k as f32, v + dv * k as f32);
                sum[0] += srgb_to_linear(tap[0]) * w;
                sum[1] += srgb_to_linear(tap[1]) * w;
                sum[2] += srgb_to_linear(tap[2]) * w;
                sum[3] += tap[3] * w;
            }
            [
                linear_to_srgb(sum[0]),
                linear_to_srgb(sum[1]),
                linear_to_srgb(sum[2]),
                sum[3],
            ]
        })
    }

    fn draw_composite(
        &mut self,
        source: SubTexture,
        mask: Option<SubTexture>,
        target: TextureId,
        tint: Color,
    ) -> Result<()> {
        self.texture(source.texture)?;
        if let Some(mask) = mask {
            self.texture(mask.texture)?;
        }
        let tint_weight = tint.a.clamp(0.0, 1.0).powi(2);

        self.run(target, |textures, s, t, _, _, _| {
            let (u, v) = source.uv.lerp(s, t);
            let mut color = textures[source.texture].sample(u, v);
            if let Some(mask) = mask {
                let (mu, mv) = mask.uv.lerp(s, t);
                color[3] *= textures[mask.texture].sample(mu, mv)[3];
            }
            [
                color[0] + (tint.r - color[0]) * tint_weight,
                color[1] + (tint.g - color[1]) * tint_weight,
                color[2] + (tint.b - color[2]) * tint_weight,
                color[3],
            ]
        })
    }

    fn draw_noise(&mut self, target: TextureId, alpha: f32) -> Result<()> {
        let size = self.texture(target)?.size;
        let origin = self.origin;
        self.run(target, |_, _, _, x, y, dst| {
            let n = noise_value(x, origin.memory_row(y, size.height));
            [
                dst[0] + (n - dst[0]) * alpha,
                dst[1] + (n - dst[1]) * alpha,
                dst[2] + (n - dst[2]) * alpha,
                dst[3],
            ]
        })
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn texture_origin(&self) -> TextureOrigin {
        self.origin
    }

    fn create_texture(&mut self, label: &str, size: IntSize) -> Result<TextureId> {
        if size.is_empty()
            || size.width > self.max_texture_dimension
            || size.height > self.max_texture_dimension
        {
            return Err(GpuError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }
        let bytes = texture_bytes(size);
        if let Some(budget) = self.memory_budget {
            if self.stats.live_bytes + bytes > budget {
                tracing::debug!(
                    "software backend over budget: {} + {} > {} bytes",
                    self.stats.live_bytes,
                    bytes,
                    budget
                );
                return Err(GpuError::OutOfMemory {
                    width: size.width,
                    height: size.height,
                });
            }
        }

        let id = self.textures.insert(CpuTexture {
            label: label.to_string(),
            size,
            data: vec![0; bytes as usize],
        });
        self.stats.textures_created += 1;
        self.stats.live_textures += 1;
        self.stats.live_bytes += bytes;
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(texture) {
            tracing::trace!("software destroy '{}' {}x{}", tex.label, tex.size.width, tex.size.height);
            self.stats.textures_destroyed += 1;
            self.stats.live_textures -= 1;
            self.stats.live_bytes -= texture_bytes(tex.size);
        }
    }

    fn texture_size(&self, texture: TextureId) -> Option<IntSize> {
        self.textures.get(texture).map(|t| t.size)
    }

    fn write_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()> {
        let origin = self.origin;
        let tex = self
            .textures
            .get_mut(texture)
            .ok_or(GpuError::UnknownTexture)?;
        let row_bytes = (tex.size.width * 4) as usize;
        if pixels.len() != row_bytes * tex.size.height as usize {
            return Err(GpuError::InvalidSize {
                width: tex.size.width,
                height: tex.size.height,
            });
        }
        for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
            let dst_row = origin.memory_row(row as u32, tex.size.height) as usize;
            tex.data[dst_row * row_bytes..(dst_row + 1) * row_bytes].copy_from_slice(src);
        }
        self.stats.uploads += 1;
        Ok(())
    }

    fn clear(&mut self, texture: TextureId, color: Color) -> Result<()> {
        let tex = self
            .textures
            .get_mut(texture)
            .ok_or(GpuError::UnknownTexture)?;
        let rgba = color.to_rgba8();
        for px in tex.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        self.stats.clears += 1;
        Ok(())
    }

    fn blit(&mut self, source: SubTexture, target: TextureId) -> Result<()> {
        self.draw_copy(source, target)?;
        self.stats.blits += 1;
        Ok(())
    }

    fn draw(&mut self, pass: &DrawPass) -> Result<()> {
        tracing::trace!("software draw '{}' ({:?})", pass.label, pass.program);
        match (pass.program, pass.source) {
            (Program::Copy, Some(source)) => self.draw_copy(source, pass.target)?,
            (
                Program::Blur {
                    axis,
                    sigma,
                    support,
                },
                Some(source),
            ) => self.draw_blur(source, pass.target, axis, sigma, support)?,
            (Program::Composite { tint, masked }, Some(source)) => {
                let mask = if masked { pass.mask } else { None };
                self.draw_composite(source, mask, pass.target, tint)?
            }
            (Program::Noise { alpha }, _) => self.draw_noise(pass.target, alpha)?,
            (_, None) => return Err(GpuError::UnknownTexture),
        }
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn submit(&mut self) -> SubmissionIndex {
        self.submission += 1;
        self.stats.submissions += 1;
        SubmissionIndex(self.submission)
    }

    fn poll(&mut self) -> Option<SubmissionIndex> {
        // Work executes inside the draw calls, every submission is already complete
        (self.submission > 0).then_some(SubmissionIndex(self.submission))
    }

    fn read_pixels(&mut self, texture: TextureId) -> Result<Vec<u8>> {
        let tex = self.texture(texture)?;
        let row_bytes = (tex.size.width * 4) as usize;
        let mut out = Vec::with_capacity(tex.data.len());
        for row in 0..tex.size.height {
            let src_row = self.origin.memory_row(row, tex.size.height) as usize;
            out.extend_from_slice(&tex.data[src_row * row_bytes..(src_row + 1) * row_bytes]);
        }
        Ok(out)
    }

    fn stats(&self) -> GpuStats {
        self.stats
    }
}
