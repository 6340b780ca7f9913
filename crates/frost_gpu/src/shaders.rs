//! WGSL shader sources for the backdrop passes
//!
//! All programs share one module: a full-target triangle vertex stage and one
//! fragment entry point per [`Program`](crate::Program). Every fragment stage reads
//! the same `PassUniforms` block and the same bindings so a single bind group layout
//! serves all pipelines.

/// Shared pass shader
///
/// Bindings:
/// - 0: `PassUniforms`
/// - 1: source texture
/// - 2: linear clamp sampler
/// - 3: mask texture
pub const PASS_SHADER: &str = r#"
// ============================================================================
// Frost Backdrop Pass Shader
// ============================================================================

struct PassUniforms {
    // Source UV rectangle (u0, v0, u1, v1)
    source_rect: vec4<f32>,
    // Mask UV rectangle (u0, v0, u1, v1)
    mask_rect: vec4<f32>,
    // Tint color, straight alpha
    tint: vec4<f32>,
    // UV distance between two blur taps
    texel_step: vec2<f32>,
    sigma: f32,
    support: u32,
    noise_alpha: f32,
    masked: u32,
    _padding: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    // Position inside the target, (0, 0) at texture row 0
    @location(0) local: vec2<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: PassUniforms;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var source_sampler: sampler;
@group(0) @binding(3) var mask_texture: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;

    // Fullscreen triangle
    let uv = vec2<f32>(
        f32((vertex_index << 1u) & 2u),
        f32(vertex_index & 2u)
    );

    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.local = vec2<f32>(uv.x, 1.0 - uv.y);

    return out;
}

fn source_uv(local: vec2<f32>) -> vec2<f32> {
    return mix(uniforms.source_rect.xy, uniforms.source_rect.zw, local);
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let low = c / 12.92;
    let high = pow((c + 0.055) / 1.055, vec3<f32>(2.4));
    return select(high, low, c <= vec3<f32>(0.04045));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let v = max(c, vec3<f32>(0.0));
    let low = v * 12.92;
    let high = 1.055 * pow(v, vec3<f32>(1.0 / 2.4)) - 0.055;
    return select(high, low, v <= vec3<f32>(0.0031308));
}

fn gaussian_weight(x: f32, sigma: f32) -> f32 {
    if (sigma <= 0.0) {
        return select(0.0, 1.0, x == 0.0);
    }
    return exp(-0.5 * x * x / (sigma * sigma));
}

// PCG hash
fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

@fragment
fn fs_copy(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSampleLevel(source_texture, source_sampler, source_uv(in.local), 0.0);
}

@fragment
fn fs_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    let center = source_uv(in.local);
    let support = i32(uniforms.support);

    var rgb = vec3<f32>(0.0);
    var alpha = 0.0;
    var total = 0.0;
    for (var k = -support; k <= support; k = k + 1) {
        let w = gaussian_weight(f32(k), uniforms.sigma);
        let tap = textureSampleLevel(
            source_texture,
            source_sampler,
            center + uniforms.texel_step * f32(k),
            0.0
        );
        rgb += srgb_to_linear(tap.rgb) * w;
        alpha += tap.a * w;
        total += w;
    }

    return vec4<f32>(linear_to_srgb(rgb / total), alpha / total);
}

@fragment
fn fs_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(source_texture, source_sampler, source_uv(in.local), 0.0);
    let mask_uv = mix(uniforms.mask_rect.xy, uniforms.mask_rect.zw, in.local);
    let mask = textureSampleLevel(mask_texture, source_sampler, mask_uv, 0.0).a;
    color.a *= select(1.0, mask, uniforms.masked != 0u);

    let tint_weight = clamp(uniforms.tint.a, 0.0, 1.0) * clamp(uniforms.tint.a, 0.0, 1.0);
    return vec4<f32>(mix(color.rgb, uniforms.tint.rgb, tint_weight), color.a);
}

// Blended with src-alpha on color and (zero, one) on alpha, so the target keeps
// its own alpha and only RGB moves toward the grain.
@fragment
fn fs_noise(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<u32>(floor(in.position.xy));
    let n = f32(pcg_hash(pixel.x ^ pcg_hash(pixel.y))) / 4294967295.0;
    return vec4<f32>(vec3<f32>(n), uniforms.noise_alpha);
}
"#;
