//! WGSL prelude generation for kernel bodies.
//!
//! Every kernel shader has the same shape:
//!
//! ```text
//! binding 0      uniform Params { resolution, <one vec4 per parameter> }
//! binding 1      output storage texture (rgba32float, write)
//! binding 2 + i  input slot i (texture_2d<f32>)
//! ```
//!
//! followed by per-input `load_<name>` / `sample_<name>` helpers honoring the
//! variable's wrap mode, the user `shade` body, and a `main` entry point that
//! writes one texel per invocation.

use std::collections::HashSet;
use std::fmt::Write;

use gpgpu::naming::{snake_case, RESOLUTION_FIELD};
use gpgpu::{PassLayout, WrapMode};

pub const WORKGROUP_SIZE: u32 = 8;

/// Binding index of input slot `slot`.
pub fn input_binding(slot: usize) -> u32 {
    2 + slot as u32
}

/// Number of `vec4<f32>` fields in the params uniform (resolution included).
pub fn param_vec4_count(layout: &PassLayout<'_>) -> usize {
    1 + layout.params.len()
}

fn wrap_fn(wrap: WrapMode) -> &'static str {
    match wrap {
        WrapMode::ClampToEdge => "wrap_clamp",
        WrapMode::Repeat => "wrap_repeat",
        WrapMode::MirroredRepeat => "wrap_mirror",
    }
}

/// Declarations and helpers the `shade` body can use.
pub fn generate_prelude(layout: &PassLayout<'_>) -> String {
    let mut src = String::new();

    let _ = writeln!(src, "struct Params {{\n    {}: vec4<f32>,", RESOLUTION_FIELD);
    for (name, _) in layout.params.iter() {
        let _ = writeln!(src, "    {}: vec4<f32>,", snake_case(name));
    }
    src.push_str("};\n\n");

    src.push_str("@group(0) @binding(0) var<uniform> params: Params;\n");
    src.push_str("@group(0) @binding(1) var output_texture: texture_storage_2d<rgba32float, write>;\n");
    for slot in 0..layout.inputs.len() {
        let _ = writeln!(
            src,
            "@group(0) @binding({}) var input_{}: texture_2d<f32>;",
            input_binding(slot),
            slot
        );
    }

    src.push_str(
        r#"
fn grid_size() -> vec2<i32> {
    return vec2<i32>(i32(params.resolution.x), i32(params.resolution.y));
}

fn wrap_clamp(c: vec2<i32>) -> vec2<i32> {
    return clamp(c, vec2<i32>(0), grid_size() - vec2<i32>(1));
}

fn wrap_repeat(c: vec2<i32>) -> vec2<i32> {
    let n = grid_size();
    return ((c % n) + n) % n;
}

fn wrap_mirror(c: vec2<i32>) -> vec2<i32> {
    let n = grid_size();
    let p = n * 2;
    let m = ((c % p) + p) % p;
    return select(p - vec2<i32>(1) - m, m, m < n);
}

fn cell_count() -> u32 {
    return u32(params.resolution.x) * u32(params.resolution.y);
}

fn texel_coord(index: u32) -> vec2<i32> {
    let w = u32(params.resolution.x);
    return vec2<i32>(i32(index % w), i32(index / w));
}
"#,
    );

    let mut seen = HashSet::new();
    for (slot, input) in layout.inputs.iter().enumerate() {
        if !seen.insert(input.name.as_str()) {
            continue;
        }
        let name = snake_case(&input.name);
        let _ = write!(
            src,
            r#"
fn load_{name}(coord: vec2<i32>) -> vec4<f32> {{
    return textureLoad(input_{slot}, {wrap}(coord), 0);
}}

fn sample_{name}(uv: vec2<f32>) -> vec4<f32> {{
    return load_{name}(vec2<i32>(floor(uv * params.resolution.xy)));
}}
"#,
            name = name,
            slot = slot,
            wrap = wrap_fn(input.wrap),
        );
    }
    src
}

/// Full shader module: prelude, user body, entry point.
pub fn assemble(layout: &PassLayout<'_>, body: &str) -> String {
    let mut src = generate_prelude(layout);
    src.push('\n');
    src.push_str(body);
    let _ = write!(
        src,
        r#"
@compute @workgroup_size({size}, {size}, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    let size = grid_size();
    let coord = vec2<i32>(id.xy);
    if (coord.x >= size.x || coord.y >= size.y) {{
        return;
    }}
    let uv = (vec2<f32>(coord) + vec2<f32>(0.5)) / params.resolution.xy;
    textureStore(output_texture, coord, shade(coord, uv));
}}
"#,
        size = WORKGROUP_SIZE
    );
    src
}
