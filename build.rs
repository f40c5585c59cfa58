/// Build script for GDY
///
/// WGSL shaders are embedded into the demo binary with `include_str!`
/// and compiled by the device at runtime.
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=src/renderer/shaders/triangle.vert.wgsl");
    println!("cargo:rerun-if-changed=src/renderer/shaders/triangle.frag.wgsl");
}
