// gpu/mod.rs — GPU acceleration layer.
//
// wgpu compute kernels that mirror the CPU stages in the parent crate. The
// CPU implementations remain the authoritative reference: every GPU stage is
// validated against them within a small floating-point tolerance.
//
// Data layout: every stage buffer is a tightly packed storage buffer, one
// element per pixel, row-major (stride == width). 8-bit input images are
// packed four pixels per u32 word and unpacked in the shader.
//
// Ordering: all stages of a frame are encoded into one command encoder, one
// compute pass per dispatch. wgpu inserts the barriers between passes, so a
// stage always sees its producer's writes.

pub mod buffer;
pub mod device;
pub mod filter;
pub mod imagemodel;
pub(crate) mod kernel;
pub mod propagation;
pub mod smoother;
pub mod update;

/// Re-run a single `#[ignore]`d inner test in a child `cargo test` process.
///
/// GPU drivers occasionally abort the process on teardown; isolating each
/// GPU test keeps one bad driver exit from failing the whole suite. The
/// inner test prints `GPU_TEST_OK` on success.
#[cfg(test)]
pub(crate) fn run_gpu_test_in_subprocess(test_name: &str) -> String {
    let output = std::process::Command::new("cargo")
        .args([
            "test", "--lib", "--",
            test_name, "--exact", "--ignored", "--nocapture",
        ])
        .output()
        .unwrap_or_else(|e| panic!("subprocess failed for {test_name}: {e}"));
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    print!("{stdout}");
    eprint!("{stderr}");
    stdout + &stderr
}
