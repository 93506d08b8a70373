use std::path::Path;
use std::process::{Command, Output};

fn upscaler(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_upscaler"))
        .current_dir(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("UPSCALER_WEIGHTS")
        .env_remove("UPSCALER_WEIGHTS_URL")
        .env_remove("UPSCALER_WEIGHTS_SHA256")
        .env("NO_COLOR", "1")
        .output()
        .expect("run upscaler")
}

fn write_png(path: &Path) {
    image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
        .save(path)
        .expect("write png");
}

#[test]
fn help_lists_positionals_and_model_flags() {
    let dir = tempfile::tempdir().unwrap();
    let output = upscaler(dir.path(), &["--help"]);
    assert!(
        output.status.success(),
        "upscaler --help failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    for needle in ["[INPUT]", "[OUTPUT]", "--weights", "--execution", "--no-tiling"] {
        assert!(stdout.contains(needle), "missing {needle} in help output:\n{stdout}");
    }
}

#[test]
fn missing_input_fails_before_model_load() {
    let dir = tempfile::tempdir().unwrap();
    let output = upscaler(dir.path(), &["nope.png", "out.png"]);

    assert_eq!(output.status.code(), Some(11));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Input image not found"),
        "unexpected stderr: {stderr}"
    );
    assert!(
        !stderr.contains("Loading ONNX model"),
        "model load attempted: {stderr}"
    );
    assert!(!dir.path().join("out.png").exists());
}

#[test]
fn default_input_is_source_png() {
    let dir = tempfile::tempdir().unwrap();
    let output = upscaler(dir.path(), &[]);

    assert_eq!(output.status.code(), Some(11));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("source.png"), "unexpected stderr: {stderr}");
    assert!(!dir.path().join("output.png").exists());
}

#[test]
fn missing_weights_without_url_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("in.png"));

    let output = upscaler(
        dir.path(),
        &["in.png", "out.png", "--weights", "no/such/model.onnx"],
    );

    assert_eq!(output.status.code(), Some(30));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no download URL"),
        "unexpected stderr: {stderr}"
    );
    assert!(!dir.path().join("out.png").exists());
}

#[test]
fn zip_archive_weights_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("in.png"));
    std::fs::write(dir.path().join("model.onnx"), b"PK\x03\x04zipped").unwrap();

    let output = upscaler(dir.path(), &["in.png", "out.png", "--weights", "model.onnx"]);

    assert_eq!(output.status.code(), Some(32));
    assert!(!dir.path().join("out.png").exists());
}
