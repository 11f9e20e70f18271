/// Common test utilities and macros for CLI integration tests
use std::{fs, path::Path};

use image::{Rgba, RgbaImage};

pub const SIZE: u32 = 160;

/// Skin-toned portrait with deterministic grain.
pub fn write_portrait(path: &Path) {
    RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let grain = ((x * 31 + y * 17) % 13) as u8;
        Rgba([175 + grain, 130 + grain, 110 + grain, 255])
    })
    .save(path)
    .expect("save portrait");
}

/// Ring-layout landmarks: square face, triangular eyes and mouth.
pub fn write_ring_landmarks(path: &Path) {
    let json = r#"{
        "face": [[0.15,0.15],[0.85,0.15],[0.85,0.85],[0.15,0.85]],
        "left_eye": [[0.3,0.35],[0.42,0.35],[0.36,0.43]],
        "right_eye": [[0.58,0.35],[0.7,0.35],[0.64,0.43]],
        "mouth": [[0.38,0.65],[0.62,0.65],[0.5,0.74]]
    }"#;
    fs::write(path, json).expect("write landmarks");
}

/// Macro to set up a temp directory holding a portrait and its landmarks.
///
/// Creates:
/// - `temp_dir: TempDir` - temporary directory
/// - `input_path: PathBuf` - synthetic portrait (PNG)
/// - `landmarks_path: PathBuf` - ring-layout landmark JSON
///
/// # Usage
///
/// ```ignore
/// let (temp_dir, input_path, landmarks_path) = cli_test_setup!();
/// ```
#[macro_export]
macro_rules! cli_test_setup {
    () => {{
        let temp_dir = tempfile::TempDir::new().expect("create temp dir");
        let input_path = temp_dir.path().join("portrait.png");
        let landmarks_path = temp_dir.path().join("landmarks.json");
        $crate::common::write_portrait(&input_path);
        $crate::common::write_ring_landmarks(&landmarks_path);
        (temp_dir, input_path, landmarks_path)
    }};
}

/// Macro to build the CLI command with input and landmarks already set.
///
/// # Usage
///
/// ```ignore
/// let assert = retouch_cmd!(input_path, landmarks_path, ["--no-gpu"]).assert();
/// ```
#[macro_export]
macro_rules! retouch_cmd {
    ($input:expr, $landmarks:expr, [$($arg:expr),* $(,)?]) => {{
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("retouch");
        cmd.arg("--input")
            .arg(&$input)
            .arg("--landmarks")
            .arg(&$landmarks)
            .env("RUST_LOG", "warn");
        $(cmd.arg($arg);)*
        cmd
    }};
}
