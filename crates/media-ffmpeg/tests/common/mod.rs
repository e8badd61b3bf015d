use std::path::{Path, PathBuf};
use std::process::Command;

/// Synthesizes a `testsrc` clip with a sine audio track.
pub fn make_sample_video(dir: &Path, seconds: f64) -> PathBuf {
    let output = dir.join(format!("sample-{seconds}.mp4"));
    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=160x90:rate=30",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
        ])
        .arg(seconds.to_string())
        .args(["-pix_fmt", "yuv420p"])
        .arg(&output)
        .output()
        .expect("ffmpeg must be installed to run tests");

    assert!(
        status.status.success(),
        "ffmpeg command must succeed: {}",
        String::from_utf8_lossy(&status.stderr)
    );
    output
}
