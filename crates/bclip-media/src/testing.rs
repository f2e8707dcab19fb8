//! Stand-in executables for tests that drive the runner end to end.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script named `name` into `dir`.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// An ffprobe that reports `bumper_secs` for `intro.mp4` and `ending.mp4`
/// and `other_secs` for anything else, always with an audio stream.
pub fn fake_ffprobe(dir: &Path, bumper_secs: f64, other_secs: f64) -> PathBuf {
    fake_tool(
        dir,
        "ffprobe",
        &format!(
            "for last; do :; done\n\
             case \"$last\" in\n\
             */intro.mp4|*/ending.mp4) d={bumper_secs} ;;\n\
             *) d={other_secs} ;;\n\
             esac\n\
             printf '{{\"streams\":[{{\"codec_type\":\"audio\"}}],\"format\":{{\"duration\":\"%s\"}}}}' \"$d\""
        ),
    )
}
