//! FFmpeg filter graph definitions.

use bclip_models::CanvasConfig;

/// Output labels of the branded concat graph.
pub const VIDEO_OUT: &str = "[v]";
pub const AUDIO_OUT: &str = "[a]";

/// Fit one video stream into the canvas: scale down keeping aspect ratio,
/// pad to the exact size, square pixels and a fixed frame rate.
pub fn normalize_video(canvas: &CanvasConfig) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,\
         setsar=1,\
         fps={fps}",
        w = canvas.width,
        h = canvas.height,
        fps = canvas.fps
    )
}

/// One input of the concat graph, as probed before encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcatInput {
    /// Seconds this input contributes to the output
    pub duration: f64,
    /// Inputs without audio get generated silence of `duration`
    pub has_audio: bool,
}

impl ConcatInput {
    pub fn new(duration: f64, has_audio: bool) -> Self {
        Self { duration, has_audio }
    }
}

/// Silent stereo track of a fixed length.
pub fn silence(duration: f64) -> String {
    format!("anullsrc=r=48000:cl=stereo,atrim=duration={:.3}", duration.max(0.0))
}

/// Build the filter graph that normalizes every input and concatenates
/// them in input order with both video and audio.
pub fn branded_concat(canvas: &CanvasConfig, inputs: &[ConcatInput]) -> String {
    let normalize = normalize_video(canvas);
    let mut graph = String::new();

    for (i, input) in inputs.iter().enumerate() {
        graph.push_str(&format!("[{i}:v]{normalize}[v{i}];"));
        if !input.has_audio {
            graph.push_str(&format!("{}[s{i}];", silence(input.duration)));
        }
    }
    for (i, input) in inputs.iter().enumerate() {
        if input.has_audio {
            graph.push_str(&format!("[v{i}][{i}:a]"));
        } else {
            graph.push_str(&format!("[v{i}][s{i}]"));
        }
    }
    graph.push_str(&format!(
        "concat=n={}:v=1:a=1{VIDEO_OUT}{AUDIO_OUT}",
        inputs.len()
    ));

    graph
}

/// Build filter for preview frames.
pub fn filter_preview(width: u32) -> String {
    format!("scale={}:-2", width)
}

/// Momentary loudness printed per audio frame.
pub fn loudness_meter() -> &'static str {
    "ebur128=metadata=1,ametadata=mode=print:key=lavfi.r128.M"
}
