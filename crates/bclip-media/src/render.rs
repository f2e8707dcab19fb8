//! Branded clip rendering.
//!
//! A branded clip is the intro bumper, a cut of the source and the ending
//! bumper, each normalized onto a shared canvas and concatenated into one
//! file. Render progress is reported against the total expected output
//! duration and capped so the tail of the scale stays free for thumbnails.

use std::path::{Path, PathBuf};
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bclip_models::{CanvasConfig, EncodingConfig, ProgressEvent};

use crate::command::{wait_for_cancel, FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::config::ToolPaths;
use crate::error::{MediaError, MediaResult};
use crate::filters::{branded_concat, ConcatInput, AUDIO_OUT, VIDEO_OUT};
use crate::probe::MediaProbe;
use crate::progress::render_percent;

/// Inputs of one branded render.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Intro bumper, played in full
    pub intro: Option<PathBuf>,
    /// Recording the segment is cut from
    pub source: PathBuf,
    /// Ending bumper, played in full
    pub ending: Option<PathBuf>,
    /// Segment start in the source, seconds
    pub start_time: f64,
    /// Segment length, seconds
    pub duration: f64,
    /// Rendered file
    pub output: PathBuf,
}

/// A render as it will run: the bumpers that made it in and every concat
/// input in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub intro: Option<PathBuf>,
    pub ending: Option<PathBuf>,
    pub inputs: Vec<ConcatInput>,
}

impl RenderPlan {
    /// Intro + segment + ending. Bumpers that cannot be probed count as zero.
    pub fn total_expected(&self) -> f64 {
        self.inputs.iter().map(|input| input.duration).sum()
    }
}

/// What a finished render reports back.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub output: PathBuf,
    /// Intro + segment + ending, as probed before encoding
    pub total_expected_secs: f64,
    /// Wall-clock encode time
    pub encode_secs: f64,
}

/// Renders branded clips with the configured tools and encoder settings.
#[derive(Debug, Clone)]
pub struct Renderer {
    tools: ToolPaths,
    encoding: EncodingConfig,
    canvas: CanvasConfig,
    timeout_secs: Option<u64>,
}

impl Renderer {
    pub fn new(tools: &ToolPaths, encoding: EncodingConfig, canvas: CanvasConfig) -> Self {
        Self {
            tools: tools.clone(),
            encoding,
            canvas,
            timeout_secs: None,
        }
    }

    /// Kill renders that run longer than `secs`.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Probe the inputs of a job. Missing bumpers are left out; inputs that
    /// cannot be probed are assumed to carry audio.
    pub async fn plan(&self, job: &RenderJob) -> RenderPlan {
        let probe = MediaProbe::new(&self.tools);
        let intro = usable_bumper(job.intro.as_deref(), "intro");
        let ending = usable_bumper(job.ending.as_deref(), "ending");

        let mut inputs = Vec::with_capacity(3);
        if let Some(intro) = intro {
            inputs.push(probe_input(&probe, intro, None).await);
        }
        inputs.push(probe_input(&probe, &job.source, Some(job.duration)).await);
        if let Some(ending) = ending {
            inputs.push(probe_input(&probe, ending, None).await);
        }

        RenderPlan {
            intro: intro.map(Path::to_path_buf),
            ending: ending.map(Path::to_path_buf),
            inputs,
        }
    }

    /// Render a branded clip.
    ///
    /// `on_progress` is called with non-decreasing percentages no higher than
    /// the render cap, at whatever cadence the encoder reports timemarks.
    pub async fn render<F>(
        &self,
        job: &RenderJob,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: F,
    ) -> MediaResult<RenderReport>
    where
        F: Fn(ProgressEvent) + Send + 'static,
    {
        if !job.source.exists() {
            return Err(MediaError::FileNotFound(job.source.clone()));
        }
        if !(job.duration > 0.0) {
            return Err(MediaError::internal(format!(
                "segment duration must be positive, got {}",
                job.duration
            )));
        }

        // A stuck ffprobe must not outlive a cancel.
        let plan = tokio::select! {
            plan = self.plan(job) => plan,
            _ = wait_for_cancel(cancel.clone()) => return Err(MediaError::Cancelled),
        };
        let total_expected = plan.total_expected();

        info!(
            source = %job.source.display(),
            output = %job.output.display(),
            start = job.start_time,
            duration = job.duration,
            total_expected,
            "Rendering branded clip"
        );

        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = self.build_command(job, &plan);

        let mut last_percent = 0.0f64;
        on_progress(ProgressEvent::rendering(0.0));

        let runner = FfmpegRunner::new(&self.tools)
            .with_cancel(cancel)
            .with_timeout(self.timeout_secs);

        let started = Instant::now();
        let result = runner
            .run_with_progress(&cmd, move |progress| {
                let percent = render_percent(progress.out_time_secs, total_expected);
                if percent > last_percent {
                    debug!(percent, frame = progress.frame, fps = progress.fps, speed = progress.speed, "Render progress");
                    last_percent = percent;
                    on_progress(ProgressEvent::rendering(percent));
                }
            })
            .await;
        let encode_secs = started.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(()) => "success",
            Err(MediaError::Cancelled) => "cancelled",
            Err(_) => "failure",
        };
        counter!("bclip_renders_total", "outcome" => outcome).increment(1);
        histogram!("bclip_render_duration_seconds", "outcome" => outcome).record(encode_secs);

        match result {
            Ok(()) => {
                info!(output = %job.output.display(), encode_secs, "Render finished");
                Ok(RenderReport {
                    output: job.output.clone(),
                    total_expected_secs: total_expected,
                    encode_secs,
                })
            }
            Err(e) => {
                // A partial file is never a usable clip.
                let _ = tokio::fs::remove_file(&job.output).await;
                Err(e)
            }
        }
    }

    fn build_command(&self, job: &RenderJob, plan: &RenderPlan) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::to_output(&job.output);

        if let Some(intro) = &plan.intro {
            cmd = cmd.input(FfmpegInput::new(intro));
        }
        cmd = cmd.input(
            FfmpegInput::new(&job.source)
                .seek(job.start_time)
                .duration(job.duration),
        );
        if let Some(ending) = &plan.ending {
            cmd = cmd.input(FfmpegInput::new(ending));
        }

        cmd.filter_complex(branded_concat(&self.canvas, &plan.inputs))
            .map(VIDEO_OUT)
            .map(AUDIO_OUT)
            .output_args(self.encoding.to_ffmpeg_args())
    }
}

/// Length and audio presence of one input. `length` overrides the probed
/// duration for the cut segment.
async fn probe_input(probe: &MediaProbe, path: &Path, length: Option<f64>) -> ConcatInput {
    match probe.probe(path).await {
        Ok(info) => ConcatInput::new(length.unwrap_or(info.duration), info.has_audio),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Probe failed, assuming audio");
            ConcatInput::new(length.unwrap_or(0.0), true)
        }
    }
}

/// A configured bumper that is missing on disk is left out instead of
/// failing the render.
fn usable_bumper<'a>(path: Option<&'a Path>, which: &str) -> Option<&'a Path> {
    let path = path?;
    if path.exists() {
        Some(path)
    } else {
        warn!(bumper = which, path = %path.display(), "Bumper not found, rendering without it");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(dir: &Path) -> RenderJob {
        RenderJob {
            intro: Some(dir.join("intro.mp4")),
            source: dir.join("source.mp4"),
            ending: Some(dir.join("ending.mp4")),
            start_time: 100.0,
            duration: 30.0,
            output: dir.join("out.mp4"),
        }
    }

    fn renderer(tools: &ToolPaths) -> Renderer {
        Renderer::new(tools, EncodingConfig::default(), CanvasConfig::default())
    }

    #[test]
    fn test_command_layout() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let plan = RenderPlan {
            intro: job.intro.clone(),
            ending: job.ending.clone(),
            inputs: vec![
                ConcatInput::new(5.0, true),
                ConcatInput::new(30.0, true),
                ConcatInput::new(5.0, true),
            ],
        };

        let args = renderer(&ToolPaths::default())
            .build_command(&job, &plan)
            .build_args()
            .join(" ");

        let intro = args.find("intro.mp4").unwrap();
        let source = args.find("source.mp4").unwrap();
        let ending = args.find("ending.mp4").unwrap();
        assert!(intro < source && source < ending);
        assert!(args.contains("-ss 100.000 -t 30.000 -i"));
        assert!(args.contains("concat=n=3:v=1:a=1[v][a]"));
        assert!(args.contains("-map [v] -map [a]"));
        assert!(args.contains("-preset superfast"));
        assert!(args.contains("+faststart"));
    }

    #[test]
    fn test_command_without_bumpers() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let plan = RenderPlan {
            intro: None,
            ending: None,
            inputs: vec![ConcatInput::new(30.0, true)],
        };

        let args = renderer(&ToolPaths::default())
            .build_command(&job, &plan)
            .build_args()
            .join(" ");
        assert!(args.contains("concat=n=1:v=1:a=1[v][a]"));
        assert!(!args.contains("intro.mp4"));
    }

    #[tokio::test]
    async fn test_plan_with_missing_bumpers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("source.mp4"), b"source").unwrap();
        let tools = ToolPaths::new(dir.path().join("no-ffmpeg"), dir.path().join("no-ffprobe"));

        let plan = renderer(&tools).plan(&job(dir.path())).await;
        assert!(plan.intro.is_none() && plan.ending.is_none());
        assert_eq!(plan.inputs, vec![ConcatInput::new(30.0, true)]);
        assert_eq!(plan.total_expected(), 30.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_plan_counts_probed_bumpers() {
        let dir = TempDir::new().unwrap();
        for name in ["intro.mp4", "source.mp4", "ending.mp4"] {
            std::fs::write(dir.path().join(name), b"media").unwrap();
        }
        let ffprobe = crate::testing::fake_ffprobe(dir.path(), 5.0, 3600.0);
        let tools = ToolPaths::new(dir.path().join("no-ffmpeg"), ffprobe);

        let plan = renderer(&tools).plan(&job(dir.path())).await;
        assert_eq!(plan.intro, Some(dir.path().join("intro.mp4")));
        assert_eq!(plan.ending, Some(dir.path().join("ending.mp4")));
        // The segment counts for its cut length, not the source length.
        assert_eq!(
            plan.inputs,
            vec![
                ConcatInput::new(5.0, true),
                ConcatInput::new(30.0, true),
                ConcatInput::new(5.0, true),
            ]
        );
        assert_eq!(plan.total_expected(), 40.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_bumper_is_padded() {
        let dir = TempDir::new().unwrap();
        for name in ["intro.mp4", "source.mp4"] {
            std::fs::write(dir.path().join(name), b"media").unwrap();
        }
        let ffprobe = crate::testing::fake_tool(
            dir.path(),
            "ffprobe",
            r#"printf '{"streams":[{"codec_type":"video"}],"format":{"duration":"4"}}'"#,
        );
        let tools = ToolPaths::new(dir.path().join("no-ffmpeg"), ffprobe);
        let mut job = job(dir.path());
        job.ending = None;

        let renderer = renderer(&tools);
        let plan = renderer.plan(&job).await;
        assert_eq!(plan.inputs, vec![ConcatInput::new(4.0, false), ConcatInput::new(30.0, false)]);

        let args = renderer.build_command(&job, &plan).build_args().join(" ");
        assert!(args.contains("atrim=duration=4.000[s0]"));
        assert!(args.contains("[v0][s0][v1][s1]concat=n=2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_while_probing() {
        let dir = TempDir::new().unwrap();
        for name in ["intro.mp4", "source.mp4", "ending.mp4"] {
            std::fs::write(dir.path().join(name), b"media").unwrap();
        }
        let ffprobe = crate::testing::fake_tool(dir.path(), "ffprobe", "exec sleep 30");
        let tools = ToolPaths::new(dir.path().join("no-ffmpeg"), ffprobe);

        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let result = renderer(&tools).render(&job(dir.path()), Some(rx), |_| {}).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_source_fails_fast() {
        let dir = TempDir::new().unwrap();
        let result = renderer(&ToolPaths::default()).render(&job(dir.path()), None, |_| {}).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[test]
    fn test_missing_bumper_is_skipped() {
        assert!(usable_bumper(Some(Path::new("/nonexistent/intro.mp4")), "intro").is_none());
        assert!(usable_bumper(None, "intro").is_none());
    }
}
