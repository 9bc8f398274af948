use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

pub const PLAYLIST_NAME: &str = "playlist.m3u8";
// FFmpeg replaces %03d with the segment number
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} exited with {status}")]
    Failed {
        program: String,
        status: ExitStatus,
        // stdout + stderr
        output: String,
    },
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), TranscodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn hls_args(input: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
        args.extend(
            [
                "-g", "60", // Keyframe every 60 frames
                "-codec:v", "h264",
                "-preset", "veryfast",
                "-b:v", "1M",
                "-maxrate", "1.2M",
                "-bufsize", "1.8M",
                "-vf", "scale=-2:720", // 720p, keep aspect ratio
                "-codec:a", "aac",
                "-b:a", "128k",
                "-f", "hls",
                "-hls_time", "2",
                "-hls_playlist_type", "vod",
                "-hls_segment_filename",
            ]
            .iter()
            .map(OsString::from),
        );
        args.push(output_dir.join(SEGMENT_PATTERN).into_os_string());
        args.push(output_dir.join(PLAYLIST_NAME).into_os_string());
        args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), TranscodeError> {
        let program = self.program_name();
        let args = Self::hls_args(input, output_dir);

        debug!(program = %program, args = ?args, "Running transcoder");
        info!(input = %input.display(), "🎥 Transcoding to HLS");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            error!(program = %program, status = %output.status, output = %combined, "FFmpeg failed");
            return Err(TranscodeError::Failed {
                program,
                status: output.status,
                output: combined,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn hls_args_match_the_rendition_contract() {
        let args = FfmpegTranscoder::hls_args(
            Path::new("/work/abc/input/abc"),
            Path::new("/work/abc"),
        );

        assert_eq!(
            as_strings(&args),
            vec![
                "-i", "/work/abc/input/abc",
                "-g", "60",
                "-codec:v", "h264",
                "-preset", "veryfast",
                "-b:v", "1M",
                "-maxrate", "1.2M",
                "-bufsize", "1.8M",
                "-vf", "scale=-2:720",
                "-codec:a", "aac",
                "-b:a", "128k",
                "-f", "hls",
                "-hls_time", "2",
                "-hls_playlist_type", "vod",
                "-hls_segment_filename", "/work/abc/segment_%03d.ts",
                "/work/abc/playlist.m3u8",
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let transcoder = FfmpegTranscoder::new("nonexistent_transcoder_xyz_12345");
        let err = transcoder
            .transcode(Path::new("in"), Path::new("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let transcoder = FfmpegTranscoder::new("false");
        let err = transcoder
            .transcode(Path::new("in"), Path::new("out"))
            .await
            .unwrap_err();

        match err {
            TranscodeError::Failed { program, status, .. } => {
                assert_eq!(program, "false");
                assert!(!status.success());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_success() {
        let transcoder = FfmpegTranscoder::new("true");
        assert!(
            transcoder
                .transcode(Path::new("in"), Path::new("out"))
                .await
                .is_ok()
        );
    }
}
