//! YouTube caption source backed by yt-dlp.

use super::{parse_vtt, CaptionSource, VideoId, VideoMetadata};
use crate::config::YoutubeSettings;
use crate::error::AcquisitionError;
use crate::transcript::Transcript;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::{debug, instrument};

/// Subset of the `--dump-json` document we rely on.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    view_count: Option<u64>,
    /// YYYYMMDD
    upload_date: Option<String>,
    /// Spoken language, when YouTube knows it.
    language: Option<String>,
    #[serde(default)]
    subtitles: HashMap<String, serde_json::Value>,
    #[serde(default)]
    automatic_captions: HashMap<String, serde_json::Value>,
}

impl YtDlpInfo {
    fn into_metadata(self) -> VideoMetadata {
        let published_at = self.upload_date.as_deref().and_then(|date| {
            chrono::NaiveDate::parse_from_str(date, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        });

        VideoMetadata {
            id: VideoId::new(self.id),
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            channel: self.channel.or(self.uploader),
            duration_seconds: self.duration.map(|d| d as u32),
            thumbnail_url: self.thumbnail,
            view_count: self.view_count,
            published_at,
        }
    }
}

/// Caption track chosen for download.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CaptionTrack {
    /// Key as listed by yt-dlp, passed back to `--sub-lang`.
    key: String,
    automatic: bool,
}

/// YouTube caption source.
pub struct YoutubeCaptionSource {
    ytdlp_path: String,
    languages: Vec<String>,
    cookies_path: Option<PathBuf>,
}

impl YoutubeCaptionSource {
    pub fn new(settings: &YoutubeSettings) -> Self {
        Self {
            ytdlp_path: settings.ytdlp_path.clone(),
            languages: settings.languages.clone(),
            cookies_path: settings
                .cookies_path
                .as_deref()
                .map(|p| PathBuf::from(shellexpand::tilde(p).to_string())),
        }
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<Output, AcquisitionError> {
        let mut cmd = tokio::process::Command::new(&self.ytdlp_path);
        cmd.args(["--no-warnings", "--no-playlist"]);
        if let Some(cookies) = &self.cookies_path {
            cmd.arg("--cookies").arg(cookies);
        }
        // A timed-out or cancelled fetch drops this future; take the child with it.
        cmd.args(args).kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AcquisitionError::ToolUnavailable(self.ytdlp_path.clone())
            } else {
                AcquisitionError::Transient(format!("failed to run yt-dlp: {}", e))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        Ok(output)
    }

    async fn fetch_info(&self, id: &VideoId) -> Result<YtDlpInfo, AcquisitionError> {
        let url = id.watch_url();
        let output = self
            .run_ytdlp(&["--dump-json", "--skip-download", &url])
            .await?;

        serde_json::from_slice(&output.stdout).map_err(|e| {
            AcquisitionError::Unsupported(format!("unexpected yt-dlp metadata: {}", e))
        })
    }

    async fn download_track(
        &self,
        id: &VideoId,
        track: &CaptionTrack,
        dir: &Path,
    ) -> Result<String, AcquisitionError> {
        let url = id.watch_url();
        let template = dir.join("%(id)s.%(ext)s");
        let template = template.to_string_lossy();
        let kind = if track.automatic {
            "--write-auto-sub"
        } else {
            "--write-sub"
        };

        self.run_ytdlp(&[
            "--skip-download",
            kind,
            "--sub-lang",
            &track.key,
            "--sub-format",
            "vtt",
            "-o",
            &template,
            &url,
        ])
        .await?;

        let vtt_path = find_vtt(dir)
            .await
            .map_err(|e| AcquisitionError::Transient(format!("failed to read captions: {}", e)))?
            .ok_or(AcquisitionError::CaptionsDisabled)?;

        tokio::fs::read_to_string(&vtt_path)
            .await
            .map_err(|e| AcquisitionError::Unsupported(format!("unreadable caption file: {}", e)))
    }

    /// Select, download and parse the best caption track listed in `info`.
    async fn transcript_for(&self, id: &VideoId, info: &YtDlpInfo) -> Result<Transcript, AcquisitionError> {
        let track = select_track(info, &self.languages).ok_or(AcquisitionError::CaptionsDisabled)?;
        debug!(track = %track.key, automatic = track.automatic, "Selected caption track");

        let dir = tempfile::tempdir()
            .map_err(|e| AcquisitionError::Transient(format!("failed to create temp dir: {}", e)))?;
        let payload = self.download_track(id, &track, dir.path()).await?;

        let transcript = Transcript::new(
            id.clone(),
            Some(base_language(&track.key).to_string()),
            parse_vtt(&payload)?,
        );
        if transcript.is_empty() {
            return Err(AcquisitionError::CaptionsDisabled);
        }
        Ok(transcript)
    }
}

#[async_trait]
impl CaptionSource for YoutubeCaptionSource {
    fn name(&self) -> &'static str {
        "youtube"
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn fetch_metadata(&self, id: &VideoId) -> Result<VideoMetadata, AcquisitionError> {
        Ok(self.fetch_info(id).await?.into_metadata())
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn fetch_transcript(&self, id: &VideoId) -> Result<Transcript, AcquisitionError> {
        let info = self.fetch_info(id).await?;
        self.transcript_for(id, &info).await
    }

    /// Metadata and captions from a single `--dump-json` lookup.
    #[instrument(skip(self), fields(video_id = %id))]
    async fn fetch_video(&self, id: &VideoId) -> Result<(VideoMetadata, Transcript), AcquisitionError> {
        let info = self.fetch_info(id).await?;
        let transcript = self.transcript_for(id, &info).await?;
        Ok((info.into_metadata(), transcript))
    }
}

/// First `.vtt` file yt-dlp wrote into `dir`.
async fn find_vtt(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("vtt") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Pick a caption track: manual captions in a preferred language, then
/// automatic ones in a preferred language, then any manual track, then the
/// automatic track in the spoken language.
fn select_track(info: &YtDlpInfo, preferred: &[String]) -> Option<CaptionTrack> {
    let matching = |tracks: &HashMap<String, serde_json::Value>, lang: &str| {
        let mut keys: Vec<&String> = tracks
            .keys()
            .filter(|k| k.as_str() != "live_chat" && language_matches(k, lang))
            .collect();
        // Exact code first, then regional variants in a stable order
        keys.sort_by(|a, b| {
            (a.as_str() != lang, a.as_str()).cmp(&(b.as_str() != lang, b.as_str()))
        });
        keys.first().map(|k| k.to_string())
    };

    for lang in preferred {
        if let Some(key) = matching(&info.subtitles, lang) {
            return Some(CaptionTrack { key, automatic: false });
        }
    }
    for lang in preferred {
        if let Some(key) = matching(&info.automatic_captions, lang) {
            return Some(CaptionTrack { key, automatic: true });
        }
    }

    let mut manual: Vec<&String> = info.subtitles.keys().filter(|k| k.as_str() != "live_chat").collect();
    manual.sort();
    if let Some(key) = manual.first() {
        return Some(CaptionTrack {
            key: key.to_string(),
            automatic: false,
        });
    }

    let mut auto: Vec<&String> = info.automatic_captions.keys().collect();
    auto.sort();
    auto.iter()
        .find(|k| k.ends_with("-orig"))
        .or_else(|| {
            info.language
                .as_deref()
                .and_then(|lang| auto.iter().find(|k| language_matches(k, lang)))
        })
        .map(|key| CaptionTrack {
            key: key.to_string(),
            automatic: true,
        })
}

/// "en" matches "en", "en-US" and "en-orig".
fn language_matches(key: &str, lang: &str) -> bool {
    key == lang || key.strip_prefix(lang).is_some_and(|rest| rest.starts_with('-'))
}

fn base_language(key: &str) -> &str {
    key.split('-').next().unwrap_or(key)
}

/// Map yt-dlp's stderr to an acquisition error kind.
fn classify_stderr(stderr: &str) -> AcquisitionError {
    let lower = stderr.to_lowercase();
    let summary = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or_else(|| stderr.lines().last().unwrap_or(""))
        .trim()
        .to_string();

    const NOT_FOUND: &[&str] = &[
        "video unavailable",
        "private video",
        "does not exist",
        "has been removed",
        "incomplete youtube id",
        "not a valid url",
    ];
    const NO_CAPTIONS: &[&str] = &["no subtitles", "there are no subtitles", "subtitles are disabled"];

    if NOT_FOUND.iter().any(|p| lower.contains(p)) {
        AcquisitionError::NotFound
    } else if NO_CAPTIONS.iter().any(|p| lower.contains(p)) {
        AcquisitionError::CaptionsDisabled
    } else {
        // Rate limits, 5xx and network errors, and anything unrecognized
        AcquisitionError::Transient(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: serde_json::Value) -> YtDlpInfo {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_metadata_from_ytdlp_json() {
        let metadata = info(serde_json::json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "uploader": "Rick Astley",
            "duration": 212.0,
            "view_count": 1500000000u64,
            "upload_date": "20091025",
            "formats": [{"format_id": "18"}]
        }))
        .into_metadata();

        assert_eq!(metadata.id.as_str(), "dQw4w9WgXcQ");
        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.channel.as_deref(), Some("Rick Astley"));
        assert_eq!(metadata.duration_seconds, Some(212));
        assert_eq!(
            metadata.published_at.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2009-10-25".to_string())
        );
    }

    #[test]
    fn test_select_prefers_manual_in_preferred_order() {
        let prefs = vec!["fr".to_string(), "en".to_string()];
        let info = info(serde_json::json!({
            "id": "x",
            "subtitles": {"en": [], "de": []},
            "automatic_captions": {"fr": [], "en": []}
        }));

        assert_eq!(
            select_track(&info, &prefs),
            Some(CaptionTrack { key: "en".to_string(), automatic: false })
        );
    }

    #[test]
    fn test_select_falls_back_to_automatic_then_any() {
        let prefs = vec!["fr".to_string()];

        let auto = info(serde_json::json!({
            "id": "x",
            "subtitles": {},
            "automatic_captions": {"fr-FR": [], "en": []}
        }));
        assert_eq!(
            select_track(&auto, &prefs),
            Some(CaptionTrack { key: "fr-FR".to_string(), automatic: true })
        );

        let other = info(serde_json::json!({
            "id": "x",
            "language": "ja",
            "automatic_captions": {"de": [], "ja": [], "ja-orig": []}
        }));
        assert_eq!(
            select_track(&other, &prefs),
            Some(CaptionTrack { key: "ja-orig".to_string(), automatic: true })
        );

        let none = info(serde_json::json!({"id": "x", "subtitles": {"live_chat": []}}));
        assert_eq!(select_track(&none, &prefs), None);
    }

    #[tokio::test]
    async fn test_find_vtt() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_vtt(dir.path()).await.unwrap(), None);

        std::fs::write(dir.path().join("abc.info.json"), "{}").unwrap();
        std::fs::write(dir.path().join("abc.fr.vtt"), "WEBVTT\n").unwrap();
        assert_eq!(
            find_vtt(dir.path()).await.unwrap(),
            Some(dir.path().join("abc.fr.vtt"))
        );
    }

    /// Stand-in for yt-dlp: logs each invocation, answers `--dump-json` from
    /// `info.json` and writes a caption file next to the `-o` template.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path) -> YoutubeCaptionSource {
        use std::os::unix::fs::PermissionsExt;

        std::fs::write(
            dir.join("info.json"),
            r#"{"id": "abc12345678", "title": "Fake talk", "channel": "Fake Channel", "subtitles": {"en": []}}"#,
        )
        .unwrap();
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{dir}/calls.log"
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then cat "{dir}/info.json"; exit 0; fi
done
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out=$(dirname "$arg"); fi
  prev="$arg"
done
printf 'WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nHello there.\n' > "$out/abc12345678.en.vtt"
"#,
            dir = dir.display()
        );
        let path = dir.join("yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        YoutubeCaptionSource::new(&YoutubeSettings {
            ytdlp_path: path.to_string_lossy().to_string(),
            languages: vec!["en".to_string()],
            cookies_path: None,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_video_reads_metadata_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = fake_ytdlp(dir.path());

        let (metadata, transcript) = source.fetch_video(&VideoId::new("abc12345678")).await.unwrap();
        assert_eq!(metadata.title, "Fake talk");
        assert_eq!(metadata.channel.as_deref(), Some("Fake Channel"));
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].text, "Hello there.");

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls.lines().filter(|l| l.contains("--dump-json")).count(), 1);
        assert_eq!(calls.lines().count(), 2);
    }

    #[test]
    fn test_language_matching() {
        assert!(language_matches("en", "en"));
        assert!(language_matches("en-US", "en"));
        assert!(!language_matches("eng", "en"));
        assert_eq!(base_language("fr-FR"), "fr");
    }

    #[test]
    fn test_classify_stderr() {
        assert_eq!(
            classify_stderr("ERROR: [youtube] abc: Video unavailable"),
            AcquisitionError::NotFound
        );
        assert_eq!(
            classify_stderr("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            AcquisitionError::NotFound
        );
        assert!(classify_stderr("ERROR: unable to download video data: HTTP Error 429: Too Many Requests")
            .is_transient());
        assert_eq!(
            classify_stderr("WARNING: There are no subtitles for the requested languages"),
            AcquisitionError::CaptionsDisabled
        );
    }
}
