use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{SourceKind, TranscriptRequest, TranscriptResult, TranscriptSource};
use crate::config::LocalProcessConfig;
use crate::utils::run_output_with_timeout;
use crate::SourceError;

/// Helper script executed by a fresh interpreter per request.
///
/// The video id and language list arrive via argv, never string
/// interpolation, and the script answers with exactly one line of JSON on
/// stdout. The subprocess is an untrusted RPC peer: its output is parsed
/// strictly and anything off-contract is a parse failure.
const HELPER_SCRIPT: &str = r#"
import json, sys

video_id = sys.argv[1]
languages = sys.argv[2:] or ["en"]

def fail(message):
    print(json.dumps({"success": False, "error": message, "video_id": video_id}))
    sys.exit(1)

try:
    from youtube_transcript_api import YouTubeTranscriptApi
except Exception as exc:
    fail("import failed: %s" % exc)

try:
    listing = YouTubeTranscriptApi.list_transcripts(video_id)
    try:
        transcript = listing.find_transcript(languages)
    except Exception:
        transcript = next(iter(listing))
    chunks = transcript.fetch()
    text = " ".join(c["text"].strip() for c in chunks if c["text"].strip())
    print(json.dumps({
        "success": True,
        "transcript": text,
        "language": transcript.language,
        "language_code": transcript.language_code,
        "is_generated": transcript.is_generated,
        "length": len(text),
    }))
except Exception as exc:
    fail(str(exc))
"#;

const PROBE_SNIPPET: &str = "import youtube_transcript_api; print('ok')";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Transcript source that shells out to the python `youtube_transcript_api`
/// library in a short-lived subprocess.
///
/// A one-time import probe runs on first use; if the interpreter or the
/// library is missing the adapter stays disabled for the process lifetime
/// with a clear diagnostic instead of failing every request.
pub struct LocalProcessAdapter {
    python_cmd: String,
    script: String,
    timeout: Duration,
    dependency: OnceCell<Result<(), String>>,
}

/// One line of JSON on the subprocess's stdout, success or failure shape
#[derive(Debug, Deserialize)]
struct ScriptOutcome {
    success: bool,
    transcript: Option<String>,
    #[allow(dead_code)]
    language: Option<String>,
    language_code: Option<String>,
    #[serde(default)]
    is_generated: bool,
    #[allow(dead_code)]
    length: Option<u64>,
    error: Option<String>,
    #[allow(dead_code)]
    video_id: Option<String>,
}

impl LocalProcessAdapter {
    pub fn new(config: &LocalProcessConfig) -> Self {
        Self {
            python_cmd: config.python_cmd.clone(),
            script: HELPER_SCRIPT.to_string(),
            timeout: Duration::from_millis(config.settings.timeout_ms),
            dependency: OnceCell::new(),
        }
    }

    /// Run the import probe once and remember the verdict for the process
    /// lifetime.
    async fn dependency_state(&self) -> Result<(), String> {
        self.dependency
            .get_or_init(|| async {
                let args = vec!["-c".to_string(), PROBE_SNIPPET.to_string()];
                match run_output_with_timeout(&self.python_cmd, &args, PROBE_TIMEOUT).await {
                    Ok(output) if output.status.success() => {
                        tracing::debug!("youtube_transcript_api import probe succeeded");
                        Ok(())
                    }
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        Err(format!(
                            "python module youtube_transcript_api unavailable: {}",
                            stderr.lines().last().unwrap_or("import failed").trim()
                        ))
                    }
                    Err(e) => Err(format!(
                        "python interpreter '{}' unavailable: {}",
                        self.python_cmd, e
                    )),
                }
            })
            .await
            .clone()
    }

    /// Map a failure message from the helper script onto the error taxonomy
    fn classify_script_error(message: &str) -> SourceError {
        let lower = message.to_lowercase();

        if lower.contains("too many requests") || lower.contains("429") {
            SourceError::RateLimited(message.to_string())
        } else if lower.contains("connection")
            || lower.contains("timed out")
            || lower.contains("unreachable")
            || lower.contains("temporary failure")
        {
            SourceError::Network(message.to_string())
        } else {
            // The library raises for disabled captions, missing transcripts,
            // unavailable videos: all definitive answers.
            SourceError::NoTranscriptAvailable(message.to_string())
        }
    }

    fn interpret_output(
        output: &std::process::Output,
        request: &TranscriptRequest,
    ) -> Result<TranscriptResult, SourceError> {
        // The contract is exactly one line of JSON on stdout; anything
        // else means the script (or whatever replaced it) is off the rails.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines().filter(|l| !l.trim().is_empty());
        let line = lines.next().unwrap_or("");

        let parsed = if lines.next().is_some() {
            Err(())
        } else {
            serde_json::from_str(line.trim()).map_err(|_| ())
        };

        let outcome: ScriptOutcome = match parsed {
            Ok(outcome) => outcome,
            Err(()) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SourceError::Parse(format!(
                    "Subprocess did not produce a single JSON line (exit {:?}): {}",
                    output.status.code(),
                    stderr.lines().last().unwrap_or("empty stderr").trim()
                )));
            }
        };

        if !outcome.success {
            return Err(Self::classify_script_error(
                outcome.error.as_deref().unwrap_or("unspecified failure"),
            ));
        }

        match outcome.transcript {
            Some(text) if !text.trim().is_empty() => {
                let language = outcome
                    .language_code
                    .unwrap_or_else(|| request.preferred_language().to_string());
                Ok(TranscriptResult::new(
                    text,
                    SourceKind::LocalProcess,
                    language,
                    outcome.is_generated,
                ))
            }
            _ => Err(SourceError::NoTranscriptAvailable(
                "subprocess returned an empty transcript".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TranscriptSource for LocalProcessAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalProcess
    }

    async fn available(&self) -> bool {
        self.dependency_state().await.is_ok()
    }

    async fn fetch(&self, request: &TranscriptRequest) -> Result<TranscriptResult, SourceError> {
        if let Err(diagnostic) = self.dependency_state().await {
            return Err(SourceError::DependencyMissing(diagnostic));
        }

        let mut args = vec![
            "-c".to_string(),
            self.script.clone(),
            request.video_id().to_string(),
        ];
        args.extend(request.languages().iter().cloned());

        tracing::debug!(
            video_id = request.video_id(),
            timeout_ms = self.timeout.as_millis() as u64,
            "spawning transcript subprocess"
        );

        let output = run_output_with_timeout(&self.python_cmd, &args, self.timeout).await?;
        Self::interpret_output(&output, request)
    }

    async fn probe(&self) -> Result<(), SourceError> {
        self.dependency_state()
            .await
            .map_err(SourceError::DependencyMissing)
    }
}
