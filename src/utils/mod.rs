use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use url::Url;

use crate::SourceError;

/// Check whether a string is a well-formed 11-character video id
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Derive the cache key for a video id
pub fn cache_key(video_id: &str) -> String {
    format!("{}_transcript", video_id)
}

/// Extract a video id from CLI input, accepting either a bare 11-character
/// id or any of the common YouTube URL shapes
pub fn extract_video_id(input: &str) -> Option<String> {
    if is_valid_video_id(input) {
        return Some(input.to_string());
    }

    let parsed = Url::parse(input).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").to_string();

    let candidate = match host.as_str() {
        "youtu.be" => parsed.path_segments()?.next().map(|s| s.to_string()),
        "youtube.com" | "m.youtube.com" => {
            if parsed.path() == "/watch" {
                parsed
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.to_string())
            } else {
                // /embed/{id}, /v/{id}, /shorts/{id}
                let mut segments = parsed.path_segments()?;
                match segments.next() {
                    Some("embed") | Some("v") | Some("shorts") => {
                        segments.next().map(|s| s.to_string())
                    }
                    _ => None,
                }
            }
        }
        _ => None,
    };

    candidate.filter(|id| is_valid_video_id(id))
}

/// Normalize a language preference list, falling back to English
pub fn normalize_languages(languages: &[String]) -> Vec<String> {
    let cleaned: Vec<String> = languages
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .collect();

    if cleaned.is_empty() {
        vec!["en".to_string()]
    } else {
        cleaned
    }
}

/// Run a subprocess with a hard timeout, killing it if the deadline passes.
///
/// The spawned process is exclusively owned by this call: on timeout it is
/// terminated, not abandoned, and `kill_on_drop` covers cancellation of the
/// enclosing future.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<std::process::Output, SourceError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SourceError::DependencyMissing(format!("Failed to start {}: {}", program, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| SourceError::Parse(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| SourceError::Parse(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| SourceError::Network(format!("Failed to wait for {}: {}", program, e)))?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(SourceError::Timeout(limit.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_video_id() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(is_valid_video_id("AAAAAAAAAAA"));
        assert!(is_valid_video_id("a-b_c123XYZ"));
        assert!(!is_valid_video_id("short"));
        assert!(!is_valid_video_id("waytoolongid"));
        assert!(!is_valid_video_id("bad id here"));
        assert!(!is_valid_video_id("dQw4w9WgXc!"));
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("dQw4w9WgXcQ"), "dQw4w9WgXcQ_transcript");
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://m.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(extract_video_id("https://example.com/watch?v=x"), None);
        assert_eq!(extract_video_id("not a url"), None);
    }

    #[test]
    fn test_normalize_languages() {
        assert_eq!(normalize_languages(&[]), vec!["en".to_string()]);
        assert_eq!(
            normalize_languages(&[" EN ".to_string(), "de".to_string()]),
            vec!["en".to_string(), "de".to_string()]
        );
        assert_eq!(
            normalize_languages(&["$bad".to_string()]),
            vec!["en".to_string()]
        );
        assert_eq!(
            normalize_languages(&["pt-BR".to_string()]),
            vec!["pt-br".to_string()]
        );
    }

    #[tokio::test]
    async fn test_run_output_with_timeout_kills_process() {
        let started = std::time::Instant::now();
        let result = run_output_with_timeout(
            "sleep",
            &["5".to_string()],
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(SourceError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_timed_out_process_is_killed_not_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("sleep 1 && touch {}", marker.display());

        let result = run_output_with_timeout(
            "sh",
            &["-c".to_string(), script],
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(SourceError::Timeout(_))));

        // Were the shell still alive it would create the marker after 1s
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_output_with_timeout_success() {
        let output = run_output_with_timeout(
            "echo",
            &["hello".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_output_with_timeout_missing_program() {
        let result = run_output_with_timeout(
            "definitely-not-a-real-binary-xyz",
            &[],
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(SourceError::DependencyMissing(_))));
    }
}
