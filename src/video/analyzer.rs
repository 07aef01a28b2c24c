use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{AlignmentError, AnalysisError, AnalysisParseError};
use crate::json_text::first_json_array;
use crate::model::{TimeSpan, VideoHandle};
use crate::video::client::VideoBackend;
use crate::video::prompt::{build_prompt, PromptPolicy};

/// Asks the video backend when each instruction happens on screen
pub struct TemporalAnalyzer {
    backend: Arc<dyn VideoBackend>,
    temperature: f32,
    request_timeout: Duration,
}

impl TemporalAnalyzer {
    pub fn new(backend: Arc<dyn VideoBackend>, temperature: f32, request_timeout: Duration) -> Self {
        TemporalAnalyzer {
            backend,
            temperature,
            request_timeout,
        }
    }

    /// Analyze `instructions`, numbered 1..N by position.
    ///
    /// Fails with [`AlignmentError::Analysis`] when the call itself fails and
    /// with [`AlignmentError::Parse`] when the reply holds no span list.
    pub async fn analyze(
        &self,
        video: &VideoHandle,
        instructions: &[String],
        policy: &PromptPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<TimeSpan>, AlignmentError> {
        let prompt = build_prompt(policy, instructions);
        info!(
            "Analyzing video {} for {} steps ({} prompt)",
            video,
            instructions.len(),
            policy
        );

        let call = self.backend.analyze(video, &prompt, self.temperature);
        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled.into()),

            _ = tokio::time::sleep(self.request_timeout) => {
                return Err(AnalysisError::TimedOut(self.request_timeout).into());
            }

            result = call => result.map_err(|e| AnalysisError::Backend(e.to_string()))?,
        };

        let text = response
            .data
            .filter(|data| !data.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)?;
        debug!("Analysis reply: {}", text);

        Ok(parse_spans(&text)?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpan {
    step: f64,
    #[serde(default)]
    start_seconds: Option<f64>,
    #[serde(default)]
    end_seconds: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Interpret an analysis reply as a list of spans.
///
/// The first well-formed JSON array in the text is used; surrounding prose
/// and unknown fields are ignored. Entries whose `step` is not a positive
/// whole number are skipped.
pub fn parse_spans(text: &str) -> Result<Vec<TimeSpan>, AnalysisParseError> {
    let parse_error = |reason: String| AnalysisParseError {
        reason,
        raw: text.to_string(),
    };

    let json = first_json_array(text)
        .ok_or_else(|| parse_error("no JSON array found in response".to_string()))?;
    let raw: Vec<RawSpan> =
        serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))?;

    Ok(raw
        .into_iter()
        .filter(|span| span.step.is_finite() && span.step >= 1.0 && span.step.fract() == 0.0)
        .map(|span| TimeSpan {
            step: span.step as u32,
            start_seconds: seconds(span.start_seconds),
            end_seconds: seconds(span.end_seconds),
            confidence: span
                .confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
        })
        .collect())
}

fn seconds(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::video::client::{AnalyzeResponse, IndexingStatus};
    use crate::model::TaskId;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedAnalysis {
        reply: Option<&'static str>,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VideoBackend for CannedAnalysis {
        async fn create_task(&self, _index_id: &str, _url: &str) -> Result<TaskId, ProviderError> {
            Err("not used".into())
        }

        async fn task_status(&self, _task_id: &TaskId) -> Result<IndexingStatus, ProviderError> {
            Err("not used".into())
        }

        async fn analyze(
            &self,
            _video: &VideoHandle,
            prompt: &str,
            temperature: f32,
        ) -> Result<AnalyzeResponse, ProviderError> {
            assert_eq!(temperature, 0.2);
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(AnalyzeResponse {
                data: self.reply.map(String::from),
            })
        }
    }

    fn analyzer(reply: Option<&'static str>, delay: Duration) -> (TemporalAnalyzer, Arc<CannedAnalysis>) {
        let backend = Arc::new(CannedAnalysis {
            reply,
            delay,
            prompts: Mutex::new(Vec::new()),
        });
        (
            TemporalAnalyzer::new(backend.clone(), 0.2, Duration::from_secs(120)),
            backend,
        )
    }

    fn pasta() -> Vec<String> {
        ["Boil water.", "Add pasta.", "Drain."]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_tolerant_reply_with_prose_and_nulls() {
        let reply = r#"Sure! Here are the timestamps:
```json
[
  {"step": 1, "description": "Boil water.", "startSeconds": 0, "endSeconds": 20, "confidence": 0.9},
  {"step": 2, "description": "Add pasta.", "startSeconds": 18, "endSeconds": 90, "confidence": 0.4},
  {"step": 3, "description": "Drain.", "startSeconds": null, "endSeconds": null, "confidence": 0.0}
]
```"#;

        let spans = parse_spans(reply).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].start_seconds, Some(18.0));
        assert_eq!(spans[1].confidence, Some(0.4));
        assert_eq!(spans[2].start_seconds, None);
        assert_eq!(spans[2].end_seconds, None);
    }

    #[test]
    fn test_parse_normalizes_out_of_range_values() {
        let spans = parse_spans(
            r#"[{"step": 1, "startSeconds": -3, "endSeconds": 12.5, "confidence": 1.7},
                {"step": 0, "startSeconds": 1, "endSeconds": 2},
                {"step": 2}]"#,
        )
        .unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start_seconds, None);
        assert_eq!(spans[0].end_seconds, Some(12.5));
        assert_eq!(spans[0].confidence, Some(1.0));
        assert_eq!(spans[1], TimeSpan::new(2, None, None));
    }

    #[test]
    fn test_unparseable_reply_keeps_raw_text() {
        let err = parse_spans("I could not find any cooking in this video.").unwrap_err();
        assert!(err.reason.contains("no JSON array"));
        assert_eq!(err.raw, "I could not find any cooking in this video.");

        let err = parse_spans(r#"[{"start": 1}]"#).unwrap_err();
        assert_eq!(err.raw, r#"[{"start": 1}]"#);
    }

    #[tokio::test]
    async fn test_analyze_sends_numbered_prompt() {
        let (analyzer, backend) = analyzer(
            Some(r#"[{"step": 1, "startSeconds": 0, "endSeconds": 20}]"#),
            Duration::ZERO,
        );

        let spans = analyzer
            .analyze(
                &VideoHandle("vid-1".to_string()),
                &pasta(),
                &PromptPolicy::Strict,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(spans, vec![TimeSpan::new(1, Some(0.0), Some(20.0))]);
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("1. Boil water.\n2. Add pasta.\n3. Drain."));
    }

    #[tokio::test]
    async fn test_missing_data_is_empty_response() {
        let (analyzer, _) = analyzer(None, Duration::ZERO);
        let err = analyzer
            .analyze(
                &VideoHandle("vid-1".to_string()),
                &pasta(),
                &PromptPolicy::Tolerant,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AlignmentError::Analysis(AnalysisError::EmptyResponse)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let (analyzer, _) = analyzer(Some("[]"), Duration::from_secs(600));
        let err = analyzer
            .analyze(
                &VideoHandle("vid-1".to_string()),
                &pasta(),
                &PromptPolicy::Strict,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AlignmentError::Analysis(AnalysisError::TimedOut(t)) if t == Duration::from_secs(120)
        ));
    }
}
