//! Video indexing and temporal analysis.

pub mod analyzer;
pub mod client;
pub mod indexer;
pub mod prompt;

pub use analyzer::{parse_spans, TemporalAnalyzer};
pub use client::{AnalyzeResponse, IndexingState, IndexingStatus, TwelveLabsClient, VideoBackend};
pub use indexer::VideoIndexer;
pub use prompt::{build_prompt, CustomPrompt, PromptPolicy};

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::alignment::merge;
use crate::error::AlignmentError;
use crate::model::{Step, TimeSpan};

/// Indexes a video and attaches time ranges to a step list
pub struct VideoAligner {
    indexer: VideoIndexer,
    analyzer: TemporalAnalyzer,
}

impl VideoAligner {
    pub fn new(indexer: VideoIndexer, analyzer: TemporalAnalyzer) -> Self {
        VideoAligner { indexer, analyzer }
    }

    /// Spans for `steps`, keyed by `step.order`
    pub async fn spans(
        &self,
        video_url: &str,
        steps: &[Step],
        policy: &PromptPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<TimeSpan>, AlignmentError> {
        let video = self.indexer.index_and_wait(video_url, cancel).await?;

        let instructions: Vec<String> = steps.iter().map(|s| s.instruction.clone()).collect();
        let spans = self
            .analyzer
            .analyze(&video, &instructions, policy, cancel)
            .await?;

        Ok(positions_to_orders(spans, steps))
    }

    /// `steps` with timing from a fresh analysis of `video_url`.
    ///
    /// Existing timing on the input steps is discarded.
    pub async fn align(
        &self,
        video_url: &str,
        steps: &[Step],
        policy: &PromptPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<Step>, AlignmentError> {
        let untimed: Vec<Step> = steps.iter().map(Step::untimed).collect();
        let spans = self.spans(video_url, &untimed, policy, cancel).await?;
        Ok(merge(&untimed, &spans))
    }
}

/// Map 1-based prompt positions back to step orders.
///
/// The analyzer numbers instructions by position; stored orders need not be
/// exactly 1..N. Positions outside the list are dropped.
pub fn positions_to_orders(spans: Vec<TimeSpan>, steps: &[Step]) -> Vec<TimeSpan> {
    spans
        .into_iter()
        .filter_map(|mut span| {
            let index = (span.step as usize).checked_sub(1)?;
            match steps.get(index) {
                Some(step) => {
                    span.step = step.order;
                    Some(span)
                }
                None => {
                    debug!("Dropping span for unknown step position {}", span.step);
                    None
                }
            }
        })
        .collect()
}
