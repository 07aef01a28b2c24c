//! Merging analysis spans into a step list.

use std::collections::HashMap;

use crate::model::{Step, TimeSpan};

/// Attach span timings to `steps`, joined on `span.step == step.order`.
///
/// Total: never fails, and the result has the same length and order as
/// `steps`. A `None` span value leaves the field unset; a step without a
/// span gets no timing at all. When several spans name the same step the
/// first one is used. If both values are present but the end is not after
/// the start, only the start is kept.
pub fn merge(steps: &[Step], spans: &[TimeSpan]) -> Vec<Step> {
    let mut by_step: HashMap<u32, &TimeSpan> = HashMap::with_capacity(spans.len());
    for span in spans {
        by_step.entry(span.step).or_insert(span);
    }

    steps
        .iter()
        .map(|step| {
            let mut merged = step.untimed();
            if let Some(span) = by_step.get(&step.order) {
                merged.video_start_time = span.start_seconds;
                merged.video_end_time = match (span.start_seconds, span.end_seconds) {
                    (Some(start), Some(end)) if end <= start => None,
                    (_, end) => end,
                };
            }
            merged
        })
        .collect()
}
