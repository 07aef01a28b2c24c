//! Human-gated re-analysis of stored step timings.
//!
//! A re-analysis produces a candidate step list that is held in memory until
//! the recipe owner compares it with the stored steps and either applies it
//! wholesale or discards it. Nothing is written to the store before an
//! explicit apply.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AlignmentError, RecipeError};
use crate::model::{Caller, Recipe, RecipeId, Step, UserId};
use crate::store::RecipeStore;
use crate::video::{PromptPolicy, VideoAligner};

/// Identifies one staged re-analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateHandle(pub Uuid);

impl fmt::Display for CandidateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

const ABANDONED: &str = "abandoned before completion";

/// Review progress of a ready candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    AwaitingReview,
    Comparing,
    /// A decision is being written
    Committing,
    Applied,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReanalysisState {
    Idle,
    Running,
    Ready(ReviewState),
    Failed { reason: String },
}

impl fmt::Display for ReanalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReanalysisState::Idle => f.write_str("idle"),
            ReanalysisState::Running => f.write_str("running"),
            ReanalysisState::Ready(ReviewState::AwaitingReview) => f.write_str("ready"),
            ReanalysisState::Ready(ReviewState::Comparing) => f.write_str("comparing"),
            ReanalysisState::Ready(ReviewState::Committing) => f.write_str("committing"),
            ReanalysisState::Ready(ReviewState::Applied) => f.write_str("applied"),
            ReanalysisState::Ready(ReviewState::Discarded) => f.write_str("discarded"),
            ReanalysisState::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// What the owner decided to do with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Discard,
}

/// Stored steps next to a candidate, with one flag per row
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub recipe_id: RecipeId,
    pub current: Vec<Step>,
    pub candidate: Vec<Step>,
    /// `true` where the (start, end) pair differs, presence included
    pub diff_flags: Vec<bool>,
}

/// One row of a [`Comparison`]
#[derive(Debug, Clone, Copy)]
pub struct ComparisonRow<'a> {
    pub index: usize,
    pub current: Option<&'a Step>,
    pub candidate: Option<&'a Step>,
    pub changed: bool,
}

impl Comparison {
    pub fn new(recipe_id: RecipeId, current: Vec<Step>, candidate: Vec<Step>) -> Self {
        let diff_flags = diff_flags(&current, &candidate);
        Comparison {
            recipe_id,
            current,
            candidate,
            diff_flags,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = ComparisonRow<'_>> {
        self.diff_flags
            .iter()
            .enumerate()
            .map(|(index, changed)| ComparisonRow {
                index,
                current: self.current.get(index),
                candidate: self.candidate.get(index),
                changed: *changed,
            })
    }

    pub fn changed_count(&self) -> usize {
        self.diff_flags.iter().filter(|changed| **changed).count()
    }
}

/// Per-index timing differences over the longer of the two lists
pub fn diff_flags(current: &[Step], candidate: &[Step]) -> Vec<bool> {
    let rows = current.len().max(candidate.len());
    (0..rows)
        .map(|i| current.get(i).map(Step::timing) != candidate.get(i).map(Step::timing))
        .collect()
}

struct Entry {
    recipe_id: RecipeId,
    owner: UserId,
    video_url: String,
    policy: PromptPolicy,
    state: ReanalysisState,
    candidate: Option<Vec<Step>>,
    /// Stored steps as shown in the last comparison
    compared: Option<Vec<Step>>,
    touched: Instant,
}

impl Entry {
    fn set_state(&mut self, state: ReanalysisState) {
        self.state = state;
        self.touched = Instant::now();
    }
}

/// Puts an entry back in a settled state if the future that moved it into
/// `transient` is dropped before finishing
struct TransientGuard<'a> {
    reconciler: &'a Reconciler,
    handle: CandidateHandle,
    transient: ReanalysisState,
    rollback: Option<(ReanalysisState, Option<Vec<Step>>)>,
}

impl TransientGuard<'_> {
    /// The owner settled the entry itself
    fn disarm(mut self) {
        self.rollback = None;
    }
}

impl Drop for TransientGuard<'_> {
    fn drop(&mut self) {
        let Some((state, candidate)) = self.rollback.take() else {
            return;
        };
        let mut entries = self.reconciler.entries();
        if let Some(entry) = entries.get_mut(&self.handle) {
            if entry.state == self.transient {
                warn!("Candidate {} left {} unfinished", self.handle, self.transient);
                entry.set_state(state);
                if candidate.is_some() {
                    entry.candidate = candidate;
                }
            }
        }
    }
}

/// Holds candidates between analysis and the owner's decision.
///
/// Entries that are not running and have not changed within the retention
/// period are dropped the next time a re-analysis begins.
pub struct Reconciler {
    store: Arc<dyn RecipeStore>,
    aligner: Option<Arc<VideoAligner>>,
    entries: Mutex<HashMap<CandidateHandle, Entry>>,
    retention: Duration,
}

/// The signed-in user, or [`RecipeError::Unauthenticated`]
pub(crate) fn require_user(caller: &Caller) -> Result<&UserId, RecipeError> {
    caller.user_id().ok_or(RecipeError::Unauthenticated)
}

/// Load a recipe the caller may mutate
pub(crate) async fn owned_recipe(
    store: &dyn RecipeStore,
    recipe_id: RecipeId,
    caller: &Caller,
) -> Result<Recipe, RecipeError> {
    let user = require_user(caller)?;
    let recipe = store
        .find_by_id(recipe_id)
        .await?
        .ok_or(RecipeError::NotFound(recipe_id))?;

    if !recipe.is_owned_by(user) {
        warn!("User {} tried to modify recipe {} they do not own", user, recipe_id);
        return Err(RecipeError::Ownership { recipe_id });
    }
    Ok(recipe)
}

fn invalid_state(expected: &str, found: &ReanalysisState) -> RecipeError {
    RecipeError::InvalidState {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        aligner: Option<Arc<VideoAligner>>,
        retention: Duration,
    ) -> Self {
        Reconciler {
            store,
            aligner,
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CandidateHandle, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard(
        &self,
        handle: CandidateHandle,
        transient: ReanalysisState,
        rollback: (ReanalysisState, Option<Vec<Step>>),
    ) -> TransientGuard<'_> {
        TransientGuard {
            reconciler: self,
            handle,
            transient,
            rollback: Some(rollback),
        }
    }

    /// Forget settled entries older than the retention period
    fn sweep(&self) {
        let retention = self.retention;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.state == ReanalysisState::Running || entry.touched.elapsed() < retention
        });
        if entries.len() < before {
            debug!("Dropped {} stale re-analysis candidates", before - entries.len());
        }
    }


    /// Register a re-analysis for a recipe the caller owns
    pub async fn begin(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
        policy: PromptPolicy,
    ) -> Result<CandidateHandle, RecipeError> {
        let recipe = owned_recipe(self.store.as_ref(), recipe_id, caller).await?;
        let video_url = recipe
            .video_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or(RecipeError::NoVideo(recipe_id))?;
        let owner = require_user(caller)?.clone();
        self.sweep();

        let handle = CandidateHandle(Uuid::new_v4());
        self.entries().insert(
            handle,
            Entry {
                recipe_id,
                owner,
                video_url,
                policy,
                state: ReanalysisState::Idle,
                candidate: None,
                compared: None,
                touched: Instant::now(),
            },
        );
        Ok(handle)
    }

    /// Analyze the stored video against the stored steps.
    ///
    /// On failure the candidate moves to `Failed` and the error is returned.
    /// If this future is dropped before finishing, the candidate is marked
    /// failed as abandoned.
    pub async fn run(
        &self,
        handle: CandidateHandle,
        cancel: &CancellationToken,
    ) -> Result<(), RecipeError> {
        let (recipe_id, video_url, policy) = {
            let mut entries = self.entries();
            let entry = entries
                .get_mut(&handle)
                .ok_or(RecipeError::UnknownCandidate(handle.0))?;
            if entry.state != ReanalysisState::Idle {
                return Err(invalid_state("idle", &entry.state));
            }
            entry.set_state(ReanalysisState::Running);
            (entry.recipe_id, entry.video_url.clone(), entry.policy.clone())
        };
        let guard = self.guard(
            handle,
            ReanalysisState::Running,
            (
                ReanalysisState::Failed {
                    reason: ABANDONED.to_string(),
                },
                None,
            ),
        );
        info!("Re-analyzing recipe {} (candidate {})", recipe_id, handle);

        let result = self.analyze(recipe_id, &video_url, &policy, cancel).await;
        guard.disarm();

        let mut entries = self.entries();
        let entry = entries
            .get_mut(&handle)
            .ok_or(RecipeError::UnknownCandidate(handle.0))?;
        match result {
            Ok(candidate) => {
                entry.set_state(ReanalysisState::Ready(ReviewState::AwaitingReview));
                entry.candidate = Some(candidate);
                Ok(())
            }
            Err(e) => {
                warn!("Re-analysis of recipe {} failed: {}", recipe_id, e);
                entry.set_state(ReanalysisState::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn analyze(
        &self,
        recipe_id: RecipeId,
        video_url: &str,
        policy: &PromptPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<Step>, RecipeError> {
        let aligner = self.aligner.as_ref().ok_or(AlignmentError::Unavailable)?;
        let recipe = self
            .store
            .find_by_id(recipe_id)
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))?;

        Ok(aligner.align(video_url, &recipe.steps, policy, cancel).await?)
    }

    pub fn state(&self, handle: CandidateHandle) -> Result<ReanalysisState, RecipeError> {
        self.entries()
            .get(&handle)
            .map(|entry| entry.state.clone())
            .ok_or(RecipeError::UnknownCandidate(handle.0))
    }

    /// Stored steps next to the candidate. Moves a ready candidate into review.
    pub async fn get_comparison(&self, handle: CandidateHandle) -> Result<Comparison, RecipeError> {
        let recipe_id = {
            let entries = self.entries();
            let entry = entries
                .get(&handle)
                .ok_or(RecipeError::UnknownCandidate(handle.0))?;
            match entry.state {
                ReanalysisState::Ready(ReviewState::AwaitingReview)
                | ReanalysisState::Ready(ReviewState::Comparing) => entry.recipe_id,
                ref other => return Err(invalid_state("ready", other)),
            }
        };

        let recipe = self
            .store
            .find_by_id(recipe_id)
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))?;

        let mut entries = self.entries();
        let entry = entries
            .get_mut(&handle)
            .ok_or(RecipeError::UnknownCandidate(handle.0))?;
        let candidate = match (&entry.state, &entry.candidate) {
            (ReanalysisState::Ready(ReviewState::AwaitingReview), Some(candidate))
            | (ReanalysisState::Ready(ReviewState::Comparing), Some(candidate)) => candidate.clone(),
            (state, _) => return Err(invalid_state("ready", state)),
        };

        entry.set_state(ReanalysisState::Ready(ReviewState::Comparing));
        entry.compared = Some(recipe.steps.clone());
        Ok(Comparison::new(recipe_id, recipe.steps, candidate))
    }

    /// Apply or discard a candidate under review.
    ///
    /// Apply replaces the stored steps with the candidate as a whole. Either
    /// way the candidate is released and the recipe as stored afterwards is
    /// returned. While the decision is written the candidate is
    /// `Committing`, so a second commit fails with `InvalidState`; if the
    /// write fails it goes back to `Comparing`.
    pub async fn commit(
        &self,
        handle: CandidateHandle,
        caller: &Caller,
        decision: Decision,
    ) -> Result<Recipe, RecipeError> {
        let (recipe_id, candidate, compared) = {
            let mut entries = self.entries();
            let entry = entries
                .get_mut(&handle)
                .ok_or(RecipeError::UnknownCandidate(handle.0))?;
            let user = require_user(caller)?;
            if user != &entry.owner {
                return Err(RecipeError::Ownership {
                    recipe_id: entry.recipe_id,
                });
            }
            if entry.state != ReanalysisState::Ready(ReviewState::Comparing) {
                return Err(invalid_state("comparing", &entry.state));
            }
            let candidate = entry
                .candidate
                .take()
                .ok_or_else(|| invalid_state("comparing", &entry.state))?;
            entry.set_state(ReanalysisState::Ready(ReviewState::Committing));
            (entry.recipe_id, candidate, entry.compared.clone())
        };
        let guard = self.guard(
            handle,
            ReanalysisState::Ready(ReviewState::Committing),
            (
                ReanalysisState::Ready(ReviewState::Comparing),
                Some(candidate.clone()),
            ),
        );

        // On error the guard restores the candidate for another attempt
        let recipe = self
            .write_decision(recipe_id, caller, decision, candidate, compared)
            .await?;
        guard.disarm();

        let review = match decision {
            Decision::Apply => ReviewState::Applied,
            Decision::Discard => ReviewState::Discarded,
        };
        if let Some(entry) = self.entries().get_mut(&handle) {
            entry.set_state(ReanalysisState::Ready(review));
            entry.candidate = None;
            entry.compared = None;
        }
        Ok(recipe)
    }

    async fn write_decision(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
        decision: Decision,
        candidate: Vec<Step>,
        compared: Option<Vec<Step>>,
    ) -> Result<Recipe, RecipeError> {
        let current = owned_recipe(self.store.as_ref(), recipe_id, caller).await?;

        match decision {
            Decision::Apply => {
                if compared.as_ref() != Some(&current.steps) {
                    warn!(
                        "Steps of recipe {} changed since the comparison; applying candidate anyway",
                        recipe_id
                    );
                }
                let updated = self.store.update_steps(recipe_id, candidate).await?;
                info!("Applied re-analyzed timings to recipe {}", recipe_id);
                Ok(updated)
            }
            Decision::Discard => {
                info!("Discarded re-analyzed timings for recipe {}", recipe_id);
                Ok(current)
            }
        }
    }
}
