//! Desired-state reconciliation for named Vault objects (groups, policies).
//!
//! Every desired entry is upserted. Remote names missing from the desired
//! state are only removed after the operator answers the confirmation prompt
//! with the exact word `yes`. The pass is single-shot and not atomic: an
//! upsert failure stops the run with earlier upserts already applied.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::error::VaultError;

/// Boxed future returned by [`ReconcileTarget`] methods.
pub type TargetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, VaultError>> + Send + 'a>>;

/// A remote collection of named objects that can be reconciled.
pub trait ReconcileTarget: Send + Sync {
    type Payload: Send + Sync;

    /// Human-readable object kind used in prompts and logs (e.g. "group").
    fn kind(&self) -> &'static str;

    /// Names currently present remotely.
    fn remote_names(&self) -> TargetFuture<'_, Vec<String>>;

    /// Create or update `name` with `payload`.
    fn upsert<'a>(&'a self, name: &'a str, payload: &'a Self::Payload) -> TargetFuture<'a, ()>;

    /// Remove `name`.
    fn remove<'a>(&'a self, name: &'a str) -> TargetFuture<'a, ()>;

    /// Names that must never be proposed for deletion.
    fn protected_names(&self) -> &[&'static str] {
        &[]
    }
}

/// Source of an operator's answer to a yes/no question.
pub trait Prompt {
    /// Show `question` and return the line the operator typed, without the
    /// trailing newline.
    fn ask(&mut self, question: &str) -> std::io::Result<String>;
}

/// The literal answer that authorizes deletions.
pub const CONFIRMATION_WORD: &str = "yes";

/// Set difference between desired and remote state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    pub to_upsert: Vec<String>,
    pub to_delete: Vec<String>,
}

impl ReconcileDiff {
    /// Compute the diff. Names in `protected` are never scheduled for
    /// deletion.
    pub fn compute<P>(
        desired: &BTreeMap<String, P>,
        remote: &[String],
        protected: &[&str],
    ) -> Self {
        let remote: BTreeSet<&str> = remote.iter().map(String::as_str).collect();
        let to_delete = remote
            .into_iter()
            .filter(|name| !desired.contains_key(*name) && !protected.contains(name))
            .map(str::to_owned)
            .collect();
        Self {
            to_upsert: desired.keys().cloned().collect(),
            to_delete,
        }
    }
}

/// What a reconcile run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub upserted: Vec<String>,
    pub deleted: Vec<String>,
    /// Deletions were proposed and the operator did not confirm them.
    pub declined: Vec<String>,
}

/// Apply `desired` to `target`, asking `prompt` before any deletion.
pub async fn reconcile<T: ReconcileTarget>(
    target: &T,
    desired: &BTreeMap<String, T::Payload>,
    prompt: &mut dyn Prompt,
) -> Result<ReconcileOutcome, VaultError> {
    let kind = target.kind();
    let mut outcome = ReconcileOutcome::default();

    for (name, payload) in desired {
        info!(kind, name = %name, "upserting");
        target.upsert(name, payload).await?;
        outcome.upserted.push(name.clone());
    }

    let remote = target.remote_names().await?;
    let diff = ReconcileDiff::compute(desired, &remote, target.protected_names());
    if diff.to_delete.is_empty() {
        return Ok(outcome);
    }

    let question = format!(
        "The following {kind}s exist in Vault but not in the given state and will be deleted:\n  {}\nType '{CONFIRMATION_WORD}' to delete them: ",
        diff.to_delete.join("\n  ")
    );
    let answer = prompt
        .ask(&question)
        .map_err(|e| VaultError::InvalidInput(format!("cannot read confirmation: {e}")))?;

    if answer != CONFIRMATION_WORD {
        info!(kind, "Aborting deletion");
        outcome.declined = diff.to_delete;
        return Ok(outcome);
    }

    for name in diff.to_delete {
        info!(kind, name = %name, "deleting");
        target.remove(&name).await?;
        outcome.deleted.push(name);
    }
    Ok(outcome)
}

/// Prompt that replays canned answers.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompt {
    answers: Vec<String>,
    pub questions: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut answers: Vec<String> = answers.into_iter().map(Into::into).collect();
        answers.reverse();
        Self {
            answers,
            questions: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> std::io::Result<String> {
        self.questions.push(question.to_owned());
        Ok(self.answers.pop().unwrap_or_default())
    }
}
