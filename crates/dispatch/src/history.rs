//! Linear run history per repository, used to find comparison baselines.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use velo_core::{RepoId, Run};

pub trait RunHistory: Send + Sync {
    fn record(&self, run: Run);

    /// The run that came before `run` in its repository's history.
    ///
    /// Runs without a repository have no predecessor.
    fn previous_run(&self, run: &Run) -> Option<Run>;
}

/// Keeps runs per repository in completion order.
#[derive(Default)]
pub struct MemoryRunHistory {
    runs: RwLock<HashMap<RepoId, Vec<Run>>>,
}

impl MemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunHistory for MemoryRunHistory {
    fn record(&self, run: Run) {
        let Some(repo) = run.source.repo_id() else {
            return;
        };
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(repo)
            .or_default()
            .push(run);
    }

    fn previous_run(&self, run: &Run) -> Option<Run> {
        let repo = run.source.repo_id()?;
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let history = runs.get(&repo)?;
        match history.iter().position(|r| r.id == run.id) {
            Some(0) => None,
            Some(index) => history.get(index - 1).cloned(),
            // Not recorded yet: the latest run is its predecessor.
            None => history.last().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use velo_core::{RunError, RunResult, TaskSource};

    fn run(source: TaskSource) -> Run {
        Run {
            id: Uuid::new_v4(),
            author: "ci".into(),
            runner_name: "r".into(),
            runner_info: String::new(),
            start_time: Utc::now(),
            stop_time: Utc::now(),
            source,
            result: RunResult::Failed(RunError::new("x")),
        }
    }

    #[test]
    fn previous_run_follows_completion_order() {
        let history = MemoryRunHistory::new();
        let repo = Uuid::new_v4();
        let first = run(TaskSource::commit(repo, "aaaaaaa"));
        let second = run(TaskSource::commit(repo, "bbbbbbb"));
        let other_repo = run(TaskSource::commit(Uuid::new_v4(), "ccccccc"));

        history.record(first.clone());
        history.record(other_repo.clone());
        history.record(second.clone());

        assert_eq!(history.previous_run(&first), None);
        assert_eq!(history.previous_run(&second).map(|r| r.id), Some(first.id));
        assert_eq!(history.previous_run(&other_repo), None);

        let unrecorded = run(TaskSource::commit(repo, "ddddddd"));
        assert_eq!(history.previous_run(&unrecorded).map(|r| r.id), Some(second.id));
    }

    #[test]
    fn tar_runs_without_repo_are_not_tracked() {
        let history = MemoryRunHistory::new();
        let tar = run(TaskSource::Tar {
            description: "upload".into(),
            repo_id: None,
        });
        history.record(tar.clone());
        assert!(history.is_empty());
        assert_eq!(history.previous_run(&tar), None);
    }
}
