use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique task identifier.
pub type TaskId = Uuid;

/// Unique repository identifier.
pub type RepoId = Uuid;

/// Queue priority of a task. Lower value = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Explicitly requested by an operator.
    Manual = 0,
    /// Created through the API by a user.
    UserCreated = 1,
    /// Discovered automatically by a repository listener.
    Listener = 2,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Manual => write!(f, "manual"),
            TaskPriority::UserCreated => write!(f, "user_created"),
            TaskPriority::Listener => write!(f, "listener"),
        }
    }
}

/// What a task benchmarks: a commit of a known repository, or an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSource {
    Commit {
        repo_id: RepoId,
        commit_hash: String,
    },
    Tar {
        description: String,
        /// Repository the upload should be attributed to, if any.
        #[serde(default)]
        repo_id: Option<RepoId>,
    },
}

impl TaskSource {
    pub fn commit(repo_id: RepoId, commit_hash: impl Into<String>) -> Self {
        TaskSource::Commit {
            repo_id,
            commit_hash: commit_hash.into(),
        }
    }

    pub fn repo_id(&self) -> Option<RepoId> {
        match self {
            TaskSource::Commit { repo_id, .. } => Some(*repo_id),
            TaskSource::Tar { repo_id, .. } => *repo_id,
        }
    }

    /// The `(repository, commit)` deduplication key. Tar uploads have none.
    pub fn commit_key(&self) -> Option<(RepoId, &str)> {
        match self {
            TaskSource::Commit {
                repo_id,
                commit_hash,
            } => Some((*repo_id, commit_hash.as_str())),
            TaskSource::Tar { .. } => None,
        }
    }
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskSource::Commit {
                repo_id,
                commit_hash,
            } => write!(f, "{repo_id}@{commit_hash}"),
            TaskSource::Tar { description, .. } => write!(f, "tar '{description}'"),
        }
    }
}

/// One unit of requested benchmark work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub author: String,
    pub priority: TaskPriority,
    pub inserted_at: DateTime<Utc>,
    pub source: TaskSource,
    /// Set while the task is assigned to a runner.
    #[serde(default)]
    pub in_process: bool,
    /// Order within the priority band, lower first. Assigned by the queue.
    #[serde(default)]
    pub queue_position: i64,
}

impl Task {
    pub fn new(source: TaskSource, priority: TaskPriority, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: author.into(),
            priority,
            inserted_at: Utc::now(),
            source,
            in_process: false,
            queue_position: 0,
        }
    }
}

/// Check that a string looks like an abbreviated or full git commit hash.
pub fn is_valid_commit_hash(hash: &str) -> bool {
    (7..=40).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(TaskPriority::Manual < TaskPriority::UserCreated);
        assert!(TaskPriority::UserCreated < TaskPriority::Listener);
    }

    #[test]
    fn commit_key_only_for_commits() {
        let repo = Uuid::new_v4();
        let commit = TaskSource::commit(repo, "abc1234");
        assert_eq!(commit.commit_key(), Some((repo, "abc1234")));

        let tar = TaskSource::Tar {
            description: "upload".into(),
            repo_id: Some(repo),
        };
        assert_eq!(tar.commit_key(), None);
        assert_eq!(tar.repo_id(), Some(repo));
    }

    #[test]
    fn source_serializes_with_kind_tag() {
        let tar = TaskSource::Tar {
            description: "local build".into(),
            repo_id: None,
        };
        let json = serde_json::to_value(&tar).unwrap();
        assert_eq!(json["kind"], "tar");
        assert_eq!(json["description"], "local build");
    }

    #[test]
    fn commit_hash_validation() {
        assert!(is_valid_commit_hash("abc1234"));
        assert!(is_valid_commit_hash(&"f".repeat(40)));
        assert!(!is_valid_commit_hash("abc"));
        assert!(!is_valid_commit_hash("not-a-hash"));
        assert!(!is_valid_commit_hash(&"a".repeat(41)));
    }

    #[test]
    fn new_task_is_not_in_process() {
        let task = Task::new(
            TaskSource::commit(Uuid::new_v4(), "deadbeef"),
            TaskPriority::Listener,
            "listener",
        );
        assert!(!task.in_process);
        assert_eq!(task.author, "listener");
    }
}
