use serde::{Deserialize, Serialize};

/// File-level change buckets plus the count of changed diff lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub total_lines: usize,
}

/// Everything scraped from a pull-request page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrContext {
    pub title: String,
    pub branch: String,
    pub commits: Vec<String>,
    pub files: Vec<String>,
    pub diff: String,
    pub changes: Changes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    /// Classify the text of a status badge. Checks run in added, modified,
    /// deleted order, so a badge reading "new - removed" counts as added.
    pub fn classify(text: &str) -> Option<Self> {
        let status = text.trim().to_lowercase();
        if status.contains("added") || status.contains('+') || status.contains("new") {
            Some(FileStatus::Added)
        } else if status.contains("modified") || status.contains('~') || status.contains("changed")
        {
            Some(FileStatus::Modified)
        } else if status.contains("deleted") || status.contains('-') || status.contains("removed")
        {
            Some(FileStatus::Deleted)
        } else {
            None
        }
    }
}

/// The subset of the context that is sent to the model.
#[derive(Serialize)]
struct PromptContext<'a> {
    title: &'a str,
    branch: &'a str,
    commits: &'a [String],
    files: &'a [String],
    changes: &'a Changes,
}

impl PrContext {
    pub fn push_commit(&mut self, text: &str) -> bool {
        push_unique(&mut self.commits, text)
    }

    pub fn push_file(&mut self, name: &str) -> bool {
        push_unique(&mut self.files, name)
    }

    pub fn record_status(&mut self, file: &str, status: FileStatus) {
        let bucket = match status {
            FileStatus::Added => &mut self.changes.added,
            FileStatus::Modified => &mut self.changes.modified,
            FileStatus::Deleted => &mut self.changes.deleted,
        };
        push_unique(bucket, file);
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.branch.is_empty()
            && self.commits.is_empty()
            && self.files.is_empty()
            && self.changes.total_lines == 0
    }

    /// Pretty JSON of the fields handed to the model (the raw diff is omitted).
    pub fn prompt_json(&self) -> String {
        let view = PromptContext {
            title: &self.title,
            branch: &self.branch,
            commits: &self.commits,
            files: &self.files,
            changes: &self.changes,
        };
        serde_json::to_string_pretty(&view).unwrap_or_else(|_| "{}".to_string())
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}
