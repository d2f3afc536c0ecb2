//! Domain values exchanged between the tracker API, the local cache and the UI.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Cancelled,
}

impl IssueStatus {
    /// Wire name used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Backlog => "backlog",
            IssueStatus::Todo => "todo",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Review => "review",
            IssueStatus::Done => "done",
            IssueStatus::Cancelled => "cancelled",
        }
    }

    /// True for statuses that close an issue.
    pub fn is_closed(&self) -> bool {
        matches!(self, IssueStatus::Done | IssueStatus::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Low => "low",
            IssuePriority::Normal => "normal",
            IssuePriority::High => "high",
            IssuePriority::Urgent => "urgent",
        }
    }
}

/// A user of the tracker (assignee, author).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub display_name: String,
}

/// Row-level view of an issue, as shown in lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub id: String,
    /// Human readable key such as `CORE-42`
    pub key: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: IssueStatus,
    #[serde(default)]
    pub priority: IssuePriority,
    #[serde(default)]
    pub assignee: Option<Person>,
    pub updated_at: DateTime<Utc>,
}

/// Full issue as shown in the detail pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetail {
    pub summary: IssueSummary,
    #[serde(default)]
    pub reporter: Option<Person>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    pub author: Person,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A board belonging to a project. Column projection happens in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

/// Payload of the new-issue form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub project_id: String,
    #[serde(default)]
    pub module: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee: Option<Person>,
    #[serde(default)]
    pub priority: IssuePriority,
}

/// How a patch treats the assignee field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "op", content = "person", rename_all = "lowercase")]
pub enum AssigneeChange {
    #[default]
    Unchanged,
    Set(Person),
    Clear,
}

/// Sparse set of field changes applied to a known summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<IssuePriority>,
    #[serde(default)]
    pub assignee: AssigneeChange,
}

impl IssuePatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assignee == AssigneeChange::Unchanged
    }

    /// Apply the patch to `summary`, returning the locally updated copy.
    ///
    /// `updated_at` is left untouched: it belongs to the server and is what
    /// the transport uses as its precondition.
    pub fn apply_to(&self, summary: &IssueSummary) -> IssueSummary {
        let mut updated = summary.clone();
        if let Some(title) = &self.title {
            updated.title = title.clone();
        }
        if let Some(description) = &self.description {
            updated.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        match &self.assignee {
            AssigneeChange::Unchanged => {}
            AssigneeChange::Set(person) => updated.assignee = Some(person.clone()),
            AssigneeChange::Clear => updated.assignee = None,
        }
        updated
    }

    /// Human readable list of the changes, one per line.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(format!("Title: {}", title));
        }
        if let Some(description) = &self.description {
            lines.push(format!("Description: {}", description));
        }
        if let Some(status) = self.status {
            lines.push(format!("Status: {}", status.as_str()));
        }
        if let Some(priority) = self.priority {
            lines.push(format!("Priority: {}", priority.as_str()));
        }
        match &self.assignee {
            AssigneeChange::Unchanged => {}
            AssigneeChange::Set(person) => lines.push(format!("Assignee: {}", person.display_name)),
            AssigneeChange::Clear => lines.push("Assignee: (none)".to_string()),
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Priority,
    Status,
    Key,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::UpdatedAt => "updated_at",
            SortField::CreatedAt => "created_at",
            SortField::Priority => "priority",
            SortField::Status => "status",
            SortField::Key => "key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct IssueSort {
    pub field: SortField,
    pub direction: SortDirection,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub size: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssigneeFilter {
    Unassigned,
    Person(String),
}

/// Structured filters. Sets keep equality independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IssueFilters {
    pub project_ids: BTreeSet<String>,
    pub statuses: BTreeSet<IssueStatus>,
    pub priorities: BTreeSet<IssuePriority>,
    pub assignee: Option<AssigneeFilter>,
    pub labels: BTreeSet<String>,
}

/// Issue list request. Also the cache key for issue lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IssueQuery {
    search: Option<String>,
    pub filters: IssueFilters,
    pub sort: IssueSort,
    pub page: Page,
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw search text. Surrounding whitespace is ignored and a
    /// blank search means "no search".
    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        let trimmed = search.as_ref().trim();
        self.search = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.filters.project_ids.insert(project_id.into());
        self
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.filters.statuses.insert(status);
        self
    }

    pub fn with_priority(mut self, priority: IssuePriority) -> Self {
        self.filters.priorities.insert(priority);
        self
    }

    pub fn with_assignee(mut self, assignee: AssigneeFilter) -> Self {
        self.filters.assignee = Some(assignee);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.filters.labels.insert(label.into());
        self
    }

    pub fn with_sort(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort = IssueSort { field, direction };
        self
    }

    pub fn with_page(mut self, size: u32, offset: u32) -> Self {
        self.page = Page { size, offset };
        self
    }

    /// Canonical string form used as the cache key.
    pub fn cache_key(&self) -> String {
        // Field order is fixed by the struct and every collection is ordered,
        // so the encoding is stable for structurally equal queries.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
