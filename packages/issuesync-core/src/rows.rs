use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::{EntityKind, RowVersion};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Priority {
    None,
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::None => "NONE",
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NONE" => Ok(Priority::None),
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            other => Err(Error::InconsistentState(format!("unknown priority {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Status {
    Backlog,
    Todo,
    InProgress,
    Done,
    Canceled,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Backlog => "BACKLOG",
            Status::Todo => "TODO",
            Status::InProgress => "IN_PROGRESS",
            Status::Done => "DONE",
            Status::Canceled => "CANCELED",
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BACKLOG" => Ok(Status::Backlog),
            "TODO" => Ok(Status::Todo),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "DONE" => Ok(Status::Done),
            "CANCELED" => Ok(Status::Canceled),
            other => Err(Error::InconsistentState(format!("unknown status {other:?}"))),
        }
    }
}

/// Primary item. `version` is assigned by the store on write; the value supplied by callers is
/// ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub modified: i64,
    pub created: i64,
    pub creator: String,
    pub kanban_order: Option<String>,
    pub version: RowVersion,
}

/// Body text of an issue; shares the issue's id and is deleted with it.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Description {
    pub id: String,
    pub body: String,
    pub version: RowVersion,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    pub created: i64,
    pub body: String,
    pub creator: String,
    pub version: RowVersion,
}

/// A row of any replicated kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntityRow {
    Issue(Issue),
    Description(Description),
    Comment(Comment),
}

impl EntityRow {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRow::Issue(_) => EntityKind::Issue,
            EntityRow::Description(_) => EntityKind::Description,
            EntityRow::Comment(_) => EntityKind::Comment,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRow::Issue(r) => &r.id,
            EntityRow::Description(r) => &r.id,
            EntityRow::Comment(r) => &r.id,
        }
    }

    pub fn version(&self) -> RowVersion {
        match self {
            EntityRow::Issue(r) => r.version,
            EntityRow::Description(r) => r.version,
            EntityRow::Comment(r) => r.version,
        }
    }
}

impl From<Issue> for EntityRow {
    fn from(row: Issue) -> Self {
        EntityRow::Issue(row)
    }
}

impl From<Description> for EntityRow {
    fn from(row: Description) -> Self {
        EntityRow::Description(row)
    }
}

impl From<Comment> for EntityRow {
    fn from(row: Comment) -> Self {
        EntityRow::Comment(row)
    }
}
