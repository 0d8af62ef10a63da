use issuesync_core::{Comment, Description, Issue, Priority, Status};

pub fn issue_id(n: usize) -> String {
    format!("iss-{n:04}")
}

pub fn comment_id(n: usize) -> String {
    format!("com-{n:04}")
}

/// Issue `n`. Versions are assigned by the store, so the fixture's version is irrelevant.
pub fn make_issue(n: usize) -> Issue {
    Issue {
        id: issue_id(n),
        title: format!("Issue {n}"),
        priority: Some(Priority::Medium),
        status: Some(Status::Todo),
        modified: n as i64,
        created: n as i64,
        creator: "user-1".into(),
        kanban_order: Some(format!("a{n}")),
        version: 0,
    }
}

pub fn make_description(issue: usize) -> Description {
    Description {
        id: issue_id(issue),
        body: format!("Description of issue {issue}"),
        version: 0,
    }
}

pub fn make_comment(n: usize, issue: usize) -> Comment {
    Comment {
        id: comment_id(n),
        issue_id: issue_id(issue),
        created: n as i64,
        body: format!("Comment {n}"),
        creator: "user-1".into(),
        version: 0,
    }
}

/// `issue` with a new title, as an edit from the UI would produce.
pub fn retitled(mut issue: Issue, title: &str) -> Issue {
    issue.title = title.to_string();
    issue.modified += 1;
    issue
}
