use crate::error::{Error, Result};
use crate::ids::{EntityKind, MutationId};
use crate::rows::{Comment, Description, Issue};
use crate::traits::RowWriter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A pushed client mutation. Each variant is applied atomically.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "name", content = "args", rename_all = "camelCase")
)]
pub enum Mutation {
    PutIssue {
        issue: Issue,
        description: Option<Description>,
    },
    /// Bulk edit, e.g. a drag across Kanban columns touching several issues.
    UpdateIssues { issues: Vec<Issue> },
    PutDescription(Description),
    PutIssueComment(Comment),
    DeleteIssueComment { id: String },
    DeleteIssues { ids: Vec<String> },
}

/// Applies one mutation and the client bookkeeping that goes with it.
///
/// Returns `false` for a mutation the client already pushed (retries are idempotent). A mutation
/// id that skips ahead, or a client registered with another group, is rejected.
pub fn apply_mutation<W: RowWriter + ?Sized>(
    writer: &mut W,
    client_group_id: &str,
    client_id: &str,
    mutation_id: MutationId,
    mutation: &Mutation,
) -> Result<bool> {
    let last = match writer.client(client_id)? {
        Some(client) if client.client_group_id != client_group_id => {
            return Err(Error::InvalidOperation(format!(
                "client {client_id} belongs to group {}, not {client_group_id}",
                client.client_group_id
            )));
        }
        Some(client) => client.last_mutation_id,
        None => 0,
    };

    if mutation_id <= last {
        tracing::debug!(client_id, mutation_id, last, "mutation already processed");
        return Ok(false);
    }
    if mutation_id > last + 1 {
        return Err(Error::InvalidOperation(format!(
            "mutation {mutation_id} from client {client_id} is ahead of expected {}",
            last + 1
        )));
    }

    match mutation {
        Mutation::PutIssue { issue, description } => {
            writer.put_issue(issue)?;
            if let Some(description) = description {
                check_owner(&issue.id, &description.id)?;
                writer.put_description(description)?;
            }
        }
        Mutation::UpdateIssues { issues } => {
            for issue in issues {
                writer.put_issue(issue)?;
            }
        }
        Mutation::PutDescription(description) => {
            writer.put_description(description)?;
        }
        Mutation::PutIssueComment(comment) => {
            writer.put_comment(comment)?;
        }
        Mutation::DeleteIssueComment { id } => {
            writer.delete_entity(EntityKind::Comment, id)?;
        }
        Mutation::DeleteIssues { ids } => {
            for id in ids {
                writer.delete_entity(EntityKind::Issue, id)?;
            }
        }
    }

    let client_version = writer.advance_client(client_group_id, client_id, mutation_id)?;
    tracing::debug!(client_group_id, client_id, mutation_id, client_version, "mutation applied");
    Ok(true)
}

fn check_owner(issue_id: &str, description_id: &str) -> Result<()> {
    if issue_id != description_id {
        return Err(Error::InvalidOperation(format!(
            "description {description_id} does not belong to issue {issue_id}"
        )));
    }
    Ok(())
}
