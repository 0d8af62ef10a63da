use postgres::error::SqlState;

use issuesync_core::Error;

/// Maps a driver error onto the core taxonomy.
///
/// Serialization failures, deadlocks and unique violations mean a concurrent transaction won;
/// the caller may re-run the whole transaction. A foreign key violation is a write that
/// references a missing issue.
pub(crate) fn storage_err(e: postgres::Error) -> Error {
    let Some(code) = e.code() else {
        return Error::Storage(format!("{e:?}"));
    };
    if *code == SqlState::T_R_SERIALIZATION_FAILURE
        || *code == SqlState::T_R_DEADLOCK_DETECTED
        || *code == SqlState::UNIQUE_VIOLATION
    {
        Error::Conflict(db_message(&e))
    } else if *code == SqlState::FOREIGN_KEY_VIOLATION {
        Error::InvalidOperation(db_message(&e))
    } else {
        Error::Storage(format!("{e:?}"))
    }
}

fn db_message(e: &postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_without_sqlstate_are_storage_errors() {
        // A closed connection surfaces as an error with no SQLSTATE.
        let err = postgres::Client::connect("host=/nonexistent-socket-dir user=none", postgres::NoTls)
            .err()
            .map(storage_err);
        assert!(matches!(err, Some(Error::Storage(_))));
    }
}
