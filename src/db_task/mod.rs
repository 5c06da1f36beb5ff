use anyhow::Result;
use log::error;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

mod backend;
mod frontend;

pub use frontend::DBTask;

/// Names that can never be registered or taken by rename.
pub const RESERVED_NAMES: [&str; 4] = ["host", "server", "admin", "moderator"];

/// The well-known keys of the persisted match.
#[derive(Clone, Copy, Debug)]
pub enum MatchKey {
    Player1,
    Player2,
    CurrentTurn,
}

impl MatchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKey::Player1 => "Player1",
            MatchKey::Player2 => "Player2",
            MatchKey::CurrentTurn => "CurrentTurn",
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username already exists.")]
    UsernameTaken,
    #[error("User not found.")]
    UserNotFound,
    #[error("Incorrect password.")]
    WrongPassword,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AuthError {
    fn from(err: rusqlite::Error) -> AuthError {
        AuthError::Store(err.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreRow {
    pub username: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

/// Check a proposed username against the account rules. The returned reason
/// is suitable for echoing back to the client.
pub fn validate_username(name: &str) -> Result<(), &'static str> {
    if name.len() < 3 || name.len() > 16 {
        return Err("names must be 3 to 16 characters long");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("names may only contain letters, digits and underscores");
    }
    if RESERVED_NAMES.iter().any(|r| name.eq_ignore_ascii_case(r)) {
        return Err("that name is reserved");
    }
    Ok(())
}

enum Command {
    Register {
        username: String,
        password: String,
        resp: Responder<Result<(), AuthError>>,
    },

    Login {
        username: String,
        password: String,
        resp: Responder<Result<String, AuthError>>,
    },

    Rename {
        current: String,
        new_name: String,
        resp: Responder<Result<(), AuthError>>,
    },

    IncrementWins {
        username: String,
    },

    IncrementLosses {
        username: String,
    },

    IncrementDraws {
        username: String,
    },

    GetStats {
        username: String,
        resp: Responder<Result<(u32, u32, u32)>>,
    },

    AllScores {
        resp: Responder<Result<Vec<ScoreRow>>>,
    },

    SetMatchValue {
        key: MatchKey,
        value: Option<String>,
    },

    ResetMatch,

    TestConnection {
        resp: Responder<bool>,
    },
}

type Responder<T> = oneshot::Sender<T>;

pub fn run(path: &str) -> Result<DBTask> {
    let mut db = backend::create(path)?;
    let (tx, mut rx) = mpsc::channel(100);

    // TODO: should this be spawn_blocking?
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            if !db.handle_command(cmd) {
                error!("store command failed");
            }
        }
    });

    Ok(DBTask { tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("Alice").is_ok());
        assert!(validate_username("a_1").is_ok());
        assert!(validate_username("ab").is_err(), "too short");
        assert!(validate_username("abcdefghijklmnopq").is_err(), "too long");
        assert!(validate_username("has space").is_err());
        assert!(validate_username("héllo").is_err());
        assert!(validate_username("Admin").is_err(), "reserved");
        assert!(validate_username("MODERATOR").is_err(), "reserved");
    }
}
