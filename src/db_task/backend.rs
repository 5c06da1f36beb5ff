use anyhow::Result;
use log::error;
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use super::{AuthError, Command, MatchKey, ScoreRow};

pub(super) struct DB {
    conn: Connection,
}

impl DB {
    fn try_register(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM users WHERE username = ?1")?;
        let existing: Option<i64> = stmt.query_row([username], |row| row.get(0)).optional()?;
        if existing.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let mut stmt = self
            .conn
            .prepare("INSERT INTO users (username, password) VALUES (?1, ?2)")?;
        stmt.execute(params![username, password])?;
        Ok(())
    }

    fn try_login(&mut self, username: &str, password: &str) -> Result<String, AuthError> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, password FROM users WHERE username = ?1")?;
        let row: Option<(String, String)> = stmt
            .query_row([username], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let (display, stored) = row.ok_or(AuthError::UserNotFound)?;

        // TODO: use actual hashing here
        if stored != password {
            return Err(AuthError::WrongPassword);
        }

        Ok(display)
    }

    fn try_rename(&mut self, current: &str, new_name: &str) -> Result<(), AuthError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM users WHERE username = ?1")?;
        let me: Option<i64> = stmt.query_row([current], |row| row.get(0)).optional()?;
        let me = me.ok_or(AuthError::UserNotFound)?;

        // is the new name already in use?
        let taken: Option<i64> = stmt.query_row([new_name], |row| row.get(0)).optional()?;
        if let Some(taken) = taken {
            // renaming yourself to your own name (maybe recased) is fine
            if taken != me {
                return Err(AuthError::UsernameTaken);
            }
        }

        let mut stmt = self
            .conn
            .prepare("UPDATE users SET username = ?1 WHERE id = ?2")?;
        stmt.execute(params![new_name, me])?;
        Ok(())
    }

    fn increment(&mut self, column: &'static str, username: &str) -> Result<()> {
        let sql = format!("UPDATE users SET {column} = {column} + 1 WHERE username = ?1");
        self.conn.execute(&sql, [username])?;
        Ok(())
    }

    fn get_stats(&mut self, username: &str) -> Result<(u32, u32, u32)> {
        let mut stmt = self
            .conn
            .prepare("SELECT wins, losses, draws FROM users WHERE username = ?1")?;
        let stats = stmt.query_row([username], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        Ok(stats)
    }

    fn all_scores(&mut self) -> Result<Vec<ScoreRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, wins, losses, draws FROM users
             ORDER BY wins DESC, draws DESC, id ASC",
        )?;
        let mut scores = Vec::new();
        for row in stmt.query_map([], |row| {
            Ok(ScoreRow {
                username: row.get(0)?,
                wins: row.get(1)?,
                losses: row.get(2)?,
                draws: row.get(3)?,
            })
        })? {
            scores.push(row?);
        }
        Ok(scores)
    }

    fn set_match_value(&mut self, key: MatchKey, value: Option<&str>) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO match_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )?;
        stmt.execute(params![key.as_str(), value])?;
        Ok(())
    }

    fn reset_match(&mut self) -> Result<()> {
        for key in [MatchKey::Player1, MatchKey::Player2, MatchKey::CurrentTurn] {
            self.set_match_value(key, None)?;
        }
        Ok(())
    }

    fn test_connection(&mut self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    pub(super) fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Register {
                username,
                password,
                resp,
            } => resp.send(self.try_register(&username, &password)).is_ok(),
            Command::Login {
                username,
                password,
                resp,
            } => resp.send(self.try_login(&username, &password)).is_ok(),
            Command::Rename {
                current,
                new_name,
                resp,
            } => resp.send(self.try_rename(&current, &new_name)).is_ok(),
            Command::IncrementWins { username } => self.log_increment("wins", &username),
            Command::IncrementLosses { username } => self.log_increment("losses", &username),
            Command::IncrementDraws { username } => self.log_increment("draws", &username),
            Command::GetStats { username, resp } => resp.send(self.get_stats(&username)).is_ok(),
            Command::AllScores { resp } => resp.send(self.all_scores()).is_ok(),
            Command::SetMatchValue { key, value } => {
                match self.set_match_value(key, value.as_deref()) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("failed to persist match key {key:?}: {e:?}");
                        false
                    }
                }
            }
            Command::ResetMatch => match self.reset_match() {
                Ok(()) => true,
                Err(e) => {
                    error!("failed to reset the persisted match: {e:?}");
                    false
                }
            },
            Command::TestConnection { resp } => resp.send(self.test_connection()).is_ok(),
        }
    }

    fn log_increment(&mut self, column: &'static str, username: &str) -> bool {
        match self.increment(column, username) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to bump {column} for {username}: {e:?}");
                false
            }
        }
    }
}

pub(super) fn create(path: &str) -> Result<DB> {
    let migrations = Migrations::new(vec![
        M::up(
            "CREATE TABLE users(
				id INTEGER PRIMARY KEY NOT NULL,
				username TEXT NOT NULL COLLATE NOCASE UNIQUE,
				password TEXT NOT NULL,
				wins INTEGER NOT NULL DEFAULT 0,
				losses INTEGER NOT NULL DEFAULT 0,
				draws INTEGER NOT NULL DEFAULT 0
			);",
        ),
        M::up(
            "CREATE TABLE match_state(
				key TEXT PRIMARY KEY NOT NULL,
				value TEXT
			);",
        ),
    ]);

    let mut conn = Connection::open(path)?;

    migrations.to_latest(&mut conn)?;

    let db = DB { conn };
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> DB {
        create(":memory:").unwrap()
    }

    #[test]
    fn register_preserves_display_casing() {
        let mut db = fresh();
        db.try_register("Alice", "pw1").unwrap();
        assert_eq!(db.try_login("alice", "pw1").unwrap(), "Alice");
        assert_eq!(db.try_login("ALICE", "pw1").unwrap(), "Alice");
    }

    #[test]
    fn duplicate_registration_is_case_insensitive() {
        let mut db = fresh();
        db.try_register("Alice", "pw1").unwrap();
        assert!(matches!(
            db.try_register("alice", "pw3"),
            Err(AuthError::UsernameTaken)
        ));
    }

    #[test]
    fn login_failures() {
        let mut db = fresh();
        db.try_register("Alice", "pw1").unwrap();
        assert!(matches!(
            db.try_login("nobody", "pw"),
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            db.try_login("Alice", "wrong"),
            Err(AuthError::WrongPassword)
        ));
    }

    #[test]
    fn rename_rules() {
        let mut db = fresh();
        db.try_register("Alice", "pw1").unwrap();
        db.try_register("bob", "pw2").unwrap();

        assert!(matches!(
            db.try_rename("bob", "ALICE"),
            Err(AuthError::UsernameTaken)
        ));
        assert!(matches!(
            db.try_rename("nobody", "carol"),
            Err(AuthError::UserNotFound)
        ));

        // recasing your own name is allowed
        db.try_rename("Alice", "ALICE").unwrap();
        assert_eq!(db.try_login("alice", "pw1").unwrap(), "ALICE");

        db.try_rename("bob", "Bobby").unwrap();
        assert_eq!(db.try_login("bobby", "pw2").unwrap(), "Bobby");
    }

    #[test]
    fn stats_and_leaderboard_ordering() {
        let mut db = fresh();
        db.try_register("Alice", "pw").unwrap();
        db.try_register("bob", "pw").unwrap();
        db.try_register("carol", "pw").unwrap();

        db.increment("wins", "bob").unwrap();
        db.increment("losses", "Alice").unwrap();
        db.increment("draws", "Alice").unwrap();
        db.increment("draws", "carol").unwrap();

        assert_eq!(db.get_stats("Alice").unwrap(), (0, 1, 1));
        assert_eq!(db.get_stats("bob").unwrap(), (1, 0, 0));

        let scores = db.all_scores().unwrap();
        let names: Vec<&str> = scores.iter().map(|s| s.username.as_str()).collect();
        // bob leads on wins; Alice and carol tie on wins and draws, so
        // insertion order breaks the tie
        assert_eq!(names, ["bob", "Alice", "carol"]);
    }

    #[test]
    fn match_values_upsert() {
        let mut db = fresh();
        db.set_match_value(MatchKey::Player1, Some("Alice")).unwrap();
        db.set_match_value(MatchKey::Player1, Some("bob")).unwrap();

        let value: Option<String> = db
            .conn
            .query_row(
                "SELECT value FROM match_state WHERE key = 'Player1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value.as_deref(), Some("bob"));

        db.reset_match().unwrap();
        for key in ["Player1", "Player2", "CurrentTurn"] {
            let value: Option<String> = db
                .conn
                .query_row(
                    "SELECT value FROM match_state WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(value, None, "{key}");
        }
    }

    #[test]
    fn test_connection_reports_ok() {
        let mut db = fresh();
        assert!(db.test_connection());
    }
}
