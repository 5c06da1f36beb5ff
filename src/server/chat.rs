use log::{error, info};
use rand::prelude::*;
use thiserror::Error;

use crate::db_task::{self, AuthError};

use super::{GameServer, CID};

#[derive(Error, Debug, PartialEq, Eq)]
enum WhisperError {
    #[error("the target name is missing its closing quote")]
    UnterminatedQuote,
    #[error("the message is empty")]
    EmptyMessage,
    #[error("usage is !whisper <target> <message>")]
    Usage,
}

/// Split whisper arguments into target and message. The target may be a
/// bare word or a quoted display name.
fn parse_whisper(args: &str) -> Result<(&str, &str), WhisperError> {
    if let Some(rest) = args.strip_prefix('"') {
        let end = rest.find('"').ok_or(WhisperError::UnterminatedQuote)?;
        let target = &rest[..end];
        let message = rest[end + 1..].trim_start();
        if target.is_empty() {
            return Err(WhisperError::Usage);
        }
        if message.is_empty() {
            return Err(WhisperError::EmptyMessage);
        }
        Ok((target, message))
    } else {
        match args.split_once(char::is_whitespace) {
            Some((target, message)) => {
                let message = message.trim_start();
                if message.is_empty() {
                    return Err(WhisperError::EmptyMessage);
                }
                Ok((target, message))
            }
            None => Err(WhisperError::Usage),
        }
    }
}

impl GameServer {
    /// Send a line to every connected client, except perhaps one. Sends are
    /// non-blocking; clients whose outbox is full or gone come back as a
    /// quarantine list for the reaper.
    pub(super) fn broadcast(&self, line: &str, exclude: Option<CID>) -> Vec<CID> {
        let mut dead = Vec::new();

        for conn in &self.conns {
            if Some(conn.cid) == exclude {
                continue;
            }
            if !conn.send(line) {
                dead.push(conn.cid);
            }
        }

        dead
    }

    pub(super) fn handle_who(&self, who: usize, dead: &mut Vec<CID>) {
        let names: Vec<&str> = self.conns.iter().map(|c| c.username.as_str()).collect();
        let line = format!("[Server]: Connected users: {}", names.join(", "));
        self.reply(who, &line, dead);
    }

    pub(super) fn handle_commands(&self, who: usize, dead: &mut Vec<CID>) {
        const HELP: [&str; 11] = [
            "[Server]: Available commands:",
            "  !user <name>          change your username",
            "  !who                  list connected users",
            "  !whisper <who> <msg>  private message (quote names with spaces)",
            "  !roll [max]           roll a die, default 1-6",
            "  !join                 take a seat in the Tic-Tac-Toe match",
            "  !startgame            start the match (player 1, in game)",
            "  !move <0-8>           place your mark (in game)",
            "  !scores               show the leaderboard",
            "  !about                about this server",
            "  !exit                 disconnect",
        ];
        for line in HELP {
            self.reply(who, line, dead);
        }
    }

    pub(super) fn handle_about(&self, who: usize, dead: &mut Vec<CID>) {
        let line = format!(
            "[Server]: chatsrv {} - a chat room with a built-in game of Tic-Tac-Toe.",
            env!("CARGO_PKG_VERSION")
        );
        self.reply(who, &line, dead);
    }

    pub(super) fn handle_whisper(&self, who: usize, args: &str, dead: &mut Vec<CID>) {
        let (target, message) = match parse_whisper(args) {
            Ok(t) => t,
            Err(e) => {
                self.reply(who, &format!("[Server]: Can't whisper: {e}."), dead);
                return;
            }
        };

        let target_index = self
            .conns
            .iter()
            .position(|c| c.username.eq_ignore_ascii_case(target));

        match target_index {
            Some(t) => {
                let sender = &self.conns[who].username;
                let target_name = &self.conns[t].username;
                if !self.conns[t].send(&format!("[Whisper from {sender}]: {message}")) {
                    dead.push(self.conns[t].cid);
                }
                self.reply(
                    who,
                    &format!("[You whispered to {target_name}]: {message}"),
                    dead,
                );
            }
            None => {
                self.reply(
                    who,
                    &format!("[Server]: No user named '{target}' is connected."),
                    dead,
                );
            }
        }
    }

    pub(super) fn handle_roll(&self, who: usize, args: &str, dead: &mut Vec<CID>) {
        let max = if args.trim().is_empty() {
            6
        } else {
            match args.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    self.reply(
                        who,
                        "[Server]: The roll maximum must be a whole number of at least 1.",
                        dead,
                    );
                    return;
                }
            }
        };

        let rolled = thread_rng().gen_range(1..=max);
        let name = &self.conns[who].username;
        dead.extend(self.broadcast(&format!("[Roll] {name} rolled a {rolled} (1 – {max})"), None));
    }

    pub(super) async fn handle_rename(&mut self, who: usize, args: &str, dead: &mut Vec<CID>) {
        let new_name = args.trim();
        if new_name.is_empty() {
            self.reply(who, "[Server]: Usage: !user <new name>", dead);
            return;
        }
        if let Err(reason) = db_task::validate_username(new_name) {
            self.reply(who, &format!("[Server]: Invalid username: {reason}."), dead);
            return;
        }

        // the live set may hold names the store does not know yet, so check
        // both; everyone but ourselves counts as a clash
        let clash = self
            .conns
            .iter()
            .enumerate()
            .any(|(i, c)| i != who && c.username.eq_ignore_ascii_case(new_name));
        if clash {
            self.reply(who, "[Server]: Username already exists.", dead);
            return;
        }

        let old = self.conns[who].username.clone();
        match self.db.try_rename(old.clone(), new_name.to_string()).await {
            Ok(()) => {
                self.conns[who].username = new_name.to_string();
                info!("{old} renamed to {new_name}");
                dead.extend(self.broadcast(&format!("[{old}] is now known as [{new_name}]"), None));
            }
            Err(AuthError::Store(e)) => {
                error!("store failure renaming {old}: {e:?}");
                self.reply(
                    who,
                    "[Server]: The server could not access the database.",
                    dead,
                );
            }
            Err(e) => self.reply(who, &format!("[Server]: {e}"), dead),
        }
    }

    pub(super) async fn handle_scores(&self, who: usize, dead: &mut Vec<CID>) {
        match self.db.all_scores().await {
            Ok(scores) if scores.is_empty() => {
                self.reply(who, "[Server]: No scores recorded yet.", dead);
            }
            Ok(scores) => {
                for row in scores {
                    let line = format!(
                        "[Scores] {}: {}W {}L {}D",
                        row.username, row.wins, row.losses, row.draws
                    );
                    self.reply(who, &line, dead);
                }
            }
            Err(e) => {
                error!("failed to read the leaderboard: {e:?}");
                self.reply(
                    who,
                    "[Server]: The server could not access the database.",
                    dead,
                );
            }
        }
    }

    pub(super) fn handle_kick(&mut self, who: usize, args: &str, dead: &mut Vec<CID>) {
        if !self.conns[who].is_moderator {
            self.reply(who, "[Server]: You are not a moderator.", dead);
            return;
        }

        let target = args.trim();
        if target.is_empty() {
            self.reply(who, "[Server]: Usage: !kick <name>", dead);
            return;
        }

        let target_index = self
            .conns
            .iter()
            .position(|c| c.username.eq_ignore_ascii_case(target));
        let t = match target_index {
            Some(t) => t,
            None => {
                self.reply(
                    who,
                    &format!("[Server]: No user named '{target}' is connected."),
                    dead,
                );
                return;
            }
        };

        if t == who {
            self.reply(who, "[Server]: You can't kick yourself.", dead);
            return;
        }
        if self.conns[t].is_moderator {
            self.reply(who, "[Server]: You can't kick another moderator.", dead);
            return;
        }

        let kicker = self.conns[who].username.clone();
        let target_name = self.conns[t].username.clone();
        let target_cid = self.conns[t].cid;

        info!("{kicker} kicked {target_name}");
        self.conns[t].send(&format!("You were kicked by {kicker}."));
        dead.push(target_cid);
        dead.extend(self.broadcast(
            &format!("[Server]: {target_name} was kicked by {kicker}."),
            Some(target_cid),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_whisper, WhisperError};

    #[test]
    fn whisper_bare_target() {
        assert_eq!(parse_whisper("bob hi there"), Ok(("bob", "hi there")));
    }

    #[test]
    fn whisper_quoted_target() {
        assert_eq!(
            parse_whisper("\"Long Name\" hello"),
            Ok(("Long Name", "hello"))
        );
    }

    #[test]
    fn whisper_rejects_bad_forms() {
        assert_eq!(
            parse_whisper("\"Long Name hello"),
            Err(WhisperError::UnterminatedQuote)
        );
        assert_eq!(parse_whisper("\"Long Name\"  "), Err(WhisperError::EmptyMessage));
        assert_eq!(parse_whisper("bob   "), Err(WhisperError::EmptyMessage));
        assert_eq!(parse_whisper("bob"), Err(WhisperError::Usage));
        assert_eq!(parse_whisper(""), Err(WhisperError::Usage));
    }
}
