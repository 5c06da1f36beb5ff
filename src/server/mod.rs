use std::collections::BTreeMap;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::board::Board;
use crate::db_task::{self, AuthError, DBTask};

mod chat;
mod conn_task;
pub mod console;
mod game;

pub use self::conn_task::{ConnReceiver, ConnSender};

pub type CID = u32;

/// Everything the server actor can be asked to do. Connection tasks send
/// `Auth`/`Line`/`Logout`; the host console sends `Host`.
pub enum Message {
    Auth {
        request: AuthRequest,
        resp: oneshot::Sender<AuthOutcome>,
    },
    Line {
        cid: CID,
        line: String,
    },
    Logout(CID),
    Host(HostCommand),
    Shutdown,
}

pub enum AuthRequest {
    Login { username: String, password: String },
    Register { username: String, password: String },
}

pub enum AuthOutcome {
    Success { cid: CID, line_rx: ConnReceiver },
    Fail(String),
}

/// Privileged commands typed at the host terminal, never sent on the wire.
pub enum HostCommand {
    Mod {
        name: String,
        resp: oneshot::Sender<String>,
    },
    Mods {
        resp: oneshot::Sender<Vec<String>>,
    },
    Kick {
        name: String,
        resp: oneshot::Sender<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SessionState {
    Chatting,
    Playing,
}

/// A connected, authenticated user.
struct Client {
    cid: CID,
    username: String,
    state: SessionState,
    slot: u8,
    is_moderator: bool,
    line_tx: ConnSender,
}

impl Client {
    /// Queue a line for this client without blocking the actor. Returns
    /// false when the outbox is full or gone, which marks the client for
    /// the reaper.
    fn send(&self, line: &str) -> bool {
        self.line_tx.try_send(line.to_string()).is_ok()
    }
}

/// The single server-wide match.
struct Match {
    player1: Option<String>,
    player2: Option<String>,
    current_turn: Option<String>,
    board: Board,
}

impl Match {
    fn new() -> Match {
        Match {
            player1: None,
            player2: None,
            current_turn: None,
            board: Board::new(),
        }
    }
}

struct GameServer {
    next_cid: CID,
    conns: Vec<Client>,
    conn_lookup: BTreeMap<CID, usize>,
    game: Match,
    db: DBTask,
}

/// Split a command line into its case-folded verb and the untouched
/// argument remainder.
pub(crate) fn split_command(line: &str) -> (String, &str) {
    match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb.to_ascii_lowercase(), rest.trim_start()),
        None => (line.to_ascii_lowercase(), ""),
    }
}

impl GameServer {
    fn generate_cid(&mut self) -> CID {
        loop {
            let cid = self.next_cid;
            self.next_cid = self.next_cid.wrapping_add(1).max(1);

            if !self.conn_lookup.contains_key(&cid) {
                return cid;
            }
        }
    }

    fn index_of(&self, username: &str) -> Option<usize> {
        self.conns.iter().position(|c| c.username == username)
    }

    /// Send a private line to one client, quarantining it on failure.
    fn reply(&self, who: usize, line: &str, dead: &mut Vec<CID>) {
        let conn = &self.conns[who];
        if !conn.send(line) {
            dead.push(conn.cid);
        }
    }

    /// Try and add a user to the server.
    async fn handle_auth(&mut self, request: AuthRequest) -> AuthOutcome {
        let (username, password, registering) = match request {
            AuthRequest::Login { username, password } => (username, password, false),
            AuthRequest::Register { username, password } => (username, password, true),
        };

        if let Err(reason) = db_task::validate_username(&username) {
            return AuthOutcome::Fail(format!("[Server]: Invalid username: {reason}."));
        }

        // one live session per account
        if self
            .conns
            .iter()
            .any(|c| c.username.eq_ignore_ascii_case(&username))
        {
            return AuthOutcome::Fail("[Server]: That user is already logged in.".to_string());
        }

        let result = if registering {
            self.db
                .try_register(username.clone(), password)
                .await
                .map(|()| username.clone())
        } else {
            self.db.try_login(username.clone(), password).await
        };

        let display = match result {
            Ok(display) => display,
            Err(AuthError::Store(e)) => {
                error!("store failure during auth for {username}: {e:?}");
                return AuthOutcome::Fail(
                    "[Server]: The server could not access the database.".to_string(),
                );
            }
            Err(e) => return AuthOutcome::Fail(format!("[Server]: {e}")),
        };

        let cid = self.generate_cid();
        let (line_tx, line_rx) = mpsc::channel(128);

        let who = self.conns.len();
        let client = Client {
            cid,
            username: display.clone(),
            state: SessionState::Chatting,
            slot: 0,
            is_moderator: false,
            line_tx,
        };

        // Their first line is the welcome; it is drained once the
        // connection task picks up the receiver.
        if registering {
            client.send(&format!("Registration successful! Welcome {display}"));
        } else {
            client.send(&format!("Login successful! Welcome back {display}"));
        }

        self.conns.push(client);
        self.conn_lookup.insert(cid, who);
        info!("{display} logged in with cid {cid}");

        let dead = self.broadcast(
            &format!("[Server]: {display} has joined the chat."),
            Some(cid),
        );
        self.reap(dead).await;

        AuthOutcome::Success { cid, line_rx }
    }

    /// Remove a client from the server and disconnect them. Returns any
    /// further clients found dead while announcing the departure.
    async fn remove_client(&mut self, cid: CID) -> Vec<CID> {
        let mut dead = Vec::new();

        match self.conn_lookup.remove(&cid) {
            Some(who) => {
                info!("removing client cid:{cid}");

                if self.conns[who].state == SessionState::Playing {
                    self.handle_player_dropout(who, &mut dead).await;
                }

                let client = self.conns.swap_remove(who);

                // swap_remove may have moved a client from the end to 'who'.
                // If this occurs, we need to fix their entry in the lookup map.
                if let Some(moved) = self.conns.get(who) {
                    let old_entry = self.conn_lookup.insert(moved.cid, who);
                    assert_eq!(old_entry, Some(self.conns.len()));
                }

                dead.extend(self.broadcast(
                    &format!("[Server]: {} has left the chat.", client.username),
                    None,
                ));

                // Their connection will be dropped once client is dropped
                info!("goodbye, {}", client.username);
            }
            None => {
                // both the read loop and the reaper may report the same
                // connection; removal is idempotent
                debug!("logout for unknown client {cid}");
            }
        }

        dead
    }

    /// Drain a quarantine list, removing each dead client. Removal can
    /// discover more dead clients, so this works through a worklist.
    async fn reap(&mut self, mut dead: Vec<CID>) {
        while let Some(cid) = dead.pop() {
            let more = self.remove_client(cid).await;
            dead.extend(more);
        }
    }

    /// Handle a line received from a client, dispatching on session state.
    async fn handle_line(&mut self, who: usize, line: String) -> Vec<CID> {
        let mut dead = Vec::new();
        let trimmed = line.trim();

        debug!("[{}] {trimmed:?}", self.conns[who].cid);

        if trimmed.is_empty() {
            self.reply(who, "Empty command ignored.", &mut dead);
            return dead;
        }

        let (verb, args) = split_command(trimmed);

        match self.conns[who].state {
            SessionState::Chatting => match verb.as_str() {
                "!user" => self.handle_rename(who, args, &mut dead).await,
                "!who" => self.handle_who(who, &mut dead),
                "!commands" => self.handle_commands(who, &mut dead),
                "!about" => self.handle_about(who, &mut dead),
                "!whisper" => self.handle_whisper(who, args, &mut dead),
                "!roll" => self.handle_roll(who, args, &mut dead),
                "!kick" => self.handle_kick(who, args, &mut dead),
                "!join" => self.handle_join(who, &mut dead).await,
                "!scores" => self.handle_scores(who, &mut dead).await,
                "!exit" => dead.push(self.conns[who].cid),
                _ => {
                    // anything unrecognised is chat
                    let text = format!("[{}]: {trimmed}", self.conns[who].username);
                    dead.extend(self.broadcast(&text, None));
                }
            },
            SessionState::Playing => match verb.as_str() {
                "!whisper" => self.handle_whisper(who, args, &mut dead),
                "!startgame" => self.handle_start_game(who, &mut dead).await,
                "!move" => self.handle_move(who, args, &mut dead).await,
                "!exit" => dead.push(self.conns[who].cid),
                v if v.starts_with('!') => {
                    self.reply(
                        who,
                        "[Server]: That command isn't available during a game.",
                        &mut dead,
                    );
                }
                _ => {
                    let text = format!("[{}]: {trimmed}", self.conns[who].username);
                    dead.extend(self.broadcast(&text, None));
                }
            },
        }

        dead
    }

    fn start(db: DBTask) -> mpsc::Sender<Message> {
        let (msg_tx, mut msg_rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            let mut gs = GameServer {
                next_cid: 1,
                conns: Vec::new(),
                conn_lookup: BTreeMap::new(),
                game: Match::new(),
                db,
            };

            // no session can own a slot across a restart
            gs.db.reset_match().await;

            while let Some(msg) = msg_rx.recv().await {
                match msg {
                    Message::Auth { request, resp } => {
                        let outcome = gs.handle_auth(request).await;
                        if resp.send(outcome).is_err() {
                            error!("a connection vanished while logging in");
                        }
                    }

                    Message::Line { cid, line } => match gs.conn_lookup.get(&cid) {
                        Some(&who) => {
                            let dead = gs.handle_line(who, line).await;
                            gs.reap(dead).await;
                        }
                        None => {
                            warn!("👻 received a spooky line from unknown client cid={cid}");
                        }
                    },

                    Message::Logout(cid) => {
                        gs.reap(vec![cid]).await;
                    }

                    Message::Host(cmd) => gs.handle_host_command(cmd).await,

                    Message::Shutdown => {
                        info!("shutting down, closing {} connections", gs.conns.len());
                        gs.conns.clear();
                        gs.conn_lookup.clear();
                        break;
                    }
                }
            }
        });

        msg_tx
    }
}

/// Spawn the server actor and hand back its inbox.
pub fn start(db: DBTask) -> mpsc::Sender<Message> {
    GameServer::start(db)
}

/// Accept connections forever, turning each one into a session task.
pub async fn serve(gs: mpsc::Sender<Message>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("connection from {addr}");
        conn_task::run_connection(gs.clone(), stream);
    }
}

#[cfg(test)]
mod tests {
    use super::split_command;

    #[test]
    fn verbs_fold_and_args_pass_through() {
        assert_eq!(split_command("!LOGIN Alice pw1"), ("!login".to_string(), "Alice pw1"));
        assert_eq!(split_command("!whisper \"A B\"  hi"), ("!whisper".to_string(), "\"A B\"  hi"));
        assert_eq!(split_command("!who"), ("!who".to_string(), ""));
        assert_eq!(split_command("hello there"), ("hello".to_string(), "there"));
    }
}
