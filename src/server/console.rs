use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::db_task::DBTask;

use super::{split_command, GameServer, HostCommand, Message};

/// Read privileged commands from the host terminal. These never travel over
/// the wire and the host never occupies a chat username.
pub async fn run(gs: mpsc::Sender<Message>, db: DBTask) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                error!("failed to read from the console: {e}");
                return;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (verb, args) = split_command(trimmed);
        match verb.as_str() {
            "!mod" => {
                let name = args.trim().to_string();
                if name.is_empty() {
                    println!("usage: !mod <name>");
                    continue;
                }
                let (resp, rx) = oneshot::channel();
                if gs
                    .send(Message::Host(HostCommand::Mod { name, resp }))
                    .await
                    .is_err()
                {
                    return;
                }
                match rx.await {
                    Ok(reply) => println!("{reply}"),
                    Err(_) => return,
                }
            }

            "!mods" => {
                let (resp, rx) = oneshot::channel();
                if gs
                    .send(Message::Host(HostCommand::Mods { resp }))
                    .await
                    .is_err()
                {
                    return;
                }
                match rx.await {
                    Ok(mods) if mods.is_empty() => println!("no moderators"),
                    Ok(mods) => println!("moderators: {}", mods.join(", ")),
                    Err(_) => return,
                }
            }

            "!kick" => {
                let name = args.trim().to_string();
                if name.is_empty() {
                    println!("usage: !kick <name>");
                    continue;
                }
                let (resp, rx) = oneshot::channel();
                if gs
                    .send(Message::Host(HostCommand::Kick { name, resp }))
                    .await
                    .is_err()
                {
                    return;
                }
                match rx.await {
                    Ok(reply) => println!("{reply}"),
                    Err(_) => return,
                }
            }

            "!dbtest" => {
                if db.test_connection().await {
                    println!("database connection OK");
                } else {
                    println!("database connection FAILED");
                }
            }

            _ => println!("unknown console command: {verb}"),
        }
    }
}

impl GameServer {
    pub(super) async fn handle_host_command(&mut self, cmd: HostCommand) {
        match cmd {
            HostCommand::Mod { name, resp } => {
                let reply = match self
                    .conns
                    .iter_mut()
                    .find(|c| c.username.eq_ignore_ascii_case(&name))
                {
                    Some(client) => {
                        client.is_moderator = !client.is_moderator;
                        if client.is_moderator {
                            client.send("[Server]: You are now a moderator.");
                            format!("{} is now a moderator", client.username)
                        } else {
                            client.send("[Server]: You are no longer a moderator.");
                            format!("{} is no longer a moderator", client.username)
                        }
                    }
                    None => format!("no connected user named {name}"),
                };
                let _ = resp.send(reply);
            }

            HostCommand::Mods { resp } => {
                let mods = self
                    .conns
                    .iter()
                    .filter(|c| c.is_moderator)
                    .map(|c| c.username.clone())
                    .collect();
                let _ = resp.send(mods);
            }

            HostCommand::Kick { name, resp } => {
                let target = self
                    .conns
                    .iter()
                    .position(|c| c.username.eq_ignore_ascii_case(&name));
                let reply = match target {
                    Some(idx) => {
                        let username = self.conns[idx].username.clone();
                        let cid = self.conns[idx].cid;
                        self.conns[idx].send("You were kicked by the server host.");
                        self.reap(vec![cid]).await;
                        format!("kicked {username}")
                    }
                    None => format!("no connected user named {name}"),
                };
                let _ = resp.send(reply);
            }
        }
    }
}
