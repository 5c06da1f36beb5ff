use anyhow::Result;
use log::{error, info, warn};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::line::{Connection, LineError};

use super::{split_command, AuthOutcome, AuthRequest, Message, CID};

pub type ConnSender = mpsc::Sender<String>;
pub type ConnReceiver = mpsc::Receiver<String>;

const PLEASE_LOGIN: &str =
    "Please login or register first. Use !login <user> <pass> or !register <user> <pass>.";
const LINE_TOO_LONG: &str = "[Server]: Line too long, ignored.";

/// Split `<username> <password>` out of a credential command's arguments.
/// The password is everything after the first whitespace run, verbatim.
fn parse_credentials(args: &str) -> Option<(String, String)> {
    let (username, password) = args.split_once(char::is_whitespace)?;
    let password = password.trim_start();
    if password.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

async fn do_handshake(
    gs: mpsc::Sender<Message>,
    conn: &mut Connection,
) -> Result<Option<(CID, ConnReceiver)>> {
    loop {
        let line = match conn.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(LineError::Oversized) => {
                conn.write_line(LINE_TOO_LONG).await?;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            conn.write_line("Empty command ignored.").await?;
            continue;
        }

        let (verb, args) = split_command(trimmed);
        let request = match verb.as_str() {
            "!login" | "!register" => match parse_credentials(args) {
                Some((username, password)) => {
                    if verb == "!login" {
                        AuthRequest::Login { username, password }
                    } else {
                        AuthRequest::Register { username, password }
                    }
                }
                None => {
                    conn.write_line(&format!("[Server]: Usage: {verb} <username> <password>"))
                        .await?;
                    continue;
                }
            },
            "!exit" => return Ok(None),
            _ => {
                conn.write_line(PLEASE_LOGIN).await?;
                continue;
            }
        };

        // Try to get ourselves in
        let (resp_tx, resp_rx) = oneshot::channel();
        gs.send(Message::Auth {
            request,
            resp: resp_tx,
        })
        .await?;

        match resp_rx.await? {
            AuthOutcome::Fail(reply) => {
                // No dice, just relay this to the client and keep trying.
                conn.write_line(&reply).await?;
            }
            AuthOutcome::Success { cid, line_rx } => {
                // We've established a session.
                // The server has queued the welcome line on the channel.
                return Ok(Some((cid, line_rx)));
            }
        }
    }
}

async fn handle_connection(gs: mpsc::Sender<Message>, stream: TcpStream) -> Result<()> {
    let mut conn = Connection::new(stream);

    // Allow the client to log in
    let (cid, mut line_rx) = match do_handshake(gs.clone(), &mut conn).await? {
        Some(t) => t,
        None => {
            // Client gave up without authenticating.
            conn.shutdown().await?;
            return Ok(());
        }
    };

    // We are now authenticated with the server.
    // From this point on, we should not terminate without telling it beforehand.
    loop {
        tokio::select! {
            outbound = line_rx.recv() => {
                match outbound {
                    None => {
                        // The server has dropped us (kick, exit or shutdown).
                        break;
                    }
                    Some(line) => {
                        if let Err(e) = conn.write_line(&line).await {
                            // It's all over
                            warn!("error writing to client {cid}: {e:?}");
                            gs.send(Message::Logout(cid)).await?;
                            break;
                        }
                    }
                }
            }

            inbound = conn.read_line() => {
                match inbound {
                    Ok(Some(line)) => {
                        gs.send(Message::Line { cid, line }).await?;
                    }
                    Ok(None) => {
                        info!("client {cid} disconnected");
                        gs.send(Message::Logout(cid)).await?;
                        break;
                    }
                    Err(LineError::Oversized) => {
                        // protocol violation; complain once and keep the
                        // session in its current state
                        if conn.write_line(LINE_TOO_LONG).await.is_err() {
                            gs.send(Message::Logout(cid)).await?;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("error reading from client {cid}: {e:?}");
                        gs.send(Message::Logout(cid)).await?;
                        break;
                    }
                }
            }
        }
    }

    conn.shutdown().await?;

    Ok(())
}

pub(super) fn run_connection(gs: mpsc::Sender<Message>, stream: TcpStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        match handle_connection(gs, stream).await {
            Ok(_) => {}
            Err(err) => {
                error!("connection failed: {err:?}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::parse_credentials;

    #[test]
    fn credentials_split_on_first_whitespace() {
        assert_eq!(
            parse_credentials("Alice pw1"),
            Some(("Alice".to_string(), "pw1".to_string()))
        );
        assert_eq!(
            parse_credentials("Alice  spaced pass"),
            Some(("Alice".to_string(), "spaced pass".to_string()))
        );
        assert_eq!(parse_credentials("Alice"), None);
        assert_eq!(parse_credentials("Alice   "), None);
        assert_eq!(parse_credentials(""), None);
    }
}
