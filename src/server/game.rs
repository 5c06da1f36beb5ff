use log::{error, info};

use crate::board::{GameState, Tile};
use crate::db_task::MatchKey;

use super::{GameServer, SessionState, CID};

impl GameServer {
    /// Seat a chatting user in the first free slot.
    pub(super) async fn handle_join(&mut self, who: usize, dead: &mut Vec<CID>) {
        if self.game.player1.is_some() && self.game.player2.is_some() {
            self.reply(who, "[Server]: The game is full.", dead);
            return;
        }

        let name = self.conns[who].username.clone();
        let cid = self.conns[who].cid;

        let (slot, token, mark) = if self.game.player1.is_none() {
            self.game.player1 = Some(name.clone());
            self.db
                .set_match_value(MatchKey::Player1, Some(name.clone()))
                .await;
            (1, "!player1", 'X')
        } else {
            self.game.player2 = Some(name.clone());
            self.db
                .set_match_value(MatchKey::Player2, Some(name.clone()))
                .await;
            (2, "!player2", 'O')
        };

        self.conns[who].state = SessionState::Playing;
        self.conns[who].slot = slot;
        info!("{name} took game slot {slot}");

        self.reply(who, token, dead);
        dead.extend(self.broadcast(
            &format!("[Server]: {name} joined the game as {mark}."),
            Some(cid),
        ));
    }

    /// Begin the match. Only player 1 may start, and only with a full table.
    pub(super) async fn handle_start_game(&mut self, who: usize, dead: &mut Vec<CID>) {
        if self.conns[who].slot != 1 {
            self.reply(who, "[Server]: Only player 1 can start the game.", dead);
            return;
        }
        if self.game.current_turn.is_some() {
            self.reply(who, "[Server]: The game has already started.", dead);
            return;
        }

        let (p1, p2) = match (self.game.player1.clone(), self.game.player2.clone()) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                self.reply(who, "[Server]: Waiting for a second player.", dead);
                return;
            }
        };

        self.game.current_turn = Some(p1.clone());
        self.db
            .set_match_value(MatchKey::CurrentTurn, Some(p1.clone()))
            .await;
        info!("game started: {p1} (X) vs {p2} (O)");

        if let Some(idx) = self.index_of(&p1) {
            self.reply(idx, "!yourturn", dead);
        }
        if let Some(idx) = self.index_of(&p2) {
            self.reply(idx, "!waitturn", dead);
        }
        dead.extend(self.broadcast("[Server]: Game has started.", None));
    }

    /// Validate and apply a move, then advance or finish the match.
    pub(super) async fn handle_move(&mut self, who: usize, args: &str, dead: &mut Vec<CID>) {
        let name = self.conns[who].username.clone();

        // checked in order: whose turn it is, then the index, then the cell
        match &self.game.current_turn {
            Some(turn) if *turn == name => {}
            Some(_) => {
                self.reply(who, "[Server]: Not your turn.", dead);
                return;
            }
            None => {
                self.reply(who, "[Server]: The game has not started yet.", dead);
                return;
            }
        }

        let index: usize = match args.trim().parse() {
            Ok(i) if i < 9 => i,
            _ => {
                self.reply(who, "[Server]: Invalid tile index.", dead);
                return;
            }
        };

        let (tile, mark) = if self.conns[who].slot == 1 {
            (Tile::Cross, 'X')
        } else {
            (Tile::Naught, 'O')
        };

        if !self.game.board.set_tile(index, tile) {
            self.reply(who, "[Server]: That tile is already taken.", dead);
            return;
        }

        dead.extend(self.broadcast(&format!("!settile {index} {mark}"), None));

        match self.game.board.state() {
            GameState::Playing => {
                let next = if self.game.player1.as_deref() == Some(name.as_str()) {
                    self.game.player2.clone()
                } else {
                    self.game.player1.clone()
                };

                match next {
                    Some(next) => {
                        self.game.current_turn = Some(next.clone());
                        self.db
                            .set_match_value(MatchKey::CurrentTurn, Some(next.clone()))
                            .await;
                        if let Some(idx) = self.index_of(&next) {
                            self.reply(idx, "!yourturn", dead);
                        }
                        self.reply(who, "!waitturn", dead);
                    }
                    None => error!("mid-game with an empty opponent slot"),
                }
            }
            terminal => self.finish_game(terminal, dead).await,
        }
    }

    /// Record the result, tell everyone, and clear the table. Each player
    /// observes: `!settile`, `[Game Over]`, `!resetboard`, their `[Result]`,
    /// then `!leavegame`.
    async fn finish_game(&mut self, result: GameState, dead: &mut Vec<CID>) {
        let (p1, p2) = match (self.game.player1.clone(), self.game.player2.clone()) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                error!("game finished without two seated players");
                self.reset_game().await;
                return;
            }
        };

        let summary = match result {
            GameState::CrossWins => {
                self.db.increment_wins(p1.clone()).await;
                self.db.increment_losses(p2.clone()).await;
                "X wins!"
            }
            GameState::NaughtWins => {
                self.db.increment_wins(p2.clone()).await;
                self.db.increment_losses(p1.clone()).await;
                "O wins!"
            }
            GameState::Draw => {
                self.db.increment_draws(p1.clone()).await;
                self.db.increment_draws(p2.clone()).await;
                "It's a draw!"
            }
            GameState::Playing => return,
        };
        info!("game over: {summary}");

        dead.extend(self.broadcast(&format!("[Game Over]: {summary}"), None));
        dead.extend(self.broadcast("!resetboard", None));

        for player in [p1, p2] {
            if let Some(idx) = self.index_of(&player) {
                // the increments above are already queued, so this read
                // sees the fresh record
                match self.db.get_stats(player.clone()).await {
                    Ok((wins, losses, draws)) => {
                        self.reply(
                            idx,
                            &format!("[Result] Your record is now {wins}W {losses}L {draws}D."),
                            dead,
                        );
                    }
                    Err(e) => {
                        error!("failed to fetch the record for {player}: {e:?}");
                        self.reply(idx, "[Server]: The server could not read your record.", dead);
                    }
                }

                self.conns[idx].state = SessionState::Chatting;
                self.conns[idx].slot = 0;
                self.reply(idx, "!leavegame", dead);
            }
        }

        self.reset_game().await;
    }

    /// A playing session went away: clear the table and send any remaining
    /// participant back to the chat room. No result is recorded.
    pub(super) async fn handle_player_dropout(&mut self, who: usize, dead: &mut Vec<CID>) {
        let cid = self.conns[who].cid;
        let name = self.conns[who].username.clone();
        info!("{name} dropped out of the game");

        self.reset_game().await;

        dead.extend(self.broadcast(
            &format!("[Server]: {name} left the Tic-Tac-Toe game."),
            Some(cid),
        ));
        dead.extend(self.broadcast("!resetboard", Some(cid)));

        for idx in 0..self.conns.len() {
            if idx != who && self.conns[idx].state == SessionState::Playing {
                self.conns[idx].state = SessionState::Chatting;
                self.conns[idx].slot = 0;
                self.reply(idx, "!leavegame", dead);
            }
        }
    }

    /// Clear slots, turn and board, in memory and in the store.
    async fn reset_game(&mut self) {
        self.game.player1 = None;
        self.game.player2 = None;
        self.game.current_turn = None;
        self.game.board.reset();
        self.db.reset_match().await;
    }
}
