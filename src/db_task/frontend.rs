use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

use super::{AuthError, Command, MatchKey, ScoreRow};

#[derive(Clone)]
pub struct DBTask {
    pub(super) tx: mpsc::Sender<Command>,
}

impl DBTask {
    pub async fn try_register(&self, username: String, password: String) -> Result<(), AuthError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::Register {
                username,
                password,
                resp,
            })
            .await
            .unwrap();
        rx.await.map_err(anyhow::Error::from)?
    }

    pub async fn try_login(&self, username: String, password: String) -> Result<String, AuthError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::Login {
                username,
                password,
                resp,
            })
            .await
            .unwrap();
        rx.await.map_err(anyhow::Error::from)?
    }

    pub async fn try_rename(&self, current: String, new_name: String) -> Result<(), AuthError> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::Rename {
                current,
                new_name,
                resp,
            })
            .await
            .unwrap();
        rx.await.map_err(anyhow::Error::from)?
    }

    pub async fn increment_wins(&self, username: String) {
        self.tx
            .send(Command::IncrementWins { username })
            .await
            .unwrap();
    }

    pub async fn increment_losses(&self, username: String) {
        self.tx
            .send(Command::IncrementLosses { username })
            .await
            .unwrap();
    }

    pub async fn increment_draws(&self, username: String) {
        self.tx
            .send(Command::IncrementDraws { username })
            .await
            .unwrap();
    }

    pub async fn get_stats(&self, username: String) -> Result<(u32, u32, u32)> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(Command::GetStats { username, resp })
            .await
            .unwrap();
        rx.await?
    }

    pub async fn all_scores(&self) -> Result<Vec<ScoreRow>> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(Command::AllScores { resp }).await.unwrap();
        rx.await?
    }

    pub async fn set_match_value(&self, key: MatchKey, value: Option<String>) {
        self.tx
            .send(Command::SetMatchValue { key, value })
            .await
            .unwrap();
    }

    pub async fn reset_match(&self) {
        self.tx.send(Command::ResetMatch).await.unwrap();
    }

    pub async fn test_connection(&self) -> bool {
        let (resp, rx) = oneshot::channel();
        self.tx.send(Command::TestConnection { resp }).await.unwrap();
        rx.await.unwrap_or(false)
    }
}
