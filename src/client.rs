//! The client side of the wire protocol: the one place that maps server
//! control tokens onto presenter effects. Anything that does not parse as a
//! control token is plain chat text to display verbatim.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    AssignedPlayer1,
    AssignedPlayer2,
    SetTile { index: usize, mark: char },
    YourTurn,
    WaitTurn,
    ResetBoard,
    LeaveGame,
    Text(String),
}

impl ServerEvent {
    pub fn parse(line: &str) -> ServerEvent {
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("!player1") => ServerEvent::AssignedPlayer1,
            Some("!player2") => ServerEvent::AssignedPlayer2,
            Some("!yourturn") => ServerEvent::YourTurn,
            Some("!waitturn") => ServerEvent::WaitTurn,
            Some("!resetboard") => ServerEvent::ResetBoard,
            Some("!leavegame") => ServerEvent::LeaveGame,
            Some("!settile") => {
                if let (Some(index), Some(mark)) = (parts.next(), parts.next()) {
                    if let Ok(index) = index.parse::<usize>() {
                        if index < 9 && (mark == "X" || mark == "O") {
                            return ServerEvent::SetTile {
                                index,
                                mark: if mark == "X" { 'X' } else { 'O' },
                            };
                        }
                    }
                }
                ServerEvent::Text(line.to_string())
            }
            _ => ServerEvent::Text(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerEvent;

    #[test]
    fn control_tokens_map_to_events() {
        assert_eq!(ServerEvent::parse("!player1"), ServerEvent::AssignedPlayer1);
        assert_eq!(ServerEvent::parse("!player2"), ServerEvent::AssignedPlayer2);
        assert_eq!(ServerEvent::parse("!yourturn"), ServerEvent::YourTurn);
        assert_eq!(ServerEvent::parse("!waitturn"), ServerEvent::WaitTurn);
        assert_eq!(ServerEvent::parse("!resetboard"), ServerEvent::ResetBoard);
        assert_eq!(ServerEvent::parse("!leavegame"), ServerEvent::LeaveGame);
        assert_eq!(
            ServerEvent::parse("!settile 4 X"),
            ServerEvent::SetTile { index: 4, mark: 'X' }
        );
        assert_eq!(
            ServerEvent::parse("!settile 8 O"),
            ServerEvent::SetTile { index: 8, mark: 'O' }
        );
    }

    #[test]
    fn everything_else_is_text() {
        for line in [
            "[Alice]: hello",
            "[Server]: Game has started.",
            "!settile 9 X",
            "!settile four X",
            "!settile 4 Q",
            "!settile",
            "!unknown",
        ] {
            assert_eq!(
                ServerEvent::parse(line),
                ServerEvent::Text(line.to_string()),
                "{line}"
            );
        }
    }
}
