//! The 3x3 board engine. Pure state and rules, no I/O; the server owns the
//! single live board and serialises access to it.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tile {
    Blank,
    Cross,
    Naught,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    Playing,
    CrossWins,
    NaughtWins,
    Draw,
}

/// Rows, columns and diagonals, by cell index.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Clone, Debug)]
pub struct Board {
    cells: [Tile; 9],
}

impl Board {
    pub fn new() -> Board {
        Board {
            cells: [Tile::Blank; 9],
        }
    }

    /// Place a mark. Returns true only if the index is on the board, the
    /// tile is not blank, and the cell was free.
    pub fn set_tile(&mut self, index: usize, tile: Tile) -> bool {
        if index >= 9 || tile == Tile::Blank || self.cells[index] != Tile::Blank {
            return false;
        }
        self.cells[index] = tile;
        true
    }

    pub fn state(&self) -> GameState {
        if self.has_won(Tile::Cross) {
            return GameState::CrossWins;
        }
        if self.has_won(Tile::Naught) {
            return GameState::NaughtWins;
        }
        if self.cells.iter().all(|&tile| tile != Tile::Blank) {
            return GameState::Draw;
        }
        GameState::Playing
    }

    fn has_won(&self, tile: Tile) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&cell| self.cells[cell] == tile))
    }

    pub fn reset(&mut self) {
        self.cells = [Tile::Blank; 9];
    }

    /// Serialise to exactly nine characters of `x`, `o` and `_`, row-major.
    pub fn to_wire(&self) -> String {
        self.cells
            .iter()
            .map(|tile| match tile {
                Tile::Blank => '_',
                Tile::Cross => 'x',
                Tile::Naught => 'o',
            })
            .collect()
    }

    /// Load from the nine-character wire form. Inputs of any other length
    /// are ignored.
    pub fn from_wire(&mut self, wire: &str) {
        let chars: Vec<char> = wire.chars().collect();
        if chars.len() != 9 {
            return;
        }
        for (cell, ch) in self.cells.iter_mut().zip(chars) {
            *cell = match ch {
                'x' => Tile::Cross,
                'o' => Tile::Naught,
                _ => Tile::Blank,
            };
        }
    }
}

impl Default for Board {
    fn default() -> Board {
        Board::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(wire: &str) -> Board {
        let mut board = Board::new();
        board.from_wire(wire);
        board
    }

    #[test]
    fn set_tile_rules() {
        let mut board = Board::new();
        assert!(board.set_tile(0, Tile::Cross));
        assert!(!board.set_tile(0, Tile::Naught), "cell is taken");
        assert!(!board.set_tile(9, Tile::Cross), "index off the board");
        assert!(!board.set_tile(1, Tile::Blank), "blank is not placeable");
        assert!(board.set_tile(8, Tile::Naught));
    }

    #[test]
    fn detects_every_row_column_and_diagonal() {
        let wins = [
            "xxx______",
            "___xxx___",
            "______xxx",
            "x__x__x__",
            "_x__x__x_",
            "__x__x__x",
            "x___x___x",
            "__x_x_x__",
        ];
        for wire in wins {
            assert_eq!(board_from(wire).state(), GameState::CrossWins, "{wire}");
            let flipped: String = wire
                .chars()
                .map(|c| if c == 'x' { 'o' } else { c })
                .collect();
            assert_eq!(
                board_from(&flipped).state(),
                GameState::NaughtWins,
                "{flipped}"
            );
        }
    }

    #[test]
    fn draw_when_full_without_a_line() {
        assert_eq!(board_from("xoxxooox_").state(), GameState::Playing);
        assert_eq!(board_from("xoxxoooxx").state(), GameState::Draw);
    }

    #[test]
    fn empty_board_is_playing() {
        assert_eq!(Board::new().state(), GameState::Playing);
    }

    #[test]
    fn wire_round_trip() {
        let wire = "x_o__x_ox";
        let board = board_from(wire);
        assert_eq!(board.to_wire(), wire);
        assert_eq!(board.to_wire().len(), 9);
    }

    #[test]
    fn from_wire_ignores_bad_lengths() {
        let mut board = board_from("xxx______");
        board.from_wire("xo");
        board.from_wire("__________x");
        assert_eq!(board.to_wire(), "xxx______");
    }

    #[test]
    fn reset_blanks_everything() {
        let mut board = board_from("xoxxooox_");
        board.reset();
        assert_eq!(board.to_wire(), "_________");
    }
}
