//! A thin terminal client. Lines typed on stdin go to the server verbatim;
//! server lines come back through the control-token parser and turn into
//! printed text or a board redraw.

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use chatsrv::board::{Board, Tile};
use chatsrv::client::ServerEvent;

/// Terminal client for chatsrv.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Server port.
    port: u16,

    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    let (read_half, mut write_half) = stream.into_split();
    println!("Connected to {}:{}.", args.host, args.port);
    println!("Log in with !login <user> <pass> or !register <user> <pass>.");

    let mut server_lines = BufReader::new(read_half).lines();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut board = Board::new();
    let mut my_mark: Option<char> = None;

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        println!("Server closed the connection.");
                        break;
                    }
                };

                match ServerEvent::parse(&line) {
                    ServerEvent::Text(text) => println!("{text}"),
                    ServerEvent::AssignedPlayer1 => {
                        my_mark = Some('X');
                        println!("You joined as player 1 (X). Start with !startgame.");
                    }
                    ServerEvent::AssignedPlayer2 => {
                        my_mark = Some('O');
                        println!("You joined as player 2 (O). Waiting for player 1 to start.");
                    }
                    ServerEvent::SetTile { index, mark } => {
                        let tile = if mark == 'X' { Tile::Cross } else { Tile::Naught };
                        board.set_tile(index, tile);
                        draw_board(&board);
                    }
                    ServerEvent::YourTurn => match my_mark {
                        Some(mark) => println!("Your turn ({mark}). Move with !move <0-8>."),
                        None => println!("Your turn. Move with !move <0-8>."),
                    },
                    ServerEvent::WaitTurn => println!("Waiting for your opponent..."),
                    ServerEvent::ResetBoard => board.reset(),
                    ServerEvent::LeaveGame => {
                        my_mark = None;
                        println!("You are back in the chat room.");
                    }
                }
            }

            input = stdin.next_line() => {
                match input? {
                    Some(text) => {
                        write_half.write_all(text.as_bytes()).await?;
                        write_half.write_all(b"\n").await?;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn draw_board(board: &Board) {
    let wire = board.to_wire();
    let cells: Vec<char> = wire
        .chars()
        .map(|c| match c {
            'x' => 'X',
            'o' => 'O',
            _ => '.',
        })
        .collect();

    for row in 0..3 {
        let base = row * 3;
        println!(
            " {} | {} | {}",
            cells[base],
            cells[base + 1],
            cells[base + 2]
        );
        if row < 2 {
            println!("---+---+---");
        }
    }
}
