use clap::Parser;
use client::board::ClientBoard;
use client::input::{parse_game_input, parse_menu_choice, row_label};
use client::network::{Client, ClientError, MoveResult};
use log::{info, warn};
use shared::{GameCommand, LeaderboardEntry, MenuCommand};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Username, prompted for when absent
    #[arg(short, long)]
    username: Option<String>,

    /// Password, prompted for when absent
    #[arg(short, long)]
    password: Option<String>,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    info!("Connecting to: {}", args.server);
    println!("Waiting for the server to accept the connection...");
    let mut client = Client::connect(&args.server).await?;

    let username = match args.username {
        Some(username) => username,
        None => prompt(&mut input, "Username: ").await?,
    };
    let password = match args.password {
        Some(password) => password,
        None => prompt(&mut input, "Password: ").await?,
    };

    if let Err(e) = client.login(&username, &password).await {
        println!("You entered either an incorrect username or password. Disconnecting.");
        return Err(e.into());
    }
    println!("Welcome to the Minesweeper gaming system, {}!", username);

    loop {
        println!("\nPlease enter a selection:");
        println!("<1> Play Minesweeper");
        println!("<2> Show Leaderboard");
        println!("<3> Quit");

        let line = prompt(&mut input, "Selection option (1-3): ").await?;
        match parse_menu_choice(&line) {
            Ok(MenuCommand::Play) => {
                client.play().await?;
                play_game(&mut client, &mut input).await?;
            }
            Ok(MenuCommand::Leaderboard) => {
                let entries = client.leaderboard().await?;
                print_leaderboard(&entries);
            }
            Ok(MenuCommand::Exit) => {
                client.exit().await?;
                break;
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

async fn play_game(client: &mut Client<TcpStream>, input: &mut Input) -> Result<(), ClientError> {
    let mut board = ClientBoard::new();

    loop {
        println!("\n{}", board);
        println!("Choose an option:");
        println!("<R> Reveal tile");
        println!("<P> Place flag");
        println!("<Q> Quit game");

        let line = prompt(input, "Option (R, P, Q) and tile, e.g. R B7: ").await?;
        let command = match parse_game_input(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let result = match command {
            GameCommand::Reveal { x, y } => client.reveal(x, y).await?,
            GameCommand::Flag { x, y } => client.flag(x, y).await?,
            GameCommand::Quit => {
                client.quit().await?;
                return Ok(());
            }
        };

        match result {
            MoveResult::Tiles(tiles) => {
                for (x, y) in board.apply(&tiles) {
                    println!("Warning: there is no mine at {}{}.", row_label(y), x + 1);
                }
            }
            MoveResult::Invalid => println!("That move is not allowed."),
            MoveResult::GameOver { won: true, seconds } => {
                println!(
                    "Congratulations! You have located all the mines. You won in {} seconds!",
                    seconds
                );
                return Ok(());
            }
            MoveResult::GameOver { won: false, .. } => {
                board.apply(&client.acknowledge().await?);
                println!("\n{}", board);
                println!("Game over! You hit a mine.");
                return Ok(());
            }
        }
    }
}

fn print_leaderboard(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("There is no information currently stored in the leaderboard. Try again later.");
        return;
    }

    println!("{}", "=".repeat(70));
    for entry in entries {
        println!(
            "{:<20}{:>8} seconds{:>8} games won, {} games played",
            entry.name, entry.seconds, entry.wins, entry.plays
        );
    }
    println!("{}", "=".repeat(70));
}

async fn prompt(input: &mut Input, message: &str) -> Result<String, ClientError> {
    print!("{}", message);
    if let Err(e) = std::io::stdout().flush() {
        warn!("Failed to flush prompt: {}", e);
    }

    match input.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed").into()),
    }
}
