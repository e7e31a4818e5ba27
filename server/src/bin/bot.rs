use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use rps_shared::Move;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Scripted player: registers a nickname and answers every prompt with a
/// random move until the server ends the match.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Nickname to register (random bot_NNNN if omitted)
    #[clap(short, long)]
    nickname: Option<String>,
    /// Delay before each move in milliseconds
    #[clap(short, long, default_value = "500")]
    think_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = rand::thread_rng();
    let nickname = args
        .nickname
        .unwrap_or_else(|| format!("bot_{:04}", rng.gen_range(0..10_000)));

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {} as {}", args.server, nickname);

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half
        .write_all(format!("{}\r\n", nickname).as_bytes())
        .await?;

    let mut moved = false;
    while let Some(line) = lines.next_line().await? {
        println!("< {}", line);

        if line.starts_with("Draw!") {
            moved = false;
        }

        let prompted = line.contains("Type ROCK/PAPER/SCISSORS") || line.starts_with("Draw!");
        if prompted && !moved {
            sleep(Duration::from_millis(args.think_ms)).await;

            let mv = *Move::ALL.choose(&mut rng).unwrap_or(&Move::Rock);
            println!("> {}", mv);
            write_half.write_all(format!("{}\r\n", mv).as_bytes()).await?;
            moved = true;
        }
    }

    println!("Server closed the connection");
    Ok(())
}
