//! Interactive line-protocol client for driving a running trivia server.
//!
//! Connects, prints every decoded server message, and forwards each stdin
//! line to the server: the display name, a `<category>:<mode>` selection,
//! answers `A`-`D`, the side commands, or `cancelar`.

use shared::ServerMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:65001".to_string());

    let stream = TcpStream::connect(&addr).await?;
    println!("Connected to {}", addr);

    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                match line? {
                    Some(line) => match ServerMessage::parse(line.trim()) {
                        Some(msg) => println!("<< {:?}", msg),
                        None => println!("<< (raw) {}", line),
                    },
                    None => {
                        println!("Server closed the connection");
                        break;
                    }
                }
            }
            line = stdin_lines.next_line() => {
                match line? {
                    Some(input) => {
                        write_half.write_all(format!("{}\n", input).as_bytes()).await?;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
