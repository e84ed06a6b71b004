//! Interactive TCP client for manual testing against a running server.
//!
//! Not part of the core subsystems; reads lines from stdin, forwards
//! each with a trailing `\n`, and prints the response line it gets
//! back. Typing `exit` or hitting EOF closes the connection and exits.

use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() {
    let address = match std::env::args().nth(1) {
        Some(address) => address,
        None => {
            eprintln!("usage: kvline-cli <host:port>");
            std::process::exit(2);
        }
    };

    let stream = match TcpStream::connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("failed to connect to {address}: {e}");
            std::process::exit(1);
        }
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut server_reader = BufReader::new(read_half);
    let mut stdin = BufReader::new(tokio::io::stdin());

    let mut input = String::new();
    let mut response = String::new();

    loop {
        print!(":) ");
        std::io::stdout().flush().ok();

        input.clear();
        let bytes_read = match stdin.read_line(&mut input).await {
            Ok(n) => n,
            Err(e) => {
                eprintln!("failed to read from stdin: {e}");
                break;
            }
        };
        if bytes_read == 0 {
            println!("bye...");
            break;
        }

        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("exit") {
            println!("bye...");
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        if let Err(e) = write_half
            .write_all(format!("{trimmed}\n").as_bytes())
            .await
        {
            eprintln!("failed to write to server: {e}");
            break;
        }

        response.clear();
        match server_reader.read_line(&mut response).await {
            Ok(0) => {
                println!("server closed the connection");
                break;
            }
            Ok(_) => print!("{response}"),
            Err(e) => {
                eprintln!("failed to read from server: {e}");
                break;
            }
        }
    }
}
