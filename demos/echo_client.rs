//! Connects to a local websocket echo server, sends a message and prints the
//! reply. The HTTP upgrade handshake is the caller's responsibility, the
//! engine only takes over once the stream is upgraded.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use framesock::ws::{Event, IntoWebsocket, Role};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut stream = TcpStream::connect("127.0.0.1:9001")?;
    upgrade(&mut stream, "127.0.0.1:9001", "/")?;

    // a read timeout turns an idle stream into recv() returning Ok(None)
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut ws = stream.into_websocket(Role::Client);

    ws.send_text("hello over websocket")?;

    loop {
        match ws.recv()? {
            Some(Event::Text(body)) => {
                println!("received: {body}");
                ws.close()?;
            }
            Some(Event::Binary(body)) => println!("received {} binary bytes", body.len()),
            Some(Event::Closed { code, reason }) => {
                println!("peer closed: {code:?} {reason}");
                break;
            }
            None => std::thread::sleep(Duration::from_millis(10)),
        }
        if !ws.is_open() {
            break;
        }
    }
    Ok(())
}

/// Minimal HTTP/1.1 upgrade exchange. Real callers should validate the
/// `Sec-WebSocket-Accept` header as well, the engine does not care either way.
fn upgrade(stream: &mut TcpStream, host: &str, path: &str) -> anyhow::Result<()> {
    stream.write_all(format!("GET {path} HTTP/1.1\r\n").as_bytes())?;
    stream.write_all(format!("Host: {host}\r\n").as_bytes())?;
    stream.write_all(b"Upgrade: websocket\r\n")?;
    stream.write_all(b"Connection: upgrade\r\n")?;
    stream.write_all(b"Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n")?;
    stream.write_all(b"Sec-WebSocket-Version: 13\r\n\r\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut status = String::new();
    reader.read_line(&mut status)?;
    anyhow::ensure!(status.contains("101"), "unable to switch protocols: {status}");

    // drain the remaining response headers
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line == "\r\n" {
            break;
        }
    }
    Ok(())
}
