use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::cmd::{Command, ServerConfig};
use crate::error::Result;
use crate::files::{list_directory, read_served_file};
use crate::network::{build_server_listener, connect_with_retry};
use crate::protocol::{
    read_command, read_data_address, send_data_error, send_framed, send_reply, CONTROL_ACK,
    FILE_NOT_FOUND, INVALID_COMMAND,
};

/// How long to keep dialing a client's data address.
pub const DATA_CONNECT_WINDOW: Duration = Duration::from_secs(3);

/// Pause after a failed accept so a persistent fault (EMFILE) doesn't spin.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How a single control connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Rejected(String),
    Listing { bytes: usize },
    File { name: String, bytes: usize },
    Missing(String),
}

pub fn serve(cfg: &ServerConfig) -> Result<()> {
    let listener = build_server_listener(cfg.port)?;
    println!("Server open on port {}", cfg.port);
    serve_on(listener, &cfg.root)
}

fn accept_client(listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
    match listener.accept() {
        Ok(c) => Some(c),
        Err(m) => {
            warn!("A client attempted to connect and failed: {}", m);
            thread::sleep(ACCEPT_BACKOFF);
            None
        }
    }
}

/// Handles clients one after another, forever.
pub fn serve_on(listener: TcpListener, root: &Path) -> Result<()> {
    loop {
        let (conn, peer) = match accept_client(&listener) {
            Some(c) => c,
            None => continue,
        };
        debug!("control connection from {}", peer);
        match handle_client(conn, root) {
            Ok(served) => debug!("{} served: {:?}", peer, served),
            Err(m) => warn!("{}: {}", peer, m),
        }
    }
}

/// Runs the server half of one exchange on an accepted control connection.
pub fn handle_client(conn: TcpStream, root: &Path) -> Result<Served> {
    let mut control = BufReader::new(&conn);
    let text = read_command(&mut control)?;
    let command = match Command::from_wire(&text) {
        Some(c) => c,
        None => {
            send_reply(&mut &conn, INVALID_COMMAND)?;
            return Ok(Served::Rejected(text));
        }
    };

    send_reply(&mut &conn, CONTROL_ACK)?;
    let client = read_data_address(&mut control)?;
    println!("Connection from {}.", client.host);

    let mut data = connect_with_retry(&client, DATA_CONNECT_WINDOW)?;
    let served = match command {
        Command::List => {
            println!("List directory requested on port {}.", client.port);
            println!("Sending directory contents to {}.", client);
            let listing = list_directory(root)?;
            send_framed(&mut data, listing.as_bytes())?;
            Served::Listing { bytes: listing.len() }
        }
        Command::Get(name) => {
            println!("File \"{}\" requested on port {}.", name, client.port);
            match read_served_file(root, &name) {
                Some(contents) => {
                    println!("Sending \"{}\" to {}.", name, client);
                    send_framed(&mut data, &contents)?;
                    Served::File { name, bytes: contents.len() }
                }
                None => {
                    println!("File not found or inaccessible. Sending error message.");
                    send_data_error(&mut data, FILE_NOT_FOUND)?;
                    Served::Missing(name)
                }
            }
        }
    };
    Ok(served)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn failed_accept_backs_off() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        // nothing queued: every accept on a non-blocking listener fails
        listener.set_nonblocking(true).unwrap();
        let started = Instant::now();
        assert!(accept_client(&listener).is_none());
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[test]
    fn queued_client_is_returned() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        assert!(accept_client(&listener).is_some());
    }
}
