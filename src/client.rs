use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use log::info;
use sha2::{Digest, Sha256};

use crate::cmd::{Command, Config, Endpoint};
use crate::error::Result;
use crate::files::{received_path, write_received_file};
use crate::network::{accept_once, build_control_stream, build_data_listener};
use crate::protocol::{advertise_self, await_ack, receive_framed, send_command};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Listed { bytes: usize },
    Saved { path: PathBuf, bytes: usize },
}

/// One full client exchange: control channel, data channel, dispatch.
///
/// Both sockets live only inside this call, so every return path, early
/// or not, closes them. Nothing is bound for data unless the server
/// acknowledged the command.
pub fn run<W: Write>(cfg: &Config, out: &mut W) -> Result<Outcome> {
    let mut control = build_control_stream(&cfg.server)?;
    send_command(&mut control, &cfg.command)?;
    await_ack(&mut control, &cfg.server)?;

    // listen before advertising so the server never dials a closed port
    let listener = build_data_listener(&cfg.data)?;
    let advertised = Endpoint::new(cfg.data.host.clone(), listener.local_addr()?.port());
    advertise_self(&mut control, &advertised)?;
    let (mut data, _) = accept_once(listener, cfg.accept_timeout)?;

    match &cfg.command {
        Command::List => get_dir_list(&mut data, out),
        Command::Get(name) => get_file(&mut data, name, &cfg.output_dir, out),
    }
}

fn get_dir_list<W: Write>(data: &mut TcpStream, out: &mut W) -> Result<Outcome> {
    writeln!(out, "Receiving directory contents.")?;
    let listing = receive_framed(data)?;
    writeln!(out, "{}", String::from_utf8_lossy(&listing))?;
    out.flush()?;
    Ok(Outcome::Listed { bytes: listing.len() })
}

fn get_file<W: Write>(data: &mut TcpStream, name: &str, dir: &Path, out: &mut W) -> Result<Outcome> {
    let contents = receive_framed(data)?;
    writeln!(
        out,
        "Receiving \"{}\". Saving file to \"{}\"",
        name,
        received_path(dir, name).display()
    )?;
    let path = write_received_file(dir, name, &contents)?;
    info!(
        "wrote {} bytes to {} (sha256 {:x})",
        contents.len(),
        path.display(),
        Sha256::digest(&contents)
    );
    writeln!(out, "File transfer complete.")?;
    out.flush()?;
    Ok(Outcome::Saved { path, bytes: contents.len() })
}
