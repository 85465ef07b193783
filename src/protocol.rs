//! Wire format shared by ftclient and ftserver.
//!
//! ```text
//! control, client -> server:  "-l\0" | "-g <filename>\0"
//! control, server -> client:  "ACK" | <error text>
//! control, client -> server:  "<host>|<port>\0"
//! data,    server -> client:  "<decimal length>\0" | <error text>
//! data,    client -> server:  "ACK\0"
//! data,    server -> client:  <length bytes of payload>
//! ```

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};

use log::debug;

use crate::cmd::{Command, Endpoint};
use crate::error::{Error, Result};

pub const NUL: u8 = 0;
pub const CONTROL_ACK: &str = "ACK";
pub const DATA_ACK: &[u8] = b"ACK\0";
pub const INVALID_COMMAND: &str = "INVALID COMMAND";
pub const FILE_NOT_FOUND: &str = "FILE NOT FOUND";

pub const CONTROL_REPLY_MAX: usize = 1024;
pub const HEADER_MAX: u64 = 127;
pub const RECV_CHUNK: usize = 1024;
pub const COMMAND_MAX: u64 = 1024;
pub const ADDRESS_MAX: u64 = 128;

fn write_terminated<W: Write>(w: &mut W, text: &str) -> Result<()> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(NUL);
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}

/// Reads up to `max` bytes, stopping after the first NUL. The terminator is
/// not part of the result; a peer that closes without one is tolerated.
pub fn read_terminated<R: BufRead>(r: &mut R, max: u64) -> Result<String> {
    let mut buf = Vec::new();
    r.by_ref().take(max).read_until(NUL, &mut buf)?;
    Ok(decode(&buf))
}

pub fn send_command<W: Write>(w: &mut W, command: &Command) -> Result<()> {
    let text = command.wire();
    debug!("sending command {:?}", text);
    write_terminated(w, &text)
}

/// Waits for the control-channel go-ahead. Any other reply is the server's
/// reason for refusing, reported together with its address.
pub fn await_ack<R: Read>(r: &mut R, server: &Endpoint) -> Result<()> {
    let mut buf = [0u8; CONTROL_REPLY_MAX];
    let n = loop {
        match r.read(&mut buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => { return Err(Error::Io(e)); }
        }
    };
    if n == 0 {
        return Err(Error::Protocol(format!("{} closed the control connection without replying", server)));
    }
    let reply = decode(&buf[..n]);
    if reply == CONTROL_ACK {
        debug!("{} acknowledged the command", server);
        return Ok(());
    }
    Err(Error::ServerRejection { server: server.to_string(), message: reply })
}

pub fn advertise_self<W: Write>(w: &mut W, data: &Endpoint) -> Result<()> {
    debug!("advertising data address {}|{}", data.host, data.port);
    write_terminated(w, &format!("{}|{}", data.host, data.port))
}

/// Reads exactly `total` bytes in `RECV_CHUNK` pieces, never past the frame.
pub fn read_exact_len<R: Read>(r: &mut R, total: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(total.min(1 << 20) as usize);
    let mut chunk = [0u8; RECV_CHUNK];
    while (data.len() as u64) < total {
        let want = (total - data.len() as u64).min(RECV_CHUNK as u64) as usize;
        match r.read(&mut chunk[..want]) {
            Ok(0) => {
                return Err(Error::Protocol(format!(
                    "data connection closed after {} of {} bytes", data.len(), total
                )));
            }
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => { return Err(Error::Io(e)); }
        }
    }
    Ok(data)
}

/// Takes the length header from a single receive: everything up to the
/// first NUL, or all of it when the sender sent no terminator, capped at
/// `HEADER_MAX`. Bytes after the header stay buffered for the body.
///
/// `None` means the peer closed before sending anything.
pub fn read_header<R: BufRead>(r: &mut R) -> Result<Option<String>> {
    let (header, used) = loop {
        let buf = match r.fill_buf() {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => { return Err(Error::Io(e)); }
        };
        if buf.is_empty() {
            return Ok(None);
        }
        let window = &buf[..buf.len().min(HEADER_MAX as usize)];
        break match window.iter().position(|&b| b == NUL) {
            Some(end) => (decode(&window[..end]), end + 1),
            None => (decode(window), window.len()),
        };
    };
    r.consume(used);
    Ok(Some(header))
}

/// Client side of a framed transfer on the data channel.
///
/// A header that is not a decimal length is the server's error text; in
/// that case nothing is acknowledged and no body is read.
pub fn receive_framed<S: Read + Write>(stream: &mut S) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(stream);
    let header = match read_header(&mut reader)? {
        Some(h) => h,
        None => {
            return Err(Error::Protocol("data connection closed before the length header".to_string()));
        }
    };
    let total = match header.trim().parse::<u64>() {
        Ok(n) => n,
        Err(_) if header.trim().is_empty() => {
            return Err(Error::Protocol(format!("empty length header {:?}", header)));
        }
        Err(_) => { return Err(Error::ServerData(header)); }
    };
    debug!("expecting {} bytes", total);
    reader.get_mut().write_all(DATA_ACK)?;
    reader.get_mut().flush()?;
    read_exact_len(&mut reader, total)
}

pub fn read_command<R: BufRead>(r: &mut R) -> Result<String> {
    read_terminated(r, COMMAND_MAX)
}

pub fn read_data_address<R: BufRead>(r: &mut R) -> Result<Endpoint> {
    let text = read_terminated(r, ADDRESS_MAX)?;
    parse_data_address(&text)
        .ok_or_else(|| Error::Protocol(format!("malformed data address {:?}", text)))
}

pub fn parse_data_address(text: &str) -> Option<Endpoint> {
    let (host, port) = text.split_once('|')?;
    if host.is_empty() {
        return None;
    }
    let port = port.trim().parse::<u16>().ok()?;
    Some(Endpoint::new(host, port))
}

/// Control-channel reply from the server; sent without a terminator.
pub fn send_reply<W: Write>(w: &mut W, text: &str) -> Result<()> {
    w.write_all(text.as_bytes())?;
    w.flush()?;
    Ok(())
}

/// Sends error text in place of a length header.
pub fn send_data_error<W: Write>(w: &mut W, message: &str) -> Result<()> {
    write_terminated(w, message)
}

/// Server side of a framed transfer: header, wait for "ACK", then the body.
pub fn send_framed<S: Read + Write>(stream: &mut S, payload: &[u8]) -> Result<()> {
    write_terminated(stream, &payload.len().to_string())?;
    let ack = {
        let mut reader = BufReader::new(&mut *stream);
        read_terminated(&mut reader, DATA_ACK.len() as u64)?
    };
    if ack != CONTROL_ACK {
        return Err(Error::Protocol(format!("peer did not acknowledge the header, got {:?}", ack)));
    }
    stream.write_all(payload)?;
    stream.flush()?;
    debug!("sent {} bytes", payload.len());
    Ok(())
}
