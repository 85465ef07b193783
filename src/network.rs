extern crate net2;

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use net2::TcpBuilder;

use crate::cmd::Endpoint;
use crate::error::{Error, Result};

const ACCEPT_POLL: Duration = Duration::from_millis(10);
const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// IPv4 addresses first, so a hostname with both families binds the way
/// most servers will dial it back.
fn resolve(ep: &Endpoint) -> io::Result<Vec<SocketAddr>> {
    let mut addrs: Vec<SocketAddr> = (ep.host.as_str(), ep.port).to_socket_addrs()?.collect();
    addrs.sort_by_key(|a| !a.is_ipv4());
    if addrs.is_empty() {
        return Err(io::Error::new(ErrorKind::NotFound, format!("{} did not resolve", ep.host)));
    }
    Ok(addrs)
}

fn builder_for(addr: &SocketAddr) -> io::Result<TcpBuilder> {
    if addr.is_ipv4() { TcpBuilder::new_v4() } else { TcpBuilder::new_v6() }
}

fn try_connect(ep: &Endpoint) -> io::Result<TcpStream> {
    let mut last = None;
    for addr in resolve(ep)? {
        match builder_for(&addr).and_then(|b| b.connect(addr)) {
            Ok(s) => { return Ok(s); }
            Err(m) => { last = Some(m); }
        }
    }
    Err(last.unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no address to connect to")))
}

/// Opens the control connection. One attempt, no timeout.
pub fn build_control_stream(server: &Endpoint) -> Result<TcpStream> {
    match try_connect(server) {
        Ok(s) => {
            debug!("control channel open to {}", server);
            Ok(s)
        }
        Err(m) => Err(Error::Connection { addr: server.to_string(), source: m }),
    }
}

fn listen_on(ep: &Endpoint, backlog: i32) -> Result<TcpListener> {
    let mut last = None;
    for addr in resolve(ep)? {
        let builder = builder_for(&addr)?;
        builder.reuse_address(true)?;
        if let Err(m) = builder.bind(addr) {
            last = Some(io::Error::new(m.kind(), format!("Cannot bind to {}: {}", addr, m)));
            continue;
        }
        match builder.listen(backlog) {
            Ok(l) => { return Ok(l); }
            Err(m) => { last = Some(io::Error::new(m.kind(), format!("Listening on {} failed: {}", addr, m))); }
        }
    }
    Err(Error::Io(last.unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no address to bind"))))
}

/// Binds the single-use data listener. A port of 0 picks an ephemeral port;
/// read it back with `local_addr` before advertising.
pub fn build_data_listener(ep: &Endpoint) -> Result<TcpListener> {
    let listener = listen_on(ep, 1)?;
    debug!("data listener bound on {}", listener.local_addr()?);
    Ok(listener)
}

pub fn build_server_listener(port: u16) -> Result<TcpListener> {
    listen_on(&Endpoint::new("0.0.0.0", port), 5)
}

/// Accepts exactly one peer, consuming the listener.
///
/// A connection already queued when the deadline is checked is still
/// accepted; only an empty queue at the deadline is a timeout.
pub fn accept_once(listener: TcpListener, timeout: Duration) -> Result<(TcpStream, SocketAddr)> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                debug!("data connection from {}", peer);
                return Ok((stream, peer));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::DataTimeout(timeout));
                }
                thread::sleep(ACCEPT_POLL.min(deadline - now));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => { return Err(Error::Io(e)); }
        }
    }
}

/// Server side of the data channel: the client may still be between
/// advertising and listening, so keep dialing until `window` runs out.
pub fn connect_with_retry(ep: &Endpoint, window: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + window;
    loop {
        match try_connect(ep) {
            Ok(s) => { return Ok(s); }
            Err(m) => {
                if Instant::now() >= deadline {
                    return Err(Error::Connection { addr: ep.to_string(), source: m });
                }
                thread::sleep(CONNECT_RETRY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    #[test]
    fn accept_times_out_when_nobody_dials() {
        let listener = build_data_listener(&loopback(0)).unwrap();
        let started = Instant::now();
        match accept_once(listener, Duration::from_millis(150)) {
            Err(Error::DataTimeout(d)) => assert_eq!(d, Duration::from_millis(150)),
            other => panic!("expected timeout, got {:?}", other.map(|(_, a)| a)),
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn queued_connection_is_accepted_even_with_a_zero_window() {
        let listener = build_data_listener(&loopback(0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let _peer = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let (stream, _) = accept_once(listener, Duration::ZERO).unwrap();
        assert_eq!(stream.local_addr().unwrap().port(), port);
    }

    #[test]
    fn listener_is_released_after_one_accept() {
        let listener = build_data_listener(&loopback(0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let dialer = thread::spawn(move || TcpStream::connect(("127.0.0.1", port)).unwrap());
        let (stream, _) = accept_once(listener, Duration::from_secs(2)).unwrap();
        let client = dialer.join().unwrap();
        drop(client);
        drop(stream);
        // reuse_address lets the same data port be bound again right away
        build_data_listener(&loopback(port)).unwrap();
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        match build_control_stream(&loopback(port)) {
            Err(Error::Connection { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{}", port)),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn retry_reaches_a_late_listener() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let l = build_data_listener(&loopback(port)).unwrap();
            accept_once(l, Duration::from_secs(2)).map(|_| ()).is_ok()
        });
        connect_with_retry(&loopback(port), Duration::from_secs(2)).unwrap();
        assert!(late.join().unwrap());
    }
}
