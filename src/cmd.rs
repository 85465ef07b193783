use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use getopts::Options;

use crate::error::{Error, Result};
use crate::files::check_request_name;

pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(3);

const CLIENT_BRIEF: &str = "Proper usage is\n\
    'ftclient [HOST] [CONTROL PORT] -g [FILENAME] [DATA PORT]' or\n\
    'ftclient [HOST] [CONTROL PORT] -l [DATA PORT]'";

const SERVER_BRIEF: &str = "Usage 'ftserver [PORT]'";

/// What the client asks the server for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Get(String),
}

impl Command {
    /// Text form sent on the control channel, without the NUL terminator.
    pub fn wire(&self) -> String {
        match self {
            Command::List => "-l".to_string(),
            Command::Get(name) => format!("-g {}", name),
        }
    }

    /// Inverse of [`Command::wire`], used by the server.
    pub fn from_wire(text: &str) -> Option<Command> {
        if text == "-l" {
            return Some(Command::List);
        }
        match text.strip_prefix("-g ") {
            Some(name) if !name.is_empty() => Some(Command::Get(name.to_string())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A fully validated client invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: Endpoint,
    /// Where the data listener binds, and what gets advertised to the server.
    pub data: Endpoint,
    pub command: Command,
    pub accept_timeout: Duration,
    pub output_dir: PathBuf,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub root: PathBuf,
    pub verbose: bool,
}

fn client_options() -> Options {
    let mut opts = Options::new();
    opts.optflag("l", "list", "list the server's directory");
    opts.optopt("g", "get", "fetch FILENAME into recvd_FILENAME", "FILENAME");
    opts.optopt("t", "timeout", "seconds to wait for the data connection (default 3)", "SECS");
    opts.optopt("a", "advertise", "host to bind and advertise for data (default: this hostname)", "HOST");
    opts.optopt("o", "output-dir", "directory for received files (default .)", "DIR");
    opts.optflag("v", "verbose", "log every protocol step");
    opts.optflag("h", "help", "print this help");
    opts
}

fn parse_port(s: &str) -> Result<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Usage("CONTROL PORT and DATA PORT must be integers".to_string()));
    }
    s.parse::<u16>()
        .map_err(|_| Error::Usage(format!("port {} is out of range (0-65535)", s)))
}

fn local_hostname() -> Result<String> {
    let name = hostname::get()?;
    name.into_string()
        .map_err(|raw| Error::Protocol(format!("hostname {:?} is not valid UTF-8", raw)))
}

/// Parses `argv` (program name first) into a [`Config`].
///
/// The free arguments are `HOST CONTROL_PORT DATA_PORT`, and exactly one of
/// `-l` or `-g FILENAME` selects the command, so the plain forms are the
/// five and six word invocations.
pub fn parse_args(argv: Vec<String>) -> Result<Config> {
    let opts = client_options();
    let usage = opts.usage(CLIENT_BRIEF);
    let matches = match opts.parse(argv.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => { return Err(Error::Usage(format!("{}\n{}", f, usage))); }
    };
    if matches.opt_present("h") {
        return Err(Error::Help(usage));
    }

    let command = match (matches.opt_present("l"), matches.opt_str("g")) {
        (true, None) => Command::List,
        (false, Some(name)) => {
            check_request_name(&name)?;
            Command::Get(name)
        }
        _ => { return Err(Error::Usage(usage)); }
    };
    if matches.free.len() != 3 {
        return Err(Error::Usage(usage));
    }

    let server_port = parse_port(&matches.free[1])?;
    let data_port = parse_port(&matches.free[2])?;

    let accept_timeout = match matches.opt_str("t") {
        None => DEFAULT_ACCEPT_TIMEOUT,
        Some(t) => match t.parse::<f64>() {
            Ok(secs) if secs > 0.0 && secs.is_finite() => Duration::from_secs_f64(secs),
            _ => { return Err(Error::Usage(format!("timeout must be a positive number of seconds, got {}", t))); }
        },
    };

    let data_host = match matches.opt_str("a") {
        Some(h) => h,
        None => local_hostname()?,
    };

    Ok(Config {
        server: Endpoint::new(matches.free[0].clone(), server_port),
        data: Endpoint::new(data_host, data_port),
        command,
        accept_timeout,
        output_dir: PathBuf::from(matches.opt_str("o").unwrap_or_else(|| ".".to_string())),
        verbose: matches.opt_present("v"),
    })
}

pub fn parse_server_args(argv: Vec<String>) -> Result<ServerConfig> {
    let mut opts = Options::new();
    opts.optopt("d", "dir", "directory to serve (default .)", "DIR");
    opts.optflag("v", "verbose", "log every protocol step");
    opts.optflag("h", "help", "print this help");
    let usage = opts.usage(SERVER_BRIEF);

    let matches = match opts.parse(argv.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => { return Err(Error::Usage(format!("{}\n{}", f, usage))); }
    };
    if matches.opt_present("h") {
        return Err(Error::Help(usage));
    }
    if matches.free.len() != 1 {
        return Err(Error::Usage(format!("Not enough parameters. {}", SERVER_BRIEF)));
    }
    let port = match matches.free[0].parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => { return Err(Error::Usage("Port must be an integer greater than zero".to_string())); }
    };

    Ok(ServerConfig {
        port,
        root: PathBuf::from(matches.opt_str("d").unwrap_or_else(|| ".".to_string())),
        verbose: matches.opt_present("v"),
    })
}
