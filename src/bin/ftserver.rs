use std::env;
use std::process::exit;

use env_logger::Env;
use ftclient::cmd::parse_server_args;
use ftclient::server;
use ftclient::Error;

fn main(){
    let argv: Vec<String> = env::args().collect();

    let config = match parse_server_args(argv){
        Ok(c) => c,
        Err(Error::Help(usage)) => { println!("{}", usage); exit(0); }
        Err(m) => { eprintln!("SERVER: {}", m); exit(m.exit_code()); }
    };

    let level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(m) = server::serve(&config) {
        eprintln!("SERVER: {}", m);
        exit(m.exit_code());
    }
}
