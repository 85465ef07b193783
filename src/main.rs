/************************************************************
 ************************ftclient***************************
 ***********************************************************
 ****ask over one socket, get the answer on another one*****
 ***********************************************************
 ***usage:   ftclient HOST CONTROL_PORT -l DATA_PORT*********
 ***         ftclient HOST CONTROL_PORT -g FILE DATA_PORT****
 ***********************************************************
 ************************theAester**************************
 **********************************************************/

use std::env;
use std::io;
use std::process::exit;

use env_logger::Env;
use ftclient::client;
use ftclient::cmd::parse_args;
use ftclient::Error;

fn main(){
    let argv: Vec<String> = env::args().collect();

    let config = match parse_args(argv){
        Ok(c) => c,
        Err(Error::Help(usage)) => { println!("{}", usage); exit(0); }
        Err(m) => { eprintln!("CLIENT: {}", m); exit(m.exit_code()); }
    };

    let level = if config.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    // sockets are closed by the time run returns, whichever way it went
    let result = client::run(&config, &mut io::stdout().lock());
    if let Err(m) = result {
        eprintln!("CLIENT: {}", m);
        exit(m.exit_code());
    }
}
