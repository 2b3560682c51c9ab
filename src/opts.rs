// MIT License
//
// Copyright (c) 2019 Alasdair Armstrong
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation
// files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy,
// modify, merge, publish, distribute, sublicense, and/or sell copies
// of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use getopts::{Matches, Options};
use std::process::exit;

use bitsolve_lib::config::SolverConfig;
use bitsolve_lib::log;

fn tool_name() -> Option<String> {
    match std::env::current_exe() {
        Ok(path) => Some(path.components().last()?.as_os_str().to_str()?.to_string()),
        Err(_) => None,
    }
}

pub fn print_usage(opts: &Options, code: i32) -> ! {
    let tool = match tool_name() {
        Some(name) => name,
        None => "[tool]".to_string(),
    };
    let brief = format!("Usage: {} [options]", tool);
    eprint!("{}", opts.usage(&brief));
    exit(code)
}

pub fn common_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "config", "load solver configuration from this file", "FILE");
    opts.optopt("s", "seed", "seed for the problem generator", "N");
    opts.optopt("", "timeout", "give up on each quantified problem after this many seconds", "SECONDS");
    opts.optflag("h", "help", "print this help message");
    opts.optflagmulti("v", "verbose", "print verbose output");
    opts
}

pub struct CommonOpts {
    pub config: SolverConfig,
    pub seed: u64,
    pub timeout: Option<u64>,
}

pub fn get_or_usage<T: std::str::FromStr>(opts: &Options, matches: &Matches, name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match matches.opt_get_default(name, default) {
        Ok(v) => v,
        Err(f) => {
            eprintln!("Could not parse --{} option: {}", name, f);
            print_usage(opts, 1)
        }
    }
}

pub fn parse(opts: &Options) -> (Matches, CommonOpts) {
    let args: Vec<String> = std::env::args().collect();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(opts, 1)
        }
    };

    if matches.opt_present("help") {
        print_usage(opts, 0)
    }

    let config = if let Some(file) = matches.opt_str("config") {
        match SolverConfig::from_file(&file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                exit(1)
            }
        }
    } else {
        SolverConfig::default()
    };

    // Flags from the configuration file are kept, -v only adds to them
    log::set_verbosity(matches.opt_count("verbose"));
    log::add_flags(config.log_flags);

    let seed = get_or_usage(opts, &matches, "seed", 0);
    let timeout = match matches.opt_get::<u64>("timeout") {
        Ok(t) => t,
        Err(f) => {
            eprintln!("Could not parse --timeout option: {}", f);
            print_usage(opts, 1)
        }
    };

    (matches, CommonOpts { config, seed, timeout })
}
