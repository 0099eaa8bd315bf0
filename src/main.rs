use std::io::{self, Write};

use cgi_echo::cgi::{EnvironmentReader, ProcessEnv, RequestHandler};
use cgi_echo::config::{self, Config};
use cgi_echo::logger::{self, ConsoleTarget};
use cgi_echo::server;

const USAGE: &str = "\
Usage: cgi-echo [--serve] [--config <path>] [--dump-config]

Without --serve, handles one CGI request from the process environment,
stdin and stdout.

Options:
  --serve            Run as an HTTP gateway until SIGINT/SIGTERM
  --config <path>    Config file (default: cgi-echo.toml, optional)
  --dump-config      Print the effective configuration and exit
  -h, --help         Show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cgi,
    Serve,
    DumpConfig,
    Help,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    mode: Mode,
    config_path: String,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args, String> {
    let mut parsed = Args {
        mode: Mode::Cgi,
        config_path: config::DEFAULT_CONFIG_PATH.to_string(),
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serve" => parsed.mode = Mode::Serve,
            "--dump-config" => parsed.mode = Mode::DumpConfig,
            "-h" | "--help" => return Ok(Args { mode: Mode::Help, ..parsed }),
            "--config" => {
                parsed.config_path = args
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    parsed.config_path = path.to_string();
                } else {
                    return Err(format!("Unknown argument: {other}"));
                }
            }
        }
    }
    Ok(parsed)
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if args.mode == Mode::Help {
        println!("{USAGE}");
        return;
    }

    let config = match Config::load_from(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            logger::log_error(&format!("Failed to load configuration: {e}"));
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate(args.mode == Mode::Serve) {
        logger::log_error(&format!("Invalid configuration: {e}"));
        std::process::exit(1);
    }

    let status = match args.mode {
        Mode::Cgi => run_cgi(&config),
        Mode::DumpConfig => dump_config(&config),
        Mode::Serve => match run_serve(&config) {
            Ok(()) => 0,
            Err(e) => {
                logger::log_error(&format!("Gateway failed: {e}"));
                1
            }
        },
        Mode::Help => 0,
    };
    std::process::exit(status);
}

/// One CGI request over the real environment and stdio
fn run_cgi(config: &Config) -> i32 {
    if let Err(e) = logger::init(config, ConsoleTarget::Stderr) {
        eprintln!("[ERROR] Failed to initialize logger: {e}");
        return 1;
    }

    let handler = RequestHandler::new(config.cgi.handler_options());
    let mut input = io::stdin().lock();
    let mut output = io::BufWriter::new(io::stdout().lock());

    match handler.handle(&ProcessEnv, &mut input, &mut output) {
        Ok(outcome) => {
            logger::log_invocation(&ProcessEnv.var_or_empty("REQUEST_METHOD"), &outcome);
            0
        }
        Err(e) => {
            logger::log_error(&format!("CGI invocation failed: {e}"));
            1
        }
    }
}

fn dump_config(config: &Config) -> i32 {
    match config.to_toml() {
        Ok(text) => {
            let mut stdout = io::stdout().lock();
            if writeln!(stdout, "{text}").is_err() {
                return 1;
            }
            0
        }
        Err(e) => {
            logger::log_error(&format!("Failed to serialize configuration: {e}"));
            1
        }
    }
}

fn run_serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    logger::init(config, ConsoleTarget::Stdout)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = config.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(server::run(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(ToString::to_string))
    }

    #[test]
    fn test_no_args_is_cgi_mode() {
        let parsed = args(&[]).unwrap();
        assert_eq!(parsed.mode, Mode::Cgi);
        assert_eq!(parsed.config_path, config::DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn test_serve_with_config() {
        let parsed = args(&["--serve", "--config", "/etc/cgi-echo.toml"]).unwrap();
        assert_eq!(parsed.mode, Mode::Serve);
        assert_eq!(parsed.config_path, "/etc/cgi-echo.toml");
    }

    #[test]
    fn test_config_equals_form() {
        let parsed = args(&["--config=local"]).unwrap();
        assert_eq!(parsed.config_path, "local");
    }

    #[test]
    fn test_dump_config_and_help() {
        assert_eq!(args(&["--dump-config"]).unwrap().mode, Mode::DumpConfig);
        assert_eq!(args(&["--serve", "-h"]).unwrap().mode, Mode::Help);
    }

    #[test]
    fn test_errors() {
        assert!(args(&["--config"]).unwrap_err().contains("requires a path"));
        assert!(args(&["--bogus"]).unwrap_err().contains("--bogus"));
    }
}
