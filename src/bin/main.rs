use clap::Parser;
use litefs::config::{AppConfig, Args};
use litefs::error::Result;
use litefs::server::Server;
use mio::Poll;
use parser::FromYaml;

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(log_path) = &args.log {
        proxy_log::set_log_file(log_path)?;
    }
    if args.debug {
        proxy_log::set_level(proxy_log::LEVEL_TRACE);
    }

    let config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            AppConfig::from_str(&content)?.merge_cli(&args)
        }
        None => AppConfig::from_args(&args),
    };

    config.display_config();

    let poll = Poll::new()?;
    let server = Server::new(config, &poll)?;
    server.run(poll)
}
