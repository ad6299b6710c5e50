mod cli;
mod settings;
mod simulate;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::Command;

fn init_logging(directive: &str) {
    let filter = match directive.parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::new("huddle=info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let config = match huddle_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("huddle: {e}");
            std::process::exit(2);
        }
    };

    let directive = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(directive);
    tracing::debug!(schema = huddle_config::CONFIG_SCHEMA_VERSION, "config loaded");

    let result = match args.command {
        Command::Config => {
            println!("{}", huddle_config::config_to_json(&config));
            Ok(())
        }
        Command::Simulate(opts) => simulate::run(settings::room_settings(&config), opts).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "huddle failed");
        eprintln!("huddle: {e}");
        std::process::exit(1);
    }
}
