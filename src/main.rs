use clap::{Parser, Subcommand};

mod api;
mod commands;
mod config;
mod error;
mod logging;
mod model;
mod net;
mod service;
#[cfg(test)]
mod testing;

#[derive(Parser, Debug, Clone)]
#[command(name = "arpcut", about = "Cut and restore LAN hosts by ARP spoofing")]
struct Args {
    #[command(subcommand)]
    command: ArpcutSubcommand,

    #[command(flatten)]
    timing: config::Timing,
}

#[derive(Subcommand, Debug, Clone)]
enum ArpcutSubcommand {
    /// Runs the control API and the repeater until Ctrl-C.
    Serve(config::ServeArgs),
    Arp {
        #[command(subcommand)]
        command: commands::arp::ArpSubcommand,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    return match args.command {
        ArpcutSubcommand::Serve(serve_args) => {
            logging::init(Some(&serve_args.log_file));
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::serve::serve(serve_args, args.timing))
        }
        ArpcutSubcommand::Arp { command } => {
            logging::init(None);
            commands::arp::run(command, &args.timing)
        }
    };
}
