//! `prov-runner` command line: `simulate` and `check-config`

use clap::{value_parser, Arg, ArgAction, Command};
use prov_runner::{check_config, init_tracing, render_report, simulate, SimulateOptions};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("prov-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Idempotent entity provisioning runner")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a batch against a simulated console")
                .arg(
                    Arg::new("rows")
                        .long("rows")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Rows to provision (.yaml, .yml or .json)"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine configuration (TOML)"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(PathBuf))
                        .help("Entities present before the run (.yaml, .yml or .json)"),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("Rows per listing page"),
                )
                .arg(
                    Arg::new("listing-lag")
                        .long("listing-lag")
                        .default_value("0")
                        .value_parser(value_parser!(u32))
                        .help("Listing refreshes before a written row shows up"),
                )
                .arg(
                    Arg::new("fast")
                        .long("fast")
                        .action(ArgAction::SetTrue)
                        .help("Zero all pauses when no config is given"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate an engine configuration file")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine configuration (TOML)"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let mut options = SimulateOptions::new(
                args.get_one::<PathBuf>("rows")
                    .cloned()
                    .unwrap_or_default(),
            );
            options.config = args.get_one::<PathBuf>("config").cloned();
            options.seed = args.get_one::<PathBuf>("seed").cloned();
            options.page_size = args.get_one::<usize>("page-size").copied().unwrap_or(10);
            options.listing_lag = args.get_one::<u32>("listing-lag").copied().unwrap_or(0);
            options.fast = args.get_flag("fast");

            let report = simulate(&options).await?;
            if args.get_flag("json") {
                println!("{}", report.to_json_pretty()?);
            } else {
                print!("{}", render_report(&report));
            }

            std::process::exit(i32::from(report.has_failures()));
        }
        Some(("check-config", args)) => {
            let path = args
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_default();
            let config = check_config(&path)?;
            println!("{} is valid", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
