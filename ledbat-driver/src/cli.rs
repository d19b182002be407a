// Command-line surface (spec.md section 6): role, remote peer, debug
// logging, CSV logging, test duration, and `--ledbat-<PARAM>` overrides
// forwarded into `LedbatConfig::set_named`.

use clap::{App, Arg};

pub struct Args {
    pub role: String,
    pub remote: Option<String>,
    pub debug: bool,
    pub makelog: bool,
    pub time: Option<u64>,
    pub ledbat_overrides: Vec<(String, f64)>,
}

const LEDBAT_PARAMS: &[&str] = &[
    "current-filter",
    "base-history",
    "init-cwnd",
    "mss",
    "target",
    "gain",
    "allowed-increase",
    "min-cwnd",
    "ooo-thresh",
    "sz-data",
    "t-init-ack",
    "t-init-data",
    "t-idle",
];

impl Args {
    pub fn parse<I: IntoIterator<Item = String>>(argv: I) -> Args {
        let mut app = App::new("ledbat-driver")
            .about("LEDBAT background-transfer congestion control test harness")
            .arg(
                Arg::with_name("role")
                    .long("role")
                    .help("Role of the instance {client|server}")
                    .takes_value(true)
                    .default_value("server"),
            )
            .arg(
                Arg::with_name("remote")
                    .long("remote")
                    .help("IP address of the test peer")
                    .takes_value(true),
            )
            .arg(Arg::with_name("debug").long("debug").help("Enable verbose output"))
            .arg(
                Arg::with_name("makelog")
                    .long("makelog")
                    .help("Save runtime values into a CSV file"),
            )
            .arg(
                Arg::with_name("time")
                    .long("time")
                    .help("Time to run the test, in seconds (client only)")
                    .takes_value(true),
            );

        for param in LEDBAT_PARAMS {
            let flag: &'static str = Box::leak(format!("ledbat-{}", param).into_boxed_str());
            app = app.arg(
                Arg::with_name(flag)
                    .long(flag)
                    .help("Override the LEDBAT controller constant")
                    .takes_value(true),
            );
        }

        let matches = app.get_matches_from(std::iter::once("ledbat-driver".to_string()).chain(argv));

        let mut ledbat_overrides = Vec::new();
        for param in LEDBAT_PARAMS {
            let flag = format!("ledbat-{}", param);
            if let Some(v) = matches.value_of(flag.as_str()) {
                match v.parse::<f64>() {
                    Ok(value) => ledbat_overrides.push((param.to_string(), value)),
                    Err(_) => eprintln!("ignoring --{}: '{}' is not a number", flag, v),
                }
            }
        }

        Args {
            role: matches.value_of("role").unwrap_or("server").to_string(),
            remote: matches.value_of("remote").map(|s| s.to_string()),
            debug: matches.is_present("debug"),
            makelog: matches.is_present("makelog"),
            time: matches.value_of("time").and_then(|v| v.parse().ok()),
            ledbat_overrides,
        }
    }
}
