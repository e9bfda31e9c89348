use std::{env, process::ExitCode, time::Duration};

use getopts::{Matches, Options};
use metrics_exporter_ganglia::{
    GangliaBuilder, GangliaEmitter, MetricDescriptor, SenderIdentity, Slope, ValueType,
};
use tracing::{error, info, Level};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_SERVER: &str = "127.0.0.1:8649";

/// A fully parsed command line.
#[derive(Debug)]
struct Invocation {
    identity: SenderIdentity,
    descriptor: MetricDescriptor,
    servers: Vec<String>,
    repeat: Option<u32>,
    write_timeout: Option<Duration>,
    verbose: bool,
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} --name NAME --value VALUE [options]", program);
    print!("{}", opts.usage(&brief));
}

fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("n", "name", "name of the metric", "STRING");
    opts.optopt("v", "value", "value of the metric", "STRING");
    opts.optopt(
        "t",
        "type",
        "value type: string, int16, uint16, int32, uint32, float, or double (default: string)",
        "STRING",
    );
    opts.optopt("u", "units", "unit of measure for the value", "STRING");
    opts.optopt(
        "s",
        "slope",
        "slope: zero, positive, negative, both, or unspecified (default: both)",
        "STRING",
    );
    opts.optopt("x", "tmax", "maximum seconds between metric updates (default: 60)", "INTEGER");
    opts.optopt("d", "dmax", "lifetime of the metric in seconds, 0 for unlimited (default: 0)", "INTEGER");
    opts.optopt("g", "group", "group the metric belongs to", "STRING");
    opts.optopt("S", "spoof", "report on behalf of another host, as IP:hostname", "STRING");
    opts.optopt("H", "host", "host the metric is reported from (default: 127.0.0.1)", "STRING");
    opts.optmulti("c", "server", "gmond server to send to, repeatable (default: 127.0.0.1:8649)", "HOST:PORT");
    opts.optopt("r", "repeat", "send COUNT metrics, named NAME_0 through NAME_{COUNT-1}", "COUNT");
    opts.optopt("T", "timeout", "write timeout in milliseconds", "INTEGER");
    opts.optflag("", "verbose", "log every connection and packet");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn required(matches: &Matches, name: &str) -> Result<String, String> {
    matches.opt_str(name).ok_or_else(|| format!("missing required option '--{}'", name))
}

fn parsed<T>(matches: &Matches, name: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match matches.opt_str(name) {
        Some(raw) => raw.parse().map_err(|e| format!("invalid value for '--{}': {}", name, e)),
        None => Ok(default),
    }
}

fn parse_invocation(matches: &Matches) -> Result<Invocation, String> {
    let name = required(matches, "name")?;
    let value = required(matches, "value")?;
    let value_type = parsed(matches, "type", ValueType::String)?;

    let descriptor = MetricDescriptor::new(name, value, value_type)
        .with_units(matches.opt_str("units").unwrap_or_default())
        .with_slope(parsed(matches, "slope", Slope::Both)?)
        .with_tmax(parsed(matches, "tmax", 60)?)
        .with_dmax(parsed(matches, "dmax", 0)?)
        .with_group(matches.opt_str("group").unwrap_or_default());

    let identity = SenderIdentity::new(matches.opt_str("host").unwrap_or_else(|| DEFAULT_HOST.to_owned()))
        .with_spoof(matches.opt_str("spoof").unwrap_or_default());

    let mut servers = matches.opt_strs("server");
    if servers.is_empty() {
        servers.push(DEFAULT_SERVER.to_owned());
    }

    let repeat = matches.opt_str("repeat").map(|_| parsed(matches, "repeat", 0)).transpose()?;
    let write_timeout = matches
        .opt_str("timeout")
        .map(|_| parsed(matches, "timeout", 0).map(Duration::from_millis))
        .transpose()?;

    Ok(Invocation {
        identity,
        descriptor,
        servers,
        repeat,
        write_timeout,
        verbose: matches.opt_present("verbose"),
    })
}

fn build_emitter(invocation: &Invocation) -> Result<GangliaEmitter, String> {
    let mut builder = GangliaBuilder::new()
        .with_write_timeout(invocation.write_timeout)
        .with_verbose(invocation.verbose);
    for server in &invocation.servers {
        builder = builder.with_server_address(server).map_err(|e| e.to_string())?;
    }

    builder.build().map_err(|e| e.to_string())
}

/// Expands the descriptor into the metrics to send, applying `--repeat`.
fn descriptors(invocation: &Invocation) -> Vec<MetricDescriptor> {
    let base = &invocation.descriptor;
    match invocation.repeat {
        None => vec![base.clone()],
        Some(count) => (0..count)
            .map(|i| {
                MetricDescriptor::new(format!("{}_{}", base.name(), i), base.value(), base.value_type())
                    .with_units(base.units())
                    .with_slope(base.slope())
                    .with_tmax(base.tmax())
                    .with_dmax(base.dmax())
                    .with_group(base.group().unwrap_or_default())
            })
            .collect(),
    }
}

fn run(invocation: &Invocation) -> Result<(), String> {
    let emitter = build_emitter(invocation)?;

    let mut failures = 0;
    for descriptor in descriptors(invocation) {
        let report = emitter.send_metric(&invocation.identity, &descriptor).map_err(|e| e.to_string())?;

        info!(
            name = descriptor.name(),
            servers = report.servers_connected(),
            packets_sent = report.packets_sent(),
            "Sent metric."
        );
        failures += report.failures().len();
    }

    if failures > 0 {
        return Err(format!("{} server failure(s) while sending", failures));
    }

    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("Failed to parse command line args: {}", f);
            print_usage(program, &opts);
            return ExitCode::FAILURE;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return ExitCode::SUCCESS;
    }

    let level = if matches.opt_present("verbose") { Level::TRACE } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    let invocation = match parse_invocation(&matches) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!("{}", e);
            print_usage(program, &opts);
            return ExitCode::FAILURE;
        }
    };

    match run(&invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
