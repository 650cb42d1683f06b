use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use tpn_extract::pipeline::{defaults, ExtractOptions};
use tpn_extract::util::parse_address;

pub const LOGGING_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn expect_arg<'a>(m: &'a ArgMatches, arg: &str) -> &'a str {
    m.get_one::<String>(arg)
        .map(String::as_str)
        .unwrap_or_else(|| panic!("argument \"{}\" has to be set in CLI at all times", arg))
}

pub fn args() -> Command {
    command!()
        .about("Translate a Thumb instruction trace read from stdin into a timed Petri net")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("configure logging level to use")
                .value_name("LEVEL")
                .value_parser(LOGGING_LEVELS)
                .default_value(LOGGING_LEVELS[2])
                .global(true),
        )
        .arg(
            Arg::new("stop-address")
                .help("Addresses after which the net stops (0x hex or decimal)")
                .value_name("STOP_ADDRESS")
                .value_parser(parse_address)
                .num_args(1..)
                .action(ArgAction::Append)
                .required(true),
        )
        .arg(
            Arg::new("entry")
                .help("Address the net starts from [default: 0x8000]")
                .long("entry")
                .value_name("ADDRESS")
                .value_parser(parse_address),
        )
        .arg(
            Arg::new("output-file")
                .help("Model file to write to")
                .short('o')
                .long("output-file")
                .visible_alias("output")
                .value_name("FILE")
                .default_value(defaults::OUTPUT),
        )
        .arg(
            Arg::new("max-depth")
                .help("Maximum call nesting followed while unrolling calls [default: 64]")
                .long("max-depth")
                .value_name("NUMBER")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("core")
                .help("Core index used in guards and updates")
                .long("core")
                .value_name("EXPR")
                .default_value(defaults::CORE),
        )
        .arg(
            Arg::new("strict")
                .help("Fail on literal loads whose pool entry is missing from the trace")
                .long("strict")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mark-entry")
                .help("Put the initial token on the entry place")
                .long("mark-entry")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("program-data")
                .help("Print the memory access counts of all instructions before the functions")
                .long("program-data")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("include")
                .help("Declaration file to include in the model project")
                .long("include")
                .value_name("FILE")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("input")
                .help("Model to compose with the net as a slave")
                .long("input")
                .value_name("FILE")
                .action(ArgAction::Append),
        )
}

pub fn options(m: &ArgMatches) -> ExtractOptions {
    ExtractOptions {
        entry: m
            .get_one::<u32>("entry")
            .copied()
            .unwrap_or(defaults::ENTRY_ADDRESS),
        stop_addresses: m
            .get_many::<u32>("stop-address")
            .map(|values| values.copied().collect())
            .unwrap_or_default(),
        max_call_depth: m
            .get_one::<usize>("max-depth")
            .copied()
            .unwrap_or(defaults::MAX_CALL_DEPTH),
        strict_literals: m.get_flag("strict"),
        core: String::from(expect_arg(m, "core")),
        mark_entry: m.get_flag("mark-entry"),
        program_data: m.get_flag("program-data"),
    }
}

pub fn files(m: &ArgMatches, arg: &str) -> Vec<String> {
    m.get_many::<String>(arg)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
