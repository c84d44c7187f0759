use std::fs;
use std::path;
use std::process;

use clap::ArgEnum;
use env_logger;
use log;

use tape_sort::{LineRecordCodec, SortOutput, TapeSorter, TapeSorterBuilder};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let block_size: usize = arg_parser.value_of_t_or_exit("block_size");

    let input = arg_parser.value_of("input").expect("value is required");
    let output = arg_parser.value_of("output");

    // sorting in place (no separate output file) needs the input writable too
    let mut input_stream = match fs::OpenOptions::new()
        .read(true)
        .write(output.is_none())
        .open(input)
    {
        Ok(file) => file,
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let mut output_stream = match output {
        Some(output) => match fs::File::create(output) {
            Ok(file) => Some(file),
            Err(err) => {
                log::error!("output file creation error: {}", err);
                process::exit(1);
            }
        },
        None => None,
    };

    let mut sorter_builder = TapeSorterBuilder::new().with_block_size(block_size);
    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: TapeSorter<String, (), LineRecordCodec> = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let destination = match output_stream.as_mut() {
        Some(file) => SortOutput::File(file),
        None => SortOutput::InPlace,
    };

    let result = match order {
        Order::Asc => sorter.sort_by(&mut input_stream, destination, &(), |a, b, _| a.cmp(b)),
        Order::Desc => sorter.sort_by(&mut input_stream, destination, &(), |a, b, _| b.cmp(a)),
    };

    if let Err(err) = result {
        log::error!("data sorting error: {}", err);
        process::exit(1);
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("tape-sort")
        .about("external merge sorter for newline-delimited text files")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file; if omitted the input file is sorted in place")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary tapes")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("block_size")
                .short('b')
                .long("block-size")
                .help("number of records sorted in memory at a time")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(()),
                    Ok(_) => Err("block size must be at least 1 record".to_string()),
                    Err(err) => Err(format!("block size format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
