use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{info, warn, Level};

use fenshot_rs::config::{Config, Region, DEFAULT_CONFIG_PATH, MIN_INTERVAL_MS};
use fenshot_rs::pipeline::Recognizer;
use fenshot_rs::sink::{DiskSink, NullSink, RecognitionSink};
use fenshot_rs::{calibrate, capture};

fn cli() -> Command {
    let save_squares = Arg::new("save-squares")
        .long("save-squares")
        .action(ArgAction::SetTrue)
        .help("Write square crops to the photos/ and parser/ directories");
    let templates = Arg::new("templates")
        .long("templates")
        .value_name("DIR")
        .value_parser(value_parser!(PathBuf))
        .help("Directory holding the six reference templates");

    Command::new("fenshot-rs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads pawn positions off a chessboard screenshot and prints them as FEN")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG_PATH)
                .help("JSON config file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .conflicts_with("quiet")
                .help("Log debug output to stderr"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only log warnings"),
        )
        .subcommand(
            Command::new("read")
                .about("Recognize a board image file")
                .arg(
                    Arg::new("image")
                        .required(true)
                        .value_name("IMAGE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Board image cropped to the playing surface"),
                )
                .arg(templates.clone())
                .arg(save_squares.clone()),
        )
        .subcommand(
            Command::new("watch")
                .about("Periodically capture the screen region and print the FEN when it changes")
                .arg(
                    Arg::new("region")
                        .long("region")
                        .value_name("X,Y,W,H")
                        .value_parser(value_parser!(Region))
                        .help("Capture rectangle; defaults to the configured region"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("MS")
                        .value_parser(value_parser!(u64).range(MIN_INTERVAL_MS..))
                        .help("Milliseconds between screenshots"),
                )
                .arg(templates)
                .arg(save_squares),
        )
        .subcommand(Command::new("calibrate").about("Select the board region and save it to the config"))
}

fn init_tracing(matches: &ArgMatches) {
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else if matches.get_flag("quiet") {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn make_sink(save_squares: bool, cfg: &Config) -> Box<dyn RecognitionSink> {
    if save_squares {
        Box::new(DiskSink::new(&cfg.photos_dir, &cfg.parser_dir))
    } else {
        Box::new(NullSink)
    }
}

fn apply_templates_override(cfg: &mut Config, sub: &ArgMatches) {
    if let Some(dir) = sub.get_one::<PathBuf>("templates") {
        cfg.templates_dir = dir.clone();
    }
}

fn run_read(mut cfg: Config, sub: &ArgMatches) -> Result<()> {
    apply_templates_override(&mut cfg, sub);
    let image = sub
        .get_one::<PathBuf>("image")
        .context("Missing board image argument")?;

    let recognizer = Recognizer::from_config(&cfg)?;
    let mut sink = make_sink(sub.get_flag("save-squares"), &cfg);
    let recognition = recognizer.recognize_file(image, sink.as_mut())?;

    println!("{}", recognition.fen);
    Ok(())
}

fn run_watch(mut cfg: Config, sub: &ArgMatches) -> Result<()> {
    apply_templates_override(&mut cfg, sub);
    let region = sub
        .get_one::<Region>("region")
        .copied()
        .or(cfg.region)
        .context("No capture region; run `calibrate` or pass --region")?;
    region.validate()?;
    let interval = cfg.watch_interval(sub.get_one::<u64>("interval").copied())?;

    // Template problems are fatal before the loop starts.
    let recognizer = Recognizer::from_config(&cfg)?;
    let mut sink = make_sink(sub.get_flag("save-squares"), &cfg);

    info!(%region, ?interval, "Watching board region. Press Ctrl+C to stop.");

    let mut last_fen: Option<String> = None;
    loop {
        let result = capture::capture_region(&region)
            .context("Failed to capture screenshot")
            .and_then(|board| {
                recognizer
                    .recognize(&board, sink.as_mut())
                    .context("Failed to recognize board from screenshot")
            });

        match result {
            Ok(recognition) => {
                if last_fen.as_deref() != Some(recognition.fen.as_str()) {
                    println!("{}", recognition.fen);
                    last_fen = Some(recognition.fen);
                }
            }
            Err(e) => warn!("{:#}", e),
        }

        thread::sleep(interval);
    }
}

fn run_calibrate(mut cfg: Config, config_path: &Path) -> Result<()> {
    let region = calibrate::run_calibration(cfg.region)?;
    cfg.region = Some(region);
    cfg.save(config_path)
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(&matches);

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = Config::load(&config_path)?;

    match matches.subcommand() {
        Some(("read", sub)) => run_read(cfg, sub),
        Some(("watch", sub)) => run_watch(cfg, sub),
        Some(("calibrate", _)) => run_calibrate(cfg, &config_path),
        _ => unreachable!("clap enforces a subcommand"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_read_args() {
        let m = cli()
            .try_get_matches_from(["fenshot-rs", "read", "board.png", "--save-squares", "-v"])
            .unwrap();
        let (name, sub) = m.subcommand().unwrap();
        assert_eq!(name, "read");
        assert_eq!(sub.get_one::<PathBuf>("image"), Some(&PathBuf::from("board.png")));
        assert!(sub.get_flag("save-squares"));
        assert!(m.get_flag("verbose"));
        assert_eq!(
            m.get_one::<PathBuf>("config"),
            Some(&PathBuf::from(DEFAULT_CONFIG_PATH))
        );
    }

    #[test]
    fn test_watch_args() {
        let m = cli()
            .try_get_matches_from([
                "fenshot-rs",
                "--config",
                "other.json",
                "watch",
                "--region",
                "10,20,480,480",
                "--interval",
                "250",
            ])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        assert_eq!(
            sub.get_one::<Region>("region"),
            Some(&"10,20,480,480".parse().unwrap())
        );
        assert_eq!(sub.get_one::<u64>("interval"), Some(&250));
        assert_eq!(m.get_one::<PathBuf>("config"), Some(&PathBuf::from("other.json")));
    }

    #[test]
    fn test_bad_args_rejected() {
        assert!(cli().try_get_matches_from(["fenshot-rs", "read"]).is_err());
        assert!(cli()
            .try_get_matches_from(["fenshot-rs", "watch", "--region", "1,2,3"])
            .is_err());
        assert!(cli()
            .try_get_matches_from(["fenshot-rs", "watch", "--interval", "10"])
            .is_err());
        assert!(cli()
            .try_get_matches_from(["fenshot-rs", "read", "b.png", "-v", "-q"])
            .is_err());
    }

    #[test]
    fn test_templates_override() {
        let m = cli()
            .try_get_matches_from(["fenshot-rs", "read", "b.png", "--templates", "sets/lichess"])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        let mut cfg = Config::default();
        apply_templates_override(&mut cfg, sub);
        assert_eq!(cfg.templates_dir, PathBuf::from("sets/lichess"));
    }
}
