//! Command-line entry point (§6 "CLI"): one positional story-file path plus
//! `-v`/`--verbose`, `-D`/`--debug`, `-c`/`--conf PATH`, `-T`/`--transcript
//! PATH`. A hand-rolled argument loop rather than pulling in `clap`.

use gruesome::config::Config;
use gruesome::display_crossterm::CrosstermDisplay;
use gruesome::display_headless::HeadlessDisplay;
use gruesome::display_trait::ZMachineDisplay;
use gruesome::interpreter::{Interpreter, RunOutcome};
use gruesome::savestore::FileSaveStore;
use gruesome::story_file::StoryFile;
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    story_path: PathBuf,
    verbose: bool,
    debug: bool,
    conf_path: Option<PathBuf>,
    transcript_path: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!(
        "usage: gruesome [-v|--verbose] [-D|--debug] [-c|--conf PATH] [-T|--transcript PATH] STORY_FILE"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut story_path = None;
    let mut verbose = false;
    let mut debug = false;
    let mut conf_path = None;
    let mut transcript_path = None;

    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            "-D" | "--debug" => debug = true,
            "-c" | "--conf" => {
                conf_path = Some(PathBuf::from(raw.next().unwrap_or_else(|| usage())));
            }
            "-T" | "--transcript" => {
                transcript_path = Some(PathBuf::from(raw.next().unwrap_or_else(|| usage())));
            }
            _ if story_path.is_none() => story_path = Some(PathBuf::from(arg)),
            _ => usage(),
        }
    }

    Args {
        story_path: story_path.unwrap_or_else(|| usage()),
        verbose,
        debug,
        conf_path,
        transcript_path,
    }
}

fn run() -> Result<(), String> {
    let args = parse_args();

    let log_level = if args.verbose || args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match &args.conf_path {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default_config(),
    };

    let story = StoryFile::load(&args.story_path).map_err(|e| e.to_string())?;

    let interactive = atty::is(atty::Stream::Stdout);
    let screen: Box<dyn ZMachineDisplay> = if interactive {
        Box::new(CrosstermDisplay::new().map_err(|e| e.to_string())?)
    } else {
        Box::new(HeadlessDisplay::new().map_err(|e| e.to_string())?)
    };
    let save_store = Box::new(FileSaveStore::new());

    let mut interpreter = Interpreter::new(
        story,
        &args.story_path,
        screen,
        save_store,
        args.transcript_path.as_deref(),
    )
    .map_err(|e| e.to_string())?;

    interpreter.configure_display(&config);
    if args.debug {
        interpreter.enable_tracing();
    }

    match interpreter.run().map_err(|e| e.to_string())? {
        RunOutcome::Quit => Ok(()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("gruesome: {message}");
            ExitCode::FAILURE
        }
    }
}
