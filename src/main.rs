use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use rustyline::config::Config as EditorConfig;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Editor, Helper};
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};

use minipy::lang::eval::DEFAULT_MAX_CALL_DEPTH;
use minipy::lang::parse::DEFAULT_MAX_NESTING;
use minipy::lang::runtime::{Config, Runtime};

mod repl;

use repl::ReplHelper;

const HISTORY_FILE: &str = ".minipy_history";
const PROMPT: &str = ">>> ";

#[derive(Parser)]
#[command(version, about)]
struct Opt {
    /// Show debug output
    #[arg(short, long)]
    debug: bool,
    /// Maximum depth of nested function calls
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
    /// Maximum depth of nested brackets and blocks
    #[arg(long, default_value_t = DEFAULT_MAX_NESTING)]
    max_nesting_depth: usize,
    /// Program passed in as a string
    #[arg(short, long, conflicts_with = "script")]
    command: Option<String>,
    /// Script to run. Starts an interactive session if neither this nor `-c` is given
    script: Option<PathBuf>,
}

impl Opt {
    fn runtime_config(&self, interactive: bool) -> Config {
        Config {
            interactive,
            max_nesting_depth: self.max_nesting_depth,
            max_call_depth: self.max_call_depth,
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };

    match SimpleLogger::init(filter, LogConfig::default()) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to init logger: {}", e),
    }
}

fn init_editor() -> Result<Editor<ReplHelper, DefaultHistory>> {
    let config = EditorConfig::builder().auto_add_history(true).build();
    let mut editor =
        Editor::with_config(config).context("Failed to initialize line editor")?;
    let validator = ReplHelper::new();
    editor.set_helper(Some(validator));

    Ok(editor)
}

fn init_history<H: Helper>(editor: &mut Editor<H, DefaultHistory>) {
    let _ = editor.load_history(HISTORY_FILE);
}

fn save_history<H: Helper>(editor: &mut Editor<H, DefaultHistory>) -> Result<()> {
    match editor.save_history(HISTORY_FILE) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to save history: {}", e),
    }
}

fn welcome() {
    println!("minipy v{}", env!("CARGO_PKG_VERSION"));
    println!("Enter an empty line to finish a block, Ctrl-D to quit");
    println!();
}

/// Run one program to completion, returning whether it succeeded
fn run(source: &str, config: Config) -> Result<bool> {
    let mut stdout = io::stdout();
    let ok = {
        let mut runtime = Runtime::new(&mut stdout, config);
        match runtime.eval(source) {
            Ok(_) => true,
            Err(e) => {
                eprintln!("{}", e);
                false
            }
        }
    };
    stdout.flush().context("Failed to flush stdout")?;

    Ok(ok)
}

fn repl(config: Config) -> Result<()> {
    let mut editor = init_editor()?;
    init_history(&mut editor);
    welcome();

    let mut stdout = io::stdout();
    let mut runtime = Runtime::new(&mut stdout, config);

    loop {
        match editor.readline(PROMPT) {
            Ok(input) => {
                info!("read: {}", &input);

                if let Err(e) = runtime.eval(&input) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("Press Ctrl-D to quit");
            }
            Err(ReadlineError::Eof) => {
                println!("quit");
                break;
            }
            Err(e) => {
                error!("Unexpected error: {}", e);
                println!("quit");
                break;
            }
        }
    }

    drop(runtime);
    stdout.flush().context("Failed to flush stdout")?;
    save_history(&mut editor)?;

    Ok(())
}

fn main() -> Result<()> {
    let opts = Opt::parse();
    init_logging(opts.debug)?;

    let source = match (&opts.command, &opts.script) {
        (Some(cmd), _) => cmd.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => return repl(opts.runtime_config(true)),
    };

    if !run(&source, opts.runtime_config(false))? {
        process::exit(1);
    }

    Ok(())
}
