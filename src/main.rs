use std::path::{Path, PathBuf};

use clap::{builder::BoolishValueParser, Parser};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use lc3vm::{Image, Machine, RunState, Terminal};

/// Run one or more binary LC3 images, starting at 0x3000.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// `.obj` images to load in order; later images overwrite earlier ones
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long, env = "LC3VM_MINIMAL", value_parser = BoolishValueParser::new())]
    minimal: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::init();

    let minimal = args.minimal;

    let mut state = RunState::new();
    for path in &args.images {
        if !minimal {
            file_message(MsgColor::Green, "Loading", path);
        }
        Image::read(path)?.load_into(&mut state);
    }

    if !minimal {
        message(MsgColor::Cyan, "Running", "loaded images");
    }
    {
        // Terminal is restored when the machine is dropped, or by the handler on a signal
        lc3vm::install_interrupt_handler().into_diagnostic()?;
        let console = Terminal::new(minimal).into_diagnostic()?;
        let mut machine = Machine::new(state, console);
        machine.run();
    }

    if !minimal {
        message(MsgColor::Green, "Completed", "program halted");
    }
    Ok(())
}

enum MsgColor {
    Green,
    Cyan,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("image {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
    };
    eprintln!("{left:>12} {right}");
}
