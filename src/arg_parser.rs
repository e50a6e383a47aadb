use std::{
    io::{self, Write},
    path::PathBuf,
    process,
};

use argparse::{ArgumentParser, Print, StoreOption, StoreTrue};
use tracing::debug;

const DESCRIPTION: &str = "\
Show the GPUs of this machine and the processes using them.

Bars are green under the threshold and turn red past it (75% full by
default). Processes owned by your user are shown in blue. Press CTRL-C
to quit the live view.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgsOptions {
    pub compact: bool,
    pub gpus: Option<String>,
    pub interval: Option<f64>,
    pub json: bool,
    pub no_color: bool,
    pub config_file_path: Option<PathBuf>,
    pub replay_dir: Option<PathBuf>,
}

impl ArgsOptions {
    // Parse the process arguments, exit on --help, --version or bad usage
    pub fn parse() -> Self {
        let args = std::env::args().collect();

        match Self::try_parse_from(args, &mut io::stdout(), &mut io::stderr()) {
            Ok(options) => options,
            Err(code) => process::exit(code),
        }
    }

    /// Parse `args`, the program name first.
    ///
    /// `Err` carries the exit code: 0 after printing the help or the
    /// version, 2 on invalid usage.
    pub fn try_parse_from(
        args: Vec<String>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<Self, i32> {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(DESCRIPTION);

            parser.refer(&mut options.compact).add_option(
                &["-c", "--compact"],
                StoreTrue,
                "Only show the memory bar and the processes of each GPU",
            );

            parser.refer(&mut options.gpus).add_option(
                &["-g", "--gpus"],
                StoreOption,
                "Comma separated GPU indices to show, e.g. 0,2",
            );

            parser.refer(&mut options.interval).add_option(
                &["-i", "--interval"],
                StoreOption,
                "Refresh every SECS seconds instead of printing one frame",
            );

            parser.refer(&mut options.json).add_option(
                &["--json"],
                StoreTrue,
                "Print one frame as JSON",
            );

            parser.refer(&mut options.no_color).add_option(
                &["--no-color"],
                StoreTrue,
                "Do not emit terminal escape codes",
            );

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["--config"],
                StoreOption,
                "The file path of the JSON configuration file",
            );

            parser.refer(&mut options.replay_dir).add_option(
                &["--replay"],
                StoreOption,
                "Read nvidia-smi output from nvidia-smi-L.txt and nvidia-smi.txt in DIR",
            );

            // Show version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the version",
            );

            parser.parse(args, stdout, stderr)?;
        }

        Ok(options)
    }
}

// Devices picked by the user, plus the entries that named no device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub valid: Vec<u32>,
    pub invalid: Vec<String>,
}

/// Resolve the `--gpus` list against the available device indices.
///
/// Without a list every device is selected. Entries keep their order,
/// repeated ones are shown once.
pub fn select_devices(list: Option<&str>, available: &[u32]) -> Selection {
    let Some(list) = list else {
        return Selection {
            valid: available.to_vec(),
            invalid: vec![],
        };
    };

    let mut selection = Selection::default();

    for entry in list.split(',').map(str::trim) {
        match entry.parse::<u32>() {
            Ok(index) if available.contains(&index) => {
                if selection.valid.contains(&index) {
                    debug!("GPU {index} selected twice");
                } else {
                    selection.valid.push(index);
                }
            }
            _ => selection.invalid.push(entry.to_string()),
        }
    }

    selection
}
