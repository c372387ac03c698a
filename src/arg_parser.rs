use std::path::PathBuf;

use argparse::{ArgumentParser, Print, Store, StoreOption, StoreTrue};

pub struct ArgsOptions {
    // Target profile, the built-in profile is used when not set
    pub config_file_path: Option<PathBuf>,

    // Capture the GPU state into this file ("-" for stdout)
    pub dump_path: Option<PathBuf>,

    pub dry_run: bool,
    pub card_index: usize,
    pub verbose: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Apply a GPU tuning profile, writing only when the current \
                 state differs",
            );

            // Target profile path
            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                StoreOption,
                "The file path of the target GPU profile",
            );

            parser.refer(&mut options.dump_path).add_option(
                &["-d", "--dump"],
                StoreOption,
                "Write the current GPU state as a profile to this path \
                 (\"-\" for stdout)",
            );

            parser.refer(&mut options.dry_run).add_option(
                &["-n", "--dry-run"],
                StoreTrue,
                "Show the fields that differ from the target without \
                 writing them",
            );

            parser.refer(&mut options.card_index).add_option(
                &["-i", "--card-index"],
                Store,
                "Index of the GPU to tune",
            );

            parser.refer(&mut options.verbose).add_option(
                &["-v", "--verbose"],
                StoreTrue,
                "Log every parameter written to the GPU",
            );

            // Show version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the program version",
            );

            parser.parse_args_or_exit();
        }

        options
    }

    // Whether the dump goes to stdout instead of a file
    pub fn dump_to_stdout(&self) -> bool {
        self.dump_path
            .as_deref()
            .is_some_and(|path| path.as_os_str() == "-")
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            config_file_path: None,
            dump_path: None,
            dry_run: false,
            card_index: 0,
            verbose: false,
        }
    }
}
