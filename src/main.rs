//! Binary entry point for the `lzma2` command-line tool.

use std::process::ExitCode;

use lzma2::cli::arg_utils::init_nb_workers;
use lzma2::cli::args::Args;
use lzma2::cli::ops::run;
use lzma2::display::set_display_level;

fn main() -> ExitCode {
    let args = match Args::try_parse_args(std::env::args_os()) {
        Ok(a) => a,
        Err(e) => e.exit(),
    };
    set_display_level(args.display_level());

    let options = match args.stream_options(init_nb_workers()) {
        Ok(o) => o,
        Err(e) => {
            lzma2::displaylevel!(1, "lzma2: {:#}\n", e);
            return ExitCode::from(1);
        }
    };

    if run(&args, &options) == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
