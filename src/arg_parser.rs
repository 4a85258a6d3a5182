use argparse::{ArgumentParser, Print, Store, StoreOption, StoreTrue};

pub struct ArgsOptions {
    pub gpu_index: u32,
    pub power_limit: Option<u32>,
    pub json: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Query and set NVIDIA GPU power limits through nvidia-smi",
            );

            // Target GPU index
            parser.refer(&mut options.gpu_index).add_option(
                &["-i", "--index"],
                Store,
                "The index of the target GPU",
            );

            // Requested power limit, query only when omitted
            parser.refer(&mut options.power_limit).add_option(
                &["-p", "--power-limit"],
                StoreOption,
                "The power limit to apply in watts, omit to only query",
            );

            // Machine readable output
            parser.refer(&mut options.json).add_option(
                &["--json"],
                StoreTrue,
                "Print the outcome as Json",
            );

            // Show utility version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the utility version"
            );

            parser.parse_args_or_exit();
        }

        options
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            gpu_index: 0,
            power_limit: None,
            json: false,
        }
    }
}
