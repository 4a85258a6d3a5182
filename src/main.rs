use std::process::exit;

use anyhow::Result;
use nvpl::{
    arg_parser::ArgsOptions, command_runner::SystemCommandRunner,
    controller::{PowerLimitController, PowerLimitRequest}, logger, privilege,
};
use serde_json::json;
use tracing::error;

fn main() -> Result<()> {
    logger::init_logging();

    // Parse the command line arguments
    let options = ArgsOptions::parse();

    let mut controller = PowerLimitController::new(
        Box::new(SystemCommandRunner),
        privilege::system_checker(),
    );

    // Read the current limit once before issuing any request
    let default_limit = controller.detect_default_limit();

    match options.power_limit {
        // Set mode
        Some(watts) => {
            let request = PowerLimitRequest::new(options.gpu_index, watts);
            let result = controller.apply_limit(&request);

            if options.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.message);
            }

            if !result.applied {
                exit(1);
            }
        }
        // Query mode
        None => match controller.query_limits() {
            Ok(limits) => {
                if options.json {
                    let report = json!({
                        "default_limit_watts": default_limit,
                        "power_limit_watts": limits,
                    });

                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for (index, watts) in limits.iter().enumerate() {
                        println!("GPU {}: {}W", index, watts);
                    }
                }
            }
            Err(err) => {
                error!("Failed to query the GPU power limits: {}", err);

                exit(1);
            }
        },
    }

    Ok(())
}
