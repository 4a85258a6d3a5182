use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    command_runner::CommandRunner, errors::PowerLimitError,
    privilege::PrivilegeChecker,
};

const NVIDIA_SMI: &str = "nvidia-smi";

#[cfg(windows)]
const POWERSHELL: &str = "powershell";

// Power limit assumed when the current one cannot be detected
pub const FALLBACK_POWER_LIMIT: u32 = 600;

// Bounds used to validate a request when the installed
// devices cannot be probed
const FALLBACK_MAX_GPU_INDEX: u32 = 8;
const FALLBACK_POWER_RANGE: PowerRange =
    PowerRange { min_watts: 50, max_watts: 600 };

// A single validated power limit change, immutable once constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLimitRequest {
    gpu_index: u32,
    power_limit_watts: u32,
}

impl PowerLimitRequest {
    pub fn new(gpu_index: u32, power_limit_watts: u32) -> Self {
        Self { gpu_index, power_limit_watts }
    }

    pub fn gpu_index(&self) -> u32 {
        self.gpu_index
    }

    pub fn power_limit_watts(&self) -> u32 {
        self.power_limit_watts
    }
}

// Outcome of one power limit request, produced once per call
#[derive(Debug, Clone, Serialize)]
pub struct PowerLimitResult {
    pub applied: bool,
    pub observed_limit_watts: Option<u32>,
    pub message: String,
}

// Device supported power limit range in watts, bounds inclusive
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PowerRange {
    pub min_watts: u32,
    pub max_watts: u32,
}

impl PowerRange {
    pub fn contains(&self, watts: u32) -> bool {
        watts >= self.min_watts && watts <= self.max_watts
    }
}

// Query and set GPU power limits through the vendor command line
// tool. Stateless request/response: the only data retained between
// calls is the detection metadata gathered by detect_default_limit
pub struct PowerLimitController {
    runner: Box<dyn CommandRunner>,
    privileges: Box<dyn PrivilegeChecker>,

    default_limit: u32,
    device_count: Option<u32>,
}

impl PowerLimitController {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        privileges: Box<dyn PrivilegeChecker>,
    ) -> Self {
        Self {
            runner,
            privileges,

            default_limit: FALLBACK_POWER_LIMIT,
            device_count: None,
        }
    }

    // Detect the current power limit of the first GPU and the number
    // of installed devices. Called once by the user of the controller
    // before issuing requests.
    // Detection failure is not fatal: the fallback constant is
    // returned and the failure reason logged
    pub fn detect_default_limit(&mut self) -> u32 {
        match self.query_limits() {
            Ok(limits) => {
                self.device_count = Some(limits.len() as u32);
                self.default_limit = limits[0];

                info!(
                    "Detected GPU power limit: {}W ({} device(s))",
                    self.default_limit,
                    limits.len()
                );
            }
            Err(err) => {
                warn!(
                    "Could not read the current power limit, \
                     using {}W: {}",
                    FALLBACK_POWER_LIMIT, err
                );

                self.default_limit = FALLBACK_POWER_LIMIT;
                self.device_count = None;
            }
        }

        self.default_limit
    }

    // Return the power limit detected by detect_default_limit,
    // or the fallback constant if detection never ran or failed
    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    // Return the number of installed devices, None if unknown
    pub fn device_count(&self) -> Option<u32> {
        self.device_count
    }

    pub fn has_elevated_privileges(&self) -> bool {
        self.privileges.is_elevated()
    }

    // Current power limit of every installed GPU, one entry per device
    pub fn query_limits(&self) -> Result<Vec<u32>, PowerLimitError> {
        let output = self.runner.run(
            NVIDIA_SMI,
            &["--query-gpu=power.limit", "--format=csv,noheader,nounits"],
        )?;

        if !output.success() {
            return Err(PowerLimitError::CommandFailed {
                tool: NVIDIA_SMI.to_string(),
                code: output.status,
                detail: output.detail(),
            });
        }

        let limits = output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_watts)
            .collect::<Result<Vec<u32>, PowerLimitError>>()?;

        if limits.is_empty() {
            return Err(PowerLimitError::Parse {
                output: output.stdout.trim().to_string(),
            });
        }

        Ok(limits)
    }

    // Supported power limit range of the given device
    pub fn query_power_range(
        &self,
        gpu_index: u32,
    ) -> Result<PowerRange, PowerLimitError> {
        let index = gpu_index.to_string();

        let output = self.runner.run(
            NVIDIA_SMI,
            &[
                "--query-gpu=power.min_limit,power.max_limit",
                "--format=csv,noheader,nounits",
                "-i",
                &index,
            ],
        )?;

        if !output.success() {
            return Err(PowerLimitError::CommandFailed {
                tool: NVIDIA_SMI.to_string(),
                code: output.status,
                detail: output.detail(),
            });
        }

        let line = output.stdout.lines().next().unwrap_or("");
        let mut fields = line.split(',');

        Ok(PowerRange {
            min_watts: parse_watts(fields.next().unwrap_or(""))?,
            max_watts: parse_watts(fields.next().unwrap_or(""))?,
        })
    }

    // Apply the requested power limit.
    // A single attempt per call, no retries: power limit changes are
    // idempotent and user triggered.
    // Never returns an error, failures are reported through the result
    pub fn apply_limit(&self, request: &PowerLimitRequest) -> PowerLimitResult {
        // Without elevated privileges the vendor tool would fail
        // anyway, do not even attempt the command
        if !self.has_elevated_privileges() {
            let err = PowerLimitError::PermissionDenied;

            warn!(
                "{}, cannot set GPU {} power limit",
                err,
                request.gpu_index()
            );

            return PowerLimitResult {
                applied: false,
                observed_limit_watts: None,
                message: format!(
                    "{}, GPU {} power limit left unchanged",
                    err,
                    request.gpu_index()
                ),
            };
        }

        if let Err(err) = self.validate(request) {
            warn!("Rejected power limit request: {}", err);

            return PowerLimitResult {
                applied: false,
                observed_limit_watts: None,
                message: err.to_string(),
            };
        }

        match self.run_set_command(request) {
            Ok(()) => {
                info!(
                    "GPU {} power limit set to {}W",
                    request.gpu_index(),
                    request.power_limit_watts()
                );

                PowerLimitResult {
                    applied: true,
                    observed_limit_watts: self.confirm_limit(request),
                    message: format!(
                        "GPU {} power limit set to {}W",
                        request.gpu_index(),
                        request.power_limit_watts()
                    ),
                }
            }
            Err(err) => {
                warn!(
                    "Failed to set GPU {} power limit: {}",
                    request.gpu_index(),
                    err
                );

                PowerLimitResult {
                    applied: false,
                    observed_limit_watts: None,
                    message: err.to_string(),
                }
            }
        }
    }

    // Check the request against the installed devices and the
    // supported power range. When probing fails validation degrades
    // to fixed bounds instead of rejecting the request
    fn validate(
        &self,
        request: &PowerLimitRequest,
    ) -> Result<(), PowerLimitError> {
        match self.device_count {
            Some(count) if request.gpu_index() >= count => {
                return Err(PowerLimitError::InvalidRequest {
                    reason: format!(
                        "GPU index {} out of range, {} device(s) installed",
                        request.gpu_index(),
                        count
                    ),
                });
            }
            None if request.gpu_index() > FALLBACK_MAX_GPU_INDEX => {
                return Err(PowerLimitError::InvalidRequest {
                    reason: format!(
                        "GPU index {} out of range",
                        request.gpu_index()
                    ),
                });
            }
            _ => {}
        }

        let range = self
            .query_power_range(request.gpu_index())
            .unwrap_or_else(|err| {
                debug!("Could not probe the supported power range: {}", err);

                FALLBACK_POWER_RANGE
            });

        if !range.contains(request.power_limit_watts()) {
            return Err(PowerLimitError::InvalidRequest {
                reason: format!(
                    "{}W outside the supported range {}-{}W",
                    request.power_limit_watts(),
                    range.min_watts,
                    range.max_watts
                ),
            });
        }

        Ok(())
    }

    // Invoke the vendor set command for the requested device
    #[cfg(not(windows))]
    fn run_set_command(
        &self,
        request: &PowerLimitRequest,
    ) -> Result<(), PowerLimitError> {
        let index = request.gpu_index().to_string();
        let watts = request.power_limit_watts().to_string();

        let output =
            self.runner.run(NVIDIA_SMI, &["-i", &index, "-pl", &watts])?;

        if output.success() {
            Ok(())
        } else {
            Err(PowerLimitError::CommandFailed {
                tool: NVIDIA_SMI.to_string(),
                code: output.status,
                detail: output.detail(),
            })
        }
    }

    // On Windows the tool is wrapped in an OS elevation request.
    // The captured exit status belongs to the wrapper, not to the
    // elevated nvidia-smi process
    #[cfg(windows)]
    fn run_set_command(
        &self,
        request: &PowerLimitRequest,
    ) -> Result<(), PowerLimitError> {
        let arg_list = format!(
            "\"-i {} -pl {}\"",
            request.gpu_index(),
            request.power_limit_watts()
        );

        let output = self.runner.run(
            POWERSHELL,
            &[
                "Start-Process",
                NVIDIA_SMI,
                "-ArgumentList",
                &arg_list,
                "-Verb",
                "runAs",
            ],
        )?;

        if output.success() {
            Ok(())
        } else {
            Err(PowerLimitError::CommandFailed {
                tool: POWERSHELL.to_string(),
                code: output.status,
                detail: output.detail(),
            })
        }
    }

    // Re-query the limit after a successful apply, a failed
    // confirmation only leaves the observed value unset
    fn confirm_limit(&self, request: &PowerLimitRequest) -> Option<u32> {
        let index = request.gpu_index().to_string();

        let result = self
            .runner
            .run(
                NVIDIA_SMI,
                &[
                    "--query-gpu=power.limit",
                    "--format=csv,noheader,nounits",
                    "-i",
                    &index,
                ],
            )
            .and_then(|output| {
                if !output.success() {
                    return Err(PowerLimitError::CommandFailed {
                        tool: NVIDIA_SMI.to_string(),
                        code: output.status,
                        detail: output.detail(),
                    });
                }

                parse_watts(output.stdout.lines().next().unwrap_or(""))
            });

        match result {
            Ok(watts) => Some(watts),
            Err(err) => {
                debug!("Could not confirm the new power limit: {}", err);

                None
            }
        }
    }
}

// Parse a wattage reported by the vendor tool.
// Fractional values are integer truncated, "250.00" parses to 250
fn parse_watts(field: &str) -> Result<u32, PowerLimitError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|watts| watts.is_finite() && *watts >= 0.0)
        .map(|watts| watts as u32)
        .ok_or_else(|| PowerLimitError::Parse {
            output: field.trim().to_string(),
        })
}
