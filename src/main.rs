use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use gpu_tune::{
    amdgpu::{AmdgpuDevice, DRM_PATH},
    arg_parser::ArgsOptions,
    gpu_state::GpuState,
    logger,
    notification::{self, Notice},
    reconciler::{Outcome, Reconciler},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    logger::init_logging(args_options.verbose);

    // Dump and dry run only read the device, the desktop user is not
    // notified about them
    if args_options.dump_path.is_some() {
        return exit_code(dump(&args_options));
    }

    if args_options.dry_run {
        return exit_code(dry_run(&args_options));
    }

    let result = apply(&args_options);
    let notice = Notice::for_result(&result);

    let code = exit_code(result.map(|outcome| {
        info!("Run finished: {:?}", outcome);
    }));

    notification::notify(notice).await;

    code
}

fn apply(args_options: &ArgsOptions) -> Result<Outcome> {
    let target = load_target(args_options)?;
    let device = open_device(args_options)?;

    Reconciler::new(&device)
        .run(&target)
        .with_context(|| format!("Failed to tune {}", device.card()))
}

fn dry_run(args_options: &ArgsOptions) -> Result<()> {
    let target = load_target(args_options)?;
    let device = open_device(args_options)?;

    let differences = Reconciler::new(&device)
        .plan(&target)
        .with_context(|| format!("Failed to read {}", device.card()))?;

    if differences.is_empty() {
        info!("Current GPU state matches target, nothing would be written");
    } else {
        for path in &differences {
            info!("Would write {path}");
        }
    }

    Ok(())
}

fn dump(args_options: &ArgsOptions) -> Result<()> {
    let device = open_device(args_options)?;

    let state = Reconciler::new(&device)
        .capture()
        .with_context(|| format!("Failed to capture {}", device.card()))?;

    if args_options.dump_to_stdout() {
        println!("{}", state.to_json_pretty()?);
    } else if let Some(path) = &args_options.dump_path {
        state.save(path)?;
        info!("GPU state written to {:?}", path);
    }

    Ok(())
}

fn load_target(args_options: &ArgsOptions) -> Result<GpuState> {
    match &args_options.config_file_path {
        Some(path) => GpuState::load(path)
            .with_context(|| "Failed to load the target profile"),
        None => {
            info!("No profile given, using the built-in profile");
            Ok(GpuState::default_target())
        }
    }
}

fn open_device(args_options: &ArgsOptions) -> Result<AmdgpuDevice> {
    AmdgpuDevice::open(Path::new(DRM_PATH), args_options.card_index)
        .with_context(|| "Failed to open the GPU")
}

fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            for e in err.chain() {
                error!("{e}");
            }

            ExitCode::FAILURE
        }
    }
}
