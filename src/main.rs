use std::{collections::BTreeMap, process::ExitCode};

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info, LevelFilter};
use serde::Serialize;

use gadget::{
    cli::{Cli, Commands},
    commands,
    engine::{self, DiskProbe, LsblkProbe, MatchOptions},
    FileLog, MultiLogger,
};
use gadget_api::{
    config::{Model, ModelConstraints, ModelGrade},
    error::{ExecutionError, GadgetError, GadgetResultExt, ReportError},
};
use osutils::findmnt::FindMnt;

fn print_yaml(value: &impl Serialize) -> Result<(), GadgetError> {
    let rendered = serde_yaml::to_string(value).structured(ExecutionError::RenderOutput)?;
    print!("{rendered}");
    Ok(())
}

fn run_gadget(args: &Cli) -> Result<(), GadgetError> {
    info!("Gadget version: {}", gadget::GADGET_VERSION);

    match &args.command {
        Commands::Validate {
            gadget,
            classic,
            grade,
        } => {
            let model = (*classic || grade.is_some()).then(|| ModelConstraints {
                classic: *classic,
                grade: grade.unwrap_or(ModelGrade::Unset),
            });
            let info = commands::load_gadget(
                gadget,
                model.as_ref().map(|m| m as &dyn Model),
            )?;
            let laid_out = commands::layout(&info, None)?;
            info!(
                "Gadget '{}' is valid, {} volume(s) laid out",
                gadget.display(),
                laid_out.len()
            );
            Ok(())
        }

        Commands::Layout { gadget, volume } => {
            let info = commands::load_gadget(gadget, None)?;
            print_yaml(&commands::layout(&info, volume.as_deref())?)
        }

        Commands::Match {
            gadget,
            disk,
            device,
            volume,
            strict,
            allow_implicit_system_data,
            encrypted,
            expandable_roles,
            traits_dir,
            locations,
        } => {
            let info = commands::load_gadget(gadget, None)?;
            let volume = commands::select_volume(&info, volume.as_deref())?;

            let on_disk = match (disk, device) {
                (Some(path), _) => commands::load_disk(path)?,
                (None, Some(device)) => LsblkProbe.probe(device)?,
                (None, None) => {
                    return Err(GadgetError::internal("No disk description or device given"))
                }
            };

            let options = MatchOptions {
                assume_creatable_partitions_created: *strict,
                allow_implicit_system_data: *allow_implicit_system_data,
                expected_structure_encryption: encrypted
                    .iter()
                    .map(|option| commands::parse_encryption_option(option))
                    .collect::<Result<BTreeMap<_, _>, _>>()?,
                expandable_roles: expandable_roles.iter().copied().collect(),
            };

            let mounts = if *locations {
                Some(FindMnt::run().structured(ExecutionError::ListMounts)?)
            } else {
                None
            };

            let report = commands::match_disk(
                volume,
                &on_disk,
                &options,
                mounts.as_ref().map(|m| m as &dyn engine::MountLookup),
                traits_dir.as_deref(),
            )?;
            print_yaml(&report)
        }

        Commands::CheckUpdate { old, new } => {
            commands::check_update(old, new)?;
            info!(
                "Gadget '{}' can replace '{}'",
                new.display(),
                old.display()
            );
            Ok(())
        }
    }
}

fn setup_logging(args: &Cli) -> Result<(), Error> {
    let mut multilogger = MultiLogger::new()
        // Add regular env_logger to output to stderr
        .with_logger(Box::new(
            env_logger::builder()
                .format_timestamp(None)
                .filter_level(args.verbosity)
                .build(),
        ))
        .with_max_level(LevelFilter::Trace)
        // Command runner traces carry whole lsblk reports
        .with_global_filter("osutils::exe", LevelFilter::Debug);

    if let Some(log_file) = &args.log_file {
        multilogger.add_logger(FileLog::new(log_file).into_logger());
    }

    multilogger.init().context("Logger already registered")?;

    Ok(())
}

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    // Initialize the loggers
    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    let res = run_gadget(&args).message(format!("Failed to execute '{}' command", args.command));
    if let Err(e) = res {
        // return error if requested
        if let Some(error_path) = args.error.as_ref() {
            if let Err(e2) = std::fs::write(
                error_path,
                serde_yaml::to_string(&e).unwrap_or_default(),
            ) {
                error!("Failed to write error to file: {e2}");
            }
        }

        error!("Gadget failed: {e:?}");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}
