mod cli;
mod config;
mod console;
mod git;
mod graph;
mod logging;
mod manifest;
mod measure;
mod output;
mod process;
mod provider;
mod reference;
mod resolver;
mod size;
mod tags;
mod xcodeproj;

use clap::{CommandFactory, Parser};
use cli::{AllArguments, Cli, Command, ReportFormat};
use console::Console;
use git::GitRepositoryProvider;
use manifest::SwiftPmManifestLoader;
use measure::{MeasureSettings, SizeMeasurer};
use process::ProcessRunner;
use provider::{BinarySizeProvider, DependenciesProvider, PlatformsProvider, Provider};
use reference::PackageReference;
use resolver::Resolver;
use std::path::PathBuf;
use std::sync::Arc;
use xcodeproj::PbxprojMutator;

/// Exit status after Ctrl-C, 128 + SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    let command = Cli::parse().into_command();
    let args = command.arguments().clone();
    logging::init(args.verbose);

    // Reject bad input before any network or build work
    let (reference, xcconfig) = match validate_input(&args) {
        Ok(input) => input,
        Err(e) => Cli::command()
            .error(clap::error::ErrorKind::ValueValidation, e)
            .exit(),
    };

    let result = tokio::select! {
        result = run(command, &args, reference, xcconfig) => result,
        _ = tokio::signal::ctrl_c() => {
            process::terminate_all();
            eprintln!("Interrupted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn validate_input(
    args: &AllArguments,
) -> Result<(PackageReference, Option<PathBuf>), cli::CliError> {
    Ok((args.package_reference()?, args.validated_xcconfig()?))
}

async fn run(
    command: Command,
    args: &AllArguments,
    reference: PackageReference,
    xcconfig: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::load()?;
    let console = Arc::new(Console::new(args.verbose));
    let runner = Arc::new(ProcessRunner::new(Arc::clone(&console)));

    let resolver = Resolver::new(
        GitRepositoryProvider::new(
            Arc::clone(&runner),
            args.verbose,
            Some(config.command_timeout()),
        ),
        SwiftPmManifestLoader::new(Arc::clone(&runner)),
        Arc::clone(&console),
    );

    console.start_progress(&format!("Resolving {}", reference));
    let resolved = match resolver
        .resolve(&reference, args.product_named.as_deref())
        .await
    {
        Ok(resolved) => {
            console.finish_progress(&format!("Resolved {}", resolved.reference));
            resolved
        }
        Err(e) => {
            console.fail_progress("Failed to resolve package");
            return Err(e.into());
        }
    };

    let measurer = SizeMeasurer::new(
        Arc::clone(&runner),
        PbxprojMutator,
        Arc::clone(&console),
        MeasureSettings {
            empty_app: config.empty_app.clone(),
            architecture: config.architecture.clone(),
            xcconfig,
            working_dir: std::env::current_dir()?,
            clone_timeout: config.clone_timeout(),
            verbose: args.verbose,
        },
    );
    let binary_size = BinarySizeProvider::new(measurer);

    let outcomes = match command {
        Command::BinarySize(_) => vec![binary_size.provide(&resolved).await],
        Command::Dependencies(_) => vec![DependenciesProvider.provide(&resolved).await],
        Command::Platforms(_) => vec![PlatformsProvider.provide(&resolved).await],
        Command::FullAnalyzes(_) => {
            provider::full_analysis(
                &binary_size,
                &DependenciesProvider,
                &PlatformsProvider,
                &resolved,
            )
            .await
        }
    };

    match args.report_format {
        ReportFormat::ConsoleMessage => {
            println!("{}", output::render_console(&resolved, &outcomes));
        }
        ReportFormat::JsonDump => {
            output::print_json(&output::Report::new(&resolved, &outcomes));
        }
    }

    let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    if failed > 0 {
        return Err(format!("{} of {} providers failed", failed, outcomes.len()).into());
    }
    Ok(())
}
