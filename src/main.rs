#![warn(clippy::all, rust_2018_idioms)]

use std::process::ExitCode;

use clap::Parser;
use lambda_cloner::app::cli::Cli;
use lambda_cloner::app::clone_plan::CommandScope;
use lambda_cloner::app::cloner::{CloneOutcome, FunctionCloner};
use lambda_cloner::app::credentials::load_sdk_config;
use lambda_cloner::app::lambda_service::LambdaService;
use lambda_cloner::app::prompt::{AssumeYes, OverwritePrompt, StdinPrompt};
use lambda_cloner::app::sdk_errors::{categorize_error, ErrorCategory};
use tracing_subscriber::prelude::*;

fn init_logging(console_level: &str) {
    // Noisy SDK internals stay at warn unless RUST_LOG says otherwise
    let directives = |level: &str| {
        format!(
            "lambda_cloner={level},aws_config=warn,aws_sigv4=warn,aws_smithy_runtime=warn,\
             aws_smithy_runtime_api=warn,aws_smithy_http=warn,hyper=warn,reqwest=warn"
        )
    };
    let filter_for = |level: &str| {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::builder().parse(directives(level)))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(filter_for(console_level));

    let file_layer = open_log_file().map(|(file, log_path)| {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(move || {
                file.try_clone()
                    .map(|f| Box::new(f) as Box<dyn std::io::Write>)
                    .unwrap_or_else(|_| Box::new(std::io::sink()))
            })
            .with_ansi(false) // No ANSI colors in file
            .with_filter(filter_for("debug"));
        (layer, log_path)
    });

    let (file_layer, log_path) = match file_layer {
        Some((layer, path)) => (Some(layer), Some(path)),
        None => (None, None),
    };

    if tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Failed to set tracing subscriber");
        return;
    }

    // Bridge log crate events (reqwest, hyper) to tracing
    // This must be done AFTER setting the tracing subscriber
    let _ = tracing_log::LogTracer::init();

    if let Some(path) = log_path {
        tracing::debug!("Logging to: {:?}", path);
    }
}

/// Append-mode log file under the platform data dir, owner read/write only.
fn open_log_file() -> Option<(std::fs::File, std::path::PathBuf)> {
    let proj_dirs = directories::ProjectDirs::from("com", "", "lambda-cloner")?;
    let log_dir = proj_dirs.data_dir().join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    let log_path = log_dir.join("lambda-cloner.log");

    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
        .ok()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = file.metadata() {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
            }
        }
    }

    Some((file, log_path))
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format!(
            "lambda-cloner crashed!\n\
             Panic occurred at: {}\n\
             Details: {}\n\
             Backtrace:\n{:?}\n",
            panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string()),
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic"),
            std::backtrace::Backtrace::force_capture()
        );

        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "lambda-cloner") {
            let log_dir = proj_dirs.data_dir().join("logs");
            let _ = std::fs::create_dir_all(&log_dir);
            let crash_log_path = log_dir.join("crash.log");

            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&crash_log_path)
            {
                use std::io::Write;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "\n=== CRASH at {} ===\n{}", timestamp, crash_msg);
            }

            eprintln!("\n{}", crash_msg);
            eprintln!("Crash log written to: {:?}", crash_log_path);
        } else {
            eprintln!("\n{}", crash_msg);
        }
    }));
}

async fn run(cli: &Cli) -> anyhow::Result<CloneOutcome> {
    let config = cli.load_config()?;
    let settings = cli.client_settings(&config);
    let sdk_config = load_sdk_config(&settings).await?;

    let scope = CommandScope {
        region: sdk_config.region().map(|r| r.as_ref().to_string()),
        profile: settings.profile.clone(),
    };
    let request = cli.clone_request(&config, scope);

    let platform = LambdaService::new(&sdk_config);
    let prompt: Box<dyn OverwritePrompt> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinPrompt)
    };

    FunctionCloner::new(&platform, prompt.as_ref())
        .run(&request)
        .await
}

fn report(outcome: &CloneOutcome) -> anyhow::Result<()> {
    match outcome {
        CloneOutcome::Created { target, .. } | CloneOutcome::Updated { target, .. } => {
            let verb = if matches!(outcome, CloneOutcome::Created { .. }) {
                "Created"
            } else {
                "Updated"
            };
            println!("{}", serde_json::to_string_pretty(target)?);
            eprintln!(
                "{} {}; documents kept in {}",
                verb,
                target.function_name().unwrap_or("function"),
                outcome.workspace().display()
            );
        }
        CloneOutcome::Declined { workspace } => {
            eprintln!(
                "Not overwriting the existing function; documents kept in {}",
                workspace.display()
            );
        }
        CloneOutcome::DryRun {
            workspace,
            action,
            commands,
        } => {
            for command in commands {
                println!("{}", command);
            }
            eprintln!(
                "Dry run ({:?}); nothing was changed. Commands saved in {}",
                action,
                workspace.display()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    setup_panic_handler();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.log_level());
    tracing::info!(
        "Cloning {} to {}",
        cli.source_function,
        cli.new_function
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = runtime
        .block_on(run(&cli))
        .and_then(|outcome| report(&outcome));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("Clone failed: {:?}", err);
            eprintln!("Error: {:?}", err);
            let category = categorize_error(&err);
            if !matches!(category, ErrorCategory::Other { error_code: None }) {
                eprintln!("Hint ({}): {}", category.short_label(), category);
                if category.is_transient() {
                    eprintln!("This failure is usually temporary; nothing was rolled back, re-running is safe");
                }
            }
            ExitCode::from(1)
        }
    }
}
