use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use std::env;

use anyhow::Result;
use env_logger::{Builder, Target};
use log::{LevelFilter, debug, error, info};

use rnapip::cli;
use rnapip::config::defs::{log_file_name, PipelineError, RunConfig};
use rnapip::pipelines::common::RunContext;
use rnapip::pipelines::rnaseq;
use rnapip::utils::artifacts::FsArtifactStore;
use rnapip::utils::command::{check_tools, ProcessRunner};
use rnapip::utils::system::{detect_cores_and_load, generate_run_id};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();
    let args = cli::parse();
    let run_id = generate_run_id();

    let log_level = if args.quiet {
        LevelFilter::Warn
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        });
    if args.log {
        let log_path = log_file_name(&run_id);
        let log_file = fs::File::create(&log_path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    }
    builder.init();

    if !args.quiet {
        println!("\n-------------\n RNAseq Pipeline\n-------------\n");
    }

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let (threads, cpu_load) = detect_cores_and_load(args.cpu).await;
    debug!("Using {} cores for external tools; CPU load {}%", threads, cpu_load);

    let work_dir = setup_work_dir(args.work_dir.as_deref(), &dir)?;

    let run_config = match RunConfig::from_args(&args, &work_dir, run_id, threads) {
        Ok(config) => Arc::new(config),
        Err(e) => fail(e, &run_start),
    };

    if !args.skip_tool_check {
        if let Err(e) = check_tools(&run_config).await {
            fail(e, &run_start);
        }
    }

    if args.log {
        debug!("Run {} logging to {}", run_config.run_id, run_config.log_file_name());
    }
    let ctx = RunContext::new(run_config, ProcessRunner, FsArtifactStore);
    if let Err(e) = rnaseq::run(&ctx).await {
        fail(e, &run_start);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

fn fail(e: PipelineError, run_start: &Instant) -> ! {
    error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
    std::process::exit(1);
}

/// Sets up the working directory receiving tool default outputs.
/// Relative paths are taken from `cwd`; defaults to `cwd` itself.
///
/// # Arguments
/// * `work_dir` - The `--out` argument, if any.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the working directory.
fn setup_work_dir(work_dir: Option<&str>, cwd: &Path) -> Result<PathBuf> {
    let path = match work_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() { path } else { cwd.join(path) }
        }
        None => cwd.to_path_buf(),
    };
    fs::create_dir_all(&path)?;
    Ok(path)
}
