use clap::{Parser, Subcommand};
use eyre::{WrapErr, bail};
use rteams::display::{display_details, display_stats};
use rteams::loaders::Loader;
use rteams::publisher::ResultStore;
use rteams::{Config, Error, JobState, Orchestrator};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug};

const STUDENT_FILE: &str = "Student.csv";
const COMPANY_FILE: &str = "Company.csv";
const RESULT_FILE: &str = "out.json";

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Use FILE instead of config.json
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Set verbosity level
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8888")]
        listen: SocketAddr,
        /// Directory holding the input tables and the last result
        #[arg(short, long, default_value = "files")]
        data_dir: PathBuf,
        /// Stop every job after this many seconds
        #[arg(short, long)]
        time_limit: Option<u64>,
    },
    /// Solve once and print the teams
    Solve {
        #[arg(short, long, default_value = "files/Student.csv")]
        students: PathBuf,
        #[arg(short, long, default_value = "files/Company.csv")]
        projects: PathBuf,
        /// Where to store the result
        #[arg(short, long, default_value = "files/out.json")]
        output: PathBuf,
        #[arg(short, long)]
        time_limit: Option<u64>,
    },
    /// Check the input tables without solving
    Verify {
        #[arg(short, long, default_value = "files/Student.csv")]
        students: PathBuf,
        #[arg(short, long, default_value = "files/Company.csv")]
        projects: PathBuf,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    let config = Config::load(&args.config)
        .wrap_err_with(|| format!("cannot load configuration {}", args.config.display()))?;
    match args.command {
        Command::Serve {
            listen,
            data_dir,
            time_limit,
        } => {
            let orchestrator = orchestrator(
                config,
                Loader::new(data_dir.join(STUDENT_FILE), data_dir.join(COMPANY_FILE)),
                &data_dir.join(RESULT_FILE),
                time_limit,
            );
            rteams::server::serve(Arc::new(orchestrator), listen)
                .await
                .wrap_err("control surface failed")
        }
        Command::Solve {
            students,
            projects,
            output,
            time_limit,
        } => {
            let orchestrator =
                orchestrator(config, Loader::new(students, projects), &output, time_limit);
            solve(&orchestrator).await
        }
        Command::Verify { students, projects } => {
            match Loader::new(students, projects).load(&config) {
                Ok(data) => {
                    for student in &data.students {
                        debug!(%student, "student");
                    }
                    for project in &data.projects {
                        println!("  - {project}");
                    }
                    println!(
                        "{} students, {} projects, skills: {}",
                        data.students.len(),
                        data.projects.len(),
                        data.skills.join(", ")
                    );
                    Ok(())
                }
                Err(Error::Validation(e)) => {
                    for issue in &e.issues {
                        println!("  - {issue}");
                    }
                    bail!("{} issue(s) found", e.issues.len())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn orchestrator(
    config: Config,
    loader: Loader,
    output: &Path,
    time_limit: Option<u64>,
) -> Orchestrator {
    Orchestrator::new(config, loader, ResultStore::new(output))
        .with_time_limit(time_limit.map(Duration::from_secs))
}

async fn solve(orchestrator: &Orchestrator) -> eyre::Result<()> {
    let job = orchestrator.submit().await.wrap_err("cannot start job")?;
    let state = tokio::select! {
        state = job.finished() => state,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel().await;
            job.finished().await
        }
    };
    let outcome = job
        .outcome()
        .map_or_else(|| "unknown".to_owned(), |o| o.to_string());
    if let Some(record) = job.last_record() {
        display_details(&record);
    }
    if let Some(solution) = job.best_solution() {
        display_stats(job.model(), &solution);
    }
    if state == JobState::Failed {
        bail!("job failed: {outcome}");
    }
    println!("Job {}: {outcome}", job.id);
    Ok(())
}
