//! Agent Factory CLI - run batches against a console server from a terminal.

use std::io::Write;

use clap::{Parser, Subcommand};

use factory_client::HttpClient;
use factory_core::{BatchResult, RunBatchBody, StreamEvent};

/// Agent Factory CLI - batch console client
#[derive(Parser)]
#[command(name = "factory")]
#[command(about = "CLI for the Agent Factory batch console", long_about = None)]
struct Cli {
    /// Console server address
    #[arg(short, long, env = "FACTORY_ADDR", default_value = "http://127.0.0.1:8890")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is up
    Health,

    /// Show installed tools and deploy auth
    Requirements,

    /// Store the deploy token on the server
    #[command(name = "save-token")]
    SaveToken {
        /// Token value
        token: String,
    },

    /// Run a batch
    Run {
        /// Number of apps to build (1-100)
        #[arg(short, long)]
        count: u32,

        /// Agent command template
        #[arg(long = "command")]
        command_template: String,

        /// Deploy token (defaults to the one stored on the server)
        #[arg(long)]
        token: Option<String>,

        /// Directory the driver writes its runs into
        #[arg(long)]
        work_root: Option<String>,

        /// Per-app timeout in seconds (60-7200)
        #[arg(long)]
        timeout: Option<u64>,

        /// Wait for the final result instead of streaming output
        #[arg(long)]
        buffered: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = HttpClient::new(&cli.addr);

    match cli.command {
        Commands::Health => {
            if client.health().await? {
                println!("ok");
            } else {
                println!("unhealthy");
                std::process::exit(1);
            }
        }
        Commands::Requirements => {
            let requirements = client.requirements().await?;
            println!("{}", serde_json::to_string_pretty(&requirements)?);
        }
        Commands::SaveToken { token } => {
            client.save_token(&token).await?;
            println!("Token saved");
        }
        Commands::Run {
            count,
            command_template,
            token,
            work_root,
            timeout,
            buffered,
        } => {
            let mut body = RunBatchBody::new(count, command_template);
            if let Some(token) = token {
                body = body.with_auth_token(token);
            }
            if let Some(work_root) = work_root {
                body = body.with_work_root(work_root);
            }
            if let Some(timeout) = timeout {
                body = body.with_timeout_seconds(timeout);
            }

            let ok = if buffered {
                run_buffered(&client, &body).await?
            } else {
                run_streamed(&client, &body).await?
            };
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_buffered(
    client: &HttpClient,
    body: &RunBatchBody,
) -> Result<bool, Box<dyn std::error::Error>> {
    let result = client.run_batch(body).await?;

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    println!("{}", end_line(&result));

    Ok(result.ok)
}

async fn run_streamed(
    client: &HttpClient,
    body: &RunBatchBody,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut stream = client.run_batch_stream(body).await?;
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    while let Some(event) = stream.next_event().await? {
        match event {
            StreamEvent::Start { work_root } => {
                println!("[START] work root: {}", work_root);
            }
            StreamEvent::Stdout { data } => {
                stdout.write_all(data.as_bytes())?;
                stdout.flush()?;
            }
            StreamEvent::Stderr { data } => {
                stderr.write_all(data.as_bytes())?;
            }
            StreamEvent::Error { message } => {
                eprintln!("[ERROR] {}", message);
                return Ok(false);
            }
            StreamEvent::End(result) => {
                println!("{}", end_line(&result));
                return Ok(result.ok);
            }
        }
    }

    eprintln!("[ERROR] stream closed before the batch finished");
    Ok(false)
}

fn end_line(result: &BatchResult) -> String {
    format!(
        "[END] exit {} | total {} | success {} | failed {}",
        result.exit_code, result.summary.total, result.summary.success, result.summary.failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_line() {
        let result = BatchResult::from_output(
            1,
            "SUMMARY TOTAL=4 SUCCESS=3 FAILED=1\n".to_string(),
            String::new(),
            "/tmp/runs",
        );
        assert_eq!(
            end_line(&result),
            "[END] exit 1 | total 4 | success 3 | failed 1"
        );
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "factory",
            "run",
            "--count",
            "3",
            "--command",
            "claude -p {prompt}",
            "--buffered",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                count,
                command_template,
                buffered,
                token,
                ..
            } => {
                assert_eq!(count, 3);
                assert_eq!(command_template, "claude -p {prompt}");
                assert!(buffered);
                assert!(token.is_none());
            }
            _ => panic!("expected run"),
        }
    }
}
