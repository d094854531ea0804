//! Line-oriented front-end over the submission gateway.
//!
//! Each input line is one command:
//!
//! ```text
//! submit <owner> <expression...>
//! extend <job-id> [ms]
//! complete <job-id>
//! list <owner>
//! status <job-id>
//! stalled [ms]
//! help
//! quit
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::gateway::{SubmissionGateway, SubmitOutcome};
use crate::scheduler::{Job, JobId};

const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Submit { owner_id: u64, expression: String },
    Extend { job_id: JobId, amount: Option<Duration> },
    Complete { job_id: JobId },
    List { owner_id: u64 },
    Status { job_id: JobId },
    Stalled { threshold: Duration },
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "submit" => {
                let (owner, expression) = rest
                    .split_once(char::is_whitespace)
                    .ok_or("usage: submit <owner> <expression>")?;
                ConsoleCommand::Submit {
                    owner_id: parse_owner(owner)?,
                    expression: expression.trim().to_string(),
                }
            }
            "extend" => {
                let mut parts = rest.split_whitespace();
                let job_id = parse_job_id(parts.next())?;
                let amount = parts.next().map(parse_millis).transpose()?;
                ConsoleCommand::Extend { job_id, amount }
            }
            "complete" => ConsoleCommand::Complete {
                job_id: parse_job_id(rest.split_whitespace().next())?,
            },
            "list" => ConsoleCommand::List {
                owner_id: parse_owner(rest)?,
            },
            "status" => ConsoleCommand::Status {
                job_id: parse_job_id(rest.split_whitespace().next())?,
            },
            "stalled" => ConsoleCommand::Stalled {
                threshold: if rest.is_empty() {
                    DEFAULT_STALL_THRESHOLD
                } else {
                    parse_millis(rest)?
                },
            },
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command {other:?}, try `help`")),
        };
        Ok(Some(command))
    }
}

fn parse_owner(s: &str) -> std::result::Result<u64, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("invalid owner id {s:?}"))
}

fn parse_job_id(s: Option<&str>) -> std::result::Result<JobId, String> {
    let s = s.ok_or("missing job id")?;
    s.parse().map_err(|_| format!("invalid job id {s:?}"))
}

fn parse_millis(s: &str) -> std::result::Result<Duration, String> {
    s.trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("invalid milliseconds {s:?}"))
}

pub const HELP: &str = "\
commands:
  submit <owner> <expression>   queue an expression
  extend <job-id> [ms]          add time to a job's countdown
  complete <job-id>             skip the rest of a running job's countdown
  list <owner>                  show an owner's jobs
  status <job-id>               show one job
  stalled [ms]                  running jobs without a recent heartbeat
  quit                          flush and exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct JobOutput {
    job_id: JobId,
    owner_id: u64,
    status: String,
    expression: String,
    result: String,
    error: Option<String>,
    remaining_ms: u64,
    heartbeats: u64,
    assigned_worker: Option<u64>,
    last_heartbeat_at: Option<String>,
}

impl From<&Job> for JobOutput {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            owner_id: job.owner_id,
            status: job.status().to_string(),
            expression: job.expression.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            remaining_ms: job.remaining.as_millis() as u64,
            heartbeats: job.heartbeat_count,
            assigned_worker: job.assigned_worker,
            last_heartbeat_at: job.last_heartbeat_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
struct SubmitOutput {
    job_id: JobId,
    duplicate: bool,
}

#[derive(Serialize)]
struct AckOutput {
    job_id: JobId,
    applied: bool,
}

/// Result of executing one console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// Execute a parsed command against the gateway and render the reply.
pub async fn execute(
    gateway: &SubmissionGateway,
    command: ConsoleCommand,
    format: OutputFormat,
) -> Result<Reply> {
    let text = match command {
        ConsoleCommand::Submit {
            owner_id,
            expression,
        } => {
            let outcome = gateway.submit(owner_id, &expression).await?;
            render_submit(outcome, format)?
        }
        ConsoleCommand::Extend { job_id, amount } => {
            let applied = match amount {
                Some(amount) => gateway.extend(job_id, amount).await?,
                None => gateway.extend_default(job_id).await?,
            };
            render_ack(job_id, applied, "extended", "already finished", format)?
        }
        ConsoleCommand::Complete { job_id } => {
            let applied = gateway.complete_now(job_id).await?;
            render_ack(job_id, applied, "completing", "not running", format)?
        }
        ConsoleCommand::List { owner_id } => {
            let jobs = gateway.list_for(owner_id).await;
            render_jobs(&jobs, format)?
        }
        ConsoleCommand::Status { job_id } => {
            let job = gateway.status(job_id).await?;
            render_jobs(std::slice::from_ref(&job), format)?
        }
        ConsoleCommand::Stalled { threshold } => {
            let jobs = gateway.stalled(threshold).await;
            render_jobs(&jobs, format)?
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => return Ok(Reply::Quit),
    };
    Ok(Reply::Text(text))
}

fn render_submit(outcome: SubmitOutcome, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&SubmitOutput {
            job_id: outcome.job_id(),
            duplicate: outcome.is_duplicate(),
        })?,
        OutputFormat::Table => match outcome {
            SubmitOutcome::Accepted(id) => format!("Job submitted. Job ID: {id}"),
            SubmitOutcome::Duplicate(id) => format!("Already in progress. Job ID: {id}"),
        },
    })
}

fn render_ack(
    job_id: JobId,
    applied: bool,
    yes: &str,
    no: &str,
    format: OutputFormat,
) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&AckOutput { job_id, applied })?,
        OutputFormat::Table => format!("Job {job_id}: {}", if applied { yes } else { no }),
    })
}

/// Render jobs as a table or a JSON array.
pub fn render_jobs(jobs: &[Job], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let items: Vec<JobOutput> = jobs.iter().map(JobOutput::from).collect();
        return Ok(serde_json::to_string_pretty(&items)?);
    }

    if jobs.is_empty() {
        return Ok("No jobs found.".to_string());
    }

    let mut out = format!(
        "{:<8} {:<8} {:<12} {:<10} {:<8} EXPRESSION\n{}",
        "JOB ID",
        "OWNER",
        "STATUS",
        "REMAINING",
        "WORKER",
        "-".repeat(70)
    );
    for job in jobs {
        let worker = job
            .assigned_worker
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        let shown = if job.result.is_empty() {
            &job.expression
        } else {
            &job.result
        };
        out.push_str(&format!(
            "\n{:<8} {:<8} {:<12} {:<10} {:<8} {}",
            job.id,
            job.owner_id,
            job.status().to_string(),
            format!("{:.1}s", job.remaining.as_secs_f64()),
            worker,
            shown
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_submit_keeps_whole_expression() {
        let cmd = ConsoleCommand::parse("submit 3 (1 + 2) * 4").unwrap().unwrap();
        assert_eq!(
            cmd,
            ConsoleCommand::Submit {
                owner_id: 3,
                expression: "(1 + 2) * 4".to_string()
            }
        );
    }

    #[test]
    fn parse_extend_with_and_without_amount() {
        assert_eq!(
            ConsoleCommand::parse("extend 7").unwrap().unwrap(),
            ConsoleCommand::Extend {
                job_id: JobId(7),
                amount: None
            }
        );
        assert_eq!(
            ConsoleCommand::parse("EXTEND 7 1500").unwrap().unwrap(),
            ConsoleCommand::Extend {
                job_id: JobId(7),
                amount: Some(Duration::from_millis(1500))
            }
        );
    }

    #[test]
    fn parse_misc_commands() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
        assert_eq!(
            ConsoleCommand::parse("list 2").unwrap(),
            Some(ConsoleCommand::List { owner_id: 2 })
        );
        assert_eq!(
            ConsoleCommand::parse("status 11").unwrap(),
            Some(ConsoleCommand::Status { job_id: JobId(11) })
        );
        assert_eq!(
            ConsoleCommand::parse("complete 5").unwrap(),
            Some(ConsoleCommand::Complete { job_id: JobId(5) })
        );
        assert_eq!(
            ConsoleCommand::parse("stalled").unwrap(),
            Some(ConsoleCommand::Stalled {
                threshold: DEFAULT_STALL_THRESHOLD
            })
        );
        assert_eq!(ConsoleCommand::parse("quit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("help").unwrap(), Some(ConsoleCommand::Help));
    }

    #[test]
    fn parse_errors() {
        assert!(ConsoleCommand::parse("submit 1").is_err());
        assert!(ConsoleCommand::parse("submit x 1 + 1").is_err());
        assert!(ConsoleCommand::parse("extend").is_err());
        assert!(ConsoleCommand::parse("extend 1 soon").is_err());
        assert!(ConsoleCommand::parse("dance").is_err());
    }

    #[test]
    fn render_empty_table() {
        assert_eq!(render_jobs(&[], OutputFormat::Table).unwrap(), "No jobs found.");
        assert_eq!(render_jobs(&[], OutputFormat::Json).unwrap(), "[]");
    }

    #[test]
    fn render_table_shows_result_for_done_jobs() {
        let mut job = Job::new(JobId(1), 2, "2 + 2".to_string(), Duration::from_secs(10));
        job.claim(0).unwrap();
        job.finish(&Ok(4.0)).unwrap();

        let table = render_jobs(&[job], OutputFormat::Table).unwrap();
        assert!(table.contains("2 + 2 = 4"));
        assert!(table.contains("done"));
    }

    #[tokio::test]
    async fn execute_submit_then_duplicate() {
        use crate::config::SchedulerConfig;
        use crate::scheduler::JobRegistry;
        use std::sync::Arc;

        let gateway =
            SubmissionGateway::new(Arc::new(JobRegistry::new(10)), &SchedulerConfig::default());
        let cmd = ConsoleCommand::parse("submit 1 2 + 2").unwrap().unwrap();

        let first = execute(&gateway, cmd.clone(), OutputFormat::Table).await.unwrap();
        assert_eq!(first, Reply::Text("Job submitted. Job ID: 1".to_string()));

        let second = execute(&gateway, cmd, OutputFormat::Json).await.unwrap();
        match second {
            Reply::Text(text) => assert!(text.contains("\"duplicate\": true")),
            Reply::Quit => panic!("unexpected quit"),
        }

        let quit = execute(&gateway, ConsoleCommand::Quit, OutputFormat::Table)
            .await
            .unwrap();
        assert_eq!(quit, Reply::Quit);
    }
}
