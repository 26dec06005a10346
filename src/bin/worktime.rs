//! worktime - command-line client for the worktime daemon
//!
//! Sends one request over the daemon socket and prints the reply.
//!
//! # Usage
//!
//! ```text
//! worktime start -u 7                 # start (or continue) today
//! worktime pause -u 7
//! worktime resume -u 7
//! worktime end -u 7 --notes "release"
//! worktime status -u 7 --date 2024-01-02
//! worktime sync --day 3 --elapsed 01:30:00 --running
//! worktime timer start -u 7 --task 12 --description "review"
//! worktime timer stop --entry 4
//! worktime watch -u 7                 # stream updates until Ctrl+C
//! ```

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use worktime_core::{EntryId, OwnerId, TaskId, TaskTimeEntry, WorkDayView};
use worktime_protocol::{ClientMessage, DaemonMessage};
use worktimed::config::{DaemonConfig, SOCKET_ENV};

// ============================================================================
// CLI Arguments
// ============================================================================

/// worktime - track work days, pauses and task time
#[derive(Parser, Debug)]
#[command(name = "worktime", version, about)]
struct Args {
    /// Daemon socket (defaults to $WORKTIME_SOCKET, then the config file)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Print raw JSON replies
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Owner and optional date shared by day commands.
#[derive(clap::Args, Debug)]
struct DayTarget {
    /// Owner (user) id
    #[arg(short = 'u', long = "owner")]
    owner: u64,

    /// Calendar date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the day, or continue it after a pause or an early end
    Start(DayTarget),
    /// Pause the running day
    Pause(DayTarget),
    /// Resume a paused day
    Resume(DayTarget),
    /// End the day
    End {
        #[command(flatten)]
        target: DayTarget,

        /// Notes attached to the day
        #[arg(long)]
        notes: Option<String>,
    },
    /// Restore the open session, or start the day
    ResumeOrStart(DayTarget),
    /// Show the day's totals and progress
    Status(DayTarget),
    /// Reconcile client-side elapsed time with the daemon
    Sync {
        /// Work day id
        #[arg(long)]
        day: u64,

        /// Elapsed net seconds, "HH:MM:SS" or "MM:SS"
        #[arg(long)]
        elapsed: String,

        /// The client believes the day is running
        #[arg(long)]
        running: bool,
    },
    /// Task-level timers
    Timer {
        #[command(subcommand)]
        command: TimerCommand,
    },
    /// Stream live updates until interrupted
    Watch {
        /// Only show updates for this owner
        #[arg(short = 'u', long = "owner")]
        owner: Option<u64>,
    },
    /// Check that the daemon answers
    Ping,
}

#[derive(Subcommand, Debug)]
enum TimerCommand {
    /// Start a timer on a task
    Start {
        #[arg(short = 'u', long = "user")]
        user: u64,

        #[arg(long)]
        task: u64,

        #[arg(long)]
        description: Option<String>,
    },
    /// Stop a running timer
    Stop {
        #[arg(long)]
        entry: u64,
    },
    /// Show the user's running timer
    Active {
        #[arg(short = 'u', long = "user")]
        user: u64,
    },
    /// List a task's entries and total time
    Entries {
        #[arg(long)]
        task: u64,
    },
}

impl Command {
    /// Builds the request for one-shot commands.
    fn request(&self) -> Option<ClientMessage> {
        let owner = |t: &DayTarget| OwnerId::new(t.owner);

        let msg = match self {
            Command::Start(t) => ClientMessage::start_day(owner(t), t.date),
            Command::Pause(t) => ClientMessage::pause_day(owner(t), t.date),
            Command::Resume(t) => ClientMessage::resume_day(owner(t), t.date),
            Command::End { target, notes } => {
                ClientMessage::end_day(owner(target), target.date, notes.clone())
            }
            Command::ResumeOrStart(t) => ClientMessage::resume_or_start(owner(t), t.date),
            Command::Status(t) => ClientMessage::day_status(owner(t), t.date),
            Command::Sync {
                day,
                elapsed,
                running,
            } => ClientMessage::sync(json!({
                "work_day_id": day,
                "elapsed_seconds": elapsed,
                "is_running": running,
            })),
            Command::Timer { command } => match command {
                TimerCommand::Start {
                    user,
                    task,
                    description,
                } => ClientMessage::start_task_timer(
                    OwnerId::new(*user),
                    TaskId::new(*task),
                    description.clone(),
                ),
                TimerCommand::Stop { entry } => {
                    ClientMessage::stop_task_timer(EntryId::new(*entry))
                }
                TimerCommand::Active { user } => {
                    ClientMessage::active_task_timer(OwnerId::new(*user))
                }
                TimerCommand::Entries { task } => {
                    ClientMessage::task_entries(TaskId::new(*task))
                }
            },
            Command::Ping => ClientMessage::ping(1),
            Command::Watch { .. } => return None,
        };
        Some(msg)
    }
}

// ============================================================================
// Connection
// ============================================================================

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.with_context(|| {
            format!(
                "Cannot reach worktime daemon at {} (is `worktimed start` running?)",
                socket_path.display()
            )
        })?;
        let (reader, writer) = stream.into_split();
        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
        };

        match conn.request(ClientMessage::connect(None)).await? {
            DaemonMessage::Connected { client_id, .. } => {
                debug!(client_id = %client_id, "Connected to daemon");
                Ok(conn)
            }
            DaemonMessage::Rejected { reason, .. } => bail!("Daemon rejected connection: {reason}"),
            other => bail!("Unexpected handshake reply: {other:?}"),
        }
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let mut json = serde_json::to_string(msg)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<DaemonMessage> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            bail!("Daemon closed the connection");
        }
        serde_json::from_str(&line).context("Invalid reply from daemon")
    }

    async fn request(&mut self, msg: ClientMessage) -> Result<DaemonMessage> {
        self.send(&msg).await?;
        self.recv().await
    }
}

fn socket_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        DaemonConfig::load(None)
            .unwrap_or_default()
            .socket_path(env::var(SOCKET_ENV).ok())
    })
}

// ============================================================================
// Output
// ============================================================================

fn print_day(day: &WorkDayView) {
    let date = day.date;
    match day.work_day_id {
        Some(id) => println!("{date}  {}  (day {id})", day.status),
        None => println!("{date}  not started"),
    }
    if day.already_started {
        println!("  already started");
    }
    println!(
        "  net {}  pause {}  total {}",
        day.net_display, day.pause_display, day.total_display
    );
    if day.is_work_day {
        println!(
            "  target {:.2}h  progress {:.2}%  remaining {}s  extra {}s",
            day.daily_target_hours, day.progress_percentage, day.remaining_seconds, day.extra_seconds
        );
    } else {
        println!("  no target (not a work day)");
    }
    if let Some(notes) = &day.notes {
        println!("  notes: {notes}");
    }
}

fn print_entry(entry: &TaskTimeEntry) {
    let state = match entry.duration_seconds {
        Some(secs) => format!("{secs}s"),
        None => "running".to_string(),
    };
    print!(
        "{}  {}  {}  started {}  {state}",
        entry.id, entry.user_id, entry.task_id, entry.started_at
    );
    match &entry.description {
        Some(description) => println!("  {description}"),
        None => println!(),
    }
}

/// Prints a reply; daemon errors become a failed exit.
fn print_reply(msg: &DaemonMessage) -> Result<()> {
    match msg {
        DaemonMessage::WorkDay { day } | DaemonMessage::DayUpdated { day } => print_day(day),
        DaemonMessage::SyncResult { decision } => println!(
            "{}: server {}s  client {}s  drift {}s  authority {:?}  status {}{}",
            decision.work_day_id,
            decision.server_seconds,
            decision.client_seconds,
            decision.drift,
            decision.authoritative,
            decision.status,
            if decision.status_healed { " (healed)" } else { "" },
        ),
        DaemonMessage::TaskEntry { entry: Some(entry) }
        | DaemonMessage::TaskTimerChanged { entry } => print_entry(entry),
        DaemonMessage::TaskEntry { entry: None } => println!("No running timer"),
        DaemonMessage::TaskEntries {
            task_id,
            entries,
            total_seconds,
        } => {
            for entry in entries {
                print_entry(entry);
            }
            println!("{task_id}: {} entries, {total_seconds}s total", entries.len());
        }
        DaemonMessage::Subscribed { day, .. } => {
            if let Some(day) = day {
                print_day(day);
            }
        }
        DaemonMessage::Pong { .. } => println!("pong"),
        DaemonMessage::Error {
            message,
            code,
            blocking_id,
        } => {
            let code = code.as_deref().unwrap_or("error");
            match blocking_id {
                Some(id) => bail!("{code}: {message} (blocked by {id})"),
                None => bail!("{code}: {message}"),
            }
        }
        other => println!("{other:?}"),
    }
    Ok(())
}

fn emit(msg: &DaemonMessage, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string(msg)?);
        if let DaemonMessage::Error { message, .. } = msg {
            bail!("{message}");
        }
        Ok(())
    } else {
        print_reply(msg)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("worktime=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let socket_path = socket_path(args.socket);
    let mut conn = Connection::open(&socket_path).await?;

    if let Command::Watch { owner } = args.command {
        let reply = conn
            .request(ClientMessage::subscribe(owner.map(OwnerId::new)))
            .await?;
        emit(&reply, args.json)?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                msg = conn.recv() => emit(&msg?, args.json)?,
            }
        }

        let _ = conn.send(&ClientMessage::disconnect()).await;
        return Ok(());
    }

    let Some(request) = args.command.request() else {
        return Ok(());
    };
    let reply = conn.request(request).await?;
    let result = emit(&reply, args.json);
    let _ = conn.send(&ClientMessage::disconnect()).await;
    result
}
