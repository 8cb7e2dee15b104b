use std::sync::Arc;

use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use rotaplan::compactor;
use rotaplan::config::Config;
use rotaplan::engine::Engine;
use rotaplan::model::{AssignTarget, RoomId, RoomState, StaffId, StaffRef, parse_date};
use rotaplan::notify::NotifyHub;
use rotaplan::roster::InMemoryRoster;

/// Operating room assignments with per-person rotation counters.
#[derive(Debug, Parser)]
#[command(name = "rotaplan")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Day grid with duplicate and unavailable rooms flagged.
    Day {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Every existing day in a range.
    Week {
        #[arg(value_parser = parse_date)]
        start: NaiveDate,
        /// Last day, inclusive [default: start + 6 days].
        #[arg(value_parser = parse_date)]
        end: Option<NaiveDate>,
    },

    /// State of the 12 rooms on a day.
    States {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Set the occupant of a room from a label. No label clears the room.
    Assign {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        room: RoomId,
        /// "<given> <surname> - <status>", quoted or as separate words.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        label: Vec<String>,
    },

    /// Set the occupant of a room from a roster id.
    AssignId {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        room: RoomId,
        staff_id: StaffId,
    },

    /// Remove the occupant of a room.
    Unassign {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        room: RoomId,
    },

    /// Open, close or retire a room for a day.
    State {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        room: RoomId,
        state: RoomState,
    },

    /// Is someone free on a day? Takes a label or `#<staff-id>`.
    Check {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
        #[arg(value_parser = parse_staff_ref)]
        who: StaffRef,
        /// Room that doesn't count against them.
        exclude: Option<RoomId>,
    },

    /// Rotation counters per roster member.
    Stats,

    /// Give a new roster member a zeroed counter row.
    Register { staff_id: StaffId },

    /// Drop the counter row of someone removed from the roster.
    Forget { staff_id: StaffId },

    /// Clear every day and counter.
    Reset,

    /// Rewrite the journal.
    Compact,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = cli.config;
    rotaplan::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let roster_path = config.roster_path();
    let roster = Arc::new(InMemoryRoster::load_json(&roster_path)?);
    info!(staff = roster.len(), "roster loaded from {}", roster_path.display());

    let engine = Engine::new(config.wal_path(), roster, Arc::new(NotifyHub::new()))?
        .with_lock_timeout(config.lock_timeout());

    match cli.command {
        Command::Day { date } => print_json(&engine.day_view(date).await?)?,
        Command::Week { start, end } => {
            let end = match end {
                Some(end) => end,
                None => start.checked_add_days(Days::new(6)).ok_or("date out of range")?,
            };
            print_json(&engine.days_between(start, end).await?)?;
        }
        Command::States { date } => print_json(&engine.room_states(date).await?)?,
        Command::Assign { date, room, label } => {
            print_json(&engine.assign(date, room, assign_target(&label)).await?)?;
        }
        Command::AssignId { date, room, staff_id } => {
            print_json(&engine.assign(date, room, AssignTarget::Staff(staff_id)).await?)?;
        }
        Command::Unassign { date, room } => print_json(&engine.unassign(date, room).await?)?,
        Command::State { date, room, state } => print_json(&engine.set_room_state(date, room, state).await?)?,
        Command::Check { date, who, exclude } => {
            print_json(&engine.check_availability(who, date, exclude).await?)?;
        }
        Command::Stats => print_json(&engine.statistics().await?)?,
        Command::Register { staff_id } => {
            let created = engine.ensure_counter_row(staff_id).await?;
            print_json(&serde_json::json!({ "staff_id": staff_id, "created": created }))?;
        }
        Command::Forget { staff_id } => {
            let dropped = engine.drop_counter_row(staff_id).await?;
            print_json(&serde_json::json!({ "staff_id": staff_id, "dropped": dropped }))?;
        }
        Command::Reset => print_json(&engine.reset().await?)?,
        Command::Compact => {
            engine.compact_wal().await?;
            println!("{{\"compacted\":true}}");
            return Ok(());
        }
    }

    compactor::maybe_compact(&engine, config.compact_threshold).await?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Label words joined back together. Nothing but blanks clears the room.
fn assign_target(words: &[String]) -> AssignTarget {
    let label = words.join(" ");
    if label.trim().is_empty() {
        AssignTarget::Clear
    } else {
        AssignTarget::Label(label)
    }
}

/// `#<id>` names a roster id, anything else is a label.
fn parse_staff_ref(s: &str) -> Result<StaffRef, std::num::ParseIntError> {
    match s.strip_prefix('#') {
        Some(id) => Ok(StaffRef::Staff(id.parse()?)),
        None => Ok(StaffRef::Label(s.to_string())),
    }
}
