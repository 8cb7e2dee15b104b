use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_test::{assert_err, assert_ok};

use rotaplan::engine::{Engine, EngineError, ErrorKind};
use rotaplan::model::*;
use rotaplan::notify::NotifyHub;
use rotaplan::roster::{InMemoryRoster, Roster, RosterError};

// ── Test infrastructure ──────────────────────────────────────

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("rotaplan_int_test").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Roster in the export format of the staff tool (`nom`/`prenom`, integer flags).
const ROSTER_JSON: &str = r#"[
    {"id": 1, "nom": "Durand", "prenom": "Alice", "status": "J1", "present": 1},
    {"id": 2, "nom": "Bernard", "prenom": "Hugo", "status": "J3", "present": 0},
    {"id": 3, "nom": "Moreau", "prenom": "Chloe", "status": "N"}
]"#;

fn open(dir: &Path) -> Engine {
    let roster_path = dir.join("roster.json");
    if !roster_path.exists() {
        std::fs::write(&roster_path, ROSTER_JSON).unwrap();
    }
    let roster = Arc::new(InMemoryRoster::load_json(&roster_path).unwrap());
    Engine::new(dir.join("rotaplan.wal"), roster, Arc::new(NotifyHub::new())).unwrap()
}

fn day() -> NaiveDate {
    parse_date("2024-03-12").unwrap()
}

const ALICE: &str = "Alice Durand - J1";
const HUGO: &str = "Hugo Bernard - J3";

/// A roster that is always down.
struct DownRoster;

#[async_trait]
impl Roster for DownRoster {
    async fn find_staff(&self, _: &str, _: &str, _: Option<&str>) -> Result<Option<StaffId>, RosterError> {
        Err(RosterError("connection refused".into()))
    }

    async fn get_staff(&self, _: StaffId) -> Result<Option<Staff>, RosterError> {
        Err(RosterError("connection refused".into()))
    }

    async fn list_staff(&self) -> Result<Vec<Staff>, RosterError> {
        Err(RosterError("connection refused".into()))
    }
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn planning_a_day_end_to_end() {
    let dir = test_dir("end_to_end");
    let engine = open(&dir);

    assert_ok!(engine.assign(day(), RoomId::Salle16, AssignTarget::Label(ALICE.into())).await);
    assert_ok!(engine.assign(day(), RoomId::Salle17, AssignTarget::Staff(2)).await);
    assert_ok!(engine.set_room_state(day(), RoomId::Salle24, RoomState::Closed).await);

    let view = engine.day_view(day()).await.unwrap();
    assert!(view.duplicates.is_empty());
    assert_eq!(view.unavailable.iter().copied().collect::<Vec<_>>(), vec![RoomId::Salle24]);
    assert_eq!(view.slots[RoomId::Salle17.index()].occupant.as_deref(), Some(HUGO));

    // Hugo is moved onto Alice's room by mistake: both rooms get flagged.
    assert_ok!(engine.assign_label(day(), RoomId::Salle16, HUGO).await);
    let view = engine.day_view(day()).await.unwrap();
    assert_eq!(
        view.duplicates.iter().copied().collect::<Vec<_>>(),
        vec![RoomId::Salle16, RoomId::Salle17]
    );
    assert_eq!(engine.counter(1, RoomId::Salle16), 0);
    assert_eq!(engine.counter(2, RoomId::Salle16), 1);

    let report = assert_ok!(
        engine
            .check_availability(StaffRef::Staff(2), day(), Some(RoomId::Salle17))
            .await
    );
    assert!(!report.available);
    assert_eq!(report.occupied_rooms, vec![RoomId::Salle16]);
    assert_eq!(report.blocked_rooms, vec![RoomId::Salle24]);
}

#[tokio::test]
async fn statistics_survive_restart() {
    let dir = test_dir("stats_restart");
    {
        let engine = open(&dir);
        for d in 1..=3 {
            let date = NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
            assert_ok!(engine.assign_label(date, RoomId::Reveil1, ALICE).await);
        }
        assert_ok!(engine.unassign(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), RoomId::Reveil1).await);
    }

    let engine = open(&dir);
    let stats = assert_ok!(engine.statistics().await);
    let names: Vec<_> = stats.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(names, vec![ALICE, "Chloe Moreau - N", HUGO]);
    assert_eq!(stats[0].counts[RoomId::Reveil1.index()], 2);

    let week = assert_ok!(
        engine
            .days_between(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
            )
            .await
    );
    assert_eq!(week.len(), 3);
    assert_eq!(week[1].slots[RoomId::Reveil1.index()].occupant, None);
}

#[tokio::test]
async fn room_states_default_to_open() {
    let dir = test_dir("states_default");
    let engine = open(&dir);
    assert_ok!(engine.set_room_state(day(), RoomId::Perinduction, RoomState::Unused).await);

    let states = engine.room_states(day()).await.unwrap();
    assert_eq!(states.len(), ROOM_COUNT);
    assert_eq!(states[&RoomId::Perinduction], RoomState::Unused);
    assert_eq!(states.values().filter(|s| s.is_open()).count(), ROOM_COUNT - 1);
}

#[tokio::test]
async fn roster_outage_is_infrastructure_error_and_leaves_slot_untouched() {
    let dir = test_dir("roster_down");
    let engine = Engine::new(dir.join("rotaplan.wal"), Arc::new(DownRoster), Arc::new(NotifyHub::new()))
        .unwrap()
        .with_lock_timeout(Duration::from_millis(200));

    let err = assert_err!(engine.assign_label(day(), RoomId::Salle20, ALICE).await);
    assert!(matches!(err, EngineError::Roster(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(!err.is_retryable());
    assert_eq!(engine.slot_occupant(day(), RoomId::Salle20).await.unwrap(), None);

    assert_err!(engine.statistics().await);
    assert_err!(engine.reset().await);
}

#[tokio::test]
async fn corrupt_journal_tail_is_dropped() {
    use std::io::Write;

    let dir = test_dir("torn_tail");
    {
        let engine = open(&dir);
        assert_ok!(engine.assign_label(day(), RoomId::Salle21, ALICE).await);
    }
    let mut wal = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.join("rotaplan.wal"))
        .unwrap();
    wal.write_all(&[0x40, 0, 0, 0, 1, 2, 3]).unwrap();
    drop(wal);

    {
        let engine = open(&dir);
        assert_eq!(engine.slot_occupant(day(), RoomId::Salle21).await.unwrap().as_deref(), Some(ALICE));
        assert_ok!(engine.assign_label(day(), RoomId::Salle22, HUGO).await);
    }

    let engine = open(&dir);
    assert_eq!(engine.slot_occupant(day(), RoomId::Salle22).await.unwrap().as_deref(), Some(HUGO));
    assert_eq!(engine.counter(1, RoomId::Salle21), 1);
    assert_eq!(engine.counter(2, RoomId::Salle22), 1);
}

#[tokio::test]
async fn invalid_inputs_are_validation_errors() {
    assert!(matches!("salle99".parse::<RoomId>(), Err(ParseError::UnknownRoom(_))));
    assert!(matches!(RoomState::from_flag(Some("maybe")), Err(ParseError::UnknownState(_))));
    assert!(parse_date("12/03/2024").is_err());

    let err: EngineError = "salle99".parse::<RoomId>().unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
