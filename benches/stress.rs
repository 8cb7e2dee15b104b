use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};

use rotaplan::engine::Engine;
use rotaplan::model::{RoomId, Staff};
use rotaplan::notify::NotifyHub;
use rotaplan::roster::InMemoryRoster;

const STAFF: i64 = 40;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn roster() -> InMemoryRoster {
    InMemoryRoster::from_staff((1..=STAFF).map(|id| Staff {
        id,
        surname: format!("Nurse{id}"),
        given_name: format!("Bench{id}"),
        status: "J1".into(),
        present: true,
    }))
}

fn label(id: i64) -> String {
    format!("Bench{id} Nurse{id} - J1")
}

fn engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join("rotaplan_bench");
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    Arc::new(
        Engine::new(path, Arc::new(roster()), Arc::new(NotifyHub::new()))
            .expect("open engine")
            .with_lock_timeout(Duration::from_secs(30)),
    )
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

async fn phase1_sequential() {
    let engine = engine("sequential.wal");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let date = base_date() + Days::new((i / 12) as u64);
        let room = RoomId::ALL[i % 12];
        let t = Instant::now();
        engine
            .assign_label(date, room, &label((i as i64 % STAFF) + 1))
            .await
            .expect("assign");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} assignments in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_contended() {
    let engine = engine("contended.wal");
    let n_tasks = 16;
    let n_per_task = 200;
    let date = base_date();
    let start = Instant::now();
    let mut handles = Vec::new();

    // Every task fights over the same four rooms.
    for task in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_per_task);
            for j in 0..n_per_task {
                let room = RoomId::ALL[(task + j) % 4];
                let who = ((task * n_per_task + j) as i64 % STAFF) + 1;
                let t = Instant::now();
                engine.assign_label(date, room, &label(who)).await.expect("assign");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.expect("task"));
    }
    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} assignments = {total} total in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    print_latency("contended write latency", &mut latencies);

    // Every room holds exactly one credited occupant.
    let credited: u32 = (1..=STAFF)
        .map(|id| RoomId::ALL[..4].iter().map(|&r| engine.counter(id, r)).sum::<u32>())
        .sum();
    println!("  counters credited on contended rooms: {credited} (expect 4)");
}

async fn phase3_read_under_load() {
    let engine = engine("read_under_load.wal");
    let date = base_date();
    for (i, room) in RoomId::ALL.into_iter().enumerate() {
        engine.assign_label(date, room, &label(i as i64 + 1)).await.expect("seed");
    }

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for j in 0..2000 {
                let room = RoomId::ALL[j % 12];
                engine
                    .assign_label(date, room, &label((j as i64 % STAFF) + 1))
                    .await
                    .expect("assign");
            }
        })
    };

    let mut latencies = Vec::with_capacity(2000);
    while !writer.is_finished() {
        let t = Instant::now();
        let view = engine.day_view(date).await.expect("day view");
        latencies.push(t.elapsed());
        assert_eq!(view.slots.len(), 12);
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer");
    print_latency("day view latency under write load", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== rotaplan stress benchmark ===\n");

    println!("[phase 1] sequential assignment throughput");
    phase1_sequential().await;

    println!("\n[phase 2] contended assignment throughput");
    phase2_contended().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\n=== benchmark complete ===");
}
