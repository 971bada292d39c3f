//! Criterion microbenchmarks for the join hot path.
//!
//! Run with:
//!   cargo bench -p oiyn-engine
//!
//! HTML reports are written to `target/criterion/`.

use chrono::{Duration, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use oiyn_common::id::generate_id;
use oiyn_common::models::posting::CreatePostingRequest;
use oiyn_common::models::user::{Role, User};
use oiyn_db::Database;
use oiyn_engine::MatchmakingEngine;
use uuid::Uuid;

fn user(name: &str) -> User {
    let now = Utc::now();
    User {
        id: generate_id(),
        email: format!("{name}@bench.oiyn"),
        password_hash: String::new(),
        first_name: name.into(),
        last_name: "Bench".into(),
        city: Some("Almaty".into()),
        photo_url: None,
        about: None,
        role: Role::User,
        refresh_token_hash: None,
        created_at: now,
        updated_at: now,
    }
}

fn request(max_players: i32) -> CreatePostingRequest {
    CreatePostingRequest {
        title: "Bench night".into(),
        description: "Benchmark posting".into(),
        city: "Almaty".into(),
        category: Some("board".into()),
        cover_url: None,
        max_players,
        min_players: None,
        scheduled_time: Some(Utc::now() + Duration::days(1)),
    }
}

async fn seed(db: &Database, count: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let created = db.users.create(user(&format!("user{i}"))).await.unwrap();
        ids.push(created.id);
    }
    ids
}

// ── Join ──────────────────────────────────────────────────────────────────────

/// Create a two-seat posting and fill it: conditional append, status close,
/// and chat materialization.
fn bench_join_and_fill(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = Database::in_memory();
    let engine = MatchmakingEngine::new(db.clone());
    let users = rt.block_on(seed(&db, 2));
    let (host, guest) = (users[0], users[1]);
    let engine = &engine;

    c.bench_function("join/fill_two_seats", |b| {
        b.to_async(&rt).iter(|| async move {
            let posting = engine.create_posting(host, request(2)).await.unwrap();
            let outcome = engine.join_posting(guest, posting.id).await.unwrap();
            black_box(outcome)
        })
    });
}

/// Rejected join on a posting the user already belongs to.
fn bench_join_rejected(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = Database::in_memory();
    let engine = MatchmakingEngine::new(db.clone());
    let users = rt.block_on(seed(&db, 2));
    let posting = rt.block_on(async {
        let posting = engine.create_posting(users[0], request(10)).await.unwrap();
        engine.join_posting(users[1], posting.id).await.unwrap();
        posting
    });

    let (guest, posting_id) = (users[1], posting.id);
    let engine = &engine;

    c.bench_function("join/already_member", |b| {
        b.to_async(&rt)
            .iter(|| async move { black_box(engine.join_posting(guest, posting_id).await.is_err()) })
    });
}

criterion_group!(benches, bench_join_and_fill, bench_join_rejected);
criterion_main!(benches);
