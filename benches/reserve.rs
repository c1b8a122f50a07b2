use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::time::Duration;

use movie_booking::{services::reservation, store::MemoryStore};

fn reserve_and_cancel(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    let store = MemoryStore::new(Duration::from_secs(1));
    let movie = store.add_movie("Bench", 90, "").expect("movie");
    let show = store
        .add_show(movie.id, "Screen 1", Utc::now(), 500)
        .expect("show");
    let seat = json!(250);

    // История отменённых броней растёт, как в реальном реестре
    c.bench_function("reserve_then_cancel_same_seat", |b| {
        b.iter(|| {
            rt.block_on(async {
                let booking = reservation::reserve(&store, show.id, Some(&seat), 1)
                    .await
                    .expect("seat is free");
                reservation::cancel(&store, booking.id, 1)
                    .await
                    .expect("cancel");
            })
        })
    });

    c.bench_function("reserve_conflict", |b| {
        let taken = json!(1);
        rt.block_on(reservation::reserve(&store, show.id, Some(&taken), 2))
            .expect("seat 1");
        b.iter(|| {
            let result = rt.block_on(reservation::reserve(&store, show.id, Some(&taken), 3));
            assert!(result.is_err());
        })
    });
}

criterion_group!(benches, reserve_and_cancel);
criterion_main!(benches);
