//! Criterion benchmarks for the Lumo frame codec.
//!
//! The relay classifies every inbound frame and a remote decodes one `state`
//! frame per teleprompter refresh tick (about 60 per second), so both paths
//! sit on the hot path of a live session.
//!
//! Run with:
//! ```bash
//! cargo bench --package lumo-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumo_core::protocol::codec::{
    classify_client_frame, decode_relay_frame, encode_client_message,
};
use lumo_core::protocol::messages::{ClientMessage, PlaybackState, RemoteCommand};

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn state_frame() -> String {
    encode_client_message(&ClientMessage::State {
        payload: PlaybackState {
            is_playing: true,
            speed: 55,
            position: 1834.25,
            script_title: "Quarterly all-hands".to_string(),
        },
    })
    .unwrap()
}

fn command_frame() -> String {
    encode_client_message(&ClientMessage::Command {
        payload: RemoteCommand::Speed { speed: 80 },
    })
    .unwrap()
}

const LEGACY_SEEK: &str = r#"{"type":"seek","payload":{"direction":"forward","amount":"line"}}"#;
const JOIN: &str = r#"{"type":"join","role":"remote","sessionId":"QX7K2M9P"}"#;

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_client_frame");

    let state = state_frame();
    group.bench_function("state", |b| {
        b.iter(|| classify_client_frame(black_box(&state)))
    });

    let command = command_frame();
    group.bench_function("command", |b| {
        b.iter(|| classify_client_frame(black_box(&command)))
    });

    group.bench_function("legacy_seek", |b| {
        b.iter(|| classify_client_frame(black_box(LEGACY_SEEK)))
    });

    group.bench_function("join", |b| b.iter(|| classify_client_frame(black_box(JOIN))));

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_relay_frame");

    let state = state_frame();
    group.bench_function("state", |b| b.iter(|| decode_relay_frame(black_box(&state))));

    let command = command_frame();
    group.bench_function("command", |b| {
        b.iter(|| decode_relay_frame(black_box(&command)))
    });

    group.bench_function("legacy_seek", |b| {
        b.iter(|| decode_relay_frame(black_box(LEGACY_SEEK)))
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_decode);
criterion_main!(benches);
