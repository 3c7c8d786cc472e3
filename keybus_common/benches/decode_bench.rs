//! Decode hot-path benchmarks.
//!
//! The decoder drains up to two words per bus frame every 5 ms; decode must
//! stay well below a microsecond so a full queue drains within one period.

use criterion::{Criterion, criterion_group, criterion_main};
use keybus_common::codec::{BusWord, Key, decode, encode};
use keybus_common::status::render;
use std::hint::black_box;

fn sample_words() -> Vec<BusWord> {
    let mut words: Vec<BusWord> = Key::ALL.iter().map(|&k| encode(k)).collect();
    // LED, date/time, zone group 1, and an unknown code.
    words.push(BusWord::from_bits(0x0500_8000_0000_0000));
    words.push(BusWord::from_bits(0xa52a_5b0c_3c00_0000));
    words.push(BusWord::from_bits(0x2700_0000_0002_8000));
    words.push(BusWord::from_bits(0x4200_0000_0000_0000));
    words
}

fn bench_decode(c: &mut Criterion) {
    let words = sample_words();
    c.bench_function("decode_mixed_frames", |b| {
        b.iter(|| {
            for w in &words {
                black_box(decode(black_box(w)));
            }
        });
    });
}

fn bench_decode_and_render(c: &mut Criterion) {
    let words = sample_words();
    c.bench_function("decode_render_mixed_frames", |b| {
        b.iter(|| {
            for w in &words {
                let decoded = decode(black_box(w));
                black_box(render(&decoded.message).ok());
            }
        });
    });
}

criterion_group!(benches, bench_decode, bench_decode_and_render);
criterion_main!(benches);
