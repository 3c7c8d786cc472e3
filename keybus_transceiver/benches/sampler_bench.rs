//! Sampler benchmark: cost of capturing one full frame in virtual time.
//!
//! The real-time budget is one 10 µs polling slice; this measures the
//! CPU work of every slice across a 64-bit frame (pin reads, edge
//! handling and the hand-off) without any real sleeping.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keybus_common::codec::BusWord;
use keybus_common::hal::types::Deadline;
use keybus_common::link::{OverflowPolicy, channel};
use keybus_transceiver::drivers::simulation::PanelScript;
use keybus_transceiver::drivers::simulated_bus;
use keybus_transceiver::sampler::{BusSampler, SamplerTiming};
use std::hint::black_box;

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampler_frames");
    for frames in [1usize, 8] {
        let words: Vec<BusWord> = (0..frames as u64)
            .map(|i| BusWord::from_bits(0x2700_0000_0000_0000 | (i << 15)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(frames), &words, |b, words| {
            b.iter(|| {
                let script = PanelScript::new(words.iter().copied());
                let end = Deadline::from_nanos(script.duration_ns());
                let (pins, clock) = simulated_bus(script);
                let (frames_tx, mut frames_rx) = channel(64, OverflowPolicy::OverwriteOldest);
                let (_commands_tx, commands_rx) = channel(4, OverflowPolicy::Reject);
                let mut sampler =
                    BusSampler::new(pins, clock, SamplerTiming::default(), frames_tx, commands_rx)
                        .unwrap();
                sampler.run_until(end);
                while let Some(word) = frames_rx.pop() {
                    black_box(word);
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
