//! Performance benchmarks for the RAMBO core.
//!
//! Measures the hot paths: the per-master-cycle tick, whole-frame
//! emulation, snapshotting, and memory peeks.

#![allow(missing_docs)]

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rambo_core::{Cartridge, Config, EmulationState};
use std::time::Duration;

/// Build a minimal NROM image: JMP-loop program, vectors wired.
fn create_minimal_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 16 + 32768 + 8192];

    rom[0] = 0x4E;
    rom[1] = 0x45;
    rom[2] = 0x53;
    rom[3] = 0x1A;
    rom[4] = 2; // 32 KiB PRG
    rom[5] = 1; // 8 KiB CHR
    rom[6] = 0x01; // NROM, vertical mirroring

    // Program at $8000: JMP $8000.
    rom[16] = 0x4C;
    rom[17] = 0x00;
    rom[18] = 0x80;

    // Reset vector -> $8000.
    rom[16 + 0x7FFC] = 0x00;
    rom[16 + 0x7FFD] = 0x80;

    rom
}

fn powered_machine() -> EmulationState {
    let cart = Cartridge::from_bytes(&create_minimal_rom()).expect("valid ROM");
    let mut state = EmulationState::new(Config {
        power_on_phase: 0,
        enforce_warmup: false,
    });
    state.load_cartridge(cart);
    state
}

fn bench_tick(c: &mut Criterion) {
    let mut state = powered_machine();

    let mut group = c.benchmark_group("tick");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("single_tick", |b| {
        b.iter(|| {
            black_box(state.tick());
        });
    });

    group.bench_function("1000_ticks", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(state.tick());
            }
        });
    });

    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let mut state = powered_machine();

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("single_frame", |b| {
        b.iter(|| {
            state.emulate_frame();
            black_box(state.framebuffer());
        });
    });

    group.bench_function("60_frames", |b| {
        b.iter(|| {
            for _ in 0..60 {
                state.emulate_frame();
            }
            black_box(state.framebuffer());
        });
    });

    group.finish();
}

fn bench_snapshots(c: &mut Criterion) {
    let mut state = powered_machine();
    state.emulate_frame();
    let saved = state.snapshot();

    let mut group = c.benchmark_group("snapshot");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("snapshot", |b| {
        b.iter(|| {
            black_box(state.snapshot());
        });
    });

    group.bench_function("restore", |b| {
        b.iter(|| {
            state.restore(black_box(&saved)).expect("valid snapshot");
        });
    });

    group.finish();
}

fn bench_memory_access(c: &mut Criterion) {
    let state = powered_machine();

    let mut group = c.benchmark_group("memory");
    group.throughput(Throughput::Bytes(1));
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("peek_ram", |b| {
        b.iter(|| {
            black_box(state.peek_memory(black_box(0x0000)));
        });
    });

    group.bench_function("peek_prg", |b| {
        b.iter(|| {
            black_box(state.peek_memory(black_box(0x8000)));
        });
    });

    group.bench_function("peek_sequential_256", |b| {
        b.iter(|| {
            for addr in 0..256u16 {
                black_box(state.peek_memory(addr));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tick,
    bench_frames,
    bench_snapshots,
    bench_memory_access,
);
criterion_main!(benches);
