use cartbus::bus::{BusCycleSample, BusWindows, ReplayBus};
use cartbus::cartridge::crt::{ChipPacket, CrtImage};
use cartbus::cartridge::crt_header::CrtHeader;
use cartbus::memory::linear_to_cache_order;
use cartbus::timing::StepClock;
use cartbus::Engine;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn easyflash() -> CrtImage {
    let mut h = CrtHeader::new();
    h.set_hw_type(32);
    h.set_lines(1, 0);
    let chips = (0..64u16)
        .flat_map(|bank| {
            [0x8000u16, 0xE000].map(|load_address| ChipPacket {
                chip_type: 2,
                bank,
                load_address,
                data: vec![bank as u8; 0x2000],
            })
        })
        .collect();
    CrtImage::new(h, chips)
}

fn criterion_benchmark_dispatch(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = Engine::default();
    engine.load_cart(&easyflash()).unwrap();
    let mut clock = StepClock::new();
    engine.activate(&mut clock);

    let cycle = [
        BusCycleSample::cpu_read(BusWindows::ROML, 0x0123),
        BusCycleSample::cpu_read(BusWindows::ROMH | BusWindows::VIC, 0x1abc),
        BusCycleSample::cpu_write(BusWindows::IO1, 0x02, 0x07),
        BusCycleSample::idle(true),
    ];
    let mut bus = ReplayBus::new();
    c.bench_function("cycle dispatch", |b| {
        b.iter(|| {
            for s in &cycle {
                bus.push_sample(s);
                black_box(engine.run_cycle(&mut bus, &mut clock));
            }
            bus.clear_history();
        })
    });
}

fn criterion_benchmark_permutation(c: &mut Criterion) {
    c.bench_function("cache order", |b| {
        b.iter(|| (0..0x2000u16).fold(0u16, |acc, o| acc ^ linear_to_cache_order(black_box(o))))
    });
}

criterion_group!(benches, criterion_benchmark_dispatch, criterion_benchmark_permutation);
criterion_main!(benches);
