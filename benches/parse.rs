use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rexamine::config::Config;
use rexamine::core::optimizer::OptimizeOptions;
use rexamine::facade::Facade;
use rexamine::redos::RedosOptions;

const PATTERNS: &[&str] = &[
    "/(a|b)+c/",
    r"/^(?<year>\d{4})-(?<month>\d{2})-(?<day>\d{2})$/",
    r"/[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}/",
    "/foo_alpha|foo_beta|foo_gamma/",
];

fn bench_parse(c: &mut Criterion) {
    let facade = Facade::new(Config::default());
    c.bench_function("parse", |b| {
        b.iter(|| {
            for p in PATTERNS {
                black_box(facade.parse(black_box(p)).unwrap());
            }
        })
    });
}

fn bench_optimize(c: &mut Criterion) {
    let facade = Facade::new(Config::default());
    let options = OptimizeOptions::default();
    c.bench_function("optimize", |b| {
        b.iter(|| {
            for p in PATTERNS {
                black_box(facade.optimize(black_box(p), &options).unwrap());
            }
        })
    });
}

fn bench_redos_static(c: &mut Criterion) {
    let facade = Facade::new(Config::default());
    let options = RedosOptions::default();
    c.bench_function("redos_static", |b| {
        b.iter(|| {
            for p in PATTERNS {
                black_box(facade.redos(black_box(p), &options).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_parse, bench_optimize, bench_redos_static);
criterion_main!(benches);
