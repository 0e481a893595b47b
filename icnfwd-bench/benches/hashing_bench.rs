use criterion::{black_box, criterion_group, criterion_main, Criterion};
use icnfwd_bench::sample_names;
use icnfwd_core::hash::{hash_name, hash_prefixes};

fn benchmark_name_hashing(c: &mut Criterion) {
    let names = sample_names(1024);

    c.bench_function("hash_name", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let name = &names[i & 1023];
            i = i.wrapping_add(1);
            black_box(hash_name(black_box(name)))
        })
    });

    c.bench_function("hash_prefixes", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let name = &names[i & 1023];
            i = i.wrapping_add(1);
            black_box(hash_prefixes(black_box(name)))
        })
    });
}

criterion_group!(benches, benchmark_name_hashing);
criterion_main!(benches);
