
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use poa_polish::example_gen::generate_polish_test;
use poa_polish::pipeline::Polisher;
use poa_polish::polish_config::PolishConfigBuilder;

pub fn bench_polish(c: &mut Criterion) {
    let seq_lens = [1000, 10000];
    let num_reads = [8, 30];
    let error_rates = [0.01, 0.05];

    let mut benchmark_group = c.benchmark_group("polish-group");
    benchmark_group.sample_size(10);

    for &sl in seq_lens.iter() {
        for &nr in num_reads.iter() {
            let config = PolishConfigBuilder::default()
                .num_threads(4_usize)
                .build().unwrap();
            for &er in error_rates.iter() {
                let test_label = format!("polish_{sl}x{nr}_{er}");
                benchmark_group.bench_function(&test_label, |b| b.iter(|| {
                    black_box({
                        let data = generate_polish_test(sl, nr, er, 0);
                        let mut polisher = Polisher::new(config).unwrap();
                        polisher.initialize_from(vec![data.target], data.reads, data.overlaps).unwrap();
                        polisher.polish(false).unwrap()
                    });
                }));
            }
        }
    }

    benchmark_group.finish();
}

criterion_group!(benches, bench_polish);
criterion_main!(benches);
