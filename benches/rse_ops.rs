use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rse::rng::seeded;
use rse::{
    Alphabet, Encoder, FrequencyProfile, Measure, QGramMode, QGramSet, RebalanceOptions, ReferenceSetGenerator,
    ReferenceSetProcessor, Threshold,
};

const NAMES: [&str; 8] = [
    "anna smith", "peter jones", "maria garcia", "thomas muller",
    "lisa brown", "john miller", "sarah wilson", "david moore",
];

fn records() -> Vec<QGramSet> {
    NAMES
        .iter()
        .map(|n| QGramSet::from_attributes(&[n], 2, QGramMode::Set).unwrap_or_default())
        .collect()
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    for m in [100usize, 1000, 10000] {
        let generator = ReferenceSetGenerator::new(Alphabet::lowercase(), 4);
        group.bench_with_input(BenchmarkId::from_parameter(m), &m, |bencher, &m| {
            bencher.iter(|| black_box(generator.generate(m, &mut seeded(42)).unwrap()))
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let set = ReferenceSetGenerator::new(Alphabet::lowercase(), 3)
        .generate(1000, &mut seeded(1))
        .unwrap();
    let batch: Vec<QGramSet> = records().into_iter().cycle().take(512).collect();

    let mut group = c.benchmark_group("encode");
    for measure in [Measure::SharedQGrams, Measure::Jaccard, Measure::Dice, Measure::NearestEdit] {
        let encoder = Encoder::new(&set, 2, measure, Threshold::TopN(20)).unwrap();
        group.bench_function(BenchmarkId::new("single", format!("{measure:?}")), |bencher| {
            bencher.iter(|| black_box(encoder.encode(black_box(&batch[0])).unwrap()))
        });
    }

    let encoder = Encoder::new(&set, 2, Measure::Jaccard, Threshold::Cutoff(0.2)).unwrap();
    group.bench_function("batch_512", |bencher| {
        bencher.iter(|| black_box(encoder.encode_batch(black_box(&batch)).unwrap()))
    });
    group.finish();
}

fn bench_rebalance(c: &mut Criterion) {
    let alphabet = Alphabet::lowercase();
    let set = ReferenceSetGenerator::new(alphabet.clone(), 4)
        .generate(500, &mut seeded(3))
        .unwrap();
    let data = FrequencyProfile::from_qgram_sets(&records());

    let mut group = c.benchmark_group("rebalance");
    group.sample_size(10);
    for max_swaps in [10usize, 100] {
        let opts = RebalanceOptions {
            max_swaps,
            ..RebalanceOptions::default()
        };
        let processor = ReferenceSetProcessor::new(alphabet.clone(), 2, opts);
        group.bench_with_input(BenchmarkId::from_parameter(max_swaps), &set, |bencher, set| {
            bencher.iter(|| black_box(processor.rebalance(set.clone(), &data, &mut seeded(4)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_generate, bench_encode, bench_rebalance);
criterion_main!(benches);
