use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use depomark::encode::FittedPreprocessor;
use depomark::model::LogisticModel;
use depomark::schema::{
    self, Contact, Education, Job, Marital, Month, RawRecord, Record, BALANCE_LIMIT,
};

fn random_raw_record(rng: &mut StdRng, balances: &Normal<f64>) -> RawRecord {
    RawRecord {
        age: rng.gen_range(18..=95),
        job: Job::ALL[rng.gen_range(0..Job::ALL.len())].to_string(),
        marital: Marital::ALL[rng.gen_range(0..Marital::ALL.len())].to_string(),
        education: Education::ALL[rng.gen_range(0..Education::ALL.len())].to_string(),
        balance: balances.sample(rng).clamp(-BALANCE_LIMIT, BALANCE_LIMIT),
        housing: rng.gen_bool(0.5),
        loan: rng.gen_bool(0.2),
        contact: Contact::ALL[rng.gen_range(0..Contact::ALL.len())].to_string(),
        month: Month::ALL[rng.gen_range(0..Month::ALL.len())].to_string(),
        campaign: rng.gen_range(1..=30),
    }
}

fn validated(records: &[RawRecord]) -> Vec<Record> {
    records
        .iter()
        .map(|raw| schema::validate(raw).expect("generated records are in range"))
        .collect()
}

fn fitted_pipeline(records: &[Record], rng: &mut StdRng) -> (FittedPreprocessor, LogisticModel) {
    let preprocessor = FittedPreprocessor::fit(records);
    let coefficients = Array1::from_shape_fn(preprocessor.width(), |_| rng.gen_range(-1.0..1.0));
    let classifier = LogisticModel {
        intercept: -1.2,
        coefficients,
    };
    (preprocessor, classifier)
}

fn benchmark_single(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEB0_5117);
    let balances = Normal::new(1500.0, 3000.0).expect("valid distribution");
    let raw_records: Vec<_> = (0..500)
        .map(|_| random_raw_record(&mut rng, &balances))
        .collect();
    let records = validated(&raw_records);
    let (preprocessor, classifier) = fitted_pipeline(&records, &mut rng);

    let raw = raw_records[0].clone();
    let record = records[0];
    let features = preprocessor.transform(&record);

    let mut group = c.benchmark_group("single_record");
    group.throughput(Throughput::Elements(1));

    group.bench_function("validate", |b| {
        b.iter(|| {
            let record = schema::validate(black_box(&raw)).unwrap();
            black_box(record);
        });
    });

    group.bench_function("transform", |b| {
        b.iter(|| {
            let row = preprocessor.transform(black_box(&record));
            black_box(row);
        });
    });

    group.bench_function("predict_proba", |b| {
        b.iter(|| {
            let p = classifier.predict_proba(black_box(&features));
            black_box(p);
        });
    });

    // The full request path: parse-validated input to probability.
    group.bench_function("validate_transform_predict", |b| {
        b.iter(|| {
            let record = schema::validate(black_box(&raw)).unwrap();
            let row = preprocessor.transform(&record);
            let p = classifier.predict_proba(&row);
            black_box(p);
        });
    });

    group.finish();
}

fn benchmark_batch(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xBA7C_4ED);
    let sizes = [100_usize, 1_000, 10_000];
    let largest = sizes[sizes.len() - 1];

    let balances = Normal::new(1500.0, 3000.0).expect("valid distribution");
    let raw_records: Vec<_> = (0..largest)
        .map(|_| random_raw_record(&mut rng, &balances))
        .collect();
    let records = validated(&raw_records);
    let (preprocessor, _) = fitted_pipeline(&records, &mut rng);

    let mut group = c.benchmark_group("transform_batch");
    for &size in sizes.iter() {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &records[..size],
            |b, input| {
                b.iter(|| {
                    let matrix = preprocessor.transform_batch(black_box(input));
                    black_box(matrix);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(encode_predict, benchmark_single, benchmark_batch);
criterion_main!(encode_predict);
