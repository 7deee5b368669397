//! Pivot benchmarks over synthetic sales tables
//!
//! Run with: cargo bench -p pivot-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use frame_engine::{Array, Element, Frame};
use pivot_engine::{pivot, AggregationType, PivotDefinition};

const REGIONS: [&str; 8] = ["north", "south", "east", "west", "centre", "coast", "hills", "plains"];
const QUARTERS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

fn create_sales_frame(rows: usize) -> Frame {
    let region: Vec<&str> = (0..rows).map(|i| REGIONS[(i * 7) % REGIONS.len()]).collect();
    let quarter: Vec<&str> = (0..rows).map(|i| QUARTERS[(i * 3) % QUARTERS.len()]).collect();
    let sales: Vec<i64> = (0..rows).map(|i| ((i * 31) % 997) as i64).collect();
    let units: Vec<f64> = (0..rows).map(|i| (i % 13) as f64 * 0.5).collect();
    Frame::from_columns(
        vec![
            (Element::str("region"), Array::from_strs(region)),
            (Element::str("quarter"), Array::from_strs(quarter)),
            (Element::str("sales"), Array::from_ints(sales)),
            (Element::str("units"), Array::from_floats(units)),
        ],
        None,
    )
    .unwrap()
}

fn bench_index_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("pivot_index_only");

    for rows in &[1_000usize, 10_000, 100_000] {
        let frame = create_sales_frame(*rows);
        let definition = PivotDefinition::new(["region"]).data(["sales"]).func(AggregationType::Sum);
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| pivot(black_box(&frame), black_box(&definition)).unwrap());
        });
    }

    group.finish();
}

fn bench_with_columns(c: &mut Criterion) {
    let mut group = c.benchmark_group("pivot_with_columns");

    for rows in &[1_000usize, 10_000, 100_000] {
        let frame = create_sales_frame(*rows);
        let single = PivotDefinition::new(["region"])
            .columns(["quarter"])
            .data(["sales"])
            .func(AggregationType::Sum)
            .fill_value(0);
        let records = PivotDefinition::new(["region"])
            .columns(["quarter"])
            .data(["sales", "units"])
            .funcs([AggregationType::Sum, AggregationType::Mean]);
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::new("single", rows), rows, |b, _| {
            b.iter(|| pivot(black_box(&frame), black_box(&single)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("records", rows), rows, |b, _| {
            b.iter(|| pivot(black_box(&frame), black_box(&records)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_index_only, bench_with_columns);

criterion_main!(benches);
