use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use packbind::prelude::*;

fn build_facades(count: usize) -> (Vec<FileFacade>, HashMap<String, String>) {
    let mut facades = Vec::with_capacity(count);
    let mut component_paths = HashMap::new();

    for index in 0..count {
        let component = format!("Component{}", index % 64);
        component_paths.insert(
            component.clone(),
            format!(r"c:\program files\example\dir{}", index % 64),
        );

        let mut facade = FileFacade::new(
            format!("File{index}"),
            component,
            format!("file{}.dll", count - index),
        );
        facade.disk_id = (index % 3) as u32 + 1;
        facades.push(facade);
    }

    (facades, component_paths)
}

fn bench_optimize(c: &mut Criterion) {
    let (facades, component_paths) = build_facades(10_000);

    c.bench_function("optimize_file_order_10k", |b| {
        b.iter_batched(
            || facades.clone(),
            |mut facades| OptimizeFileOrder::new(&component_paths).execute(&mut facades),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
