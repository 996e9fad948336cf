// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for digest sweeps, push coverage, and change fan-out.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::rc::Rc;

use cambium_binding::{SchemaBuilder, Source};
use cambium_property::{OwnerTypeId, Property, PropertyMetadataBuilder, PropertyRegistry};
use cambium_reactive::{PropertyChange, PropertyEngine};

struct Model {
    width: f64,
}

fn build_registry() -> (PropertyRegistry, OwnerTypeId, Property<f64>) {
    let mut registry = PropertyRegistry::new();
    let visual = registry.register_type("Visual", None);
    let width: Property<f64> =
        registry.register("Width", visual, PropertyMetadataBuilder::new(0.0_f64).build());
    (registry, visual, width)
}

fn build_bound_engine(
    registry: &PropertyRegistry,
    visual: OwnerTypeId,
    width: Property<f64>,
    n: u32,
    instrumented: bool,
) -> (PropertyEngine<u32>, Vec<Source<Model>>) {
    let mut engine = PropertyEngine::new();
    engine.register_schema(
        SchemaBuilder::<Model>::new()
            .field_mut("Width", |m| &m.width, |m| &mut m.width)
            .build(),
    );
    let mut sources = Vec::with_capacity(n as usize);
    for key in 0..n {
        engine.attach(registry, key, visual, None);
        let model = Model {
            width: f64::from(key),
        };
        let source = if instrumented {
            Source::builder(model).instrumented().build()
        } else {
            Source::new(model)
        };
        engine
            .bind(registry, key, width, &source.handle(), "Width")
            .expect("Model schema is registered");
        sources.push(source);
    }
    (engine, sources)
}

fn bench_digest(c: &mut Criterion) {
    let (registry, visual, width) = build_registry();

    let mut group = c.benchmark_group("property/digest");
    group.sample_size(50);

    for &n in &[256_u32, 4_096_u32] {
        group.bench_function(format!("sweep_quiescent(n={n})"), |b| {
            let (mut engine, _sources) = build_bound_engine(&registry, visual, width, n, false);
            b.iter(|| black_box(engine.run_tick(&registry)));
        });

        group.bench_function(format!("sweep_all_changed(n={n})"), |b| {
            let (mut engine, sources) = build_bound_engine(&registry, visual, width, n, false);
            let mut next = f64::from(n);
            b.iter(|| {
                for source in &sources {
                    source.update(|m| m.width = next);
                }
                next += 1.0;
                black_box(engine.run_tick(&registry));
            });
        });
    }

    // Push-covered bindings never enroll; a flush visits only marked cells.
    for &(n, marked) in &[(4_096_u32, 1_u32), (4_096_u32, 64_u32)] {
        group.bench_function(format!("flush_pushed(n={n},marked={marked})"), |b| {
            let (mut engine, sources) = build_bound_engine(&registry, visual, width, n, true);
            let mut next = f64::from(n);
            b.iter(|| {
                for source in sources.iter().take(marked as usize) {
                    source.update_member("Width", |m| m.width = next);
                }
                next += 1.0;
                black_box(engine.flush_pushed(&registry));
            });
        });
    }

    group.finish();

    let mut group = c.benchmark_group("property/notify");

    for &subs in &[1_usize, 16, 256] {
        group.bench_function(format!("set_local_fanout(subs={subs})"), |b| {
            let mut engine = PropertyEngine::new();
            engine.attach(&registry, 1_u32, visual, None);
            for _ in 0..subs {
                engine.subscribe(
                    width.id(),
                    1,
                    Rc::new(|change: &PropertyChange<u32>| {
                        black_box(change.source);
                    }),
                );
            }
            let mut next = 1.0_f64;
            b.iter(|| {
                engine.set_local(&registry, 1, width, next);
                next += 1.0;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_digest);
criterion_main!(benches);
