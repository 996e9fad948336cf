// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `cambium_property` + `cambium_reactive`.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Once;

use cambium_property::{
    ErasedValue, Property, PropertyMetadataBuilder, PropertyOptions, PropertyRegistry, StyleBuilder,
};
use cambium_reactive::{PropertyEngine, SourceLayers};

fn bench_property(c: &mut Criterion) {
    static PRINT_SIZES: Once = Once::new();
    PRINT_SIZES.call_once(|| {
        eprintln!(
            "sizes: SourceLayers={} ErasedValue={} PropertyEngine<u32>={}",
            core::mem::size_of::<SourceLayers>(),
            core::mem::size_of::<ErasedValue>(),
            core::mem::size_of::<PropertyEngine<u32>>(),
        );
    });

    let mut registry = PropertyRegistry::new();
    let visual = registry.register_type("Visual", None);
    let width: Property<f64> =
        registry.register("Width", visual, PropertyMetadataBuilder::new(0.0_f64).build());
    let font_size: Property<f64> = registry.register(
        "FontSize",
        visual,
        PropertyMetadataBuilder::new(12.0_f64)
            .options(PropertyOptions::INHERITS)
            .build(),
    );

    let style = StyleBuilder::new().set(width, 50.0).build();

    // A small inheritance chain: 0 <- 1 <- ... <- N-1
    let chain_len: u32 = 16;

    let mut group = c.benchmark_group("property/resolve");

    group.bench_function("local", |b| {
        let mut engine = PropertyEngine::new();
        engine.attach(&registry, 1_u32, visual, None);
        engine.set_local(&registry, 1, width, 100.0);
        b.iter(|| black_box(engine.value(&registry, 1, width)))
    });

    group.bench_function("animation", |b| {
        let mut engine = PropertyEngine::new();
        engine.attach(&registry, 1_u32, visual, None);
        engine.set_local(&registry, 1, width, 100.0);
        engine.set_animation(&registry, 1, width, 200.0);
        b.iter(|| black_box(engine.value(&registry, 1, width)))
    });

    group.bench_function("styled", |b| {
        let mut engine = PropertyEngine::new();
        engine.attach(&registry, 1_u32, visual, None);
        engine.apply_style(&registry, 1, &style);
        b.iter(|| black_box(engine.value(&registry, 1, width)))
    });

    group.bench_function("default", |b| {
        let mut engine = PropertyEngine::new();
        engine.attach(&registry, 1_u32, visual, None);
        b.iter(|| black_box(engine.value(&registry, 1, width)))
    });

    // Inherited values are pushed down on write, so the leaf read hits its
    // own inherited slot no matter how deep the chain is.
    group.bench_function(BenchmarkId::new("inherited", chain_len), |b| {
        let mut engine = PropertyEngine::new();
        for i in 0..chain_len {
            engine.attach(&registry, i, visual, if i == 0 { None } else { Some(i - 1) });
        }
        engine.set_local(&registry, 0, font_size, 16.0);
        b.iter(|| black_box(engine.value(&registry, chain_len - 1, font_size)))
    });

    // The write side pays for that: one root write touches every descendant.
    group.bench_function(BenchmarkId::new("inherit_push_down", chain_len), |b| {
        b.iter_batched(
            || {
                let mut engine = PropertyEngine::new();
                for i in 0..chain_len {
                    engine.attach(&registry, i, visual, if i == 0 { None } else { Some(i - 1) });
                }
                engine
            },
            |mut engine| {
                engine.set_local(&registry, 0, font_size, 16.0);
                black_box(engine);
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();

    let mut group = c.benchmark_group("property/resolve_string");

    let mut registry_string = PropertyRegistry::new();
    let visual_string = registry_string.register_type("Visual", None);
    let text: Property<String> = registry_string.register(
        "Text",
        visual_string,
        PropertyMetadataBuilder::new(String::new()).build(),
    );

    group.bench_function("local_clone", |b| {
        let mut engine = PropertyEngine::new();
        engine.attach(&registry_string, 1_u32, visual_string, None);
        engine.set_local(
            &registry_string,
            1,
            text,
            "hello world hello world hello world".to_string(),
        );
        b.iter(|| black_box(engine.value(&registry_string, 1, text)))
    });

    group.finish();

    let mut group = c.benchmark_group("property/mutate");

    group.bench_function("set_local/f64/no_callback", |b| {
        b.iter_batched(
            || {
                let mut engine = PropertyEngine::new();
                engine.attach(&registry, 1_u32, visual, None);
                engine
            },
            |mut engine| {
                engine.set_local(&registry, 1, width, 123.0_f64);
                black_box(engine);
            },
            BatchSize::SmallInput,
        )
    });

    let mut registry_with_cb = PropertyRegistry::new();
    let visual_cb = registry_with_cb.register_type("Visual", None);
    let width_cb: Property<f64> = registry_with_cb.register(
        "Width",
        visual_cb,
        PropertyMetadataBuilder::new(0.0_f64)
            .on_changed(|_old, _new| {})
            .build(),
    );
    group.bench_function("set_local/f64/with_callback", |b| {
        b.iter_batched(
            || {
                let mut engine = PropertyEngine::new();
                engine.attach(&registry_with_cb, 1_u32, visual_cb, None);
                engine
            },
            |mut engine| {
                engine.set_local(&registry_with_cb, 1, width_cb, 123.0_f64);
                black_box(engine);
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("set_local/string", |b| {
        b.iter_batched(
            || {
                let mut engine = PropertyEngine::new();
                engine.attach(&registry_string, 1_u32, visual_string, None);
                engine
            },
            |mut engine| {
                engine.set_local(&registry_string, 1, text, String::from("hello world"));
                black_box(engine);
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_property);
criterion_main!(benches);
