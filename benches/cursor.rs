//! Benchmarks for cursor pattern search and editing.
//!
//! Measures the operations IL rules spend their time in:
//! - Forward window search over long bodies
//! - Collecting every match of a window without moving
//! - Repeated find-and-replace loops
//! - Insertion in front of labeled instructions

extern crate cilpatch;

use cilpatch::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

/// A body of `blocks` repetitions of `ldarg.0; ldfld F; ldc.r4 0; ble.un L; call _initblk`,
/// every block jumping to the final `ret`.
fn render_body(blocks: usize) -> MethodBody {
    let mut body = MethodBody::new();
    let end = body.define_label();
    let field = MemberRef::field("Game.Slot", "highlightEase", "System.Single");
    let init = MemberRef::method("Game.Native", "_initblk", "System.Void ()");
    for _ in 0..blocks {
        body.push(Instruction::simple(OpCode::Ldarg0).unwrap());
        body.push(Instruction::new(OpCode::Ldfld, Operand::Member(field.clone())).unwrap());
        body.push(Instruction::new(OpCode::LdcR4, Operand::Float32(0.0)).unwrap());
        body.push(Instruction::new(OpCode::BleUn, Operand::Label(end)).unwrap());
        body.push(Instruction::new(OpCode::Call, Operand::Member(init.clone())).unwrap());
    }
    let ret = body.push(Instruction::simple(OpCode::Ret).unwrap());
    body.bind_label(end, ret).unwrap();
    body
}

/// Benchmark finding a window that sits at the very end of a large body.
fn bench_goto_next_last_window(c: &mut Criterion) {
    let mut body = render_body(2_000);
    let ret = matchers::opcode(OpCode::Ret);
    let load = matchers::ldfld("Game.Slot", "highlightEase");
    let window: [Matcher<'_>; 1] = [&ret];
    let first: [Matcher<'_>; 1] = [&load];

    c.bench_function("cursor_goto_next_last_window", |b| {
        b.iter(|| {
            let mut cursor = ILCursor::new(&mut body, "Game.Slot::Render");
            cursor.goto_next(black_box(&window)).unwrap();
            black_box(cursor.index())
        });
    });

    c.bench_function("cursor_goto_prev_first_window", |b| {
        b.iter(|| {
            let mut cursor = ILCursor::new(&mut body, "Game.Slot::Render");
            let end = cursor.len();
            cursor.goto_index(end).unwrap();
            while cursor.try_goto_prev(black_box(&first)) {}
            black_box(cursor.index())
        });
    });
}

/// Benchmark collecting every three-instruction window.
fn bench_find_all_windows(c: &mut Criterion) {
    let mut body = render_body(2_000);
    let load = matchers::ldfld("Game.Slot", "highlightEase");
    let constant = matchers::ldc_r4_any();
    let skip = matchers::branch(OpCode::BleUn);
    let window: [Matcher<'_>; 3] = [&load, &constant, &skip];

    c.bench_function("cursor_find_next_all", |b| {
        b.iter(|| {
            let cursor = ILCursor::new(&mut body, "Game.Slot::Render");
            black_box(cursor.try_find_next(black_box(&window)).len())
        });
    });
}

/// Benchmark the placeholder substitution loop over a fresh body each iteration.
fn bench_replace_loop(c: &mut Criterion) {
    let placeholder = matchers::call("", "_initblk");

    c.bench_function("cursor_replace_all_placeholders", |b| {
        b.iter_batched(
            || render_body(500),
            |mut body| {
                let mut cursor = ILCursor::new(&mut body, "Game.Slot::Render");
                while cursor.try_goto_next(&[&placeholder]) {
                    cursor.replace(OpCode::Initblk, Operand::None).unwrap();
                }
                black_box(body.len())
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark inserting in front of a heavily targeted instruction, in both label modes.
fn bench_insert_at_label(c: &mut Criterion) {
    for (name, after_labels) in [
        ("cursor_insert_before_labels", false),
        ("cursor_insert_after_labels", true),
    ] {
        c.bench_function(name, |b| {
            b.iter_batched(
                || render_body(200),
                |mut body| {
                    let mut cursor = ILCursor::new(&mut body, "Game.Slot::Render");
                    let end = cursor.len() - 1;
                    cursor.goto_index(end).unwrap();
                    if after_labels {
                        cursor.move_after_labels();
                    }
                    for _ in 0..100 {
                        cursor.emit(OpCode::Nop, Operand::None).unwrap();
                    }
                    black_box(body.len())
                },
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(
    benches,
    bench_goto_next_last_window,
    bench_find_all_windows,
    bench_replace_loop,
    bench_insert_at_label
);
criterion_main!(benches);
