extern crate shadowclass;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use shadowclass::{
    classfile::{
        opcodes::*, AccessFlags, ClassHeader, ClassReader, ClassVisitor, ClassWriter, Insn, Label,
        Maxs, MethodHeader, MethodVisitor,
    },
    transform_class,
};
use std::hint::black_box;

/// A class with `count` branchy methods, each with two exits.
fn synthetic_class(count: usize) -> Vec<u8> {
    let mut writer = ClassWriter::new();
    writer
        .visit(&ClassHeader {
            minor_version: 0,
            major_version: 52,
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            name: "bench/Synthetic".to_string(),
            signature: None,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
        })
        .unwrap();

    for index in 0..count {
        let header = MethodHeader {
            access: AccessFlags::PUBLIC,
            name: format!("method{index}"),
            descriptor: "(II)I".to_string(),
            signature: None,
            exceptions: Vec::new(),
        };
        let mut method = writer.visit_method(&header).unwrap().unwrap();
        method.visit_code().unwrap();
        method.visit_insn(&Insn::Var { opcode: ILOAD, var: 1 }).unwrap();
        method.visit_insn(&Insn::Var { opcode: ILOAD, var: 2 }).unwrap();
        method
            .visit_insn(&Insn::Jump { opcode: IF_ICMPLE, target: Label(1) })
            .unwrap();
        method.visit_insn(&Insn::Var { opcode: ILOAD, var: 1 }).unwrap();
        method.visit_insn(&Insn::Simple(IRETURN)).unwrap();
        method.visit_label(Label(1)).unwrap();
        method.visit_insn(&Insn::Var { opcode: ILOAD, var: 2 }).unwrap();
        method.visit_insn(&Insn::Simple(IRETURN)).unwrap();
        method.visit_maxs(Maxs::Recompute).unwrap();
        method.visit_end().unwrap();
    }

    writer.visit_end().unwrap();
    writer.to_bytes().unwrap()
}

/// Benchmark the full shadow transformation against a plain read/write pass
fn bench_transform(c: &mut Criterion) {
    let data = synthetic_class(200);

    let mut group = c.benchmark_group("classfile");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("rewrite_identity", |b| {
        b.iter(|| {
            let reader = ClassReader::new(black_box(&data)).unwrap();
            let mut writer = ClassWriter::from_reader(&reader);
            reader.accept(&mut writer).unwrap();
            black_box(writer.to_bytes().unwrap())
        });
    });
    group.bench_function("transform_class", |b| {
        b.iter(|| black_box(transform_class(black_box(&data)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
