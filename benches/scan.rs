use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memscan::{
    Alignment, Constraint, ReadGroup, ScanKind, ScanRequest, Scanner, Snapshot, Token, Type,
    Value,
};
use std::sync::Arc;

const BASE: u64 = 0x10_0000;
const SIZE: usize = 8 * 1024 * 1024;

fn scan_eq(c: &mut Criterion) {
    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .build()
            .expect("thread pool"),
    );
    let scanner = Scanner::new(&pool);

    // pseudo-random bytes with a few planted hits
    let mut bytes: Vec<u8> = (0..SIZE).map(|i| (i as u32).wrapping_mul(2654435761) as u8).collect();

    for offset in (0..SIZE).step_by(SIZE / 16) {
        bytes[offset..offset + 4].copy_from_slice(&1000u32.to_le_bytes());
    }

    let reader = move |address: u64, out: &mut [u8]| -> anyhow::Result<usize> {
        let offset = (address - BASE) as usize;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(out.len())
    };

    let mut group = c.benchmark_group("scan_eq");
    group.throughput(Throughput::Bytes(SIZE as u64));

    for (name, alignment) in [("aligned", Alignment::Four), ("unaligned", Alignment::One)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let snapshot = Snapshot::new(
                    "Bench",
                    vec![Arc::new(ReadGroup::new(BASE, SIZE))],
                    alignment,
                );

                let request = ScanRequest::new(
                    Type::U32,
                    Constraint::with_value(ScanKind::Eq, Value::U32(1000)),
                )
                .with_alignment(alignment);

                let out = scanner
                    .scan(
                        &snapshot,
                        &reader,
                        &request,
                        &Token::new(),
                        |_: u64, _: u64, _: bool| {},
                    )
                    .expect("scan");

                black_box(out.element_count());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, scan_eq);
criterion_main!(benches);
