//! Micro-benchmarks for the hot buffer paths: tail append, scatter/gather
//! assembly, and mid-buffer editing.

use buffer::Buffer;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const BLK: usize = 4096;

fn bench_write_back(c: &mut Criterion) {
    let payload = [0x5Au8; 64];
    c.bench_function("write_back_64b", |b| {
        b.iter(|| {
            let mut buf: Buffer<BLK> = Buffer::new();
            for _ in 0..256 {
                buf.write_back(black_box(&payload)).unwrap();
            }
            black_box(buf.size())
        })
    });
}

fn bench_iov_drain(c: &mut Criterion) {
    c.bench_function("iov_drain_64k", |b| {
        b.iter(|| {
            let mut buf: Buffer<BLK> = Buffer::new();
            buf.write_back(&[0x11u8; 64 * 1024]).unwrap();
            let mut total = 0;
            while !buf.is_empty() {
                let begin = buf.begin();
                let mut vecs = Vec::new();
                buf.iov(&begin, &mut vecs, 8);
                let written: usize = vecs.iter().map(|v| v.len()).sum();
                drop(vecs);
                buf.release_mark(begin);
                buf.drop_front(written);
                total += written;
            }
            black_box(total)
        })
    });
}

fn bench_mid_insert(c: &mut Criterion) {
    c.bench_function("insert_release_mid", |b| {
        b.iter(|| {
            let mut buf: Buffer<BLK> = Buffer::new();
            buf.write_back(&[0x22u8; 2 * BLK]).unwrap();
            let m = buf.begin();
            buf.advance(&m, BLK / 2);
            for _ in 0..8 {
                buf.insert(&m, 128).unwrap();
                buf.release(&m, 128);
            }
            buf.release_mark(m);
            black_box(buf.size())
        })
    });
}

criterion_group!(benches, bench_write_back, bench_iov_drain, bench_mid_insert);
criterion_main!(benches);
