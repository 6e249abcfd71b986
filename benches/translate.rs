use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use revcryptfs::config::ContentCipher;
use revcryptfs::crypto::{derive, ContentSizing, Purpose};
use revcryptfs::fs::{InoMap, InoTag, QIno};

/// Inode translation: hot path (already-seen namespace) and first sight
fn bench_inomap(c: &mut Criterion) {
    let mut group = c.benchmark_group("inomap");

    let map = InoMap::new();
    map.translate(QIno::new(1, InoTag::Real, 1)).unwrap();
    group.bench_function("known_namespace", |b| {
        let mut ino = 0u64;
        b.iter(|| {
            ino = ino.wrapping_add(1) & 0xffff_ffff;
            black_box(map.translate(black_box(QIno::new(1, InoTag::Real, ino))).unwrap())
        })
    });

    group.bench_function("new_map_first_sight", |b| {
        b.iter(|| {
            let map = InoMap::new();
            for tag in [InoTag::Real, InoTag::DirIv, InoTag::Config] {
                black_box(map.translate(QIno::new(42, tag, 1000)).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_sizing(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_sizing");

    for cipher in [ContentCipher::AesGcm, ContentCipher::XChaCha20Poly1305] {
        let sizing = ContentSizing::new(4096, cipher);
        group.bench_with_input(
            BenchmarkId::new("plain_to_cipher", format!("{:?}", cipher)),
            &sizing,
            |b, sizing| {
                b.iter(|| {
                    for size in [0u64, 1, 4096, 4097, 1 << 30] {
                        black_box(sizing.plain_to_cipher(black_box(size)));
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_pathiv(c: &mut Criterion) {
    c.bench_function("pathiv_derive", |b| {
        b.iter(|| black_box(derive(black_box("photos/2024/summer"), Purpose::DirIv)))
    });
}

criterion_group!(benches, bench_inomap, bench_sizing, bench_pathiv);
criterion_main!(benches);
