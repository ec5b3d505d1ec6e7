use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fileferry::file_transfer::{MAX_CHUNK, WireCodec};
use std::io::Cursor;

fn bench_chunk_frame_roundtrip(c: &mut Criterion) {
    let codec = WireCodec::new();
    let payload = vec![0x55; MAX_CHUNK];

    c.bench_function("codec_chunk_roundtrip_1KB", |b| {
        b.iter(|| {
            let mut buf: Vec<u8> = Vec::with_capacity(MAX_CHUNK + 16);
            // write phase
            futures::executor::block_on(async {
                codec.write_chunk(&mut buf, &payload).await.unwrap();
            });
            // read phase
            futures::executor::block_on(async {
                let mut r = Cursor::new(&buf[..]);
                let chunk = codec.read_chunk(&mut r).await.unwrap();
                black_box(chunk.len())
            });
        })
    });
}

criterion_group!(benches, bench_chunk_frame_roundtrip);
criterion_main!(benches);
