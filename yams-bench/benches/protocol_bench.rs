//! Framing and envelope encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use yams_protocol::envelope::{Envelope, Payload, SearchRequest, SearchResponse, SearchResult};
use yams_protocol::frame::{checksum, encode_frame, Frame, FrameFlags};
use yams_protocol::FrameReader;

fn create_test_request(query_size: usize) -> Envelope {
    Envelope::new(
        1,
        "bench",
        Payload::SearchRequest(SearchRequest {
            query: "x".repeat(query_size),
            limit: 20,
            fuzzy: true,
            similarity: 0.7,
            ..Default::default()
        }),
    )
}

fn create_test_response(results: usize) -> Envelope {
    let results = (0..results)
        .map(|i| SearchResult {
            id: format!("doc-{}", i),
            path: format!("/home/user/notes/{}.md", i),
            title: format!("Note {}", i),
            snippet: "lorem ipsum dolor sit amet ".repeat(4),
            score: 1.0 / (i + 1) as f64,
            ..Default::default()
        })
        .collect::<Vec<_>>();

    Envelope::new(
        1,
        "bench",
        Payload::SearchResponse(SearchResponse {
            total_count: results.len() as u64,
            results,
            elapsed_ms: 3,
        }),
    )
}

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    for size in [100, 1000, 10000] {
        let frame = Frame::new(Bytes::from("x".repeat(size)));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(frame.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_frame_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_read");

    for size in [100, 1000, 10000] {
        let encoded = Frame::new(Bytes::from("x".repeat(size))).encode().unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut reader = FrameReader::default();
                reader.append(encoded);
                black_box(reader.try_read_frame().unwrap())
            });
        });
    }

    group.finish();
}

/// Many small frames delivered in fixed-size reads, as off a socket.
fn bench_frame_read_fragmented(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_read_fragmented");

    let mut stream = Vec::new();
    for i in 0..256 {
        let payload = format!("{{\"request_id\":{},\"payload\":\"{}\"}}", i, "y".repeat(200));
        stream.extend_from_slice(&encode_frame(payload.as_bytes(), FrameFlags::empty()).unwrap());
    }

    for read_size in [512, 4096, 65536] {
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(read_size),
            &read_size,
            |b, &read_size| {
                b.iter(|| {
                    let mut reader = FrameReader::default();
                    let mut frames = 0;
                    for chunk in stream.chunks(read_size) {
                        reader.append(chunk);
                        frames += reader.drain().filter(|r| r.is_ok()).count();
                    }
                    black_box(frames)
                });
            },
        );
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for size in [100, 1000, 10000] {
        let request = create_test_request(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(request.encode_frame(FrameFlags::empty()).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for results in [1, 20, 200] {
        let encoded = create_test_response(results).to_bytes().unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(results),
            &encoded,
            |b, encoded| {
                b.iter(|| black_box(Envelope::from_bytes(encoded).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");

    for size in [100, 1000, 10000, 100000] {
        let data = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(checksum(data)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_read,
    bench_frame_read_fragmented,
    bench_request_encode,
    bench_response_decode,
    bench_checksum,
);

criterion_main!(benches);
