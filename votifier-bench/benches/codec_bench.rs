//! Vote block encoding/decoding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use votifier_protocol::{Vote, VoteDecoder, VoteEncoder};

const KEY_SIZES: [usize; 2] = [1024, 2048];

fn create_test_vote() -> Vote {
    Vote::new("ExampleSite", "Alice", "203.0.113.42", "1700000000")
}

fn codec_for(bits: usize) -> (VoteEncoder, VoteDecoder) {
    let private = RsaPrivateKey::new(&mut OsRng, bits).unwrap();
    (
        VoteEncoder::new(RsaPublicKey::from(&private)),
        VoteDecoder::new(private),
    )
}

fn bench_vote_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote_parse");
    let plaintext = create_test_vote().to_plaintext().unwrap();

    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("plaintext", |b| {
        b.iter(|| black_box(VoteDecoder::parse(&plaintext).unwrap()));
    });

    group.finish();
}

fn bench_vote_encrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote_encrypt");
    let vote = create_test_vote();

    for bits in KEY_SIZES {
        let (encoder, _) = codec_for(bits);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(bits), &encoder, |b, encoder| {
            b.iter(|| black_box(encoder.encrypt(&vote).unwrap()));
        });
    }

    group.finish();
}

fn bench_vote_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("vote_decode");
    let vote = create_test_vote();

    for bits in KEY_SIZES {
        let (encoder, decoder) = codec_for(bits);
        let block = encoder.encrypt(&vote).unwrap();

        group.throughput(Throughput::Bytes(block.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bits), &block, |b, block| {
            b.iter(|| black_box(decoder.decode(block).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_vote_parse,
    bench_vote_encrypt,
    bench_vote_decode,
);

criterion_main!(benches);
