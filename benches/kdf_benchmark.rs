//! Cost of one PBKDF2 derivation per profile, and of a full seal/open at
//! the primary cost.
//!
//! Run with: `cargo bench --bench kdf_benchmark`
//!
//! Every envelope operation pays one derivation, so these numbers bound how
//! many sends and receives a single blocking worker can serve per second.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use handoff::keys::SALT_LEN;
use handoff::{derive_key, EnvelopeCodec, KdfProfile, PasswordPolicy, RingProvider};

const PASSWORD: &str = "Tr0ub4dor&3xyzxyzxyz";

fn bench_profiles(c: &mut Criterion) {
    let mut group = c.benchmark_group("pbkdf2_sha256");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10); // Primary runs ~hundreds of ms per iteration

    let provider = RingProvider::default();
    let salt = [7u8; SALT_LEN];

    for profile in [KdfProfile::Legacy, KdfProfile::Primary] {
        group.bench_with_input(BenchmarkId::from_parameter(profile), &profile, |b, &profile| {
            b.iter(|| derive_key(&provider, black_box(PASSWORD), black_box(&salt), profile).unwrap());
        });
    }
    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);

    let codec = EnvelopeCodec::new(
        Arc::new(RingProvider::default()),
        PasswordPolicy::default(),
        KdfProfile::Primary,
    );
    let plaintext = "x".repeat(10 * 1024); // 10KB intake form
    let sealed = codec.encrypt(&plaintext, PASSWORD).unwrap();

    group.bench_function("encrypt_10kb", |b| {
        b.iter(|| codec.encrypt(black_box(&plaintext), PASSWORD).unwrap());
    });
    group.bench_function("decrypt_10kb", |b| {
        b.iter(|| codec.decrypt(black_box(&sealed), PASSWORD).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_profiles, bench_envelope);
criterion_main!(benches);
