use cdsf_gloss::{Annotator, bundled, tokenizer};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Once;

const SENTENCES: &[(&str, &str)] = &[
    ("short", "The grace and virtue of the Grace inspired hope."),
    (
        "fuzzy",
        "A knights corage and salvag of honour, hoping for mercy and wisdm.",
    ),
    (
        "long",
        "On the long journey the knight kept faith; his courage, his mercy and his kindly wisdom \
         were a light to others, and by virtue of that honour he could salvage hope where grace \
         had failed. The knight's journey inspired stories of courage, faith and light.",
    ),
];

fn ensure_loaded() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // Build the bundled index once so the benches measure steady-state queries.
        let _ = bundled();
    });
}

fn bench_tokenize(c: &mut Criterion) {
    for &(label, sentence) in SENTENCES {
        c.bench_with_input(BenchmarkId::new("tokenize", label), &sentence, |b, &sentence| {
            b.iter(|| black_box(tokenizer::tokenize(sentence).len()));
        });
    }
}

fn bench_lookup(c: &mut Criterion) {
    ensure_loaded();
    let annotator = Annotator::bundled();
    const WORDS: &[&str] = &["grace", "Salvage", "salvag", "hoping", "zzzzqx"];
    for &word in WORDS {
        c.bench_with_input(BenchmarkId::new("lookup", word), &word, |b, &word| {
            b.iter(|| black_box(annotator.lookup(word).found()));
        });
    }
}

fn bench_detect(c: &mut Criterion) {
    ensure_loaded();
    let annotator = Annotator::bundled();
    for &(label, sentence) in SENTENCES {
        c.bench_with_input(BenchmarkId::new("detect", label), &sentence, |b, &sentence| {
            b.iter(|| black_box(annotator.detect(sentence).matches().len()));
        });
    }
}

criterion_group!(benches, bench_tokenize, bench_lookup, bench_detect);
criterion_main!(benches);
