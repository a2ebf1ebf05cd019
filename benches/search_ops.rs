//! Benchmarks for BM25 indexing and querying.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use conduit::search::{Bm25Params, SearchDocument, SearchIndex};

const VOCAB: &[&str] = &[
    "graph", "engine", "node", "edge", "route", "plugin", "manifest", "tool", "permission",
    "agent", "index", "query", "score", "feedback", "weight", "finding", "review", "store",
    "config", "registry", "intent", "router", "state", "history", "error", "handler",
];

fn corpus(n: usize) -> Vec<SearchDocument> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    (0..n)
        .map(|i| {
            let len = rng.gen_range(20..120);
            let words: Vec<&str> = (0..len)
                .map(|_| *VOCAB.choose(&mut rng).unwrap_or(&"graph"))
                .collect();
            SearchDocument::new(format!("doc#{i}"), "bench.md", words.join(" "))
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let docs = corpus(2_000);
    c.bench_function("build_2k", |bench| {
        bench.iter(|| black_box(SearchIndex::build(docs.clone(), Bm25Params::default()).unwrap()))
    });
}

fn bench_search(c: &mut Criterion) {
    let index = SearchIndex::build(corpus(2_000), Bm25Params::default()).unwrap();
    c.bench_function("search_2k_top5", |bench| {
        bench.iter(|| black_box(index.search("graph node routing with feedback weight", 5)))
    });
}

criterion_group!(benches, bench_build, bench_search);
criterion_main!(benches);
