use criterion::{black_box, criterion_group, criterion_main, Criterion};
use storyline_vecmath::{cosine_similarity, mean, weighted_mean};

fn pseudo_random_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) as f32) / (u32::MAX as f32) - 0.5
        })
        .collect()
}

fn bench_cosine(c: &mut Criterion) {
    let a = pseudo_random_vec(768, 1);
    let b = pseudo_random_vec(768, 2);
    let wide = pseudo_random_vec(1536, 3);

    c.bench_function("cosine_768", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
    c.bench_function("cosine_1536_vs_768", |bench| {
        bench.iter(|| cosine_similarity(black_box(&wide), black_box(&b)))
    });
}

fn bench_best_of_1000(c: &mut Criterion) {
    let centroids: Vec<Vec<f32>> = (0..1000).map(|i| pseudo_random_vec(768, 100 + i)).collect();
    let query = pseudo_random_vec(768, 7);

    c.bench_function("best_match_1000_clusters", |bench| {
        bench.iter(|| {
            let mut best = f32::MIN;
            for centroid in &centroids {
                let s = cosine_similarity(black_box(&query), centroid).unwrap_or(0.0);
                if s > best {
                    best = s;
                }
            }
            best
        })
    });
}

fn bench_centroids(c: &mut Criterion) {
    let members: Vec<Vec<f32>> = (0..50).map(|i| pseudo_random_vec(768, 500 + i)).collect();
    let centroid = pseudo_random_vec(768, 9);
    let v = pseudo_random_vec(768, 10);

    c.bench_function("mean_50x768", |bench| bench.iter(|| mean(black_box(&members))));
    c.bench_function("incremental_update_768", |bench| {
        bench.iter(|| weighted_mean(black_box(&centroid), 12, black_box(&v), 1))
    });
}

criterion_group!(benches, bench_cosine, bench_best_of_1000, bench_centroids);
criterion_main!(benches);
