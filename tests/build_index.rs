use std::io::Write;

use predicates::prelude::*;

use colbert_index::config::Config;
use colbert_index::encoder::InMemoryEncoder;
use colbert_index::indexer;
use colbert_index::tensor::Tensor;

fn write_collection(n: usize) -> tempfile::TempPath {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    for i in 0..n {
        writeln!(f, "integration test passage number {i} with a handful of extra words").unwrap();
    }
    f.into_temp_path()
}

fn base_config(collection: &std::path::Path, index: &std::path::Path) -> Config {
    Config {
        collection_path: collection.to_path_buf(),
        index_path: index.to_path_buf(),
        dim: 24,
        nbits: 2,
        kmeans_niters: 4,
        index_bsize: 10,
        chunksize: Some(30),
        nranks: 1,
        doc_maxlen: None,
        doc_token: None,
        skiplist: vec![],
        mask_punctuation: false,
        use_gpu: false,
        seed: 7,
    }
}

#[test]
fn build_then_check_succeeds_end_to_end() {
    let collection = write_collection(95);
    let index_dir = tempfile::tempdir().unwrap();
    let config = base_config(&collection, index_dir.path());
    let encoder = InMemoryEncoder::new(config.dim, config.seed);

    indexer::build(&config, &encoder).expect("build should succeed");
    indexer::check(index_dir.path()).expect("a complete build should pass the existence check");

    // plan.json, 95 passages / chunksize 30 => 4 chunks (30,30,30,5)
    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(index_dir.path().join("plan.json")).unwrap()).unwrap();
    assert_eq!(plan["num_chunks"], 4);
    assert_eq!(plan["chunksize"], 30);

    let ivf = Tensor::load(index_dir.path().join("ivf")).unwrap();
    let ivf_lengths = Tensor::load(index_dir.path().join("ivf_lengths")).unwrap();
    let ivf_data = ivf.as_u32().unwrap();
    let lengths = ivf_lengths.as_u32().unwrap();

    // The IVF is a permutation of [1..N_total] and its length count sums
    // to N_total.
    let n_total = ivf_data.len();
    assert_eq!(lengths.iter().sum::<u32>() as usize, n_total);
    let mut sorted = ivf_data.clone();
    sorted.sort_unstable();
    let expected: Vec<u32> = (1..=n_total as u32).collect();
    assert_eq!(sorted, expected);

    let bucket_cutoffs = Tensor::load(index_dir.path().join("bucket_cutoffs")).unwrap();
    let bucket_weights = Tensor::load(index_dir.path().join("bucket_weights")).unwrap();
    assert_eq!(bucket_cutoffs.len(), (1usize << config.nbits) - 1);
    assert_eq!(bucket_weights.len(), 1usize << config.nbits);
    let cutoffs = bucket_cutoffs.as_f32().unwrap();
    for w in cutoffs.windows(2) {
        assert!(w[0] < w[1], "bucket_cutoffs must be strictly increasing: {cutoffs:?}");
    }
}

#[test]
fn chunk_boundary_at_a_large_collection_size() {
    // num_docs = 50001, chunksize unset, nranks=1 => chunksize 25000,
    // num_chunks 3 with chunk 3 holding 1 passage. Building a real
    // 50001-passage collection is unnecessarily slow for a test; this
    // exercises the same Planner formula the full build uses.
    let plan = colbert_index::planner::plan(50_001, 120.0, 50_001, None, 1).unwrap();
    assert_eq!(plan.chunksize, 25_000);
    assert_eq!(plan.num_chunks, 3);
}

#[test]
fn two_builds_with_the_same_seed_are_byte_identical() {
    let collection = write_collection(60);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let config_a = base_config(&collection, dir_a.path());
    let config_b = base_config(&collection, dir_b.path());

    let encoder_a = InMemoryEncoder::new(config_a.dim, config_a.seed);
    let encoder_b = InMemoryEncoder::new(config_b.dim, config_b.seed);
    indexer::build(&config_a, &encoder_a).unwrap();
    indexer::build(&config_b, &encoder_b).unwrap();

    for name in ["centroids", "bucket_cutoffs", "bucket_weights", "avg_residual", "ivf", "ivf_lengths"] {
        let a = std::fs::read(dir_a.path().join(name)).unwrap();
        let b = std::fs::read(dir_b.path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differed between two identically-seeded builds");
    }
}

#[test]
fn missing_chunk_file_is_detected_after_the_fact() {
    let collection = write_collection(60);
    let index_dir = tempfile::tempdir().unwrap();
    let config = base_config(&collection, index_dir.path());
    let encoder = InMemoryEncoder::new(config.dim, config.seed);
    indexer::build(&config, &encoder).unwrap();

    std::fs::remove_file(index_dir.path().join("2.codes")).unwrap();
    let err = indexer::check(index_dir.path()).unwrap_err();
    let message = format!("{err}");
    let names_the_missing_file = predicate::str::contains("2.codes");
    assert!(
        names_the_missing_file.eval(&message),
        "error should name the missing file: {message}"
    );
}

#[test]
fn empty_collection_is_a_configuration_error() {
    let collection = write_collection(0);
    let index_dir = tempfile::tempdir().unwrap();
    let config = base_config(&collection, index_dir.path());
    let encoder = InMemoryEncoder::new(config.dim, config.seed);
    assert!(indexer::build(&config, &encoder).is_err());
}
