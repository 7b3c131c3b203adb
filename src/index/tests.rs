use super::*;
use crate::test_support::{StubEmbedder, chunk};

fn index_of(vectors: &[[f32; 2]]) -> VectorIndex {
    let chunks = (0..vectors.len())
        .map(|i| chunk(0, i, &format!("chunk {i}")))
        .collect();
    VectorIndex::from_parts("test", chunks, vectors.iter().map(|v| v.to_vec()).collect())
        .expect("valid parts")
}

#[test]
fn search_orders_by_increasing_distance() {
    let index = index_of(&[[5.0, 5.0], [1.0, 0.0], [0.0, 2.0], [0.0, 0.5]]);

    let hits = index.search(&[0.0, 0.0], 3).expect("search succeeds");

    let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["chunk 3", "chunk 1", "chunk 2"]);
    assert!((hits[0].distance - 0.25).abs() < f32::EPSILON);
    assert!((hits[1].distance - 1.0).abs() < f32::EPSILON);
    assert!((hits[2].distance - 4.0).abs() < f32::EPSILON);
}

#[test]
fn search_returns_at_most_k_with_non_decreasing_distance() {
    let index = index_of(&[[3.0, 1.0], [0.2, 0.1], [9.0, 9.0], [1.0, 1.0], [0.0, 4.0]]);

    for k in 1..=5 {
        let hits = index.search(&[0.5, 0.5], k).expect("search succeeds");
        assert_eq!(hits.len(), k);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

#[test]
fn k_larger_than_index_returns_everything() {
    let index = index_of(&[[1.0, 0.0], [0.0, 1.0]]);

    let hits = index.search(&[0.0, 0.0], 10).expect("search succeeds");
    assert_eq!(hits.len(), 2);
}

#[test]
fn ties_keep_insertion_order() {
    let index = index_of(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]]);

    let hits = index.search(&[0.0, 0.0], 4).expect("search succeeds");

    let positions: Vec<usize> = hits.iter().map(|h| h.chunk.chunk_index).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
}

#[test]
fn zero_k_is_rejected() {
    let index = index_of(&[[1.0, 0.0]]);
    assert!(index.search(&[0.0, 0.0], 0).is_err());
}

#[test]
fn query_dimension_must_match() {
    let index = index_of(&[[1.0, 0.0]]);
    let err = index.search(&[0.0, 0.0, 0.0], 1).expect_err("should fail");
    assert!(err.to_string().contains("3 dimensions"));
}

#[test]
fn from_parts_rejects_inconsistent_input() {
    assert!(VectorIndex::from_parts("m", vec![chunk(0, 0, "a")], vec![]).is_err());
    assert!(VectorIndex::from_parts("m", vec![chunk(0, 0, "a")], vec![vec![]]).is_err());
    assert!(
        VectorIndex::from_parts(
            "m",
            vec![chunk(0, 0, "a"), chunk(0, 1, "b")],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .is_err()
    );
}

#[test]
fn accessors() {
    let index = index_of(&[[1.0, 2.0], [3.0, 4.0]]);

    assert_eq!(index.len(), 2);
    assert!(!index.is_empty());
    assert_eq!(index.dimension(), 2);
    assert_eq!(index.model(), "test");
    assert_eq!(index.vector(1), Some([3.0, 4.0].as_slice()));
    assert_eq!(index.vector(2), None);
    assert_eq!(index.entries().count(), 2);
}

#[test]
fn checksum_tracks_content() {
    let a = index_of(&[[1.0, 2.0], [3.0, 4.0]]);
    let b = index_of(&[[1.0, 2.0], [3.0, 4.0]]);
    let c = index_of(&[[1.0, 2.0], [3.0, 4.5]]);

    assert_eq!(a.checksum(), b.checksum());
    assert_ne!(a.checksum(), c.checksum());
    assert_eq!(a.checksum().len(), 64);
}

#[tokio::test]
async fn build_embeds_every_chunk_in_order() {
    let embedder = StubEmbedder::new(8);
    let chunks = vec![
        chunk(0, 0, "Deductibles apply per calendar year."),
        chunk(0, 1, "Copays are fixed amounts."),
        chunk(1, 0, "Emergency care is always covered."),
    ];

    let index = VectorIndex::build(chunks.clone(), &embedder)
        .await
        .expect("build succeeds");

    assert_eq!(index.chunks(), chunks.as_slice());
    assert_eq!(index.dimension(), 8);
    assert_eq!(index.model(), "stub-embed");
    assert_eq!(
        index.vector(2).map(<[f32]>::to_vec),
        Some(embedder.vector_for("Emergency care is always covered."))
    );
}

#[tokio::test]
async fn build_drops_duplicate_chunks_keeping_the_first() {
    let embedder = StubEmbedder::new(4);
    let chunks = vec![
        chunk(0, 0, "same text"),
        chunk(0, 1, "same text"),
        chunk(1, 0, "same text"),
    ];

    let index = VectorIndex::build(chunks, &embedder)
        .await
        .expect("build succeeds");

    assert_eq!(index.len(), 2);
    assert_eq!(index.chunks()[0].chunk_index, 0);
    assert_eq!(index.chunks()[1].page, 1);
}

#[tokio::test]
async fn build_with_no_chunks_fails() {
    let embedder = StubEmbedder::new(4);

    let err = VectorIndex::build(Vec::new(), &embedder)
        .await
        .expect_err("should fail");
    assert!(matches!(err, AgentError::IndexBuild(_)));
}

#[tokio::test]
async fn provider_failure_aborts_build() {
    let embedder = StubEmbedder::failing(4);

    let err = VectorIndex::build(vec![chunk(0, 0, "text")], &embedder)
        .await
        .expect_err("should fail");
    assert!(matches!(err, AgentError::Embedding(_)));
}

#[tokio::test]
async fn unexpected_dimension_aborts_build() {
    struct Liar(StubEmbedder);

    #[async_trait::async_trait]
    impl EmbeddingProvider for Liar {
        fn model(&self) -> &str {
            "liar"
        }
        fn dimension(&self) -> usize {
            16
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed_batch(texts).await
        }
    }

    let err = VectorIndex::build(vec![chunk(0, 0, "text")], &Liar(StubEmbedder::new(4)))
        .await
        .expect_err("should fail");
    assert!(matches!(err, AgentError::IndexBuild(_)));
}

#[tokio::test]
async fn identical_text_is_its_own_nearest_neighbour() {
    let embedder = StubEmbedder::new(16);
    let texts = ["in-network rates", "out-of-network rates", "pharmacy benefits"];
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(i, t)| chunk(i, 0, t))
        .collect();

    let index = VectorIndex::build(chunks, &embedder)
        .await
        .expect("build succeeds");

    let hits = index
        .search(&embedder.vector_for("pharmacy benefits"), 1)
        .expect("search succeeds");
    assert_eq!(hits[0].chunk.text, "pharmacy benefits");
    assert!(hits[0].distance.abs() < f32::EPSILON);
}
