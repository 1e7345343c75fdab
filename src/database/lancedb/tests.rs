use super::*;

fn chunk(source_path: &str, chunk_index: u32) -> TextChunk {
    let mut metadata = Metadata::new();
    metadata.insert("file_extension".to_string(), ".rs".into());
    metadata.insert("line_count".to_string(), 12.into());

    TextChunk {
        text: "fn main() {}".to_string(),
        source_path: source_path.to_string(),
        chunk_index,
        start_offset: 0,
        end_offset: 12,
        metadata,
    }
}

#[test]
fn record_from_chunk() {
    let record = StoredRecord::from_chunk(chunk("src/main.rs", 3), vec![0.1, 0.2, 0.3]);

    assert_eq!(record.id, "src/main.rs_3");
    assert_eq!(record.text, "fn main() {}");
    assert_eq!(record.source_path, "src/main.rs");
    assert_eq!(record.chunk_index, 3);
    assert_eq!(record.vector.len(), 3);
    assert_eq!(record.metadata["line_count"], 12);
}

#[test]
fn ids_are_deterministic() {
    let first = StoredRecord::from_chunk(chunk("a/b.md", 0), vec![0.0]);
    let second = StoredRecord::from_chunk(chunk("a/b.md", 0), vec![1.0]);
    assert_eq!(first.id, second.id);
    assert_ne!(first.id, StoredRecord::record_id("a/b.md", 1));
}

#[test]
fn similarity_is_one_minus_distance() {
    let result = SearchResult {
        id: "x_0".to_string(),
        text: "text".to_string(),
        source_path: "x".to_string(),
        chunk_index: 0,
        metadata: Metadata::new(),
        distance: 0.25,
    };
    assert!((result.similarity() - 0.75).abs() < f32::EPSILON);

    let json = serde_json::to_value(&result).expect("can serialize json");
    assert_eq!(json["source_path"], "x");
    assert_eq!(json["distance"], 0.25);
}
