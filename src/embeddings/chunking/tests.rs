use super::*;

fn chunker(chunk_size: usize, chunk_overlap: usize) -> TextChunker {
    TextChunker::new(&ChunkingConfig {
        chunk_size,
        chunk_overlap,
    })
    .expect("chunker config should be valid")
}

fn assert_full_coverage(text: &str, chunks: &[TextChunk]) {
    let len = text.chars().count();
    let mut covered = vec![false; len];
    for chunk in chunks {
        for slot in covered
            .iter_mut()
            .take(chunk.end_offset)
            .skip(chunk.start_offset)
        {
            *slot = true;
        }
    }
    let gaps: Vec<usize> = covered
        .iter()
        .enumerate()
        .filter(|(_, c)| !**c)
        .map(|(i, _)| i)
        .filter(|&i| !text.chars().nth(i).is_some_and(char::is_whitespace))
        .collect();
    assert!(gaps.is_empty(), "uncovered offsets: {:?}", gaps);
}

#[test]
fn overlap_must_be_smaller_than_chunk_size() {
    let result = TextChunker::new(&ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 100,
    });
    assert!(matches!(result, Err(RagError::Configuration(_))));

    let result = TextChunker::new(&ChunkingConfig {
        chunk_size: 0,
        chunk_overlap: 0,
    });
    assert!(matches!(result, Err(RagError::Configuration(_))));
}

#[test]
fn empty_input_yields_no_chunks() {
    let chunker = chunker(100, 20);
    assert!(chunker.chunk("", "a.txt", &Metadata::new()).is_empty());
    assert!(chunker.chunk("   \n\n  ", "a.txt", &Metadata::new()).is_empty());
    assert!(
        chunker
            .chunk_by_structure("", "a.md", &Metadata::new())
            .is_empty()
    );
}

#[test]
fn short_text_is_a_single_trimmed_chunk() {
    let chunker = chunker(100, 20);
    let chunks = chunker.chunk("  hello world \n", "notes.txt", &Metadata::new());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "hello world");
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].start_offset, 0);
    assert_eq!(chunks[0].source_path, "notes.txt");
}

#[test]
fn exact_chunk_size_is_one_chunk() {
    let chunker = chunker(100, 20);
    let text = "b".repeat(100);
    let chunks = chunker.chunk(&text, "b.txt", &Metadata::new());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].end_offset, 100);
}

#[test]
fn uniform_text_splits_at_window_with_overlap() {
    let chunker = chunker(100, 20);
    let text = "A".repeat(130);
    let chunks = chunker.chunk(&text, "a.txt", &Metadata::new());

    assert_eq!(chunks.len(), 2);
    assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 100));
    assert_eq!(chunks[1].start_offset, 80);
    assert_eq!(chunks[1].end_offset, 130);
    assert_eq!(chunks[0].text.len(), 100);
    assert_eq!(chunks[1].text.len(), 50);
    assert_eq!(chunks[1].chunk_index, 1);
}

#[test]
fn prefers_paragraph_breaks() {
    let chunker = chunker(100, 10);
    let first = "x".repeat(90);
    let second = "y".repeat(90);
    let text = format!("{first}\n\n{second}");
    let chunks = chunker.chunk(&text, "p.txt", &Metadata::new());

    assert_eq!(chunks[0].text, first);
    assert_eq!(chunks[0].end_offset, 92);
    assert!(chunks[1].text.ends_with(&second));
}

#[test]
fn falls_back_to_sentence_breaks() {
    let chunker = chunker(100, 10);
    let text = format!("{}. {}", "s".repeat(95), "t".repeat(80));
    let chunks = chunker.chunk(&text, "s.txt", &Metadata::new());

    assert_eq!(chunks[0].end_offset, 97);
    assert!(chunks[0].text.ends_with('.'));
}

#[test]
fn falls_back_to_line_breaks() {
    let chunker = chunker(100, 10);
    let text = format!("{}\n{}", "l".repeat(120), "m".repeat(40));
    let chunks = chunker.chunk(&text, "l.txt", &Metadata::new());

    assert_eq!(chunks[0].end_offset, 121);
    assert_eq!(chunks[0].text, "l".repeat(120));
}

#[test]
fn early_boundaries_never_stall_progress() {
    // A paragraph break right at the start of every window would move the
    // window backwards if it were accepted.
    let chunker = chunker(100, 90);
    let text = format!("ab\n\n{}", "z".repeat(400));
    let chunks = chunker.chunk(&text, "z.txt", &Metadata::new());

    assert!(chunks.len() > 1);
    for pair in chunks.windows(2) {
        assert!(pair[1].start_offset > pair[0].start_offset);
    }
    assert_full_coverage(&text, &chunks);
}

#[test]
fn long_text_is_fully_covered_and_terminates() {
    let chunker = chunker(120, 30);
    let text = "The quick brown fox jumps over the lazy dog. \
                Pack my box with five dozen liquor jugs.\n\n"
        .repeat(40);
    let chunks = chunker.chunk(&text, "long.txt", &Metadata::new());

    assert!(chunks.len() > 10);
    assert_full_coverage(&text, &chunks);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index as usize, i);
        assert!(!chunk.text.is_empty());
        assert_eq!(chunk.text, chunk.text.trim());
    }
}

#[test]
fn chunking_is_deterministic() {
    let chunker = chunker(80, 15);
    let text = "Line one.\nLine two is longer. Another sentence here.\n\n".repeat(12);
    let mut metadata = Metadata::new();
    metadata.insert("file_name".to_string(), "x.txt".into());

    let first = chunker.chunk(&text, "x.txt", &metadata);
    let second = chunker.chunk(&text, "x.txt", &metadata);
    assert_eq!(first, second);
    assert!(first.iter().all(|c| c.metadata == metadata));
}

#[test]
fn multibyte_text_uses_character_offsets() {
    let chunker = chunker(10, 2);
    let text = "é".repeat(25);
    let chunks = chunker.chunk(&text, "u.txt", &Metadata::new());

    assert_eq!(chunks[0].text.chars().count(), 10);
    assert_eq!(chunks[1].start_offset, 8);
    assert_eq!(chunks.last().map(|c| c.end_offset), Some(25));
}

#[test]
fn markdown_splits_on_headings() {
    let chunker = chunker(1000, 100);
    let text = "# Title\nIntro text.\n\n## Install\nRun the installer.\n\n### Notes\nSome notes.\n";
    let chunks = chunker.chunk_by_structure(text, "docs/guide.md", &Metadata::new());

    assert_eq!(chunks.len(), 3);
    assert!(chunks[0].text.starts_with("# Title"));
    assert!(chunks[1].text.starts_with("## Install"));
    assert!(chunks[2].text.starts_with("### Notes"));
    assert_eq!(
        chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(chunks[1].start_offset, text.find("## Install").expect("heading exists"));
}

#[test]
fn markdown_sections_are_not_resplit() {
    let chunker = chunker(50, 10);
    let body = "word ".repeat(40);
    let text = format!("# One\n{body}\n# Two\nshort");
    let chunks = chunker.chunk_by_structure(&text, "big.md", &Metadata::new());

    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].text.chars().count() > 50);
}

#[test]
fn markdown_without_headings_uses_window_splitter() {
    let chunker = chunker(100, 20);
    let text = "A".repeat(130);
    let structured = chunker.chunk_by_structure(&text, "plain.md", &Metadata::new());
    let windowed = chunker.chunk(&text, "plain.md", &Metadata::new());

    assert_eq!(structured, windowed);
    assert_eq!(structured.len(), 2);
}

#[test]
fn hashtag_without_space_is_not_a_heading() {
    let chunker = chunker(1000, 100);
    let text = "# Real heading\ntext\n#hashtag is not a heading\n";
    let chunks = chunker.chunk_by_structure(text, "tags.md", &Metadata::new());

    assert_eq!(chunks.len(), 1);
}

#[test]
fn python_splits_on_declarations() {
    let chunker = chunker(1000, 100);
    let text = "\
import os

def first_function(argument):
    return os.path.join(argument, 'first')

class Widget:
    def method(self):
        return 'widget method body here'

async def fetch_things(session):
    return await session.get('https://example.com')
";
    let chunks = chunker.chunk_by_structure(text, "pkg/mod.py", &Metadata::new());

    assert_eq!(chunks.len(), 3);
    assert!(chunks[0].text.starts_with("def first_function"));
    assert!(chunks[1].text.starts_with("class Widget"));
    assert!(chunks[2].text.starts_with("async def fetch_things"));
}

#[test]
fn rust_splits_on_items() {
    let chunker = chunker(1000, 100);
    let text = "\
use std::fmt;

pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, \"({}, {})\", self.x, self.y)
    }
}
";
    let chunks = chunker.chunk_by_structure(text, "src/point.rs", &Metadata::new());

    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].text.starts_with("pub struct Point"));
    assert!(chunks[1].text.starts_with("impl fmt::Display"));
}

#[test]
fn rust_splits_on_generic_impls_and_qualified_fns() {
    let chunker = chunker(1000, 100);
    let text = "\
pub struct Wrapper<T> {
    inner: Vec<T>,
    label: String,
}

impl<T: Clone> Wrapper<T> {
    pub fn first(&self) -> Option<T> {
        self.inner.first().cloned()
    }
}

pub async fn fetch_everything(urls: &[String]) -> Vec<String> {
    urls.iter().map(|url| url.to_uppercase()).collect()
}

pub(crate) const MAXIMUM_WRAPPED_ITEMS: usize = 4096 * 16 + 1024 * 3;

unsafe extern \"C\" fn raw_callback(data: *const u8, len: usize) -> i32 {
    i32::from(len > 0 && !data.is_null())
}

macro_rules! wrapper_of {
    ($($item:expr),*) => { Wrapper { inner: vec![$($item),*], label: String::new() } };
}
";
    let chunks = chunker.chunk_by_structure(text, "src/wrapper.rs", &Metadata::new());

    let starts: Vec<&str> = chunks
        .iter()
        .map(|c| c.text.lines().next().unwrap_or_default())
        .collect();
    assert_eq!(
        starts,
        vec![
            "pub struct Wrapper<T> {",
            "impl<T: Clone> Wrapper<T> {",
            "pub async fn fetch_everything(urls: &[String]) -> Vec<String> {",
            "pub(crate) const MAXIMUM_WRAPPED_ITEMS: usize = 4096 * 16 + 1024 * 3;",
            "unsafe extern \"C\" fn raw_callback(data: *const u8, len: usize) -> i32 {",
            "macro_rules! wrapper_of {",
        ]
    );
}

#[test]
fn rust_identifiers_sharing_a_keyword_prefix_do_not_split() {
    let chunker = chunker(1000, 100);
    let text = "\
pub fn configure(settings: &mut Vec<String>) -> usize {
    settings.len()
}
implementation_detail!(settings);
typed_value = 3;
";
    let chunks = chunker.chunk_by_structure(text, "src/config.rs", &Metadata::new());

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("typed_value"));
}

#[test]
fn oversized_code_sections_are_resplit() {
    let chunker = chunker(100, 20);
    let body = "    value = value + 1\n".repeat(20);
    let text = format!("def big():\n{body}\ndef small_but_long_enough_name(x):\n    return x * 2 + 1000\n");
    let chunks = chunker.chunk_by_structure(&text, "big.py", &Metadata::new());

    assert!(chunks.len() > 2);
    // A window may stretch up to a paragraph break 100 characters past its end
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
    assert_eq!(
        chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
        (0..chunks.len() as u32).collect::<Vec<_>>()
    );
    assert!(chunks.last().is_some_and(|c| c.text.starts_with("def small")));
}

#[test]
fn tiny_code_falls_back_to_window_splitter() {
    let chunker = chunker(100, 20);
    let text = "def a():\n    pass\n";
    let chunks = chunker.chunk_by_structure(text, "tiny.py", &Metadata::new());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, text.trim());
}

#[test]
fn unknown_extensions_use_window_splitter() {
    let chunker = chunker(100, 20);
    let text = "class Foo {}\n".repeat(20);
    let structured = chunker.chunk_by_structure(&text, "Foo.java", &Metadata::new());
    let windowed = chunker.chunk(&text, "Foo.java", &Metadata::new());

    assert_eq!(structured, windowed);
}

#[test]
fn extension_matching_ignores_case() {
    assert_eq!(CodeLanguage::from_extension("py"), Some(CodeLanguage::Python));
    assert_eq!(CodeLanguage::from_extension("tsx"), Some(CodeLanguage::Script));
    assert_eq!(CodeLanguage::from_extension("java"), None);

    let chunker = chunker(1000, 100);
    let text = "# A\none\n# B\ntwo\n";
    assert_eq!(
        chunker
            .chunk_by_structure(text, "README.MD", &Metadata::new())
            .len(),
        2
    );
}
