use crate::models::DocumentChunk;

/// Chunks shorter than this are discarded as extraction noise.
pub const MIN_CHUNK_CHARS: usize = 100;

/// Round a byte position up to the next char boundary.
fn ceil_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Round a byte position down to the previous char boundary.
fn floor_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Splits text into overlapping spans of at most `max_chunk_size` bytes,
/// preferring paragraph, line and sentence boundaries.
fn split_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= max_chunk_size {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = ceil_char_boundary(text, (start + max_chunk_size).min(text.len()));

        let actual_end = if end < text.len() {
            find_break_point(text, start, end)
        } else {
            end
        };

        let piece = text[start..actual_end].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        let next_start = if actual_end > overlap {
            floor_char_boundary(text, actual_end - overlap)
        } else {
            actual_end
        };

        if next_start <= start {
            start = actual_end;
        } else {
            start = next_start;
        }
    }

    pieces
}

fn find_break_point(text: &str, start: usize, max_end: usize) -> usize {
    let segment = &text[start..max_end];

    if let Some(pos) = segment.rfind("\n\n") {
        return start + pos + 2;
    }
    if let Some(pos) = segment.rfind('\n') {
        return start + pos + 1;
    }
    // Arabic question mark included alongside the Latin sentence enders
    for sentinel in [". ", "؟ ", "? ", "! "] {
        if let Some(pos) = segment.rfind(sentinel) {
            return start + pos + sentinel.len();
        }
    }
    if let Some(pos) = segment.rfind(' ') {
        return start + pos + 1;
    }
    max_end
}

/// Chunks one report's cleaned text. Spans below [`MIN_CHUNK_CHARS`] are
/// dropped; surviving chunks keep their 1-based ordinal from the split,
/// and get a stable id of the form `{stem}_chunk_{NNN}`.
pub fn chunk_document(
    stem: &str,
    text: &str,
    max_chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    split_text(text, max_chunk_size, overlap)
        .into_iter()
        .enumerate()
        .filter_map(|(i, piece)| {
            if piece.chars().count() < MIN_CHUNK_CHARS {
                return None;
            }
            let index = i + 1;
            Some(DocumentChunk {
                index,
                chunk_id: format!("{}_chunk_{:03}", stem, index),
                text: piece,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arabic_text_chunking() {
        let text = "يواصل صندوق الاستثمارات العامة تنفيذ استراتيجيته الطموحة؟ \
                    وقد بلغ إجمالي الأصول المدارة مستويات قياسية خلال العام. \
                    كما أطلق الصندوق عدداً من الشركات الجديدة في قطاعات واعدة."
            .repeat(3);
        let pieces = split_text(&text, 200, 40);
        assert!(!pieces.is_empty());
        for piece in &pieces {
            assert!(!piece.is_empty());
            assert!(piece.len() <= 200 + 4);
        }
    }

    #[test]
    fn test_mixed_text_chunking() {
        let text = "NEOM received significant funding in 2023. \
                    وشهد مشروع نيوم توسعاً كبيراً خلال نفس الفترة. \
                    The fund's portfolio now spans 13 strategic sectors.";
        let pieces = split_text(text, 80, 10);
        assert!(!pieces.is_empty());
        for piece in &pieces {
            assert!(!piece.is_empty());
        }
    }

    #[test]
    fn test_small_text_single_piece() {
        let pieces = split_text("short", 100, 10);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], "short");
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 100, 10).is_empty());
        assert!(chunk_document("report", "", 100, 10).is_empty());
    }

    #[test]
    fn test_chunks_below_minimum_length_are_dropped() {
        let chunks = chunk_document("report", "too small to keep", 1000, 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_ids_are_stable_and_padded() {
        let sentence = "The Public Investment Fund expanded its holdings across multiple sectors during the reporting period under review. ";
        let text = sentence.repeat(20);
        let chunks = chunk_document("PIF Annual Report 2021", &text, 400, 50);
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].chunk_id, "PIF Annual Report 2021_chunk_001");
        for chunk in &chunks {
            assert!(chunk.text.chars().count() >= MIN_CHUNK_CHARS);
            assert!(chunk.chunk_id.starts_with("PIF Annual Report 2021_chunk_"));
        }
    }
}
