//! Cross-strategy tag merging.

use std::collections::HashMap;

use foaintel_shared::{SemanticTag, sort_by_confidence};

/// Deduplicate by tag path keeping the highest confidence, sort descending,
/// and keep at most `max_tags`.
///
/// On equal confidence the first-seen instance wins, so strategy order
/// decides which `method` is reported.
pub fn merge_tags(tags: impl IntoIterator<Item = SemanticTag>, max_tags: usize) -> Vec<SemanticTag> {
    let mut merged: Vec<SemanticTag> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();

    for tag in tags {
        match by_path.get(&tag.tag) {
            Some(&i) => {
                if tag.confidence > merged[i].confidence {
                    merged[i] = tag;
                }
            }
            None => {
                by_path.insert(tag.tag.clone(), merged.len());
                merged.push(tag);
            }
        }
    }

    sort_by_confidence(&mut merged);
    merged.truncate(max_tags);
    merged
}
