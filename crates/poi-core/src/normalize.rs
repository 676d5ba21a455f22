//! Search keys for free-text labels.
//!
//! POI and tag names are frequently written in Chinese. To make them
//! searchable from a Latin keyboard without a full-text index, every label is
//! stored alongside the concatenated first letters of its romanisation:
//! `"中央公园"` becomes `"zygy"`. Latin and digit runs contribute the first
//! character of each word, lower-cased, so `"Central Park"` becomes `"cp"`.

use pinyin::ToPinyin;

/// Derive the romanised-initials search key for `label`.
///
/// Pure and deterministic; the empty string maps to the empty string.
/// Punctuation and whitespace only separate words and never appear in the
/// output.
pub fn derive_search_key(label: &str) -> String {
  let mut key = String::with_capacity(label.len());
  let mut in_word = false;

  for ch in label.chars() {
    if let Some(py) = ch.to_pinyin() {
      key.push_str(py.first_letter());
      in_word = false;
    } else if ch.is_alphanumeric() {
      if !in_word {
        key.extend(ch.to_lowercase());
      }
      in_word = true;
    } else {
      in_word = false;
    }
  }

  key
}
