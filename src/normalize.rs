//! Tag text normalization
//!
//! Raw tag text is turned into two forms: a canonical slug used for identity
//! and lookups, and a display name used for presentation. Both are pluggable
//! through small capability traits so callers can substitute either one
//! without touching the registry or the engine.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Turns raw tag text into a canonical slug.
///
/// Implementations must be deterministic: inputs that should be treated as
/// the same tag have to map to the same slug.
pub trait Normalizer: Send + Sync {
    fn slug(&self, text: &str) -> String;
}

/// Turns raw tag text into a human-readable label.
pub trait Displayer: Send + Sync {
    fn display(&self, text: &str) -> String;
}

impl<F> Normalizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn slug(&self, text: &str) -> String {
        self(text)
    }
}

impl<F> Displayer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn display(&self, text: &str) -> String {
        self(text)
    }
}

/// Default normalizer.
///
/// Case-insensitive, folds accented Latin characters to ASCII, and collapses
/// every run of whitespace or punctuation into a single `-`.
///
/// `"  Café  Au-Lait "` becomes `"cafe-au-lait"`. Characters with no ASCII
/// decomposition (CJK, Cyrillic, ...) are kept lower-cased rather than dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slugger;

impl Normalizer for Slugger {
    fn slug(&self, text: &str) -> String {
        let folded: String = text
            .nfkd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect();

        folded
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Default display formatter: word capitalization.
///
/// Whitespace is trimmed and collapsed; the first letter of every word is
/// upper-cased and the rest lower-cased. Any non-alphanumeric character
/// other than an apostrophe starts a new word, so `"foo-bar"` displays as
/// `"Foo-Bar"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleCase;

impl Displayer for TitleCase {
    fn display(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut out = String::with_capacity(collapsed.len());
        let mut word_start = true;

        for c in collapsed.chars() {
            if c.is_alphanumeric() {
                if word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                word_start = false;
            } else {
                out.push(c);
                word_start = c != '\'';
            }
        }

        out
    }
}

/// Split a comma-separated tag list into trimmed, non-empty names.
///
/// This is the single-string form accepted wherever a tag name sequence is
/// expected: `"rust, async ,, tokio"` yields `["rust", "async", "tokio"]`.
pub fn split_tag_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An ordered sequence of raw tag names
///
/// Built from either a single comma-separated string or a sequence of
/// names. Sequence entries are kept as given; blank ones are rejected later
/// by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagNames(Vec<String>);

impl TagNames {
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a TagNames {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<&str> for TagNames {
    fn from(list: &str) -> Self {
        Self(split_tag_list(list))
    }
}

impl From<String> for TagNames {
    fn from(list: String) -> Self {
        Self::from(list.as_str())
    }
}

impl From<Vec<String>> for TagNames {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for TagNames {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for TagNames {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for TagNames {
    fn from(names: &[String]) -> Self {
        Self(names.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for TagNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_from_single_string_splits_list() {
        let names = TagNames::from("Rust, Go");
        assert_eq!(names.into_vec(), vec!["Rust", "Go"]);
    }

    #[test]
    fn tag_names_from_sequence_keeps_entries() {
        let names = TagNames::from(["a, b", " c "]);
        assert_eq!(names.len(), 2);
        assert_eq!(names.iter().next().map(String::as_str), Some("a, b"));
        assert!(TagNames::from(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn slug_is_case_insensitive_and_collapses_whitespace() {
        let s = Slugger;
        assert_eq!(s.slug("Hello World"), "hello-world");
        assert_eq!(s.slug("  hello   WORLD  "), "hello-world");
        assert_eq!(s.slug("hello\tworld\n"), "hello-world");
    }

    #[test]
    fn slug_folds_accents_to_ascii() {
        let s = Slugger;
        assert_eq!(s.slug("Café"), "cafe");
        assert_eq!(s.slug("Crème Brûlée"), "creme-brulee");
        assert_eq!(s.slug("naïve"), s.slug("NAIVE"));
    }

    #[test]
    fn slug_collapses_punctuation_runs() {
        let s = Slugger;
        assert_eq!(s.slug("C++ / Rust!!"), "c-rust");
        assert_eq!(s.slug("--already-slugged--"), "already-slugged");
    }

    #[test]
    fn slug_keeps_scripts_without_ascii_form() {
        let s = Slugger;
        assert_eq!(s.slug("日本 語"), "日本-語");
        assert_eq!(s.slug("Привет"), "привет");
    }

    #[test]
    fn slug_of_blank_text_is_empty() {
        assert_eq!(Slugger.slug("   "), "");
        assert_eq!(Slugger.slug("!!!"), "");
    }

    #[test]
    fn title_case_capitalizes_words() {
        let d = TitleCase;
        assert_eq!(d.display("hello world"), "Hello World");
        assert_eq!(d.display("  hELLO   wORLD "), "Hello World");
        assert_eq!(d.display("foo-bar"), "Foo-Bar");
        assert_eq!(d.display("don't panic"), "Don't Panic");
    }

    #[test]
    fn closures_are_normalizers_and_displayers() {
        let upper = |text: &str| text.to_uppercase();
        assert_eq!(Normalizer::slug(&upper, "abc"), "ABC");
        assert_eq!(Displayer::display(&upper, "abc"), "ABC");
    }

    #[test]
    fn split_tag_list_trims_and_drops_empties() {
        assert_eq!(
            split_tag_list("rust, async ,, tokio"),
            vec!["rust", "async", "tokio"]
        );
        assert!(split_tag_list(" , ").is_empty());
        assert_eq!(split_tag_list("single"), vec!["single"]);
    }
}
