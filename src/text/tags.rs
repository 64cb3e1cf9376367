//! Control-tag protection and restoration.
//!
//! Game text mixes prose with control codes the engine interprets: colour
//! changes, button icons, player-name substitutions. Two kinds exist:
//!
//! * **Binary tags** from message tables, which the codec replaces with the
//!   single character [`TAG_PLACEHOLDER`] while keeping the raw bytes aside.
//! * **Textual tags** written inline as bracketed markers: `[color=red]`,
//!   `{0}`, `<icon:A>`.
//!
//! Anything that transforms text (a translator, a shaper) must move these
//! around untouched. [`protect`] swaps each tag for an indexed placeholder
//! `⟪n⟫` and [`restore`] puts them back. Prose that already contains `⟪` or
//! `⟫` has them doubled while protected. When a transform has already
//! mangled the tags, [`fix_brackets_strict`] and [`restore_tags_locally`]
//! repair what they can against the source text.

use log::debug;

use crate::{Error, Result};

/// Stand-in for one binary tag inside decoded message text.
pub const TAG_PLACEHOLDER: char = '\u{E000}';

const PROTECT_OPEN: char = '⟪';
const PROTECT_CLOSE: char = '⟫';
const MAX_TAG_CHARS: usize = 64;
const BRACKETS: [(char, char); 3] = [('[', ']'), ('{', '}'), ('<', '>')];

/// A piece of tokenized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Tag(&'a str),
}

fn is_bracket(c: char) -> bool {
    BRACKETS.iter().any(|&(o, cl)| c == o || c == cl)
}

fn closer_for(c: char) -> Option<char> {
    BRACKETS.iter().find(|(o, _)| *o == c).map(|&(_, cl)| cl)
}

/// Length in bytes of a bracketed tag starting at the beginning of `s`.
fn bracketed_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, open) = chars.next()?;
    let close = closer_for(open)?;
    for (count, (i, c)) in chars.enumerate() {
        if c == close {
            let inner = &s[open.len_utf8()..i];
            return (count > 0 && !inner.trim().is_empty()).then_some(i + c.len_utf8());
        }
        if count >= MAX_TAG_CHARS || c == '\n' || is_bracket(c) || c == TAG_PLACEHOLDER {
            return None;
        }
    }
    None
}

/// Split `text` into prose and tags.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        let c = rest.chars().next().unwrap_or_default();
        let tag_len = if c == TAG_PLACEHOLDER {
            Some(c.len_utf8())
        } else {
            bracketed_len(rest)
        };
        match tag_len {
            Some(len) => {
                if text_start < i {
                    tokens.push(Token::Text(&text[text_start..i]));
                }
                tokens.push(Token::Tag(&text[i..i + len]));
                i += len;
                text_start = i;
            }
            None => i += c.len_utf8(),
        }
    }
    if text_start < text.len() {
        tokens.push(Token::Text(&text[text_start..]));
    }
    tokens
}

/// Every tag in `text`, in order.
pub fn tags(text: &str) -> Vec<&str> {
    tokenize(text)
        .into_iter()
        .filter_map(|t| match t {
            Token::Tag(s) => Some(s),
            Token::Text(_) => None,
        })
        .collect()
}

/// Text with its tags swapped out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Protected {
    /// The text with tag `i` replaced by `⟪i⟫` and literal `⟪`/`⟫` doubled.
    pub clean: String,
    /// Tag payloads in original order.
    pub tags: Vec<String>,
}

fn placeholder(index: usize) -> String {
    format!("{PROTECT_OPEN}{index}{PROTECT_CLOSE}")
}

/// Replace every tag in `text` with an indexed placeholder.
pub fn protect(text: &str) -> Protected {
    let mut clean = String::with_capacity(text.len());
    let mut tags = Vec::new();
    for token in tokenize(text) {
        match token {
            Token::Text(s) => {
                for c in s.chars() {
                    if c == PROTECT_OPEN || c == PROTECT_CLOSE {
                        clean.push(c);
                    }
                    clean.push(c);
                }
            }
            Token::Tag(s) => {
                clean.push_str(&placeholder(tags.len()));
                tags.push(s.to_owned());
            }
        }
    }
    Protected { clean, tags }
}

/// Parse a placeholder at the start of `s`: `⟪`, optional spaces, digits,
/// optional spaces, `⟫`. Returns the index and byte length.
fn parse_placeholder(s: &str) -> Option<(usize, usize)> {
    let body = s.strip_prefix(PROTECT_OPEN)?;
    let end = body.find(PROTECT_CLOSE)?;
    let index = body[..end].trim().parse().ok()?;
    Some((index, PROTECT_OPEN.len_utf8() + end + PROTECT_CLOSE.len_utf8()))
}

/// Put `tags` back where their placeholders are.
///
/// Placeholders may have gained inner spaces (`⟪ 1 ⟫`). Doubled markers
/// become single literal ones. Tags whose placeholder went missing are
/// appended at the end so none is lost.
pub fn restore(text: &str, tags: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut used = vec![false; tags.len()];
    let mut rest = text;
    while let Some(pos) = rest.find([PROTECT_OPEN, PROTECT_CLOSE]) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let marker = if rest.starts_with(PROTECT_OPEN) {
            PROTECT_OPEN
        } else {
            PROTECT_CLOSE
        };
        let after = &rest[marker.len_utf8()..];
        if let Some(unescaped) = after.strip_prefix(marker) {
            out.push(marker);
            rest = unescaped;
            continue;
        }
        match parse_placeholder(rest) {
            Some((index, len)) if index < tags.len() && !used[index] => {
                out.push_str(&tags[index]);
                used[index] = true;
                rest = &rest[len..];
            }
            _ => {
                out.push(marker);
                rest = after;
            }
        }
    }
    out.push_str(rest);

    for (tag, _) in tags.iter().zip(&used).filter(|(_, used)| !**used) {
        debug!("placeholder for tag {tag:?} lost, appending");
        out.push_str(tag);
    }
    out
}

/// Compare the tags of a translation against its source.
///
/// Order is not checked, only that the same tags are present.
pub fn check_tags(original: &str, translated: &str) -> Result<()> {
    let mut expected = tags(original);
    let mut found = tags(translated);
    expected.sort_unstable();
    found.sort_unstable();
    if expected == found {
        Ok(())
    } else {
        Err(Error::TagMismatch {
            expected: expected.len(),
            found: found.len(),
        })
    }
}

/// Longest common subsequence of two tag lists, as index pairs.
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let (mut i, mut j) = (0, 0);
    let mut pairs = Vec::new();
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

#[derive(Debug, Clone)]
enum Item {
    Char(char),
    /// A tag, with its index among the source's tags.
    Tag(usize, String),
}

/// Number of prose characters before each position of `items`.
fn text_offset(items: &[Item], upto: usize) -> usize {
    items[..upto]
        .iter()
        .filter(|i| matches!(i, Item::Char(_)))
        .count()
}

fn is_word_boundary(chars: &[char], at: usize) -> bool {
    at == 0
        || at >= chars.len()
        || !(chars[at - 1].is_alphanumeric() && chars[at].is_alphanumeric())
}

/// Put back tags a transform dropped.
///
/// When `translated` carries fewer tags than `original`, each missing tag is
/// inserted at the word boundary of `translated` closest to its relative
/// position in `original`, between the tags that surround it there. Tags
/// in `translated` that `original` does not have are removed, so the result
/// always carries exactly the source's tags. A translation that is not short
/// of tags is returned unchanged.
pub fn restore_tags_locally(original: &str, translated: &str) -> String {
    let source_tokens = tokenize(original);
    let source_tags = tags(original);
    let target_tokens = tokenize(translated);
    let target_tags = tags(translated);
    if target_tags.len() >= source_tags.len() {
        return translated.to_owned();
    }

    // Prose-only offsets of each source tag.
    let mut source_offsets = Vec::with_capacity(source_tags.len());
    let mut source_len = 0;
    let mut source_spaced = Vec::with_capacity(source_tags.len());
    for token in &source_tokens {
        match token {
            Token::Text(s) => source_len += s.chars().count(),
            Token::Tag(_) => {
                source_offsets.push(source_len);
                let last = source_offsets.len() - 1;
                source_spaced.push(original_preceded_by_space(&source_tokens, last));
            }
        }
    }

    let pairs = lcs_pairs(&source_tags, &target_tags);
    let matched_target: Vec<Option<usize>> = {
        let mut m = vec![None; target_tags.len()];
        for &(s, t) in &pairs {
            m[t] = Some(s);
        }
        m
    };

    let mut items = Vec::new();
    let mut target_index = 0;
    for token in &target_tokens {
        match token {
            Token::Text(s) => items.extend(s.chars().map(Item::Char)),
            Token::Tag(s) => {
                match matched_target[target_index] {
                    Some(source) => items.push(Item::Tag(source, (*s).to_owned())),
                    None => debug!("dropping tag {s:?} absent from the source"),
                }
                target_index += 1;
            }
        }
    }

    let prose: Vec<char> = items
        .iter()
        .filter_map(|i| match i {
            Item::Char(c) => Some(*c),
            Item::Tag(..) => None,
        })
        .collect();
    let target_len = prose.len();

    let matched: Vec<bool> = {
        let mut m = vec![false; source_tags.len()];
        for &(s, _) in &pairs {
            m[s] = true;
        }
        m
    };

    for k in (0..source_tags.len()).filter(|&k| !matched[k]) {
        let positions: Vec<(usize, usize)> = items
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| match item {
                Item::Tag(idx, _) => Some((*idx, text_offset(&items, pos))),
                Item::Char(_) => None,
            })
            .collect();
        let lo = positions
            .iter()
            .filter(|(idx, _)| *idx < k)
            .map(|&(_, off)| off)
            .max()
            .unwrap_or(0);
        let hi = positions
            .iter()
            .filter(|(idx, _)| *idx > k)
            .map(|&(_, off)| off)
            .min()
            .unwrap_or(target_len)
            .max(lo);

        let relative = if source_len == 0 {
            0.0
        } else {
            source_offsets[k] as f64 / source_len as f64
        };
        let target = ((relative * target_len as f64).round() as usize).clamp(lo, hi);
        let wants_space = source_spaced[k];
        let at = (lo..=hi)
            .filter(|&b| is_word_boundary(&prose, b))
            .min_by_key(|&b| {
                let spaced = b > 0 && prose[b - 1].is_whitespace();
                (b.abs_diff(target), spaced != wants_space)
            })
            .unwrap_or(lo);

        let mut insert_at = items.len();
        let mut seen = 0;
        for (pos, item) in items.iter().enumerate() {
            if seen == at {
                let earlier_tag = matches!(item, Item::Tag(idx, _) if *idx < k);
                if !earlier_tag {
                    insert_at = pos;
                    break;
                }
            }
            if matches!(item, Item::Char(_)) {
                seen += 1;
                if seen > at {
                    insert_at = pos + 1;
                    break;
                }
            }
        }
        items.insert(insert_at, Item::Tag(k, source_tags[k].to_owned()));
    }

    items
        .into_iter()
        .fold(String::with_capacity(original.len().max(translated.len())), |mut out, item| {
            match item {
                Item::Char(c) => out.push(c),
                Item::Tag(_, s) => out.push_str(&s),
            }
            out
        })
}

fn original_preceded_by_space(tokens: &[Token<'_>], tag_number: usize) -> bool {
    let mut seen = 0;
    let mut prev_char = None;
    for token in tokens {
        match token {
            Token::Text(s) => prev_char = s.chars().last(),
            Token::Tag(_) => {
                if seen == tag_number {
                    return prev_char.is_none_or(char::is_whitespace);
                }
                seen += 1;
            }
        }
    }
    false
}

/// Repair bracket pairs a transform broke around the source's textual tags.
///
/// For every bracketed tag of `original`, occurrences of its payload in
/// `translated` are fixed when they are reversed (`]color[`), lack a closer
/// (`[color`) or lack an opener (`color]`). Payloads are never edited.
pub fn fix_brackets_strict(original: &str, translated: &str) -> String {
    let mut payloads: Vec<(char, Vec<char>, char)> = tags(original)
        .into_iter()
        .filter_map(|tag| {
            let mut chars: Vec<char> = tag.chars().collect();
            let open = *chars.first()?;
            let close = closer_for(open)?;
            if chars.len() < 3 {
                return None;
            }
            chars.pop();
            chars.remove(0);
            Some((open, chars, close))
        })
        .collect();
    if payloads.is_empty() {
        return translated.to_owned();
    }
    payloads.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    payloads.dedup();

    let chars: Vec<char> = translated.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len() + 4);
    let mut i = 0;
    'outer: while i < chars.len() {
        for (open, payload, close) in &payloads {
            let end = i + payload.len();
            if end > chars.len() || chars[i..end] != payload[..] {
                continue;
            }
            let prev = out.last().copied();
            let next = chars.get(end).copied();
            let prev_is_word = prev.is_some_and(char::is_alphanumeric);
            let next_is_word = next.is_some_and(char::is_alphanumeric);

            if prev == Some(*open) && next == Some(*close) {
                out.extend_from_slice(payload);
                i = end;
            } else if prev == Some(*close) && next == Some(*open) {
                out.pop();
                out.push(*open);
                out.extend_from_slice(payload);
                out.push(*close);
                i = end + 1;
            } else if prev == Some(*open) && !next_is_word {
                out.extend_from_slice(payload);
                out.push(*close);
                i = end;
            } else if next == Some(*close) && !prev_is_word {
                out.push(*open);
                out.extend_from_slice(payload);
                i = end;
            } else {
                continue;
            }
            continue 'outer;
        }
        out.push(chars[i]);
        i += 1;
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn tokenizes_both_tag_kinds() {
        let text = "Press \u{E000} or [btn:A] for {0} <b>";
        assert_eq!(tags(text), vec!["\u{E000}", "[btn:A]", "{0}", "<b>"]);
        assert_eq!(tags("no [ tag here ] [] {\n}"), vec!["[ tag here ]"]);
        assert!(tags("a < b and c > d").len() == 1);
    }

    #[test]
    fn protect_then_restore() {
        let text = "[color=red]Danger\u{E000}![/color]";
        let p = protect(text);
        assert_eq!(p.clean, "⟪0⟫Danger⟪1⟫!⟪2⟫");
        assert_eq!(p.tags.len(), 3);
        assert_eq!(restore(&p.clean, &p.tags), text);
    }

    #[test]
    fn restore_tolerates_spacing_and_reordering() {
        let tags = vec!["[a]".to_string(), "[b]".to_string()];
        assert_eq!(restore("x ⟪ 1 ⟫ y ⟪0⟫", &tags), "x [b] y [a]");
        assert_eq!(restore("lost everything", &tags), "lost everything[a][b]");
    }

    #[test]
    fn literal_markers_survive_protection() {
        let text = "⟪0⟫ then [a] ⟫⟪";
        let p = protect(text);
        assert_eq!(p.clean, "⟪⟪0⟫⟫ then ⟪0⟫ ⟫⟫⟪⟪");
        assert_eq!(restore(&p.clean, &p.tags), text);
    }

    #[test]
    fn check_tags_flags_mismatch() {
        assert!(check_tags("[a] x [b]", "[b] y [a]").is_ok());
        assert!(matches!(
            check_tags("[a] x [b]", "y [a]"),
            Err(Error::TagMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn restores_missing_tags_at_word_boundaries() {
        let original = "[c]Hello[/c] world";
        let translated = "Bonjour le monde";
        let repaired = restore_tags_locally(original, translated);
        assert_eq!(tags(&repaired), vec!["[c]", "[/c]"]);
        assert!(repaired.starts_with("[c]"));
        for word in ["Bonjour", "le", "monde"] {
            assert!(repaired.contains(word), "{repaired}");
        }
    }

    #[test]
    fn keeps_present_tags_and_order() {
        let original = "A [x] B [y] C [z] D";
        let translated = "a b [z] c d";
        let repaired = restore_tags_locally(original, translated);
        assert_eq!(tags(&repaired), vec!["[x]", "[y]", "[z]"]);
    }

    #[test]
    fn translation_with_enough_tags_is_untouched() {
        assert_eq!(restore_tags_locally("[a] x", "[a] y"), "[a] y");
    }

    #[test]
    fn fixes_reversed_and_orphaned_brackets() {
        let original = "[color]Hi[/color] {name}";
        assert_eq!(
            fix_brackets_strict(original, "]color[Salut[/color] {name}"),
            "[color]Salut[/color] {name}"
        );
        assert_eq!(
            fix_brackets_strict(original, "[color Salut /color] name}"),
            "[color] Salut [/color] {name}"
        );
        assert_eq!(fix_brackets_strict(original, "colorful"), "colorful");
    }

    #[quickcheck]
    fn protect_restore_identity(parts: Vec<(String, u8)>) -> bool {
        let tag_kinds = ["\u{E000}", "[c]", "{0}", "<icon:A>"];
        let text: String = parts
            .iter()
            .map(|(s, t)| {
                let clean: String = s
                    .chars()
                    .filter(|c| !is_bracket(*c) && *c != TAG_PLACEHOLDER)
                    .collect();
                format!("{clean}{}", tag_kinds[*t as usize % tag_kinds.len()])
            })
            .collect();
        let p = protect(&text);
        restore(&p.clean, &p.tags) == text
    }

    #[quickcheck]
    fn local_restore_reaches_source_tag_count(words: Vec<String>, kept: u8) -> bool {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect())
            .collect();
        let original: String = words
            .iter()
            .enumerate()
            .map(|(i, w)| format!("[t{i}]{w} "))
            .collect();
        let keep = kept as usize % (words.len() + 1);
        let translated: String = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                if i < keep {
                    format!("[t{i}]{w} ")
                } else {
                    format!("{w} ")
                }
            })
            .collect();
        let repaired = restore_tags_locally(&original, &translated);
        tags(&repaired) == tags(&original)
    }
}
