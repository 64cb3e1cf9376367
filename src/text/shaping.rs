//! Arabic shaping for engines without complex-script support.
//!
//! The target engines draw one glyph per code point, left to right. Arabic
//! therefore has to arrive pre-shaped: every letter replaced by its
//! contextual presentation form (isolated, final, initial, medial) and each
//! line reversed into visual order. [`unshape`] undoes both steps so the
//! editor can show translators logical text again.
//!
//! Tags (see [`super::tags`]) are treated as opaque units: they break
//! letter joining and move as a whole when a line is reversed.

use super::tags::{Token, tokenize};

/// Presentation forms of one base letter.
struct Forms {
    base: char,
    isolated: char,
    final_: char,
    /// `None` for letters that never connect to the following letter.
    initial: Option<char>,
    medial: Option<char>,
}

const fn dual(base: char, isolated: char, final_: char, initial: char, medial: char) -> Forms {
    Forms {
        base,
        isolated,
        final_,
        initial: Some(initial),
        medial: Some(medial),
    }
}

const fn right(base: char, isolated: char, final_: char) -> Forms {
    Forms {
        base,
        isolated,
        final_,
        initial: None,
        medial: None,
    }
}

#[rustfmt::skip]
const LETTERS: &[Forms] = &[
    right('\u{0621}', '\u{FE80}', '\u{FE80}'),
    right('\u{0622}', '\u{FE81}', '\u{FE82}'),
    right('\u{0623}', '\u{FE83}', '\u{FE84}'),
    right('\u{0624}', '\u{FE85}', '\u{FE86}'),
    right('\u{0625}', '\u{FE87}', '\u{FE88}'),
    dual ('\u{0626}', '\u{FE89}', '\u{FE8A}', '\u{FE8B}', '\u{FE8C}'),
    right('\u{0627}', '\u{FE8D}', '\u{FE8E}'),
    dual ('\u{0628}', '\u{FE8F}', '\u{FE90}', '\u{FE91}', '\u{FE92}'),
    right('\u{0629}', '\u{FE93}', '\u{FE94}'),
    dual ('\u{062A}', '\u{FE95}', '\u{FE96}', '\u{FE97}', '\u{FE98}'),
    dual ('\u{062B}', '\u{FE99}', '\u{FE9A}', '\u{FE9B}', '\u{FE9C}'),
    dual ('\u{062C}', '\u{FE9D}', '\u{FE9E}', '\u{FE9F}', '\u{FEA0}'),
    dual ('\u{062D}', '\u{FEA1}', '\u{FEA2}', '\u{FEA3}', '\u{FEA4}'),
    dual ('\u{062E}', '\u{FEA5}', '\u{FEA6}', '\u{FEA7}', '\u{FEA8}'),
    right('\u{062F}', '\u{FEA9}', '\u{FEAA}'),
    right('\u{0630}', '\u{FEAB}', '\u{FEAC}'),
    right('\u{0631}', '\u{FEAD}', '\u{FEAE}'),
    right('\u{0632}', '\u{FEAF}', '\u{FEB0}'),
    dual ('\u{0633}', '\u{FEB1}', '\u{FEB2}', '\u{FEB3}', '\u{FEB4}'),
    dual ('\u{0634}', '\u{FEB5}', '\u{FEB6}', '\u{FEB7}', '\u{FEB8}'),
    dual ('\u{0635}', '\u{FEB9}', '\u{FEBA}', '\u{FEBB}', '\u{FEBC}'),
    dual ('\u{0636}', '\u{FEBD}', '\u{FEBE}', '\u{FEBF}', '\u{FEC0}'),
    dual ('\u{0637}', '\u{FEC1}', '\u{FEC2}', '\u{FEC3}', '\u{FEC4}'),
    dual ('\u{0638}', '\u{FEC5}', '\u{FEC6}', '\u{FEC7}', '\u{FEC8}'),
    dual ('\u{0639}', '\u{FEC9}', '\u{FECA}', '\u{FECB}', '\u{FECC}'),
    dual ('\u{063A}', '\u{FECD}', '\u{FECE}', '\u{FECF}', '\u{FED0}'),
    dual ('\u{0640}', '\u{0640}', '\u{0640}', '\u{0640}', '\u{0640}'),
    dual ('\u{0641}', '\u{FED1}', '\u{FED2}', '\u{FED3}', '\u{FED4}'),
    dual ('\u{0642}', '\u{FED5}', '\u{FED6}', '\u{FED7}', '\u{FED8}'),
    dual ('\u{0643}', '\u{FED9}', '\u{FEDA}', '\u{FEDB}', '\u{FEDC}'),
    dual ('\u{0644}', '\u{FEDD}', '\u{FEDE}', '\u{FEDF}', '\u{FEE0}'),
    dual ('\u{0645}', '\u{FEE1}', '\u{FEE2}', '\u{FEE3}', '\u{FEE4}'),
    dual ('\u{0646}', '\u{FEE5}', '\u{FEE6}', '\u{FEE7}', '\u{FEE8}'),
    dual ('\u{0647}', '\u{FEE9}', '\u{FEEA}', '\u{FEEB}', '\u{FEEC}'),
    right('\u{0648}', '\u{FEED}', '\u{FEEE}'),
    right('\u{0649}', '\u{FEEF}', '\u{FEF0}'),
    dual ('\u{064A}', '\u{FEF1}', '\u{FEF2}', '\u{FEF3}', '\u{FEF4}'),
    dual ('\u{067E}', '\u{FB56}', '\u{FB57}', '\u{FB58}', '\u{FB59}'),
    dual ('\u{0686}', '\u{FB7A}', '\u{FB7B}', '\u{FB7C}', '\u{FB7D}'),
    right('\u{0698}', '\u{FB8A}', '\u{FB8B}'),
    dual ('\u{06A9}', '\u{FB8E}', '\u{FB8F}', '\u{FB90}', '\u{FB91}'),
    dual ('\u{06AF}', '\u{FB92}', '\u{FB93}', '\u{FB94}', '\u{FB95}'),
    dual ('\u{06CC}', '\u{FBFC}', '\u{FBFD}', '\u{FBFE}', '\u{FBFF}'),
];

const LAM: char = '\u{0644}';
const TATWEEL: char = '\u{0640}';

/// Lam followed by an alef variant: (alef, isolated ligature, final ligature).
const LAM_ALEF: &[(char, char, char)] = &[
    ('\u{0622}', '\u{FEF5}', '\u{FEF6}'),
    ('\u{0623}', '\u{FEF7}', '\u{FEF8}'),
    ('\u{0625}', '\u{FEF9}', '\u{FEFA}'),
    ('\u{0627}', '\u{FEFB}', '\u{FEFC}'),
];

fn forms(c: char) -> Option<&'static Forms> {
    LETTERS.iter().find(|f| f.base == c)
}

/// Combining marks that sit on a letter without affecting joining.
fn is_transparent(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

/// Whether `c` is an Arabic letter this module shapes.
pub fn is_arabic_letter(c: char) -> bool {
    c != TATWEEL && forms(c).is_some()
}

/// Whether `c` is an Arabic presentation form.
pub fn is_presentation_form(c: char) -> bool {
    matches!(c, '\u{FB50}'..='\u{FDFF}' | '\u{FE70}'..='\u{FEFF}')
}

/// Whether `text` contains any shapeable Arabic letter.
pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(is_arabic_letter)
}

/// Whether `text` has already been through [`shape`].
pub fn is_shaped(text: &str) -> bool {
    text.chars().any(is_presentation_form)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit<'a> {
    Char(char),
    Tag(&'a str),
}

fn units(line: &str) -> Vec<Unit<'_>> {
    let mut out = Vec::with_capacity(line.len());
    for token in tokenize(line) {
        match token {
            Token::Text(s) => out.extend(s.chars().map(Unit::Char)),
            Token::Tag(s) => out.push(Unit::Tag(s)),
        }
    }
    out
}

fn collect<'a>(units: impl Iterator<Item = Unit<'a>>, out: &mut String) {
    for unit in units {
        match unit {
            Unit::Char(c) => out.push(c),
            Unit::Tag(s) => out.push_str(s),
        }
    }
}

/// Apply `f` to every line, keeping `\n` separators and trailing `\r`.
fn per_line(text: &str, mut f: impl FnMut(&str, &mut String)) -> String {
    let mut out = String::with_capacity(text.len() * 3 / 2);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let (body, cr) = match line.strip_suffix('\r') {
            Some(body) => (body, true),
            None => (line, false),
        };
        f(body, &mut out);
        if cr {
            out.push('\r');
        }
    }
    out
}

/// The first unit in `indices` order that is not a combining mark.
fn neighbour<'a>(units: &[Unit<'a>], indices: impl Iterator<Item = usize>) -> Option<Unit<'a>> {
    indices
        .map(|i| units[i])
        .find(|u| !matches!(u, Unit::Char(c) if is_transparent(*c)))
}

fn joins_forward(unit: Option<Unit<'_>>) -> bool {
    matches!(unit, Some(Unit::Char(c)) if forms(c).is_some_and(|f| f.initial.is_some()))
}

fn joins_backward(unit: Option<Unit<'_>>) -> bool {
    matches!(unit, Some(Unit::Char(c)) if c != '\u{0621}' && forms(c).is_some())
}

fn shape_line(line: &str, out: &mut String) {
    if !contains_arabic(line) {
        out.push_str(line);
        return;
    }

    let logical = units(line);
    let mut shaped = Vec::with_capacity(logical.len());
    let mut i = 0;
    while i < logical.len() {
        let Unit::Char(c) = logical[i] else {
            shaped.push(logical[i]);
            i += 1;
            continue;
        };
        let Some(f) = forms(c) else {
            shaped.push(Unit::Char(c));
            i += 1;
            continue;
        };

        let prev = neighbour(&logical, (0..i).rev());
        let connects_prev = joins_forward(prev);

        if c == LAM
            && let Some(Unit::Char(next)) = logical.get(i + 1).copied()
            && let Some(&(_, isolated, final_)) = LAM_ALEF.iter().find(|(a, ..)| *a == next)
        {
            shaped.push(Unit::Char(if connects_prev { final_ } else { isolated }));
            i += 2;
            continue;
        }

        let next = neighbour(&logical, i + 1..logical.len());
        let connects_next = f.initial.is_some() && joins_backward(next);

        let form = match (connects_prev, connects_next) {
            (true, true) => f.medial.unwrap_or(f.final_),
            (true, false) => f.final_,
            (false, true) => f.initial.unwrap_or(f.isolated),
            (false, false) => f.isolated,
        };
        shaped.push(Unit::Char(form));
        i += 1;
    }

    collect(shaped.into_iter().rev(), out);
}

/// Convert logical Arabic text to presentation forms in visual order.
///
/// Lines without Arabic letters pass through unchanged, as does text that
/// already contains presentation forms, so shaping twice is harmless.
pub fn shape(text: &str) -> String {
    if !contains_arabic(text) || is_shaped(text) {
        return text.to_owned();
    }
    per_line(text, shape_line)
}

fn base_of(c: char) -> Option<&'static [char]> {
    static LIGATURES: [[char; 2]; 4] = [
        [LAM, '\u{0622}'],
        [LAM, '\u{0623}'],
        [LAM, '\u{0625}'],
        [LAM, '\u{0627}'],
    ];
    if let Some(i) = LAM_ALEF
        .iter()
        .position(|&(_, iso, fin)| c == iso || c == fin)
    {
        return Some(&LIGATURES[i]);
    }
    LETTERS
        .iter()
        .find(|f| f.isolated == c || f.final_ == c || f.initial == Some(c) || f.medial == Some(c))
        .map(|f| std::slice::from_ref(&f.base))
}

fn unshape_line(line: &str, out: &mut String) {
    if !is_shaped(line) {
        out.push_str(line);
        return;
    }
    for unit in units(line).into_iter().rev() {
        match unit {
            Unit::Char(c) if is_presentation_form(c) => match base_of(c) {
                Some(base) => out.extend(base.iter()),
                None => out.push(c),
            },
            Unit::Char(c) => out.push(c),
            Unit::Tag(s) => out.push_str(s),
        }
    }
}

/// Undo [`shape`]: restore logical order and base letters.
///
/// Text without presentation forms is returned unchanged.
pub fn unshape(text: &str) -> String {
    if !is_shaped(text) {
        return text.to_owned();
    }
    per_line(text, unshape_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn visual(logical_forms: &[char]) -> String {
        logical_forms.iter().rev().collect()
    }

    #[test]
    fn non_connecting_letter_never_takes_medial() {
        // dal, beh, yeh: dal cannot join forward, so beh starts a new run.
        let shaped = shape("\u{062F}\u{0628}\u{064A}");
        assert_eq!(shaped, visual(&['\u{FEA9}', '\u{FE91}', '\u{FEF2}']));
    }

    #[test]
    fn medial_forms_inside_words() {
        // beh, seen, meem
        let shaped = shape("\u{0628}\u{0633}\u{0645}");
        assert_eq!(shaped, visual(&['\u{FE91}', '\u{FEB4}', '\u{FEE2}']));
    }

    #[test]
    fn lam_alef_ligature() {
        // lam alef alone, then after beh
        assert_eq!(shape("\u{0644}\u{0627}"), "\u{FEFB}");
        assert_eq!(
            shape("\u{0628}\u{0644}\u{0627}"),
            visual(&['\u{FE91}', '\u{FEFC}'])
        );
    }

    #[test]
    fn tags_stay_whole_and_break_joining() {
        let shaped = shape("\u{0628}[c]\u{0628}");
        assert_eq!(shaped, format!("\u{FE8F}[c]\u{FE8F}"));
        assert_eq!(unshape(&shaped), "\u{0628}[c]\u{0628}");
    }

    #[test]
    fn latin_only_lines_are_untouched() {
        let text = "Hello\n\u{0628}\u{0628} 12\r\nWorld";
        let shaped = shape(text);
        assert!(shaped.starts_with("Hello\n21 "));
        assert!(shaped.ends_with("\r\nWorld"));
        assert_eq!(unshape(&shaped), text);
    }

    #[test]
    fn shaping_is_idempotent() {
        let once = shape("\u{0633}\u{0644}\u{0627}\u{0645}");
        assert_eq!(shape(&once), once);
        assert_eq!(unshape("plain"), "plain");
    }

    #[quickcheck]
    fn unshape_inverts_shape(picks: Vec<u8>) -> bool {
        let alphabet: Vec<char> = LETTERS
            .iter()
            .map(|f| f.base)
            .chain([' ', '\n', '1', 'x', '\u{064E}'])
            .collect();
        let text: String = picks
            .iter()
            .map(|&p| alphabet[p as usize % alphabet.len()])
            .collect();
        unshape(&shape(&text)) == text
    }
}
