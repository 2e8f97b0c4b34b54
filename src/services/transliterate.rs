//! Phonetic transliteration of non-Latin titles.
//!
//! Characters belonging to a script listed in [`SCRIPT_TABLES`] are replaced
//! by a Latin rendering, one syllable per character. Everything else is left
//! alone so the slugifier can deal with it.

use pinyin::ToPinyin;

/// A script that can be rendered into Latin letters.
pub struct ScriptTable {
    pub name: &'static str,
    /// Inclusive code point ranges covered by this script.
    pub ranges: &'static [(char, char)],
    pub render: fn(char) -> Option<&'static str>,
}

impl ScriptTable {
    pub fn covers(&self, ch: char) -> bool {
        self.ranges
            .iter()
            .any(|&(start, end)| start <= ch && ch <= end)
    }
}

pub static SCRIPT_TABLES: &[ScriptTable] = &[ScriptTable {
    name: "han",
    ranges: &[
        ('\u{4e00}', '\u{9fff}'),
        ('\u{3400}', '\u{4dbf}'),
        ('\u{f900}', '\u{faff}'),
        ('\u{20000}', '\u{2ebef}'),
    ],
    render: han_to_pinyin,
}];

fn han_to_pinyin(ch: char) -> Option<&'static str> {
    ch.to_pinyin().map(|py| py.plain())
}

pub fn transliterate(title: &str) -> String {
    transliterate_with(title, SCRIPT_TABLES)
}

pub fn transliterate_with(title: &str, tables: &[ScriptTable]) -> String {
    let lookup = |ch: char| tables.iter().find(|table| table.covers(ch));

    if !title.chars().any(|ch| lookup(ch).is_some()) {
        return title.to_string();
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut run = String::new();

    for ch in title.chars() {
        match lookup(ch) {
            Some(table) => {
                push_run(&mut pieces, &mut run);
                match (table.render)(ch) {
                    Some(syllable) => pieces.push(syllable.to_string()),
                    None => tracing::trace!("No {} rendering for {:?}, dropped", table.name, ch),
                }
            }
            None => run.push(ch),
        }
    }
    push_run(&mut pieces, &mut run);

    pieces.join(" ")
}

fn push_run(pieces: &mut Vec<String>, run: &mut String) {
    let trimmed = run.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
    run.clear();
}
