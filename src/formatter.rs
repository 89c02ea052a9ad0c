//! In-text labels and bibliography lines.
//!
//! All functions here are pure: an entry, a style and a citation number go
//! in, display text comes out. Missing fields are left out of the line, with
//! `Anon` standing in for a missing author and `n.d.` for a missing year.

use crate::library::{Entry, Library};
use crate::marker::Marker;
use crate::order::CitedOrder;
use crate::ranges::bracketed;
use crate::style::Style;

const ANON: &str = "Anon";
const NO_DATE: &str = "n.d.";

/// One id of a (possibly grouped) citation, resolved against the library and
/// the cited order.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub entry: Option<&'a Entry>,
    pub index: Option<usize>,
}

/// Behaviour shared by all styles of one class.
pub trait CitationClass: Send + Sync {
    /// Label for a single citation.
    fn in_text(&self, member: Member<'_>) -> String;

    /// Combined label for a grouped citation.
    fn group_text(&self, members: &[Member<'_>]) -> String;

    /// Puts `(index, entry)` pairs into bibliography order.
    fn arrange_bibliography(&self, entries: &mut Vec<(usize, &Entry)>);
}

/// `[n]` labels, range-compressed groups, bibliography in citation order.
pub struct NumericClass;

/// `(Surname, Year)` labels, `;`-joined groups, bibliography by author.
pub struct AuthorYearClass;

pub(crate) static NUMERIC: NumericClass = NumericClass;
pub(crate) static AUTHOR_YEAR: AuthorYearClass = AuthorYearClass;

impl CitationClass for NumericClass {
    fn in_text(&self, member: Member<'_>) -> String {
        match member.index {
            Some(n) => format!("[{}]", n),
            None => "[?]".to_string(),
        }
    }

    fn group_text(&self, members: &[Member<'_>]) -> String {
        let indices: Vec<usize> = members.iter().filter_map(|m| m.index).collect();
        bracketed(&indices)
    }

    fn arrange_bibliography(&self, entries: &mut Vec<(usize, &Entry)>) {
        entries.sort_by_key(|(index, _)| *index);
    }
}

impl CitationClass for AuthorYearClass {
    fn in_text(&self, member: Member<'_>) -> String {
        format!("({})", author_year(member.entry))
    }

    fn group_text(&self, members: &[Member<'_>]) -> String {
        let parts: Vec<String> = members.iter().map(|m| author_year(m.entry)).collect();
        format!("({})", parts.join("; "))
    }

    fn arrange_bibliography(&self, entries: &mut Vec<(usize, &Entry)>) {
        entries.sort_by_cached_key(|(index, entry)| {
            (
                surname(Some(entry)).to_lowercase(),
                year(Some(entry)).to_string(),
                *index,
            )
        });
    }
}

/// `Surname, Year` without the surrounding parenthesis.
fn author_year(entry: Option<&Entry>) -> String {
    format!("{}, {}", surname(entry), year(entry))
}

/// The author (or editor) field, untouched.
fn authors(entry: &Entry) -> &str {
    entry
        .field("author")
        .or_else(|| entry.field("editor"))
        .unwrap_or(ANON)
}

/// First name token of the author/editor list: everything before the first
/// comma or `" and "`.
pub fn surname(entry: Option<&Entry>) -> String {
    let Some(raw) = entry.and_then(|e| e.field("author").or_else(|| e.field("editor"))) else {
        return ANON.to_string();
    };
    let cut = [raw.find(','), raw.find(" and ")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(raw.len());
    let name = raw[..cut].trim();
    if name.is_empty() {
        ANON.to_string()
    } else {
        name.to_string()
    }
}

pub fn year(entry: Option<&Entry>) -> &str {
    entry.and_then(|e| e.field("year")).unwrap_or(NO_DATE)
}

/// In-text label for one citation.
pub fn format_in_text(entry: &Entry, style: Style, index: usize) -> String {
    style.class().in_text(Member {
        entry: Some(entry),
        index: Some(index),
    })
}

/// Combined label for a grouped citation.
pub fn format_group(members: &[Member<'_>], style: Style) -> String {
    style.class().group_text(members)
}

/// Computes marker labels against one library snapshot and one cited order.
pub struct Labeler<'a> {
    pub style: Style,
    pub library: &'a Library,
    pub order: &'a CitedOrder,
}

impl<'a> Labeler<'a> {
    pub fn new(style: Style, library: &'a Library, order: &'a CitedOrder) -> Self {
        Self {
            style,
            library,
            order,
        }
    }

    fn member(&self, id: &str) -> Member<'a> {
        Member {
            entry: self.library.get(id),
            index: self.order.index_of(id),
        }
    }

    pub fn single(&self, id: &str) -> String {
        self.style.class().in_text(self.member(id))
    }

    pub fn group(&self, ids: &[String]) -> String {
        let members: Vec<Member<'a>> = ids.iter().map(|id| self.member(id)).collect();
        self.style.class().group_text(&members)
    }

    /// Display text for any marker.
    pub fn label(&self, marker: &Marker) -> String {
        match marker {
            Marker::Single { id } => self.single(id),
            Marker::Group { ids } => self.group(ids),
        }
    }
}

fn doi_link(doi: &str) -> String {
    if doi.starts_with("http://") || doi.starts_with("https://") {
        doi.to_string()
    } else {
        format!("https://doi.org/{}", doi)
    }
}

/// Fields a bibliography line is built from.
struct Parts<'a> {
    authors: &'a str,
    year: &'a str,
    title: Option<&'a str>,
    container: Option<&'a str>,
    volume: Option<&'a str>,
    number: Option<&'a str>,
    pages: Option<&'a str>,
    doi: Option<&'a str>,
}

impl<'a> Parts<'a> {
    fn of(entry: &'a Entry) -> Self {
        Self {
            authors: authors(entry),
            year: year(Some(entry)),
            title: entry.field("title"),
            container: entry.field("journal").or_else(|| entry.field("booktitle")),
            volume: entry.field("volume"),
            number: entry.field("number").or_else(|| entry.field("issue")),
            pages: entry.field("pages"),
            doi: entry.field("doi"),
        }
    }
}

fn opt(prefix: &str, value: Option<&str>, suffix: &str) -> String {
    value
        .map(|v| format!("{}{}{}", prefix, v, suffix))
        .unwrap_or_default()
}

/// Joins non-empty clauses with single spaces.
fn clauses<I: IntoIterator<Item = String>>(items: I) -> String {
    items
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ends `s` with a period unless it already has one.
fn terminate(mut s: String) -> String {
    if !s.ends_with('.') {
        s.push('.');
    }
    s
}

/// `vol(no)` or `vol` or `(no)`.
fn volume_issue(p: &Parts<'_>) -> String {
    format!("{}{}", p.volume.unwrap_or_default(), opt("(", p.number, ")"))
}

/// `2020;12(3):45-67` as used by numeric and vancouver.
fn medline_locator(p: &Parts<'_>) -> String {
    let mut out = p.year.to_string();
    let vi = volume_issue(p);
    if !vi.is_empty() {
        out.push(';');
        out.push_str(&vi);
    }
    out.push_str(&opt(":", p.pages, ""));
    terminate(out)
}

fn apa(p: &Parts<'_>) -> String {
    let container = p.container.map(|c| {
        let vi = volume_issue(p);
        let mut s = c.to_string();
        if !vi.is_empty() {
            s.push_str(", ");
            s.push_str(&vi);
        }
        s.push_str(&opt(", ", p.pages, ""));
        s.push('.');
        s
    });
    clauses([
        format!("{} ({}).", p.authors, p.year),
        opt("", p.title, "."),
        container.unwrap_or_default(),
        p.doi.map(doi_link).unwrap_or_default(),
    ])
}

fn mla(p: &Parts<'_>) -> String {
    let mut tail = String::new();
    if let Some(c) = p.container {
        tail.push_str(c);
        tail.push_str(", ");
    }
    tail.push_str(&opt("vol. ", p.volume, ", "));
    tail.push_str(&opt("no. ", p.number, ", "));
    tail.push_str(p.year);
    tail.push_str(&opt(", pp. ", p.pages, ""));
    clauses([
        terminate(p.authors.to_string()),
        opt("\"", p.title, ".\""),
        terminate(tail),
        p.doi.map(doi_link).unwrap_or_default(),
    ])
}

fn harvard(p: &Parts<'_>) -> String {
    let mut container = String::new();
    if let Some(c) = p.container {
        container.push_str(c);
        let vi = volume_issue(p);
        if !vi.is_empty() {
            container.push_str(", ");
            container.push_str(&vi);
        }
        container.push_str(&opt(", pp. ", p.pages, ""));
        container.push('.');
    }
    let title = match (p.title, p.container) {
        (Some(t), Some(_)) => format!("'{}',", t),
        (Some(t), None) => format!("'{}'.", t),
        (None, _) => String::new(),
    };
    clauses([
        format!("{} ({})", p.authors, p.year),
        title,
        container,
        opt("doi:", p.doi, ""),
    ])
}

fn acs(p: &Parts<'_>, index: usize) -> String {
    let mut source = String::new();
    if let Some(c) = p.container {
        source.push_str(c);
        source.push(' ');
    }
    source.push_str(p.year);
    source.push_str(&opt(", ", p.volume, ""));
    source.push_str(&opt(" (", p.number, ")"));
    source.push_str(&opt(", ", p.pages, ""));
    clauses([
        format!("{}.", index),
        format!("{};", p.authors),
        opt("", p.title, "."),
        terminate(source),
        opt("DOI: ", p.doi, "."),
    ])
}

fn ieee(p: &Parts<'_>, index: usize) -> String {
    let mut fields: Vec<String> = vec![p.authors.to_string()];
    if let Some(t) = p.title {
        fields.push(format!("\"{},\"", t));
    }
    let mut rest: Vec<String> = Vec::new();
    if let Some(c) = p.container {
        rest.push(c.to_string());
    }
    rest.push(opt("vol. ", p.volume, ""));
    rest.push(opt("no. ", p.number, ""));
    rest.push(opt("pp. ", p.pages, ""));
    rest.push(p.year.to_string());
    rest.push(opt("doi: ", p.doi, ""));
    let rest: Vec<String> = rest.into_iter().filter(|s| !s.is_empty()).collect();

    let head = if p.title.is_some() {
        // The closing quote of the title already carries the comma.
        format!("{}, {}", fields[0], fields[1])
    } else {
        format!("{},", fields[0])
    };
    clauses([format!("[{}]", index), head, terminate(rest.join(", "))])
}

fn numeric(p: &Parts<'_>, index: usize) -> String {
    clauses([
        format!("[{}]", index),
        terminate(p.authors.to_string()),
        opt("", p.title, "."),
        opt("", p.container, "."),
        medline_locator(p),
        p.doi.map(doi_link).unwrap_or_default(),
    ])
}

fn vancouver(p: &Parts<'_>, index: usize) -> String {
    clauses([
        format!("{}.", index),
        terminate(p.authors.to_string()),
        opt("", p.title, "."),
        opt("", p.container, "."),
        medline_locator(p),
        opt("doi:", p.doi, ""),
    ])
}

/// One full reference line.
///
/// Numeric-class styles lead with the citation number (`[n]` for ieee and
/// numeric, `n.` for acs and vancouver); author-year styles ignore `index`.
pub fn format_bibliography_entry(entry: &Entry, style: Style, index: usize) -> String {
    let p = Parts::of(entry);
    match style {
        Style::Apa => apa(&p),
        Style::Mla => mla(&p),
        Style::Harvard => harvard(&p),
        Style::Acs => acs(&p, index),
        Style::Ieee => ieee(&p, index),
        Style::Numeric => numeric(&p, index),
        Style::Vancouver => vancouver(&p, index),
    }
}
