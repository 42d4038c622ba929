//! GROBID TEI XML → intermediate document JSON.
//!
//! Only the parts a Reference needs are read: the header (title, authors,
//! DOI, publication date), the abstract, and the body paragraphs. Bibliography
//! entries in `<back>` are ignored.

use std::path::Path;

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::models::Author;

#[derive(Debug, Error)]
pub enum TeiError {
    #[error("malformed TEI XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document has no <TEI> root element")]
    NotTei,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub doi: Option<String>,
    /// Raw publication date as found in the TEI; see [`parse_date`].
    pub date: Option<String>,
}

/// Intermediate form written to `.storage/{stem}.json` between parsing and
/// Reference construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub header: DocumentHeader,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub body: Option<String>,
}

impl ParsedDocument {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn published_date(&self) -> Option<NaiveDate> {
        self.header.date.as_deref().and_then(parse_date)
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM` (first of month) or `YYYY` (first of year).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    let mut parts = raw.split('-');
    let year = parts.next().filter(|y| y.len() == 4)?.parse::<i32>().ok()?;
    let month = match parts.next() {
        Some(m) => m.parse::<u32>().ok()?,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[derive(Default)]
struct AuthorBuf {
    forenames: Vec<String>,
    surname: Option<String>,
    email: Option<String>,
}

impl AuthorBuf {
    fn finish(self) -> Option<Author> {
        let given = (!self.forenames.is_empty()).then(|| self.forenames.join(" "));
        let full_name = [given.clone(), self.surname.clone()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if full_name.trim().is_empty() {
            return None;
        }
        Some(Author::new(full_name, given, self.surname, self.email))
    }
}

/// Accumulates paragraph text under one section (abstract or body).
#[derive(Default)]
struct Paragraphs {
    done: Vec<String>,
    current: String,
}

impl Paragraphs {
    fn push_text(&mut self, text: &str) {
        if !self.current.is_empty() {
            self.current.push(' ');
        }
        self.current.push_str(text);
    }

    fn flush(&mut self) {
        let p = self.current.trim();
        if !p.is_empty() {
            self.done.push(p.to_string());
        }
        self.current.clear();
    }

    fn finish(mut self) -> Option<String> {
        self.flush();
        (!self.done.is_empty()).then(|| self.done.join("\n\n"))
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn within(stack: &[String], name: &str) -> bool {
    stack.iter().any(|s| s == name)
}

fn top_is(stack: &[String], name: &str) -> bool {
    stack.last().is_some_and(|s| s == name)
}

/// Parse a GROBID TEI document.
pub fn parse_tei(xml: &str) -> std::result::Result<ParsedDocument, TeiError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;

    let mut title = String::new();
    let mut authors: Vec<Author> = Vec::new();
    let mut author: Option<AuthorBuf> = None;
    let mut doi: Option<String> = None;
    let mut in_doi = false;
    let mut date_when: Option<String> = None;
    let mut date_text: Option<String> = None;
    let mut abstract_text = Paragraphs::default();
    let mut body = Paragraphs::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if stack.is_empty() {
                    seen_root = name == "TEI";
                }
                let in_header = within(&stack, "teiHeader");
                match name.as_str() {
                    "author" if in_header && within(&stack, "analytic") => {
                        author = Some(AuthorBuf::default());
                    }
                    "idno" if in_header => {
                        in_doi = attr(&e, "type").is_some_and(|t| t.eq_ignore_ascii_case("doi"));
                    }
                    "date" if in_header && within(&stack, "publicationStmt") => {
                        if date_when.is_none() {
                            date_when = attr(&e, "when");
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name();
                if name.as_ref() == b"date"
                    && within(&stack, "teiHeader")
                    && date_when.is_none()
                {
                    date_when = attr(&e, "when");
                }
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else { continue };
                match name.as_str() {
                    "author" => {
                        if let Some(a) = author.take().and_then(AuthorBuf::finish) {
                            authors.push(a);
                        }
                    }
                    "idno" => in_doi = false,
                    "p" | "head" | "div" => {
                        if within(&stack, "abstract") || name == "abstract" {
                            abstract_text.flush();
                        } else if within(&stack, "body") {
                            body.flush();
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t.unescape().unwrap_or_default().to_string();
                if text.is_empty() {
                    continue;
                }
                if within(&stack, "teiHeader") {
                    if top_is(&stack, "title") && within(&stack, "titleStmt") {
                        if !title.is_empty() {
                            title.push(' ');
                        }
                        title.push_str(&text);
                    } else if let Some(a) = author.as_mut() {
                        if top_is(&stack, "forename") {
                            a.forenames.push(text);
                        } else if top_is(&stack, "surname") {
                            a.surname = Some(text);
                        } else if top_is(&stack, "email") {
                            a.email = Some(text);
                        }
                    } else if in_doi && top_is(&stack, "idno") {
                        doi = Some(text);
                    } else if top_is(&stack, "date") && within(&stack, "publicationStmt") {
                        date_text.get_or_insert(text);
                    } else if within(&stack, "abstract") {
                        abstract_text.push_text(&text);
                    }
                } else if within(&stack, "body") {
                    body.push_text(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(TeiError::NotTei);
    }

    Ok(ParsedDocument {
        header: DocumentHeader {
            title: (!title.is_empty()).then_some(title),
            authors,
            doi,
            date: date_when.or(date_text),
        },
        abstract_text: abstract_text.finish(),
        body: body.finish(),
    })
}
