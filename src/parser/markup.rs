use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use tracing::{debug, trace};

/// One markup token, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    /// Tag name is lowercased; `class` is empty when the element has none.
    Open { tag: String, class: String },
    Text(String),
    Close { tag: String },
}

/// Lenient tokenizer over an HTML string.
///
/// Built on the XML reader with end-name checks turned off, so unclosed void
/// elements and stray end tags pass through. Self-closing elements (`<x/>`)
/// produce no events. Reader errors skip the offending fragment instead of
/// failing the scan.
pub struct Tokenizer<'a> {
    reader: Reader<&'a [u8]>,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(html: &'a str) -> Self {
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;

        Tokenizer {
            reader,
            done: false,
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = MarkupEvent;

    fn next(&mut self) -> Option<MarkupEvent> {
        while !self.done {
            let before = self.reader.buffer_position();
            match self.reader.read_event() {
                Ok(Event::Start(e)) => return Some(open_event(&e)),
                // Self-closing elements carry no content and are not reported
                Ok(Event::Empty(e)) => {
                    trace!("Skipping self-closing <{}>", tag_name(e.name().as_ref()));
                }
                Ok(Event::End(e)) => {
                    return Some(MarkupEvent::Close {
                        tag: tag_name(e.name().as_ref()),
                    })
                }
                Ok(Event::Text(e)) => return Some(MarkupEvent::Text(text_of(&e))),
                Ok(Event::CData(e)) => {
                    return Some(MarkupEvent::Text(String::from_utf8_lossy(&e).into_owned()))
                }
                Ok(Event::Eof) => self.done = true,
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        "Skipping malformed markup at byte {}: {}",
                        self.reader.error_position(),
                        e
                    );
                    if self.reader.buffer_position() == before {
                        self.done = true;
                    }
                }
            }
        }

        None
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn open_event(e: &BytesStart) -> MarkupEvent {
    // Every class attribute overwrites the previous one
    let mut class = String::new();
    let mut attributes = e.html_attributes();
    attributes.with_checks(false);
    for attr in attributes.flatten() {
        if attr.key.as_ref().eq_ignore_ascii_case(b"class") {
            class = match attr.unescape_value_with(resolve_html5_entity) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
        }
    }

    MarkupEvent::Open {
        tag: tag_name(e.name().as_ref()),
        class,
    }
}

fn text_of(e: &BytesText) -> String {
    match e.unescape_with(resolve_html5_entity) {
        Ok(text) => text.into_owned(),
        Err(err) => {
            debug!("Passing raw text through, unescape failed: {}", err);
            String::from_utf8_lossy(e).into_owned()
        }
    }
}
