use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use super::markup::MarkupEvent;

static MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)([0-9]+) min").unwrap());

const EPISODE_CELL: &str = "episodecell";
const TITLE_STACK: &str = "titlestack";
const SINGLE_LINE: &str = "singleline";

/// One unplayed episode from the listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Episode {
    pub podcast: String,
    pub title: String,
    /// Minutes
    pub duration: u32,
}

/// Single-scan state machine over markup events.
///
/// Records become visible only when their enclosing cell anchor closes; a
/// cell that never closes contributes nothing. Markers are matched as
/// substrings of the class attribute.
pub struct EpisodeExtractor {
    in_episode_cell: bool,
    in_title_stack: bool,
    /// Index of the current single line, -1 outside one
    line: i32,
    current: Option<Episode>,
    episodes: Vec<Episode>,
}

impl Default for EpisodeExtractor {
    fn default() -> Self {
        EpisodeExtractor {
            in_episode_cell: false,
            in_title_stack: false,
            line: -1,
            current: None,
            episodes: Vec::new(),
        }
    }
}

impl EpisodeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &MarkupEvent) {
        match event {
            MarkupEvent::Open { tag, class } => self.open(tag, class),
            MarkupEvent::Text(text) => self.text(text),
            MarkupEvent::Close { tag } => self.close(tag),
        }
    }

    /// Finalized episodes in document order. An unterminated cell is dropped.
    pub fn finish(self) -> Vec<Episode> {
        if let Some(partial) = self.current {
            debug!(
                "Dropping episode from unterminated cell: {:?}",
                partial.podcast.trim()
            );
        }
        self.episodes
    }

    fn open(&mut self, tag: &str, class: &str) {
        if tag == "a" && class.contains(EPISODE_CELL) {
            self.in_episode_cell = true;
            return;
        }

        if tag == "div" && self.in_episode_cell && class.contains(TITLE_STACK) {
            self.in_title_stack = true;
            return;
        }

        if tag == "div" && self.in_title_stack && class.contains(SINGLE_LINE) {
            self.line += 1;
            if self.line == 0 {
                self.current = Some(Episode::default());
            }
        }
    }

    fn text(&mut self, text: &str) {
        if !(self.in_episode_cell && self.in_title_stack) {
            return;
        }
        let Some(episode) = self.current.as_mut() else {
            return;
        };

        match self.line {
            0 => episode.podcast.push_str(text),
            1 => episode.title.push_str(text),
            2 => add_minutes(episode, text),
            _ => {}
        }
    }

    fn close(&mut self, tag: &str) {
        if tag != "a" || !self.in_episode_cell {
            return;
        }

        self.in_episode_cell = false;
        self.in_title_stack = false;
        self.line = -1;

        if let Some(mut episode) = self.current.take() {
            episode.podcast = episode.podcast.trim().to_string();
            episode.title = episode.title.trim().to_string();
            self.episodes.push(episode);
        }
    }
}

// One search per text event; "12 min" split across two events matches neither.
// Only ASCII digits count.
fn add_minutes(episode: &mut Episode, text: &str) {
    let Some(caps) = MINUTES_RE.captures(text) else {
        return;
    };

    let minutes = match caps[1].parse::<u32>() {
        Ok(m) => m,
        Err(e) => {
            trace!("Ignoring duration fragment {:?}: {}", &caps[1], e);
            return;
        }
    };

    match episode.duration.checked_add(minutes) {
        Some(total) => episode.duration = total,
        None => trace!("Ignoring duration fragment {:?}: overflow", &caps[1]),
    }
}

/// Run the state machine over an event stream with fresh state.
pub fn extract_events<I>(events: I) -> Vec<Episode>
where
    I: IntoIterator<Item = MarkupEvent>,
{
    let mut extractor = EpisodeExtractor::new();
    for event in events {
        extractor.handle(&event);
    }
    extractor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(tag: &str, class: &str) -> MarkupEvent {
        MarkupEvent::Open {
            tag: tag.into(),
            class: class.into(),
        }
    }

    fn close(tag: &str) -> MarkupEvent {
        MarkupEvent::Close { tag: tag.into() }
    }

    fn text(t: &str) -> MarkupEvent {
        MarkupEvent::Text(t.into())
    }

    /// Cell with one text event per line, each line closed.
    fn cell(lines: &[&[&str]]) -> Vec<MarkupEvent> {
        let mut events = vec![open("a", "episodecell"), open("div", "titlestack")];
        for parts in lines {
            events.push(open("div", "singleline"));
            events.extend(parts.iter().map(|p| text(p)));
            events.push(close("div"));
        }
        events.push(close("div"));
        events.push(close("a"));
        events
    }

    #[test]
    fn no_cells_no_episodes() {
        let events = vec![open("div", "titlestack"), text("x"), close("div")];
        assert!(extract_events(events).is_empty());
        assert!(extract_events(Vec::<MarkupEvent>::new()).is_empty());
    }

    #[test]
    fn single_cell() {
        let eps = extract_events(cell(&[&["PodName"], &["Ep Title"], &["42 min"]]));
        assert_eq!(
            eps,
            vec![Episode {
                podcast: "PodName".into(),
                title: "Ep Title".into(),
                duration: 42,
            }]
        );
    }

    #[test]
    fn split_text_is_concatenated() {
        let eps = extract_events(cell(&[&["Pod", "Name"], &["Ep ", "Title"], &["1 min"]]));
        assert_eq!(eps[0].podcast, "PodName");
        assert_eq!(eps[0].title, "Ep Title");
    }

    #[test]
    fn durations_accumulate_across_events() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["10 min", " · ", "5 MIN left"]]));
        assert_eq!(eps[0].duration, 15);
    }

    #[test]
    fn only_first_match_per_event_counts() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["10 min, 5 min"]]));
        assert_eq!(eps[0].duration, 10);
    }

    #[test]
    fn duration_split_across_events_is_lost() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["12", " min"]]));
        assert_eq!(eps[0].duration, 0);
    }

    #[test]
    fn oversized_duration_is_ignored() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["99999999999 min", "3 min"]]));
        assert_eq!(eps[0].duration, 3);
    }

    #[test]
    fn non_ascii_digits_are_not_minutes() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["\u{664}\u{662} min", "3 min"]]));
        assert_eq!(eps[0].duration, 3);
    }

    #[test]
    fn whitespace_kept_until_finalized() {
        let mut x = EpisodeExtractor::new();
        for e in [
            open("a", "episodecell"),
            open("div", "titlestack"),
            open("div", "singleline"),
            text("  Pod "),
            text(" Name \n"),
        ] {
            x.handle(&e);
        }
        assert_eq!(x.current.as_ref().unwrap().podcast, "  Pod  Name \n");

        x.handle(&close("a"));
        let eps = x.finish();
        assert_eq!(eps[0].podcast, "Pod  Name");
    }

    #[test]
    fn unterminated_cell_is_dropped() {
        let mut events = cell(&[&["Done"], &["T"], &["1 min"]]);
        events.extend([
            open("a", "episodecell"),
            open("div", "titlestack"),
            open("div", "singleline"),
            text("Partial"),
        ]);
        let eps = extract_events(events);
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].podcast, "Done");
    }

    #[test]
    fn cell_without_lines_is_skipped() {
        let events = vec![open("a", "episodecell"), text("nothing"), close("a")];
        assert!(extract_events(events).is_empty());
    }

    #[test]
    fn text_outside_title_stack_is_ignored() {
        let events = vec![
            open("a", "episodecell"),
            text("art"),
            open("div", "titlestack"),
            open("div", "singleline"),
            text("Pod"),
            close("div"),
            close("div"),
            text("after stack"),
            close("a"),
        ];
        // The stack flag stays set until the anchor closes
        assert_eq!(extract_events(events)[0].podcast, "Podafter stack");
    }

    #[test]
    fn class_markers_match_substrings() {
        let events = vec![
            open("a", "otherepisodecellx"),
            open("div", "titlestack"),
            open("div", "singleline"),
            text("Loose"),
            close("a"),
        ];
        assert_eq!(extract_events(events)[0].podcast, "Loose");
    }

    #[test]
    fn titlestack_checked_before_singleline() {
        let events = vec![
            open("a", "episodecell"),
            open("div", "titlestack singleline"),
            text("ignored"),
            open("div", "singleline"),
            text("Pod"),
            close("a"),
        ];
        assert_eq!(extract_events(events)[0].podcast, "Pod");
    }

    #[test]
    fn extra_lines_are_ignored() {
        let eps = extract_events(cell(&[&["P"], &["T"], &["2 min"], &["9 min"]]));
        assert_eq!(eps[0].duration, 2);
    }

    #[test]
    fn non_anchor_close_keeps_cell_open() {
        let mut events = cell(&[&["P"], &["T"], &["2 min"]]);
        events.pop();
        events.push(close("span"));
        assert!(extract_events(events).is_empty());
    }

    #[test]
    fn nested_anchor_close_ends_the_cell() {
        let events = vec![
            open("a", "episodecell"),
            open("div", "titlestack"),
            open("div", "singleline"),
            text("Outer"),
            open("a", "link"),
            close("a"),
            open("div", "singleline"),
            text("lost"),
            close("a"),
        ];
        let eps = extract_events(events);
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].podcast, "Outer");
        assert_eq!(eps[0].title, "");
    }
}
