//! Reminder library for plain Markdown notes.
//!
//! Documents are modeled line by line: checkbox items (`- [ ] ...`) and lines carrying an
//! inline `(@...)` date annotation are classified into editable entities, while every other
//! byte of the text is kept as-is. Serializing a document only rewrites the substrings an
//! entity was asked to change.

pub mod time {
    //! Date/time values as they appear inside `(@...)` annotations.

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
    use nom::{
        IResult,
        bytes::complete::take_while_m_n,
        character::complete::{char, space1},
        combinator::{all_consuming, map, map_res, opt},
        error::VerboseError,
        sequence::{preceded, tuple},
    };
    use serde_with::{DeserializeFromStr, SerializeDisplay};
    use std::{fmt, str::FromStr};

    /// A calendar date with an optional time of day.
    ///
    /// The canonical form is `YYYY-MM-DD` or `YYYY-MM-DD HH:MM`; `Display` and `FromStr`
    /// agree on it, so a value can be written verbatim into an annotation and read back.
    #[derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        SerializeDisplay,
        DeserializeFromStr,
    )]
    pub struct DateTime {
        date: NaiveDate,
        time: Option<NaiveTime>,
    }

    impl DateTime {
        pub fn new(date: NaiveDate, time: Option<NaiveTime>) -> Self {
            Self { date, time }
        }

        pub fn all_day(date: NaiveDate) -> Self {
            Self { date, time: None }
        }

        /// Truncates to minute precision, the finest the canonical form can express.
        pub fn from_naive(value: NaiveDateTime) -> Self {
            let time = NaiveTime::from_hms_opt(value.hour(), value.minute(), 0);
            Self {
                date: value.date(),
                time,
            }
        }

        pub fn date(&self) -> NaiveDate {
            self.date
        }

        pub fn time(&self) -> Option<NaiveTime> {
            self.time
        }

        pub fn has_time(&self) -> bool {
            self.time.is_some()
        }
    }

    impl fmt::Display for DateTime {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.time {
                Some(t) => write!(f, "{} {}", self.date.format("%Y-%m-%d"), t.format("%H:%M")),
                None => write!(f, "{}", self.date.format("%Y-%m-%d")),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum ParseTimeError {
        #[error("empty date/time")]
        Empty,
        #[error("invalid date/time {0:?} (expected YYYY-MM-DD or YYYY-MM-DD HH:MM)")]
        Invalid(String),
    }

    impl FromStr for DateTime {
        type Err = ParseTimeError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let s = s.trim();
            if s.is_empty() {
                return Err(ParseTimeError::Empty);
            }
            all_consuming(parse_date_time)(s)
                .map(|(_, value)| value)
                .map_err(|_| ParseTimeError::Invalid(s.to_string()))
        }
    }

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    fn parse_date_time(i: &str) -> PResult<'_, DateTime> {
        map(
            tuple((parse_date, opt(preceded(space1, parse_time)))),
            |(date, time)| DateTime { date, time },
        )(i)
    }

    fn parse_date(i: &str) -> PResult<'_, NaiveDate> {
        map_res(
            tuple((
                map_res(take_while_m_n(4, 4, char_is_digit), |s: &str| {
                    s.parse::<i32>()
                }),
                char('-'),
                map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                    s.parse::<u32>()
                }),
                char('-'),
                map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                    s.parse::<u32>()
                }),
            )),
            |(y, _, m, _, d)| NaiveDate::from_ymd_opt(y, m, d).ok_or("invalid date"),
        )(i)
    }

    fn parse_time(i: &str) -> PResult<'_, NaiveTime> {
        map_res(
            tuple((
                map_res(take_while_m_n(1, 2, char_is_digit), |s: &str| {
                    s.parse::<u32>()
                }),
                char(':'),
                map_res(take_while_m_n(2, 2, char_is_digit), |s: &str| {
                    s.parse::<u32>()
                }),
            )),
            |(h, _, m)| NaiveTime::from_hms_opt(h, m, 0).ok_or("invalid time"),
        )(i)
    }

    fn char_is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

}

pub mod config {
    //! Explicitly injected configuration: the annotation trigger and reminder format
    //! parameters. Nothing here is process-global; each document carries its own
    //! [`TriggerConfig`].

    use anyhow::{Context, Result};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::{fs, path::Path};

    /// The annotation marker recognized by line parsing.
    pub const DEFAULT_TRIGGER: &str = "(@";

    /* ------------------------------ Trigger ------------------------------ */

    /// Marker that announces a date annotation while typing, e.g. `(@`.
    ///
    /// Classification only tests lines containing this marker for annotations, and
    /// rewritten annotations are introduced with it.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TriggerConfig {
        #[serde(default = "TriggerConfig::default_trigger")]
        auto_complete_trigger: String,
    }

    impl Default for TriggerConfig {
        fn default() -> Self {
            Self {
                auto_complete_trigger: Self::default_trigger(),
            }
        }
    }

    impl TriggerConfig {
        pub fn new(trigger: impl Into<String>) -> Self {
            Self {
                auto_complete_trigger: trigger.into(),
            }
        }

        pub fn auto_complete_trigger(&self) -> &str {
            &self.auto_complete_trigger
        }

        pub fn set_auto_complete_trigger(&mut self, trigger: impl Into<String>) {
            self.auto_complete_trigger = trigger.into();
        }

        fn default_trigger() -> String {
            DEFAULT_TRIGGER.to_string()
        }
    }

    /* ---------------------------- Parameters ---------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum ReminderFormatParameterKey {
        /// Dates are written as `[[YYYY-MM-DD]]` links to daily notes.
        LinkDatesToDailyNotes,
    }

    impl ReminderFormatParameterKey {
        fn expected_kind(self) -> &'static str {
            match self {
                Self::LinkDatesToDailyNotes => "boolean",
            }
        }

        fn accepts(self, value: &ParameterValue) -> bool {
            match self {
                Self::LinkDatesToDailyNotes => matches!(value, ParameterValue::Bool(_)),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum ParameterValue {
        Bool(bool),
        Text(String),
    }

    impl ParameterValue {
        pub fn as_bool(&self) -> Option<bool> {
            match self {
                Self::Bool(b) => Some(*b),
                Self::Text(_) => None,
            }
        }
    }

    impl From<bool> for ParameterValue {
        fn from(value: bool) -> Self {
            Self::Bool(value)
        }
    }

    impl From<&str> for ParameterValue {
        fn from(value: &str) -> Self {
            Self::Text(value.to_string())
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum ConfigError {
        #[error("parameter {key:?} expects a {expected} value, got {value:?}")]
        WrongType {
            key: ReminderFormatParameterKey,
            expected: &'static str,
            value: ParameterValue,
        },
    }

    /// Parameter store consulted by reminder formats.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ReminderFormatConfig {
        params: IndexMap<ReminderFormatParameterKey, ParameterValue>,
    }

    impl ReminderFormatConfig {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_parameter(&self, key: ReminderFormatParameterKey) -> Option<&ParameterValue> {
            self.params.get(&key)
        }

        pub fn set_parameter(
            &mut self,
            key: ReminderFormatParameterKey,
            value: impl Into<ParameterValue>,
        ) -> Result<(), ConfigError> {
            let value = value.into();
            check_kind(key, &value)?;
            self.params.insert(key, value);
            Ok(())
        }

        pub fn link_dates_to_daily_notes(&self) -> bool {
            self.get_parameter(ReminderFormatParameterKey::LinkDatesToDailyNotes)
                .and_then(ParameterValue::as_bool)
                .unwrap_or(false)
        }

        /// Checks every stored value against the type its key expects.
        pub fn validate(&self) -> Result<(), ConfigError> {
            for (key, value) in &self.params {
                check_kind(*key, value)?;
            }
            Ok(())
        }
    }

    fn check_kind(key: ReminderFormatParameterKey, value: &ParameterValue) -> Result<(), ConfigError> {
        if key.accepts(value) {
            Ok(())
        } else {
            Err(ConfigError::WrongType {
                key,
                expected: key.expected_kind(),
                value: value.clone(),
            })
        }
    }

    /* ----------------------------- Settings ----------------------------- */

    /// Settings file read by the command line tool.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Settings {
        pub trigger: TriggerConfig,
        pub format: ReminderFormatConfig,
    }

    impl Settings {
        pub fn load(path: &Path) -> Result<Self> {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            Self::from_json_str(&text).with_context(|| format!("parsing settings {:?}", path))
        }

        pub fn from_json_str(text: &str) -> Result<Self> {
            let settings: Settings = serde_json::from_str(text)?;
            settings.format.validate()?;
            Ok(settings)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_use_plain_marker_and_no_links() {
            let settings = Settings::from_json_str("{}").expect("empty settings");
            assert_eq!(settings.trigger.auto_complete_trigger(), "(@");
            assert!(!settings.format.link_dates_to_daily_notes());
            assert!(
                settings
                    .format
                    .get_parameter(ReminderFormatParameterKey::LinkDatesToDailyNotes)
                    .is_none()
            );
        }

        #[test]
        fn reads_trigger_and_parameters() {
            let settings = Settings::from_json_str(
                r#"{"trigger":{"autoCompleteTrigger":"(at "},"format":{"linkDatesToDailyNotes":true}}"#,
            )
            .expect("settings");
            assert_eq!(settings.trigger.auto_complete_trigger(), "(at ");
            assert!(settings.format.link_dates_to_daily_notes());
        }

        #[test]
        fn rejects_wrongly_typed_parameters() {
            let err = Settings::from_json_str(r#"{"format":{"linkDatesToDailyNotes":"yes"}}"#)
                .expect_err("string is not a boolean");
            assert!(format!("{err:#}").contains("boolean"));

            let mut config = ReminderFormatConfig::new();
            assert!(
                config
                    .set_parameter(ReminderFormatParameterKey::LinkDatesToDailyNotes, "yes")
                    .is_err()
            );
            config
                .set_parameter(ReminderFormatParameterKey::LinkDatesToDailyNotes, true)
                .expect("bool accepted");
            assert!(config.link_dates_to_daily_notes());
        }

        #[test]
        fn loads_settings_from_disk() {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("remind.json");
            fs::write(&path, r#"{"trigger":{"autoCompleteTrigger":"(@"}}"#).expect("write");
            let settings = Settings::load(&path).expect("load");
            assert_eq!(settings, Settings::default());
            assert!(Settings::load(&dir.path().join("missing.json")).is_err());
        }
    }
}

pub mod markdown {
    //! Line-oriented Markdown model.
    //!
    //! A [`MarkdownDocument`] owns the raw lines and two derived entity lists: [`Todo`]s for
    //! checkbox items and [`TriggerLine`]s for lines carrying a `(@...)` annotation. Entities
    //! point at their row through `line_index` and hold the authoritative text for that row
    //! until [`MarkdownDocument::to_markdown`] flushes them back.

    use crate::config::{DEFAULT_TRIGGER, TriggerConfig};
    use crate::time::DateTime;
    use nom::{
        IResult,
        bytes::complete::{tag, take_until, take_while, take_while1},
        character::complete::{anychar, char, one_of},
        combinator::{opt, recognize, rest, verify},
        error::VerboseError,
        multi::many0_count,
        sequence::{delimited, pair, tuple},
    };
    use serde::{Deserialize, Serialize};

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------------- Todo ------------------------------- */

    const CHECKED_STATUSES: [char; 2] = ['x', '-'];

    /// A checkbox item such as `  - [x] hello`.
    ///
    /// For that line `prefix` is `"  - ["`, `check` is `'x'`, `suffix` is `"] "` and `body`
    /// is `"hello"`; the four pieces always concatenate back to the line.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct Todo {
        pub line_index: usize,
        prefix: String,
        pub check: char,
        suffix: String,
        pub body: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TodoEdit {
        pub checked: Option<bool>,
        pub body: Option<String>,
    }

    impl Todo {
        /// Returns `None` for anything that is not a checkbox line.
        pub fn parse(line_index: usize, line: &str) -> Option<Self> {
            let (_, (prefix, check, suffix, body)) = todo_line(line).ok()?;
            Some(Self {
                line_index,
                prefix: prefix.to_string(),
                check,
                suffix: suffix.to_string(),
                body: body.to_string(),
            })
        }

        pub fn prefix(&self) -> &str {
            &self.prefix
        }

        pub fn suffix(&self) -> &str {
            &self.suffix
        }

        pub fn is_checked(&self) -> bool {
            CHECKED_STATUSES.contains(&self.check)
        }

        /// Overwrites the status mark with `x` or a space; a `-` mark is not restored.
        pub fn set_checked(&mut self, checked: bool) {
            self.check = if checked { 'x' } else { ' ' };
        }

        pub fn set_body(&mut self, body: impl Into<String>) {
            self.body = body.into();
        }

        pub fn apply(&mut self, edit: &TodoEdit) {
            if let Some(checked) = edit.checked {
                self.set_checked(checked);
            }
            if let Some(body) = &edit.body {
                self.set_body(body.as_str());
            }
        }

        pub fn to_markdown(&self) -> String {
            format!("{}{}{}{}", self.prefix, self.check, self.suffix, self.body)
        }

        /// Number of characters before the body, for placing a caret at its start.
        pub fn header_length(&self) -> usize {
            self.prefix.chars().count() + 1 + self.suffix.chars().count()
        }

        /// Clones by re-parsing the current serialization. `None` when the fields no longer
        /// form a checkbox line (e.g. a newline was stored in `check` or `body`).
        pub fn reparse(&self) -> Option<Self> {
            Self::parse(self.line_index, &self.to_markdown())
        }
    }

    // prefix: quote markers, indentation, list marker, spaces, `[`
    // check:  one character
    // suffix: `]` plus the whitespace run that follows
    // body:   the rest of the line
    fn todo_line(i: &str) -> PResult<'_, (&str, char, &str, &str)> {
        let (i, prefix) = recognize(tuple((
            many0_count(pair(char('>'), opt(char(' ')))),
            take_while(char::is_whitespace),
            one_of("-*"),
            take_while1(|c: char| c == ' '),
            char('['),
        )))(i)?;
        let (i, check) = verify(anychar, |c: &char| *c != '\n')(i)?;
        let (i, suffix) = recognize(pair(char(']'), take_while1(char::is_whitespace)))(i)?;
        let (i, body) = verify(rest, |s: &str| !s.contains('\n'))(i)?;
        Ok((i, (prefix, check, suffix, body)))
    }

    /* ---------------------------- Trigger lines ---------------------------- */

    /// A line carrying a date annotation, e.g. `- Call mom (@2024-01-01 10:00) today`.
    ///
    /// `line` is the current text of the row. `prefix` and `suffix` are the text around the
    /// first annotation as originally parsed; the annotation itself is regenerated (or
    /// dropped) every time the line is rewritten.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct TriggerLine {
        pub line_index: usize,
        pub line: String,
        prefix: String,
        suffix: String,
    }

    impl TriggerLine {
        pub fn parse(line_index: usize, line: &str) -> Option<Self> {
            let (_, (prefix, _payload, suffix)) = annotated_line(line).ok()?;
            Some(Self {
                line_index,
                line: line.to_string(),
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            })
        }

        pub fn prefix(&self) -> &str {
            &self.prefix
        }

        pub fn suffix(&self) -> &str {
            &self.suffix
        }

        /// Checking a trigger line drops its annotation; unchecking leaves the line alone.
        pub fn set_checked(&mut self, trigger: &TriggerConfig, checked: bool) {
            if checked {
                self.line = self.to_markdown(trigger, None);
            }
        }

        pub fn set_new_date_time(&mut self, trigger: &TriggerConfig, time: &DateTime) {
            self.line = self.to_markdown(trigger, Some(time));
        }

        /// With a time, writes `prefix<trigger><time>)suffix`. Without one, removes the
        /// annotation together with the whitespace in front of it.
        pub fn to_markdown(&self, trigger: &TriggerConfig, time: Option<&DateTime>) -> String {
            match time {
                Some(time) => format!(
                    "{}{}{}){}",
                    self.prefix,
                    trigger.auto_complete_trigger(),
                    time,
                    self.suffix
                ),
                None => format!("{}{}", self.prefix.trim_end(), self.suffix),
            }
        }
    }

    // Matches the literal default marker, whatever trigger the document is configured with.
    fn annotated_line(i: &str) -> PResult<'_, (&str, &str, &str)> {
        tuple((
            take_until(DEFAULT_TRIGGER),
            delimited(
                tag(DEFAULT_TRIGGER),
                recognize(pair(anychar, take_until(")"))),
                char(')'),
            ),
            rest,
        ))(i)
    }

    /* ------------------------------ Document ------------------------------ */

    #[derive(Debug, Clone)]
    pub struct MarkdownDocument {
        file: String,
        lines: Vec<String>,
        todos: Vec<Todo>,
        trigger_lines: Vec<TriggerLine>,
        trigger: TriggerConfig,
    }

    impl MarkdownDocument {
        /// Splits `content` into lines and classifies them right away.
        pub fn new(file: impl Into<String>, content: &str, trigger: TriggerConfig) -> Self {
            let mut doc = Self {
                file: file.into(),
                lines: content.split('\n').map(str::to_string).collect(),
                todos: vec![],
                trigger_lines: vec![],
                trigger,
            };
            doc.classify();
            doc
        }

        pub fn file(&self) -> &str {
            &self.file
        }

        pub fn trigger_config(&self) -> &TriggerConfig {
            &self.trigger
        }

        pub fn lines(&self) -> &[String] {
            &self.lines
        }

        pub fn line_count(&self) -> usize {
            self.lines.len()
        }

        pub fn todos(&self) -> &[Todo] {
            &self.todos
        }

        pub fn trigger_lines(&self) -> &[TriggerLine] {
            &self.trigger_lines
        }

        /// Rebuilds every entity from the current lines. Entity edits that were not flushed
        /// through [`Self::to_markdown`] are discarded.
        pub fn reclassify(&mut self) {
            self.classify();
        }

        fn classify(&mut self) {
            self.todos.clear();
            self.trigger_lines.clear();
            let trigger = self.trigger.auto_complete_trigger();
            for (line_index, line) in self.lines.iter().enumerate() {
                if let Some(todo) = Todo::parse(line_index, line) {
                    self.todos.push(todo);
                    continue;
                }
                if trigger.is_empty() || !line.contains(trigger) {
                    continue;
                }
                if let Some(trigger_line) = TriggerLine::parse(line_index, line) {
                    self.trigger_lines.push(trigger_line);
                }
            }
            log::debug!(
                "classified {:?}: {} lines, {} todos, {} trigger lines",
                self.file,
                self.lines.len(),
                self.todos.len(),
                self.trigger_lines.len()
            );
        }

        /// Inserts `todo` as a new row at `line_index` (clamped to the end of the document).
        ///
        /// Entities at or below that row move down by one; trigger lines are shifted along
        /// with todos so flushing keeps writing every entity to its own row.
        pub fn insert_todo(&mut self, line_index: usize, mut todo: Todo) {
            let line_index = line_index.min(self.lines.len());
            todo.line_index = line_index;
            self.lines.insert(line_index, todo.to_markdown());

            let mut position = None;
            for (i, existing) in self.todos.iter_mut().enumerate() {
                if existing.line_index >= line_index {
                    position.get_or_insert(i);
                    existing.line_index += 1;
                }
            }
            for trigger_line in &mut self.trigger_lines {
                if trigger_line.line_index >= line_index {
                    trigger_line.line_index += 1;
                }
            }

            let position = position.unwrap_or(self.todos.len());
            self.todos.insert(position, todo);
        }

        pub fn get_todo(&self, line_index: usize) -> Option<&Todo> {
            self.todos.iter().find(|t| t.line_index == line_index)
        }

        pub fn get_todo_mut(&mut self, line_index: usize) -> Option<&mut Todo> {
            self.todos.iter_mut().find(|t| t.line_index == line_index)
        }

        pub fn get_trigger_line(&self, line_index: usize) -> Option<&TriggerLine> {
            self.trigger_lines
                .iter()
                .find(|l| l.line_index == line_index)
        }

        pub fn get_trigger_line_mut(&mut self, line_index: usize) -> Option<&mut TriggerLine> {
            self.trigger_lines
                .iter_mut()
                .find(|l| l.line_index == line_index)
        }

        /// Applies `edit` to the todo at `line_index`; false when there is none.
        pub fn modify_todo(&mut self, line_index: usize, edit: &TodoEdit) -> bool {
            match self.get_todo_mut(line_index) {
                Some(todo) => {
                    todo.apply(edit);
                    true
                }
                None => false,
            }
        }

        fn apply_changes(&mut self) {
            for todo in &self.todos {
                if let Some(slot) = self.lines.get_mut(todo.line_index) {
                    *slot = todo.to_markdown();
                }
            }
            for trigger_line in &self.trigger_lines {
                if let Some(slot) = self.lines.get_mut(trigger_line.line_index) {
                    slot.clone_from(&trigger_line.line);
                }
            }
        }

        /// Flushes entity state into the lines and joins them back together.
        pub fn to_markdown(&mut self) -> String {
            self.apply_changes();
            self.lines.join("\n")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn doc(content: &str) -> MarkdownDocument {
            MarkdownDocument::new("notes.md", content, TriggerConfig::default())
        }

        fn time(s: &str) -> DateTime {
            s.parse().expect("date time")
        }

        #[test]
        fn todo_splits_indented_checkbox() {
            let mut todo = Todo::parse(3, "  - [ ] buy milk").expect("todo");
            assert_eq!(todo.line_index, 3);
            assert_eq!(todo.prefix(), "  - [");
            assert_eq!(todo.check, ' ');
            assert_eq!(todo.suffix(), "] ");
            assert_eq!(todo.body, "buy milk");
            assert!(!todo.is_checked());

            let header = todo.header_length();
            assert_eq!(header, 8);
            todo.set_checked(true);
            assert_eq!(todo.to_markdown(), "  - [x] buy milk");
            assert_eq!(todo.header_length(), header);
        }

        #[test]
        fn todo_checked_statuses() {
            for (mark, expected) in [('x', true), ('-', true), (' ', false), ('X', false), ('/', false)]
            {
                let todo = Todo::parse(0, &format!("- [{mark}] task")).expect("todo");
                assert_eq!(todo.is_checked(), expected, "mark {mark:?}");
            }
        }

        #[test]
        fn unchecking_overwrites_cancelled_mark() {
            let mut todo = Todo::parse(0, "- [-] dropped").expect("todo");
            todo.set_checked(false);
            assert_eq!(todo.to_markdown(), "- [ ] dropped");
        }

        #[test]
        fn todo_accepts_quotes_and_star_markers() {
            let todo = Todo::parse(0, "> > * [x]   quoted").expect("quoted todo");
            assert_eq!(todo.prefix(), "> > * [");
            assert_eq!(todo.suffix(), "]   ");
            assert_eq!(todo.body, "quoted");

            let tight = Todo::parse(0, ">- [ ] tight").expect("tight quote");
            assert_eq!(tight.prefix(), ">- [");

            let empty = Todo::parse(0, "- [ ] ").expect("empty body");
            assert_eq!(empty.body, "");
            assert_eq!(empty.to_markdown(), "- [ ] ");
        }

        #[test]
        fn todo_ignores_other_lines() {
            for line in [
                "plain text",
                "- [x]",
                "-[ ] no space",
                "1. [ ] ordered",
                "  > - [ ] quote after indent",
                "- item",
                "",
            ] {
                assert!(Todo::parse(0, line).is_none(), "{line:?} is not a todo");
            }
        }

        #[test]
        fn todo_edit_and_reparse() {
            let mut todo = Todo::parse(2, "* [ ] buy milk").expect("todo");
            todo.apply(&TodoEdit {
                checked: Some(true),
                body: Some("buy oat milk".into()),
            });
            assert_eq!(todo.to_markdown(), "* [x] buy oat milk");
            assert_eq!(todo.reparse(), Some(todo.clone()));

            todo.check = '\n';
            assert!(todo.reparse().is_none());
        }

        #[test]
        fn trigger_line_clears_annotation() {
            let line = TriggerLine::parse(0, "- Call mom (@2024-01-01 10:00)").expect("trigger");
            assert_eq!(line.prefix(), "- Call mom ");
            assert_eq!(line.suffix(), "");
            assert_eq!(line.to_markdown(&TriggerConfig::default(), None), "- Call mom");

            let spaced = TriggerLine::parse(0, "task \t (@2024-01-01)  tail").expect("trigger");
            assert_eq!(spaced.to_markdown(&TriggerConfig::default(), None), "task  tail");
        }

        #[test]
        fn new_date_time_keeps_surrounding_text() {
            let trigger = TriggerConfig::default();
            let mut line =
                TriggerLine::parse(4, "  > ping (@2024-01-01) about *x*  ").expect("trigger");
            line.set_new_date_time(&trigger, &time("2024-06-07 08:30"));
            assert_eq!(line.line, "  > ping (@2024-06-07 08:30) about *x*  ");
            assert_eq!(line.prefix(), "  > ping ");
            assert_eq!(line.suffix(), " about *x*  ");
        }

        #[test]
        fn rewrite_uses_configured_trigger() {
            let line = TriggerLine::parse(0, "x (@2024-01-01) y").expect("trigger");
            let custom = TriggerConfig::new("(at ");
            assert_eq!(
                line.to_markdown(&custom, Some(&time("2024-01-02"))),
                "x (at 2024-01-02) y"
            );
        }

        #[test]
        fn trigger_line_takes_first_annotation_only() {
            let line = TriggerLine::parse(0, "a (@1) b (@2) c").expect("trigger");
            assert_eq!(line.prefix(), "a ");
            assert_eq!(line.suffix(), " b (@2) c");

            assert!(TriggerLine::parse(0, "a (@) b").is_none());
            assert!(TriggerLine::parse(0, "no annotation").is_none());
            assert!(TriggerLine::parse(0, "open (@2024-01-01").is_none());
        }

        #[test]
        fn checking_trigger_line_is_one_way() {
            let trigger = TriggerConfig::default();
            let mut line = TriggerLine::parse(0, "water plants (@2024-01-01) weekly").expect("trigger");
            line.set_checked(&trigger, false);
            assert_eq!(line.line, "water plants (@2024-01-01) weekly");
            line.set_checked(&trigger, true);
            assert_eq!(line.line, "water plants weekly");
        }

        #[test]
        fn untouched_documents_round_trip() {
            for content in [
                "",
                "a",
                "a\n",
                "\n\n",
                "# Title\n- [ ] one\n  * [x] two\n> - [-] three\nnote (@2024-01-01) x\n",
                "crlf\r\n- [ ] item\r\nping (@2024-01-01 09:00)\r\n",
            ] {
                assert_eq!(doc(content).to_markdown(), content);
            }
        }

        #[test]
        fn classifies_trigger_lines() {
            let d = doc("a\n(@2024-01-01) reminder\nb");
            assert!(d.todos().is_empty());
            assert_eq!(d.trigger_lines().len(), 1);
            assert_eq!(d.trigger_lines()[0].line_index, 1);
            assert!(d.get_trigger_line(1).is_some());
            assert!(d.get_trigger_line(0).is_none());
            assert!(d.get_todo(1).is_none());
        }

        #[test]
        fn todo_lines_are_never_trigger_lines() {
            let d = doc("- [ ] pay rent (@2024-02-01)\nplain");
            assert_eq!(d.todos().len(), 1);
            assert!(d.trigger_lines().is_empty());
        }

        #[test]
        fn classification_is_gated_by_trigger() {
            let other = MarkdownDocument::new("n.md", "(@2024-01-01) x", TriggerConfig::new("%%"));
            assert!(other.trigger_lines().is_empty());

            let disabled = MarkdownDocument::new("n.md", "(@2024-01-01) x", TriggerConfig::new(""));
            assert!(disabled.trigger_lines().is_empty());
        }

        #[test]
        fn flushes_entity_edits() {
            let mut d = doc("intro\n- [ ] one\nping (@2024-01-01) now\n- [x] two");
            let trigger = d.trigger_config().clone();
            d.get_todo_mut(1).expect("todo").set_checked(true);
            assert!(d.modify_todo(3, &TodoEdit {
                checked: Some(false),
                body: Some("two!".into()),
            }));
            assert!(!d.modify_todo(0, &TodoEdit::default()));
            d.get_trigger_line_mut(2)
                .expect("trigger line")
                .set_new_date_time(&trigger, &time("2024-01-05 07:00"));
            assert_eq!(
                d.to_markdown(),
                "intro\n- [x] one\nping (@2024-01-05 07:00) now\n- [ ] two!"
            );
        }

        #[test]
        fn insert_todo_shifts_later_entities() {
            let mut d = doc("- [ ] a\ntext\n- [ ] b\nping (@2024-01-01)\n- [ ] c");
            let before = d.line_count();
            let new = Todo::parse(99, "- [ ] new").expect("todo");
            d.insert_todo(2, new.clone());

            assert_eq!(d.line_count(), before + 1);
            assert_eq!(d.lines()[2], new.to_markdown());
            let rows: Vec<_> = d.todos().iter().map(|t| t.line_index).collect();
            assert_eq!(rows, vec![0, 2, 3, 5]);
            let bodies: Vec<_> = d.todos().iter().map(|t| t.body.as_str()).collect();
            assert_eq!(bodies, vec!["a", "new", "b", "c"]);
            assert_eq!(d.trigger_lines()[0].line_index, 4);

            let trigger = d.trigger_config().clone();
            d.get_trigger_line_mut(4)
                .expect("shifted trigger line")
                .set_new_date_time(&trigger, &time("2024-02-02"));
            assert_eq!(
                d.to_markdown(),
                "- [ ] a\ntext\n- [ ] new\n- [ ] b\nping (@2024-02-02)\n- [ ] c"
            );
        }

        #[test]
        fn insert_todo_after_every_todo_keeps_order() {
            let mut d = doc("- [ ] a\ntext");
            d.insert_todo(2, Todo::parse(0, "- [ ] z").expect("todo"));
            let rows: Vec<_> = d.todos().iter().map(|t| t.line_index).collect();
            assert_eq!(rows, vec![0, 2]);
            assert_eq!(d.to_markdown(), "- [ ] a\ntext\n- [ ] z");

            let mut empty = doc("text");
            empty.insert_todo(10, Todo::parse(0, "- [ ] z").expect("todo"));
            assert_eq!(empty.todos()[0].line_index, 1);
            assert_eq!(empty.to_markdown(), "text\n- [ ] z");
        }

        #[test]
        fn reclassify_rebuilds_from_lines() {
            let mut d = doc("- [ ] a\nb");
            d.insert_todo(0, Todo::parse(0, "- [x] first").expect("todo"));
            let before = d.todos().to_vec();
            d.reclassify();
            assert_eq!(d.todos(), before.as_slice());
        }
    }
}

pub mod reminder {
    //! Reminder entities and the capability traits a reminder format provides.

    use crate::config::ReminderFormatConfig;
    use crate::markdown::MarkdownDocument;
    use crate::time::DateTime;
    use serde::{Deserialize, Serialize};

    /// A scheduled item derived from one row of a document.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Reminder {
        pub file: String,
        pub title: String,
        pub time: DateTime,
        pub row_number: usize,
        pub done: bool,
    }

    impl Reminder {
        pub fn new(
            file: impl Into<String>,
            title: impl Into<String>,
            time: DateTime,
            row_number: usize,
            done: bool,
        ) -> Self {
            Self {
                file: file.into(),
                title: title.into(),
                time,
                row_number,
                done,
            }
        }
    }

    /// Changes requested for a reminder. `raw_time` wins over `time` when both are set.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ReminderEdit {
        pub checked: Option<bool>,
        pub time: Option<DateTime>,
        pub raw_time: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReminderInsertion {
        pub inserted_line: String,
        pub caret_position: usize,
    }

    /// What a format needs from the per-line model it parses.
    pub trait ReminderModel {
        fn parse_line(line: &str, config: &ReminderFormatConfig) -> Option<Self>
        where
            Self: Sized;

        fn title(&self) -> Option<String>;

        fn time(&self) -> Option<DateTime>;

        /// Replaces the unparsed time payload; false when the model cannot hold `raw_time`.
        fn set_raw_time(&mut self, raw_time: &str) -> bool;

        fn to_markdown(&self) -> String;
    }

    pub trait ReminderFormat {
        fn set_config(&mut self, config: ReminderFormatConfig);

        fn parse(&self, doc: &MarkdownDocument) -> Vec<Reminder>;

        /// Applies `edit` to the row `reminder` came from. Returns false when the row is gone,
        /// no longer holds a valid reminder, or the edit cannot be represented.
        fn modify(&self, doc: &mut MarkdownDocument, reminder: &Reminder, edit: &ReminderEdit)
        -> bool;

        fn append_reminder(
            &self,
            line: &str,
            time: &DateTime,
            insert_at: Option<usize>,
        ) -> Option<ReminderInsertion>;
    }
}

pub mod plain {
    //! The plain reminder format: `title (@2024-01-01 10:00) more title`.

    use crate::config::{DEFAULT_TRIGGER, ReminderFormatConfig, TriggerConfig};
    use crate::markdown::{MarkdownDocument, TriggerLine};
    use crate::reminder::{
        Reminder, ReminderEdit, ReminderFormat, ReminderInsertion, ReminderModel,
    };
    use crate::time::DateTime;
    use nom::{
        IResult,
        bytes::complete::{tag, take_until},
        character::complete::{anychar, char},
        combinator::{recognize, rest},
        error::VerboseError,
        sequence::{delimited, pair, tuple},
    };

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------------- Model ------------------------------- */

    /// Transient split of a line into `title1`, the raw `time` payload and `title2`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PlainReminderModel {
        link_dates_to_daily_notes: bool,
        pub title1: String,
        pub time: String,
        pub title2: String,
    }

    impl PlainReminderModel {
        pub fn parse(line: &str, link_dates_to_daily_notes: bool) -> Option<Self> {
            let (_, (title1, time, title2)) = reminder_line(line).ok()?;
            // A bare "- " is the list marker of a tree item, not part of the title.
            let title1 = if title1 == "- " { "" } else { title1 };
            let time = if link_dates_to_daily_notes {
                time.replacen("[[", "", 1).replacen("]]", "", 1)
            } else {
                time.to_string()
            };
            Some(Self {
                link_dates_to_daily_notes,
                title1: title1.to_string(),
                time,
                title2: title2.to_string(),
            })
        }
    }

    impl ReminderModel for PlainReminderModel {
        fn parse_line(line: &str, config: &ReminderFormatConfig) -> Option<Self> {
            Self::parse(line, config.link_dates_to_daily_notes())
        }

        fn title(&self) -> Option<String> {
            let title = format!("{} {}", self.title1.trim(), self.title2.trim());
            Some(title.trim().to_string())
        }

        fn time(&self) -> Option<DateTime> {
            self.time.parse().ok()
        }

        fn set_raw_time(&mut self, raw_time: &str) -> bool {
            let raw_time = raw_time.trim();
            if raw_time.is_empty() || raw_time.contains([')', '\n']) {
                return false;
            }
            self.time = raw_time.to_string();
            true
        }

        fn to_markdown(&self) -> String {
            let time = if self.link_dates_to_daily_notes {
                match self.time.split_once(' ') {
                    Some((date, rest)) => format!("[[{date}]] {rest}"),
                    None => format!("[[{}]]", self.time),
                }
            } else {
                self.time.clone()
            };
            format!("{}{DEFAULT_TRIGGER}{time}){}", self.title1, self.title2)
        }
    }

    fn reminder_line(i: &str) -> PResult<'_, (&str, &str, &str)> {
        tuple((
            take_until(DEFAULT_TRIGGER),
            delimited(
                tag(DEFAULT_TRIGGER),
                recognize(pair(anychar, take_until(")"))),
                char(')'),
            ),
            rest,
        ))(i)
    }

    /* ------------------------------- Format ------------------------------- */

    #[derive(Debug, Clone, Default)]
    pub struct PlainReminderFormat {
        config: ReminderFormatConfig,
    }

    impl PlainReminderFormat {
        pub fn new(config: ReminderFormatConfig) -> Self {
            Self { config }
        }

        pub fn config(&self) -> &ReminderFormatConfig {
            &self.config
        }

        pub fn parse_reminder(&self, line: &str) -> Option<PlainReminderModel> {
            PlainReminderModel::parse_line(line, &self.config)
        }

        pub fn is_valid_reminder(&self, model: &PlainReminderModel) -> bool {
            model.time().is_some()
        }

        fn parse_valid_reminder(&self, line: &str) -> Option<PlainReminderModel> {
            self.parse_reminder(line)
                .filter(|model| self.is_valid_reminder(model))
        }

        // The fresh model only validates the row; time and check edits go through the
        // trigger line so its original prefix and suffix survive.
        fn modify_reminder(
            trigger: &TriggerConfig,
            trigger_line: &mut TriggerLine,
            parsed: &mut PlainReminderModel,
            edit: &ReminderEdit,
        ) -> bool {
            if let Some(raw_time) = &edit.raw_time {
                if !parsed.set_raw_time(raw_time) {
                    log::warn!(
                        "reminder at row {} does not support raw time {:?}: parsed={:?}",
                        trigger_line.line_index,
                        raw_time,
                        parsed
                    );
                    return false;
                }
            } else if let Some(time) = &edit.time {
                trigger_line.set_new_date_time(trigger, time);
            }
            if let Some(checked) = edit.checked {
                trigger_line.set_checked(trigger, checked);
            }
            true
        }
    }

    impl ReminderFormat for PlainReminderFormat {
        fn set_config(&mut self, config: ReminderFormatConfig) {
            self.config = config;
        }

        /// One reminder per trigger line whose title and time can be derived. The `done`
        /// flag is always false; checked trigger lines have already lost their annotation.
        fn parse(&self, doc: &MarkdownDocument) -> Vec<Reminder> {
            let mut reminders = Vec::new();
            for trigger_line in doc.trigger_lines() {
                let Some(parsed) = self.parse_reminder(&trigger_line.line) else {
                    continue;
                };
                let (Some(title), Some(time)) = (parsed.title(), parsed.time()) else {
                    log::debug!(
                        "skipping {}:{}: no usable title/time in {:?}",
                        doc.file(),
                        trigger_line.line_index,
                        parsed.time
                    );
                    continue;
                };
                reminders.push(Reminder::new(
                    doc.file(),
                    title,
                    time,
                    trigger_line.line_index,
                    false,
                ));
            }
            reminders
        }

        fn modify(&self, doc: &mut MarkdownDocument, reminder: &Reminder, edit: &ReminderEdit) -> bool {
            let trigger = doc.trigger_config().clone();
            let Some(trigger_line) = doc.get_trigger_line_mut(reminder.row_number) else {
                return false;
            };
            let Some(mut parsed) = self.parse_valid_reminder(&trigger_line.line) else {
                return false;
            };
            Self::modify_reminder(&trigger, trigger_line, &mut parsed, edit)
        }

        // TODO: build the new line from `line` once the product decides on a default title.
        fn append_reminder(
            &self,
            _line: &str,
            time: &DateTime,
            insert_at: Option<usize>,
        ) -> Option<ReminderInsertion> {
            Some(ReminderInsertion {
                inserted_line: format!("{DEFAULT_TRIGGER}{time}) Task 1"),
                caret_position: insert_at.unwrap_or(0),
            })
        }
    }

}

pub use config::{ReminderFormatConfig, Settings, TriggerConfig};
pub use markdown::{MarkdownDocument, Todo, TodoEdit, TriggerLine};
pub use plain::{PlainReminderFormat, PlainReminderModel};
pub use reminder::{Reminder, ReminderEdit, ReminderFormat, ReminderInsertion, ReminderModel};
pub use time::DateTime;
