//! Page actions: the ordered UI operations a task may run against the
//! rendered page before extraction.

use serde::Deserialize;

/// One primitive UI operation inside a task's `actions` array.
///
/// An entry whose `type` tag is unrecognized deserializes to
/// [`PageAction::Unknown`] instead of failing the whole task; the executor
/// logs the kind and skips it. A recognized tag with missing fields is a
/// hard parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Wait { milliseconds: u64 },
    Click { selector: String },
    /// Insert text at the cursor of the focused element.
    Write { text: String },
    FillInput { selector: String, value: String },
    FillTextarea { selector: String, value: String },
    Select { selector: String, value: String },
    FillForm { selector: String, fields: Vec<FormField> },
    Press { key: String },
    Scroll { direction: ScrollDirection, amount: i64 },
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Scroll offsets `(dx, dy)` for a given amount; up and left negate.
    pub fn offsets(self, amount: i64) -> (i64, i64) {
        match self {
            ScrollDirection::Up => (0, -amount),
            ScrollDirection::Down => (0, amount),
            ScrollDirection::Left => (-amount, 0),
            ScrollDirection::Right => (amount, 0),
        }
    }
}

const KNOWN_KINDS: &[&str] = &[
    "wait",
    "click",
    "write",
    "fill_input",
    "fill_textarea",
    "select",
    "fill_form",
    "press",
    "scroll",
];

/// Derived mirror of the known variants; [`PageAction`] itself needs a
/// hand-written impl so unrecognized tags become `Unknown` with the tag
/// preserved for logging.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownAction {
    Wait { milliseconds: u64 },
    Click { selector: String },
    Write { text: String },
    FillInput { selector: String, value: String },
    FillTextarea { selector: String, value: String },
    Select { selector: String, value: String },
    FillForm { selector: String, fields: Vec<FormField> },
    Press { key: String },
    Scroll { direction: ScrollDirection, amount: i64 },
}

impl From<KnownAction> for PageAction {
    fn from(known: KnownAction) -> Self {
        match known {
            KnownAction::Wait { milliseconds } => PageAction::Wait { milliseconds },
            KnownAction::Click { selector } => PageAction::Click { selector },
            KnownAction::Write { text } => PageAction::Write { text },
            KnownAction::FillInput { selector, value } => PageAction::FillInput { selector, value },
            KnownAction::FillTextarea { selector, value } => {
                PageAction::FillTextarea { selector, value }
            }
            KnownAction::Select { selector, value } => PageAction::Select { selector, value },
            KnownAction::FillForm { selector, fields } => PageAction::FillForm { selector, fields },
            KnownAction::Press { key } => PageAction::Press { key },
            KnownAction::Scroll { direction, amount } => PageAction::Scroll { direction, amount },
        }
    }
}

impl<'de> Deserialize<'de> for PageAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_owned();
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(PageAction::Unknown { kind });
        }
        serde_json::from_value::<KnownAction>(value)
            .map(PageAction::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> PageAction {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn parses_known_actions() {
        assert_eq!(
            parse(r#"{"type":"wait","milliseconds":250}"#),
            PageAction::Wait { milliseconds: 250 }
        );
        assert_eq!(
            parse(r##"{"type":"click","selector":"#submit"}"##),
            PageAction::Click {
                selector: "#submit".into()
            }
        );
        assert_eq!(
            parse(r#"{"type":"fill_form","selector":"form","fields":[{"name":"q","value":"rust"}]}"#),
            PageAction::FillForm {
                selector: "form".into(),
                fields: vec![FormField {
                    name: "q".into(),
                    value: "rust".into()
                }]
            }
        );
    }

    #[test]
    fn unknown_kind_is_preserved_not_fatal() {
        assert_eq!(
            parse(r##"{"type":"hover","selector":"#menu"}"##),
            PageAction::Unknown {
                kind: "hover".into()
            }
        );
        assert_eq!(parse(r##"{"selector":"#x"}"##), PageAction::Unknown { kind: "".into() });
    }

    #[test]
    fn known_kind_with_missing_fields_is_an_error() {
        let result: Result<PageAction, _> = serde_json::from_str(r#"{"type":"click"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn scroll_offsets_negate_up_and_left() {
        assert_eq!(ScrollDirection::Up.offsets(120), (0, -120));
        assert_eq!(ScrollDirection::Down.offsets(120), (0, 120));
        assert_eq!(ScrollDirection::Left.offsets(40), (-40, 0));
        assert_eq!(ScrollDirection::Right.offsets(40), (40, 0));
    }
}
