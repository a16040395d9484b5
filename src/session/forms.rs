//! Form adapters for the list admin pages
//!
//! The admin interface only speaks HTML. Each operation that reads or writes a
//! form goes through a [`FormSchema`] naming the one field it cares about; the
//! rest of the form (hidden tokens, radio defaults, submit button) is carried
//! along unchanged the way a browser would submit it.
//!
//! Parsing is deliberately shallow: regular expressions over the markup, which
//! is enough for the server-generated pages this talks to.

use crate::error::FormError;
use crate::types::{MemberChange, MessageKind};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;
use url::Url;

// The patterns are literals; a failure here is a programming error caught by the tests
#[allow(clippy::expect_used)]
static FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<form\b([^>]*)>(.*?)(?:</form\s*>|\z)").expect("form pattern")
});
#[allow(clippy::expect_used)]
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern")
});
#[allow(clippy::expect_used)]
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("input pattern"));
#[allow(clippy::expect_used)]
static TEXTAREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<textarea\b([^>]*)>(.*?)</textarea\s*>").expect("textarea pattern")
});
#[allow(clippy::expect_used)]
static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<select\b([^>]*)>(.*?)</select\s*>").expect("select pattern")
});
#[allow(clippy::expect_used)]
static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<option\b([^>]*)>([^<]*)").expect("option pattern"));
#[allow(clippy::expect_used)]
static BUTTON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button\s*>").expect("button pattern")
});
#[allow(clippy::expect_used)]
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("entity pattern")
});

/// Decode the character references that show up in admin pages
pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Attributes of one tag, names lower-cased, values entity-decoded
pub(crate) fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// HTTP method a form is submitted with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMethod {
    /// Fields go into the query string
    Get,
    /// Fields go into an `application/x-www-form-urlencoded` body
    Post,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ControlKind {
    /// Submitted whenever it has a name
    Value,
    /// Checkbox or radio; submitted only when checked
    Toggle { checked: bool },
    /// Submit button; only the first one is submitted
    Submit,
    /// Never submitted (reset, file, image, plain buttons)
    Inert,
}

#[derive(Clone, Debug)]
struct Control {
    name: String,
    value: String,
    kind: ControlKind,
}

/// One `<form>` of a page
#[derive(Clone, Debug)]
pub struct HtmlForm {
    action: Option<String>,
    method: FormMethod,
    controls: Vec<Control>,
}

impl HtmlForm {
    /// All forms of a page, in document order
    pub fn parse_all(html: &str) -> Vec<HtmlForm> {
        FORM_RE
            .captures_iter(html)
            .map(|caps| {
                let attrs = parse_attributes(&caps[1]);
                let method = match attrs.get("method") {
                    Some(m) if m.eq_ignore_ascii_case("get") => FormMethod::Get,
                    // Mailman pages post; anything unrecognised is treated the same way
                    _ => FormMethod::Post,
                };
                HtmlForm {
                    action: attrs.get("action").cloned(),
                    method,
                    controls: parse_controls(&caps[2]),
                }
            })
            .collect()
    }

    /// Whether the form has a control named `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.controls.iter().any(|c| c.name == name)
    }

    /// Current value of the control named `name`
    pub fn value(&self, name: &str) -> Option<&str> {
        self.controls
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Method the form declares
    pub fn method(&self) -> FormMethod {
        self.method
    }

    /// Successful controls as a browser would submit them
    fn successful_fields(&self) -> Vec<(String, String)> {
        let mut submitted_button = false;
        self.controls
            .iter()
            .filter(|c| match c.kind {
                ControlKind::Value => true,
                ControlKind::Toggle { checked } => checked,
                ControlKind::Submit if !submitted_button => {
                    submitted_button = true;
                    true
                }
                ControlKind::Submit | ControlKind::Inert => false,
            })
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    fn resolve_action(&self, page: &str) -> Result<Url, FormError> {
        let invalid = |action: &str, reason: String| FormError::InvalidAction {
            page: page.to_string(),
            action: action.to_string(),
            reason,
        };
        let base = Url::parse(page).map_err(|e| invalid(page, e.to_string()))?;
        match self.action.as_deref().map(str::trim) {
            None | Some("") => Ok(base),
            Some(action) => base.join(action).map_err(|e| invalid(action, e.to_string())),
        }
    }
}

fn parse_controls(body: &str) -> Vec<Control> {
    let mut found: Vec<(usize, Control)> = Vec::new();
    let mut containers: Vec<Range<usize>> = Vec::new();

    for caps in TEXTAREA_RE.captures_iter(body) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        containers.push(whole.clone());
        let attrs = parse_attributes(&caps[1]);
        let Some(name) = attrs.get("name") else {
            continue;
        };
        let raw = &caps[2];
        // A newline directly after the start tag is not part of the value
        let raw = raw
            .strip_prefix("\r\n")
            .or_else(|| raw.strip_prefix('\n'))
            .unwrap_or(raw);
        found.push((
            whole.start,
            Control {
                name: name.clone(),
                value: decode_entities(raw),
                kind: ControlKind::Value,
            },
        ));
    }

    for caps in SELECT_RE.captures_iter(body) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        containers.push(whole.clone());
        let attrs = parse_attributes(&caps[1]);
        let Some(name) = attrs.get("name") else {
            continue;
        };
        let options: Vec<(String, bool)> = OPTION_RE
            .captures_iter(&caps[2])
            .map(|opt| {
                let opt_attrs = parse_attributes(&opt[1]);
                let value = opt_attrs
                    .get("value")
                    .cloned()
                    .unwrap_or_else(|| decode_entities(opt[2].trim()));
                (value, opt_attrs.contains_key("selected"))
            })
            .collect();
        let selected = options
            .iter()
            .find(|(_, selected)| *selected)
            .or_else(|| options.first());
        if let Some((value, _)) = selected {
            found.push((
                whole.start,
                Control {
                    name: name.clone(),
                    value: value.clone(),
                    kind: ControlKind::Value,
                },
            ));
        }
    }

    let inside_container = |pos: usize| containers.iter().any(|r| r.contains(&pos));

    for caps in INPUT_RE.captures_iter(body) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        if inside_container(start) {
            continue;
        }
        let attrs = parse_attributes(&caps[1]);
        let Some(name) = attrs.get("name") else {
            continue;
        };
        let kind = match attrs
            .get("type")
            .map(|t| t.to_ascii_lowercase())
            .as_deref()
        {
            Some("checkbox") | Some("radio") => ControlKind::Toggle {
                checked: attrs.contains_key("checked"),
            },
            Some("submit") => ControlKind::Submit,
            Some("reset") | Some("file") | Some("image") | Some("button") => ControlKind::Inert,
            _ => ControlKind::Value,
        };
        let default_value = match kind {
            ControlKind::Toggle { .. } => "on",
            _ => "",
        };
        found.push((
            start,
            Control {
                name: name.clone(),
                value: attrs
                    .get("value")
                    .cloned()
                    .unwrap_or_else(|| default_value.to_string()),
                kind,
            },
        ));
    }

    for caps in BUTTON_RE.captures_iter(body) {
        let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
        if inside_container(start) {
            continue;
        }
        let attrs = parse_attributes(&caps[1]);
        let Some(name) = attrs.get("name") else {
            continue;
        };
        let kind = match attrs.get("type").map(|t| t.to_ascii_lowercase()).as_deref() {
            None | Some("submit") => ControlKind::Submit,
            _ => ControlKind::Inert,
        };
        found.push((
            start,
            Control {
                name: name.clone(),
                value: attrs.get("value").cloned().unwrap_or_default(),
                kind,
            },
        ));
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, c)| c).collect()
}

/// A ready-to-send form submission
#[derive(Clone, Debug)]
pub struct FormSubmission {
    /// Resolved action URL
    pub url: Url,
    /// Method declared by the form
    pub method: FormMethod,
    /// Fields in document order
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// Value submitted for `name`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The field an operation reads or writes on one admin page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormSchema {
    /// Operation name, used in logs
    pub operation: &'static str,
    /// Identifier of the form field on the remote page
    pub field: &'static str,
}

impl FormSchema {
    /// Login form on the list's admin entry page
    pub const LOGIN: FormSchema = FormSchema {
        operation: "login",
        field: "adminpw",
    };
    /// Mass-subscribe form
    pub const ADD_MEMBERS: FormSchema = FormSchema {
        operation: "subscribe",
        field: "subscribees",
    };
    /// Mass-unsubscribe form
    pub const REMOVE_MEMBERS: FormSchema = FormSchema {
        operation: "unsubscribe",
        field: "unsubscribees",
    };
    /// Welcome template form
    pub const WELCOME: FormSchema = FormSchema {
        operation: "welcome message",
        field: "welcome_msg",
    };
    /// Goodbye template form
    pub const GOODBYE: FormSchema = FormSchema {
        operation: "goodbye message",
        field: "goodbye_msg",
    };

    /// Schema of the mass-change page for `change`
    pub fn for_change(change: MemberChange) -> FormSchema {
        match change {
            MemberChange::Subscribe => Self::ADD_MEMBERS,
            MemberChange::Unsubscribe => Self::REMOVE_MEMBERS,
        }
    }

    /// Schema of the template page for `kind`
    pub fn for_message(kind: MessageKind) -> FormSchema {
        match kind {
            MessageKind::Welcome => Self::WELCOME,
            MessageKind::Goodbye => Self::GOODBYE,
        }
    }

    /// Locate the first form on `html` carrying this schema's field
    pub fn bind(&self, page: &str, html: &str) -> Result<BoundForm, FormError> {
        let forms = HtmlForm::parse_all(html);
        if forms.is_empty() {
            return Err(FormError::MissingForm {
                page: page.to_string(),
            });
        }
        forms
            .into_iter()
            .find(|f| f.has_field(self.field))
            .map(|form| BoundForm {
                page: page.to_string(),
                field: self.field,
                form,
            })
            .ok_or_else(|| FormError::MissingField {
                page: page.to_string(),
                field: self.field.to_string(),
            })
    }

    /// Whether `html` presents a form with this schema's field
    pub fn is_presented(&self, html: &str) -> bool {
        HtmlForm::parse_all(html)
            .iter()
            .any(|f| f.has_field(self.field))
    }
}

/// A form located on a page together with the field being worked on
#[derive(Clone, Debug)]
pub struct BoundForm {
    page: String,
    field: &'static str,
    form: HtmlForm,
}

impl BoundForm {
    /// Current value of the bound field
    pub fn value(&self) -> &str {
        self.form.value(self.field).unwrap_or_default()
    }

    /// Build the submission with the bound field set to `value`
    pub fn fill(&self, value: &str) -> Result<FormSubmission, FormError> {
        let url = self.form.resolve_action(&self.page)?;
        let mut fields = self.form.successful_fields();
        match fields.iter_mut().find(|(name, _)| name == self.field) {
            Some(slot) => slot.1 = value.to_string(),
            None => fields.push((self.field.to_string(), value.to_string())),
        }
        Ok(FormSubmission {
            url,
            method: self.form.method(),
            fields,
        })
    }
}
