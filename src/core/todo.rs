use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(pub i64);

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Priority in the range 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Priority {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "priority {} out of range {}..={}",
                value,
                Self::MIN,
                Self::MAX
            )
        })
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        p.0 as i64
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A todo as the server and the mirror know it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: TodoId,
    pub title: String,
    pub date: NaiveDate,
    pub priority: Priority,
    pub completed: bool,
}

impl TodoItem {
    pub fn field(&self, field: TodoField) -> FieldValue {
        match field {
            TodoField::Title => FieldValue::Title(self.title.clone()),
            TodoField::Date => FieldValue::Date(self.date),
            TodoField::Priority => FieldValue::Priority(self.priority),
            TodoField::Completed => FieldValue::Completed(self.completed),
        }
    }

    /// Overwrite one field, returning the value it held before.
    pub fn apply(&mut self, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::Title(t) => FieldValue::Title(std::mem::replace(&mut self.title, t)),
            FieldValue::Date(d) => FieldValue::Date(std::mem::replace(&mut self.date, d)),
            FieldValue::Priority(p) => {
                FieldValue::Priority(std::mem::replace(&mut self.priority, p))
            }
            FieldValue::Completed(c) => {
                FieldValue::Completed(std::mem::replace(&mut self.completed, c))
            }
        }
    }
}

/// Fields of a todo that can be edited after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodoField {
    Title,
    Date,
    Priority,
    Completed,
}

impl TodoField {
    /// Name used both as the URL segment and the JSON key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Date => "date",
            Self::Priority => "priority",
            Self::Completed => "completed",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "date" => Some(Self::Date),
            "priority" => Some(Self::Priority),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TodoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value for one [`TodoField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Title(String),
    Date(NaiveDate),
    Priority(Priority),
    Completed(bool),
}

impl FieldValue {
    pub fn field(&self) -> TodoField {
        match self {
            Self::Title(_) => TodoField::Title,
            Self::Date(_) => TodoField::Date,
            Self::Priority(_) => TodoField::Priority,
            Self::Completed(_) => TodoField::Completed,
        }
    }

    /// Parse user input for `field`, e.g. from the command line.
    pub fn parse(field: TodoField, raw: &str) -> Result<Self, String> {
        match field {
            TodoField::Title => Ok(Self::Title(raw.to_string())),
            TodoField::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|e| format!("Invalid date '{}': {}", raw, e)),
            TodoField::Priority => raw
                .parse::<i64>()
                .map_err(|e| format!("Invalid priority '{}': {}", raw, e))
                .and_then(Priority::try_from)
                .map(Self::Priority),
            TodoField::Completed => match raw {
                "true" | "yes" | "done" | "1" => Ok(Self::Completed(true)),
                "false" | "no" | "todo" | "0" => Ok(Self::Completed(false)),
                _ => Err(format!("Invalid completed flag '{}'", raw)),
            },
        }
    }

    /// JSON body for `PUT /todos/{id}/{field}`.
    pub fn to_body(&self) -> serde_json::Value {
        let value = match self {
            Self::Title(t) => serde_json::json!(t),
            Self::Date(d) => serde_json::json!(d.format("%Y-%m-%d").to_string()),
            Self::Priority(p) => serde_json::json!(p.get()),
            Self::Completed(c) => serde_json::json!(c),
        };
        let mut body = serde_json::Map::new();
        body.insert(self.field().as_str().to_string(), value);
        serde_json::Value::Object(body)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title(t) => write!(f, "{:?}", t),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Priority(p) => write!(f, "{}", p),
            Self::Completed(c) => write!(f, "{}", c),
        }
    }
}

/// Fields of a todo before the server has assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    pub date: NaiveDate,
    pub priority: Priority,
    pub completed: bool,
}

impl NewTodo {
    pub fn new(title: impl Into<String>, date: NaiveDate, priority: Priority) -> Self {
        Self {
            title: title.into(),
            date,
            priority,
            completed: false,
        }
    }
}
