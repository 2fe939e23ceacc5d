use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to an event in a REMOVE command: the numeric id, or whatever
/// text the assistant chose to put there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventRef {
    Id(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoveTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "ADD")]
    Add {
        title: String,
        start: String,
        end: String,
    },
    #[serde(rename = "REMOVE")]
    Remove(RemoveTarget),
    #[serde(rename = "MESSAGE")]
    Message { text: String },
}

impl Command {
    pub fn message(text: impl Into<String>) -> Self {
        Command::Message { text: text.into() }
    }
}

/// One element of the list returned to the caller.
///
/// Elements that match the schema exactly are typed; anything else the model
/// produced (unknown command names, extra fields, non-objects) is passed
/// through untouched so nothing the model said is dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandEntry {
    Known(Command),
    Raw(Value),
}

impl CommandEntry {
    pub fn message(text: impl Into<String>) -> Self {
        CommandEntry::Known(Command::message(text))
    }

    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Command>(value.clone()) {
            Ok(command) if serde_json::to_value(&command).ok().as_ref() == Some(&value) => {
                CommandEntry::Known(command)
            }
            _ => CommandEntry::Raw(value),
        }
    }

    pub fn command(&self) -> Option<&Command> {
        match self {
            CommandEntry::Known(command) => Some(command),
            CommandEntry::Raw(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            CommandEntry::Known(command) => serde_json::to_value(command).unwrap_or(Value::Null),
            CommandEntry::Raw(value) => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_shapes_are_typed() {
        let add = CommandEntry::from_value(json!({
            "command": "ADD",
            "title": "Meeting",
            "start": "2025-07-31T14:00:00",
            "end": "2025-07-31T15:00:00"
        }));
        assert_eq!(
            add.command(),
            Some(&Command::Add {
                title: "Meeting".to_string(),
                start: "2025-07-31T14:00:00".to_string(),
                end: "2025-07-31T15:00:00".to_string(),
            })
        );

        let remove = CommandEntry::from_value(json!({"command": "REMOVE", "id": 4}));
        assert_eq!(
            remove.command(),
            Some(&Command::Remove(RemoveTarget {
                id: Some(EventRef::Id(4)),
                ..RemoveTarget::default()
            }))
        );

        let message = CommandEntry::from_value(json!({"command": "MESSAGE", "text": "Done."}));
        assert_eq!(message, CommandEntry::message("Done."));
    }

    #[test]
    fn off_schema_values_pass_through() {
        let extra = json!({"command": "ADD", "title": "x", "start": "a", "end": "b", "notes": "n"});
        let entry = CommandEntry::from_value(extra.clone());
        assert!(entry.command().is_none());
        assert_eq!(serde_json::to_value(&entry).unwrap(), extra);

        let unknown = json!({"command": "SNOOZE", "minutes": 5});
        assert_eq!(CommandEntry::from_value(unknown.clone()), CommandEntry::Raw(unknown));

        assert_eq!(CommandEntry::from_value(json!(3)), CommandEntry::Raw(json!(3)));
    }

    #[test]
    fn message_serializes_with_tag() {
        let value = serde_json::to_value(CommandEntry::message("Sure, I'll do that!")).unwrap();
        assert_eq!(value, json!({"command": "MESSAGE", "text": "Sure, I'll do that!"}));
    }
}
